//! Remote "deeprag" retrieval over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::{fallback_pack, normalize_pack, ResourceRetriever};
use crate::contracts::{EvidencePack, RetrievalPlan};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct HttpClient {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_default_timeout(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, DEFAULT_TIMEOUT)
    }

    async fn call(&self, plan: &RetrievalPlan) -> Result<Value, reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .json(plan)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

#[async_trait]
impl ResourceRetriever for HttpClient {
    async fn retrieve(&self, plan: &RetrievalPlan) -> EvidencePack {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.call(plan)).await {
            Ok(Ok(raw)) => build_remote_pack(&raw, &plan.request_id, elapsed_ms(started)),
            Ok(Err(err)) => {
                tracing::warn!("deeprag request failed: {}", err);
                fallback_pack(
                    &plan.request_id,
                    format!("remote-error-{}", plan.request_id),
                    vec![format!("deeprag request failed: {}", err)],
                )
            }
            Err(_) => {
                let elapsed = elapsed_ms(started);
                tracing::warn!("deeprag timeout after {:.0}ms", elapsed);
                let mut pack = fallback_pack(
                    &plan.request_id,
                    format!("timeout-{}", plan.request_id),
                    vec![format!(
                        "deeprag timeout after {:.0}ms; fallback to memory-only evidence",
                        elapsed
                    )],
                );
                pack.stats.took_ms = round2(elapsed);
                pack
            }
        }
    }
}

/// Successful responses still pass a capability probe: a backend that
/// does not advertise `supports_language_filter` silently dropped any
/// language filter, and that lands first in `ignored_fields`.
///
/// `took_ms` is measured on this side of the wire, so the stat reflects
/// the latency the pipeline actually paid.
pub(crate) fn build_remote_pack(raw: &Value, request_id: &str, took_ms: f64) -> EvidencePack {
    let mut pack = normalize_pack(raw, request_id, "remote");
    let supported = raw
        .get("supports_language_filter")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !supported {
        pack.explain
            .ignored_fields
            .insert(0, "global_filters.language not supported".to_string());
    }
    pack.stats.took_ms = round2(took_ms);
    pack
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::config::Config;
    use crate::planner::RetrievalPlanner;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn plan() -> RetrievalPlan {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
        RetrievalPlanner::new(Arc::new(Config::default()), clock).plan(
            "req-7",
            "s1",
            "latest retrieval papers",
            &json!({}),
            &[],
            &[],
        )
    }

    #[test]
    fn capability_probe_flags_missing_language_support() {
        let raw = json!({
            "evidences": [],
            "explain": {"ignored_fields": ["their own note"]}
        });

        let pack = build_remote_pack(&raw, "req-7", 31.4);

        assert_eq!(
            pack.explain.ignored_fields,
            vec!["global_filters.language not supported", "their own note"]
        );
        assert_eq!(pack.stats.took_ms, 31.4);
    }

    #[test]
    fn capability_probe_passes_when_advertised() {
        let raw = json!({
            "supports_language_filter": true,
            "evidences": []
        });

        let pack = build_remote_pack(&raw, "req-7", 5.0);

        assert!(pack.explain.ignored_fields.is_empty());
    }

    #[tokio::test]
    async fn unresponsive_endpoint_times_out_into_warning() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections, hold them open, never answer.
        tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    open.push(stream);
                }
            }
        });

        let client = HttpClient::new(
            format!("http://{}/retrieve", addr),
            Duration::from_millis(50),
        );
        let pack = client.retrieve(&plan()).await;

        assert_eq!(pack.plan_id, "timeout-req-7");
        assert!(pack.evidences.is_empty());
        assert!(pack.warnings[0].starts_with("deeprag timeout after "));
        assert!(pack.warnings[0].ends_with("; fallback to memory-only evidence"));
    }

    #[tokio::test]
    async fn transport_error_degrades_to_empty_pack() {
        // Bind then drop to get a port with no listener.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::new(
            format!("http://{}/retrieve", addr),
            Duration::from_millis(500),
        );
        let pack = client.retrieve(&plan()).await;

        assert_eq!(pack.plan_id, "remote-error-req-7");
        assert!(pack.warnings[0].starts_with("deeprag request failed: "));
    }
}
