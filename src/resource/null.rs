//! Placeholder client used when no retrieval backend is configured.

use async_trait::async_trait;

use super::{fallback_pack, ResourceRetriever};
use crate::contracts::{EvidencePack, RetrievalPlan};

pub struct NullClient;

#[async_trait]
impl ResourceRetriever for NullClient {
    async fn retrieve(&self, plan: &RetrievalPlan) -> EvidencePack {
        fallback_pack(
            &plan.request_id,
            format!("local-{}", plan.request_id),
            vec!["deeprag client not configured; returned empty evidences".to_string()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::validate_pack;
    use crate::core::clock::FixedClock;
    use crate::core::config::Config;
    use crate::planner::RetrievalPlanner;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_an_empty_pack_with_a_warning() {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
        let plan = RetrievalPlanner::new(Arc::new(Config::default()), clock).plan(
            "req-3",
            "s1",
            "hello",
            &json!({}),
            &[],
            &[],
        );

        let pack = NullClient.retrieve(&plan).await;

        assert!(validate_pack(&pack).is_ok());
        assert_eq!(pack.plan_id, "local-req-3");
        assert!(pack.evidences.is_empty());
        assert_eq!(
            pack.warnings,
            vec!["deeprag client not configured; returned empty evidences"]
        );
    }
}
