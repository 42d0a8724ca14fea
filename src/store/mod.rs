pub mod events;
pub mod memory;

pub use events::EventStore;
pub use memory::MemoryStore;
