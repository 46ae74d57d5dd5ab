pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod store;

// Re-export main components for easier use
pub use engine::{DetectionEngine, DetectionSettings};
pub use error::Error;
pub use store::{DetectionStore, MemoryStore, PgStore};
