pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod promotions;
pub mod testing;

// Re-export the pieces the binary wires together.
pub use engine::{DispatchEngine, QuotaManager};
pub use error::DispatcherError;
