//! In-memory adapters for deterministic lifecycle and persistence tests.

mod environment;
mod store;

pub use environment::{
    EnvironmentVerb, InMemoryEnvironment, InMemoryEnvironmentHost, RecordedCall,
};
pub use store::{InMemoryServerStore, StoreFault};
