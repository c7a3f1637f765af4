pub mod memory;

pub use memory::{InMemoryPolicyStore, InMemoryTraceStore};
