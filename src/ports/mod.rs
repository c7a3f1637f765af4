pub mod classifier;
pub mod completer;
pub mod store;

pub use classifier::Classifier;
pub use completer::{ChatCompleter, CompleterError, CompletionRequest, ResponseFormat};
pub use store::{PolicyStore, PolicyUpdateDiff, TraceStore};
