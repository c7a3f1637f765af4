pub mod decision;
pub mod policy;
pub mod request;
pub mod severity;
pub mod shield;
pub mod trace;

pub use decision::{Decision, StageDecision};
pub use policy::Policy;
pub use request::{AnalyzeRequest, AnalyzeResponse, FunctionCall};
pub use severity::{Severity, SeverityComparator};
pub use shield::Shield;
pub use trace::{AnalysisTrace, ReviewStatus};
