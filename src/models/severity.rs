use serde::{Deserialize, Serialize};

/// Closed severity ladder shared by every stage of the pipeline.
///
/// Ordering is total and is relied on by [`Severity::stricter`] and by the
/// `>=, >, <=, <, =` comparators in context-rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Safe,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// The stricter (higher) of two severities.
    pub fn stricter(self, other: Severity) -> Severity {
        self.max(other)
    }

    /// Severity banding used by the classifier-derived input stage and by
    /// score-derived severity in the quarantine probe.
    ///
    /// `thresholds` are five ascending cut points for
    /// `{low, medium, high, critical}` — i.e. `score < thresholds[0]` is
    /// `Safe`, `score < thresholds[1]` is `Low`, and so on, with anything
    /// `>= thresholds[4]` landing in `Critical`.
    pub fn from_score(score: f32, thresholds: &[f32; 5]) -> Severity {
        if score < thresholds[0] {
            Severity::Safe
        } else if score < thresholds[1] {
            Severity::Low
        } else if score < thresholds[2] {
            Severity::Medium
        } else if score < thresholds[3] {
            Severity::High
        } else {
            // thresholds[4] is the critical cutoff; anything at or above
            // thresholds[3] but below it is still High.
            if score < thresholds[4] {
                Severity::High
            } else {
                Severity::Critical
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Safe => "safe",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::errors::GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Severity::Safe),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(crate::errors::GatewayError::BadRequest(format!(
                "unknown severity level: {other}"
            ))),
        }
    }
}

/// A comparator used by `context_rules[].condition.severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityComparator {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

impl SeverityComparator {
    pub fn parse(token: &str) -> Result<Self, crate::errors::GatewayError> {
        match token {
            ">=" => Ok(SeverityComparator::Ge),
            ">" => Ok(SeverityComparator::Gt),
            "<=" => Ok(SeverityComparator::Le),
            "<" => Ok(SeverityComparator::Lt),
            "=" => Ok(SeverityComparator::Eq),
            other => Err(crate::errors::GatewayError::BadRequest(format!(
                "unknown severity comparator: {other}"
            ))),
        }
    }

    pub fn apply(self, actual: Severity, expected: Severity) -> bool {
        match self {
            SeverityComparator::Ge => actual >= expected,
            SeverityComparator::Gt => actual > expected,
            SeverityComparator::Le => actual <= expected,
            SeverityComparator::Lt => actual < expected,
            SeverityComparator::Eq => actual == expected,
        }
    }
}
