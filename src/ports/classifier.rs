//! The injection-probability classifier port.

/// Total over any input string: `score` never fails, truncating internally
/// if the underlying model has a maximum sequence length.
pub trait Classifier: Send + Sync {
    /// Probability in `[0, 1]` that `text` is malicious / contains injected
    /// instructions. 1.0 means "likely injected".
    fn score(&self, text: &str) -> f32;
}

/// Per-class probabilities handed to [`ClassifierAdapter::score_from_probs`]
/// by a concrete model wrapper.
#[derive(Debug, Clone)]
pub enum ClassOutput {
    /// `P(malicious)` for a binary classifier.
    Binary(f32),
    /// Per-class probabilities for a ≥3-class classifier, ordered
    /// `[benign, malicious, embedded_instructions, ...]`.
    Multiclass(Vec<f32>),
}

/// Centralizes the binary-vs-multiclass summing rule so a concrete
/// `Classifier` only needs to supply raw per-class probabilities, not
/// reimplement the summing rule.
pub struct ClassifierAdapter;

impl ClassifierAdapter {
    /// Truncate `text` to at most `max_chars` characters, left-anchored:
    /// keep the start of the string, drop the tail.
    pub fn truncate(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }

    /// `P(class=1) + P(class=2)` for ≥3 classes, else `P(class=1)`.
    pub fn score_from_probs(output: &ClassOutput) -> f32 {
        match output {
            ClassOutput::Binary(p_malicious) => *p_malicious,
            ClassOutput::Multiclass(probs) if probs.len() >= 3 => {
                probs.get(1).copied().unwrap_or(0.0) + probs.get(2).copied().unwrap_or(0.0)
            }
            ClassOutput::Multiclass(probs) => probs.get(1).copied().unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_score_is_class_one_probability() {
        let out = ClassOutput::Binary(0.73);
        assert_eq!(ClassifierAdapter::score_from_probs(&out), 0.73);
    }

    #[test]
    fn multiclass_score_sums_class_one_and_two() {
        let out = ClassOutput::Multiclass(vec![0.1, 0.4, 0.3, 0.2]);
        assert!((ClassifierAdapter::score_from_probs(&out) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn truncate_keeps_left_anchor() {
        assert_eq!(ClassifierAdapter::truncate("hello world", 5), "hello");
        assert_eq!(ClassifierAdapter::truncate("hi", 5), "hi");
    }
}
