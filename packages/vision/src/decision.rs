//! # Decision Pipeline
//!
//! Turns a model's probability vector into one of three outcomes:
//!
//! - `REJECTED` when the top class is the out-of-domain sentinel, whatever its score
//! - `LOW_CONFIDENCE` when the top score is below the threshold
//! - `SUCCESS` otherwise, with label-specific advice
//!
//! The pipeline never errors on a well-formed vector; "is this bad?" lives in
//! [`Outcome::status`].

use crate::error::{InvalidInputError, ManifestError};
use crate::manifest::ModelManifest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

pub const FALLBACK_ADVICE: &str = "Consult a local agricultural expert for precise guidance.";

pub const LOW_CONFIDENCE_ADVICE: &str = "Retake the photo in good, even light with a single leaf filling the frame, or consult a local agricultural expert.";

pub const REJECTION_MESSAGE: &str =
    "The uploaded image does not appear to be a tea leaf. Please upload a clear photo of a tea leaf.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    LowConfidence,
    Rejected,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "SUCCESS",
            OutcomeStatus::LowConfidence => "LOW_CONFIDENCE",
            OutcomeStatus::Rejected => "REJECTED",
        }
    }

    /// Rejected images never enter a user's scan history.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, OutcomeStatus::Rejected)
    }
}

/// Classified result of one image. Serializes to the stable
/// `{status, prediction, confidence, message, recommendation}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(rename = "prediction")]
    pub predicted_label: String,
    /// Top score rounded to 4 decimal places
    pub confidence: f64,
    pub message: String,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    labels: Vec<String>,
    out_of_domain_label: String,
    confidence_threshold: f64,
    recommendations: HashMap<String, String>,
}

impl DecisionPolicy {
    pub fn new(
        labels: Vec<String>,
        out_of_domain_label: impl Into<String>,
        confidence_threshold: f64,
        recommendations: HashMap<String, String>,
    ) -> Result<Self, ManifestError> {
        if !(confidence_threshold > 0.0 && confidence_threshold < 1.0) {
            return Err(ManifestError::InvalidThreshold(confidence_threshold));
        }
        let out_of_domain_label = out_of_domain_label.into();
        if !labels.contains(&out_of_domain_label) {
            return Err(ManifestError::UnknownSentinel(out_of_domain_label));
        }
        Ok(Self {
            labels,
            out_of_domain_label,
            confidence_threshold,
            recommendations,
        })
    }

    pub fn from_manifest(
        manifest: &ModelManifest,
        confidence_threshold: f64,
    ) -> Result<Self, ManifestError> {
        Self::new(
            manifest.labels.clone(),
            manifest.out_of_domain_label.clone(),
            confidence_threshold,
            manifest.recommendation_table(),
        )
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn out_of_domain_label(&self) -> &str {
        &self.out_of_domain_label
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Advice for a label, or the generic fallback when the table has no entry.
    pub fn recommendation_for(&self, label: &str) -> &str {
        self.recommendations
            .get(label)
            .map(String::as_str)
            .unwrap_or(FALLBACK_ADVICE)
    }

    pub fn classify(&self, probabilities: &[f64]) -> Result<Outcome, InvalidInputError> {
        if probabilities.len() != self.labels.len() {
            return Err(InvalidInputError::LengthMismatch {
                expected: self.labels.len(),
                actual: probabilities.len(),
            });
        }

        let (index, raw) = argmax(probabilities).ok_or(InvalidInputError::NoFiniteScore)?;
        let label = &self.labels[index];
        let confidence = round_confidence(raw);

        let outcome = if *label == self.out_of_domain_label {
            Outcome {
                status: OutcomeStatus::Rejected,
                predicted_label: label.clone(),
                confidence,
                message: REJECTION_MESSAGE.to_string(),
                recommendation: self.recommendation_for(label).to_string(),
            }
        } else if raw < self.confidence_threshold {
            Outcome {
                status: OutcomeStatus::LowConfidence,
                predicted_label: label.clone(),
                confidence,
                message: format!(
                    "Low confidence: the model leans towards '{}' at {:.2}%, below the {}% threshold. The result may be unreliable.",
                    label,
                    confidence * 100.0,
                    percent_label(self.confidence_threshold)
                ),
                recommendation: LOW_CONFIDENCE_ADVICE.to_string(),
            }
        } else {
            Outcome {
                status: OutcomeStatus::Success,
                predicted_label: label.clone(),
                confidence,
                message: format!("Detected '{}'.", label),
                recommendation: self.recommendation_for(label).to_string(),
            }
        };
        Ok(outcome)
    }
}

/// Left-to-right maximum scan. Only a strictly greater score replaces the
/// current best, so ties keep the lowest index. NaN never wins.
fn argmax(scores: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in scores.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.filter(|(_, v)| v.is_finite())
}

/// Half-up rounding to 4 places on the decimal value of the score.
///
/// The score is snapped to 10 places first so that `0.70005`, stored as
/// `0.700049999...`, rounds to `0.7001`.
pub fn round_confidence(value: f64) -> f64 {
    let snapped = (value * 1e10).round() as i64;
    let rounded = if snapped >= 0 {
        (snapped + 500_000) / 1_000_000
    } else {
        (snapped - 500_000) / 1_000_000
    };
    rounded as f64 / 1e4
}

/// `0.7 -> "70"`, `0.725 -> "72.5"`.
fn percent_label(fraction: f64) -> String {
    let hundredths = (fraction * 10_000.0).round() / 100.0;
    format!("{}", hundredths)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANTHRACNOSE: &str = "Anthracnose disease. Prune infected parts, remove fallen leaves, and apply recommended fungicides.";

    fn policy() -> DecisionPolicy {
        DecisionPolicy::from_manifest(&ModelManifest::default(), DEFAULT_CONFIDENCE_THRESHOLD)
            .unwrap()
    }

    fn one_hot(index: usize, score: f64) -> Vec<f64> {
        let rest = (1.0 - score) / 8.0;
        let mut v = vec![rest.min(score / 2.0); 9];
        v[index] = score;
        v
    }

    #[test]
    fn confident_disease_is_success() {
        let outcome = policy()
            .classify(&[0.9, 0.02, 0.01, 0.01, 0.01, 0.01, 0.02, 0.01, 0.01])
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.predicted_label, "Anthracnose");
        assert_eq!(outcome.confidence, 0.9);
        assert_eq!(outcome.recommendation, ANTHRACNOSE);
        assert!(outcome.message.contains("Anthracnose"));
    }

    #[test]
    fn sentinel_is_rejected_even_when_certain() {
        for score in [0.4, 0.7, 0.99] {
            let outcome = policy().classify(&one_hot(1, score)).unwrap();
            assert_eq!(outcome.status, OutcomeStatus::Rejected);
            assert_eq!(outcome.predicted_label, "Other_Non_Tea_Leaf");
            assert_eq!(outcome.message, REJECTION_MESSAGE);
            assert_eq!(
                outcome.recommendation,
                policy().recommendation_for("Other_Non_Tea_Leaf")
            );
        }
    }

    #[test]
    fn low_scoring_sentinel_is_still_rejected() {
        let outcome = policy()
            .classify(&[0.1, 0.4, 0.05, 0.05, 0.1, 0.1, 0.1, 0.05, 0.05])
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.confidence, 0.4);
    }

    #[test]
    fn low_confidence_withholds_label_advice() {
        for index in [0, 2, 6, 8] {
            let outcome = policy().classify(&one_hot(index, 0.55)).unwrap();
            assert_eq!(outcome.status, OutcomeStatus::LowConfidence);
            assert_eq!(outcome.recommendation, LOW_CONFIDENCE_ADVICE);
            assert_ne!(
                outcome.recommendation,
                policy().recommendation_for(&outcome.predicted_label)
            );
            assert!(outcome.message.contains(&outcome.predicted_label));
            assert!(outcome.message.contains("55.00%"));
            assert!(outcome.message.contains("70%"));
        }
    }

    #[test]
    fn score_at_threshold_is_success() {
        let outcome = policy().classify(&one_hot(6, 0.70)).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.predicted_label, "healthy");
        assert_eq!(outcome.recommendation, policy().recommendation_for("healthy"));
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let outcome = policy()
            .classify(&[0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(outcome.predicted_label, "Anthracnose");
        assert_eq!(outcome.status, OutcomeStatus::LowConfidence);

        let outcome = policy()
            .classify(&[0.0, 0.0, 0.45, 0.45, 0.1, 0.0, 0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(outcome.predicted_label, "algal leaf");
    }

    #[test]
    fn confidence_rounds_half_up_to_four_places() {
        assert_eq!(round_confidence(0.70005), 0.7001);
        assert_eq!(round_confidence(0.123449), 0.1234);
        assert_eq!(round_confidence(1.0), 1.0);
        assert_eq!(round_confidence(0.0), 0.0);

        let outcome = policy().classify(&one_hot(3, 0.70005)).unwrap();
        assert_eq!(outcome.confidence, 0.7001);
        assert_eq!(outcome.status, OutcomeStatus::Success);

        let mut below = one_hot(3, 0.65005);
        below[0] = 0.0;
        let outcome = policy().classify(&below).unwrap();
        assert_eq!(outcome.confidence, 0.6501);
        assert!(outcome.message.contains("65.01%"));
    }

    #[test]
    fn classify_is_idempotent() {
        let p = policy();
        let scores = [0.05, 0.05, 0.1, 0.6, 0.05, 0.05, 0.05, 0.03, 0.02];
        assert_eq!(p.classify(&scores).unwrap(), p.classify(&scores).unwrap());
    }

    #[test]
    fn missing_table_entry_falls_back() {
        let labels = vec!["leaf_a".to_string(), "nope".to_string()];
        let p = DecisionPolicy::new(labels, "nope", 0.5, HashMap::new()).unwrap();
        let outcome = p.classify(&[0.9, 0.1]).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.recommendation, FALLBACK_ADVICE);
    }

    #[test]
    fn wrong_length_is_invalid_input() {
        assert_eq!(
            policy().classify(&[0.5, 0.5]),
            Err(InvalidInputError::LengthMismatch {
                expected: 9,
                actual: 2
            })
        );
    }

    #[test]
    fn all_nan_is_invalid_input() {
        assert_eq!(
            policy().classify(&[f64::NAN; 9]),
            Err(InvalidInputError::NoFiniteScore)
        );
    }

    #[test]
    fn nan_entries_are_skipped() {
        let mut scores = one_hot(4, 0.8);
        scores[0] = f64::NAN;
        let outcome = policy().classify(&scores).unwrap();
        assert_eq!(outcome.predicted_label, "brown blight");
    }

    #[test]
    fn threshold_bounds_are_enforced() {
        let manifest = ModelManifest::default();
        assert!(DecisionPolicy::from_manifest(&manifest, 0.0).is_err());
        assert!(DecisionPolicy::from_manifest(&manifest, 1.0).is_err());
        assert!(DecisionPolicy::from_manifest(&manifest, f64::NAN).is_err());
    }

    #[test]
    fn outcome_serializes_to_stable_shape() {
        let outcome = policy().classify(&one_hot(0, 0.9)).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            ["confidence", "message", "prediction", "recommendation", "status"]
        );
        assert_eq!(obj["status"], "SUCCESS");
        assert_eq!(
            serde_json::to_value(OutcomeStatus::LowConfidence).unwrap(),
            "LOW_CONFIDENCE"
        );
    }

    #[test]
    fn threshold_percentage_keeps_fractional_part() {
        assert_eq!(percent_label(0.7), "70");
        assert_eq!(percent_label(0.725), "72.5");
    }
}
