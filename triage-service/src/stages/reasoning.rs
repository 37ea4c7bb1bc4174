use async_trait::async_trait;
use tracing::{info, warn};

use assessment_flow::{Diagnosis, ReasoningOutcome, ReasoningStage, Result, Symptom};

use super::utils::{complete, extract_json, inference_available};

const REASONING_PREAMBLE: &str = r#"You are a medical reasoning assistant validating a set of
differential diagnoses against the reported symptoms.

Check each diagnosis for consistency with the symptom picture, flag weakly
supported entries, and adjust the ordering if needed.

Respond with ONLY a JSON object:
{"status": "validated", "reasoning": "...", "adjusted_diagnoses": [{"disease": "...", "confidence_score": 0.0, "key_indicators": ["..."], "supporting_evidence": ["..."]}]}"#;

/// Reasoning stage backed by the inference service, with a deterministic
/// indicator-consistency check when inference is unreachable.
pub struct LlmReasoningStage {
    offline: bool,
}

impl LlmReasoningStage {
    pub fn new() -> Self {
        Self { offline: false }
    }

    pub fn offline() -> Self {
        Self { offline: true }
    }
}

impl Default for LlmReasoningStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningStage for LlmReasoningStage {
    async fn validate_diagnoses(
        &self,
        diagnoses: &[Diagnosis],
        symptoms: &[Symptom],
    ) -> Result<ReasoningOutcome> {
        if self.offline || !inference_available() {
            info!("inference unavailable, using indicator-consistency check");
            return Ok(fallback_reasoning(diagnoses, symptoms));
        }

        let prompt = format!(
            "Diagnoses:\n{}\n\nReported symptoms:\n{}",
            serde_json::to_string_pretty(diagnoses)?,
            symptoms
                .iter()
                .map(|s| format!("- {} ({:?})", s.name, s.severity))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let response = complete(REASONING_PREAMBLE, &prompt).await?;

        let outcome = extract_json(&response)
            .and_then(|payload| serde_json::from_str::<ReasoningOutcome>(payload).ok())
            .unwrap_or_else(|| {
                warn!("unparseable reasoning response, using indicator-consistency check");
                fallback_reasoning(diagnoses, symptoms)
            });
        Ok(outcome)
    }
}

// Each diagnosis is supported when its key indicators appear among the
// reported symptoms; unsupported entries are noted but not dropped.
fn fallback_reasoning(diagnoses: &[Diagnosis], symptoms: &[Symptom]) -> ReasoningOutcome {
    let reported: Vec<String> = symptoms.iter().map(|s| s.name.to_lowercase()).collect();

    let unsupported: Vec<&str> = diagnoses
        .iter()
        .filter(|d| {
            !d.key_indicators.is_empty()
                && !d
                    .key_indicators
                    .iter()
                    .any(|i| reported.contains(&i.to_lowercase()))
        })
        .map(|d| d.disease.as_str())
        .collect();

    let reasoning = if unsupported.is_empty() {
        format!(
            "All {} diagnoses are consistent with the reported symptoms.",
            diagnoses.len()
        )
    } else {
        format!(
            "Diagnoses with no matching reported indicator: {}. Recommend clarifying these before acting.",
            unsupported.join(", ")
        )
    };

    let mut adjusted = diagnoses.to_vec();
    adjusted.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    ReasoningOutcome {
        status: "validated".to_string(),
        reasoning,
        adjusted_diagnoses: adjusted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessment_flow::Severity;

    fn symptom(name: &str) -> Symptom {
        Symptom {
            name: name.to_string(),
            severity: Severity::Moderate,
            duration_days: 1,
            details: String::new(),
        }
    }

    fn diagnosis(disease: &str, confidence: f64, indicators: &[&str]) -> Diagnosis {
        Diagnosis {
            disease: disease.to_string(),
            confidence_score: confidence,
            key_indicators: indicators.iter().map(|s| s.to_string()).collect(),
            supporting_evidence: Vec::new(),
        }
    }

    #[test]
    fn consistent_diagnoses_validate_cleanly() {
        let outcome = fallback_reasoning(
            &[diagnosis("Influenza", 0.7, &["fever", "cough"])],
            &[symptom("fever"), symptom("cough")],
        );
        assert_eq!(outcome.status, "validated");
        assert!(outcome.reasoning.contains("consistent"));
        assert_eq!(outcome.adjusted_diagnoses.len(), 1);
    }

    #[test]
    fn unsupported_diagnoses_are_called_out() {
        let outcome = fallback_reasoning(
            &[
                diagnosis("Influenza", 0.7, &["fever"]),
                diagnosis("Appendicitis", 0.4, &["abdominal pain"]),
            ],
            &[symptom("fever")],
        );
        assert!(outcome.reasoning.contains("Appendicitis"));
        // unsupported entries are retained for the human reviewer
        assert_eq!(outcome.adjusted_diagnoses.len(), 2);
    }

    #[test]
    fn adjusted_diagnoses_are_ordered_by_confidence() {
        let outcome = fallback_reasoning(
            &[
                diagnosis("Low", 0.2, &[]),
                diagnosis("High", 0.9, &[]),
            ],
            &[symptom("fever")],
        );
        assert_eq!(outcome.adjusted_diagnoses[0].disease, "High");
    }
}
