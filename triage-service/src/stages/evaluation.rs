use async_trait::async_trait;
use tracing::{info, warn};

use assessment_flow::{AssessmentRecord, Evaluation, EvaluationStage, Result};

use super::utils::{complete, extract_json, inference_available};

const EVALUATION_PREAMBLE: &str = r#"You are a medical quality evaluator. Assess the completeness
and internal consistency of the assessment record you are given.

Respond with ONLY a JSON object:
{"status": "evaluated", "quality_score": 0.0, "assessment": "...", "strengths": ["..."], "concerns": ["..."]}"#;

/// Evaluation stage backed by the inference service, with a deterministic
/// completeness score when inference is unreachable.
pub struct LlmEvaluationStage {
    offline: bool,
}

impl LlmEvaluationStage {
    pub fn new() -> Self {
        Self { offline: false }
    }

    pub fn offline() -> Self {
        Self { offline: true }
    }
}

impl Default for LlmEvaluationStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvaluationStage for LlmEvaluationStage {
    async fn evaluate_assessment(&self, record: &AssessmentRecord) -> Result<Evaluation> {
        if self.offline || !inference_available() {
            info!("inference unavailable, using completeness score");
            return Ok(fallback_evaluation(record));
        }

        let prompt = serde_json::to_string_pretty(record)?;
        let response = complete(EVALUATION_PREAMBLE, &prompt).await?;

        let mut evaluation = extract_json(&response)
            .and_then(|payload| serde_json::from_str::<Evaluation>(payload).ok())
            .unwrap_or_else(|| {
                warn!("unparseable evaluation response, using completeness score");
                fallback_evaluation(record)
            });
        evaluation.quality_score = evaluation.quality_score.clamp(0.0, 1.0);
        Ok(evaluation)
    }
}

// Quality from section completeness: each populated stage output contributes
// a fixed share.
fn fallback_evaluation(record: &AssessmentRecord) -> Evaluation {
    let mut score: f64 = 0.0;
    let mut strengths = Vec::new();
    let mut concerns = Vec::new();

    if !record.symptoms.is_empty() {
        score += 0.1;
    }
    if record.medical_data.is_some() {
        score += 0.2;
        strengths.push("Knowledge base data retrieved".to_string());
    } else {
        concerns.push("No medical data lookup performed".to_string());
    }
    match record.diagnoses.as_deref() {
        Some([]) => concerns.push("Diagnosis stage produced no candidates".to_string()),
        Some(_) => {
            score += 0.3;
            strengths.push("Differential diagnoses generated".to_string());
        }
        None => concerns.push("Diagnosis stage did not run".to_string()),
    }
    if record.reasoning.is_some() {
        score += 0.2;
        strengths.push("Diagnoses validated by reasoning step".to_string());
    } else {
        concerns.push("Diagnoses not validated".to_string());
    }
    if record.treatments.as_deref().is_some_and(|t| !t.is_empty()) {
        score += 0.2;
        strengths.push("Treatment recommendations present".to_string());
    } else {
        concerns.push("No treatment recommendations".to_string());
    }

    Evaluation {
        status: "evaluated".to_string(),
        quality_score: score.clamp(0.0, 1.0),
        assessment: format!(
            "Completeness-based evaluation: {} of 5 sections populated",
            strengths.len() + usize::from(!record.symptoms.is_empty())
        ),
        strengths,
        concerns,
    }
}
