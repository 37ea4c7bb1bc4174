use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use assessment_flow::{Diagnosis, Result, Treatment, TreatmentKind, TreatmentStage, record};

use super::utils::{complete, extract_json, inference_available};

const MAX_TREATMENTS: usize = 10;

const TREATMENT_PREAMBLE: &str = r#"You are a medical treatment advisor. Recommend treatments for
the given diagnoses, taking patient allergies and history into account.

Respond with ONLY a JSON array, one object per recommendation:
[{"type": "medication|test|lifestyle|consultation", "recommendation": "...", "justification": "...", "confidence": 0.0}]"#;

/// Treatment stage backed by the inference service, with conservative
/// consultation/test recommendations when inference is unreachable.
pub struct LlmTreatmentStage {
    offline: bool,
}

impl LlmTreatmentStage {
    pub fn new() -> Self {
        Self { offline: false }
    }

    pub fn offline() -> Self {
        Self { offline: true }
    }
}

impl Default for LlmTreatmentStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreatmentStage for LlmTreatmentStage {
    async fn recommend_treatments(
        &self,
        diagnoses: &[Diagnosis],
        patient: &Value,
    ) -> Result<Vec<Treatment>> {
        if self.offline || !inference_available() {
            info!("inference unavailable, using conservative recommendations");
            return Ok(fallback_treatments(diagnoses, patient));
        }

        let prompt = format!(
            "Diagnoses:\n{}\n\nPatient allergies: {}\nPatient history: {}",
            serde_json::to_string_pretty(diagnoses)?,
            field_text(patient, "allergies"),
            field_text(patient, "medical_history"),
        );
        let response = complete(TREATMENT_PREAMBLE, &prompt).await?;

        let mut treatments = extract_json(&response)
            .and_then(|payload| serde_json::from_str::<Vec<Treatment>>(payload).ok())
            .unwrap_or_else(|| {
                warn!("unparseable treatment response, using conservative recommendations");
                fallback_treatments(diagnoses, patient)
            });
        treatments.truncate(MAX_TREATMENTS);

        info!(count = treatments.len(), "recommended treatments");
        Ok(treatments)
    }
}

fn field_text(patient: &Value, key: &str) -> String {
    record::patient_info(patient)
        .get(key)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "None".to_string())
}

// No medications without a clinician in the loop: the offline path limits
// itself to consultation, testing and lifestyle advice.
fn fallback_treatments(diagnoses: &[Diagnosis], patient: &Value) -> Vec<Treatment> {
    let mut treatments = Vec::new();

    if let Some(top) = diagnoses.first() {
        treatments.push(Treatment {
            kind: TreatmentKind::Consultation,
            recommendation: format!("Consult a physician regarding {}", top.disease),
            justification: format!(
                "Leading diagnosis at {:.0}% confidence requires clinical confirmation",
                top.confidence_score * 100.0
            ),
            confidence: top.confidence_score,
        });
    }

    for diagnosis in diagnoses.iter().take(2) {
        treatments.push(Treatment {
            kind: TreatmentKind::Test,
            recommendation: format!("Confirmatory testing for {}", diagnosis.disease),
            justification: "Differential diagnosis needs laboratory confirmation".to_string(),
            confidence: diagnosis.confidence_score,
        });
    }

    if !diagnoses.is_empty() {
        let has_allergies = !record::patient_info(patient)
            .get("allergies")
            .map(value_is_empty)
            .unwrap_or(true);
        treatments.push(Treatment {
            kind: TreatmentKind::Lifestyle,
            recommendation: "Rest and adequate hydration".to_string(),
            justification: if has_allergies {
                "General supportive care; medication selection deferred due to documented allergies"
                    .to_string()
            } else {
                "General supportive care while diagnosis is confirmed".to_string()
            },
            confidence: 0.9,
        });
    }

    treatments.truncate(MAX_TREATMENTS);
    treatments
}

fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Null => true,
        _ => false,
    }
}
