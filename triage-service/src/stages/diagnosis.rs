use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use assessment_flow::{Diagnosis, DiagnosisStage, MedicalData, Result, Symptom, record};

use super::utils::{complete, extract_json, inference_available};

const MAX_DIAGNOSES: usize = 5;
const MAX_CONFIDENCE: f64 = 0.95;

const DIAGNOSIS_PREAMBLE: &str = r#"You are an expert medical diagnostic assistant.
Analyze the patient's symptoms against the candidate diseases and produce
differential diagnoses.

Guidelines:
- Never exceed 0.95 confidence
- Provide 2-5 most likely diagnoses, highest confidence first
- Be honest about diagnostic uncertainty

Respond with ONLY a JSON array, one object per diagnosis:
[{"disease": "...", "confidence_score": 0.0, "key_indicators": ["..."], "supporting_evidence": ["..."]}]"#;

/// Diagnosis stage backed by the inference service, with a deterministic
/// knowledge-base differential when inference is unreachable.
pub struct LlmDiagnosisStage {
    offline: bool,
}

impl LlmDiagnosisStage {
    pub fn new() -> Self {
        Self { offline: false }
    }

    /// Always use the knowledge-based fallback. Used by tests and air-gapped
    /// deployments.
    pub fn offline() -> Self {
        Self { offline: true }
    }
}

impl Default for LlmDiagnosisStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiagnosisStage for LlmDiagnosisStage {
    async fn generate_diagnoses(
        &self,
        symptoms: &[Symptom],
        medical_data: Option<&MedicalData>,
        patient: &Value,
    ) -> Result<Vec<Diagnosis>> {
        if self.offline || !inference_available() {
            info!("inference unavailable, using knowledge-based differential");
            return Ok(normalize(fallback_diagnoses(symptoms, medical_data)));
        }

        let prompt = build_prompt(symptoms, medical_data, patient);
        let response = complete(DIAGNOSIS_PREAMBLE, &prompt).await?;
        let diagnoses = parse_diagnoses(&response).unwrap_or_else(|| {
            warn!("unparseable diagnosis response, using knowledge-based differential");
            fallback_diagnoses(symptoms, medical_data)
        });

        info!(count = diagnoses.len(), "generated diagnoses");
        Ok(normalize(diagnoses))
    }
}

fn build_prompt(symptoms: &[Symptom], medical_data: Option<&MedicalData>, patient: &Value) -> String {
    let info = record::patient_info(patient);
    let symptom_lines: Vec<String> = symptoms
        .iter()
        .map(|s| format!("- {} (severity: {:?}, {} days)", s.name, s.severity, s.duration_days))
        .collect();
    let disease_lines: Vec<String> = medical_data
        .map(|d| d.diseases.iter().map(|d| format!("- {}", d.name)).collect())
        .unwrap_or_default();

    format!(
        "Patient:\n- Age: {}\n- Gender: {}\n- Medical history: {}\n\nSymptoms:\n{}\n\nCandidate diseases from the knowledge base:\n{}",
        info.get("age").map(|v| v.to_string()).unwrap_or_else(|| "Unknown".to_string()),
        info.get("gender").and_then(Value::as_str).unwrap_or("Unknown"),
        info.get("medical_history")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "None".to_string()),
        symptom_lines.join("\n"),
        disease_lines.join("\n"),
    )
}

fn parse_diagnoses(response: &str) -> Option<Vec<Diagnosis>> {
    let payload = extract_json(response)?;
    serde_json::from_str(payload).ok()
}

/// Clamp confidence into range, order highest first, cap the list length.
fn normalize(mut diagnoses: Vec<Diagnosis>) -> Vec<Diagnosis> {
    for diagnosis in &mut diagnoses {
        diagnosis.confidence_score = diagnosis.confidence_score.clamp(0.0, MAX_CONFIDENCE);
    }
    diagnoses.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    diagnoses.truncate(MAX_DIAGNOSES);
    diagnoses
}

// Symptom-overlap scoring against the knowledge-base candidates.
fn fallback_diagnoses(symptoms: &[Symptom], medical_data: Option<&MedicalData>) -> Vec<Diagnosis> {
    let Some(data) = medical_data else {
        return Vec::new();
    };
    let reported: Vec<String> = symptoms.iter().map(|s| s.name.to_lowercase()).collect();

    data.diseases
        .iter()
        .filter_map(|disease| {
            let matched: Vec<String> = disease
                .symptoms
                .iter()
                .filter(|s| reported.contains(&s.to_lowercase()))
                .cloned()
                .collect();
            if matched.is_empty() || disease.symptoms.is_empty() {
                return None;
            }
            let overlap = matched.len() as f64 / disease.symptoms.len() as f64;
            Some(Diagnosis {
                disease: disease.name.clone(),
                confidence_score: (0.35 + 0.5 * overlap).min(MAX_CONFIDENCE),
                key_indicators: matched,
                supporting_evidence: vec![format!(
                    "Symptom pattern overlaps knowledge base entry for {}",
                    disease.name
                )],
            })
        })
        .collect()
}
