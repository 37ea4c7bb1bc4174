use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::knowledge::DiseaseRecord;

/// Severity of a reported symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Moderate
    }
}

/// One symptom as reported by the patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symptom {
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub duration_days: u32,
    #[serde(default)]
    pub details: String,
}

/// Output of the data-lookup stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicalData {
    pub diseases: Vec<DiseaseRecord>,
    pub symptoms_found: Vec<String>,
    pub risk_factors: Vec<String>,
    pub treatments: Vec<String>,
}

/// One differential diagnosis, highest confidence first in the stage output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub disease: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub key_indicators: Vec<String>,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
}

/// Output of the reasoning/validation stage. The `status` field is the
/// collaborator's own wording and is carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningOutcome {
    pub status: String,
    pub reasoning: String,
    #[serde(default)]
    pub adjusted_diagnoses: Vec<Diagnosis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentKind {
    Medication,
    Test,
    Lifestyle,
    Consultation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(rename = "type")]
    pub kind: TreatmentKind,
    pub recommendation: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Output of the quality-evaluation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: String,
    pub quality_score: f64,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// Synthesized end-of-run summary. Always present on a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalSummary {
    pub patient_name: Option<String>,
    pub assessment_date: Option<DateTime<Utc>>,
    pub symptoms_analyzed: Vec<String>,
    pub probable_diagnoses: Vec<Diagnosis>,
    pub treatments: Vec<Treatment>,
    pub diagnostic_tests: Vec<String>,
    pub next_steps: Vec<String>,
    pub safety_warnings: Vec<String>,
    pub quality_score: f64,
}

/// Overall outcome of a run. Transitions exactly once,
/// `Initialized -> {Completed, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Initialized,
    Completed,
    Error,
}

/// The mutable record threaded through all stages of one assessment.
///
/// Each stage field starts `None` and is populated by exactly one stage, in
/// stage order. `None` means the stage has not run; a stage that ran but
/// produced nothing stores an empty value instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub id: String,
    pub patient: Value,
    pub symptoms: Vec<Symptom>,
    pub medical_data: Option<MedicalData>,
    pub diagnoses: Option<Vec<Diagnosis>>,
    pub reasoning: Option<ReasoningOutcome>,
    pub treatments: Option<Vec<Treatment>>,
    pub evaluation: Option<Evaluation>,
    pub final_summary: Option<FinalSummary>,
    pub status: RunStatus,
    pub error: Option<String>,
}

impl AssessmentRecord {
    pub fn new(patient: Value, symptoms: Vec<Symptom>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            patient,
            symptoms,
            medical_data: None,
            diagnoses: None,
            reasoning: None,
            treatments: None,
            evaluation: None,
            final_summary: None,
            status: RunStatus::Initialized,
            error: None,
        }
    }

    pub fn symptom_names(&self) -> Vec<String> {
        self.symptoms.iter().map(|s| s.name.clone()).collect()
    }

    /// Patient descriptor with one level of `{"patient": {...}}` nesting
    /// unwrapped, matching what intake forms submit.
    pub fn patient_info(&self) -> &Value {
        patient_info(&self.patient)
    }

    pub fn patient_name(&self) -> Option<String> {
        self.patient_info()
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Unwrap a one-level-nested `{"patient": {...}}` descriptor.
pub fn patient_info(patient: &Value) -> &Value {
    match patient.get("patient") {
        Some(inner) if inner.is_object() => inner,
        _ => patient,
    }
}
