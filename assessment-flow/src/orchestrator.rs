use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{AssessmentError, Result};
use crate::record::{AssessmentRecord, Diagnosis, FinalSummary, RunStatus, Symptom, patient_info};
use crate::stage::StageSet;
use crate::validation;

/// Sequences the five analysis stages over a shared [`AssessmentRecord`].
///
/// The orchestrator is stateless between calls; all run state lives in the
/// record passed in and out, so concurrent assessments need no locking here.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageOrchestrator;

impl StageOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Build an initialized record from raw patient input.
    ///
    /// Accepts either a flat descriptor or a one-level-nested
    /// `{"patient": {...}}` shape. Validation failures are reported before
    /// anything is applied.
    pub fn initialize(&self, patient_input: Value) -> Result<AssessmentRecord> {
        validation::validate_patient(&patient_input)?;

        let symptoms = parse_symptoms(&patient_input)?;
        validation::validate_symptoms(&symptoms)?;

        let record = AssessmentRecord::new(patient_input, symptoms);
        info!(
            assessment_id = %record.id,
            patient = %record.patient_name().unwrap_or_else(|| "Unknown".to_string()),
            "initialized assessment"
        );
        Ok(record)
    }

    /// Execute all available stages in fixed order and synthesize the final
    /// summary.
    ///
    /// A stage capability that fails aborts the run: the record comes back
    /// with `status = Error` and the failure text preserved. Synthesis
    /// failure is recovered locally with a minimal fallback summary, so a
    /// completed run never lacks a summary.
    pub async fn run(&self, mut record: AssessmentRecord, stages: &StageSet) -> AssessmentRecord {
        info!(assessment_id = %record.id, "starting coordinated assessment");

        match self.run_stages(&mut record, stages).await {
            Ok(()) => {
                let summary = match self.synthesize_summary(&record) {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!(assessment_id = %record.id, error = %e, "summary synthesis failed, using fallback");
                        self.fallback_summary(&record)
                    }
                };
                record.final_summary = Some(summary);
                record.status = RunStatus::Completed;
                info!(assessment_id = %record.id, "assessment completed");
            }
            Err(e) => {
                error!(assessment_id = %record.id, error = %e, "assessment run aborted");
                record.status = RunStatus::Error;
                record.error = Some(e.to_string());
            }
        }

        record
    }

    async fn run_stages(&self, record: &mut AssessmentRecord, stages: &StageSet) -> Result<()> {
        if let Some(data) = &stages.data {
            info!(assessment_id = %record.id, "stage 1: retrieving medical data");
            let names = record.symptom_names();
            record.medical_data = Some(data.fetch_medical_data(&names).await?);
        }

        if let Some(diagnosis) = &stages.diagnosis {
            info!(assessment_id = %record.id, "stage 2: generating diagnoses");
            let diagnoses = diagnosis
                .generate_diagnoses(
                    &record.symptoms,
                    record.medical_data.as_ref(),
                    &record.patient,
                )
                .await?;
            record.diagnoses = Some(diagnoses);
        }

        if let Some(reasoning) = &stages.reasoning {
            info!(assessment_id = %record.id, "stage 3: applying medical reasoning");
            let diagnoses = record.diagnoses.clone().unwrap_or_default();
            record.reasoning = Some(
                reasoning
                    .validate_diagnoses(&diagnoses, &record.symptoms)
                    .await?,
            );
        }

        if let Some(treatment) = &stages.treatment {
            info!(assessment_id = %record.id, "stage 4: recommending treatments");
            let diagnoses = record.diagnoses.clone().unwrap_or_default();
            record.treatments = Some(
                treatment
                    .recommend_treatments(&diagnoses, &record.patient)
                    .await?,
            );
        }

        if let Some(evaluation) = &stages.evaluation {
            info!(assessment_id = %record.id, "stage 5: evaluating assessment quality");
            record.evaluation = Some(evaluation.evaluate_assessment(record).await?);
        }

        Ok(())
    }

    fn synthesize_summary(&self, record: &AssessmentRecord) -> Result<FinalSummary> {
        let info = patient_info(&record.patient);
        if !info.is_object() {
            return Err(AssessmentError::RecordError(
                "patient descriptor is not an object".to_string(),
            ));
        }

        let diagnoses = record.diagnoses.clone().unwrap_or_default();

        Ok(FinalSummary {
            patient_name: info
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            assessment_date: Some(Utc::now()),
            symptoms_analyzed: record.symptom_names(),
            probable_diagnoses: diagnoses.iter().take(3).cloned().collect(),
            treatments: record.treatments.clone().unwrap_or_default(),
            diagnostic_tests: extract_tests(&diagnoses),
            next_steps: generate_next_steps(&diagnoses),
            safety_warnings: extract_warnings(info),
            quality_score: record
                .evaluation
                .as_ref()
                .map(|e| e.quality_score)
                .unwrap_or(0.0),
        })
    }

    // Minimal summary built only from already-known fields. Used when
    // synthesis fails so callers never see a missing summary on a completed
    // run.
    fn fallback_summary(&self, record: &AssessmentRecord) -> FinalSummary {
        FinalSummary {
            patient_name: None,
            assessment_date: None,
            symptoms_analyzed: record.symptom_names(),
            probable_diagnoses: record.diagnoses.clone().unwrap_or_default(),
            treatments: record.treatments.clone().unwrap_or_default(),
            diagnostic_tests: Vec::new(),
            next_steps: Vec::new(),
            safety_warnings: Vec::new(),
            quality_score: 0.0,
        }
    }
}

fn parse_symptoms(patient_input: &Value) -> Result<Vec<Symptom>> {
    let raw = patient_input
        .get("symptoms")
        .or_else(|| patient_info(patient_input).get("symptoms"))
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));

    serde_json::from_value(raw)
        .map_err(|e| AssessmentError::Validation(format!("Malformed symptom list: {e}")))
}

// One derived test per top-2 diagnosis.
fn extract_tests(diagnoses: &[Diagnosis]) -> Vec<String> {
    diagnoses
        .iter()
        .take(2)
        .filter(|d| !d.disease.is_empty())
        .map(|d| format!("Test for {}", d.disease))
        .collect()
}

// Omitted entirely when there are no diagnoses.
fn generate_next_steps(diagnoses: &[Diagnosis]) -> Vec<String> {
    match diagnoses.first() {
        Some(top) => vec![
            format!("Confirm diagnosis: {}", top.disease),
            "Complete recommended diagnostic tests".to_string(),
            "Schedule follow-up consultation".to_string(),
            "Monitor symptoms".to_string(),
        ],
        None => Vec::new(),
    }
}

fn extract_warnings(patient: &Value) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(allergies) = non_empty_field(patient, "allergies") {
        warnings.push(format!("Allergies: {allergies}"));
    }
    if let Some(history) = non_empty_field(patient, "medical_history") {
        warnings.push(format!("Medical history: {history}"));
    }

    warnings
}

// Accepts both list and plain-string field shapes.
fn non_empty_field(patient: &Value, key: &str) -> Option<String> {
    match patient.get(key)? {
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::record::{
        Diagnosis, Evaluation, MedicalData, ReasoningOutcome, Treatment, TreatmentKind,
    };
    use crate::stage::{
        DataStage, DiagnosisStage, EvaluationStage, ReasoningStage, TreatmentStage,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct FixedData;

    #[async_trait]
    impl DataStage for FixedData {
        async fn fetch_medical_data(&self, symptoms: &[String]) -> Result<MedicalData> {
            Ok(MedicalData {
                symptoms_found: symptoms.to_vec(),
                risk_factors: vec!["dehydration".to_string()],
                ..Default::default()
            })
        }
    }

    struct FixedDiagnosis {
        diagnoses: Vec<Diagnosis>,
    }

    #[async_trait]
    impl DiagnosisStage for FixedDiagnosis {
        async fn generate_diagnoses(
            &self,
            _symptoms: &[Symptom],
            _medical_data: Option<&MedicalData>,
            _patient: &Value,
        ) -> Result<Vec<Diagnosis>> {
            Ok(self.diagnoses.clone())
        }
    }

    struct FixedReasoning;

    #[async_trait]
    impl ReasoningStage for FixedReasoning {
        async fn validate_diagnoses(
            &self,
            diagnoses: &[Diagnosis],
            _symptoms: &[Symptom],
        ) -> Result<ReasoningOutcome> {
            Ok(ReasoningOutcome {
                status: "validated".to_string(),
                reasoning: "Consistent with reported symptoms".to_string(),
                adjusted_diagnoses: diagnoses.to_vec(),
            })
        }
    }

    struct FixedTreatment;

    #[async_trait]
    impl TreatmentStage for FixedTreatment {
        async fn recommend_treatments(
            &self,
            _diagnoses: &[Diagnosis],
            _patient: &Value,
        ) -> Result<Vec<Treatment>> {
            Ok(vec![Treatment {
                kind: TreatmentKind::Medication,
                recommendation: "Paracetamol for fever".to_string(),
                justification: "Symptomatic relief".to_string(),
                confidence: 0.8,
            }])
        }
    }

    struct FixedEvaluation;

    #[async_trait]
    impl EvaluationStage for FixedEvaluation {
        async fn evaluate_assessment(&self, _record: &AssessmentRecord) -> Result<Evaluation> {
            Ok(Evaluation {
                status: "evaluated".to_string(),
                quality_score: 0.85,
                assessment: String::new(),
                strengths: Vec::new(),
                concerns: Vec::new(),
            })
        }
    }

    struct FailingTreatment;

    #[async_trait]
    impl TreatmentStage for FailingTreatment {
        async fn recommend_treatments(
            &self,
            _diagnoses: &[Diagnosis],
            _patient: &Value,
        ) -> Result<Vec<Treatment>> {
            Err(AssessmentError::StageFailed(
                "inference backend unavailable".to_string(),
            ))
        }
    }

    fn diagnosis(disease: &str, confidence: f64) -> Diagnosis {
        Diagnosis {
            disease: disease.to_string(),
            confidence_score: confidence,
            key_indicators: Vec::new(),
            supporting_evidence: Vec::new(),
        }
    }

    fn sample_patient() -> Value {
        json!({
            "name": "Test Patient",
            "age": 35,
            "gender": "Male",
            "allergies": ["Penicillin"],
            "medical_history": ["Hypertension", "Type 2 Diabetes"],
            "symptoms": [
                {"name": "fever", "severity": "moderate", "duration_days": 3},
                {"name": "cough", "severity": "mild", "duration_days": 2}
            ]
        })
    }

    fn full_stages(diagnoses: Vec<Diagnosis>) -> StageSet {
        StageSet::new()
            .with_data(Arc::new(FixedData))
            .with_diagnosis(Arc::new(FixedDiagnosis { diagnoses }))
            .with_reasoning(Arc::new(FixedReasoning))
            .with_treatment(Arc::new(FixedTreatment))
            .with_evaluation(Arc::new(FixedEvaluation))
    }

    #[test]
    fn initialize_builds_record_from_flat_input() {
        let record = StageOrchestrator::new()
            .initialize(sample_patient())
            .unwrap();

        assert_eq!(record.status, RunStatus::Initialized);
        assert_eq!(record.symptoms.len(), 2);
        assert_eq!(record.patient_name().as_deref(), Some("Test Patient"));
        assert!(record.medical_data.is_none());
        assert!(record.final_summary.is_none());
    }

    #[test]
    fn initialize_extracts_name_from_nested_shape() {
        let input = json!({
            "patient": {"name": "Nested Patient", "age": 40, "gender": "F"},
            "symptoms": [{"name": "headache"}]
        });
        let record = StageOrchestrator::new().initialize(input).unwrap();
        assert_eq!(record.patient_name().as_deref(), Some("Nested Patient"));
    }

    #[test]
    fn initialize_rejects_invalid_input() {
        let orchestrator = StageOrchestrator::new();
        assert!(orchestrator.initialize(json!({"age": 35})).is_err());
        assert!(
            orchestrator
                .initialize(json!({"name": "No Symptoms", "age": 35, "gender": "M"}))
                .is_err()
        );
    }

    #[tokio::test]
    async fn full_run_completes_with_summary() {
        let orchestrator = StageOrchestrator::new();
        let record = orchestrator.initialize(sample_patient()).unwrap();
        let diagnoses = vec![
            diagnosis("Dengue Fever", 0.83),
            diagnosis("Influenza", 0.65),
            diagnosis("Common Cold", 0.40),
            diagnosis("Malaria", 0.20),
        ];

        let record = orchestrator.run(record, &full_stages(diagnoses)).await;

        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.error.is_none());

        let summary = record.final_summary.expect("summary must be present");
        assert_eq!(summary.patient_name.as_deref(), Some("Test Patient"));
        assert_eq!(summary.probable_diagnoses.len(), 3);
        assert_eq!(summary.probable_diagnoses[0].disease, "Dengue Fever");
        assert_eq!(
            summary.diagnostic_tests,
            vec!["Test for Dengue Fever", "Test for Influenza"]
        );
        assert_eq!(summary.next_steps.len(), 4);
        assert_eq!(summary.next_steps[0], "Confirm diagnosis: Dengue Fever");
        assert_eq!(summary.quality_score, 0.85);
        assert_eq!(
            summary.safety_warnings,
            vec![
                "Allergies: Penicillin",
                "Medical history: Hypertension, Type 2 Diabetes"
            ]
        );
    }

    #[tokio::test]
    async fn empty_diagnoses_produce_empty_summary_sections() {
        let orchestrator = StageOrchestrator::new();
        let record = orchestrator.initialize(sample_patient()).unwrap();

        let record = orchestrator.run(record, &full_stages(Vec::new())).await;

        assert_eq!(record.status, RunStatus::Completed);
        let summary = record.final_summary.unwrap();
        assert!(summary.probable_diagnoses.is_empty());
        assert!(summary.diagnostic_tests.is_empty());
        assert!(summary.next_steps.is_empty());
    }

    #[tokio::test]
    async fn absent_capabilities_are_skipped() {
        let orchestrator = StageOrchestrator::new();
        let record = orchestrator.initialize(sample_patient()).unwrap();

        let stages = StageSet::new().with_diagnosis(Arc::new(FixedDiagnosis {
            diagnoses: vec![diagnosis("Influenza", 0.7)],
        }));
        let record = orchestrator.run(record, &stages).await;

        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.medical_data.is_none());
        assert!(record.treatments.is_none());
        assert!(record.evaluation.is_none());

        let summary = record.final_summary.unwrap();
        assert_eq!(summary.probable_diagnoses.len(), 1);
        // evaluation skipped, score defaults
        assert_eq!(summary.quality_score, 0.0);
    }

    #[tokio::test]
    async fn stage_failure_aborts_the_run() {
        let orchestrator = StageOrchestrator::new();
        let record = orchestrator.initialize(sample_patient()).unwrap();

        let mut stages = full_stages(vec![diagnosis("Influenza", 0.7)]);
        stages.treatment = Some(Arc::new(FailingTreatment));
        let record = orchestrator.run(record, &stages).await;

        assert_eq!(record.status, RunStatus::Error);
        assert!(
            record
                .error
                .as_deref()
                .unwrap()
                .contains("inference backend unavailable")
        );
        // earlier stage output is preserved, later stages never ran
        assert!(record.diagnoses.is_some());
        assert!(record.treatments.is_none());
        assert!(record.evaluation.is_none());
        assert!(record.final_summary.is_none());
    }

    #[tokio::test]
    async fn synthesis_failure_falls_back_to_minimal_summary() {
        let orchestrator = StageOrchestrator::new();
        // A hand-built record whose patient descriptor defeats synthesis.
        let mut record = AssessmentRecord::new(
            json!("opaque"),
            vec![Symptom {
                name: "fever".to_string(),
                severity: crate::record::Severity::Severe,
                duration_days: 2,
                details: String::new(),
            }],
        );
        record.diagnoses = Some(vec![diagnosis("Dengue Fever", 0.8)]);

        let record = orchestrator.run(record, &StageSet::new()).await;

        assert_eq!(record.status, RunStatus::Completed);
        let summary = record.final_summary.expect("fallback summary must exist");
        assert!(summary.patient_name.is_none());
        assert!(summary.assessment_date.is_none());
        assert_eq!(summary.symptoms_analyzed, vec!["fever"]);
        assert_eq!(summary.probable_diagnoses.len(), 1);
        assert_eq!(summary.quality_score, 0.0);
    }
}
