use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::record::{
    AssessmentRecord, Diagnosis, Evaluation, MedicalData, ReasoningOutcome, Symptom, Treatment,
};

/// Looks up diseases, risk factors and treatment leads for a symptom list.
#[async_trait]
pub trait DataStage: Send + Sync {
    async fn fetch_medical_data(&self, symptoms: &[String]) -> Result<MedicalData>;
}

/// Produces differential diagnoses, highest confidence first, capped at 5
/// entries with confidence never above 0.95.
#[async_trait]
pub trait DiagnosisStage: Send + Sync {
    async fn generate_diagnoses(
        &self,
        symptoms: &[Symptom],
        medical_data: Option<&MedicalData>,
        patient: &Value,
    ) -> Result<Vec<Diagnosis>>;
}

/// Validates the diagnosis list against the reported symptoms.
#[async_trait]
pub trait ReasoningStage: Send + Sync {
    async fn validate_diagnoses(
        &self,
        diagnoses: &[Diagnosis],
        symptoms: &[Symptom],
    ) -> Result<ReasoningOutcome>;
}

/// Recommends treatments for the diagnosis list, capped at 10 entries.
#[async_trait]
pub trait TreatmentStage: Send + Sync {
    async fn recommend_treatments(
        &self,
        diagnoses: &[Diagnosis],
        patient: &Value,
    ) -> Result<Vec<Treatment>>;
}

/// Scores the quality of the full assessment record.
#[async_trait]
pub trait EvaluationStage: Send + Sync {
    async fn evaluate_assessment(&self, record: &AssessmentRecord) -> Result<Evaluation>;
}

/// The set of stage capabilities available to one orchestrator run.
///
/// A `None` slot means the capability is absent: the orchestrator skips that
/// stage and its record field stays unset.
#[derive(Clone, Default)]
pub struct StageSet {
    pub data: Option<Arc<dyn DataStage>>,
    pub diagnosis: Option<Arc<dyn DiagnosisStage>>,
    pub reasoning: Option<Arc<dyn ReasoningStage>>,
    pub treatment: Option<Arc<dyn TreatmentStage>>,
    pub evaluation: Option<Arc<dyn EvaluationStage>>,
}

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, stage: Arc<dyn DataStage>) -> Self {
        self.data = Some(stage);
        self
    }

    pub fn with_diagnosis(mut self, stage: Arc<dyn DiagnosisStage>) -> Self {
        self.diagnosis = Some(stage);
        self
    }

    pub fn with_reasoning(mut self, stage: Arc<dyn ReasoningStage>) -> Self {
        self.reasoning = Some(stage);
        self
    }

    pub fn with_treatment(mut self, stage: Arc<dyn TreatmentStage>) -> Self {
        self.treatment = Some(stage);
        self
    }

    pub fn with_evaluation(mut self, stage: Arc<dyn EvaluationStage>) -> Self {
        self.evaluation = Some(stage);
        self
    }
}
