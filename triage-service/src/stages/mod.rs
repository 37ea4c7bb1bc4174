// Inference-backed stage capabilities wired into the orchestrator.
pub mod data;
pub mod diagnosis;
pub mod evaluation;
pub mod reasoning;
pub mod treatment;

// Shared modules
pub mod format;
pub mod utils;

use std::sync::Arc;

use assessment_flow::{KnowledgeStore, StageSet};

pub use data::KnowledgeDataStage;
pub use diagnosis::LlmDiagnosisStage;
pub use evaluation::LlmEvaluationStage;
pub use reasoning::LlmReasoningStage;
pub use treatment::LlmTreatmentStage;

/// Wire the full capability set: knowledge-backed data lookup plus the four
/// inference-backed stages.
pub fn build_stage_set(knowledge: Option<Arc<dyn KnowledgeStore>>) -> StageSet {
    StageSet::new()
        .with_data(Arc::new(KnowledgeDataStage::new(knowledge)))
        .with_diagnosis(Arc::new(LlmDiagnosisStage::new()))
        .with_reasoning(Arc::new(LlmReasoningStage::new()))
        .with_treatment(Arc::new(LlmTreatmentStage::new()))
        .with_evaluation(Arc::new(LlmEvaluationStage::new()))
}

/// Same wiring with inference forced off; every stage uses its deterministic
/// fallback. Used by tests and air-gapped deployments.
pub fn build_offline_stage_set(knowledge: Option<Arc<dyn KnowledgeStore>>) -> StageSet {
    StageSet::new()
        .with_data(Arc::new(KnowledgeDataStage::new(knowledge)))
        .with_diagnosis(Arc::new(LlmDiagnosisStage::offline()))
        .with_reasoning(Arc::new(LlmReasoningStage::offline()))
        .with_treatment(Arc::new(LlmTreatmentStage::offline()))
        .with_evaluation(Arc::new(LlmEvaluationStage::offline()))
}
