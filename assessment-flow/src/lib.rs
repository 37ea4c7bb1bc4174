pub mod approval;
pub mod error;
pub mod intervention;
pub mod knowledge;
pub mod orchestrator;
pub mod record;
pub mod review;
pub mod stage;
pub mod validation;

// Re-export commonly used types
pub use approval::{
    ApprovalManager, ApprovalRequest, ApprovalStatus, ApprovalStatusSummary, HistoryEvent,
};
pub use error::{AssessmentError, Result};
pub use intervention::{
    DEFAULT_CONFIDENCE_THRESHOLD, Decision, InterventionKind, InterventionManager,
    InterventionReport, InterventionRequest, InterventionStatus, Priority,
};
pub use knowledge::{
    AllergyRecord, DiseaseRecord, DrugInteraction, InMemoryKnowledgeStore, KnowledgeStore,
};
pub use orchestrator::StageOrchestrator;
pub use record::{
    AssessmentRecord, Diagnosis, Evaluation, FinalSummary, MedicalData, ReasoningOutcome,
    RunStatus, Severity, Symptom, Treatment, TreatmentKind,
};
pub use review::{FindingSeverity, Review, ReviewHandler, ReviewStatus, ReviewSummary};
pub use stage::{
    DataStage, DiagnosisStage, EvaluationStage, ReasoningStage, StageSet, TreatmentStage,
};
