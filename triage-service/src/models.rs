use serde::{Deserialize, Serialize};
use serde_json::Value;

use assessment_flow::{FindingSeverity, FinalSummary, Priority, RunStatus};

/// Response for a completed assessment run, including any intervention
/// requests the flagging rules opened.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssessmentRunResponse {
    pub assessment_id: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub final_summary: Option<FinalSummary>,
    pub flags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignRequest {
    pub reviewer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentRequest {
    pub text: String,
    pub reviewer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveInterventionRequest {
    pub reviewer: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectInterventionRequest {
    pub reviewer: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EscalateRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingParams {
    pub priority: Option<Priority>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateApprovalRequest {
    pub assessment_id: String,
    pub required_level: String,
    #[serde(default)]
    pub assessment_data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalSignoffRequest {
    pub level: String,
    pub actor: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalRejectionRequest {
    pub level: String,
    pub actor: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReviewRequest {
    pub intervention_id: String,
    pub reviewer: String,
    #[serde(default)]
    pub assessment_data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FindingRequest {
    pub text: String,
    pub severity: FindingSeverity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub text: String,
    pub field: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub text: String,
    pub action_type: String,
}
