use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use dashmap::DashMap;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use assessment_flow::{
    ApprovalManager, AssessmentError, AssessmentRecord, DEFAULT_CONFIDENCE_THRESHOLD,
    DiseaseRecord, FindingSeverity, InMemoryKnowledgeStore, InterventionManager, KnowledgeStore,
    ReviewHandler, RunStatus, Severity, StageOrchestrator, StageSet,
};

use crate::models::{
    ApprovalRejectionRequest, ApprovalSignoffRequest, ApproveInterventionRequest, AssignRequest,
    AssessmentRunResponse, CommentRequest, CreateApprovalRequest, CreateReviewRequest,
    EscalateRequest, FindingRequest, PendingParams, QuestionRequest, RecommendationRequest,
    RejectInterventionRequest,
};
use crate::stages::{build_stage_set, format::render_report};

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn conflict_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: StageOrchestrator,
    pub stages: StageSet,
    pub records: Arc<DashMap<String, AssessmentRecord>>,
    pub interventions: Arc<InterventionManager>,
    pub approvals: Arc<ApprovalManager>,
    pub reviews: Arc<ReviewHandler>,
}

impl AppState {
    pub fn new(stages: StageSet) -> Self {
        Self {
            orchestrator: StageOrchestrator::new(),
            stages,
            records: Arc::new(DashMap::new()),
            interventions: Arc::new(InterventionManager::new()),
            approvals: Arc::new(ApprovalManager::new()),
            reviews: Arc::new(ReviewHandler::new()),
        }
    }
}

pub async fn create_app() -> Router {
    let state = AppState::new(build_stage_set(load_knowledge_store()));
    build_router(state)
}

fn load_knowledge_store() -> Option<Arc<dyn KnowledgeStore>> {
    let path = std::env::var("KNOWLEDGE_BASE_FILE").ok()?;
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(%path, error = %e, "knowledge base file not readable");
            return None;
        }
    };
    match serde_json::from_str::<Vec<DiseaseRecord>>(&contents) {
        Ok(diseases) => {
            let store = InMemoryKnowledgeStore::new();
            let count = diseases.len();
            for disease in diseases {
                store.add_disease(disease);
            }
            info!(%path, diseases = count, "loaded knowledge base");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(%path, error = %e, "malformed knowledge base file");
            None
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/assessments", post(start_assessment))
        .route("/assessments/{id}", get(get_assessment))
        .route("/assessments/{id}/report", get(get_assessment_report))
        .route("/interventions/pending", get(pending_interventions))
        .route("/interventions/urgent", get(urgent_interventions))
        .route("/interventions/report", get(intervention_report))
        .route("/interventions/{id}", get(get_intervention))
        .route("/interventions/{id}/assign", post(assign_intervention))
        .route("/interventions/{id}/comments", post(comment_intervention))
        .route("/interventions/{id}/approve", post(approve_intervention))
        .route("/interventions/{id}/reject", post(reject_intervention))
        .route("/interventions/{id}/escalate", post(escalate_intervention))
        .route("/approvals", post(create_approval))
        .route("/approvals/{id}", get(get_approval))
        .route("/approvals/{id}/status", get(approval_status))
        .route("/approvals/{id}/history", get(approval_history))
        .route("/approvals/{id}/can-proceed", get(approval_can_proceed))
        .route("/approvals/{id}/approve", post(approve_at_level))
        .route("/approvals/{id}/reject", post(reject_at_level))
        .route("/reviews", post(create_review))
        .route("/reviews/{id}", get(get_review))
        .route("/reviews/{id}/summary", get(review_summary))
        .route("/reviews/{id}/findings", post(add_finding))
        .route("/reviews/{id}/questions", post(add_question))
        .route("/reviews/{id}/recommendations", post(add_recommendation))
        .route("/reviews/{id}/complete", post(complete_review))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Clinical Triage Service",
        "version": "1.0.0",
        "description": "Staged symptom assessment with human review, approval chains and escalation",
        "endpoints": {
            "POST /assessments": "Run a full assessment for a patient input",
            "GET /assessments/{id}": "Fetch the raw assessment record",
            "GET /assessments/{id}/report": "Fetch a plain-text report",
            "GET /interventions/pending": "List pending intervention requests",
            "POST /approvals": "Open a multi-level sign-off request",
            "POST /reviews": "Open a structured review for an intervention",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ---------------------------------------------------------------------------
// Assessments

async fn start_assessment(
    State(state): State<AppState>,
    Json(patient_input): Json<Value>,
) -> ApiResult<AssessmentRunResponse> {
    let response = execute_assessment(&state, patient_input).await?;
    Ok(Json(response))
}

/// Initialize, run, auto-flag and store one assessment.
pub(crate) async fn execute_assessment(
    state: &AppState,
    patient_input: Value,
) -> Result<AssessmentRunResponse, ApiError> {
    let record = state
        .orchestrator
        .initialize(patient_input)
        .map_err(|e| bad_request_error(&e.to_string()))?;

    let record = state.orchestrator.run(record, &state.stages).await;
    let flags = apply_flagging_rules(state, &record);

    let response = AssessmentRunResponse {
        assessment_id: record.id.clone(),
        status: record.status,
        error: record.error.clone(),
        final_summary: record.final_summary.clone(),
        flags,
    };
    state.records.insert(record.id.clone(), record);
    Ok(response)
}

// The caller-side decision from the governance design: inspect the finished
// record and open interventions per the flagging rules.
pub(crate) fn apply_flagging_rules(state: &AppState, record: &AssessmentRecord) -> Vec<String> {
    if record.status != RunStatus::Completed {
        return Vec::new();
    }

    let data = serde_json::to_value(record).unwrap_or(Value::Null);
    let mut flags = Vec::new();

    let severe: Vec<String> = record
        .symptoms
        .iter()
        .filter(|s| s.severity == Severity::Severe)
        .map(|s| s.name.clone())
        .collect();
    if !severe.is_empty() {
        flags.push(
            state
                .interventions
                .flag_urgent_symptoms(&record.id, data.clone(), &severe),
        );
    }

    if let Some(top) = record.diagnoses.as_deref().and_then(|d| d.first()) {
        if let Some(id) = state.interventions.flag_low_confidence(
            &record.id,
            data.clone(),
            top.confidence_score,
            DEFAULT_CONFIDENCE_THRESHOLD,
        ) {
            flags.push(id);
        }

        // the reasoning stage reordering the leading diagnosis is a contradiction
        // a human should resolve
        if let Some(adjusted_top) = record
            .reasoning
            .as_ref()
            .and_then(|r| r.adjusted_diagnoses.first())
        {
            if adjusted_top.disease != top.disease {
                flags.push(state.interventions.flag_contradictory_diagnosis(
                    &record.id,
                    data.clone(),
                    &[top.disease.clone(), adjusted_top.disease.clone()],
                ));
            }
        }
    }

    if let Some(medical) = &record.medical_data {
        if !medical.risk_factors.is_empty() {
            flags.push(
                state
                    .interventions
                    .flag_high_risk(&record.id, data, &medical.risk_factors),
            );
        }
    }

    flags
}

async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AssessmentRecord> {
    state
        .records
        .get(&id)
        .map(|record| Json(record.clone()))
        .ok_or_else(|| not_found_error("Assessment not found", &id))
}

async fn get_assessment_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    state
        .records
        .get(&id)
        .map(|record| render_report(&record))
        .ok_or_else(|| not_found_error("Assessment not found", &id))
}

// ---------------------------------------------------------------------------
// Interventions

fn intervention_transition(
    state: &AppState,
    id: &str,
    success: bool,
    action: &str,
) -> ApiResult<Value> {
    if success {
        return Ok(Json(json!({"request_id": id, "action": action, "success": true})));
    }
    if state.interventions.get(id).is_none() {
        Err(not_found_error("Intervention request not found", id))
    } else {
        Err(conflict_error("Transition not permitted", id))
    }
}

async fn assign_intervention(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Value> {
    let ok = state.interventions.assign(&id, &request.reviewer);
    intervention_transition(&state, &id, ok, "assign")
}

async fn comment_intervention(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Value> {
    let ok = state
        .interventions
        .add_comment(&id, &request.text, &request.reviewer);
    intervention_transition(&state, &id, ok, "comment")
}

async fn approve_intervention(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ApproveInterventionRequest>,
) -> ApiResult<Value> {
    let ok = state
        .interventions
        .approve(&id, &request.reviewer, &request.notes);
    intervention_transition(&state, &id, ok, "approve")
}

async fn reject_intervention(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RejectInterventionRequest>,
) -> ApiResult<Value> {
    let ok = state
        .interventions
        .reject(&id, &request.reviewer, &request.reason);
    intervention_transition(&state, &id, ok, "reject")
}

async fn escalate_intervention(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EscalateRequest>,
) -> ApiResult<Value> {
    let ok = state.interventions.escalate(&id, &request.reason);
    intervention_transition(&state, &id, ok, "escalate")
}

async fn get_intervention(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<assessment_flow::InterventionRequest> {
    state
        .interventions
        .get(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Intervention request not found", &id))
}

async fn pending_interventions(
    State(state): State<AppState>,
    Query(params): Query<PendingParams>,
) -> Json<Vec<assessment_flow::InterventionRequest>> {
    Json(state.interventions.pending(params.priority))
}

async fn urgent_interventions(
    State(state): State<AppState>,
) -> Json<Vec<assessment_flow::InterventionRequest>> {
    Json(state.interventions.urgent())
}

async fn intervention_report(
    State(state): State<AppState>,
) -> Json<assessment_flow::InterventionReport> {
    Json(state.interventions.report())
}

// ---------------------------------------------------------------------------
// Approvals

async fn create_approval(
    State(state): State<AppState>,
    Json(request): Json<CreateApprovalRequest>,
) -> ApiResult<Value> {
    match state.approvals.create_request(
        &request.assessment_id,
        request.assessment_data,
        &request.required_level,
    ) {
        Ok(approval_id) => Ok(Json(json!({"approval_id": approval_id, "status": "pending"}))),
        Err(AssessmentError::UnknownApprovalLevel(level)) => Err(bad_request_error(&format!(
            "Approval level '{level}' is not in the configured chain ({})",
            state.approvals.chain().join(" -> ")
        ))),
        Err(e) => Err(bad_request_error(&e.to_string())),
    }
}

fn approval_transition(state: &AppState, id: &str, success: bool, action: &str) -> ApiResult<Value> {
    if success {
        return Ok(Json(json!({"approval_id": id, "action": action, "success": true})));
    }
    if state.approvals.get(id).is_none() {
        Err(not_found_error("Approval request not found", id))
    } else {
        Err(conflict_error("Sign-off not permitted", id))
    }
}

async fn approve_at_level(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ApprovalSignoffRequest>,
) -> ApiResult<Value> {
    let ok = state
        .approvals
        .approve_at_level(&id, &request.level, &request.actor, &request.notes);
    approval_transition(&state, &id, ok, "approve")
}

async fn reject_at_level(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ApprovalRejectionRequest>,
) -> ApiResult<Value> {
    let ok = state
        .approvals
        .reject_at_level(&id, &request.level, &request.actor, &request.reason);
    approval_transition(&state, &id, ok, "reject")
}

async fn get_approval(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<assessment_flow::ApprovalRequest> {
    state
        .approvals
        .get(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Approval request not found", &id))
}

async fn approval_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<assessment_flow::ApprovalStatusSummary> {
    state
        .approvals
        .status(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Approval request not found", &id))
}

async fn approval_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<assessment_flow::HistoryEvent>> {
    state
        .approvals
        .history(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Approval request not found", &id))
}

async fn approval_can_proceed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Value> {
    Json(json!({"approval_id": id, "can_proceed": state.approvals.can_proceed(&id)}))
}

// ---------------------------------------------------------------------------
// Reviews

async fn create_review(
    State(state): State<AppState>,
    Json(request): Json<CreateReviewRequest>,
) -> ApiResult<Value> {
    if state.interventions.get(&request.intervention_id).is_none() {
        return Err(not_found_error(
            "Intervention request not found",
            &request.intervention_id,
        ));
    }
    let review_id = state.reviews.create_review(
        &request.intervention_id,
        request.assessment_data,
        &request.reviewer,
    );
    Ok(Json(json!({"review_id": review_id, "status": "in_progress"})))
}

/// Record one finding; a critical finding escalates the linked intervention.
pub(crate) fn submit_finding(
    state: &AppState,
    review_id: &str,
    text: &str,
    severity: FindingSeverity,
) -> Option<bool> {
    if !state.reviews.add_finding(review_id, text, severity) {
        return None;
    }

    let mut escalated = false;
    if severity == FindingSeverity::Critical {
        if let Some(review) = state.reviews.get(review_id) {
            escalated = state
                .interventions
                .escalate(&review.intervention_id, "Critical review finding recorded");
        }
    }
    Some(escalated)
}

async fn add_finding(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FindingRequest>,
) -> ApiResult<Value> {
    match submit_finding(&state, &id, &request.text, request.severity) {
        Some(escalated) => Ok(Json(json!({
            "review_id": id,
            "action": "finding",
            "success": true,
            "intervention_escalated": escalated
        }))),
        None => review_mutation_error(&state, &id),
    }
}

fn review_mutation_error(state: &AppState, id: &str) -> ApiResult<Value> {
    if state.reviews.get(id).is_none() {
        Err(not_found_error("Review not found", id))
    } else {
        Err(conflict_error("Review is completed and immutable", id))
    }
}

async fn add_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<Value> {
    if state
        .reviews
        .add_question(&id, &request.text, request.field.as_deref())
    {
        Ok(Json(json!({"review_id": id, "action": "question", "success": true})))
    } else {
        review_mutation_error(&state, &id)
    }
}

async fn add_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RecommendationRequest>,
) -> ApiResult<Value> {
    if state
        .reviews
        .add_recommendation(&id, &request.text, &request.action_type)
    {
        Ok(Json(json!({"review_id": id, "action": "recommendation", "success": true})))
    } else {
        review_mutation_error(&state, &id)
    }
}

async fn complete_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    if state.reviews.complete(&id) {
        Ok(Json(json!({"review_id": id, "action": "complete", "success": true})))
    } else {
        review_mutation_error(&state, &id)
    }
}

async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<assessment_flow::Review> {
    state
        .reviews
        .get(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Review not found", &id))
}

async fn review_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<assessment_flow::ReviewSummary> {
    state
        .reviews
        .summary(&id)
        .map(Json)
        .ok_or_else(|| not_found_error("Review not found", &id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::build_offline_stage_set;
    use assessment_flow::{InterventionStatus, Priority};
    use serde_json::json;

    fn seeded_store() -> Arc<dyn KnowledgeStore> {
        let store = InMemoryKnowledgeStore::new();
        store.add_disease(DiseaseRecord {
            id: "dengue".to_string(),
            name: "Dengue Fever".to_string(),
            symptoms: vec!["fever".to_string(), "body ache".to_string()],
            risk_factors: vec!["mosquito exposure".to_string()],
            treatments: vec!["fluid replacement".to_string()],
            diagnostic_tests: vec!["NS1 antigen test".to_string()],
            ..Default::default()
        });
        Arc::new(store)
    }

    fn test_state() -> AppState {
        AppState::new(build_offline_stage_set(Some(seeded_store())))
    }

    fn sample_patient() -> Value {
        json!({
            "name": "Jane Roe",
            "age": 29,
            "gender": "F",
            "allergies": ["Penicillin"],
            "symptoms": [
                {"name": "fever", "severity": "severe", "duration_days": 4},
                {"name": "body ache", "severity": "moderate", "duration_days": 3}
            ]
        })
    }

    #[tokio::test]
    async fn assessment_completes_and_flags_offline() {
        let state = test_state();
        let response = execute_assessment(&state, sample_patient()).await.unwrap();

        assert_eq!(response.status, RunStatus::Completed);
        let summary = response.final_summary.expect("summary must be present");
        assert_eq!(summary.probable_diagnoses[0].disease, "Dengue Fever");
        assert_eq!(summary.safety_warnings, vec!["Allergies: Penicillin"]);

        // severe symptom -> urgent flag; risk factors -> high-risk flag
        assert_eq!(response.flags.len(), 2);
        let urgent = state.interventions.urgent();
        assert_eq!(urgent.len(), 1);
        assert!(urgent[0].reason.contains("fever"));

        // the record is stored for later retrieval
        assert!(state.records.contains_key(&response.assessment_id));
    }

    #[tokio::test]
    async fn invalid_patient_input_is_rejected_up_front() {
        let state = test_state();
        let err = execute_assessment(&state, json!({"age": 29}))
            .await
            .err()
            .expect("missing name must be rejected");
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(state.records.is_empty());
        assert_eq!(state.interventions.report().total_interventions, 0);
    }

    #[tokio::test]
    async fn critical_finding_escalates_linked_intervention() {
        let state = test_state();
        let intervention_id =
            state
                .interventions
                .flag_high_risk("ASS-001", json!({}), &["sepsis risk".to_string()]);
        state.interventions.assign(&intervention_id, "Dr. Smith");
        let review_id = state
            .reviews
            .create_review(&intervention_id, json!({}), "Dr. Smith");

        let escalated = submit_finding(
            &state,
            &review_id,
            "dosage conflicts with documented allergy",
            FindingSeverity::Critical,
        )
        .unwrap();

        assert!(escalated);
        let intervention = state.interventions.get(&intervention_id).unwrap();
        assert_eq!(intervention.status, InterventionStatus::Escalated);
        assert_eq!(intervention.priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn non_critical_finding_does_not_escalate() {
        let state = test_state();
        let intervention_id = state.interventions.flag_high_risk("ASS-001", json!({}), &[]);
        let review_id = state
            .reviews
            .create_review(&intervention_id, json!({}), "Dr. Smith");

        let escalated =
            submit_finding(&state, &review_id, "minor gap", FindingSeverity::Low).unwrap();
        assert!(!escalated);
        assert_eq!(
            state.interventions.get(&intervention_id).unwrap().status,
            InterventionStatus::Pending
        );
    }
}
