use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Confidence below this flags an assessment for review.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Types of human intervention required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Review,
    Approval,
    Clarification,
    Override,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Escalated,
}

impl InterventionStatus {
    /// Approved and rejected are terminal; escalated is not, a higher
    /// authority may still resolve an escalated request.
    pub fn is_terminal(self) -> bool {
        matches!(self, InterventionStatus::Approved | InterventionStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub reviewer: String,
    pub timestamp: DateTime<Utc>,
}

/// One request for human attention on an assessment.
///
/// `decision` is set exactly when the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRequest {
    pub id: String,
    pub assessment_id: String,
    pub kind: InterventionKind,
    pub status: InterventionStatus,
    pub priority: Priority,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub assessment_data: Value,
    pub assigned_to: Option<String>,
    pub comments: Vec<Comment>,
    pub decision: Option<Decision>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Aggregated view over all requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionReport {
    pub total_interventions: usize,
    pub pending: usize,
    pub urgent: usize,
    pub approved: usize,
    pub rejected: usize,
    pub escalated: usize,
    pub interventions: Vec<InterventionRequest>,
}

/// Tracks intervention requests across many in-flight assessments.
///
/// The store and its id counter are owned here; pass the manager around by
/// `Arc` rather than through globals. Id allocation is gap-free under
/// concurrent creation.
#[derive(Default)]
pub struct InterventionManager {
    requests: DashMap<String, InterventionRequest>,
    counter: AtomicU64,
}

impl InterventionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_request(
        &self,
        assessment_id: &str,
        kind: InterventionKind,
        assessment_data: Value,
        reason: &str,
        priority: Priority,
    ) -> String {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let request_id = format!("INT-{seq:06}");

        let request = InterventionRequest {
            id: request_id.clone(),
            assessment_id: assessment_id.to_string(),
            kind,
            status: InterventionStatus::Pending,
            priority,
            reason: reason.to_string(),
            created_at: Utc::now(),
            assessment_data,
            assigned_to: None,
            comments: Vec::new(),
            decision: None,
            resolved_at: None,
        };

        self.requests.insert(request_id.clone(), request);
        info!(request_id = %request_id, ?kind, "created intervention request");
        request_id
    }

    /// Flag a high-risk assessment for review.
    pub fn flag_high_risk(
        &self,
        assessment_id: &str,
        assessment_data: Value,
        risk_factors: &[String],
    ) -> String {
        let reason = format!(
            "High-risk assessment identified. Risk factors: {}",
            risk_factors.join(", ")
        );
        self.create_request(
            assessment_id,
            InterventionKind::Review,
            assessment_data,
            &reason,
            Priority::High,
        )
    }

    /// Flag an assessment whose confidence fell below the threshold.
    /// Returns `None` when the confidence is acceptable.
    pub fn flag_low_confidence(
        &self,
        assessment_id: &str,
        assessment_data: Value,
        confidence_score: f64,
        threshold: f64,
    ) -> Option<String> {
        if confidence_score >= threshold {
            return None;
        }
        let reason = format!(
            "Low confidence assessment (score: {:.1}%, threshold: {:.1}%)",
            confidence_score * 100.0,
            threshold * 100.0
        );
        Some(self.create_request(
            assessment_id,
            InterventionKind::Review,
            assessment_data,
            &reason,
            Priority::Normal,
        ))
    }

    /// Flag an assessment whose diagnoses contradict each other.
    pub fn flag_contradictory_diagnosis(
        &self,
        assessment_id: &str,
        assessment_data: Value,
        conflicting_diagnoses: &[String],
    ) -> String {
        let reason = format!(
            "Contradictory diagnoses detected: {}",
            conflicting_diagnoses.join(", ")
        );
        self.create_request(
            assessment_id,
            InterventionKind::Clarification,
            assessment_data,
            &reason,
            Priority::High,
        )
    }

    /// Flag symptoms that require immediate attention.
    pub fn flag_urgent_symptoms(
        &self,
        assessment_id: &str,
        assessment_data: Value,
        urgent_symptoms: &[String],
    ) -> String {
        let reason = format!(
            "Urgent symptoms detected: {}. Immediate medical attention required.",
            urgent_symptoms.join(", ")
        );
        self.create_request(
            assessment_id,
            InterventionKind::Urgent,
            assessment_data,
            &reason,
            Priority::Urgent,
        )
    }

    /// Assign a request to a reviewer. Pending requests move to in-progress;
    /// escalated requests keep their status and only gain an assignee.
    pub fn assign(&self, request_id: &str, assigned_to: &str) -> bool {
        let Some(mut request) = self.requests.get_mut(request_id) else {
            warn!(request_id = %request_id, "intervention request not found");
            return false;
        };
        if request.status.is_terminal() {
            warn!(request_id = %request_id, "cannot assign a resolved request");
            return false;
        }

        request.assigned_to = Some(assigned_to.to_string());
        if request.status == InterventionStatus::Pending {
            request.status = InterventionStatus::InProgress;
        }
        info!(request_id = %request_id, reviewer = %assigned_to, "assigned intervention");
        true
    }

    /// Comments are always permitted, including after resolution, to support
    /// audit trails.
    pub fn add_comment(&self, request_id: &str, text: &str, reviewer: &str) -> bool {
        let Some(mut request) = self.requests.get_mut(request_id) else {
            return false;
        };
        request.comments.push(Comment {
            text: text.to_string(),
            reviewer: reviewer.to_string(),
            timestamp: Utc::now(),
        });
        info!(request_id = %request_id, "added comment to intervention");
        true
    }

    /// Terminal transition. A second approve/reject on the same request is a
    /// no-op returning `false`, so the audit record is never overwritten.
    pub fn approve(&self, request_id: &str, reviewer: &str, notes: &str) -> bool {
        {
            let Some(mut request) = self.requests.get_mut(request_id) else {
                return false;
            };
            if request.status.is_terminal() {
                warn!(request_id = %request_id, "intervention already resolved");
                return false;
            }
            request.status = InterventionStatus::Approved;
            request.decision = Some(Decision::Approved);
            request.resolved_at = Some(Utc::now());
        }
        if !notes.is_empty() {
            self.add_comment(request_id, &format!("Approval notes: {notes}"), reviewer);
        }
        info!(request_id = %request_id, reviewer = %reviewer, "approved intervention");
        true
    }

    pub fn reject(&self, request_id: &str, reviewer: &str, reason: &str) -> bool {
        {
            let Some(mut request) = self.requests.get_mut(request_id) else {
                return false;
            };
            if request.status.is_terminal() {
                warn!(request_id = %request_id, "intervention already resolved");
                return false;
            }
            request.status = InterventionStatus::Rejected;
            request.decision = Some(Decision::Rejected);
            request.resolved_at = Some(Utc::now());
        }
        self.add_comment(request_id, &format!("Rejection reason: {reason}"), reviewer);
        info!(request_id = %request_id, reviewer = %reviewer, "rejected intervention");
        true
    }

    /// Redirect attention without resolving: forces escalated status and
    /// urgent priority, leaves `decision` unset.
    pub fn escalate(&self, request_id: &str, escalation_reason: &str) -> bool {
        {
            let Some(mut request) = self.requests.get_mut(request_id) else {
                return false;
            };
            if request.status.is_terminal() {
                warn!(request_id = %request_id, "cannot escalate a resolved request");
                return false;
            }
            request.status = InterventionStatus::Escalated;
            request.priority = Priority::Urgent;
        }
        self.add_comment(request_id, &format!("Escalated: {escalation_reason}"), "SYSTEM");
        info!(request_id = %request_id, "escalated intervention");
        true
    }

    pub fn get(&self, request_id: &str) -> Option<InterventionRequest> {
        self.requests.get(request_id).map(|entry| entry.clone())
    }

    pub fn pending(&self, priority: Option<Priority>) -> Vec<InterventionRequest> {
        self.requests
            .iter()
            .filter(|entry| entry.status == InterventionStatus::Pending)
            .filter(|entry| priority.is_none_or(|p| entry.priority == p))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn urgent(&self) -> Vec<InterventionRequest> {
        self.pending(Some(Priority::Urgent))
    }

    pub fn report(&self) -> InterventionReport {
        let mut report = InterventionReport {
            total_interventions: 0,
            pending: 0,
            urgent: 0,
            approved: 0,
            rejected: 0,
            escalated: 0,
            interventions: Vec::new(),
        };

        for entry in self.requests.iter() {
            report.total_interventions += 1;
            match entry.status {
                InterventionStatus::Pending => {
                    report.pending += 1;
                    if entry.priority == Priority::Urgent {
                        report.urgent += 1;
                    }
                }
                InterventionStatus::Approved => report.approved += 1,
                InterventionStatus::Rejected => report.rejected += 1,
                InterventionStatus::Escalated => report.escalated += 1,
                InterventionStatus::InProgress => {}
            }
            report.interventions.push(entry.value().clone());
        }

        report
    }
}
