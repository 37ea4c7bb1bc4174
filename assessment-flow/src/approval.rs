use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AssessmentError, Result};
use crate::intervention::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    PartiallyApproved,
    FullyApproved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub level: String,
    pub actor: String,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionEntry {
    pub level: String,
    pub actor: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// One multi-level sign-off request.
///
/// Fully approved means every chain level up to and including
/// `required_level` has at least one approval entry. A single rejection at
/// any level is irreversible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub assessment_id: String,
    pub assessment_data: Value,
    pub required_level: String,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub approvals: Vec<ApprovalEntry>,
    pub rejections: Vec<RejectionEntry>,
    pub final_decision: Option<Decision>,
    pub final_decision_at: Option<DateTime<Utc>>,
}

/// One event in the merged approval/rejection timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub action: Decision,
    pub level: String,
    pub actor: String,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalStatusSummary {
    pub approval_id: String,
    pub status: ApprovalStatus,
    pub final_decision: Option<Decision>,
    pub approvals_count: usize,
    pub rejections_count: usize,
    pub approved_by: Vec<String>,
    pub rejected_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub final_decision_at: Option<DateTime<Utc>>,
}

const DEFAULT_CHAIN: [&str; 3] = ["physician", "supervisor", "director"];

/// Runs the multi-level sign-off state machine against a configured
/// approval chain.
pub struct ApprovalManager {
    approvals: DashMap<String, ApprovalRequest>,
    counter: AtomicU64,
    chain: Vec<String>,
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalManager {
    pub fn new() -> Self {
        Self::with_chain(DEFAULT_CHAIN.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_chain(chain: Vec<String>) -> Self {
        Self {
            approvals: DashMap::new(),
            counter: AtomicU64::new(0),
            chain,
        }
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Create a sign-off request. An unrecognized `required_level` is
    /// rejected here rather than silently defaulted to the first chain
    /// level, which would under-constrain the approval.
    pub fn create_request(
        &self,
        assessment_id: &str,
        assessment_data: Value,
        required_level: &str,
    ) -> Result<String> {
        if !self.chain.iter().any(|l| l == required_level) {
            warn!(level = %required_level, "approval level not in configured chain");
            return Err(AssessmentError::UnknownApprovalLevel(
                required_level.to_string(),
            ));
        }

        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let approval_id = format!("APR-{seq:06}");

        let approval = ApprovalRequest {
            id: approval_id.clone(),
            assessment_id: assessment_id.to_string(),
            assessment_data,
            required_level: required_level.to_string(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            approvals: Vec::new(),
            rejections: Vec::new(),
            final_decision: None,
            final_decision_at: None,
        };

        self.approvals.insert(approval_id.clone(), approval);
        info!(approval_id = %approval_id, level = %required_level, "created approval request");
        Ok(approval_id)
    }

    /// Record one approval. Arrival order does not matter; the request is
    /// fully approved once every chain level up to the required level has an
    /// entry. Approvals after a rejection are refused.
    pub fn approve_at_level(
        &self,
        approval_id: &str,
        level: &str,
        approver: &str,
        notes: &str,
    ) -> bool {
        if !self.chain.iter().any(|l| l == level) {
            warn!(level = %level, "approval level not in configured chain");
            return false;
        }
        let Some(mut approval) = self.approvals.get_mut(approval_id) else {
            warn!(approval_id = %approval_id, "approval request not found");
            return false;
        };
        if approval.status == ApprovalStatus::Rejected {
            warn!(approval_id = %approval_id, "approval already rejected, refusing approval");
            return false;
        }

        approval.approvals.push(ApprovalEntry {
            level: level.to_string(),
            actor: approver.to_string(),
            notes: notes.to_string(),
            timestamp: Utc::now(),
        });

        if self.chain_complete(&approval) {
            approval.status = ApprovalStatus::FullyApproved;
            if approval.final_decision.is_none() {
                approval.final_decision = Some(Decision::Approved);
                approval.final_decision_at = Some(Utc::now());
            }
            info!(approval_id = %approval_id, "approval fully approved");
        } else {
            approval.status = ApprovalStatus::PartiallyApproved;
        }

        info!(approval_id = %approval_id, level = %level, approver = %approver, "recorded approval");
        true
    }

    /// Record one rejection. A single rejection at any level forces the
    /// rejected status irreversibly, even on an already fully-approved
    /// request.
    pub fn reject_at_level(
        &self,
        approval_id: &str,
        level: &str,
        rejector: &str,
        reason: &str,
    ) -> bool {
        if !self.chain.iter().any(|l| l == level) {
            warn!(level = %level, "approval level not in configured chain");
            return false;
        }
        let Some(mut approval) = self.approvals.get_mut(approval_id) else {
            warn!(approval_id = %approval_id, "approval request not found");
            return false;
        };

        approval.rejections.push(RejectionEntry {
            level: level.to_string(),
            actor: rejector.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        approval.status = ApprovalStatus::Rejected;
        if approval.final_decision != Some(Decision::Rejected) {
            approval.final_decision = Some(Decision::Rejected);
            approval.final_decision_at = Some(Utc::now());
        }

        info!(approval_id = %approval_id, level = %level, rejector = %rejector, "recorded rejection");
        true
    }

    // Set-membership of levels at index <= index(required_level); order of
    // arrival is irrelevant.
    fn chain_complete(&self, approval: &ApprovalRequest) -> bool {
        let required_index = self
            .chain
            .iter()
            .position(|l| l == &approval.required_level)
            .unwrap_or(0);

        self.chain[..=required_index].iter().all(|level| {
            approval
                .approvals
                .iter()
                .any(|entry| &entry.level == level)
        })
    }

    /// True iff the request is fully approved and its final decision stands.
    pub fn can_proceed(&self, approval_id: &str) -> bool {
        self.approvals
            .get(approval_id)
            .map(|approval| {
                approval.status == ApprovalStatus::FullyApproved
                    && approval.final_decision == Some(Decision::Approved)
            })
            .unwrap_or(false)
    }

    pub fn get(&self, approval_id: &str) -> Option<ApprovalRequest> {
        self.approvals.get(approval_id).map(|entry| entry.clone())
    }

    pub fn status(&self, approval_id: &str) -> Option<ApprovalStatusSummary> {
        let approval = self.approvals.get(approval_id)?;
        Some(ApprovalStatusSummary {
            approval_id: approval.id.clone(),
            status: approval.status,
            final_decision: approval.final_decision,
            approvals_count: approval.approvals.len(),
            rejections_count: approval.rejections.len(),
            approved_by: approval.approvals.iter().map(|a| a.actor.clone()).collect(),
            rejected_by: approval.rejections.iter().map(|r| r.actor.clone()).collect(),
            created_at: approval.created_at,
            final_decision_at: approval.final_decision_at,
        })
    }

    /// Approvals and rejections merged into one timeline, oldest first.
    pub fn history(&self, approval_id: &str) -> Option<Vec<HistoryEvent>> {
        let approval = self.approvals.get(approval_id)?;

        let mut history: Vec<HistoryEvent> = approval
            .approvals
            .iter()
            .map(|a| HistoryEvent {
                action: Decision::Approved,
                level: a.level.clone(),
                actor: a.actor.clone(),
                note: a.notes.clone(),
                timestamp: a.timestamp,
            })
            .chain(approval.rejections.iter().map(|r| HistoryEvent {
                action: Decision::Rejected,
                level: r.level.clone(),
                actor: r.actor.clone(),
                note: r.reason.clone(),
                timestamp: r.timestamp,
            }))
            .collect();

        history.sort_by_key(|event| event.timestamp);
        Some(history)
    }

    /// Open requests, optionally filtered to those a given level has already
    /// signed off on.
    pub fn pending(&self, level: Option<&str>) -> Vec<ApprovalRequest> {
        self.approvals
            .iter()
            .filter(|entry| {
                matches!(
                    entry.status,
                    ApprovalStatus::Pending | ApprovalStatus::PartiallyApproved
                )
            })
            .filter(|entry| {
                level.is_none_or(|l| entry.approvals.iter().any(|a| a.level == l))
            })
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> ApprovalManager {
        ApprovalManager::new()
    }

    fn request(m: &ApprovalManager, level: &str) -> String {
        m.create_request("ASS-001", json!({}), level).unwrap()
    }

    #[test]
    fn unknown_required_level_is_rejected_at_creation() {
        let m = manager();
        let err = m.create_request("ASS-001", json!({}), "board");
        assert!(matches!(
            err,
            Err(AssessmentError::UnknownApprovalLevel(level)) if level == "board"
        ));
    }

    #[test]
    fn chain_completeness_gates_can_proceed() {
        let m = manager();
        let id = request(&m, "supervisor");

        assert!(!m.can_proceed(&id));

        assert!(m.approve_at_level(&id, "physician", "Dr. A", ""));
        assert_eq!(m.get(&id).unwrap().status, ApprovalStatus::PartiallyApproved);
        assert!(!m.can_proceed(&id));

        assert!(m.approve_at_level(&id, "supervisor", "Dr. B", "agreed"));
        assert_eq!(m.get(&id).unwrap().status, ApprovalStatus::FullyApproved);
        assert!(m.can_proceed(&id));
    }

    #[test]
    fn approval_order_does_not_matter() {
        let m = manager();
        let id = request(&m, "supervisor");

        m.approve_at_level(&id, "supervisor", "Dr. B", "");
        assert_eq!(m.get(&id).unwrap().status, ApprovalStatus::PartiallyApproved);
        assert!(!m.can_proceed(&id));

        m.approve_at_level(&id, "physician", "Dr. A", "");
        assert!(m.can_proceed(&id));
    }

    #[test]
    fn rejection_is_irreversible() {
        let m = manager();
        let id = request(&m, "supervisor");

        m.approve_at_level(&id, "physician", "Dr. A", "");
        m.approve_at_level(&id, "supervisor", "Dr. B", "");
        assert!(m.can_proceed(&id));

        // a later rejection at any level tears approval down for good
        assert!(m.reject_at_level(&id, "director", "Dr. C", "missing labs"));
        assert_eq!(m.get(&id).unwrap().status, ApprovalStatus::Rejected);
        assert!(!m.can_proceed(&id));

        assert!(!m.approve_at_level(&id, "director", "Dr. C", "reconsidered"));
        assert!(!m.can_proceed(&id));
        assert_eq!(m.get(&id).unwrap().final_decision, Some(Decision::Rejected));
    }

    #[test]
    fn level_outside_chain_cannot_sign() {
        let m = manager();
        let id = request(&m, "physician");

        assert!(!m.approve_at_level(&id, "intern", "I. N. Tern", ""));
        assert!(!m.reject_at_level(&id, "intern", "I. N. Tern", "no"));
        assert_eq!(m.get(&id).unwrap().approvals.len(), 0);
        assert_eq!(m.get(&id).unwrap().rejections.len(), 0);
    }

    #[test]
    fn unknown_id_returns_false_not_error() {
        let m = manager();
        assert!(!m.approve_at_level("APR-999999", "physician", "Dr. A", ""));
        assert!(!m.reject_at_level("APR-999999", "physician", "Dr. A", "x"));
        assert!(!m.can_proceed("APR-999999"));
        assert!(m.status("APR-999999").is_none());
        assert!(m.history("APR-999999").is_none());
    }

    #[test]
    fn final_decision_stamped_once() {
        let m = manager();
        let id = request(&m, "physician");

        m.approve_at_level(&id, "physician", "Dr. A", "");
        let first = m.get(&id).unwrap().final_decision_at.unwrap();

        // extra approvals do not restamp the decision
        m.approve_at_level(&id, "supervisor", "Dr. B", "");
        assert_eq!(m.get(&id).unwrap().final_decision_at.unwrap(), first);
        assert_eq!(m.get(&id).unwrap().status, ApprovalStatus::FullyApproved);
    }

    #[test]
    fn history_merges_and_sorts_by_timestamp() {
        let m = manager();
        let id = request(&m, "director");

        m.approve_at_level(&id, "physician", "Dr. A", "first");
        m.approve_at_level(&id, "supervisor", "Dr. B", "second");
        m.reject_at_level(&id, "director", "Dr. C", "third");

        let history = m.history(&id).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(history[0].actor, "Dr. A");
        assert_eq!(history[2].action, Decision::Rejected);
        assert_eq!(history[2].note, "third");
    }

    #[test]
    fn status_summary_reflects_entries() {
        let m = manager();
        let id = request(&m, "supervisor");
        m.approve_at_level(&id, "physician", "Dr. A", "");

        let summary = m.status(&id).unwrap();
        assert_eq!(summary.status, ApprovalStatus::PartiallyApproved);
        assert_eq!(summary.approvals_count, 1);
        assert_eq!(summary.rejections_count, 0);
        assert_eq!(summary.approved_by, vec!["Dr. A"]);
        assert!(summary.final_decision.is_none());
    }

    #[test]
    fn pending_filter_by_signed_level() {
        let m = manager();
        let a = request(&m, "supervisor");
        let b = request(&m, "supervisor");
        m.approve_at_level(&a, "physician", "Dr. A", "");

        assert_eq!(m.pending(None).len(), 2);
        let signed_by_physician = m.pending(Some("physician"));
        assert_eq!(signed_by_physician.len(), 1);
        assert_eq!(signed_by_physician[0].id, a);

        // fully approved requests leave the pending set
        m.approve_at_level(&b, "physician", "Dr. A", "");
        m.approve_at_level(&b, "supervisor", "Dr. B", "");
        assert_eq!(m.pending(None).len(), 1);
    }

    #[test]
    fn custom_chain_is_honored() {
        let m = ApprovalManager::with_chain(vec![
            "nurse".to_string(),
            "physician".to_string(),
        ]);
        let id = m.create_request("ASS-001", json!({}), "physician").unwrap();

        m.approve_at_level(&id, "physician", "Dr. A", "");
        assert!(!m.can_proceed(&id));
        m.approve_at_level(&id, "nurse", "N. Ight", "");
        assert!(m.can_proceed(&id));
    }
}
