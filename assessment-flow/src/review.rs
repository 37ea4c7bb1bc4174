use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub text: String,
    pub severity: FindingSeverity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub field: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub text: String,
    pub action_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Structured artifacts produced by a human reviewer working one
/// intervention. Append-only while in progress; immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub intervention_id: String,
    pub reviewer: String,
    pub created_at: DateTime<Utc>,
    pub assessment_data: Value,
    pub findings: Vec<Finding>,
    pub questions: Vec<Question>,
    pub recommendations: Vec<Recommendation>,
    pub status: ReviewStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counts used by callers to decide whether to escalate, e.g. any critical
/// finding should trigger an intervention escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub review_id: String,
    pub reviewer: String,
    pub status: ReviewStatus,
    pub total_findings: usize,
    pub critical_findings: usize,
    pub high_findings: usize,
    pub total_questions: usize,
    pub total_recommendations: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Records reviews against interventions, keyed `REV-000001`.
#[derive(Default)]
pub struct ReviewHandler {
    reviews: DashMap<String, Review>,
    counter: AtomicU64,
}

impl ReviewHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_review(
        &self,
        intervention_id: &str,
        assessment_data: Value,
        reviewer: &str,
    ) -> String {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let review_id = format!("REV-{seq:06}");

        let review = Review {
            id: review_id.clone(),
            intervention_id: intervention_id.to_string(),
            reviewer: reviewer.to_string(),
            created_at: Utc::now(),
            assessment_data,
            findings: Vec::new(),
            questions: Vec::new(),
            recommendations: Vec::new(),
            status: ReviewStatus::InProgress,
            completed_at: None,
        };

        self.reviews.insert(review_id.clone(), review);
        info!(review_id = %review_id, intervention_id = %intervention_id, "created review");
        review_id
    }

    pub fn add_finding(&self, review_id: &str, text: &str, severity: FindingSeverity) -> bool {
        let Some(mut review) = self.open_review(review_id) else {
            return false;
        };
        review.findings.push(Finding {
            text: text.to_string(),
            severity,
            timestamp: Utc::now(),
        });
        info!(review_id = %review_id, ?severity, "added finding");
        true
    }

    pub fn add_question(&self, review_id: &str, text: &str, field: Option<&str>) -> bool {
        let Some(mut review) = self.open_review(review_id) else {
            return false;
        };
        review.questions.push(Question {
            text: text.to_string(),
            field: field.map(str::to_string),
            timestamp: Utc::now(),
        });
        info!(review_id = %review_id, "added question");
        true
    }

    pub fn add_recommendation(&self, review_id: &str, text: &str, action_type: &str) -> bool {
        let Some(mut review) = self.open_review(review_id) else {
            return false;
        };
        review.recommendations.push(Recommendation {
            text: text.to_string(),
            action_type: action_type.to_string(),
            timestamp: Utc::now(),
        });
        info!(review_id = %review_id, "added recommendation");
        true
    }

    /// Mark the review completed. A completed review accepts no further
    /// artifacts, and a second completion does not restamp `completed_at`.
    pub fn complete(&self, review_id: &str) -> bool {
        let Some(mut review) = self.reviews.get_mut(review_id) else {
            return false;
        };
        if review.status == ReviewStatus::Completed {
            warn!(review_id = %review_id, "review already completed");
            return false;
        }
        review.status = ReviewStatus::Completed;
        review.completed_at = Some(Utc::now());
        info!(review_id = %review_id, "completed review");
        true
    }

    pub fn get(&self, review_id: &str) -> Option<Review> {
        self.reviews.get(review_id).map(|entry| entry.clone())
    }

    pub fn summary(&self, review_id: &str) -> Option<ReviewSummary> {
        let review = self.reviews.get(review_id)?;
        Some(ReviewSummary {
            review_id: review.id.clone(),
            reviewer: review.reviewer.clone(),
            status: review.status,
            total_findings: review.findings.len(),
            critical_findings: review
                .findings
                .iter()
                .filter(|f| f.severity == FindingSeverity::Critical)
                .count(),
            high_findings: review
                .findings
                .iter()
                .filter(|f| f.severity == FindingSeverity::High)
                .count(),
            total_questions: review.questions.len(),
            total_recommendations: review.recommendations.len(),
            completed_at: review.completed_at,
        })
    }

    fn open_review(
        &self,
        review_id: &str,
    ) -> Option<dashmap::mapref::one::RefMut<'_, String, Review>> {
        let review = self.reviews.get_mut(review_id)?;
        if review.status == ReviewStatus::Completed {
            warn!(review_id = %review_id, "review is completed, rejecting mutation");
            return None;
        }
        Some(review)
    }
}
