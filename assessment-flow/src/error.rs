use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssessmentError>;

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Stage execution failed: {0}")]
    StageFailed(String),

    #[error("Record error: {0}")]
    RecordError(String),

    #[error("Unknown approval level: {0}")]
    UnknownApprovalLevel(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
