use thiserror::Error;

use crate::model::ModuleId;
use crate::services::modal::Dialog;

pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "The file you are trying to upload is too large.";
pub const UPLOAD_FAILED_MESSAGE: &str = "There was an error uploading your file.";
const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failures raised by the local model. None of them perform I/O.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
    #[error("grade {score} is outside 0..={max_score}")]
    GradeOutOfRange { score: f64, max_score: f64 },
    #[error("grade is not numeric")]
    GradeNotNumeric,
    #[error("grade is negative")]
    GradeNegative,
    #[error("grade exceeds maximum score {max_score}")]
    GradeExceedsMax { max_score: f64 },
    #[error("no submission with module id {0}")]
    UnknownModule(ModuleId),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            Self::GradeNotNumeric => "Grade must be a number.".to_string(),
            Self::GradeNegative => "Grade must be positive.".to_string(),
            Self::GradeExceedsMax { max_score } | Self::GradeOutOfRange { max_score, .. } => {
                format!("Maximum score is {max_score}")
            }
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::GradeNotNumeric
                | Self::GradeNegative
                | Self::GradeExceedsMax { .. }
                | Self::GradeOutOfRange { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("upload failed")]
    UploadFailed,
    #[error("upload rejected: {0}")]
    SoftUploadError(String),
    #[error("a transfer is already in progress for this target")]
    TransferInProgress,
    #[error("no file selected")]
    NothingSelected,
    #[error("no transfer in progress")]
    NotTransferring,
    #[error("uploads are not allowed for this submission")]
    UploadNotAllowed,
    #[error("deleting files is not allowed for this target")]
    DeleteNotAllowed,
}

impl UploadError {
    pub fn user_message(&self) -> String {
        match self {
            Self::PayloadTooLarge => PAYLOAD_TOO_LARGE_MESSAGE.to_string(),
            Self::SoftUploadError(message) => message.clone(),
            _ => UPLOAD_FAILED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("not found")]
    NotFound,
    #[error("rejected as an invalid transition")]
    InvalidTransition,
    #[error("grade rejected by the server")]
    GradeOutOfRange,
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("operation not supported for {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModalError {
    #[error("{0:?} is not open")]
    NotOpen(Dialog),
    #[error("{0:?} is not the topmost dialog")]
    NotTopmost(Dialog),
    #[error("{0:?} is already open")]
    AlreadyOpen(Dialog),
    #[error("dialog stack is full")]
    StackFull,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Modal(#[from] ModalError),
    #[error("staff access required")]
    NotStaff,
    #[error("grading view is not open")]
    GradingClosed,
    #[error("no annotation session is open")]
    AnnotationsClosed,
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Model(err) => err.user_message(),
            Self::Upload(err) => err.user_message(),
            Self::Gateway(GatewayError::NotFound) => "The requested file was not found.".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}
