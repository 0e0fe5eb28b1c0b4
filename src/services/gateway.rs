use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::errors::GatewayError;
use crate::model::{ContentHash, FileList, ModuleId, SelectedFile};
use crate::schemas::{GradingSetSnapshot, SubmissionSnapshot};

/// Whose files an operation addresses: the current student's own, or a
/// student's row as seen by staff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    Student,
    Staff(ModuleId),
}

impl Owner {
    pub fn module_id(&self) -> Option<&ModuleId> {
        match self {
            Self::Student => None,
            Self::Staff(module_id) => Some(module_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileScope {
    pub owner: Owner,
    pub list: FileList,
}

impl FileScope {
    pub fn new(owner: Owner, list: FileList) -> Self {
        Self { owner, list }
    }
}

/// Unclassified upload response; the upload coordinator decides whether it
/// is a genuine success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub sent: u64,
    pub total: u64,
}

pub type ProgressSender = mpsc::UnboundedSender<Progress>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub submitted_on: OffsetDateTime,
}

/// Server answer to a grade change: the whole refreshed set or one row.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeConfirmation {
    Set(GradingSetSnapshot),
    Row(SubmissionSnapshot),
}

/// Remote operations the engine depends on. Transport and encoding belong
/// to the implementation.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn upload(
        &self,
        scope: &FileScope,
        file: &SelectedFile,
        progress: ProgressSender,
    ) -> Result<RawResponse, GatewayError>;

    async fn download(&self, scope: &FileScope, hash: &ContentHash)
        -> Result<Vec<u8>, GatewayError>;

    async fn download_zipped(&self, scope: &FileScope) -> Result<Vec<u8>, GatewayError>;

    async fn delete_file(&self, scope: &FileScope, hash: &ContentHash) -> Result<(), GatewayError>;

    async fn submit(&self) -> Result<SubmitReceipt, GatewayError>;

    async fn fetch_grading_set(&self) -> Result<GradingSetSnapshot, GatewayError>;

    async fn enter_grade(
        &self,
        module_id: &ModuleId,
        score: f64,
        comment: &str,
    ) -> Result<GradeConfirmation, GatewayError>;

    async fn remove_grade(&self, module_id: &ModuleId) -> Result<GradeConfirmation, GatewayError>;

    async fn reopen_one(&self, module_id: &ModuleId) -> Result<(), GatewayError>;

    async fn remove_one(&self, module_id: &ModuleId) -> Result<(), GatewayError>;

    async fn reopen_all(&self) -> Result<(), GatewayError>;

    async fn remove_all(&self) -> Result<(), GatewayError>;
}
