use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{GatewayError, UploadError};
use crate::model::{FileList, FileRecord, ModuleId, SelectedFile};
use crate::services::gateway::{FileScope, Gateway, Owner, Progress, RawResponse};
use crate::store::SubmissionStore;

const PAYLOAD_TOO_LARGE_STATUS: u16 = 413;

/// Capability record describing one upload slot: where bytes go, whether
/// listed files may be deleted, and which row receives completed files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    scope: FileScope,
    allow_delete: bool,
    on_complete: ModuleId,
}

impl UploadTarget {
    /// The student may delete listed files only while uploads are allowed.
    pub fn student(module_id: ModuleId, upload_allowed: bool) -> Self {
        Self {
            scope: FileScope::new(Owner::Student, FileList::Uploaded),
            allow_delete: upload_allowed,
            on_complete: module_id,
        }
    }

    pub fn annotation(module_id: ModuleId) -> Self {
        Self {
            scope: FileScope::new(Owner::Staff(module_id.clone()), FileList::Annotated),
            allow_delete: true,
            on_complete: module_id,
        }
    }

    pub fn scope(&self) -> &FileScope {
        &self.scope
    }

    pub fn allow_delete(&self) -> bool {
        self.allow_delete
    }

    pub fn on_complete(&self) -> &ModuleId {
        &self.on_complete
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    Selected(SelectedFile),
    Transferring { transfer_id: Uuid, file_name: String, progress: u8 },
    Completed(FileRecord),
    Failed(UploadError),
}

#[derive(Debug)]
pub struct PendingTransfer {
    pub id: Uuid,
    pub scope: FileScope,
    pub file: SelectedFile,
}

/// Per-target upload state machine:
/// `Idle -> Selected -> Transferring -> Completed | Failed -> Idle`.
#[derive(Debug)]
pub struct UploadCoordinator {
    target: UploadTarget,
    state: UploadState,
}

impl UploadCoordinator {
    pub fn new(target: UploadTarget) -> Self {
        Self { target, state: UploadState::Idle }
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub(crate) fn set_allow_delete(&mut self, allow_delete: bool) {
        self.target.allow_delete = allow_delete;
    }

    pub fn is_transferring(&self) -> bool {
        matches!(self.state, UploadState::Transferring { .. })
    }

    /// Text for the upload slot: the confirmation button or the progress.
    pub fn status_text(&self) -> Option<String> {
        match &self.state {
            UploadState::Selected(file) => Some(format!("Upload {}", file.name)),
            UploadState::Transferring { progress, .. } => {
                Some(format!("Uploading... {progress}%"))
            }
            _ => None,
        }
    }

    /// Chooses a file locally. Nothing is sent until [`Self::begin`].
    pub fn select(&mut self, file: SelectedFile) -> Result<(), UploadError> {
        if self.is_transferring() {
            return Err(UploadError::TransferInProgress);
        }
        self.state = UploadState::Selected(file);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), UploadError> {
        match self.state {
            UploadState::Selected(_) => {
                self.state = UploadState::Idle;
                Ok(())
            }
            UploadState::Transferring { .. } => Err(UploadError::TransferInProgress),
            _ => Err(UploadError::NothingSelected),
        }
    }

    /// Confirms the selection and moves to `Transferring`.
    pub fn begin(&mut self) -> Result<PendingTransfer, UploadError> {
        match &self.state {
            UploadState::Selected(_) => {}
            UploadState::Transferring { .. } => return Err(UploadError::TransferInProgress),
            _ => return Err(UploadError::NothingSelected),
        }

        let UploadState::Selected(file) = std::mem::replace(&mut self.state, UploadState::Idle)
        else {
            return Err(UploadError::NothingSelected);
        };

        let id = Uuid::new_v4();
        tracing::info!(
            transfer_id = %id,
            file_name = %file.name,
            bytes = file.len(),
            list = self.target.scope.list.as_str(),
            "Upload started"
        );
        self.state =
            UploadState::Transferring { transfer_id: id, file_name: file.name.clone(), progress: 0 };

        Ok(PendingTransfer { id, scope: self.target.scope.clone(), file })
    }

    /// Progress never moves backwards and is clamped to 100.
    pub fn record_progress(&mut self, update: Progress) {
        let UploadState::Transferring { progress, .. } = &mut self.state else {
            return;
        };
        if update.total == 0 {
            return;
        }

        let sent = update.sent.min(update.total);
        let percent = (sent.saturating_mul(100) / update.total) as u8;
        if percent > *progress {
            *progress = percent;
        }
    }

    /// Classifies the transfer result. A genuine success is appended to the
    /// owning row through the store.
    pub fn finish(
        &mut self,
        result: Result<RawResponse, GatewayError>,
        store: &mut SubmissionStore,
    ) -> Result<FileRecord, UploadError> {
        let UploadState::Transferring { transfer_id, file_name, .. } = &self.state else {
            return Err(UploadError::NotTransferring);
        };
        let transfer_id = *transfer_id;
        let file_name = file_name.clone();

        let outcome = match result {
            Ok(response) => classify_upload_response(&response),
            Err(err) => {
                tracing::warn!(
                    transfer_id = %transfer_id,
                    file_name = %file_name,
                    error = %err,
                    "Upload transport failure"
                );
                Err(UploadError::UploadFailed)
            }
        };

        let outcome = outcome.and_then(|record| {
            let mut row = store.row(&self.target.on_complete).map_err(|err| {
                tracing::error!(transfer_id = %transfer_id, error = %err, "Upload owner vanished");
                UploadError::UploadFailed
            })?;
            row.append_file(self.target.scope.list, record.clone());
            Ok(record)
        });

        match &outcome {
            Ok(record) => {
                tracing::info!(
                    transfer_id = %transfer_id,
                    hash = %record.content_hash,
                    "Upload completed"
                );
                metrics::counter!("uploads_total", "outcome" => "completed").increment(1);
                self.state = UploadState::Completed(record.clone());
            }
            Err(err) => {
                tracing::info!(transfer_id = %transfer_id, error = %err, "Upload failed");
                metrics::counter!("uploads_total", "outcome" => outcome_label(err)).increment(1);
                self.state = UploadState::Failed(err.clone());
            }
        }

        outcome
    }

    /// Returns to `Idle` once the caller has reacted to the outcome.
    pub fn settle(&mut self) {
        if matches!(self.state, UploadState::Completed(_) | UploadState::Failed(_)) {
            self.state = UploadState::Idle;
        }
    }

    /// Runs the confirmed transfer end to end, feeding transport progress
    /// into the state machine until the response arrives.
    pub async fn transfer(
        &mut self,
        gateway: &dyn Gateway,
        store: &mut SubmissionStore,
    ) -> Result<FileRecord, UploadError> {
        let pending = self.begin()?;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = {
            let upload = gateway.upload(&pending.scope, &pending.file, tx);
            tokio::pin!(upload);
            loop {
                tokio::select! {
                    biased;
                    Some(update) = rx.recv() => self.record_progress(update),
                    result = &mut upload => break result,
                }
            }
        };
        while let Ok(update) = rx.try_recv() {
            self.record_progress(update);
        }

        let outcome = self.finish(result, store);
        if outcome.is_ok() {
            metrics::histogram!("upload_bytes").record(pending.file.len() as f64);
        }
        self.settle();
        outcome
    }
}

/// Maps an upload response onto the outcome. A 2xx body carrying a
/// `success` key is a failure whose value is the user message.
pub fn classify_upload_response(response: &RawResponse) -> Result<FileRecord, UploadError> {
    if response.status == PAYLOAD_TOO_LARGE_STATUS {
        return Err(UploadError::PayloadTooLarge);
    }

    if !(200..300).contains(&response.status) {
        tracing::warn!(status = response.status, body = %response.body, "Upload rejected");
        return Err(UploadError::UploadFailed);
    }

    let body: Value = serde_json::from_str(&response.body).map_err(|err| {
        tracing::warn!(error = %err, body = %response.body, "Upload response is not JSON");
        UploadError::UploadFailed
    })?;

    if let Some(message) = body.get("success") {
        let message = match message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(UploadError::SoftUploadError(message));
    }

    serde_json::from_value::<FileRecord>(body).map_err(|err| {
        tracing::warn!(error = %err, body = %response.body, "Upload response missing file record");
        UploadError::UploadFailed
    })
}

fn outcome_label(err: &UploadError) -> &'static str {
    match err {
        UploadError::PayloadTooLarge => "too_large",
        UploadError::SoftUploadError(_) => "soft_error",
        _ => "failed",
    }
}
