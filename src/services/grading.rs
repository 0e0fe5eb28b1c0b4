//! Staff grading console over a freshly fetched grading set.
//!
//! Every remote call is issued first; the matching store operation runs only
//! once the server has confirmed it. Rows are always addressed by module id.

use std::sync::Arc;

use crate::core::time::format_offset;
use crate::errors::{EngineError, ModelError, UploadError};
use crate::model::{ContentHash, FileList, FileRecord, ModuleId, SelectedFile, Submission};
use crate::schemas::{AnnotationView, GradeFormView, GradingRowView, GradingView, Snapshot};
use crate::services::gateway::{FileScope, Gateway, GradeConfirmation, Owner};
use crate::services::upload::{UploadCoordinator, UploadTarget};
use crate::store::{RowMut, SubmissionStore};
use crate::validation::parse_grade;

/// Grade-entry form. The raw text is kept as typed so an invalid value can
/// be corrected in place.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeForm {
    pub module_id: ModuleId,
    pub raw_score: String,
    pub comment: String,
    pub error: Option<ModelError>,
}

#[derive(Debug)]
pub struct AnnotationSession {
    module_id: ModuleId,
    uploads: UploadCoordinator,
    error: Option<String>,
}

impl AnnotationSession {
    fn new(module_id: ModuleId) -> Self {
        Self {
            uploads: UploadCoordinator::new(UploadTarget::annotation(module_id.clone())),
            module_id,
            error: None,
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

pub struct GradingConsole {
    gateway: Arc<dyn Gateway>,
    store: SubmissionStore,
    grade_form: Option<GradeForm>,
    annotations: Option<AnnotationSession>,
    error: Option<String>,
}

impl GradingConsole {
    /// Fetches the grading set. Each open starts from a new store.
    pub async fn open(gateway: Arc<dyn Gateway>) -> Result<Self, EngineError> {
        let set = gateway.fetch_grading_set().await?;
        let store = SubmissionStore::from_snapshot(Snapshot::GradingSet(set))?;
        tracing::info!(rows = store.len(), max_score = store.max_score(), "Grading set loaded");

        Ok(Self { gateway, store, grade_form: None, annotations: None, error: None })
    }

    pub fn store(&self) -> &SubmissionStore {
        &self.store
    }

    pub fn grade_form(&self) -> Option<&GradeForm> {
        self.grade_form.as_ref()
    }

    pub fn annotations(&self) -> Option<&AnnotationSession> {
        self.annotations.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Re-fetches the whole set, replacing every row.
    pub async fn refresh(&mut self) -> Result<(), EngineError> {
        let result = async {
            let set = self.gateway.fetch_grading_set().await?;
            self.store.load(Snapshot::GradingSet(set))?;
            Ok::<(), EngineError>(())
        }
        .await;
        self.track(result)
    }

    pub fn open_grade_entry(&mut self, module_id: &ModuleId) -> Result<&GradeForm, EngineError> {
        let row = self.require(module_id)?;
        let form = GradeForm {
            module_id: module_id.clone(),
            raw_score: row.score().map(|score| score.to_string()).unwrap_or_default(),
            comment: row.comment().to_string(),
            error: None,
        };
        Ok(self.grade_form.insert(form))
    }

    pub fn cancel_grade_entry(&mut self) -> Option<GradeForm> {
        self.grade_form.take()
    }

    /// Validates locally, then submits. The store only changes after the
    /// server confirms; a validation failure never reaches the gateway.
    pub async fn enter_grade(
        &mut self,
        module_id: &ModuleId,
        raw_score: &str,
        comment: &str,
    ) -> Result<(), EngineError> {
        self.require(module_id)?;

        let score = match parse_grade(raw_score, self.store.max_score()) {
            Ok(score) => score,
            Err(err) => {
                tracing::debug!(module_id = %module_id, error = %err, "Grade rejected by form");
                metrics::counter!("grade_entries_total", "status" => "invalid").increment(1);
                self.grade_form = Some(GradeForm {
                    module_id: module_id.clone(),
                    raw_score: raw_score.to_string(),
                    comment: comment.to_string(),
                    error: Some(err.clone()),
                });
                return Err(err.into());
            }
        };

        let confirmation = match self.gateway.enter_grade(module_id, score, comment).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                tracing::warn!(module_id = %module_id, error = %err, "Grade entry failed");
                metrics::counter!("grade_entries_total", "status" => "failed").increment(1);
                return self.track(Err(err.into()));
            }
        };

        let result =
            self.settle(module_id, confirmation, |mut row| row.apply_grade(score, comment));
        if result.is_ok() {
            tracing::info!(module_id = %module_id, score, "Grade applied");
            metrics::counter!("grade_entries_total", "status" => "applied").increment(1);
            self.grade_form = None;
        }
        self.track(result.map_err(EngineError::from))
    }

    pub async fn remove_grade(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        self.require(module_id)?;
        let result = async {
            let confirmation = self.gateway.remove_grade(module_id).await?;
            self.settle(module_id, confirmation, |mut row| {
                row.remove_grade();
                Ok(())
            })?;
            Ok::<(), EngineError>(())
        }
        .await;

        if result.is_ok() {
            tracing::info!(module_id = %module_id, "Grade removed");
            if self.grade_form.as_ref().is_some_and(|form| &form.module_id == module_id) {
                self.grade_form = None;
            }
        }
        self.track(result)
    }

    pub async fn reopen_one(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        self.require(module_id)?;
        let result = async {
            self.gateway.reopen_one(module_id).await?;
            self.store.row(module_id)?.reopen();
            Ok::<(), EngineError>(())
        }
        .await;
        if result.is_ok() {
            tracing::info!(module_id = %module_id, "Submission reopened");
        }
        self.track(result)
    }

    pub async fn remove_one(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        self.require(module_id)?;
        let result = async {
            self.gateway.remove_one(module_id).await?;
            self.store.row(module_id)?.remove_submission();
            Ok::<(), EngineError>(())
        }
        .await;
        if result.is_ok() {
            tracing::info!(module_id = %module_id, "Submission removed");
        }
        self.track(result)
    }

    /// Reopens every row of the set, not only the rows on screen.
    pub async fn reopen_all(&mut self) -> Result<(), EngineError> {
        let result = self.gateway.reopen_all().await.map_err(EngineError::from);
        if result.is_ok() {
            self.store.reopen_all();
            tracing::info!(rows = self.store.len(), "All submissions reopened");
            metrics::counter!("bulk_operations_total", "op" => "reopen_all").increment(1);
        }
        self.track(result)
    }

    pub async fn remove_all(&mut self) -> Result<(), EngineError> {
        let result = self.gateway.remove_all().await.map_err(EngineError::from);
        if result.is_ok() {
            self.store.remove_all();
            tracing::info!(rows = self.store.len(), "All submissions removed");
            metrics::counter!("bulk_operations_total", "op" => "remove_all").increment(1);
        }
        self.track(result)
    }

    pub async fn download(
        &self,
        module_id: &ModuleId,
        list: FileList,
        hash: &ContentHash,
    ) -> Result<Vec<u8>, EngineError> {
        self.require(module_id)?;
        let scope = FileScope::new(Owner::Staff(module_id.clone()), list);
        Ok(self.gateway.download(&scope, hash).await?)
    }

    pub async fn download_zipped(
        &self,
        module_id: &ModuleId,
        list: FileList,
    ) -> Result<Vec<u8>, EngineError> {
        self.require(module_id)?;
        let scope = FileScope::new(Owner::Staff(module_id.clone()), list);
        Ok(self.gateway.download_zipped(&scope).await?)
    }

    pub fn manage_annotations(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        self.require(module_id)?;
        if self.annotations.as_ref().is_some_and(|session| session.uploads.is_transferring()) {
            return Err(UploadError::TransferInProgress.into());
        }
        self.annotations = Some(AnnotationSession::new(module_id.clone()));
        Ok(())
    }

    pub fn close_annotations(&mut self) -> Result<(), EngineError> {
        match &self.annotations {
            None => Err(EngineError::AnnotationsClosed),
            Some(session) if session.uploads.is_transferring() => {
                Err(UploadError::TransferInProgress.into())
            }
            Some(_) => {
                self.annotations = None;
                Ok(())
            }
        }
    }

    pub fn select_annotation(&mut self, file: SelectedFile) -> Result<(), EngineError> {
        let session = self.annotations.as_mut().ok_or(EngineError::AnnotationsClosed)?;
        session.error = None;
        session.uploads.select(file)?;
        Ok(())
    }

    pub fn cancel_annotation(&mut self) -> Result<(), EngineError> {
        let session = self.annotations.as_mut().ok_or(EngineError::AnnotationsClosed)?;
        session.uploads.cancel()?;
        Ok(())
    }

    /// Sends the selected annotation and appends it to the row on success.
    pub async fn start_annotation_upload(&mut self) -> Result<FileRecord, EngineError> {
        let session = self.annotations.as_mut().ok_or(EngineError::AnnotationsClosed)?;
        let outcome = session.uploads.transfer(self.gateway.as_ref(), &mut self.store).await;
        session.error = outcome.as_ref().err().map(UploadError::user_message);
        Ok(outcome?)
    }

    pub async fn upload_annotation(&mut self, file: SelectedFile) -> Result<FileRecord, EngineError> {
        self.select_annotation(file)?;
        self.start_annotation_upload().await
    }

    pub async fn delete_annotation(&mut self, hash: &ContentHash) -> Result<(), EngineError> {
        let session = self.annotations.as_ref().ok_or(EngineError::AnnotationsClosed)?;
        if !session.uploads.target().allow_delete() {
            return Err(UploadError::DeleteNotAllowed.into());
        }
        let scope = session.uploads.target().scope().clone();
        let module_id = session.module_id.clone();

        let result = match self.gateway.delete_file(&scope, hash).await {
            Ok(()) => self
                .store
                .row(&module_id)
                .map(|mut row| {
                    row.remove_file(FileList::Annotated, hash);
                })
                .map_err(EngineError::from),
            Err(err) => Err(err.into()),
        };

        if result.is_ok() {
            tracing::info!(module_id = %module_id, hash = %hash, "Annotation deleted");
        }
        if let Some(session) = self.annotations.as_mut() {
            session.error = result.as_ref().err().map(EngineError::user_message);
        }
        result
    }

    pub async fn download_annotation(&self, hash: &ContentHash) -> Result<Vec<u8>, EngineError> {
        let session = self.annotations.as_ref().ok_or(EngineError::AnnotationsClosed)?;
        self.download(&session.module_id, FileList::Annotated, hash).await
    }

    pub async fn download_annotations_zipped(&self) -> Result<Vec<u8>, EngineError> {
        let session = self.annotations.as_ref().ok_or(EngineError::AnnotationsClosed)?;
        self.download_zipped(&session.module_id, FileList::Annotated).await
    }

    /// Drops every row; the console cannot be used afterwards.
    pub fn dispose(&mut self) {
        self.grade_form = None;
        self.annotations = None;
        self.store.dispose();
    }

    pub fn view(&self) -> GradingView {
        let grade_form = self.grade_form.as_ref().and_then(|form| {
            let row = self.store.get(&form.module_id)?;
            Some(GradeFormView {
                module_id: form.module_id.clone(),
                fullname: row.full_name().to_string(),
                raw_score: form.raw_score.clone(),
                comment: form.comment.clone(),
                error: form.error.as_ref().map(ModelError::user_message),
            })
        });

        let annotations = self.annotations.as_ref().and_then(|session| {
            let row = self.store.get(&session.module_id)?;
            Some(AnnotationView {
                module_id: session.module_id.clone(),
                fullname: row.full_name().to_string(),
                files: row.annotated().to_vec(),
                upload_status: session.uploads.status_text(),
                error: session.error.clone(),
            })
        });

        GradingView {
            max_score: self.store.max_score(),
            rows: self.store.rows().iter().map(row_view).collect(),
            grade_form,
            annotations,
            error: self.error.clone(),
        }
    }

    fn require(&self, module_id: &ModuleId) -> Result<&Submission, ModelError> {
        self.store.get(module_id).ok_or_else(|| ModelError::UnknownModule(module_id.clone()))
    }

    /// Applies the server's copy first. The local edit only runs when the
    /// confirmation does not carry the row, so a body that fails to load
    /// leaves the row untouched.
    fn settle(
        &mut self,
        module_id: &ModuleId,
        confirmation: GradeConfirmation,
        local: impl FnOnce(RowMut<'_>) -> Result<(), ModelError>,
    ) -> Result<(), ModelError> {
        let covered = match &confirmation {
            GradeConfirmation::Set(_) => true,
            GradeConfirmation::Row(row) => &row.module_id == module_id,
        };
        self.apply_confirmation(confirmation)?;
        if covered {
            return Ok(());
        }
        local(self.store.row(module_id)?)
    }

    fn apply_confirmation(&mut self, confirmation: GradeConfirmation) -> Result<(), ModelError> {
        match confirmation {
            GradeConfirmation::Set(set) => self.store.load(Snapshot::GradingSet(set)),
            GradeConfirmation::Row(row) => self.store.refresh_row(row),
        }
    }

    fn track<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        self.error = result.as_ref().err().map(EngineError::user_message);
        result
    }
}

fn row_view(row: &Submission) -> GradingRowView {
    GradingRowView {
        module_id: row.module_id().clone(),
        fullname: row.full_name().to_string(),
        username: row.username().map(str::to_string),
        uploaded: row.uploaded().to_vec(),
        annotated: row.annotated().to_vec(),
        submitted: row.submitted(),
        submission_time: row.submitted_on().map(format_offset),
        score: row.score(),
        comment: row.comment().to_string(),
        approved: row.approved(),
        published: row.published(),
        may_grade: row.may_grade(),
        needs_approval: row.needs_approval(),
    }
}
