//! One embedded widget instance: the student slot, the dialog stack and,
//! while staff have it open, the grading console.

use std::sync::Arc;

use crate::core::time::format_offset;
use crate::errors::{EngineError, ModelError, UploadError};
use crate::model::{ContentHash, FileList, FileRecord, ModuleId, SelectedFile, Submission};
use crate::schemas::{GradeView, Snapshot, StudentView, WidgetView};
use crate::services::gateway::{FileScope, Gateway, Owner};
use crate::services::grading::GradingConsole;
use crate::services::modal::{Dialog, ModalCoordinator};
use crate::services::upload::{UploadCoordinator, UploadTarget};
use crate::store::SubmissionStore;

pub struct Widget {
    gateway: Arc<dyn Gateway>,
    store: SubmissionStore,
    module_id: ModuleId,
    uploads: UploadCoordinator,
    error: Option<String>,
    modals: ModalCoordinator,
    is_staff: bool,
    grading: Option<GradingConsole>,
}

impl Widget {
    /// Loads the snapshot embedded in the host page. A malformed snapshot
    /// aborts initialisation; nothing is rendered from partial state.
    pub fn initialize(
        data_state: &str,
        is_staff: bool,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Self, EngineError> {
        let snapshot = match Snapshot::parse(data_state)? {
            snapshot @ Snapshot::Student(_) => snapshot,
            Snapshot::GradingSet(_) => {
                return Err(ModelError::MalformedSnapshot(
                    "expected a single submission".to_string(),
                )
                .into());
            }
        };
        let store = SubmissionStore::from_snapshot(snapshot)?;
        let (module_id, upload_allowed) = store
            .primary()
            .map(|row| (row.module_id().clone(), row.upload_allowed()))
            .ok_or_else(|| ModelError::MalformedSnapshot("no submission".to_string()))?;

        tracing::info!(module_id = %module_id, is_staff, "Widget initialised");

        let uploads = UploadCoordinator::new(UploadTarget::student(module_id.clone(), upload_allowed));

        Ok(Self {
            gateway,
            store,
            uploads,
            module_id,
            error: None,
            modals: ModalCoordinator::new(),
            is_staff,
            grading: None,
        })
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.store.get(&self.module_id)
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn modals(&self) -> &ModalCoordinator {
        &self.modals
    }

    pub fn grading(&self) -> Option<&GradingConsole> {
        self.grading.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn select_upload(&mut self, file: SelectedFile) -> Result<(), EngineError> {
        let result = self.ensure_upload_allowed().and_then(|()| Ok(self.uploads.select(file)?));
        self.track(result)
    }

    pub fn cancel_upload(&mut self) -> Result<(), EngineError> {
        Ok(self.uploads.cancel()?)
    }

    /// Sends the selected file. Nothing moves before this is called.
    pub async fn start_upload(&mut self) -> Result<FileRecord, EngineError> {
        if let Err(err) = self.ensure_upload_allowed() {
            self.uploads.cancel().ok();
            return self.track(Err(err));
        }
        let outcome = self.uploads.transfer(self.gateway.as_ref(), &mut self.store).await;
        self.track(outcome.map_err(EngineError::from))
    }

    pub async fn upload(&mut self, file: SelectedFile) -> Result<FileRecord, EngineError> {
        self.select_upload(file)?;
        self.start_upload().await
    }

    pub async fn delete_upload(&mut self, hash: &ContentHash) -> Result<(), EngineError> {
        if !self.uploads.target().allow_delete() {
            return self.track(Err(UploadError::DeleteNotAllowed.into()));
        }

        let scope = self.uploads.target().scope().clone();
        let result = match self.gateway.delete_file(&scope, hash).await {
            Ok(()) => self
                .store
                .row(&self.module_id)
                .map(|mut row| {
                    row.remove_file(FileList::Uploaded, hash);
                })
                .map_err(EngineError::from),
            Err(err) => Err(err.into()),
        };
        if result.is_ok() {
            tracing::info!(module_id = %self.module_id, hash = %hash, "Upload deleted");
        }
        self.track(result)
    }

    pub async fn submit(&mut self) -> Result<(), EngineError> {
        if self.submission().is_some_and(Submission::submitted) {
            tracing::warn!(module_id = %self.module_id, "Submit requested twice");
            return Err(ModelError::InvalidTransition("submission is already submitted").into());
        }

        let result = match self.gateway.submit().await {
            Ok(receipt) => self
                .store
                .row(&self.module_id)
                .and_then(|mut row| row.mark_submitted(receipt.submitted_on))
                .map_err(EngineError::from),
            Err(err) => Err(err.into()),
        };
        if result.is_ok() {
            self.uploads.set_allow_delete(false);
            tracing::info!(module_id = %self.module_id, "Submission submitted");
        }
        self.track(result)
    }

    pub async fn download(
        &self,
        list: FileList,
        hash: &ContentHash,
    ) -> Result<Vec<u8>, EngineError> {
        let scope = FileScope::new(Owner::Student, list);
        Ok(self.gateway.download(&scope, hash).await?)
    }

    pub async fn download_zipped(&self, list: FileList) -> Result<Vec<u8>, EngineError> {
        let scope = FileScope::new(Owner::Student, list);
        Ok(self.gateway.download_zipped(&scope).await?)
    }

    /// Opens the staff grading dialog over a freshly fetched grading set.
    /// When it is already open the set is fetched again.
    pub async fn open_grading(&mut self) -> Result<(), EngineError> {
        self.require_staff()?;
        if let Some(console) = self.grading.as_mut() {
            return console.refresh().await;
        }

        self.modals.open(Dialog::StaffGrading)?;
        match GradingConsole::open(Arc::clone(&self.gateway)).await {
            Ok(console) => {
                self.grading = Some(console);
                Ok(())
            }
            Err(err) => {
                self.modals.close_through(Dialog::StaffGrading).ok();
                self.track(Err(err))
            }
        }
    }

    /// Closes the grading dialog and any dialog stacked on it, then drops
    /// the grading set.
    pub fn close_grading(&mut self) -> Result<(), EngineError> {
        let mut console = self.grading.take().ok_or(EngineError::GradingClosed)?;
        console.dispose();
        self.modals.close_through(Dialog::StaffGrading)?;
        Ok(())
    }

    pub fn open_grade_entry(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        let console = self.grading.as_mut().ok_or(EngineError::GradingClosed)?;
        console.open_grade_entry(module_id)?;
        if let Err(err) = self.modals.open(Dialog::GradeEntry) {
            console.cancel_grade_entry();
            return Err(err.into());
        }
        Ok(())
    }

    pub fn cancel_grade_entry(&mut self) -> Result<(), EngineError> {
        let console = self.grading.as_mut().ok_or(EngineError::GradingClosed)?;
        self.modals.close(Dialog::GradeEntry)?;
        console.cancel_grade_entry();
        Ok(())
    }

    /// On success the grade-entry dialog closes and the grading dialog
    /// underneath stays open. Validation failures keep the form open.
    pub async fn enter_grade(
        &mut self,
        module_id: &ModuleId,
        raw_score: &str,
        comment: &str,
    ) -> Result<(), EngineError> {
        let console = self.grading.as_mut().ok_or(EngineError::GradingClosed)?;
        console.enter_grade(module_id, raw_score, comment).await?;
        self.close_child(Dialog::GradeEntry);
        Ok(())
    }

    pub async fn remove_grade(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        let console = self.grading.as_mut().ok_or(EngineError::GradingClosed)?;
        console.remove_grade(module_id).await?;
        self.close_child(Dialog::GradeEntry);
        Ok(())
    }

    pub async fn reopen_one(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        self.console()?.reopen_one(module_id).await
    }

    pub async fn remove_one(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        self.console()?.remove_one(module_id).await
    }

    pub async fn reopen_all(&mut self) -> Result<(), EngineError> {
        self.console()?.reopen_all().await
    }

    pub async fn remove_all(&mut self) -> Result<(), EngineError> {
        self.console()?.remove_all().await
    }

    pub fn manage_annotations(&mut self, module_id: &ModuleId) -> Result<(), EngineError> {
        let console = self.grading.as_mut().ok_or(EngineError::GradingClosed)?;
        console.manage_annotations(module_id)?;
        if let Err(err) = self.modals.open(Dialog::ManageAnnotations) {
            console.close_annotations().ok();
            return Err(err.into());
        }
        Ok(())
    }

    pub fn close_annotations(&mut self) -> Result<(), EngineError> {
        let console = self.grading.as_mut().ok_or(EngineError::GradingClosed)?;
        console.close_annotations()?;
        self.modals.close(Dialog::ManageAnnotations)?;
        Ok(())
    }

    pub fn select_annotation(&mut self, file: SelectedFile) -> Result<(), EngineError> {
        self.console()?.select_annotation(file)
    }

    pub async fn start_annotation_upload(&mut self) -> Result<FileRecord, EngineError> {
        self.console()?.start_annotation_upload().await
    }

    pub async fn upload_annotation(&mut self, file: SelectedFile) -> Result<FileRecord, EngineError> {
        self.console()?.upload_annotation(file).await
    }

    pub async fn delete_annotation(&mut self, hash: &ContentHash) -> Result<(), EngineError> {
        self.console()?.delete_annotation(hash).await
    }

    pub async fn download_annotation(&self, hash: &ContentHash) -> Result<Vec<u8>, EngineError> {
        let console = self.grading.as_ref().ok_or(EngineError::GradingClosed)?;
        console.download_annotation(hash).await
    }

    pub async fn download_annotations_zipped(&self) -> Result<Vec<u8>, EngineError> {
        let console = self.grading.as_ref().ok_or(EngineError::GradingClosed)?;
        console.download_annotations_zipped().await
    }

    pub fn open_debug(&mut self) -> Result<(), EngineError> {
        self.require_staff()?;
        self.modals.open(Dialog::StaffDebug)?;
        Ok(())
    }

    pub fn close_debug(&mut self) -> Result<(), EngineError> {
        self.modals.close(Dialog::StaffDebug)?;
        Ok(())
    }

    pub fn student_view(&self) -> Option<StudentView> {
        let row = self.submission()?;
        Some(StudentView {
            module_id: row.module_id().clone(),
            uploaded: row.uploaded().to_vec(),
            annotated: row.annotated().to_vec(),
            submitted: row.submitted(),
            submission_time: row.submitted_on().map(format_offset),
            upload_allowed: row.upload_allowed(),
            allow_delete: self.uploads.target().allow_delete(),
            graded: row.visible_grade().map(|(score, comment)| GradeView {
                score,
                comment: comment.to_string(),
            }),
            max_score: self.store.max_score(),
            upload_status: self.uploads.status_text(),
            error: self.error.clone(),
            is_staff: self.is_staff,
        })
    }

    pub fn view(&self) -> Option<WidgetView> {
        Some(WidgetView {
            student: self.student_view()?,
            grading: self.grading.as_ref().map(GradingConsole::view),
            dialog: self.modals.top(),
            backdrop_visible: self.modals.backdrop_visible(),
        })
    }

    fn console(&mut self) -> Result<&mut GradingConsole, EngineError> {
        self.grading.as_mut().ok_or(EngineError::GradingClosed)
    }

    fn require_staff(&self) -> Result<(), EngineError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(EngineError::NotStaff)
        }
    }

    fn ensure_upload_allowed(&self) -> Result<(), EngineError> {
        if self.submission().is_some_and(Submission::upload_allowed) {
            Ok(())
        } else {
            Err(UploadError::UploadNotAllowed.into())
        }
    }

    fn close_child(&mut self, dialog: Dialog) {
        if self.modals.is_interactive(dialog) {
            self.modals.close(dialog).ok();
        }
    }

    /// Keeps the user-facing error in step with the last student action.
    /// Invalid transitions are defects, not messages.
    fn track<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        self.error = match &result {
            Err(EngineError::Model(ModelError::InvalidTransition(_))) | Ok(_) => None,
            Err(err) => Some(err.user_message()),
        };
        result
    }
}
