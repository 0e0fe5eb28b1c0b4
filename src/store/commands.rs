use time::OffsetDateTime;

use crate::errors::ModelError;
use crate::model::{ContentHash, FileList, FileRecord, ModuleId, Submission};

/// Mutable handle on one row of a [`super::SubmissionStore`].
pub struct RowMut<'a> {
    submission: &'a mut Submission,
    max_score: f64,
}

impl<'a> RowMut<'a> {
    pub(super) fn new(submission: &'a mut Submission, max_score: f64) -> Self {
        Self { submission, max_score }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.submission.module_id
    }

    pub fn submission(&self) -> &Submission {
        self.submission
    }

    /// Appends to the end of the list. Duplicate hashes are accepted.
    pub fn append_file(&mut self, list: FileList, record: FileRecord) {
        tracing::debug!(
            module_id = %self.submission.module_id,
            list = list.as_str(),
            hash = %record.content_hash,
            "Appending file"
        );
        self.submission.files_mut(list).push(record);
    }

    /// Removes the first record with `hash`. A missing hash is a no-op so a
    /// delete racing another confirmation stays harmless.
    pub fn remove_file(&mut self, list: FileList, hash: &ContentHash) -> Option<FileRecord> {
        let files = self.submission.files_mut(list);
        let index = files.iter().position(|record| &record.content_hash == hash)?;
        Some(files.remove(index))
    }

    pub fn mark_submitted(&mut self, timestamp: OffsetDateTime) -> Result<(), ModelError> {
        if self.submission.submitted {
            return Err(ModelError::InvalidTransition("submission is already submitted"));
        }

        self.submission.submitted = true;
        self.submission.upload_allowed = false;
        self.submission.submitted_on = Some(timestamp);
        Ok(())
    }

    /// Records a staff grade. Visibility flags reset until the server
    /// reports them again.
    pub fn apply_grade(&mut self, score: f64, comment: &str) -> Result<(), ModelError> {
        if !score.is_finite() {
            return Err(ModelError::GradeNotNumeric);
        }
        if score < 0.0 || score > self.max_score {
            return Err(ModelError::GradeOutOfRange { score, max_score: self.max_score });
        }

        self.submission.score = Some(score);
        self.submission.comment = comment.to_string();
        self.submission.approved = false;
        self.submission.published = false;
        Ok(())
    }

    pub fn remove_grade(&mut self) {
        self.submission.score = None;
        self.submission.comment.clear();
        self.submission.approved = false;
        self.submission.published = false;
        self.submission.needs_approval = false;
    }

    /// Lets the student upload again. Files and grade are left as they are.
    pub fn reopen(&mut self) {
        self.submission.submitted = false;
        self.submission.submitted_on = None;
        self.submission.upload_allowed = true;
        self.submission.may_grade = false;
    }

    /// Clears files and grade and resets the submitted flag in one step.
    pub fn remove_submission(&mut self) {
        let cleared = Submission {
            module_id: self.submission.module_id.clone(),
            full_name: std::mem::take(&mut self.submission.full_name),
            username: self.submission.username.take(),
            uploaded: Vec::new(),
            annotated: Vec::new(),
            submitted: false,
            submitted_on: None,
            upload_allowed: true,
            score: None,
            comment: String::new(),
            approved: false,
            published: false,
            may_grade: false,
            needs_approval: false,
        };
        *self.submission = cleared;
    }
}
