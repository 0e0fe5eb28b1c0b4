use crate::model::{ModuleId, Submission};

use super::SubmissionStore;

impl SubmissionStore {
    pub fn max_score(&self) -> f64 {
        self.max_score
    }

    pub fn rows(&self) -> &[Submission] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, module_id: &ModuleId) -> Option<&Submission> {
        self.rows.iter().find(|row| &row.module_id == module_id)
    }

    /// The only row of a student-side store.
    pub fn primary(&self) -> Option<&Submission> {
        self.rows.first()
    }

    pub(super) fn position(&self, module_id: &ModuleId) -> Option<usize> {
        self.rows.iter().position(|row| &row.module_id == module_id)
    }
}
