//! In-memory model of the submissions the widget currently shows.
//!
//! The store is the single place where the model invariants are enforced:
//! remote confirmations are applied through [`RowMut`] or the bulk
//! operations here, never by writing fields directly.

mod commands;
mod queries;
mod types;

use std::collections::HashSet;

pub use commands::RowMut;

use crate::errors::ModelError;
use crate::model::{ModuleId, Submission};
use crate::schemas::{Snapshot, SubmissionSnapshot};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionStore {
    max_score: f64,
    rows: Vec<Submission>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, ModelError> {
        let mut store = Self::new();
        store.load(snapshot)?;
        Ok(store)
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        Self::from_snapshot(Snapshot::parse(raw)?)
    }

    /// Replaces the whole model. On failure the previous contents are kept.
    pub fn load(&mut self, snapshot: Snapshot) -> Result<(), ModelError> {
        let (max_score, rows) = match snapshot {
            Snapshot::Student(row) => {
                let max_score = row.max_score.ok_or_else(|| {
                    ModelError::MalformedSnapshot("max_score is required".to_string())
                })?;
                let max_score = types::validate_max_score(max_score)?;
                (max_score, vec![types::submission_from_snapshot(row, max_score)?])
            }
            Snapshot::GradingSet(set) => {
                let max_score = types::validate_max_score(set.max_score)?;
                let rows = set
                    .assignments
                    .into_iter()
                    .map(|row| types::submission_from_snapshot(row, max_score))
                    .collect::<Result<Vec<_>, _>>()?;
                (max_score, rows)
            }
        };

        let mut seen = HashSet::new();
        if let Some(duplicate) = rows.iter().find(|row| !seen.insert(row.module_id.clone())) {
            return Err(ModelError::MalformedSnapshot(format!(
                "duplicate module id {}",
                duplicate.module_id
            )));
        }

        tracing::debug!(rows = rows.len(), max_score, "Loaded submission snapshot");
        self.max_score = max_score;
        self.rows = rows;
        Ok(())
    }

    pub fn load_json(&mut self, raw: &str) -> Result<(), ModelError> {
        self.load(Snapshot::parse(raw)?)
    }

    /// Replaces one row with a confirmed server copy of it.
    pub fn refresh_row(&mut self, snapshot: SubmissionSnapshot) -> Result<(), ModelError> {
        let index = self
            .position(&snapshot.module_id)
            .ok_or_else(|| ModelError::UnknownModule(snapshot.module_id.clone()))?;
        let row = types::submission_from_snapshot(snapshot, self.max_score)?;
        self.rows[index] = row;
        Ok(())
    }

    pub fn row(&mut self, module_id: &ModuleId) -> Result<RowMut<'_>, ModelError> {
        let max_score = self.max_score;
        let submission = self
            .rows
            .iter_mut()
            .find(|row| &row.module_id == module_id)
            .ok_or_else(|| ModelError::UnknownModule(module_id.clone()))?;
        Ok(RowMut::new(submission, max_score))
    }

    /// Reopens every row, including rows no view currently shows.
    pub fn reopen_all(&mut self) {
        let max_score = self.max_score;
        for submission in &mut self.rows {
            RowMut::new(submission, max_score).reopen();
        }
    }

    pub fn remove_all(&mut self) {
        let max_score = self.max_score;
        for submission in &mut self.rows {
            RowMut::new(submission, max_score).remove_submission();
        }
    }

    /// Drops all rows; used when a staff grading session closes.
    pub fn dispose(&mut self) {
        self.rows.clear();
        self.max_score = 0.0;
    }
}
