use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use super::file::{FileList, FileRecord};

/// External key of a submission for all staff operations. The host sends it
/// either as a number or a string; it is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Ok(Self(text)),
            RawId::Number(number) => Ok(Self(number.to_string())),
        }
    }
}

/// One student's work on one assignment instance.
///
/// Fields are only writable inside the crate; every mutation goes through
/// [`crate::store::SubmissionStore`], which enforces the grade bounds and the
/// submitted/upload-allowed coupling.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub(crate) module_id: ModuleId,
    pub(crate) full_name: String,
    pub(crate) username: Option<String>,
    pub(crate) uploaded: Vec<FileRecord>,
    pub(crate) annotated: Vec<FileRecord>,
    pub(crate) submitted: bool,
    pub(crate) submitted_on: Option<OffsetDateTime>,
    pub(crate) upload_allowed: bool,
    pub(crate) score: Option<f64>,
    pub(crate) comment: String,
    pub(crate) approved: bool,
    pub(crate) published: bool,
    pub(crate) may_grade: bool,
    pub(crate) needs_approval: bool,
}

impl Submission {
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn uploaded(&self) -> &[FileRecord] {
        &self.uploaded
    }

    pub fn annotated(&self) -> &[FileRecord] {
        &self.annotated
    }

    pub fn files(&self, list: FileList) -> &[FileRecord] {
        match list {
            FileList::Uploaded => &self.uploaded,
            FileList::Annotated => &self.annotated,
        }
    }

    pub(crate) fn files_mut(&mut self, list: FileList) -> &mut Vec<FileRecord> {
        match list {
            FileList::Uploaded => &mut self.uploaded,
            FileList::Annotated => &mut self.annotated,
        }
    }

    pub fn submitted(&self) -> bool {
        self.submitted
    }

    pub fn submitted_on(&self) -> Option<OffsetDateTime> {
        self.submitted_on
    }

    pub fn upload_allowed(&self) -> bool {
        self.upload_allowed
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn may_grade(&self) -> bool {
        self.may_grade
    }

    pub fn needs_approval(&self) -> bool {
        self.needs_approval
    }

    /// Grade as shown to the student: only approved scores are visible.
    pub fn visible_grade(&self) -> Option<(f64, &str)> {
        match self.score {
            Some(score) if self.approved => Some((score, self.comment.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleId;

    #[test]
    fn module_id_accepts_numbers_and_strings() {
        let numeric: ModuleId = serde_json::from_str("42").expect("number");
        let text: ModuleId = serde_json::from_str("\"m1\"").expect("string");

        assert_eq!(numeric.as_str(), "42");
        assert_eq!(text, ModuleId::from("m1"));
        assert_eq!(serde_json::to_string(&numeric).expect("serialize"), "\"42\"");
    }
}
