use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::errors::ModelError;
use crate::model::{FileRecord, ModuleId};

/// Key of the student's own row when the host omits `module_id`. Student
/// handlers are addressed by URL alone, so the key never leaves the engine.
pub const LOCAL_MODULE_ID: &str = "local";

/// Grade block of the student-facing snapshot; only present once approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedSnapshot {
    pub score: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Wire shape of one submission, used both for the embedded `data-state`
/// handoff and for each row of the staff grading data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SubmissionSnapshot {
    #[validate(custom(function = "non_blank_module_id"))]
    pub module_id: ModuleId,
    #[serde(default, alias = "full_name")]
    pub fullname: String,
    #[serde(default)]
    pub username: Option<String>,
    pub uploaded: Vec<FileRecord>,
    pub annotated: Vec<FileRecord>,
    pub submitted: bool,
    #[serde(default, alias = "submitted_on")]
    pub submission_time: Option<String>,
    #[serde(default)]
    pub upload_allowed: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub score: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub may_grade: Option<bool>,
    #[serde(default)]
    pub needs_approval: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "max_score must be non-negative"))]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub graded: Option<GradedSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GradingSetSnapshot {
    #[validate(nested)]
    pub assignments: Vec<SubmissionSnapshot>,
    #[validate(range(min = 0.0, message = "max_score must be non-negative"))]
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Student(SubmissionSnapshot),
    GradingSet(GradingSetSnapshot),
}

impl Snapshot {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| ModelError::MalformedSnapshot(err.to_string()))?;
        Self::from_value(value)
    }

    /// Grading data is recognised by its `assignments` key; anything else
    /// must be a single submission.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        let snapshot = if value.get("assignments").is_some() {
            let set: GradingSetSnapshot = serde_json::from_value(value)
                .map_err(|err| ModelError::MalformedSnapshot(err.to_string()))?;
            set.validate().map_err(|err| ModelError::MalformedSnapshot(err.to_string()))?;
            Self::GradingSet(set)
        } else {
            let mut value = value;
            if let Some(fields) = value.as_object_mut() {
                if fields.get("module_id").map_or(true, Value::is_null) {
                    fields.insert("module_id".to_string(), Value::from(LOCAL_MODULE_ID));
                }
            }
            let row: SubmissionSnapshot = serde_json::from_value(value)
                .map_err(|err| ModelError::MalformedSnapshot(err.to_string()))?;
            row.validate().map_err(|err| ModelError::MalformedSnapshot(err.to_string()))?;
            Self::Student(row)
        };

        Ok(snapshot)
    }
}

fn non_blank_module_id(module_id: &ModuleId) -> Result<(), ValidationError> {
    if module_id.as_str().trim().is_empty() {
        return Err(ValidationError::new("module_id_blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_student_snapshot_with_defaults() {
        let raw = json!({
            "module_id": 7,
            "uploaded": [],
            "annotated": [],
            "submitted": false,
            "max_score": 100
        })
        .to_string();

        let Snapshot::Student(row) = Snapshot::parse(&raw).expect("snapshot") else {
            panic!("expected student snapshot");
        };
        assert_eq!(row.module_id.as_str(), "7");
        assert_eq!(row.fullname, "");
        assert!(row.score.is_none());
        assert!(row.upload_allowed.is_none());
    }

    #[test]
    fn parses_grading_set() {
        let raw = json!({
            "assignments": [
                {"module_id": "m1", "fullname": "Ada", "uploaded": [], "annotated": [], "submitted": true}
            ],
            "max_score": 50
        })
        .to_string();

        let Snapshot::GradingSet(set) = Snapshot::parse(&raw).expect("snapshot") else {
            panic!("expected grading set");
        };
        assert_eq!(set.assignments.len(), 1);
        assert_eq!(set.max_score, 50.0);
    }

    #[test]
    fn student_snapshot_without_module_id_gets_local_key() {
        let raw = json!({
            "uploaded": [{"sha1": "abc123", "filename": "hw.pdf"}],
            "annotated": [],
            "graded": null,
            "max_score": 100,
            "submitted": false,
            "submission_time": "None"
        })
        .to_string();

        let Snapshot::Student(row) = Snapshot::parse(&raw).expect("snapshot") else {
            panic!("expected student snapshot");
        };
        assert_eq!(row.module_id.as_str(), LOCAL_MODULE_ID);
    }

    #[test]
    fn grading_rows_still_need_module_id() {
        let raw = json!({
            "assignments": [{"uploaded": [], "annotated": [], "submitted": true}],
            "max_score": 50
        })
        .to_string();
        assert!(matches!(Snapshot::parse(&raw), Err(ModelError::MalformedSnapshot(_))));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let raw = json!({"module_id": "m1", "uploaded": [], "submitted": false}).to_string();
        let err = Snapshot::parse(&raw).expect_err("annotated is required");
        assert!(matches!(err, ModelError::MalformedSnapshot(_)));
    }

    #[test]
    fn blank_module_id_is_malformed() {
        let raw = json!({
            "module_id": " ",
            "uploaded": [],
            "annotated": [],
            "submitted": false
        })
        .to_string();
        assert!(matches!(Snapshot::parse(&raw), Err(ModelError::MalformedSnapshot(_))));
    }

    #[test]
    fn negative_max_score_is_malformed() {
        let raw = json!({"assignments": [], "max_score": -1}).to_string();
        assert!(matches!(Snapshot::parse(&raw), Err(ModelError::MalformedSnapshot(_))));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(Snapshot::parse("<div>"), Err(ModelError::MalformedSnapshot(_))));
    }
}
