use serde::Serialize;

use crate::model::{FileRecord, ModuleId};
use crate::services::modal::Dialog;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeView {
    pub score: f64,
    pub comment: String,
}

/// Render context for the student-facing part of the widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentView {
    pub module_id: ModuleId,
    pub uploaded: Vec<FileRecord>,
    pub annotated: Vec<FileRecord>,
    pub submitted: bool,
    pub submission_time: Option<String>,
    pub upload_allowed: bool,
    pub allow_delete: bool,
    pub graded: Option<GradeView>,
    pub max_score: f64,
    pub upload_status: Option<String>,
    pub error: Option<String>,
    pub is_staff: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingRowView {
    pub module_id: ModuleId,
    pub fullname: String,
    pub username: Option<String>,
    pub uploaded: Vec<FileRecord>,
    pub annotated: Vec<FileRecord>,
    pub submitted: bool,
    pub submission_time: Option<String>,
    pub score: Option<f64>,
    pub comment: String,
    pub approved: bool,
    pub published: bool,
    pub may_grade: bool,
    pub needs_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeFormView {
    pub module_id: ModuleId,
    pub fullname: String,
    pub raw_score: String,
    pub comment: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationView {
    pub module_id: ModuleId,
    pub fullname: String,
    pub files: Vec<FileRecord>,
    pub upload_status: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingView {
    pub max_score: f64,
    pub rows: Vec<GradingRowView>,
    pub grade_form: Option<GradeFormView>,
    pub annotations: Option<AnnotationView>,
    pub error: Option<String>,
}

/// Everything the host needs to draw the widget in its current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub student: StudentView,
    pub grading: Option<GradingView>,
    pub dialog: Option<Dialog>,
    pub backdrop_visible: bool,
}
