pub mod snapshot;
pub mod view;

pub use snapshot::{GradedSnapshot, GradingSetSnapshot, Snapshot, SubmissionSnapshot};
pub use view::{
    AnnotationView, GradeFormView, GradeView, GradingRowView, GradingView, StudentView, WidgetView,
};
