use std::sync::Arc;

use serde_json::json;
use sga_engine::validation::parse_grade;
use sga_engine::{
    EngineError, Gateway, HttpGateway, ModelError, ModuleId, SelectedFile, SubmissionStore,
    UploadError, Widget,
};

fn gateway() -> Arc<dyn Gateway> {
    Arc::new(HttpGateway::new("http://127.0.0.1:9/handler").expect("client"))
}

#[test]
fn host_snapshot_renders_student_view() -> anyhow::Result<()> {
    let snapshot = json!({
        "module_id": 17,
        "fullname": "Grace Hopper",
        "uploaded": [{"sha1": "abc123", "filename": "hw.pdf", "timestamp": "2025-01-02T10:20:30Z"}],
        "annotated": [],
        "submitted": false,
        "upload_allowed": true,
        "submission_time": null,
        "max_score": 100
    });

    let widget = Widget::initialize(&snapshot.to_string(), false, gateway())?;
    let view = widget.view().expect("student view");

    assert_eq!(view.student.module_id, ModuleId::from("17"));
    assert_eq!(view.student.uploaded[0].content_hash.as_str(), "abc123");
    assert!(view.student.allow_delete);
    assert!(view.grading.is_none());
    assert!(!view.backdrop_visible);
    Ok(())
}

#[test]
fn submitted_snapshot_does_not_offer_upload() -> anyhow::Result<()> {
    let snapshot = json!({
        "module_id": "m1",
        "uploaded": [],
        "annotated": [],
        "submitted": true,
        "upload_allowed": true,
        "submission_time": "2025-01-02 10:20:30+00:00",
        "max_score": 10
    });

    let mut widget = Widget::initialize(&snapshot.to_string(), false, gateway())?;

    assert!(!widget.view().expect("view").student.upload_allowed);
    let err = widget.select_upload(SelectedFile::new("late.pdf", vec![1])).expect_err("closed");
    assert_eq!(err, EngineError::Upload(UploadError::UploadNotAllowed));
    assert_eq!(
        widget.view().expect("view").student.submission_time.as_deref(),
        Some("2025-01-02T10:20:30Z")
    );
    Ok(())
}

#[test]
fn grading_set_snapshot_loads_every_row() -> anyhow::Result<()> {
    let rows: Vec<_> = (1..=3)
        .map(|id| {
            json!({
                "module_id": id,
                "fullname": format!("Student {id}"),
                "uploaded": [],
                "annotated": [],
                "submitted": true,
                "score": null
            })
        })
        .collect();
    let raw = json!({"assignments": rows, "max_score": 100}).to_string();

    let mut store = SubmissionStore::from_json(&raw)?;
    store.reopen_all();

    assert_eq!(store.len(), 3);
    assert!(store.rows().iter().all(|row| !row.submitted()));
    Ok(())
}

#[test]
fn grade_form_rejects_values_above_maximum() {
    assert_eq!(parse_grade("105", 100.0), Err(ModelError::GradeExceedsMax { max_score: 100.0 }));
    assert_eq!(parse_grade("99.5", 100.0), Ok(99.5));
}

#[tokio::test]
async fn staff_operations_need_staff_role() -> anyhow::Result<()> {
    let snapshot = json!({
        "module_id": "m1",
        "uploaded": [],
        "annotated": [],
        "submitted": false,
        "max_score": 10
    });
    let mut widget = Widget::initialize(&snapshot.to_string(), false, gateway())?;

    assert_eq!(widget.open_grading().await, Err(EngineError::NotStaff));
    assert_eq!(widget.reopen_all().await, Err(EngineError::GradingClosed));
    Ok(())
}
