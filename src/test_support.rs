use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use time::macros::datetime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::GatewayError;
use crate::model::{ContentHash, ModuleId, SelectedFile};
use crate::services::gateway::{
    FileScope, Gateway, GradeConfirmation, Progress, ProgressSender, RawResponse, SubmitReceipt,
};
use crate::schemas::GradingSetSnapshot;
use crate::store::SubmissionStore;

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn clear_test_env() {
    for key in [
        "SGA_ENV",
        "ENVIRONMENT",
        "SGA_BASE_URL",
        "SGA_REQUEST_TIMEOUT_SECONDS",
        "SGA_CONNECT_TIMEOUT_SECONDS",
        "SGA_UPLOAD_CHUNK_KB",
        "SGA_SNAPSHOT_PATH",
        "SGA_STAFF",
        "LOG_LEVEL",
        "LOG_JSON",
        "PROMETHEUS_ENABLED",
    ] {
        std::env::remove_var(key);
    }
}

pub(crate) fn file_json(name: &str, hash: &str) -> Value {
    json!({"filename": name, "sha1": hash})
}

pub(crate) fn student_snapshot(module_id: &str, submitted: bool) -> Value {
    json!({
        "module_id": module_id,
        "fullname": "Ada Lovelace",
        "uploaded": [],
        "annotated": [],
        "submitted": submitted,
        "upload_allowed": !submitted,
        "submission_time": null,
        "max_score": 100
    })
}

pub(crate) fn graded_row(module_id: &str, score: Option<f64>) -> Value {
    json!({
        "module_id": module_id,
        "fullname": format!("Student {module_id}"),
        "username": module_id,
        "uploaded": [file_json(&format!("hw-{module_id}.pdf"), &format!("h-{module_id}"))],
        "annotated": [],
        "submitted": true,
        "submission_time": "2025-01-02T10:20:30Z",
        "score": score,
        "comment": "",
        "approved": score.is_some(),
        "published": false,
        "may_grade": true
    })
}

pub(crate) fn grading_set(rows: Vec<Value>, max_score: f64) -> Value {
    json!({"assignments": rows, "max_score": max_score})
}

pub(crate) fn store_from(snapshot: Value) -> SubmissionStore {
    SubmissionStore::from_json(&snapshot.to_string()).expect("valid snapshot")
}

struct FakeState {
    grading_set: Value,
    uploads: VecDeque<Result<RawResponse, GatewayError>>,
    failures: HashMap<&'static str, GatewayError>,
    files: HashMap<String, Vec<u8>>,
    calls: Vec<String>,
    confirm_rows: bool,
    confirmed_row: Option<Value>,
}

/// Scripted in-memory server. Staff mutations are applied to its own copy of
/// the grading data so later fetches stay consistent.
pub(crate) struct FakeGateway {
    state: StdMutex<FakeState>,
}

impl FakeGateway {
    pub(crate) fn new(grading_set: Value) -> Self {
        Self {
            state: StdMutex::new(FakeState {
                grading_set,
                uploads: VecDeque::new(),
                failures: HashMap::new(),
                files: HashMap::new(),
                calls: Vec::new(),
                confirm_rows: false,
                confirmed_row: None,
            }),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(grading_set(Vec::new(), 100.0))
    }

    pub(crate) fn push_upload(&self, response: Result<RawResponse, GatewayError>) {
        self.lock().uploads.push_back(response);
    }

    pub(crate) fn fail(&self, op: &'static str, err: GatewayError) {
        self.lock().failures.insert(op, err);
    }

    pub(crate) fn store_file(&self, hash: &str, bytes: &[u8]) {
        self.lock().files.insert(hash.to_string(), bytes.to_vec());
    }

    pub(crate) fn confirm_with_rows(&self) {
        self.lock().confirm_rows = true;
    }

    /// Answers grade calls with this row instead of the stored copy.
    pub(crate) fn confirm_with_row(&self, row: Value) {
        self.lock().confirmed_row = Some(row);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn server_row(&self, module_id: &str) -> Option<Value> {
        let state = self.lock();
        state.grading_set["assignments"]
            .as_array()
            .and_then(|rows| rows.iter().find(|row| row["module_id"] == module_id).cloned())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake gateway lock")
    }

    fn check(&self, call: String, op: &'static str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn update_rows(&self, module_id: Option<&ModuleId>, apply: impl Fn(&mut Value)) {
        let mut state = self.lock();
        if let Some(rows) = state.grading_set["assignments"].as_array_mut() {
            for row in rows.iter_mut() {
                let matches = match module_id {
                    Some(id) => row["module_id"] == id.as_str(),
                    None => true,
                };
                if matches {
                    apply(row);
                }
            }
        }
    }

    fn confirmation(&self, module_id: &ModuleId) -> Result<GradeConfirmation, GatewayError> {
        let state = self.lock();
        if let Some(row) = state.confirmed_row.clone() {
            let row = serde_json::from_value(row)
                .map_err(|err| GatewayError::Decode(err.to_string()))?;
            return Ok(GradeConfirmation::Row(row));
        }
        if state.confirm_rows {
            let row = state.grading_set["assignments"]
                .as_array()
                .and_then(|rows| rows.iter().find(|row| row["module_id"] == module_id.as_str()))
                .cloned()
                .ok_or(GatewayError::NotFound)?;
            let row = serde_json::from_value(row)
                .map_err(|err| GatewayError::Decode(err.to_string()))?;
            return Ok(GradeConfirmation::Row(row));
        }
        let set: GradingSetSnapshot = serde_json::from_value(state.grading_set.clone())
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(GradeConfirmation::Set(set))
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn upload(
        &self,
        scope: &FileScope,
        file: &SelectedFile,
        progress: ProgressSender,
    ) -> Result<RawResponse, GatewayError> {
        self.check(format!("upload:{}:{}", scope.list.as_str(), file.name), "upload")?;

        let total = file.len().max(1);
        let _ = progress.send(Progress { sent: total / 2, total });
        let _ = progress.send(Progress { sent: total, total });

        let scripted = self.lock().uploads.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(RawResponse::new(
                200,
                json!({"filename": file.name, "sha1": format!("hash-{}", file.name)}).to_string(),
            ))
        })
    }

    async fn download(
        &self,
        _scope: &FileScope,
        hash: &ContentHash,
    ) -> Result<Vec<u8>, GatewayError> {
        self.check(format!("download:{hash}"), "download")?;
        self.lock().files.get(hash.as_str()).cloned().ok_or(GatewayError::NotFound)
    }

    async fn download_zipped(&self, scope: &FileScope) -> Result<Vec<u8>, GatewayError> {
        self.check(format!("download_zipped:{}", scope.list.as_str()), "download_zipped")?;
        Ok(b"PK\x05\x06".to_vec())
    }

    async fn delete_file(&self, scope: &FileScope, hash: &ContentHash) -> Result<(), GatewayError> {
        self.check(format!("delete:{}:{hash}", scope.list.as_str()), "delete_file")
    }

    async fn submit(&self) -> Result<SubmitReceipt, GatewayError> {
        self.check("submit".to_string(), "submit")?;
        Ok(SubmitReceipt { submitted_on: datetime!(2025-03-01 09:00 UTC) })
    }

    async fn fetch_grading_set(&self) -> Result<GradingSetSnapshot, GatewayError> {
        self.check("fetch_grading_set".to_string(), "fetch_grading_set")?;
        let value = self.lock().grading_set.clone();
        serde_json::from_value(value).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn enter_grade(
        &self,
        module_id: &ModuleId,
        score: f64,
        comment: &str,
    ) -> Result<GradeConfirmation, GatewayError> {
        self.check(format!("enter_grade:{module_id}:{score}"), "enter_grade")?;
        self.update_rows(Some(module_id), |row| {
            row["score"] = json!(score);
            row["comment"] = json!(comment);
            row["approved"] = json!(true);
            row["published"] = json!(false);
        });
        self.confirmation(module_id)
    }

    async fn remove_grade(&self, module_id: &ModuleId) -> Result<GradeConfirmation, GatewayError> {
        self.check(format!("remove_grade:{module_id}"), "remove_grade")?;
        self.update_rows(Some(module_id), |row| {
            row["score"] = Value::Null;
            row["comment"] = json!("");
            row["approved"] = json!(false);
            row["published"] = json!(false);
        });
        self.confirmation(module_id)
    }

    async fn reopen_one(&self, module_id: &ModuleId) -> Result<(), GatewayError> {
        self.check(format!("reopen_one:{module_id}"), "reopen_one")?;
        self.update_rows(Some(module_id), |row| row["submitted"] = json!(false));
        Ok(())
    }

    async fn remove_one(&self, module_id: &ModuleId) -> Result<(), GatewayError> {
        self.check(format!("remove_one:{module_id}"), "remove_one")?;
        self.update_rows(Some(module_id), clear_row);
        Ok(())
    }

    async fn reopen_all(&self) -> Result<(), GatewayError> {
        self.check("reopen_all".to_string(), "reopen_all")?;
        self.update_rows(None, |row| row["submitted"] = json!(false));
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), GatewayError> {
        self.check("remove_all".to_string(), "remove_all")?;
        self.update_rows(None, clear_row);
        Ok(())
    }
}

fn clear_row(row: &mut Value) {
    row["uploaded"] = json!([]);
    row["annotated"] = json!([]);
    row["submitted"] = json!(false);
    row["score"] = Value::Null;
    row["comment"] = json!("");
    row["approved"] = json!(false);
    row["published"] = json!(false);
}
