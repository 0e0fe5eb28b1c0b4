use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde_json::Value;
use time::OffsetDateTime;
use validator::Validate;

use crate::core::config::GatewaySettings;
use crate::core::time::{now_utc, parse_submission_time};
use crate::errors::GatewayError;
use crate::model::{ContentHash, FileList, ModuleId, SelectedFile};
use crate::schemas::{GradingSetSnapshot, SubmissionSnapshot};
use crate::services::gateway::{
    FileScope, Gateway, GradeConfirmation, Owner, Progress, ProgressSender, RawResponse,
    SubmitReceipt,
};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Download,
    DownloadZipped,
    Delete,
}

/// Which server-side rule maps a 4xx onto a domain failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusPolicy {
    Plain,
    GradeEntry,
}

/// Handler name plus the parts appended to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    handler: &'static str,
    suffix: Option<String>,
    module_id: Option<ModuleId>,
}

impl Endpoint {
    fn new(handler: &'static str) -> Self {
        Self { handler, suffix: None, module_id: None }
    }

    fn with_suffix(mut self, suffix: &ContentHash) -> Self {
        self.suffix = Some(suffix.as_str().to_string());
        self
    }

    fn for_owner(mut self, owner: &Owner) -> Self {
        self.module_id = owner.module_id().cloned();
        self
    }

    fn for_module(mut self, module_id: &ModuleId) -> Self {
        self.module_id = Some(module_id.clone());
        self
    }

    fn path(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}/{suffix}", self.handler),
            None => self.handler.to_string(),
        }
    }
}

/// [`Gateway`] over the widget's XBlock-style handler URLs.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    chunk_bytes: usize,
}

impl HttpGateway {
    /// Client for the handlers under `base_url` with default timeouts.
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        Self::from_settings(&GatewaySettings {
            base_url: base_url.to_string(),
            request_timeout_seconds: 60,
            connect_timeout_seconds: 10,
            upload_chunk_kb: 64,
        })
    }

    pub(crate) fn from_settings(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            chunk_bytes: settings.upload_chunk_bytes().max(1),
        })
    }

    fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    fn get(&self, endpoint: &Endpoint) -> RequestBuilder {
        with_module_id(self.client.get(self.url(endpoint)), endpoint)
    }

    fn post(&self, endpoint: &Endpoint) -> RequestBuilder {
        with_module_id(self.client.post(self.url(endpoint)), endpoint)
    }

    async fn send_text(
        &self,
        request: RequestBuilder,
        handler: &'static str,
        policy: StatusPolicy,
    ) -> Result<String, GatewayError> {
        let response = send(request, handler).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| GatewayError::Transport(err.to_string()))?;
        map_status(status, body, policy).inspect_err(|err| {
            tracing::warn!(handler, status, error = %err, "Handler call failed");
        })
    }

    async fn send_bytes(
        &self,
        request: RequestBuilder,
        handler: &'static str,
    ) -> Result<Vec<u8>, GatewayError> {
        let response = send(request, handler).await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(handler, status, "Download failed");
            return map_status(status, body, StatusPolicy::Plain).map(String::into_bytes);
        }
        let bytes =
            response.bytes().await.map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn upload_body(&self, file: &SelectedFile, progress: ProgressSender) -> Body {
        let total = file.len();
        let chunks: Vec<Vec<u8>> =
            file.bytes.chunks(self.chunk_bytes).map(<[u8]>::to_vec).collect();

        let mut sent = 0_u64;
        let stream = futures_util::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>))
            .inspect(move |chunk| {
                if let Ok(chunk) = chunk {
                    sent += chunk.len() as u64;
                    let _ = progress.send(Progress { sent, total });
                }
            });
        Body::wrap_stream(stream)
    }

    async fn grade_confirmation(
        &self,
        request: RequestBuilder,
        handler: &'static str,
    ) -> Result<GradeConfirmation, GatewayError> {
        let body = self.send_text(request, handler, StatusPolicy::GradeEntry).await?;
        decode_confirmation(&body)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn upload(
        &self,
        scope: &FileScope,
        file: &SelectedFile,
        progress: ProgressSender,
    ) -> Result<RawResponse, GatewayError> {
        let (endpoint, field) = upload_endpoint(scope)?;
        let mime = file.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        let part = Part::stream_with_length(self.upload_body(file, progress), file.len())
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let form = Form::new().part(field, part);

        let response = send(self.post(&endpoint).multipart(form), endpoint.handler).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(RawResponse { status, body })
    }

    async fn download(
        &self,
        scope: &FileScope,
        hash: &ContentHash,
    ) -> Result<Vec<u8>, GatewayError> {
        let endpoint = file_endpoint(FileAction::Download, scope)?.with_suffix(hash);
        self.send_bytes(self.get(&endpoint), endpoint.handler).await
    }

    async fn download_zipped(&self, scope: &FileScope) -> Result<Vec<u8>, GatewayError> {
        let endpoint = file_endpoint(FileAction::DownloadZipped, scope)?;
        self.send_bytes(self.get(&endpoint), endpoint.handler).await
    }

    async fn delete_file(&self, scope: &FileScope, hash: &ContentHash) -> Result<(), GatewayError> {
        let endpoint = file_endpoint(FileAction::Delete, scope)?.with_suffix(hash);
        self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        Ok(())
    }

    async fn submit(&self) -> Result<SubmitReceipt, GatewayError> {
        let endpoint = Endpoint::new("student_submit");
        let body =
            self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        Ok(SubmitReceipt { submitted_on: submitted_on_from_body(&body).unwrap_or_else(now_utc) })
    }

    async fn fetch_grading_set(&self) -> Result<GradingSetSnapshot, GatewayError> {
        let endpoint = Endpoint::new("get_staff_grading_data");
        let body =
            self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        decode_grading_set(&body)
    }

    async fn enter_grade(
        &self,
        module_id: &ModuleId,
        score: f64,
        comment: &str,
    ) -> Result<GradeConfirmation, GatewayError> {
        let endpoint = Endpoint::new("staff_enter_grade");
        let grade = score.to_string();
        let request = self.post(&endpoint).form(&[
            ("module_id", module_id.as_str()),
            ("grade", grade.as_str()),
            ("comment", comment),
        ]);
        self.grade_confirmation(request, endpoint.handler).await
    }

    async fn remove_grade(&self, module_id: &ModuleId) -> Result<GradeConfirmation, GatewayError> {
        let endpoint = Endpoint::new("staff_remove_grade").for_module(module_id);
        self.grade_confirmation(self.get(&endpoint), endpoint.handler).await
    }

    async fn reopen_one(&self, module_id: &ModuleId) -> Result<(), GatewayError> {
        let endpoint = Endpoint::new("staff_reopen_submission").for_module(module_id);
        self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        Ok(())
    }

    async fn remove_one(&self, module_id: &ModuleId) -> Result<(), GatewayError> {
        let endpoint = Endpoint::new("staff_remove_submission").for_module(module_id);
        self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        Ok(())
    }

    async fn reopen_all(&self) -> Result<(), GatewayError> {
        let endpoint = Endpoint::new("staff_reopen_all_submissions");
        self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), GatewayError> {
        let endpoint = Endpoint::new("staff_remove_all_submissions");
        self.send_text(self.get(&endpoint), endpoint.handler, StatusPolicy::Plain).await?;
        Ok(())
    }
}

async fn send(request: RequestBuilder, handler: &'static str) -> Result<Response, GatewayError> {
    request.send().await.map_err(|err| {
        tracing::warn!(handler, error = %err, "Handler request failed");
        GatewayError::Transport(err.to_string())
    })
}

fn with_module_id(request: RequestBuilder, endpoint: &Endpoint) -> RequestBuilder {
    match &endpoint.module_id {
        Some(module_id) => request.query(&[("module_id", module_id.as_str())]),
        None => request,
    }
}

/// Students upload submissions; staff upload annotations. Each uses its own
/// multipart field name.
fn upload_endpoint(scope: &FileScope) -> Result<(Endpoint, &'static str), GatewayError> {
    match (&scope.owner, scope.list) {
        (Owner::Student, FileList::Uploaded) => {
            Ok((Endpoint::new("student_upload_file"), "assignment"))
        }
        (owner @ Owner::Staff(_), FileList::Annotated) => {
            Ok((Endpoint::new("staff_upload_annotated").for_owner(owner), "annotation"))
        }
        (Owner::Student, FileList::Annotated) => {
            Err(GatewayError::Unsupported("student annotation upload"))
        }
        (Owner::Staff(_), FileList::Uploaded) => {
            Err(GatewayError::Unsupported("staff submission upload"))
        }
    }
}

fn file_endpoint(action: FileAction, scope: &FileScope) -> Result<Endpoint, GatewayError> {
    let staff = matches!(scope.owner, Owner::Staff(_));
    let handler = match (action, staff, scope.list) {
        (FileAction::Download, false, FileList::Uploaded) => "student_download_file",
        (FileAction::Download, false, FileList::Annotated) => "student_download_annotated",
        (FileAction::Download, true, FileList::Uploaded) => "staff_download_file",
        (FileAction::Download, true, FileList::Annotated) => "staff_download_annotated",
        (FileAction::DownloadZipped, false, FileList::Uploaded) => "student_download_zipped",
        (FileAction::DownloadZipped, false, FileList::Annotated) => {
            "student_download_annotated_zipped"
        }
        (FileAction::DownloadZipped, true, FileList::Uploaded) => "staff_download_zipped",
        (FileAction::DownloadZipped, true, FileList::Annotated) => {
            "staff_download_annotated_zipped"
        }
        (FileAction::Delete, false, FileList::Uploaded) => "student_delete_file",
        (FileAction::Delete, true, FileList::Uploaded) => "staff_delete_file",
        (FileAction::Delete, true, FileList::Annotated) => "staff_delete_annotated",
        (FileAction::Delete, false, FileList::Annotated) => {
            return Err(GatewayError::Unsupported("student annotation delete"));
        }
    };
    Ok(Endpoint::new(handler).for_owner(&scope.owner))
}

fn map_status(status: u16, body: String, policy: StatusPolicy) -> Result<String, GatewayError> {
    match status {
        200..=299 => Ok(body),
        404 => Err(GatewayError::NotFound),
        409 => Err(GatewayError::InvalidTransition),
        400 if policy == StatusPolicy::GradeEntry => Err(GatewayError::GradeOutOfRange),
        _ => Err(GatewayError::Status { status, body }),
    }
}

fn decode_grading_set(body: &str) -> Result<GradingSetSnapshot, GatewayError> {
    let set: GradingSetSnapshot =
        serde_json::from_str(body).map_err(|err| GatewayError::Decode(err.to_string()))?;
    set.validate().map_err(|err| GatewayError::Decode(err.to_string()))?;
    Ok(set)
}

/// Grade handlers answer with the whole grading set; a single row is
/// accepted as well.
fn decode_confirmation(body: &str) -> Result<GradeConfirmation, GatewayError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| GatewayError::Decode(err.to_string()))?;
    if value.get("assignments").is_some() {
        return decode_grading_set(body).map(GradeConfirmation::Set);
    }

    let row: SubmissionSnapshot =
        serde_json::from_value(value).map_err(|err| GatewayError::Decode(err.to_string()))?;
    row.validate().map_err(|err| GatewayError::Decode(err.to_string()))?;
    Ok(GradeConfirmation::Row(row))
}

fn submitted_on_from_body(body: &str) -> Option<OffsetDateTime> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("submission_time").and_then(Value::as_str).and_then(parse_submission_time)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn staff(id: &str, list: FileList) -> FileScope {
        FileScope::new(Owner::Staff(ModuleId::from(id)), list)
    }

    #[test]
    fn student_files_route_to_student_handlers() {
        let scope = FileScope::new(Owner::Student, FileList::Uploaded);
        let endpoint = file_endpoint(FileAction::Download, &scope)
            .expect("route")
            .with_suffix(&ContentHash::new("abc123"));

        assert_eq!(endpoint.path(), "student_download_file/abc123");
        assert_eq!(endpoint.module_id, None);
        assert_eq!(
            file_endpoint(FileAction::DownloadZipped, &scope).expect("route").handler,
            "student_download_zipped"
        );
    }

    #[test]
    fn staff_routes_carry_module_id() {
        let endpoint = file_endpoint(FileAction::Delete, &staff("m7", FileList::Annotated))
            .expect("route")
            .with_suffix(&ContentHash::new("h1"));

        assert_eq!(endpoint.path(), "staff_delete_annotated/h1");
        assert_eq!(endpoint.module_id, Some(ModuleId::from("m7")));
    }

    #[test]
    fn uploads_pick_handler_and_field() {
        let (student, field) =
            upload_endpoint(&FileScope::new(Owner::Student, FileList::Uploaded)).expect("route");
        assert_eq!((student.handler, field), ("student_upload_file", "assignment"));

        let (staff_endpoint, field) =
            upload_endpoint(&staff("m1", FileList::Annotated)).expect("route");
        assert_eq!((staff_endpoint.handler, field), ("staff_upload_annotated", "annotation"));

        assert!(matches!(
            upload_endpoint(&staff("m1", FileList::Uploaded)),
            Err(GatewayError::Unsupported(_))
        ));
    }

    #[test]
    fn students_cannot_delete_annotations() {
        let scope = FileScope::new(Owner::Student, FileList::Annotated);
        assert!(matches!(
            file_endpoint(FileAction::Delete, &scope),
            Err(GatewayError::Unsupported(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_status(204, String::new(), StatusPolicy::Plain), Ok(String::new()));
        assert_eq!(map_status(404, String::new(), StatusPolicy::Plain), Err(GatewayError::NotFound));
        assert_eq!(
            map_status(409, String::new(), StatusPolicy::Plain),
            Err(GatewayError::InvalidTransition)
        );
        assert_eq!(
            map_status(400, String::new(), StatusPolicy::GradeEntry),
            Err(GatewayError::GradeOutOfRange)
        );
        assert_eq!(
            map_status(400, "bad".to_string(), StatusPolicy::Plain),
            Err(GatewayError::Status { status: 400, body: "bad".to_string() })
        );
    }

    #[test]
    fn confirmation_accepts_set_or_row() {
        let set = json!({"assignments": [], "max_score": 10});
        assert!(matches!(
            decode_confirmation(&set.to_string()),
            Ok(GradeConfirmation::Set(_))
        ));

        let row = json!({
            "module_id": 4,
            "uploaded": [],
            "annotated": [],
            "submitted": true,
            "score": 3
        });
        match decode_confirmation(&row.to_string()) {
            Ok(GradeConfirmation::Row(row)) => assert_eq!(row.module_id.as_str(), "4"),
            other => panic!("unexpected confirmation: {other:?}"),
        }

        assert!(matches!(decode_confirmation("<html>"), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn submit_timestamp_falls_back_when_absent() {
        assert!(submitted_on_from_body("").is_none());
        let body = json!({"submission_time": "2025-01-02T10:20:30Z"}).to_string();
        assert!(submitted_on_from_body(&body).is_some());
    }
}
