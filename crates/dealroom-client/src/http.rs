//! REST implementation of the backend contracts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use dealroom_shared::constants::UPLOAD_CHUNK_SIZE;
use dealroom_shared::{DealFields, DraftId, FileMetadata, MetadataPatch, UploadFile};

use crate::backend::{
    BackendError, BackendResult, DraftBackend, FileBackend, ProgressFn, RemoteFile,
};
use crate::config::ClientConfig;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: Value,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_ids(&self, path: &str, body: Value) -> BackendResult<()> {
        let resp = self.client.post(self.url(path)).json(&body).send().await?;
        check(resp).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into a [`BackendError`].
async fn check(resp: Response) -> BackendResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(parse_error_body(status.as_u16(), &body))
}

async fn read_id(resp: Response) -> BackendResult<String> {
    let parsed: IdResponse = check(resp).await?.json().await?;
    match parsed.id {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(BackendError::general(format!(
            "Unexpected id in response: {other}"
        ))),
    }
}

/// Understands `{"detail": ".."}`, `{"error": ".."}`, `{"message": ".."}`
/// and field maps (`{"name": ["required"]}`, optionally under `"errors"`).
pub(crate) fn parse_error_body(status: u16, body: &str) -> BackendError {
    let fallback = || BackendError::general(format!("Server responded with status {status}"));

    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(body) else {
        return fallback();
    };

    for key in ["detail", "error", "message"] {
        if let Some(Value::String(message)) = map.get(key) {
            return BackendError::general(message.clone());
        }
    }

    if let Some(Value::Object(errors)) = map.remove("errors") {
        map = errors;
    }

    let fields: BTreeMap<String, String> = map
        .into_iter()
        .filter_map(|(field, value)| {
            let message = match value {
                Value::String(s) => s,
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => return None,
            };
            (!message.is_empty()).then_some((field, message))
        })
        .collect();

    if fields.is_empty() {
        fallback()
    } else {
        BackendError::Validation(fields)
    }
}

fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        100
    } else {
        (sent.saturating_mul(100) / total).min(100) as u8
    }
}

/// Chunked request body that reports progress as reqwest pulls it.
fn progress_body(content: Bytes, progress: ProgressFn) -> Body {
    Body::wrap_stream(progress_stream(content, progress))
}

fn progress_stream(
    content: Bytes,
    progress: ProgressFn,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let total = content.len() as u64;
    let chunks: Vec<Bytes> = (0..content.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| content.slice(start..(start + UPLOAD_CHUNK_SIZE).min(content.len())))
        .collect();

    let mut sent = 0u64;
    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress(percent(sent, total));
        Ok::<Bytes, std::io::Error>(chunk)
    }))
}

#[async_trait]
impl DraftBackend for HttpBackend {
    async fn create(&self, fields: &DealFields) -> BackendResult<DraftId> {
        let resp = self
            .client
            .post(self.url("deals/drafts/"))
            .json(fields)
            .send()
            .await?;
        let id = read_id(resp).await?;
        info!(draft_id = %id, "backend draft created");
        Ok(DraftId(id))
    }

    async fn update(&self, id: &DraftId, fields: &DealFields) -> BackendResult<DraftId> {
        let resp = self
            .client
            .put(self.url(&format!("deals/drafts/{id}/")))
            .json(fields)
            .send()
            .await?;
        let id = read_id(resp).await?;
        debug!(draft_id = %id, "backend draft updated");
        Ok(DraftId(id))
    }

    async fn upload_file(
        &self,
        draft_id: &DraftId,
        file: &UploadFile,
        metadata: &FileMetadata,
        progress: ProgressFn,
    ) -> BackendResult<()> {
        let content = file
            .content
            .clone()
            .ok_or_else(|| BackendError::general("File content is not available"))?;
        let length = content.len() as u64;

        let part = Part::stream_with_length(progress_body(content, progress), length)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| BackendError::general(format!("Invalid metadata: {e}")))?;
        let form = Form::new().part("file", part).text("metadata", metadata_json);

        let resp = self
            .client
            .post(self.url(&format!("deals/drafts/{draft_id}/files/")))
            .multipart(form)
            .send()
            .await?;
        check(resp).await?;

        debug!(draft_id = %draft_id, file_name = %file.name, size = length, "file uploaded");
        Ok(())
    }

    async fn finalize(&self, id: &DraftId) -> BackendResult<String> {
        let resp = self
            .client
            .post(self.url(&format!("deals/drafts/{id}/finalize/")))
            .send()
            .await?;
        let final_id = read_id(resp).await?;
        info!(draft_id = %id, deal_id = %final_id, "draft finalized");
        Ok(final_id)
    }
}

#[async_trait]
impl FileBackend for HttpBackend {
    async fn list(&self, scope_id: Option<&str>) -> BackendResult<Vec<RemoteFile>> {
        let mut request = self.client.get(self.url("files/"));
        if let Some(scope) = scope_id {
            request = request.query(&[("scope", scope)]);
        }
        let files: Vec<RemoteFile> = check(request.send().await?).await?.json().await?;
        debug!(count = files.len(), scope = ?scope_id, "files listed");
        Ok(files)
    }

    async fn update(&self, file_id: &str, patch: &MetadataPatch) -> BackendResult<()> {
        let resp = self
            .client
            .patch(self.url(&format!("files/{file_id}/")))
            .json(patch)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> BackendResult<()> {
        let resp = self
            .client
            .delete(self.url(&format!("files/{file_id}/")))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn reprocess(&self, file_id: &str) -> BackendResult<()> {
        let resp = self
            .client
            .post(self.url(&format!("files/{file_id}/reprocess/")))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn bulk_delete(&self, file_ids: &[String]) -> BackendResult<()> {
        self.post_ids("files/bulk-delete/", json!({ "ids": file_ids }))
            .await
    }

    async fn bulk_update(&self, file_ids: &[String], patch: &MetadataPatch) -> BackendResult<()> {
        self.post_ids(
            "files/bulk-update/",
            json!({ "ids": file_ids, "patch": patch }),
        )
        .await
    }

    async fn bulk_reprocess(&self, file_ids: &[String]) -> BackendResult<()> {
        self.post_ids("files/bulk-reprocess/", json!({ "ids": file_ids }))
            .await
    }

    async fn download(&self, file_id: &str) -> BackendResult<Bytes> {
        let resp = self
            .client
            .get(self.url(&format!("files/{file_id}/download/")))
            .send()
            .await?;
        Ok(check(resp).await?.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::StreamExt;

    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let backend = HttpBackend::new("https://deals.example.com/api/");
        assert_eq!(
            backend.url("/files/"),
            "https://deals.example.com/api/files/"
        );
    }

    #[test]
    fn test_parses_field_errors() {
        let err = parse_error_body(
            400,
            r#"{"name": ["This field is required."], "website": "Enter a valid URL.", "count": 3}"#,
        );
        let fields = err.field_errors().unwrap();
        assert_eq!(fields["name"], "This field is required.");
        assert_eq!(fields["website"], "Enter a valid URL.");
        assert!(!fields.contains_key("count"));
    }

    #[test]
    fn test_parses_nested_errors_and_general_messages() {
        let nested = parse_error_body(422, r#"{"errors": {"funding_target": ["Must be positive."]}}"#);
        assert_eq!(
            nested.field_errors().unwrap()["funding_target"],
            "Must be positive."
        );

        let general = parse_error_body(403, r#"{"detail": "Not allowed."}"#);
        assert_eq!(general.to_string(), "Not allowed.");

        let garbage = parse_error_body(502, "<html>bad gateway</html>");
        assert_eq!(garbage.to_string(), "Server responded with status 502");
    }

    #[test]
    fn test_percent_is_bounded() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(300, 200), 100);
    }

    #[tokio::test]
    async fn test_progress_stream_reports_each_chunk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let content = Bytes::from(vec![0u8; UPLOAD_CHUNK_SIZE * 2 + 10]);

        let stream = progress_stream(
            content.clone(),
            Arc::new(move |p| sink.lock().unwrap().push(p)),
        );
        let collected: Vec<u8> = stream
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await;

        assert_eq!(collected.len(), content.len());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(*seen.last().unwrap(), 100);
    }
}
