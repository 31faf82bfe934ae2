//! Remote queue client implementation using reqwest.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use offcast_runtime::remote::{
    ClientId, HistoryEntry, NodeOutputs, PromptId, RemoteOs, RemoteQueue, RemoteStatus,
    ResourceRef, StorageArea, SubmitRequest, UploadPayload,
};
use offcast_runtime::{OffloadError, OffloadResult};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::RemoteClientConfig;
use crate::error::{Error, Result};

/// Tracing target for remote queue operations.
pub const TRACING_TARGET: &str = "offcast_reqwest::client";

/// Inner client that holds the HTTP client and configuration.
struct RemoteClientInner {
    http: Client,
    config: RemoteClientConfig,
    label: String,
}

impl std::fmt::Debug for RemoteClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClientInner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// HTTP client for one remote worker's job queue.
///
/// Implements the [`RemoteQueue`] trait over the worker's REST
/// surface. Cheap to clone; all clones share one connection pool.
///
/// # Examples
///
/// ```rust,ignore
/// use offcast_reqwest::{RemoteClient, RemoteClientConfig};
/// use url::Url;
///
/// let config = RemoteClientConfig::new(Url::parse("http://127.0.0.1:8188")?);
/// let client = RemoteClient::new(config)?;
/// let prompt_id = client.submit(&request).await?;
/// ```
#[derive(Clone, Debug)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

impl RemoteClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: RemoteClientConfig) -> Result<Self> {
        tracing::debug!(
            target: TRACING_TARGET,
            endpoint = %config.endpoint,
            "Creating remote queue client"
        );

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .build()?;

        let label = config.endpoint_label();
        let inner = RemoteClientInner {
            http,
            config,
            label,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &RemoteClientConfig {
        &self.inner.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.label, path)
    }
}

#[async_trait::async_trait]
impl RemoteQueue for RemoteClient {
    fn endpoint(&self) -> &str {
        &self.inner.label
    }

    async fn submit(&self, request: &SubmitRequest) -> OffloadResult<PromptId> {
        tracing::debug!(
            target: TRACING_TARGET,
            endpoint = %self.inner.label,
            job_id = %request.extra_data.job_id,
            "Submitting prompt"
        );

        let response = self
            .inner
            .http
            .post(self.url("/prompt"))
            .timeout(self.inner.config.effective_control_timeout())
            .json(request)
            .send()
            .await
            .map_err(Error::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                target: TRACING_TARGET,
                status = status.as_u16(),
                body = %body,
                "Remote rejected prompt"
            );
            return Err(OffloadError::DispatchRejected {
                message: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        let parsed: PromptResponse = response.json().await.map_err(Error::from)?;
        Ok(PromptId::new(parsed.prompt_id))
    }

    async fn history(&self, prompt: &PromptId) -> OffloadResult<Option<HistoryEntry>> {
        let response = self
            .inner
            .http
            .get(self.url(&format!("/history/{}", prompt)))
            .timeout(self.inner.config.effective_control_timeout())
            .send()
            .await
            .map_err(Error::from)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(OffloadError::Transport {
                message: format!("history returned HTTP {}", status.as_u16()),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(Error::from)?;
        parse_history_response(prompt.as_str(), body).map_err(OffloadError::from)
    }

    async fn upload(&self, payload: UploadPayload) -> OffloadResult<ResourceRef> {
        tracing::debug!(
            target: TRACING_TARGET,
            endpoint = %self.inner.label,
            suggested_name = %payload.suggested_name,
            size = payload.bytes.len(),
            "Uploading resource"
        );

        let part = Part::bytes(payload.bytes.to_vec()).file_name(payload.suggested_name.clone());
        let form = Form::new()
            .part("image", part)
            .text("type", payload.area.to_string())
            .text("overwrite", payload.overwrite.to_string());

        let response = self
            .inner
            .http
            .post(self.url("/upload/image"))
            .timeout(self.inner.config.effective_data_timeout())
            .multipart(form)
            .send()
            .await
            .map_err(|err| OffloadError::Upload {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OffloadError::Upload {
                message: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        let parsed: UploadResponse = response.json().await.map_err(Error::from)?;
        let resource = ResourceRef {
            filename: parsed.name,
            subfolder: parsed.subfolder,
            area: parsed.area.unwrap_or(StorageArea::Input),
        };

        tracing::debug!(
            target: TRACING_TARGET,
            filename = %resource.filename,
            "Resource uploaded"
        );
        // The stored name is authoritative; the suggested name may
        // have collided.
        Ok(resource)
    }

    async fn download(&self, resource: &ResourceRef) -> OffloadResult<Bytes> {
        let area = resource.area.to_string();
        let response = self
            .inner
            .http
            .get(self.url("/view"))
            .timeout(self.inner.config.effective_data_timeout())
            .query(&[
                ("filename", resource.filename.as_str()),
                ("subfolder", resource.subfolder.as_str()),
                ("type", area.as_str()),
            ])
            .send()
            .await
            .map_err(Error::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OffloadError::Fetch {
                message: format!("view of {} returned HTTP {}", resource.filename, status.as_u16()),
            });
        }

        response
            .bytes()
            .await
            .map_err(|err| OffloadError::from(Error::from(err)))
    }

    async fn cancel_session(&self, client: &ClientId) -> OffloadResult<()> {
        let response = self
            .inner
            .http
            .get(self.url("/queue"))
            .timeout(self.inner.config.effective_control_timeout())
            .send()
            .await
            .map_err(Error::from)?;
        let queue: QueueResponse = response.json().await.map_err(Error::from)?;

        let session = client.to_string();
        let pending = session_entries(&queue.queue_pending, &session);
        if !pending.is_empty() {
            tracing::debug!(
                target: TRACING_TARGET,
                count = pending.len(),
                "Deleting pending session jobs"
            );
            self.inner
                .http
                .post(self.url("/queue"))
                .timeout(self.inner.config.effective_control_timeout())
                .json(&serde_json::json!({ "delete": pending }))
                .send()
                .await
                .map_err(Error::from)?;
        }

        if !session_entries(&queue.queue_running, &session).is_empty() {
            tracing::debug!(target: TRACING_TARGET, "Interrupting running session job");
            self.inner
                .http
                .post(self.url("/interrupt"))
                .timeout(self.inner.config.effective_control_timeout())
                .json(&serde_json::json!({}))
                .send()
                .await
                .map_err(Error::from)?;
        }

        Ok(())
    }

    async fn system_os(&self) -> OffloadResult<RemoteOs> {
        let response = self
            .inner
            .http
            .get(self.url("/system_stats"))
            .timeout(self.inner.config.effective_control_timeout())
            .send()
            .await
            .map_err(Error::from)?;
        let stats: SystemStats = response.json().await.map_err(Error::from)?;
        Ok(RemoteOs::from_identifier(&stats.system.os))
    }
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    prompt_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: String,
    #[serde(default)]
    subfolder: String,
    #[serde(default, rename = "type")]
    area: Option<StorageArea>,
}

#[derive(Debug, Default, Deserialize)]
struct QueueResponse {
    #[serde(default)]
    queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    queue_pending: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SystemStats {
    system: SystemInfo,
}

#[derive(Debug, Deserialize)]
struct SystemInfo {
    os: String,
}

#[derive(Debug, Deserialize)]
struct RawHistoryEntry {
    #[serde(default)]
    status: Option<RawStatus>,
    #[serde(default)]
    outputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStatus {
    #[serde(default)]
    status_str: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

/// Extracts our job's entry from a `/history/{id}` response body.
fn parse_history_response(
    prompt_id: &str,
    body: serde_json::Value,
) -> std::result::Result<Option<HistoryEntry>, Error> {
    let mut entries: HashMap<String, RawHistoryEntry> = serde_json::from_value(body)?;
    let Some(raw) = entries.remove(prompt_id) else {
        return Ok(None);
    };
    Ok(Some(convert_entry(raw)))
}

/// Converts a raw history record into the engine's view of it.
fn convert_entry(raw: RawHistoryEntry) -> HistoryEntry {
    let status = raw.status.unwrap_or_default();

    let remote_status = if status.status_str.as_deref() == Some("error") {
        RemoteStatus::Failed {
            message: extract_error_message(&status.messages),
        }
    } else if status.completed == Some(true) || !raw.outputs.is_empty() {
        // Older workers omit the status object but record outputs.
        RemoteStatus::Completed
    } else {
        RemoteStatus::Running
    };

    let outputs = raw
        .outputs
        .into_iter()
        .map(|(node, value)| (node.into(), parse_node_outputs(value)))
        .collect();

    HistoryEntry {
        status: remote_status,
        outputs,
    }
}

/// Splits one node's output record into stored files and inline values.
fn parse_node_outputs(value: serde_json::Value) -> NodeOutputs {
    let mut outputs = NodeOutputs::default();
    let serde_json::Value::Object(record) = value else {
        return outputs;
    };

    for (key, entry) in record {
        let files: Option<Vec<ResourceRef>> = match &entry {
            serde_json::Value::Array(items)
                if !items.is_empty()
                    && items.iter().all(|item| item.get("filename").is_some()) =>
            {
                items
                    .iter()
                    .map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            }
            _ => None,
        };

        match files {
            Some(mut files) => outputs.files.append(&mut files),
            None => {
                outputs.values.insert(key, entry);
            }
        }
    }

    outputs
}

/// Pulls the execution error message out of a status message list.
///
/// The worker records messages as `[kind, payload]` pairs; an
/// execution failure carries its text under `exception_message`.
fn extract_error_message(messages: &[serde_json::Value]) -> String {
    for message in messages {
        let Some(items) = message.as_array() else {
            continue;
        };
        if items.first().and_then(|kind| kind.as_str()) != Some("execution_error") {
            continue;
        }
        if let Some(text) = items
            .get(1)
            .and_then(|payload| payload.get("exception_message"))
            .and_then(|text| text.as_str())
        {
            return text.to_owned();
        }
    }
    "remote execution failed".to_owned()
}

/// Returns the prompt IDs of queue entries submitted by one session.
///
/// Queue entries are positional arrays; index 1 is the prompt ID and
/// index 3 the submission's extra data.
fn session_entries(entries: &[serde_json::Value], session: &str) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| {
            entry
                .get(3)
                .and_then(|extra| extra.get("client_id"))
                .and_then(|id| id.as_str())
                == Some(session)
        })
        .filter_map(|entry| entry.get(1).and_then(|id| id.as_str()))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_history_entry_absent_is_running() {
        let parsed = parse_history_response("42", json!({})).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_history_completed_with_images() {
        let body = json!({
            "42": {
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {
                    "capture_result": {
                        "images": [
                            {"filename": "out_0001.png", "subfolder": "", "type": "output"}
                        ]
                    }
                }
            }
        });

        let entry = parse_history_response("42", body).unwrap().unwrap();
        assert_eq!(entry.status, RemoteStatus::Completed);

        let outputs = entry.outputs_of(&"capture_result".into()).unwrap();
        assert_eq!(outputs.files.len(), 1);
        assert_eq!(outputs.files[0].filename, "out_0001.png");
        assert_eq!(outputs.files[0].area, StorageArea::Output);
    }

    #[test]
    fn test_history_error_extracts_exception_message() {
        let body = json!({
            "42": {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", {}],
                        ["execution_error", {"exception_message": "CUDA out of memory"}]
                    ]
                },
                "outputs": {}
            }
        });

        let entry = parse_history_response("42", body).unwrap().unwrap();
        assert_eq!(
            entry.status,
            RemoteStatus::Failed {
                message: "CUDA out of memory".into()
            }
        );
    }

    #[test]
    fn test_history_without_status_but_with_outputs_is_completed() {
        let body = json!({
            "42": {
                "outputs": {
                    "9": {"text": ["done"]}
                }
            }
        });

        let entry = parse_history_response("42", body).unwrap().unwrap();
        assert_eq!(entry.status, RemoteStatus::Completed);
        let outputs = entry.outputs_of(&"9".into()).unwrap();
        assert_eq!(outputs.values.get("text"), Some(&json!(["done"])));
    }

    #[test]
    fn test_node_outputs_split_files_from_values() {
        let outputs = parse_node_outputs(json!({
            "images": [
                {"filename": "a.png", "subfolder": "", "type": "temp"},
                {"filename": "b.png", "subfolder": "", "type": "temp"}
            ],
            "value": 7
        }));

        assert_eq!(outputs.files.len(), 2);
        assert_eq!(outputs.primitive(), Some(&json!(7)));
    }

    #[test]
    fn test_session_entries_filter_by_client_id() {
        let entries = vec![
            json!([0, "job-a", {}, {"client_id": "mine"}]),
            json!([1, "job-b", {}, {"client_id": "theirs"}]),
            json!([2, "job-c", {}, {"client_id": "mine"}]),
        ];

        assert_eq!(
            session_entries(&entries, "mine"),
            vec!["job-a".to_owned(), "job-c".to_owned()]
        );
    }

    #[test]
    fn test_upload_response_parses_renamed_area() {
        let parsed: UploadResponse = serde_json::from_value(json!({
            "name": "cat_0001.png",
            "subfolder": "",
            "type": "input"
        }))
        .unwrap();
        assert_eq!(parsed.name, "cat_0001.png");
        assert_eq!(parsed.area, Some(StorageArea::Input));
    }

    #[test]
    fn test_client_creation() {
        let config = RemoteClientConfig::new(url::Url::parse("http://127.0.0.1:8188").unwrap());
        assert!(RemoteClient::new(config).is_ok());
    }
}
