use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::error::TestpadError;
use super::model::{FolderNode, NewRun, NewScript, Note, Project, Script};
use super::shapes::{extract_folder, extract_list, extract_object};
use crate::config::DEFAULT_RETRY_AFTER_SECS;
use crate::credentials::CredentialProvider;

/// The slice of the Testpad API the round orchestrator and the dashboard
/// statistics depend on.
#[async_trait]
pub trait TestpadApi: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, TestpadError>;

    /// The project root folder tree.
    async fn list_folders(
        &self,
        project_id: u64,
        query: &FolderQuery,
    ) -> Result<FolderNode, TestpadError>;

    async fn get_folder(
        &self,
        project_id: u64,
        folder_id: &str,
        query: &FolderQuery,
    ) -> Result<FolderNode, TestpadError>;

    /// Full script detail: tests, fields and runs.
    async fn get_script(&self, script_id: u64) -> Result<Script, TestpadError>;

    /// Returns the raw creation response; the id may sit in several places.
    async fn create_folder(
        &self,
        project_id: u64,
        name: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<Value, TestpadError>;

    async fn create_script(
        &self,
        project_id: u64,
        folder_id: &str,
        script: &NewScript,
    ) -> Result<Value, TestpadError>;
}

// --- Folder query flags ---

/// Sub-resource inclusion flags for the folder endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderQuery {
    pub subfolders: &'static str,
    pub scripts: &'static str,
    pub tests: &'static str,
    pub fields: &'static str,
    pub runs: &'static str,
    pub results: &'static str,
    pub progress: &'static str,
}

impl FolderQuery {
    /// Project browsing: whole tree, terse scripts, full runs and progress.
    pub fn listing() -> Self {
        Self {
            subfolders: "all",
            scripts: "terse",
            tests: "none",
            fields: "none",
            runs: "full",
            results: "none",
            progress: "full",
        }
    }

    /// A single folder: terse runs carry assignee and state.
    pub fn folder_detail() -> Self {
        Self {
            runs: "terse",
            ..Self::listing()
        }
    }

    /// Names and hierarchy only, as read by the round orchestrator.
    pub fn structure() -> Self {
        Self {
            runs: "none",
            ..Self::listing()
        }
    }

    /// Top-level folders only, used to find a folder by name.
    pub fn top_level() -> Self {
        Self {
            subfolders: "none",
            scripts: "none",
            tests: "none",
            fields: "none",
            runs: "none",
            results: "none",
            progress: "none",
        }
    }

    /// Everything result aggregation needs: tests, runs and their results.
    pub fn insights() -> Self {
        Self {
            subfolders: "all",
            scripts: "full",
            tests: "full",
            fields: "none",
            runs: "full",
            results: "full",
            progress: "full",
        }
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("subfolders", self.subfolders)
            .append_pair("scripts", self.scripts)
            .append_pair("tests", self.tests)
            .append_pair("fields", self.fields)
            .append_pair("runs", self.runs)
            .append_pair("results", self.results)
            .append_pair("progress", self.progress)
            .finish()
    }
}

// --- Transport ---

/// Seconds to wait as told by a 429's `Retry-After`, defaulting to 60.
pub fn parse_retry_after(value: Option<&HeaderValue>) -> u64 {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown status");
    let body = body.trim();
    if body.is_empty() {
        format!("API error: {}", reason)
    } else {
        let snippet: String = body.chars().take(200).collect();
        format!("API error: {} ({})", reason, snippet)
    }
}

fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T, TestpadError> {
    T::deserialize(value)
        .map_err(|e| TestpadError::InvalidResponse(format!("Unexpected response for {}: {}", what, e)))
}

/// Authenticated HTTP client for the Testpad REST API.
pub struct TestpadClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl TestpadClient {
    /// `timeout` of `None` leaves request timing to the transport defaults.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Option<Duration>,
    ) -> Result<Self, TestpadError> {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(4);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TestpadError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Issue one authenticated request and classify the outcome.
    ///
    /// Fails with `Unauthenticated` before touching the network when no key
    /// is stored. An empty success body decodes as `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, TestpadError> {
        let key = self
            .credentials
            .get()
            .ok_or(TestpadError::Unauthenticated)?;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Testpad {} {}", method, endpoint);

        let mut req = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("apikey {}", key))
            .header("X-API-Key", key.as_str());
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TestpadError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TestpadError::InvalidCredential);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = parse_retry_after(resp.headers().get(RETRY_AFTER));
            return Err(TestpadError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TestpadError::Api {
                status: status.as_u16(),
                message: api_error_message(status, &body),
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| TestpadError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            TestpadError::InvalidResponse(format!("{} returned invalid JSON: {}", endpoint, e))
        })
    }

    async fn get(&self, endpoint: &str) -> Result<Value, TestpadError> {
        self.request(Method::GET, endpoint, None).await
    }

    /// A key is valid if it can list projects.
    pub async fn validate_credential(&self) -> Result<(), TestpadError> {
        self.list_projects().await.map(|_| ())
    }

    pub async fn get_project(&self, project_id: u64) -> Result<Project, TestpadError> {
        let resp = self.get(&format!("/projects/{}", project_id)).await?;
        decode(extract_object(&resp, "project"), "project")
    }

    pub async fn create_run(&self, script_id: u64, run: &NewRun) -> Result<Value, TestpadError> {
        let body = serde_json::to_value(run)
            .map_err(|e| TestpadError::InvalidResponse(format!("Unencodable run: {}", e)))?;
        self.request(
            Method::POST,
            &format!("/scripts/{}/runs", script_id),
            Some(&body),
        )
        .await
    }

    pub async fn list_notes(&self, project_id: u64) -> Result<Vec<Note>, TestpadError> {
        let resp = self.get(&format!("/projects/{}/notes", project_id)).await?;
        decode_notes(&resp)
    }

    pub async fn list_folder_notes(
        &self,
        project_id: u64,
        folder_id: &str,
    ) -> Result<Vec<Note>, TestpadError> {
        let resp = self
            .get(&format!("/projects/{}/folders/{}/notes", project_id, folder_id))
            .await?;
        decode_notes(&resp)
    }

    pub async fn create_note(
        &self,
        project_id: u64,
        content: &str,
        folder_id: Option<&str>,
    ) -> Result<Value, TestpadError> {
        let endpoint = match folder_id {
            Some(folder_id) => format!("/projects/{}/folders/{}/notes", project_id, folder_id),
            None => format!("/projects/{}/notes", project_id),
        };
        let body = json!({ "content": content });
        self.request(Method::POST, &endpoint, Some(&body)).await
    }

    pub async fn update_note(
        &self,
        project_id: u64,
        note_id: &str,
        content: &str,
    ) -> Result<Note, TestpadError> {
        let body = json!({ "content": content });
        let resp = self
            .request(
                Method::PATCH,
                &format!("/projects/{}/notes/{}", project_id, note_id),
                Some(&body),
            )
            .await?;
        decode(extract_object(&resp, "note"), "note")
    }
}

fn decode_notes(resp: &Value) -> Result<Vec<Note>, TestpadError> {
    let items = extract_list(resp, "notes").ok_or_else(|| {
        TestpadError::InvalidResponse("Unexpected response for notes".to_string())
    })?;
    items.iter().map(|item| decode(item, "note")).collect()
}

#[async_trait]
impl TestpadApi for TestpadClient {
    async fn list_projects(&self) -> Result<Vec<Project>, TestpadError> {
        let resp = self.get("/projects").await?;
        let items = extract_list(&resp, "projects").ok_or_else(|| {
            TestpadError::InvalidResponse("Unexpected response for projects".to_string())
        })?;
        items.iter().map(|item| decode(item, "project")).collect()
    }

    async fn list_folders(
        &self,
        project_id: u64,
        query: &FolderQuery,
    ) -> Result<FolderNode, TestpadError> {
        let endpoint = format!(
            "/projects/{}/folders?{}",
            project_id,
            query.to_query_string()
        );
        let resp = self.get(&endpoint).await?;
        match extract_folder(&resp) {
            Some(Ok(folder)) => Ok(folder),
            Some(Err(e)) => Err(TestpadError::InvalidResponse(format!(
                "Unexpected response for folders: {}",
                e
            ))),
            None => Err(TestpadError::InvalidResponse(
                "Unexpected response for folders".to_string(),
            )),
        }
    }

    async fn get_folder(
        &self,
        project_id: u64,
        folder_id: &str,
        query: &FolderQuery,
    ) -> Result<FolderNode, TestpadError> {
        let endpoint = format!(
            "/projects/{}/folders/{}?{}",
            project_id,
            folder_id,
            query.to_query_string()
        );
        let resp = self.get(&endpoint).await?;
        match extract_folder(&resp) {
            Some(Ok(folder)) => Ok(folder),
            Some(Err(e)) => Err(TestpadError::InvalidResponse(format!(
                "Unexpected response for folder {}: {}",
                folder_id, e
            ))),
            None => Err(TestpadError::InvalidResponse(format!(
                "Unexpected response for folder {}",
                folder_id
            ))),
        }
    }

    async fn get_script(&self, script_id: u64) -> Result<Script, TestpadError> {
        let resp = self
            .get(&format!("/scripts/{}?runs=full&tests=full", script_id))
            .await?;
        decode(extract_object(&resp, "script"), "script")
    }

    async fn create_folder(
        &self,
        project_id: u64,
        name: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<Value, TestpadError> {
        let endpoint = match parent_folder_id {
            Some(parent) => format!("/projects/{}/folders/{}/folders", project_id, parent),
            None => format!("/projects/{}/folders", project_id),
        };
        let body = json!({ "name": name });
        self.request(Method::POST, &endpoint, Some(&body)).await
    }

    async fn create_script(
        &self,
        project_id: u64,
        folder_id: &str,
        script: &NewScript,
    ) -> Result<Value, TestpadError> {
        let body = serde_json::to_value(script)
            .map_err(|e| TestpadError::InvalidResponse(format!("Unencodable script: {}", e)))?;
        self.request(
            Method::POST,
            &format!("/projects/{}/folders/{}/scripts", project_id, folder_id),
            Some(&body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_parsing() {
        let five = HeaderValue::from_static("5");
        assert_eq!(parse_retry_after(Some(&five)), 5);
        let junk = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&junk)), DEFAULT_RETRY_AFTER_SECS);
        assert_eq!(parse_retry_after(None), DEFAULT_RETRY_AFTER_SECS);
    }

    #[test]
    fn test_folder_query_strings() {
        assert_eq!(
            FolderQuery::structure().to_query_string(),
            "subfolders=all&scripts=terse&tests=none&fields=none&runs=none&results=none&progress=full"
        );
        assert_eq!(FolderQuery::folder_detail().runs, "terse");
        assert_eq!(FolderQuery::top_level().subfolders, "none");
    }

    #[test]
    fn test_api_error_message_truncates_body() {
        let long = "x".repeat(500);
        let msg = api_error_message(StatusCode::BAD_GATEWAY, &long);
        assert!(msg.starts_with("API error: Bad Gateway ("));
        assert!(msg.len() < 260);
        assert_eq!(
            api_error_message(StatusCode::NOT_FOUND, ""),
            "API error: Not Found"
        );
    }
}
