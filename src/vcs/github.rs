//! GitHub pull requests as change sets
//!
//! Uses the REST API v3: the pull request for base/head revisions, its file
//! list for paths and patches, and the contents endpoint for raw file
//! content at a revision.
//!
//! # Authentication
//!
//! The token is read from the `GITHUB_TOKEN` environment variable.
//! Unauthenticated access works for public repositories but is heavily
//! rate limited.

use super::ChangeSource;
use crate::change::{ChangeRequest, ChangeSet, FileChange, Operation};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

/// Parse `https://github.com/<owner>/<repo>/pull/<number>`
pub fn parse_pull_request_url(url: &str) -> SyncResult<ChangeRequest> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^https?://github\.com/([^/\s]+)/([^/\s]+)/pull/(\d+)/?")
            .expect("valid pull request url regex")
    });
    let caps = pattern
        .captures(url.trim())
        .ok_or_else(|| SyncError::ConfigError(format!("Not a pull request URL: {}", url)))?;
    let number = caps[3]
        .parse()
        .map_err(|_| SyncError::ConfigError(format!("Invalid pull request number in {}", url)))?;
    Ok(ChangeRequest {
        owner: caps[1].to_string(),
        repo: caps[2].to_string(),
        number,
    })
}

#[derive(Deserialize)]
struct PullRequest {
    base: GitRef,
    head: GitRef,
}

#[derive(Deserialize)]
struct GitRef {
    sha: String,
}

#[derive(Deserialize)]
struct PullRequestFile {
    filename: String,
    status: String,
    #[serde(default)]
    patch: Option<String>,
    #[serde(default)]
    previous_filename: Option<String>,
}

/// Map one entry of the pull request file list onto file changes
///
/// A rename becomes a deletion of the old path followed by an addition of
/// the new one.
fn file_changes(file: PullRequestFile) -> Vec<FileChange> {
    let patch = file.patch.unwrap_or_default();
    match file.status.as_str() {
        "added" | "copied" => vec![FileChange::new(file.filename, Operation::Added, patch)],
        "removed" => vec![FileChange::new(file.filename, Operation::Deleted, patch)],
        "renamed" => {
            let mut changes = Vec::new();
            if let Some(previous) = file.previous_filename {
                changes.push(FileChange::new(previous, Operation::Deleted, ""));
            }
            changes.push(FileChange::new(file.filename, Operation::Added, patch));
            changes
        }
        _ => vec![FileChange::new(file.filename, Operation::Modified, patch)],
    }
}

/// GitHub REST API client for one pull request
#[derive(Clone)]
pub struct GitHubChangeSource {
    request: ChangeRequest,
    token: Option<String>,
    client: reqwest::Client,
    api_base: String,
}

impl GitHubChangeSource {
    /// Files listed per page of the pull request file list
    const PAGE_SIZE: usize = 100;

    /// GitHub stops listing pull request files after 3000 entries
    const MAX_PAGES: usize = 30;

    pub fn new(request: ChangeRequest, token: Option<String>) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| SyncError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            request,
            token: token.filter(|t| !t.trim().is_empty()),
            client,
            api_base: "https://api.github.com".to_string(),
        })
    }

    /// Create a client with the token from `GITHUB_TOKEN`, if set
    pub fn from_env(request: ChangeRequest) -> SyncResult<Self> {
        Self::new(request, std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn request(&self) -> &ChangeRequest {
        &self.request
    }

    fn repo_url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SyncError::ConfigError(format!("Invalid API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::ConfigError("API base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["repos", self.request.owner.as_str(), self.request.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, accept: &str) -> SyncResult<reqwest::Response> {
        let mut builder = self
            .client
            .get(url.clone())
            .header(USER_AGENT, "banana-docsync")
            .header(ACCEPT, accept);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncError::VcsError(format!(
                "GitHub request {} failed ({}): {}",
                url.path(),
                status,
                error_text
            )));
        }
        Ok(response)
    }

    async fn pull_request(&self) -> SyncResult<PullRequest> {
        let url = self.repo_url(&["pulls", &self.request.number.to_string()])?;
        let response = self.get(url, "application/vnd.github+json").await?;
        response
            .json()
            .await
            .map_err(|e| SyncError::VcsError(format!("Failed to parse pull request: {}", e)))
    }

    async fn pull_request_files(&self) -> SyncResult<Vec<PullRequestFile>> {
        let mut files = Vec::new();
        for page in 1..=Self::MAX_PAGES {
            let mut url = self.repo_url(&["pulls", &self.request.number.to_string(), "files"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &Self::PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
            let batch: Vec<PullRequestFile> = self
                .get(url, "application/vnd.github+json")
                .await?
                .json()
                .await
                .map_err(|e| SyncError::VcsError(format!("Failed to parse file list: {}", e)))?;
            let done = batch.len() < Self::PAGE_SIZE;
            files.extend(batch);
            if done {
                break;
            }
        }
        Ok(files)
    }
}

impl std::fmt::Debug for GitHubChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubChangeSource")
            .field("request", &self.request)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[async_trait]
impl ChangeSource for GitHubChangeSource {
    async fn change_set(&self) -> SyncResult<ChangeSet> {
        let pull = self.pull_request().await?;
        let files = self.pull_request_files().await?;
        debug!(
            "Pull request {} touches {} files",
            self.request.number,
            files.len()
        );
        let changes = files.into_iter().flat_map(file_changes).collect();
        Ok(ChangeSet::new(pull.base.sha, pull.head.sha, changes))
    }

    async fn file_bytes(&self, path: &str, revision: &str) -> SyncResult<Vec<u8>> {
        let mut url = self.repo_url(&["contents"])?;
        url.path_segments_mut()
            .map_err(|_| SyncError::ConfigError("API base URL cannot have a path".to_string()))?
            .extend(path.split('/'));
        url.query_pairs_mut().append_pair("ref", revision);
        let response = self.get(url, "application/vnd.github.raw+json").await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn source_name(&self) -> &str {
        "GitHub"
    }
}
