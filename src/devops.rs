//! Azure DevOps REST integration
//!
//! Reads pull request changes and review threads, applies thread changes, and
//! publishes the status check. The client is built once from [`Settings`] and
//! passed by reference to whatever needs it.

use crate::config::{Settings, StatusContext};
use crate::error::CheckError;
use crate::host::PullRequestHost;
use crate::reconcile::{Anchor, ReviewThread, ThreadStatus};
use crate::scope::{ChangeEntry, ChangeType};
use crate::status::CheckState;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const API_VERSION: &str = "7.1";
const API_TIMEOUT_SECS: u64 = 60;
const DIFF_PAGE_SIZE: usize = 1000;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "authorization",
        "bearer",
        "basic ",
    ];

    let truncated = if body.chars().count() > MAX_ERROR_BODY_LEN {
        let head: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}

/// Branch name without the `refs/heads/` prefix.
pub fn branch_name(ref_name: &str) -> &str {
    let trimmed = ref_name.trim_start_matches('/');
    trimmed.strip_prefix("refs/heads/").unwrap_or(trimmed)
}

/// `{org}/{project}/_apis/git/repositories/{repo}/`
pub fn repository_url(org_url: &str, project_id: &str, repo_id: &str) -> Result<Url> {
    let org = if org_url.ends_with('/') {
        org_url.to_string()
    } else {
        format!("{}/", org_url)
    };
    let base = Url::parse(&org).with_context(|| format!("Invalid organization URL: {}", org_url))?;
    base.join(&format!("{}/_apis/git/repositories/{}/", project_id, repo_id))
        .context("Failed to build repository URL")
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestDto {
    source_ref_name: String,
    target_ref_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitDiffsDto {
    #[serde(default)]
    all_changes_included: bool,
    #[serde(default)]
    changes: Vec<GitChangeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitChangeDto {
    item: Option<GitItemDto>,
    #[serde(default)]
    change_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitItemDto {
    path: Option<String>,
    commit_id: Option<String>,
    #[serde(default)]
    is_folder: bool,
}

impl GitChangeDto {
    fn into_entry(self) -> Option<ChangeEntry> {
        let item = self.item.unwrap_or(GitItemDto {
            path: None,
            commit_id: None,
            is_folder: false,
        });
        if item.is_folder {
            return None;
        }
        Some(ChangeEntry {
            file_path: item.path,
            commit_id: item.commit_id.unwrap_or_default(),
            change_type: self
                .change_type
                .as_deref()
                .map(ChangeType::from_host)
                .unwrap_or_default(),
            line_ranges: None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadDto {
    id: Option<u64>,
    status: Option<ThreadStatus>,
    #[serde(default)]
    comments: Vec<CommentDto>,
    thread_context: Option<ThreadContextDto>,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Deserialize)]
struct CommentDto {
    content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadContextDto {
    file_path: Option<String>,
    right_file_start: Option<PositionDto>,
    right_file_end: Option<PositionDto>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PositionDto {
    line: u32,
    offset: u32,
}

impl From<ThreadDto> for ReviewThread {
    fn from(dto: ThreadDto) -> Self {
        let anchor = dto.thread_context.and_then(|ctx| {
            let start = ctx.right_file_start?;
            Some(Anchor {
                file_path: ctx.file_path?,
                line: start.line,
                column: start.offset,
            })
        });
        ReviewThread {
            id: dto.id,
            status: dto.status.unwrap_or(ThreadStatus::Unknown),
            content: dto.comments.into_iter().next().and_then(|c| c.content),
            anchor,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewThreadRequest<'a> {
    comments: Vec<NewCommentRequest<'a>>,
    status: ThreadStatus,
    thread_context: ThreadContextDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewCommentRequest<'a> {
    parent_comment_id: u32,
    content: &'a str,
    comment_type: &'static str,
}

impl<'a> NewThreadRequest<'a> {
    fn new(comment: &'a str, anchor: &Anchor) -> Self {
        Self {
            comments: vec![NewCommentRequest {
                parent_comment_id: 0,
                content: comment,
                comment_type: "text",
            }],
            status: ThreadStatus::Active,
            thread_context: ThreadContextDto {
                file_path: Some(anchor.file_path.clone()),
                right_file_start: Some(PositionDto {
                    line: anchor.line,
                    offset: anchor.column,
                }),
                right_file_end: Some(PositionDto {
                    line: anchor.line,
                    offset: anchor.column.saturating_add(1),
                }),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateThreadRequest {
    status: ThreadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CreatedThreadDto {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct IterationDto {
    id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest<'a> {
    state: CheckState,
    description: &'a str,
    context: StatusContextDto<'a>,
    iteration_id: u64,
}

#[derive(Debug, Serialize)]
struct StatusContextDto<'a> {
    name: &'a str,
    genre: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: String,
}

// ============================================================================
// Client
// ============================================================================

/// Azure DevOps Git API client scoped to one pull request.
pub struct DevOpsClient {
    http: reqwest::Client,
    repository: Url,
    pull_request_id: u64,
    token: String,
    status_context: StatusContext,
}

impl DevOpsClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let env = &settings.environment;
        info!(org_url = %env.org_url, "Creating Azure DevOps connection");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent(concat!("format-check-task/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            repository: repository_url(&env.org_url, &env.project_id, &env.repo_id)?,
            pull_request_id: env.pull_request_id,
            token: env.token.clone(),
            status_context: settings.parameters.status_check_context.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .repository
            .join(path)
            .with_context(|| format!("Invalid API path: {}", path))?;
        Ok(self
            .http
            .request(method, url)
            .basic_auth("", Some(&self.token))
            .header("Accept", "application/json")
            .query(&[("api-version", API_VERSION)]))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", what))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .with_context(|| format!("Failed to parse {} response", what));
        }

        let error_body = resp.text().await.unwrap_or_default();
        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
            return Err(anyhow!(
                "Azure DevOps API error ({}) for {}: {}",
                status,
                what,
                sanitize_error_body(&api_error.message)
            ));
        }
        Err(anyhow!(
            "Azure DevOps API error ({}) for {}: {}",
            status,
            what,
            sanitize_error_body(&error_body)
        ))
    }

    fn pull_request_path(&self, rest: &str) -> String {
        format!("pullRequests/{}{}", self.pull_request_id, rest)
    }

    async fn pull_request(&self) -> Result<PullRequestDto> {
        let req = self.request(Method::GET, &self.pull_request_path(""))?;
        self.send(req, "pull request").await
    }

    async fn last_iteration_id(&self) -> Result<u64> {
        let req = self.request(Method::GET, &self.pull_request_path("/iterations"))?;
        let iterations: ListResponse<IterationDto> = self.send(req, "pull request iterations").await?;
        iterations
            .value
            .last()
            .and_then(|i| i.id)
            .ok_or_else(|| {
                CheckError::MissingIteration {
                    pull_request_id: self.pull_request_id,
                }
                .into()
            })
    }
}

impl PullRequestHost for DevOpsClient {
    async fn pull_request_changes(&self) -> Result<Vec<ChangeEntry>> {
        info!("Getting the pull request changes");
        let pr = self.pull_request().await?;
        let base = branch_name(&pr.target_ref_name).to_string();
        let target = branch_name(&pr.source_ref_name).to_string();

        let mut entries = Vec::new();
        let mut skip = 0usize;
        loop {
            let top = DIFF_PAGE_SIZE.to_string();
            let skip_param = skip.to_string();
            let req = self.request(Method::GET, "diffs/commits")?.query(&[
                ("baseVersion", base.as_str()),
                ("baseVersionType", "branch"),
                ("targetVersion", target.as_str()),
                ("targetVersionType", "branch"),
                ("diffCommonCommit", "true"),
                ("$top", top.as_str()),
                ("$skip", skip_param.as_str()),
            ]);
            let page: CommitDiffsDto = self.send(req, "commit diffs").await?;
            let count = page.changes.len();
            entries.extend(page.changes.into_iter().filter_map(GitChangeDto::into_entry));
            debug!(count, skip, all_included = page.all_changes_included, "Fetched diff page");

            if page.all_changes_included || count == 0 {
                break;
            }
            skip += count;
        }

        info!(files = entries.len(), base = %base, target = %target, "Pull request changes loaded");
        Ok(entries)
    }

    async fn threads(&self) -> Result<Vec<ReviewThread>> {
        let req = self.request(Method::GET, &self.pull_request_path("/threads"))?;
        let threads: ListResponse<ThreadDto> = self.send(req, "pull request threads").await?;
        Ok(threads
            .value
            .into_iter()
            .filter(|t| !t.is_deleted)
            .map(ReviewThread::from)
            .collect())
    }

    async fn create_thread(&self, comment: &str, anchor: &Anchor) -> Result<u64> {
        let body = NewThreadRequest::new(comment, anchor);
        let req = self
            .request(Method::POST, &self.pull_request_path("/threads"))?
            .json(&body);
        let created: CreatedThreadDto = self.send(req, "create thread").await?;
        Ok(created.id)
    }

    async fn update_thread(&self, thread_id: u64, status: ThreadStatus) -> Result<()> {
        let body = UpdateThreadRequest {
            status,
            last_updated_date: (status == ThreadStatus::Active).then(Utc::now),
        };
        let req = self
            .request(Method::PATCH, &self.pull_request_path(&format!("/threads/{}", thread_id)))?
            .json(&body);
        let _: serde_json::Value = self.send(req, "update thread").await?;
        Ok(())
    }

    async fn update_status(&self, state: CheckState, description: &str) -> Result<()> {
        info!(
            context = %format!("{}\\{}", self.status_context.genre, self.status_context.name),
            state = ?state,
            "Setting status check"
        );
        let iteration_id = self.last_iteration_id().await?;
        let body = StatusRequest {
            state,
            description,
            context: StatusContextDto {
                name: &self.status_context.name,
                genre: &self.status_context.genre,
            },
            iteration_id,
        };
        let req = self
            .request(Method::POST, &self.pull_request_path("/statuses"))?
            .json(&body);
        let _: serde_json::Value = self.send(req, "pull request status").await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
