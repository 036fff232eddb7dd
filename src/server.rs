use std::collections::HashSet;
use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{schemars, tool, tool_handler, tool_router, ServerHandler};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::GithubToolsError;
use crate::github::GithubClient;

#[derive(Clone)]
pub struct GithubToolsServer {
    github: Arc<GithubClient>,
    max_results: u32,
    tool_router: ToolRouter<Self>,
}

// -- Tool parameter types --

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchReposParams {
    #[schemars(description = "Search query (GitHub repository search syntax, e.g. \
                              'http client language:rust stars:>100')")]
    pub query: String,

    #[schemars(description = "Sort field: stars, forks, help-wanted-issues, or updated \
                              (default: best match)")]
    #[serde(default)]
    pub sort: Option<String>,

    #[schemars(description = "Sort order: asc or desc")]
    #[serde(default)]
    pub order: Option<String>,

    #[schemars(description = "Maximum number of results to return")]
    #[serde(default)]
    pub max_results: Option<u32>,

    #[schemars(description = "Limit results to repositories owned by this user or org")]
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchIssuesParams {
    #[schemars(description = "Search query (GitHub issue search syntax, e.g. \
                              'panic repo:tokio-rs/tokio label:bug')")]
    pub query: String,

    #[schemars(description = "Issue state: open, closed, or all (default: open). \
                              Added to the query as a state: qualifier unless 'all'.")]
    #[serde(default)]
    pub state: Option<String>,

    #[schemars(description = "Sort field: comments, reactions, created, or updated \
                              (default: best match)")]
    #[serde(default)]
    pub sort: Option<String>,

    #[schemars(description = "Sort order: asc or desc")]
    #[serde(default)]
    pub order: Option<String>,

    #[schemars(description = "Maximum number of results to return")]
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateIssueParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue title")]
    pub title: String,

    #[schemars(description = "Issue body (Markdown)")]
    #[serde(default)]
    pub body: Option<String>,

    #[schemars(description = "Labels to apply")]
    #[serde(default)]
    pub labels: Option<Vec<String>>,

    #[schemars(description = "Usernames to assign")]
    #[serde(default)]
    pub assignees: Option<Vec<String>>,

    #[schemars(description = "Milestone number to associate")]
    #[serde(default)]
    pub milestone: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateIssueParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    pub issue_number: u64,

    #[schemars(description = "New title")]
    #[serde(default)]
    pub title: Option<String>,

    #[schemars(description = "New body (Markdown)")]
    #[serde(default)]
    pub body: Option<String>,

    #[schemars(description = "New state: open or closed")]
    #[serde(default)]
    pub state: Option<String>,

    #[schemars(description = "Replacement label set")]
    #[serde(default)]
    pub labels: Option<Vec<String>>,

    #[schemars(description = "Replacement assignee set")]
    #[serde(default)]
    pub assignees: Option<Vec<String>>,

    #[schemars(description = "Milestone number to associate")]
    #[serde(default)]
    pub milestone: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IssueLabelsParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    pub issue_number: u64,

    #[schemars(description = "Action to perform: list, add, set (replace all), or remove")]
    pub action: String,

    #[schemars(description = "Label names (required for add, set, and remove)")]
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreatePullRequestParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Pull request title")]
    pub title: String,

    #[schemars(description = "Source branch (use 'user:branch' for cross-repo PRs)")]
    pub head: String,

    #[schemars(description = "Target branch (default: main)")]
    #[serde(default)]
    pub base: Option<String>,

    #[schemars(description = "Pull request body (Markdown)")]
    #[serde(default)]
    pub body: Option<String>,

    #[schemars(description = "Open as a draft pull request (default: false)")]
    #[serde(default)]
    pub draft: Option<bool>,

    #[schemars(description = "Labels to apply after creation")]
    #[serde(default)]
    pub labels: Option<Vec<String>>,

    #[schemars(description = "Usernames to assign after creation")]
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateRepoParams {
    #[schemars(description = "Repository name")]
    pub name: String,

    #[schemars(description = "Repository description")]
    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "Create as a private repository (default: false)")]
    #[serde(default)]
    pub private: Option<bool>,

    #[schemars(description = "Initialize with a README (default: false)")]
    #[serde(default)]
    pub auto_init: Option<bool>,

    #[schemars(description = "Gitignore template name, e.g. 'Rust'")]
    #[serde(default)]
    pub gitignore_template: Option<String>,

    #[schemars(description = "License template keyword, e.g. 'mit'")]
    #[serde(default)]
    pub license_template: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteRepoParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RepoSettingsParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Settings to update, passed through to the repository PATCH \
                              endpoint (e.g. description, private, has_issues, \
                              allow_squash_merge, delete_branch_on_merge)")]
    pub settings: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WorkflowsParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Action to perform: list, get, runs, dispatch, enable, or disable")]
    pub action: String,

    #[schemars(description = "Workflow ID or workflow file name, e.g. 'ci.yml' \
                              (required for every action except list)")]
    #[serde(default)]
    pub workflow: Option<String>,

    #[schemars(description = "Branch, tag, or SHA to run the workflow on (required for dispatch)")]
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,

    #[schemars(description = "Workflow inputs for dispatch, as declared by the workflow file")]
    #[serde(default)]
    pub inputs: Option<serde_json::Map<String, Value>>,

    #[schemars(description = "Filter runs by status: queued, in_progress, completed, \
                              success, failure, ...")]
    #[serde(default)]
    pub status: Option<String>,

    #[schemars(description = "Filter runs by branch name")]
    #[serde(default)]
    pub branch: Option<String>,

    #[schemars(description = "Maximum number of results for list and runs")]
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CollaboratorsParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Action to perform: list, add, or remove")]
    pub action: String,

    #[schemars(description = "Collaborator username (required for add and remove)")]
    #[serde(default)]
    pub username: Option<String>,

    #[schemars(description = "Permission for add: pull, triage, push, maintain, or admin \
                              (default: push)")]
    #[serde(default)]
    pub permission: Option<String>,
}

// -- Request body types. Optional fields absent from the invocation are
//    omitted from the JSON entirely, never sent as null. --

#[derive(Debug, Serialize)]
struct CreateIssueBody<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignees: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milestone: Option<u64>,
}

#[derive(Debug, Serialize)]
struct UpdateIssueBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignees: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milestone: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CreatePullBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    draft: bool,
}

#[derive(Debug, Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    private: bool,
    auto_init: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    gitignore_template: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license_template: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WorkflowDispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    inputs: Option<&'a serde_json::Map<String, Value>>,
}

impl GithubToolsServer {
    /// Builds the server and its tool registry. Fails if two tools were
    /// registered under the same name instead of letting the later route
    /// shadow the earlier one.
    pub fn new(github: GithubClient, max_results: u32) -> Result<Self, GithubToolsError> {
        let tool_router = Self::tool_router();
        if let Some(name) = duplicate_tool_name(&tool_router.list_all()) {
            return Err(GithubToolsError::DuplicateTool(name));
        }
        Ok(Self {
            github: Arc::new(github),
            max_results,
            tool_router,
        })
    }

    /// Cap per_page to 100 (GitHub API maximum).
    fn capped_per_page(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.max_results).clamp(1, 100)
    }
}

/// Validate that a GitHub owner/repo-style name doesn't contain characters
/// that could alter the request path.
fn sanitize_github_name(name: &str, field: &str) -> Result<(), GithubToolsError> {
    if name.is_empty() {
        return Err(GithubToolsError::InvalidParam(format!(
            "{} must not be empty",
            field
        )));
    }
    for ch in ['/', '?', '#', '%', '\0', ' ', '\n', '\t'] {
        if name.contains(ch) {
            return Err(GithubToolsError::InvalidParam(format!(
                "{} contains invalid character '{}'",
                field, ch
            )));
        }
    }
    Ok(())
}

/// Validate a value for use in URL paths or query params. Unlike
/// `sanitize_github_name`, this allows slashes (for branch names like
/// `feature/foo`) and colons (for `user:branch` head refs).
fn sanitize_url_value(value: &str, field: &str) -> Result<(), GithubToolsError> {
    if value.is_empty() {
        return Err(GithubToolsError::InvalidParam(format!(
            "{} must not be empty",
            field
        )));
    }
    for ch in ['?', '#', '&', '\0', '\n', '\r', '\t'] {
        if value.contains(ch) {
            return Err(GithubToolsError::InvalidParam(format!(
                "{} contains invalid character",
                field
            )));
        }
    }
    Ok(())
}

fn require_for_action<'a>(
    value: Option<&'a str>,
    field: &str,
    action: &str,
) -> Result<&'a str, GithubToolsError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(GithubToolsError::InvalidParam(format!(
            "{} is required for action '{}'",
            field, action
        ))),
    }
}

fn require_labels<'a>(
    labels: Option<&'a Vec<String>>,
    action: &str,
) -> Result<&'a [String], GithubToolsError> {
    match labels {
        Some(labels) if !labels.is_empty() => Ok(labels),
        _ => Err(GithubToolsError::InvalidParam(format!(
            "labels is required for action '{}'",
            action
        ))),
    }
}

/// Build a `/search/{resource}` path. `sort` and `order` are passed through
/// only when given; GitHub sorts by best match otherwise.
fn search_path(
    resource: &str,
    query: &str,
    sort: Option<&str>,
    order: Option<&str>,
    per_page: u32,
) -> String {
    let mut path = format!("/search/{}?q={}", resource, urlencoding::encode(query));
    if let Some(sort) = sort {
        path.push_str(&format!("&sort={}", urlencoding::encode(sort)));
    }
    if let Some(order) = order {
        path.push_str(&format!("&order={}", urlencoding::encode(order)));
    }
    path.push_str(&format!("&per_page={}", per_page));
    path
}

/// `https://api.github.com/repos/owner/repo` -> `owner/repo`
fn repo_full_name_from_url(url: &str) -> Option<&str> {
    url.split_once("/repos/").map(|(_, full_name)| full_name)
}

fn label_names(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|label| match label {
                    Value::String(name) => Some(name.clone()),
                    other => other.get("name").and_then(Value::as_str).map(String::from),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn assignee_logins(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|assignees| {
            assignees
                .iter()
                .filter_map(|a| a.get("login").and_then(Value::as_str).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn repo_summary(repo: &Value) -> Value {
    json!({
        "name": repo.get("name"),
        "full_name": repo.get("full_name"),
        "description": repo.get("description"),
        "stars": repo.get("stargazers_count"),
        "forks": repo.get("forks_count"),
        "language": repo.get("language"),
        "url": repo.get("html_url"),
        "private": repo.get("private"),
        "created_at": repo.get("created_at"),
        "updated_at": repo.get("updated_at"),
    })
}

fn issue_summary(issue: &Value, repository: &str) -> Value {
    let state = issue.get("state").and_then(Value::as_str).unwrap_or("unknown");
    json!({
        "number": issue.get("number"),
        "title": issue.get("title"),
        "body": issue.get("body"),
        "state": state,
        "closed": state == "closed",
        "labels": label_names(issue.get("labels")),
        "assignees": assignee_logins(issue.get("assignees")),
        "created_at": issue.get("created_at"),
        "updated_at": issue.get("updated_at"),
        "url": issue.get("html_url"),
        "repository": repository,
    })
}

fn workflow_summary(workflow: &Value) -> Value {
    json!({
        "id": workflow.get("id"),
        "name": workflow.get("name"),
        "path": workflow.get("path"),
        "state": workflow.get("state"),
        "created_at": workflow.get("created_at"),
        "updated_at": workflow.get("updated_at"),
    })
}

fn run_summary(run: &Value) -> Value {
    json!({
        "id": run.get("id"),
        "status": run.get("status"),
        "conclusion": run.get("conclusion"),
        "head_branch": run.get("head_branch"),
        "created_at": run.get("created_at"),
        "updated_at": run.get("updated_at"),
    })
}

fn duplicate_tool_name(tools: &[Tool]) -> Option<String> {
    let mut seen = HashSet::new();
    tools
        .iter()
        .find(|tool| !seen.insert(tool.name.clone()))
        .map(|tool| tool.name.to_string())
}

fn json_result(value: &Value) -> CallToolResult {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    CallToolResult::success(vec![Content::text(text)])
}

// -- Handlers: validated arguments -> API call(s) -> reshaped response --

impl GithubToolsServer {
    pub async fn do_search_repos(
        &self,
        params: SearchReposParams,
    ) -> Result<Value, GithubToolsError> {
        let mut query = params.query;
        if let Some(ref user) = params.user {
            sanitize_github_name(user, "user")?;
            query = format!("{} user:{}", query, user);
        }
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(GithubToolsError::InvalidParam(
                "query must not be empty".to_string(),
            ));
        }

        let max_results = params.max_results.unwrap_or(self.max_results);
        let path = search_path(
            "repositories",
            &query,
            params.sort.as_deref(),
            params.order.as_deref(),
            max_results.clamp(1, 100),
        );
        let response = self.github.get(&path).await?;

        let mut items = response
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        items.truncate(max_results as usize);
        let repos: Vec<Value> = items.iter().map(repo_summary).collect();

        Ok(json!({
            "query": query,
            "total_count": response.get("total_count"),
            "repos": repos,
            "count": repos.len(),
        }))
    }

    pub async fn do_search_issues(
        &self,
        params: SearchIssuesParams,
    ) -> Result<Value, GithubToolsError> {
        let state = params.state.as_deref().unwrap_or("open");
        let query = if state == "all" {
            params.query
        } else {
            format!("{} state:{}", params.query, state)
        };
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(GithubToolsError::InvalidParam(
                "query must not be empty".to_string(),
            ));
        }

        let max_results = params.max_results.unwrap_or(self.max_results);
        let path = search_path(
            "issues",
            &query,
            params.sort.as_deref(),
            params.order.as_deref(),
            max_results.clamp(1, 100),
        );
        let response = self.github.get(&path).await?;

        let mut items = response
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        items.truncate(max_results as usize);
        let issues: Vec<Value> = items
            .iter()
            .map(|issue| {
                let repository = issue
                    .get("repository_url")
                    .and_then(Value::as_str)
                    .and_then(repo_full_name_from_url)
                    .unwrap_or("");
                issue_summary(issue, repository)
            })
            .collect();

        Ok(json!({
            "query": query,
            "total_count": response.get("total_count"),
            "issues": issues,
            "count": issues.len(),
        }))
    }

    pub async fn do_create_issue(
        &self,
        params: CreateIssueParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;
        if params.title.trim().is_empty() {
            return Err(GithubToolsError::InvalidParam(
                "title must not be empty".to_string(),
            ));
        }

        let body = serde_json::to_value(CreateIssueBody {
            title: &params.title,
            body: params.body.as_deref(),
            labels: params.labels.as_deref(),
            assignees: params.assignees.as_deref(),
            milestone: params.milestone,
        })?;
        let path = format!("/repos/{}/{}/issues", params.owner, params.repo);
        let issue = self.github.post(&path, &body).await?;

        let repository = format!("{}/{}", params.owner, params.repo);
        Ok(issue_summary(&issue, &repository))
    }

    pub async fn do_update_issue(
        &self,
        params: UpdateIssueParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;

        let body = serde_json::to_value(UpdateIssueBody {
            title: params.title.as_deref(),
            body: params.body.as_deref(),
            state: params.state.as_deref(),
            labels: params.labels.as_deref(),
            assignees: params.assignees.as_deref(),
            milestone: params.milestone,
        })?;
        let path = format!(
            "/repos/{}/{}/issues/{}",
            params.owner, params.repo, params.issue_number
        );
        let issue = self.github.patch(&path, &body).await?;

        let repository = format!("{}/{}", params.owner, params.repo);
        Ok(issue_summary(&issue, &repository))
    }

    pub async fn do_manage_issue_labels(
        &self,
        params: IssueLabelsParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;

        let repository = format!("{}/{}", params.owner, params.repo);
        let path = format!(
            "/repos/{}/{}/issues/{}/labels",
            params.owner, params.repo, params.issue_number
        );

        let labels = match params.action.as_str() {
            "list" => {
                let value = self.github.get(&format!("{}?per_page=100", path)).await?;
                label_names(Some(&value))
            }
            "add" => {
                let requested = require_labels(params.labels.as_ref(), "add")?;
                let value = self
                    .github
                    .post(&path, &json!({ "labels": requested }))
                    .await?;
                label_names(Some(&value))
            }
            "set" => {
                let requested = require_labels(params.labels.as_ref(), "set")?;
                let value = self
                    .github
                    .put(&path, Some(&json!({ "labels": requested })))
                    .await?;
                label_names(Some(&value))
            }
            "remove" => {
                let requested = require_labels(params.labels.as_ref(), "remove")?;
                // GitHub returns the labels still on the issue after each
                // removal; the last response is the final set.
                let mut remaining = Value::Null;
                for label in requested {
                    let label_path = format!("{}/{}", path, urlencoding::encode(label));
                    remaining = self.github.delete(&label_path).await?;
                }
                label_names(Some(&remaining))
            }
            other => {
                return Err(GithubToolsError::InvalidParam(format!(
                    "unknown action '{}' (expected list, add, set, or remove)",
                    other
                )));
            }
        };

        Ok(json!({
            "repository": repository,
            "issue": params.issue_number,
            "action": params.action,
            "labels": labels,
        }))
    }

    pub async fn do_create_pull_request(
        &self,
        params: CreatePullRequestParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;
        if params.title.trim().is_empty() {
            return Err(GithubToolsError::InvalidParam(
                "title must not be empty".to_string(),
            ));
        }
        sanitize_url_value(&params.head, "head")?;
        let base = params.base.as_deref().unwrap_or("main");
        sanitize_url_value(base, "base")?;

        let body = serde_json::to_value(CreatePullBody {
            title: &params.title,
            head: &params.head,
            base,
            body: params.body.as_deref(),
            draft: params.draft.unwrap_or(false),
        })?;
        let path = format!("/repos/{}/{}/pulls", params.owner, params.repo);
        let pr = self.github.post(&path, &body).await?;

        let repository = format!("{}/{}", params.owner, params.repo);
        let number = pr.get("number").and_then(Value::as_u64);
        let mut labels = label_names(pr.get("labels"));
        let mut assignees = assignee_logins(pr.get("assignees"));

        // Labels and assignees go through the issues endpoints, and only
        // after the create call succeeded.
        if let Some(requested) = params.labels.as_ref().filter(|l| !l.is_empty()) {
            let number = number.ok_or_else(|| {
                GithubToolsError::Other(
                    "pull request response did not include a number".to_string(),
                )
            })?;
            let labels_path = format!(
                "/repos/{}/{}/issues/{}/labels",
                params.owner, params.repo, number
            );
            let value = self
                .github
                .post(&labels_path, &json!({ "labels": requested }))
                .await?;
            labels = label_names(Some(&value));
        }
        if let Some(requested) = params.assignees.as_ref().filter(|a| !a.is_empty()) {
            let number = number.ok_or_else(|| {
                GithubToolsError::Other(
                    "pull request response did not include a number".to_string(),
                )
            })?;
            let assignees_path = format!(
                "/repos/{}/{}/issues/{}/assignees",
                params.owner, params.repo, number
            );
            let value = self
                .github
                .post(&assignees_path, &json!({ "assignees": requested }))
                .await?;
            assignees = assignee_logins(value.get("assignees"));
        }

        Ok(json!({
            "number": pr.get("number"),
            "title": pr.get("title"),
            "body": pr.get("body"),
            "state": pr.get("state"),
            "draft": pr.get("draft"),
            "labels": labels,
            "assignees": assignees,
            "created_at": pr.get("created_at"),
            "updated_at": pr.get("updated_at"),
            "url": pr.get("html_url"),
            "repository": repository,
            "head": pr.pointer("/head/ref"),
            "base": pr.pointer("/base/ref"),
        }))
    }

    pub async fn do_create_repo(
        &self,
        params: CreateRepoParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.name, "name")?;

        let body = serde_json::to_value(CreateRepoBody {
            name: &params.name,
            description: params.description.as_deref(),
            private: params.private.unwrap_or(false),
            auto_init: params.auto_init.unwrap_or(false),
            gitignore_template: params.gitignore_template.as_deref(),
            license_template: params.license_template.as_deref(),
        })?;
        let repo = self.github.post("/user/repos", &body).await?;

        Ok(repo_summary(&repo))
    }

    pub async fn do_delete_repo(
        &self,
        params: DeleteRepoParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;

        let path = format!("/repos/{}/{}", params.owner, params.repo);
        self.github.delete(&path).await?;

        Ok(json!({
            "repository": format!("{}/{}", params.owner, params.repo),
            "deleted": true,
        }))
    }

    pub async fn do_manage_repo_settings(
        &self,
        params: RepoSettingsParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;

        let applied: Vec<String> = params.settings.keys().cloned().collect();
        let body = Value::Object(params.settings);
        let path = format!("/repos/{}/{}", params.owner, params.repo);
        let repo = self.github.patch(&path, &body).await?;

        Ok(json!({
            "repository": format!("{}/{}", params.owner, params.repo),
            "applied": applied,
            "repo": repo_summary(&repo),
        }))
    }

    pub async fn do_manage_workflows(
        &self,
        params: WorkflowsParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;

        let repository = format!("{}/{}", params.owner, params.repo);
        match params.action.as_str() {
            "list" => {
                let path = format!(
                    "/repos/{}/{}/actions/workflows?per_page={}",
                    params.owner,
                    params.repo,
                    self.capped_per_page(params.max_results)
                );
                let value = self.github.get(&path).await?;
                let workflows: Vec<Value> = value
                    .get("workflows")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().map(workflow_summary).collect())
                    .unwrap_or_default();
                Ok(json!({
                    "repository": repository,
                    "workflows": workflows,
                    "count": workflows.len(),
                }))
            }
            "get" => {
                let workflow = require_for_action(params.workflow.as_deref(), "workflow", "get")?;
                sanitize_github_name(workflow, "workflow")?;
                let path = format!(
                    "/repos/{}/{}/actions/workflows/{}",
                    params.owner, params.repo, workflow
                );
                let value = self.github.get(&path).await?;
                Ok(workflow_summary(&value))
            }
            "runs" => {
                let workflow = require_for_action(params.workflow.as_deref(), "workflow", "runs")?;
                sanitize_github_name(workflow, "workflow")?;
                let mut path = format!(
                    "/repos/{}/{}/actions/workflows/{}/runs?per_page={}",
                    params.owner,
                    params.repo,
                    workflow,
                    self.capped_per_page(params.max_results)
                );
                if let Some(ref status) = params.status {
                    sanitize_url_value(status, "status")?;
                    path.push_str(&format!("&status={}", status));
                }
                if let Some(ref branch) = params.branch {
                    sanitize_url_value(branch, "branch")?;
                    path.push_str(&format!("&branch={}", branch));
                }
                let value = self.github.get(&path).await?;
                let runs: Vec<Value> = value
                    .get("workflow_runs")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().map(run_summary).collect())
                    .unwrap_or_default();
                Ok(json!({
                    "repository": repository,
                    "workflow": workflow,
                    "runs": runs,
                    "count": runs.len(),
                }))
            }
            "dispatch" => {
                let workflow =
                    require_for_action(params.workflow.as_deref(), "workflow", "dispatch")?;
                sanitize_github_name(workflow, "workflow")?;
                let git_ref = require_for_action(params.git_ref.as_deref(), "ref", "dispatch")?;
                sanitize_url_value(git_ref, "ref")?;

                let body = serde_json::to_value(WorkflowDispatchBody {
                    git_ref,
                    inputs: params.inputs.as_ref(),
                })?;
                let path = format!(
                    "/repos/{}/{}/actions/workflows/{}/dispatches",
                    params.owner, params.repo, workflow
                );
                self.github.post(&path, &body).await?;
                Ok(json!({
                    "repository": repository,
                    "workflow": workflow,
                    "ref": git_ref,
                    "dispatched": true,
                }))
            }
            action @ ("enable" | "disable") => {
                let workflow = require_for_action(params.workflow.as_deref(), "workflow", action)?;
                sanitize_github_name(workflow, "workflow")?;
                let path = format!(
                    "/repos/{}/{}/actions/workflows/{}/{}",
                    params.owner, params.repo, workflow, action
                );
                self.github.put(&path, None).await?;
                Ok(json!({
                    "repository": repository,
                    "workflow": workflow,
                    "enabled": action == "enable",
                }))
            }
            other => Err(GithubToolsError::InvalidParam(format!(
                "unknown action '{}' (expected list, get, runs, dispatch, enable, or disable)",
                other
            ))),
        }
    }

    pub async fn do_manage_collaborators(
        &self,
        params: CollaboratorsParams,
    ) -> Result<Value, GithubToolsError> {
        sanitize_github_name(&params.owner, "owner")?;
        sanitize_github_name(&params.repo, "repo")?;

        let repository = format!("{}/{}", params.owner, params.repo);
        match params.action.as_str() {
            "list" => {
                let path = format!(
                    "/repos/{}/{}/collaborators?per_page={}",
                    params.owner,
                    params.repo,
                    self.capped_per_page(None)
                );
                let value = self.github.get(&path).await?;
                let collaborators: Vec<Value> = value
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .map(|c| {
                                json!({
                                    "login": c.get("login"),
                                    "role": c.get("role_name"),
                                    "site_admin": c.get("site_admin"),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({
                    "repository": repository,
                    "collaborators": collaborators,
                    "count": collaborators.len(),
                }))
            }
            "add" => {
                let username = require_for_action(params.username.as_deref(), "username", "add")?;
                sanitize_github_name(username, "username")?;
                let permission = params.permission.as_deref().unwrap_or("push");

                let path = format!(
                    "/repos/{}/{}/collaborators/{}",
                    params.owner, params.repo, username
                );
                let value = self
                    .github
                    .put(&path, Some(&json!({ "permission": permission })))
                    .await?;

                // A 201 carries an invitation body; a 204 means the user was
                // added directly.
                if value.is_null() {
                    Ok(json!({
                        "repository": repository,
                        "username": username,
                        "permission": permission,
                        "status": "added",
                    }))
                } else {
                    Ok(json!({
                        "repository": repository,
                        "username": username,
                        "permission": permission,
                        "status": "invited",
                        "invitation_id": value.get("id"),
                    }))
                }
            }
            "remove" => {
                let username =
                    require_for_action(params.username.as_deref(), "username", "remove")?;
                sanitize_github_name(username, "username")?;

                let path = format!(
                    "/repos/{}/{}/collaborators/{}",
                    params.owner, params.repo, username
                );
                self.github.delete(&path).await?;
                Ok(json!({
                    "repository": repository,
                    "username": username,
                    "status": "removed",
                }))
            }
            other => Err(GithubToolsError::InvalidParam(format!(
                "unknown action '{}' (expected list, add, or remove)",
                other
            ))),
        }
    }
}

// -- MCP tool registrations (thin wrappers over the do_* handlers) --

#[tool_router]
impl GithubToolsServer {
    #[tool(
        name = "search_repos",
        description = "Search GitHub repositories. Supports search qualifiers in the query \
                       (e.g. 'language:rust stars:>100'), sort/order pass-through, and an \
                       optional user filter; returns at most max_results items."
    )]
    async fn search_repos(
        &self,
        Parameters(params): Parameters<SearchReposParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_search_repos(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "search_issues",
        description = "Search GitHub issues across repositories. The state filter is folded \
                       into the query as a state: qualifier; sort and order pass through."
    )]
    async fn search_issues(
        &self,
        Parameters(params): Parameters<SearchIssuesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_search_issues(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "create_issue",
        description = "Create an issue in a repository, optionally with labels, assignees, \
                       and a milestone"
    )]
    async fn create_issue(
        &self,
        Parameters(params): Parameters<CreateIssueParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_create_issue(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "update_issue",
        description = "Update an existing issue: title, body, state, labels, assignees, \
                       or milestone. Only the provided fields change."
    )]
    async fn update_issue(
        &self,
        Parameters(params): Parameters<UpdateIssueParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_update_issue(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "manage_issue_labels",
        description = "List, add, set (replace), or remove labels on an issue"
    )]
    async fn manage_issue_labels(
        &self,
        Parameters(params): Parameters<IssueLabelsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_manage_issue_labels(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "create_pull_request",
        description = "Open a pull request from head into base, optionally as a draft and \
                       with labels/assignees applied after creation"
    )]
    async fn create_pull_request(
        &self,
        Parameters(params): Parameters<CreatePullRequestParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_create_pull_request(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "create_repo",
        description = "Create a repository for the authenticated user"
    )]
    async fn create_repo(
        &self,
        Parameters(params): Parameters<CreateRepoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_create_repo(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "delete_repo",
        description = "Delete a repository. Irreversible; the token needs the delete_repo scope."
    )]
    async fn delete_repo(
        &self,
        Parameters(params): Parameters<DeleteRepoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_delete_repo(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "manage_repo_settings",
        description = "Update repository settings. The settings object is passed through to \
                       GitHub's repository update endpoint as-is."
    )]
    async fn manage_repo_settings(
        &self,
        Parameters(params): Parameters<RepoSettingsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_manage_repo_settings(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "manage_workflows",
        description = "Manage GitHub Actions workflows: list them, get one, list its runs \
                       (with status/branch filters), dispatch a run, or enable/disable it"
    )]
    async fn manage_workflows(
        &self,
        Parameters(params): Parameters<WorkflowsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_manage_workflows(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }

    #[tool(
        name = "manage_collaborators",
        description = "List repository collaborators, add one with a permission level, \
                       or remove one"
    )]
    async fn manage_collaborators(
        &self,
        Parameters(params): Parameters<CollaboratorsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .do_manage_collaborators(params)
            .await
            .map_err(|e| e.to_mcp_error())?;
        Ok(json_result(&result))
    }
}

#[tool_handler]
impl ServerHandler for GithubToolsServer {
    fn get_info(&self) -> ServerInfo {
        let identity = match self.github.username() {
            Some(username) => format!("Authenticated to GitHub as {}", username),
            None => "Authenticated to GitHub with a personal access token".to_string(),
        };
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "github-tools-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(format!(
                "{}. Use search_repos and search_issues to find repositories and issues, \
                 create_issue/update_issue/manage_issue_labels to work with issues, \
                 create_pull_request to open PRs, create_repo/delete_repo and \
                 manage_repo_settings for repository administration, manage_workflows for \
                 GitHub Actions, and manage_collaborators for repository access.",
                identity
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{GithubClient, GithubConfig};

    fn make_server(max_results: u32) -> GithubToolsServer {
        let config = GithubConfig::new("test-token".to_string(), None);
        let github = GithubClient::new(config).expect("client should build");
        GithubToolsServer::new(github, max_results).expect("server should build")
    }

    #[test]
    fn test_capped_per_page_default() {
        let server = make_server(10);
        assert_eq!(server.capped_per_page(None), 10);
    }

    #[test]
    fn test_capped_per_page_explicit() {
        let server = make_server(10);
        assert_eq!(server.capped_per_page(Some(50)), 50);
    }

    #[test]
    fn test_capped_per_page_caps_at_100() {
        let server = make_server(10);
        assert_eq!(server.capped_per_page(Some(200)), 100);
        let server = make_server(500);
        assert_eq!(server.capped_per_page(None), 100);
    }

    #[test]
    fn test_capped_per_page_floor_of_one() {
        let server = make_server(10);
        assert_eq!(server.capped_per_page(Some(0)), 1);
    }

    #[test]
    fn test_registry_has_unique_names() {
        let tools = GithubToolsServer::tool_router().list_all();
        assert_eq!(tools.len(), 11);
        assert!(duplicate_tool_name(&tools).is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut tools = GithubToolsServer::tool_router().list_all();
        tools.push(tools[0].clone());
        let duplicate = duplicate_tool_name(&tools).expect("duplicate should be detected");
        assert_eq!(duplicate, tools[0].name.to_string());
    }

    #[test]
    fn test_registry_covers_the_tool_catalog() {
        let tools = GithubToolsServer::tool_router().list_all();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_ref()).collect();
        for expected in [
            "search_repos",
            "search_issues",
            "create_issue",
            "update_issue",
            "manage_issue_labels",
            "create_pull_request",
            "create_repo",
            "delete_repo",
            "manage_repo_settings",
            "manage_workflows",
            "manage_collaborators",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }
    }

    #[test]
    fn test_search_path_minimal() {
        assert_eq!(
            search_path("repositories", "x", None, None, 5),
            "/search/repositories?q=x&per_page=5"
        );
    }

    #[test]
    fn test_search_path_encodes_query() {
        assert_eq!(
            search_path("issues", "crash state:open", None, None, 10),
            "/search/issues?q=crash%20state%3Aopen&per_page=10"
        );
    }

    #[test]
    fn test_search_path_passes_sort_and_order_through() {
        assert_eq!(
            search_path("repositories", "x", Some("stars"), Some("desc"), 30),
            "/search/repositories?q=x&sort=stars&order=desc&per_page=30"
        );
    }

    #[test]
    fn test_repo_full_name_from_url() {
        assert_eq!(
            repo_full_name_from_url("https://api.github.com/repos/rust-lang/rust"),
            Some("rust-lang/rust")
        );
        assert_eq!(repo_full_name_from_url("https://example.com/no/match"), None);
    }

    #[test]
    fn test_label_names_from_objects_and_strings() {
        let objects = json!([{"name": "bug"}, {"name": "help wanted"}]);
        assert_eq!(label_names(Some(&objects)), vec!["bug", "help wanted"]);

        let strings = json!(["bug", "docs"]);
        assert_eq!(label_names(Some(&strings)), vec!["bug", "docs"]);

        assert!(label_names(None).is_empty());
        assert!(label_names(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn test_issue_summary_marks_closed() {
        let issue = json!({
            "number": 3,
            "title": "t",
            "state": "closed",
            "labels": [],
            "assignees": [],
        });
        let summary = issue_summary(&issue, "o/r");
        assert_eq!(summary["closed"], true);
        assert_eq!(summary["repository"], "o/r");
    }

    #[test]
    fn test_require_for_action() {
        assert_eq!(
            require_for_action(Some("ci.yml"), "workflow", "get").unwrap(),
            "ci.yml"
        );
        assert!(require_for_action(None, "workflow", "get").is_err());
        assert!(require_for_action(Some(""), "workflow", "get").is_err());
    }

    #[test]
    fn test_require_labels() {
        let labels = vec!["bug".to_string()];
        assert_eq!(require_labels(Some(&labels), "add").unwrap(), &labels[..]);
        assert!(require_labels(None, "add").is_err());
        assert!(require_labels(Some(&Vec::new()), "add").is_err());
    }

    #[test]
    fn test_sanitize_github_name_valid() {
        assert!(sanitize_github_name("my-org", "owner").is_ok());
        assert!(sanitize_github_name("user_name", "owner").is_ok());
        assert!(sanitize_github_name("repo.name", "repo").is_ok());
    }

    #[test]
    fn test_sanitize_github_name_rejects_path_tricks() {
        assert!(sanitize_github_name("", "owner").is_err());
        assert!(sanitize_github_name("owner/repo", "owner").is_err());
        assert!(sanitize_github_name("../etc", "owner").is_err());
        assert!(sanitize_github_name("owner?evil=1", "owner").is_err());
        assert!(sanitize_github_name("repo#fragment", "repo").is_err());
        assert!(sanitize_github_name("my repo", "repo").is_err());
        assert!(sanitize_github_name("my\nrepo", "repo").is_err());
    }

    #[test]
    fn test_sanitize_url_value_allows_refs() {
        assert!(sanitize_url_value("main", "ref").is_ok());
        assert!(sanitize_url_value("feature/foo", "ref").is_ok());
        assert!(sanitize_url_value("octocat:patch-1", "head").is_ok());
    }

    #[test]
    fn test_sanitize_url_value_rejects_query_injection() {
        assert!(sanitize_url_value("", "ref").is_err());
        assert!(sanitize_url_value("main?evil=1", "ref").is_err());
        assert!(sanitize_url_value("main#frag", "ref").is_err());
        assert!(sanitize_url_value("val&other=1", "branch").is_err());
        assert!(sanitize_url_value("val\nx", "ref").is_err());
    }
}
