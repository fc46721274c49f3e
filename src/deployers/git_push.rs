//! Git push: the worker commits the files to a GitHub repository and a
//! GitHub Actions workflow builds and publishes them. Deploys are queued;
//! status comes from the latest workflow run.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{json_body, message_from_body, str_at};
use crate::dispatcher::{DeployContent, DeployStatus, DeployTarget, Deployed, StatusReport};
use crate::errors::DeployError;
use crate::models::{FileMap, Settings, SiteConfig, non_empty};
use crate::traits::Deployer;

const DEFAULT_BRANCH: &str = "deploy/auto";
const DEFAULT_WORKFLOW: &str = "deploy-sites.yml";
const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitPushRequest<'a> {
    site_id: &'a str,
    domain_id: &'a str,
    deploy_record_id: &'a str,
    domain: &'a str,
    brand: &'a str,
    template_id: &'a str,
    environment: &'a str,
    target: &'a str,
    requested_by: &'a str,
    files: FileMap,
    github_token: &'a str,
    repo_owner: &'a str,
    repo_name: &'a str,
    branch: &'a str,
    workflow_file: &'a str,
}

/// Workflow run `status`/`conclusion` to a deploy state.
pub fn run_state(status: &str, conclusion: Option<&str>) -> DeployStatus {
    match status {
        "completed" if conclusion == Some("success") => DeployStatus::Live,
        "completed" => DeployStatus::Failed,
        "in_progress" => DeployStatus::Building,
        "queued" | "requested" | "waiting" | "pending" => DeployStatus::Pending,
        _ => DeployStatus::Unknown,
    }
}

fn branch(settings: &Settings) -> &str {
    non_empty(&settings.github_repo_branch).unwrap_or(DEFAULT_BRANCH)
}

fn workflow(settings: &Settings) -> &str {
    non_empty(&settings.github_deploy_workflow).unwrap_or(DEFAULT_WORKFLOW)
}

pub struct GitPush {
    client: Client,
    worker_base: String,
    github: String,
}

impl GitPush {
    pub fn new(client: Client, worker_base: &str, github: &str) -> Self {
        Self {
            client,
            worker_base: worker_base.trim_end_matches('/').to_string(),
            github: github.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Deployer for GitPush {
    fn target(&self) -> DeployTarget {
        DeployTarget::GitPush
    }

    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError> {
        let (Some(owner), Some(repo)) = (
            non_empty(&settings.github_repo_owner),
            non_empty(&settings.github_repo_name),
        ) else {
            return Err(DeployError::NotConfigured(
                "Git push deploy not configured: set GitHub owner/repo in Settings.".to_string(),
            ));
        };
        let files = content.files();
        if files.is_empty() {
            return Err(DeployError::Content("no files to push".to_string()));
        }

        let request = GitPushRequest {
            site_id: &site.id,
            domain_id: &site.id,
            deploy_record_id: "",
            domain: non_empty(&site.domain)
                .or_else(|| non_empty(&site.brand))
                .unwrap_or("unknown"),
            brand: &site.brand,
            template_id: site.template_id.as_deref().and_then(non_empty).unwrap_or("classic"),
            environment: "production",
            target: DeployTarget::GitPush.id(),
            requested_by: non_empty(&settings.user_email).unwrap_or("unknown"),
            files,
            github_token: Settings::secret(&settings.github_token),
            repo_owner: owner,
            repo_name: repo,
            branch: branch(settings),
            workflow_file: workflow(settings),
        };

        let response = self
            .client
            .post(format!("{}/api/ops/deployments/git-push", self.worker_base))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = json_body(response).await;
        if !status.is_success() {
            let message = str_at(&body, "/error")
                .or_else(|| str_at(&body, "/message"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Git push API error: {}", status.as_u16()));
            return Err(DeployError::api("Git push", message));
        }
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = str_at(&body, "/message")
                .map(str::to_string)
                .unwrap_or_else(|| message_from_body(status, &body.to_string()));
            return Err(DeployError::api("Git push", message));
        }

        let url = str_at(&body, "/url")
            .or_else(|| str_at(&body, "/commitUrl"))
            .or_else(|| str_at(&body, "/workflowUrl"))
            .map_or_else(
                || format!("https://github.com/{owner}/{repo}/tree/{}", branch(settings)),
                str::to_string,
            );
        Ok(Deployed {
            url,
            deploy_id: str_at(&body, "/deployId").map(str::to_string),
            queued: body.get("queued").and_then(Value::as_bool).unwrap_or(true),
        })
    }

    async fn check_status(&self, _site: &SiteConfig, settings: &Settings) -> Result<StatusReport, DeployError> {
        let token = Settings::secret(&settings.github_token);
        let (Some(owner), Some(repo)) = (
            non_empty(&settings.github_repo_owner),
            non_empty(&settings.github_repo_name),
        ) else {
            return Err(DeployError::NotConfigured("GitHub not configured (owner/repo/token)".to_string()));
        };
        if token.is_empty() {
            return Err(DeployError::NotConfigured("GitHub not configured (owner/repo/token)".to_string()));
        }

        let response = self
            .client
            .get(format!(
                "{}/repos/{owner}/{repo}/actions/workflows/{}/runs",
                self.github,
                urlencoding::encode(workflow(settings))
            ))
            .query(&[("branch", branch(settings)), ("per_page", "1")])
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::api("GitHub API", response.status().as_u16().to_string()));
        }
        let body = json_body(response).await;
        let Some(run) = body.pointer("/workflow_runs/0") else {
            return Ok(StatusReport::new(DeployTarget::GitPush, DeployStatus::NoDeploys));
        };

        let state = run_state(
            str_at(run, "/status").unwrap_or_default(),
            str_at(run, "/conclusion"),
        );
        Ok(StatusReport {
            url: str_at(run, "/html_url").map(str::to_string),
            deploy_id: run.get("id").and_then(Value::as_i64).map(|id| id.to_string()),
            created_at: str_at(run, "/created_at").map(str::to_string),
            ..StatusReport::new(DeployTarget::GitPush, state)
        })
    }
}
