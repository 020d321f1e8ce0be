//! GitHub repository backend

use crate::error::{CiError, Result};
use berth_core::{naming, Instance};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Repository fields we read from the API
#[derive(Debug, Deserialize)]
struct Repository {
    clone_url: String,
}

#[derive(Debug, Serialize)]
struct CreateRepositoryRequest<'a> {
    name: &'a str,
    description: String,
    private: bool,
}

#[derive(Debug, Serialize)]
struct HookConfig<'a> {
    url: &'a str,
    content_type: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateHookRequest<'a> {
    name: &'a str,
    config: HookConfig<'a>,
    events: [&'a str; 2],
    active: bool,
}

/// GitHub REST client authenticated as a single user
pub struct GitHubClient {
    api_base: String,
    user: String,
    token: String,
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(
        api_base: String,
        user: String,
        token: String,
        webhook_url: Option<String>,
    ) -> Self {
        Self::with_client(api_base, user, token, webhook_url, reqwest::Client::new())
    }

    /// Create with a custom HTTP client (useful for testing)
    pub fn with_client(
        api_base: String,
        user: String,
        token: String,
        webhook_url: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            user,
            token,
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            client,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::USER_AGENT, "berth")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    /// Reuse the instance's repository if it exists, otherwise create it private
    pub async fn ensure_repository(&self, instance: &Instance) -> Result<String> {
        if self.user.is_empty() || self.token.is_empty() {
            return Err(CiError::NotConfigured("GitHub"));
        }
        let repo_name = naming::repository_name(&instance.name);

        if let Some(existing) = self.find_repository(&repo_name).await? {
            info!("Repository {} already exists; reusing", repo_name);
            return Ok(existing.clone_url);
        }

        let created = self.create_repository(&repo_name, &instance.name).await?;
        info!("Created repository {}", created.clone_url);

        if let Some(url) = &self.webhook_url {
            if let Err(e) = self.create_hook(&repo_name, url).await {
                warn!("Failed to configure webhook for repository {}: {}", repo_name, e);
            }
        }

        Ok(created.clone_url)
    }

    async fn find_repository(&self, repo_name: &str) -> Result<Option<Repository>> {
        let path = format!("/repos/{}/{}", self.user, repo_name);
        let response = self.request(reqwest::Method::GET, &path).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(CiError::github(format!(
                "Looking up {} returned HTTP {}",
                repo_name, status
            ))),
        }
    }

    async fn create_repository(&self, repo_name: &str, label: &str) -> Result<Repository> {
        let request = CreateRepositoryRequest {
            name: repo_name,
            description: format!("Custom addons repository for Docker SaaS instance: {}", label),
            private: true,
        };
        debug!("Creating repository {}", repo_name);

        let response = self
            .request(reqwest::Method::POST, "/user/repos")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CiError::github(format!(
                "Creating {} returned HTTP {}: {}",
                repo_name, status, body
            )));
        }
        Ok(response.json().await?)
    }

    async fn create_hook(&self, repo_name: &str, url: &str) -> Result<()> {
        let request = CreateHookRequest {
            name: "web",
            config: HookConfig {
                url,
                content_type: "json",
            },
            events: ["push", "pull_request"],
            active: true,
        };
        let path = format!("/repos/{}/{}/hooks", self.user, repo_name);

        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CiError::github(format!(
                "Creating webhook returned HTTP {}",
                response.status()
            )));
        }
        info!("Configured webhook for repository {}", repo_name);
        Ok(())
    }
}
