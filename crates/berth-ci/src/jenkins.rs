//! Jenkins build job backend

use crate::error::{CiError, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

/// CSRF crumb issued by Jenkins
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Crumb {
    crumb_request_field: String,
    crumb: String,
}

/// Jenkins remote API client
pub struct JenkinsClient {
    base_url: String,
    user: String,
    token: String,
    client: reqwest::Client,
}

impl JenkinsClient {
    pub fn new(base_url: String, user: String, token: String) -> Self {
        Self::with_client(base_url, user, token, reqwest::Client::new())
    }

    /// Create with a custom HTTP client (useful for testing)
    pub fn with_client(base_url: String, user: String, token: String, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user,
            token,
            client,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.user, Some(&self.token))
    }

    /// Jenkins without CSRF protection answers 404 here
    async fn crumb(&self) -> Result<Option<Crumb>> {
        let response = self
            .request(reqwest::Method::GET, "/crumbIssuer/api/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(CiError::jenkins(format!("Crumb request returned HTTP {}", status))),
        }
    }

    async fn job_exists(&self, job_name: &str) -> Result<bool> {
        let path = format!("/job/{}/config.xml", job_name);
        let response = self.request(reqwest::Method::GET, &path).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(CiError::jenkins(format!(
                "Reading job {} returned HTTP {}",
                job_name, status
            ))),
        }
    }

    async fn post_xml(&self, path: &str, xml: &str) -> Result<()> {
        let mut request = self
            .request(reqwest::Method::POST, path)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(xml.to_string());
        if let Some(crumb) = self.crumb().await? {
            request = request.header(crumb.crumb_request_field, crumb.crumb);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CiError::jenkins(format!("POST {} returned HTTP {}: {}", path, status, body)));
        }
        Ok(())
    }

    /// Reconfigure the job if it exists, create it otherwise
    pub async fn create_or_update_job(&self, job_name: &str, xml: &str) -> Result<()> {
        if self.user.is_empty() || self.token.is_empty() || self.base_url.is_empty() {
            return Err(CiError::NotConfigured("Jenkins"));
        }

        if self.job_exists(job_name).await? {
            debug!("Reconfiguring job {}", job_name);
            self.post_xml(&format!("/job/{}/config.xml", job_name), xml).await?;
            info!("Updated existing Jenkins job {}", job_name);
        } else {
            debug!("Creating job {}", job_name);
            self.post_xml(&format!("/createItem?name={}", job_name), xml).await?;
            info!("Created Jenkins job {}", job_name);
        }
        Ok(())
    }
}
