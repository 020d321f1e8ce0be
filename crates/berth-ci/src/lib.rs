//! Berth CI - Source repository and build job provisioning
//!
//! Instances that need custom addons get a private repository and a build
//! job that copies pushed code into the instance's `addons/git_addons`
//! directory and restarts the application service.

mod error;
mod github;
mod jenkins;
pub mod job;

pub use error::{CiError, Result};
pub use github::GitHubClient;
pub use jenkins::JenkinsClient;

use async_trait::async_trait;
use berth_core::{CiSettings, Instance};
use tracing::info;

/// Provisions the repository and build job backing an instance's custom addons
#[async_trait]
pub trait ContinuousIntegrationProvisioner: Send + Sync {
    /// Reuse or create the instance's repository, returning its clone URL
    async fn ensure_repository(&self, instance: &Instance) -> Result<String>;

    /// Create or reconfigure the instance's build job
    async fn ensure_build_job(&self, instance: &Instance) -> Result<()>;

    /// Check if credentials for every backend are present
    fn is_configured(&self) -> bool;
}

/// GitHub repositories plus Jenkins freestyle jobs
pub struct GitHubJenkinsProvisioner {
    github: Option<GitHubClient>,
    jenkins: Option<JenkinsClient>,
}

impl GitHubJenkinsProvisioner {
    pub fn new(github: Option<GitHubClient>, jenkins: Option<JenkinsClient>) -> Self {
        Self { github, jenkins }
    }

    /// Build clients for whichever backends have credentials
    pub fn from_settings(settings: &CiSettings) -> Self {
        let github = settings.has_git_credentials().then(|| {
            GitHubClient::new(
                settings.github_api_base.clone(),
                settings.git_user.clone().unwrap_or_default(),
                settings.git_token.clone().unwrap_or_default(),
                settings.git_webhook_url.clone(),
            )
        });
        let jenkins = settings.has_jenkins_credentials().then(|| {
            JenkinsClient::new(
                settings.jenkins_url.clone().unwrap_or_default(),
                settings.jenkins_user.clone().unwrap_or_default(),
                settings.jenkins_token.clone().unwrap_or_default(),
            )
        });
        Self::new(github, jenkins)
    }

    fn github(&self) -> Result<&GitHubClient> {
        self.github.as_ref().ok_or(CiError::NotConfigured("GitHub"))
    }

    fn jenkins(&self) -> Result<&JenkinsClient> {
        self.jenkins.as_ref().ok_or(CiError::NotConfigured("Jenkins"))
    }
}

#[async_trait]
impl ContinuousIntegrationProvisioner for GitHubJenkinsProvisioner {
    async fn ensure_repository(&self, instance: &Instance) -> Result<String> {
        self.github()?.ensure_repository(instance).await
    }

    async fn ensure_build_job(&self, instance: &Instance) -> Result<()> {
        let github = self.github()?;
        let jenkins = self.jenkins()?;

        if instance.instance_path.as_os_str().is_empty() {
            return Err(CiError::MissingInstancePath);
        }
        tokio::fs::create_dir_all(instance.git_addons_path())
            .await
            .map_err(|e| CiError::jenkins(format!("Failed to create addons directory: {}", e)))?;

        let xml = job::job_config_xml(&job::JobSpec::for_instance(
            instance,
            github.user(),
            github.token(),
        ));
        jenkins
            .create_or_update_job(&berth_core::naming::build_job_name(&instance.name), &xml)
            .await?;
        info!("Build job ready for instance {}", instance.name);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.github.is_some() && self.jenkins.is_some()
    }
}

/// Provisioner used when no CI backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProvisioner;

#[async_trait]
impl ContinuousIntegrationProvisioner for DisabledProvisioner {
    async fn ensure_repository(&self, _instance: &Instance) -> Result<String> {
        Err(CiError::NotConfigured("GitHub"))
    }

    async fn ensure_build_job(&self, _instance: &Instance) -> Result<()> {
        Err(CiError::NotConfigured("Jenkins"))
    }

    fn is_configured(&self) -> bool {
        false
    }
}
