//! Traits and interfaces for provider-agnostic deploys

use async_trait::async_trait;

use crate::dispatcher::{DeployContent, DeployTarget, Deployed, StatusReport};
use crate::errors::DeployError;
use crate::models::{Settings, SiteConfig};

/// A hosting provider that can publish generated files.
///
/// Implementations hold their own HTTP client and API base; credentials come
/// in with every call so one deployer serves any number of settings profiles.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Target this deployer publishes to
    fn target(&self) -> DeployTarget;

    /// Publishes `content` for `site` and returns where it went live.
    async fn deploy(
        &self,
        content: &DeployContent,
        site: &SiteConfig,
        settings: &Settings,
    ) -> Result<Deployed, DeployError>;

    /// Latest deploy state reported by the provider.
    async fn check_status(&self, _site: &SiteConfig, _settings: &Settings) -> Result<StatusReport, DeployError> {
        Err(DeployError::Unsupported("Status check"))
    }

    /// Removes whatever `deploy` created for `site`.
    async fn teardown(&self, _site: &SiteConfig, _settings: &Settings) -> Result<(), DeployError> {
        Err(DeployError::Unsupported("Teardown"))
    }
}
