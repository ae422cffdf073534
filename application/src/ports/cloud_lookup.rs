//! Cloud lookup port
//!
//! Built-in lookups used by `retrieve` steps: latest machine images, the
//! default network, availability zones and subnet selection.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Lookup errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("{lookup} failed: {message}")]
    Failed { lookup: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LookupError {
    pub fn failed(lookup: impl Into<String>, message: impl Into<String>) -> Self {
        LookupError::Failed {
            lookup: lookup.into(),
            message: message.into(),
        }
    }
}

/// Operating system family of a machine image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFamily {
    #[default]
    AmazonLinux2,
    Ubuntu,
    Windows,
}

impl ImageFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFamily::AmazonLinux2 => "amazon-linux-2",
            ImageFamily::Ubuntu => "ubuntu",
            ImageFamily::Windows => "windows",
        }
    }

    /// Parse an `os_type` parameter; unknown names yield `None`.
    pub fn parse(os_type: &str) -> Option<Self> {
        match os_type.to_lowercase().as_str() {
            "amazon-linux-2" | "amazon-linux" | "amazonlinux2" | "al2" => {
                Some(ImageFamily::AmazonLinux2)
            }
            "ubuntu" => Some(ImageFamily::Ubuntu),
            "windows" => Some(ImageFamily::Windows),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetInfo {
    pub subnet_id: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcInfo {
    pub vpc_id: String,
    pub is_default: bool,
}

/// Port for built-in cloud lookups
#[async_trait]
pub trait CloudLookupPort: Send + Sync {
    async fn latest_image(
        &self,
        family: ImageFamily,
        architecture: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError>;

    async fn default_vpc(&self, cancel: &CancellationToken) -> Result<String, LookupError>;

    async fn default_subnet(&self, cancel: &CancellationToken) -> Result<SubnetInfo, LookupError>;

    async fn availability_zones(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LookupError>;

    async fn subnets_in_vpc(
        &self,
        vpc_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LookupError>;

    async fn list_vpcs(&self, cancel: &CancellationToken) -> Result<Vec<VpcInfo>, LookupError>;

    /// Subnets suitable for a load balancer of `scheme` in `vpc_id`.
    async fn select_subnets_for_alb(
        &self,
        vpc_id: &str,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LookupError>;

    /// Connection endpoint of a database instance.
    async fn db_endpoint(
        &self,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError>;
}
