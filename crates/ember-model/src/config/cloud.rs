use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Cloud backing the on-demand compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudKind {
    Aws,
    Azure,
    Gcp,
    Kubernetes,
}

impl CloudKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudKind::Aws => "aws",
            CloudKind::Azure => "azure",
            CloudKind::Gcp => "gcp",
            CloudKind::Kubernetes => "kubernetes",
        }
    }
}

impl FromStr for CloudKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(CloudKind::Aws),
            "azure" => Ok(CloudKind::Azure),
            "gcp" => Ok(CloudKind::Gcp),
            "kubernetes" => Ok(CloudKind::Kubernetes),
            other => Err(ModelError::UnknownCloud(other.to_owned())),
        }
    }
}

impl fmt::Display for CloudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPU flavor attached to the provisioned instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuKind {
    K80,
    V100,
    /// Deprecated alias; normalized to `V100` by [`GpuKind::normalize`].
    Tesla,
}

impl GpuKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuKind::K80 => "k80",
            GpuKind::V100 => "v100",
            GpuKind::Tesla => "tesla",
        }
    }

    /// Map the deprecated `tesla` alias onto `v100`.
    ///
    /// Returns the normalized kind and whether a deprecation applied.
    pub fn normalize(self) -> (GpuKind, bool) {
        match self {
            GpuKind::Tesla => (GpuKind::V100, true),
            other => (other, false),
        }
    }
}

impl FromStr for GpuKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "k80" => Ok(GpuKind::K80),
            "v100" => Ok(GpuKind::V100),
            "tesla" => Ok(GpuKind::Tesla),
            other => Err(ModelError::UnknownGpu(other.to_owned())),
        }
    }
}

impl fmt::Display for GpuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-demand compute description for cloud mode.
///
/// Absent entirely when the runner executes on the local host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSpec {
    pub kind: CloudKind,
    /// Region alias (`us-west`, `eu-north`, ...) or a native cloud region.
    pub region: String,
    /// Instance size alias (`m`, `l`, `xl`) or a native instance type.
    pub instance_type: Option<String>,
    pub gpu: Option<GpuKind>,
    /// HDD size in GB.
    pub hdd_size: Option<u64>,
    /// Custom private SSH key; a throwaway key is generated when absent.
    pub ssh_private: Option<String>,
    /// Request a spot/pre-emptible instance.
    pub spot: bool,
    /// Maximum spot bidding price in USD; negative means current price.
    pub spot_price: f64,
    /// Base64-encoded shell script run during instance initialization.
    pub startup_script: Option<String>,
    /// AWS security group name.
    pub aws_security_group: Option<String>,
}

impl CloudSpec {
    /// Minimal spec for the given cloud with defaults mirroring the CLI.
    pub fn new(kind: CloudKind) -> Self {
        Self {
            kind,
            region: "us-west".to_owned(),
            instance_type: None,
            gpu: None,
            hdd_size: None,
            ssh_private: None,
            spot: false,
            spot_price: -1.0,
            startup_script: None,
            aws_security_group: None,
        }
    }
}
