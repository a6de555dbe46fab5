use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ember_model::{CloudKind, CloudSpec, DriverKind, GpuKind, Labels, RunnerConfig};

/// Launch and register an ephemeral self-hosted CI runner.
#[derive(Parser, Debug)]
#[command(name = "ember-runnerd", version, about, long_about = None)]
pub struct Args {
    /// One or more user-defined labels for this runner (comma-delimited).
    #[arg(long, env = "EMBER_RUNNER_LABELS", default_value = "ember")]
    pub labels: String,

    /// Seconds to wait for jobs before shutting down; set to -1 to disable.
    #[arg(long, env = "EMBER_RUNNER_IDLE_TIMEOUT", default_value_t = 300)]
    pub idle_timeout: i64,

    /// Name displayed in the repository once registered [default: ember-{id}].
    #[arg(long, env = "EMBER_RUNNER_NAME")]
    pub name: Option<String>,

    /// Do not restart jobs terminated by instance disposal or platform timeout.
    #[arg(long, env = "EMBER_RUNNER_NO_RETRY")]
    pub no_retry: bool,

    /// Exit after running a single job.
    #[arg(long, env = "EMBER_RUNNER_SINGLE")]
    pub single: bool,

    /// Don't launch when an existing runner has the same name or matching labels.
    #[arg(long, env = "EMBER_RUNNER_REUSE")]
    pub reuse: bool,

    /// CI provider (github|gitlab|bitbucket); inferred from --repo when omitted.
    #[arg(long, env = "EMBER_RUNNER_DRIVER")]
    pub driver: Option<String>,

    /// Repository the runner registers against.
    #[arg(long, env = "EMBER_RUNNER_REPO")]
    pub repo: Option<String>,

    /// Personal access token used to register the runner.
    #[arg(long, env = "EMBER_RUNNER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Cloud to deploy the runner into (aws|azure|gcp|kubernetes); local when omitted.
    #[arg(long, env = "EMBER_RUNNER_CLOUD")]
    pub cloud: Option<String>,

    /// Region where the instance is deployed; aliases or native regions.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_REGION", default_value = "us-west")]
    pub cloud_region: String,

    /// Instance size alias (m|l|xl) or a native instance type.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_TYPE")]
    pub cloud_type: Option<String>,

    /// GPU type (nogpu|k80|v100|tesla).
    #[arg(long, env = "EMBER_RUNNER_CLOUD_GPU")]
    pub cloud_gpu: Option<String>,

    /// HDD size in GB.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_HDD_SIZE")]
    pub cloud_hdd_size: Option<u64>,

    /// Custom private SSH key; a throwaway key is generated when omitted.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_SSH_PRIVATE", hide_env_values = true)]
    pub cloud_ssh_private: Option<String>,

    /// Request a spot instance.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_SPOT")]
    pub cloud_spot: bool,

    /// Maximum spot bidding price in USD; defaults to the current price.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_SPOT_PRICE", default_value_t = -1.0, allow_hyphen_values = true)]
    pub cloud_spot_price: f64,

    /// Base64-encoded shell script run during instance initialization.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_STARTUP_SCRIPT")]
    pub cloud_startup_script: Option<String>,

    /// AWS security group name.
    #[arg(long, env = "EMBER_RUNNER_CLOUD_AWS_SECURITY_GROUP")]
    pub cloud_aws_security_group: Option<String>,

    #[arg(long, hide = true, env = "EMBER_RUNNER_TF_RESOURCE")]
    pub tf_resource: Option<String>,

    #[arg(long, hide = true, default_value_t = 20)]
    pub destroy_delay: u64,

    #[arg(long, hide = true)]
    pub docker_machine: Option<String>,

    #[arg(long, hide = true, env = "EMBER_RUNNER_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Log level filter expression.
    #[arg(long, env = "EMBER_RUNNER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text|json|journald).
    #[arg(long, env = "EMBER_RUNNER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Resolve the parsed arguments into the immutable controller input.
    pub fn resolve(self) -> anyhow::Result<RunnerConfig> {
        let name = self.name.unwrap_or_else(generated_name);

        let repo = self
            .repo
            .context("missing repository; set --repo or EMBER_RUNNER_REPO")?;
        let token = self
            .token
            .context("missing token; set --token or EMBER_RUNNER_TOKEN")?;

        let driver = match &self.driver {
            Some(raw) => raw.parse::<DriverKind>()?,
            None => DriverKind::infer_from_repo(&repo)
                .context("cannot infer the driver from the repository url; set --driver")?,
        };

        let cloud = match &self.cloud {
            Some(raw) => {
                let mut spec = CloudSpec::new(raw.parse::<CloudKind>()?);
                spec.region = self.cloud_region.clone();
                spec.instance_type = self.cloud_type.clone();
                spec.gpu = match self.cloud_gpu.as_deref() {
                    None | Some("nogpu") => None,
                    Some(raw) => Some(raw.parse::<GpuKind>()?),
                };
                spec.hdd_size = self.cloud_hdd_size;
                spec.ssh_private = self
                    .cloud_ssh_private
                    .as_deref()
                    .map(|key| key.replace('\n', "\\n"));
                spec.spot = self.cloud_spot;
                spec.spot_price = self.cloud_spot_price;
                spec.startup_script = self.cloud_startup_script.clone();
                spec.aws_security_group = self.cloud_aws_security_group.clone();
                Some(spec)
            }
            None => None,
        };

        let workdir = match self.workdir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(".ember")
                .join(&name),
        };

        Ok(RunnerConfig {
            name,
            labels: Labels::parse(&self.labels),
            single: self.single,
            reuse: self.reuse,
            no_retry: self.no_retry,
            idle_timeout: self.idle_timeout,
            destroy_delay: self.destroy_delay,
            workdir,
            driver,
            repo,
            token,
            cloud,
            tf_resource: self.tf_resource,
            docker_machine: self.docker_machine,
        })
    }
}

fn generated_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("ember-{}", &id[..8])
}
