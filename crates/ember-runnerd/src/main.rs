//! Runner daemon entrypoint: resolve configuration, wire the collaborators,
//! hand control to the lifecycle controller, and map its outcome onto the
//! process exit code.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use ember_core::{
    controller::{Controller, Deps},
    preempt::PreemptNotify,
};
use ember_exec::AgentSupervisor;
use ember_infra::TerraformCli;
use ember_observe::{LoggerConfig, LoggerLevel, init_logger};
use ember_spot::Ec2SpotWatcher;

use cli::Args;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logger = LoggerConfig {
        format: args.log_format.parse()?,
        level: LoggerLevel::new(&args.log_level)?,
        ..Default::default()
    };
    init_logger(&logger)?;

    if std::env::var_os("RUNNER_NAME").is_some() {
        warn!("ignoring RUNNER_NAME environment variable; use EMBER_RUNNER_NAME or --name instead");
    }

    let cfg = args.resolve()?;
    info!(name = %cfg.name, driver = %cfg.driver, labels = %cfg.labels, "starting runner controller");

    let driver = ember_driver::from_config(cfg.driver, &cfg.repo, &cfg.token)?;
    let preempt = match Ec2SpotWatcher::new() {
        Ok(watcher) => Some(Arc::new(watcher) as Arc<dyn PreemptNotify>),
        Err(err) => {
            warn!(%err, "spot-termination watcher unavailable");
            None
        }
    };
    let deps = Deps {
        driver,
        infra: Arc::new(TerraformCli::new()),
        supervisor: Arc::new(AgentSupervisor::new()),
        preempt,
    };

    match Controller::new(cfg, deps).run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(%err, "runner startup failed");
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
