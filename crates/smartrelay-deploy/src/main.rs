// SPDX-License-Identifier: MIT

//! SmartRelay deployer - entry point
//!
//! Loads the fleet config, derives the expected build identity from the
//! firmware checkout, and runs the upgrade sequence against the selected
//! device set.

use anyhow::bail;
use clap::{Parser, ValueEnum};
use smartrelay_api::{DeviceRegistry, DeviceSet, FleetConfig};
use smartrelay_deploy::orchestrator::{DeviceOutcome, UpgradeOrchestrator};
use smartrelay_deploy::upload::{DEFAULT_ENVIRONMENT, PlatformioUploader};
use smartrelay_deploy::version::BuildVersion;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "smartrelay-deploy")]
#[command(about = "Push firmware to a SmartRelay fleet and verify the upgrade", long_about = None)]
struct Cli {
    /// Path to the fleet config (credentials and device sets)
    #[arg(short, long, default_value = "fleet.json")]
    config: PathBuf,

    /// Which configured device set to target
    #[arg(long, value_enum, default_value_t = TargetSet::Deploy)]
    set: TargetSet,

    /// Firmware project directory (platformio project and git checkout)
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Platformio environment to build and upload
    #[arg(long, default_value = DEFAULT_ENVIRONMENT)]
    environment: String,

    /// Expected git commit id (default: `git rev-parse HEAD` of the project dir)
    #[arg(long)]
    expect_commit: Option<String>,

    /// Expected version substring (default: `git describe --tags --always`)
    #[arg(long)]
    expect_version: Option<String>,

    /// Upgrade every device twice to prove the new firmware is upgradable
    #[arg(long)]
    repeat: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetSet {
    Deploy,
    Test,
}

impl From<TargetSet> for DeviceSet {
    fn from(set: TargetSet) -> Self {
        match set {
            TargetSet::Deploy => DeviceSet::Deploy,
            TargetSet::Test => DeviceSet::Test,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smartrelay_deploy=info".parse().unwrap())
                .add_directive("smartrelay_api=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let fleet = FleetConfig::load(&cli.config)?;
    let registry = DeviceRegistry::from_config(&fleet, cli.set.into())?;
    if registry.is_empty() {
        bail!("no devices configured for the selected set");
    }

    let expected = match (cli.expect_commit, cli.expect_version) {
        (Some(commit), Some(version)) => BuildVersion::new(commit, version),
        (commit, version) => {
            let derived = BuildVersion::from_git(&cli.project_dir).await?;
            BuildVersion::new(
                commit.unwrap_or(derived.git_commit_id),
                version.unwrap_or(derived.version_string),
            )
        }
    };
    info!(
        "deploying commit {} (version {}) to {} device(s)",
        expected.git_commit_id,
        expected.version_string,
        registry.len()
    );

    let uploader = PlatformioUploader::new(cli.project_dir, cli.environment);
    let orchestrator = Arc::new(UpgradeOrchestrator::new(uploader, expected));
    let outcomes = orchestrator.run(&registry, cli.repeat).await;

    let mut failures = 0;
    for (hostname, outcome) in &outcomes {
        match outcome {
            DeviceOutcome::Succeeded {
                boot_count,
                version,
            } => info!(
                "{hostname}: succeeded (boot count {boot_count}, version {})",
                version.as_deref().unwrap_or("unchanged")
            ),
            DeviceOutcome::Skipped { reason } => info!("{hostname}: skipped: {reason}"),
            DeviceOutcome::Failed { phase, last_error } => {
                failures += 1;
                error!("{hostname}: failed while {phase}: {last_error}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} device(s) failed to upgrade");
    }
    Ok(())
}
