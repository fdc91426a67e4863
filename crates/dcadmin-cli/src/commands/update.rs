//! Self-update command

use clap::Args;
use dcadmin_core::config::UpdateConfig;
use dcadmin_engine::commands::update::run_update;

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Release to install, e.g. 2.9.1 (default: the latest release)
    pub version: Option<String>,
}

pub fn execute(args: UpdateArgs) -> anyhow::Result<()> {
    let config = UpdateConfig::from_env();
    let outcome = run_update(&config, args.version.as_deref())?;

    println!(
        "Updated {} from {}",
        outcome.installed_at.display(),
        outcome.url
    );
    println!("  {} bytes, sha256 {}", outcome.bytes, outcome.sha256);
    Ok(())
}
