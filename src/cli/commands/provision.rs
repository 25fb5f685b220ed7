//! Provision command - ensure the optimizer environment exists

use crate::cli::args::ProvisionArgs;
use crate::cli::commands::create_progress_bar;
use crate::config::Config;
use crate::engine::BuildEngine;
use crate::error::KilnResult;
use crate::runtime::create_runtime;
use console::style;
use tracing::debug;

/// Execute the provision command
pub async fn execute(args: ProvisionArgs, config: &Config) -> KilnResult<()> {
    let pb = create_progress_bar("Checking environment...");

    let runtime = create_runtime(config).await?;
    let engine = BuildEngine::new(runtime.as_ref(), config);

    let (handle, built) = engine
        .provision(args.force, &|line| debug!("{line}"))
        .await?;
    pb.finish_and_clear();

    if built {
        println!(
            "{} Environment built: {}",
            style("✓").green(),
            style(handle.tag()).cyan()
        );
    } else {
        println!(
            "{} Environment already present: {}",
            style("✓").green(),
            style(handle.tag()).cyan()
        );
    }

    Ok(())
}
