//! Build command - run the optimizer pipeline for a source tree

use crate::artifact::format_bytes;
use crate::cancel::CancelToken;
use crate::cli::args::{BuildArgs, ModeArg};
use crate::cli::commands::create_progress_bar;
use crate::config::Config;
use crate::engine::BuildEngine;
use crate::error::{KilnError, KilnResult};
use crate::provision::Arch;
use crate::runtime::create_runtime;
use crate::sandbox::{BuildMode, BuildRequest};
use console::style;
use std::env;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> KilnResult<()> {
    let pb = create_progress_bar("Preparing build...");

    let runtime = create_runtime(config).await?;
    debug!("Using runtime: {}", runtime.runtime_name());

    let source = match args.path {
        Some(path) => path,
        None => env::current_dir().map_err(|e| KilnError::io("getting current directory", e))?,
    };

    let arch = Arch::detect()?;
    let mode = match args.mode {
        ModeArg::Mounted => BuildMode::mounted(&config.sandbox),
        ModeArg::Copy => {
            let dest = args
                .dest
                .unwrap_or_else(|| source.join(&config.sandbox.output_dir));
            BuildMode::copy(&config.sandbox, dest)
        }
    };
    let request = BuildRequest::new(&source, arch, mode)?;
    debug!("Building {} ({} mode)", request.project, request.mode.kind());

    // Ctrl-C tears down the sandbox and releases the lock.
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handler.cancel();
        }
    });

    let mut config = config.clone();
    if let Some(secs) = args.lock_wait {
        config.cache.lock_wait_secs = secs;
    }

    pb.set_message(format!("Building {}...", request.project));
    let engine = BuildEngine::new(runtime.as_ref(), &config);
    let report = engine
        .build(&request, &cancel, &|line| debug!("{line}"))
        .await;
    pb.finish_and_clear();

    let report = report?;

    println!(
        "{} Built {} in {:.1}s (cache key {})",
        style("✓").green(),
        style(&request.project).cyan(),
        report.duration.as_secs_f64(),
        report.cache_key
    );
    if report.provisioned {
        println!("  Environment built: {}", report.image);
    }
    for artifact in &report.artifacts {
        println!(
            "  {} ({})",
            artifact.path.display(),
            format_bytes(artifact.size_bytes)
        );
    }

    Ok(())
}
