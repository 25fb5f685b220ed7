//! CLI command implementations

pub mod build;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod provision;

pub use build::execute as build;
pub use cache::execute as cache;
pub use codegen::execute as codegen;
pub use config::execute as config;
pub use provision::execute as provision;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner used by long-running commands
pub(crate) fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
