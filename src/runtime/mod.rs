//! Container runtime abstraction
//!
//! Provides a trait for the container operations the engine needs (images,
//! volumes, containers, copies) with a CLI-driven implementation that works
//! against docker or podman, selected by the factory.

mod cli;
mod factory;
#[cfg(test)]
pub mod fake;
mod runtime;
mod types;

pub use cli::CliRuntime;
pub use factory::create_runtime;
pub use runtime::{ContainerRuntime, RunStatus, VolumeInfo};
pub use types::{ContainerSpec, Mount};

use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in error diagnostics.
const ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of pipeline output for error diagnostics.
///
/// Returns the last `ERROR_TAIL_LINES` lines so error messages are
/// actionable without being overwhelming.
pub(crate) fn output_tail(lines: &[String]) -> String {
    let total = lines.len();
    let tail = if total > ERROR_TAIL_LINES {
        &lines[total - ERROR_TAIL_LINES..]
    } else {
        lines
    };
    tail.join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting. This is a standalone
/// async function (not behind `async_trait`) to avoid lifetime issues with the
/// `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let stderr = child.stderr.take().expect("stderr piped");
    let stdout = child.stdout.take().expect("stdout piped");

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
