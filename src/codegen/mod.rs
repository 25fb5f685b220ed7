//! Protocol binding generation
//!
//! Boundary call to an external code generator (buf by default) run against
//! an interface-definition directory. Not part of the core engine; kiln only
//! invokes the tool and reports the generated files or its diagnostics.

use crate::config::schema::CodegenConfig;
use crate::error::{KilnError, KilnResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Run the configured generator against `spec_dir`.
///
/// Returns the files found under the generator's output directory, sorted.
/// Fails with [`KilnError::Codegen`] carrying the tool's captured output
/// when the generator exits non-zero or produces nothing.
pub async fn generate_bindings(
    config: &CodegenConfig,
    spec_dir: &Path,
) -> KilnResult<Vec<PathBuf>> {
    if !spec_dir.is_dir() {
        return Err(KilnError::PathNotFound(spec_dir.to_path_buf()));
    }

    debug!(
        "Running {} {:?} in {}",
        config.command,
        config.args,
        spec_dir.display()
    );

    let output = Command::new(&config.command)
        .args(&config.args)
        .current_dir(spec_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| KilnError::command_failed(config.command.clone(), e))?;

    if !output.status.success() {
        let mut diagnostics = String::from_utf8_lossy(&output.stdout).to_string();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(KilnError::Codegen {
            command: config.command.clone(),
            diagnostics,
        });
    }

    let out_dir = spec_dir.join(&config.out_dir);
    let mut generated = Vec::new();
    if out_dir.is_dir() {
        for entry in WalkDir::new(&out_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| KilnError::Codegen {
                command: config.command.clone(),
                diagnostics: format!("unreadable output directory: {e}"),
            })?;
            if entry.file_type().is_file() {
                generated.push(entry.path().to_path_buf());
            }
        }
    }

    if generated.is_empty() {
        return Err(KilnError::Codegen {
            command: config.command.clone(),
            diagnostics: format!("generator produced no files under {}", out_dir.display()),
        });
    }

    info!("Generated {} binding file(s)", generated.len());
    Ok(generated)
}
