//! Codegen command - generate protocol bindings

use crate::cli::args::CodegenArgs;
use crate::codegen::generate_bindings;
use crate::config::Config;
use crate::error::KilnResult;
use console::style;

/// Execute the codegen command
pub async fn execute(args: CodegenArgs, config: &Config) -> KilnResult<()> {
    let files = generate_bindings(&config.codegen, &args.spec_dir).await?;

    println!(
        "{} Generated {} binding file(s)",
        style("✓").green(),
        files.len()
    );
    for file in &files {
        println!("  {}", file.display());
    }

    Ok(())
}
