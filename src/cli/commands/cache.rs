//! Cache command - inspect and remove cache volumes
//!
//! Volume removal is the explicit operator action for cache invalidation;
//! the engine itself never deletes volumes.

use crate::cache::labels;
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::Config;
use crate::error::KilnResult;
use crate::runtime::create_runtime;
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let runtime = create_runtime(config).await?;

    match args.action {
        CacheAction::Ls => {
            let filter = format!("{}=true", labels::KILN_CACHE);
            let volumes = runtime.volume_list(&filter).await?;

            if volumes.is_empty() {
                println!("No cache volumes found.");
                return Ok(());
            }

            for volume in volumes {
                println!("{}", volume.name);
            }
        }
        CacheAction::Rm { name } => {
            runtime.volume_remove(&name).await?;
            println!("{} Removed cache volume {}", style("✓").green(), name);
        }
    }

    Ok(())
}
