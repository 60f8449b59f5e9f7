//! `kiln optimize`: pre-bundle dependencies without starting a server.

use crate::cli::OptimizeArgs;
use crate::config::{LoadedConfig, Overrides};
use crate::error::Result;

use super::utils::{build_resolver, run_optimizer};

pub async fn execute(args: OptimizeArgs) -> Result<()> {
    let loaded = LoadedConfig::load(args.cwd.as_deref(), Overrides::from(&args))?;
    let resolver = build_resolver(&loaded);

    run_optimizer(&loaded, &resolver, args.force).await?;
    Ok(())
}
