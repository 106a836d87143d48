pub mod destroy;
pub mod list;
pub mod recreate;
pub mod restart;
pub mod run;

use std::path::Path;

use anyhow::Context;
use sbc_core::SbcConfig;

use crate::GlobalArgs;

/// Read the configuration file (if any) and apply the global path flags.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<SbcConfig> {
    let mut config = match &global.config {
        Some(path) => SbcConfig::from_file(path)
            .with_context(|| format!("could not load config file {}", path.display()))?,
        None => SbcConfig::default(),
    };

    if let Some(db_file) = &global.db_file {
        config.paths.db_file = db_file.clone();
    }
    if let Some(log_file) = &global.log_file {
        config.paths.log_file = Some(log_file.clone());
    }
    if let Some(engine_log) = &global.engine_log {
        config.paths.engine_log_file = Some(engine_log.clone());
    }
    Ok(config)
}

/// Create the parent directories of every file the tool writes.
pub fn prepare_directories(config: &SbcConfig) -> anyhow::Result<()> {
    let paths = [
        Some(config.paths.db_file.as_path()),
        config.paths.log_file.as_deref(),
        config.paths.engine_log_file.as_deref(),
    ];

    for parent in paths.into_iter().flatten().filter_map(Path::parent) {
        if parent.as_os_str().is_empty() {
            continue;
        }
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create directory {}", parent.display()))?;
    }
    Ok(())
}
