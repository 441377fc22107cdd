//! Install command implementation

use std::path::{Path, PathBuf};

use basset_core::{BassetConfig, DEFAULT_CONFIG};
use miette::{IntoDiagnostic, Result};
use tracing::info;

/// Writes the default config and creates the artifact directory.
pub fn run_install(config: Option<&Path>, force: bool) -> Result<()> {
    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(BassetConfig::CONFIG_FILES[0]));

    write_config(&config_path, force)?;

    let config = BassetConfig::from_file(&config_path).into_diagnostic()?;
    let dir = config.disk_root().join(&config.path);
    std::fs::create_dir_all(&dir).into_diagnostic()?;
    info!("Created {}", dir.display());
    Ok(())
}

fn write_config(config_path: &Path, force: bool) -> Result<()> {
    loop {
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NOFOLLOW);
        }

        match options.open(config_path) {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(DEFAULT_CONFIG.as_bytes()).into_diagnostic()?;
                info!("Created {}", config_path.display());
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !force {
                    return Err(miette::miette!(
                        "Config file already exists. Use --force to overwrite."
                    ));
                }

                match std::fs::remove_file(config_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).into_diagnostic(),
                }
            }
            Err(e) => return Err(e).into_diagnostic(),
        }
    }
}
