//! Configuration command

use anyhow::{Context, Result};
use runbox_config::GlobalConfig;

/// Show or edit the configuration file
pub fn config(edit: bool) -> Result<()> {
    let config_path = GlobalConfig::config_path()?;

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

        // Create config file with defaults if it doesn't exist
        if !config_path.exists() {
            GlobalConfig::default().save()?;
            println!("Created default config at {:?}", config_path);
        }

        std::process::Command::new(&editor)
            .arg(&config_path)
            .status()
            .context(format!("Failed to open editor: {}", editor))?;

        // Report problems now rather than on the next run
        if let Err(e) = GlobalConfig::load_from(&config_path) {
            eprintln!("Warning: {}", e);
        }
    } else if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("# Config file: {:?}\n", config_path);
        println!("{}", content);
    } else {
        println!("# Config file: {:?} (not created yet)\n", config_path);
        println!("# Default configuration:");
        let content = toml::to_string_pretty(&GlobalConfig::default())?;
        println!("{}", content);
        println!("\n# Run 'runbox config --edit' to create and edit the config file.");
    }

    Ok(())
}
