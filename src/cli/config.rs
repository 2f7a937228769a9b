use std::path::Path;

use crate::cli::json_output::ConfigInitResponse;
use crate::cli::ConfigCommands;
use callerid::config::Config;
use callerid::error::{CallerIdError, Result};

pub fn run(cmd: &ConfigCommands, path: &Path, json: bool) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(path, json),
        ConfigCommands::Init { force } => init(path, *force, json),
    }
}

fn show(path: &Path, json: bool) -> Result<()> {
    let config = Config::load(path)?;
    if json {
        let out = serde_json::to_string_pretty(&config)
            .map_err(|e| CallerIdError::Other(format!("JSON serialize error: {}", e)))?;
        println!("{}", out);
    } else {
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| CallerIdError::Config(format!("serialize error: {}", e)))?;
        println!("{}", toml_str);
    }
    Ok(())
}

fn init(path: &Path, force: bool, json: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(CallerIdError::InvalidUsage(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save(path)?;
    if json {
        let out = serde_json::to_string(&ConfigInitResponse {
            path: path.display().to_string(),
        })
        .map_err(|e| CallerIdError::Other(format!("JSON serialize error: {}", e)))?;
        println!("{}", out);
    } else {
        eprintln!("Wrote default config to {}", path.display());
    }
    Ok(())
}
