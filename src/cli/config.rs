use crate::config::generate::generate_starter_config;
use crate::config::{system_config_path, user_config_path};
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    write_config(&generate_starter_config(), stdout)
}

fn write_config(config_content: &str, stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer ~/.config/logpusher/config.yml, fall back to /etc/logpusher
    let config_path = user_config_path()
        .and_then(|user_config| match user_config.parent() {
            Some(parent) => match fs::create_dir_all(parent) {
                Ok(()) => Some(user_config),
                Err(_) => {
                    eprintln!("Warning: Could not create directory {}", parent.display());
                    eprintln!("Falling back to {}", system_config_path().display());
                    None
                }
            },
            None => None,
        })
        .unwrap_or_else(system_config_path);

    write_new_file(config_content, config_path)
}

fn write_new_file(config_content: &str, config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}. Remove it first or use --stdout to print the config",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}
