//! Configuration commands

use anyhow::{Result, bail};
use encyclo::config::Config;

/// Show current effective configuration
pub async fn cmd_config_show() -> Result<()> {
  let user_config = Config::user_config_path();

  let config = match &user_config {
    Some(path) if path.exists() => match Config::load_from(path).await {
      Some(config) => {
        println!("Using user config: {:?}", path);
        config
      }
      None => {
        println!("Config file {:?} is invalid; using defaults", path);
        Config::default()
      }
    },
    Some(_) => {
      println!("Using default configuration (no config file found)");
      Config::default()
    }
    None => {
      println!("Using default configuration");
      Config::default()
    }
  };
  println!();

  let toml_str = toml::to_string_pretty(&config)?;
  println!("{}", toml_str);

  Ok(())
}

/// Write the user config file with defaults
pub async fn cmd_config_init(force: bool) -> Result<()> {
  let Some(config_path) = Config::user_config_path() else {
    bail!("Could not determine user config path");
  };

  if config_path.exists() && !force {
    println!("Config file already exists: {:?}", config_path);
    println!("Use --force to overwrite it");
    return Ok(());
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&config_path, Config::generate_template())?;

  println!("Created config: {:?}", config_path);
  println!("Edit the file to point [search] at your Meilisearch instance");
  println!("and [ingest] at the release batch.");

  Ok(())
}
