//! Command-line argument parsing for bconsole
//!
//! Uses clap for argument parsing with derive macros.

use std::path::PathBuf;

use clap::Parser;
use uuid::Uuid;

use birdactyl_utils::Result;

use crate::config::{ConfigLoader, ConsoleConfig};

/// bconsole - live console for a Birdactyl server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server to attach to
    pub server_id: Uuid,

    /// Panel base URL, e.g. https://panel.example.com
    ///
    /// Overrides `[panel] url` from the config file.
    #[arg(long, env = "BIRDACTYL_PANEL_URL")]
    pub panel_url: Option<String>,

    /// API token
    ///
    /// Overrides `[panel] token` from the config file.
    #[arg(long, env = "BIRDACTYL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Console lines to keep in memory
    #[arg(long)]
    pub scrollback: Option<usize>,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the config file and layer these arguments over it
    pub fn load_config(&self) -> Result<ConsoleConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_from_path(path)?,
            None => ConfigLoader::load()?,
        };
        self.apply(&mut config);
        ConfigLoader::validate(&config)?;
        Ok(config)
    }

    /// Override config values with the ones given on the command line
    pub fn apply(&self, config: &mut ConsoleConfig) {
        if let Some(url) = &self.panel_url {
            config.panel.url = Some(url.clone());
        }
        if let Some(token) = &self.token {
            config.panel.token = Some(token.clone());
        }
        if let Some(lines) = self.scrollback {
            config.console.scrollback_lines = lines;
        }
    }
}
