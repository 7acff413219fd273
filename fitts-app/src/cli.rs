use anyhow::{Context, Result};
use clap::Parser;
use fitts_experiment::SessionConfig;
use std::path::PathBuf;

/// 1D Fitts' law pointing experiment driven by raw device motion
#[derive(Debug, Parser)]
#[command(name = "fitts")]
#[command(version)]
#[command(about = "Run a 1D Fitts' law pointing session and log every frame to CSV", long_about = None)]
pub struct Cli {
    /// JSON file overriding any subset of the session defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed for the main trial order
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory receiving the CSV log
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Pointing device URI, e.g. "any:?debugLevel=2"
    #[arg(short, long)]
    pub device: Option<String>,

    /// TrueType font for on-screen text
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_json_file(path)?,
            None => SessionConfig::default(),
        };

        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(uri) = &self.device {
            config.device_uri = uri.clone();
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }

        config.validate().context("effective session configuration")?;
        Ok(config)
    }
}
