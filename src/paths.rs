use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn default_download_dir() -> Result<PathBuf> {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .context("unable to resolve a download directory")
}
