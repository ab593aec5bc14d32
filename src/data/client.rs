//! Dataset download client
//!
//! Fetches the SVHN MATLAB files from the public Stanford mirror. Files are
//! streamed to a `.part` file and renamed once complete, so an interrupted
//! download is never mistaken for a finished one.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Public SVHN mirror
const SVHN_BASE_URL: &str = "http://ufldl.stanford.edu/housenumbers";

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Split {
    #[default]
    Train,
    Test,
    Extra,
}

impl Split {
    /// Name of the MATLAB file for this split
    pub fn file_name(&self) -> String {
        format!("{}_32x32.mat", self)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Extra => "extra",
        };
        f.write_str(name)
    }
}

impl FromStr for Split {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            "extra" => Ok(Split::Extra),
            other => Err(anyhow!("unknown split `{}` (expected train, test or extra)", other)),
        }
    }
}

/// Path of a split's file under `root`
pub fn split_path<P: AsRef<Path>>(root: P, split: Split) -> PathBuf {
    root.as_ref().join(split.file_name())
}

/// SVHN download client
#[derive(Debug, Clone)]
pub struct SvhnClient {
    client: Client,
    base_url: String,
}

impl Default for SvhnClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SvhnClient {
    /// Create a client pointing at the public mirror
    pub fn new() -> Self {
        Self::with_base_url(SVHN_BASE_URL)
    }

    /// Create a client with a custom base URL (for a local mirror)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL of a split's file
    pub fn url(&self, split: Split) -> String {
        format!("{}/{}", self.base_url, split.file_name())
    }

    /// Download `split` into `root`, skipping the request if the file exists
    ///
    /// # Returns
    ///
    /// Path to the downloaded file
    pub async fn download<P: AsRef<Path>>(&self, split: Split, root: P) -> Result<PathBuf> {
        let root = root.as_ref();
        let dest = split_path(root, split);

        if dest.exists() {
            info!("Using cached {}", dest.display());
            return Ok(dest);
        }

        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("creating {}", root.display()))?;

        let url = self.url(split);
        info!("Downloading {}", url);

        let mut response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("download of {} failed with status {}", url, response.status());
        }

        let pb = match response.content_length() {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")?
                .progress_chars("##-"),
        );
        pb.set_message(split.file_name());

        let partial = dest.with_extension("mat.part");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .with_context(|| format!("creating {}", partial.display()))?;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, &dest).await?;
        pb.finish_with_message("done");

        info!("Saved {}", dest.display());
        Ok(dest)
    }
}
