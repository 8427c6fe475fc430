//! Configuration and stage control.

use crate::error::ModError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Mirrored roots serving `version.txt`, `filenames.txt` and `basic_config.txt`.
pub const DEFAULT_HOME_URLS: &[&str] = &[
    "http://www.fsoinstaller.com/files/installer/java/",
    "http://scp.indiegames.us/fsoinstaller/",
];

/// User-Agent sent with every request. Some mirrors reject unknown agents.
pub const DEFAULT_USER_AGENT: &str = "curl/7.22.0";

/// Client configuration.
///
/// # Example
///
/// ```
/// use modsync::ClientConfig;
///
/// let config = ClientConfig {
///     archive_tool: "/usr/bin/7za".into(),
///     download_retries: 0,
///     ..ClientConfig::default()
/// };
/// assert_eq!(config.home_urls.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root URLs queried by discovery, in preference order.
    pub home_urls: Vec<String>,
    /// User-Agent header for all requests.
    pub user_agent: String,
    /// Path or name of the external archive tool (a 7-Zip compatible CLI).
    pub archive_tool: String,
    /// Discard the archive tool's stdout/stderr.
    pub quiet_archive_tool: bool,
    /// Extra attempts per mirror before moving on to the next one.
    pub download_retries: usize,
    /// Pause between attempts on the same mirror, in milliseconds.
    pub retry_interval_ms: u64,
    /// Maximum number of 301/302 hops followed for one request.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            home_urls: DEFAULT_HOME_URLS.iter().map(|s| s.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            archive_tool: "7z".to_string(),
            quiet_archive_tool: false,
            download_retries: 2,
            retry_interval_ms: 2000,
            max_redirects: 10,
        }
    }
}

impl ClientConfig {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ModError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// One stage of the install pipeline. Stages always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstallStage {
    Delete,
    Rename,
    Download,
    Extract,
    VerifyHashes,
    Cleanup,
}

impl InstallStage {
    pub const ALL: [InstallStage; 6] = [
        InstallStage::Delete,
        InstallStage::Rename,
        InstallStage::Download,
        InstallStage::Extract,
        InstallStage::VerifyHashes,
        InstallStage::Cleanup,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<InstallStage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Label template shown while the stage runs. `{}` receives the item label.
    pub fn label(self) -> &'static str {
        match self {
            InstallStage::Delete => "Deleting: {}",
            InstallStage::Rename => "Renaming: {}",
            InstallStage::Download => "Downloading: {}",
            InstallStage::Extract => "Extracting: {}",
            InstallStage::VerifyHashes => "Verifying: {}",
            InstallStage::Cleanup => "Cleaning up: {}",
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Delete => "delete",
            InstallStage::Rename => "rename",
            InstallStage::Download => "download",
            InstallStage::Extract => "extract",
            InstallStage::VerifyHashes => "verify",
            InstallStage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}
