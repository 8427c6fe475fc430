//! Root discovery: the well-known documents served by every home mirror.

use crate::manifest::ManifestParser;
use crate::model::ModEntry;
use crate::paths::pjoin;
use crate::transfer::Transfer;
use std::collections::HashSet;
use tracing::{info, warn};

/// Latest installer version and an optional link to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootVersion {
    pub version: String,
    pub link: Option<String>,
}

/// Queries the home mirrors for `version.txt`, `filenames.txt` and `basic_config.txt`.
pub struct RootDiscovery {
    transfer: Transfer,
    home_urls: Vec<String>,
}

impl RootDiscovery {
    pub fn new(transfer: Transfer, home_urls: Vec<String>) -> Self {
        Self {
            transfer,
            home_urls,
        }
    }

    /// Returns the document from the first mirror that serves it.
    pub async fn get_first(&self, file: &str) -> Option<String> {
        for home in &self.home_urls {
            if let Some(body) = self.transfer.get_optional(&pjoin([home.as_str(), file])).await {
                return Some(body);
            }
        }
        None
    }

    /// Returns the document from every mirror that serves it.
    pub async fn get_all(&self, file: &str) -> Vec<String> {
        let mut results = Vec::new();
        for home in &self.home_urls {
            if let Some(body) = self.transfer.get_optional(&pjoin([home.as_str(), file])).await {
                results.push(body);
            }
        }
        results
    }

    /// Union of the lines of `file` across all mirrors. Order is not preserved.
    pub async fn get_lines(&self, file: &str) -> HashSet<String> {
        self.get_all(file)
            .await
            .iter()
            .flat_map(|body| body.lines().map(str::to_string))
            .collect()
    }

    /// `version.txt`: first line is the version, second the installer link.
    pub async fn get_version(&self) -> Option<RootVersion> {
        let body = self.get_first("version.txt").await?;
        let mut lines = body.trim().lines().map(str::trim);
        let version = lines.next()?.to_string();
        let link = lines.next().filter(|l| !l.is_empty()).map(str::to_string);
        Some(RootVersion { version, link })
    }

    /// `basic_config.txt`: one entry name per line, enabled in a basic install.
    pub async fn get_basic_config(&self) -> HashSet<String> {
        self.get_lines("basic_config.txt")
            .await
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Fetches and parses every manifest listed in `filenames.txt`.
    ///
    /// Links that fail to load are skipped.
    pub async fn get_mods(&self) -> Vec<ModEntry> {
        let mut mods = Vec::new();

        for link in self.get_lines("filenames.txt").await {
            let link = link.trim();
            if link.is_empty() {
                continue;
            }

            match self.transfer.get_optional(link).await {
                Some(data) => {
                    let entries = ManifestParser::parse(&data);
                    info!("Found {} mod(s) in {}", entries.len(), link);
                    mods.extend(entries);
                }
                None => warn!("Skipping manifest {}", link),
            }
        }

        mods
    }
}
