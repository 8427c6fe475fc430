//! ModSync - mod distribution client with staged, mirror-tolerant installs
//!
//! This library discovers mods from mirrored root URLs, parses their
//! line-oriented manifests, and installs them into a game directory.
//!
//! # Features
//!
//! - **Manifest Parsing**: Recursive-descent parser with nested sub-mods and multi-line fields
//! - **Mirror Fallback**: Every file is tried against each mirror of its group in order
//! - **Resumable Downloads**: Retries continue from the bytes already on disk
//! - **Archive Extraction**: Through an external 7-Zip compatible tool, two passes for `.tar.*`
//! - **Case Fixing**: Extracted trees merge onto existing directories regardless of case
//! - **Hash Verification**: md5/sha1/sha256/sha512 with an mtime-keyed md5 cache
//!
//! # Example
//!
//! ```no_run
//! use modsync::{ClientConfig, Installer, ManifestParser, NoProgress};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let entries = ManifestParser::parse(&std::fs::read_to_string("mod.txt")?);
//! let installer = Installer::new(&ClientConfig::default(), Arc::new(NoProgress))?;
//!
//! for entry in &entries {
//!     let report = installer.setup(entry, Path::new("/games/fs2"), None).await?;
//!     println!("{}: success = {}", entry.name, report.is_success());
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod discovery;
pub mod error;
pub mod manifest;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod transfer;
pub mod types;
pub mod verify;
pub mod version;

pub use archive::{extract_archive, is_archive, Extractor, SevenZip};
pub use discovery::{RootDiscovery, RootVersion};
pub use error::{ModError, ParseError};
pub use manifest::{ManifestParser, ParseOutcome};
pub use model::{find_entry, FileGroup, FileHash, ModEntry, Rename};
pub use pipeline::{InstallReport, InstallSession, Installer};
pub use progress::{BarProgress, LogProgress, NoProgress, Progress};
pub use transfer::{DownloadTask, Fetched, Transfer};
pub use types::{ClientConfig, InstallStage};
pub use verify::{compute_file_hash, HashAlgorithm, HashCache};
pub use version::vercmp;
