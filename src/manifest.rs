//! Parser for the line-oriented mod manifest format.
//!
//! A manifest is a sequence of lines. Each line is either a token or data
//! belonging to the token before it:
//!
//! ```text
//! NAME
//! Example Mod
//! FOLDER
//! example
//! URL
//! http://mirror.example.com/files/
//! example.7z
//! HASH
//! md5 data/example.vp 0123456789abcdef0123456789abcdef
//! NAME
//! Optional Package
//! END
//! END
//! ```
//!
//! Lines that are not tokens and appear with no token expecting data are
//! filenames for the most recent `URL`/`MULTIURL` group.

use crate::error::ParseError;
use crate::model::{FileGroup, FileHash, ModEntry, Rename};
use crate::paths::{normalize_folder, normalize_path};
use std::collections::VecDeque;
use tracing::{debug, error, warn};

/// Tokens that may start a field.
pub const TOKENS: &[&str] = &[
    "NAME",
    "DESC",
    "FOLDER",
    "DELETE",
    "RENAME",
    "URL",
    "MULTIURL",
    "HASH",
    "VERSION",
    "NOTE",
    "DEPENDENCIES",
    "END",
];

pub fn is_token(line: &str) -> bool {
    TOKENS.contains(&line)
}

/// Bare uppercase words look like tokens; unknown ones are probably typos.
fn looks_like_token(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_uppercase())
}

/// Result of parsing one document.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Top-level entries completed before the end of input or the first fatal error.
    pub entries: Vec<ModEntry>,
    /// The fatal error that stopped parsing, if any.
    pub error: Option<ParseError>,
    /// Filename lines dropped because no file group was open.
    pub dropped: Vec<String>,
    /// Non-fatal grammar errors, one [`ParseError::NoFileGroup`] per dropped line.
    pub warnings: Vec<ParseError>,
}

/// Recursive-descent parser over the lines of one manifest document.
pub struct ManifestParser {
    lines: VecDeque<String>,
    line_no: usize,
    dropped: Vec<String>,
    warnings: Vec<ParseError>,
}

impl ManifestParser {
    fn new(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(|l| l.to_string()).collect(),
            line_no: 0,
            dropped: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Parses a document and returns its top-level entries.
    ///
    /// Grammar errors are logged; entries finished before the error are kept.
    pub fn parse(text: &str) -> Vec<ModEntry> {
        Self::parse_document(text).entries
    }

    /// Parses a document, also reporting the fatal error and dropped lines.
    pub fn parse_document(text: &str) -> ParseOutcome {
        let mut parser = Self::new(text);
        let mut entries = Vec::new();
        let mut fatal = None;

        while let Some(line) = parser.next_line() {
            if line == "NAME" {
                match parser.parse_entry(None) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        error!("ModInfo: {}", e);
                        fatal = Some(e);
                        break;
                    }
                }
            } else if is_token(&line) {
                let e = ParseError::UnexpectedToken {
                    token: line,
                    line: parser.line_no,
                };
                error!("ModInfo: {}", e);
                fatal = Some(e);
                break;
            } else if !line.is_empty() {
                warn!("ModInfo: Ignoring line \"{}\" outside a mod.", line);
            }
        }

        if entries.is_empty() {
            error!("ModInfo: No mod found!");
        }

        ParseOutcome {
            entries,
            error: fatal,
            dropped: parser.dropped,
            warnings: parser.warnings,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let line = self.lines.pop_front()?;
        self.line_no += 1;
        Some(line.trim().to_string())
    }

    fn read(&mut self, expecting: &str) -> Result<String, ParseError> {
        self.next_line().ok_or_else(|| ParseError::UnexpectedEof {
            expecting: expecting.to_string(),
        })
    }

    fn read_until(&mut self, end: &str) -> Result<Vec<String>, ParseError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read(end)?;
            if line == end {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    fn parse_entry(&mut self, parent: Option<&str>) -> Result<ModEntry, ParseError> {
        let mut entry = ModEntry::new(self.read("mod name")?);
        entry.parent = parent.map(str::to_string);
        debug!("ModInfo: Parsing mod \"{}\"...", entry.name);

        while let Some(line) = self.next_line() {
            match line.as_str() {
                "" => continue,
                "DESC" => entry.description = self.read_until("ENDDESC")?.join("\n"),
                "NOTE" => entry.note = self.read_until("ENDNOTE")?.join("\n"),
                "DEPENDENCIES" => entry.dependencies = self.read_until("ENDDEPENDENCIES")?,
                "FOLDER" => entry.install_folder = normalize_folder(&self.read("folder")?),
                "DELETE" => entry
                    .deletions
                    .push(normalize_path(&self.read("path to delete")?)),
                "RENAME" => {
                    let source = normalize_path(&self.read("rename source")?);
                    let destination = normalize_path(&self.read("rename destination")?);
                    entry.renames.push(Rename {
                        source,
                        destination,
                    });
                }
                "URL" => entry.file_groups.push(FileGroup {
                    mirrors: vec![self.read("url")?],
                    files: Vec::new(),
                }),
                "MULTIURL" => entry.file_groups.push(FileGroup {
                    mirrors: self.read_until("ENDMULTI")?,
                    files: Vec::new(),
                }),
                "HASH" => {
                    let hash = self.parse_hash()?;
                    entry.hashes.push(hash);
                }
                "VERSION" => entry.version = self.read("version")?,
                "NAME" => {
                    let sub = self.parse_entry(Some(&entry.name))?;
                    entry.sub_entries.push(sub);
                }
                "END" => break,
                other if is_token(other) => {
                    warn!(
                        "ModInfo: Ignoring token \"{}\" because it wasn't implemented!",
                        other
                    );
                }
                other if looks_like_token(other) => {
                    warn!(
                        "ModInfo: Unexpected line \"{}\". Was expecting a token ({}).",
                        other,
                        TOKENS.join(", ")
                    );
                }
                other => match entry.file_groups.last_mut() {
                    Some(group) => {
                        debug!("ModInfo: Adding \"{}\" to mod \"{}\".", other, entry.name);
                        group.files.push(other.to_string());
                    }
                    None => {
                        error!(
                            "ModInfo: Failed to add \"{}\" to \"{}\" because we have no URLs, yet!",
                            other, entry.name
                        );
                        self.dropped.push(other.to_string());
                        self.warnings.push(ParseError::NoFileGroup {
                            line: self.line_no,
                            entry: entry.name.clone(),
                        });
                    }
                },
            }
        }

        Ok(entry)
    }

    /// `HASH` is either `algo path digest` on one line or three separate lines.
    fn parse_hash(&mut self) -> Result<FileHash, ParseError> {
        let line = self.read("hash")?;
        let parts: Vec<&str> = line.split_whitespace().collect();

        if let [algorithm, path, digest] = parts.as_slice() {
            return Ok(FileHash {
                algorithm: algorithm.to_string(),
                path: normalize_path(path),
                digest: digest.to_string(),
            });
        }

        let path = normalize_path(&self.read("hash path")?);
        let digest = self.read("hash digest")?;
        Ok(FileHash {
            algorithm: line,
            path,
            digest,
        })
    }
}
