//! Path helpers: case-insensitive resolution, tree merging and joining.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Normalizes a manifest path: backslashes become slashes and the result is case-folded.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Normalizes a `FOLDER` value. A lone `/` means the game root.
pub fn normalize_folder(folder: &str) -> String {
    let folder = folder.replace('\\', "/");
    if folder == "/" {
        String::new()
    } else {
        folder
    }
}

/// Joins slash-separated segments. An absolute segment restarts the path.
pub fn pjoin<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut path = String::new();
    for part in parts {
        if part.starts_with('/') {
            path = part.to_string();
        } else if path.is_empty() || path.ends_with('/') {
            path.push_str(part);
        } else {
            path.push('/');
            path.push_str(part);
        }
    }
    path
}

/// Resolves `b` relative to the URL `a`.
///
/// Full URLs pass through, `//host/...` borrows the scheme of `a`, `/path`
/// keeps the host of `a`, anything else is appended with [`pjoin`].
pub fn url_join(a: &str, b: &str) -> String {
    if has_scheme(b) {
        return b.to_string();
    }
    if b.is_empty() {
        return a.to_string();
    }
    if let Some(rest) = b.strip_prefix("//") {
        let scheme = a.split(':').next().unwrap_or("http");
        return format!("{}://{}", scheme, rest);
    }
    if b.starts_with('/') {
        if let Some((scheme, rest)) = a.split_once("://") {
            let host = rest.split('/').next().unwrap_or(rest);
            return format!("{}://{}{}", scheme, host, b);
        }
        return b.to_string();
    }
    pjoin([a, b])
}

fn has_scheme(s: &str) -> bool {
    match s.split_once("://") {
        Some((scheme, _)) => !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

fn find_case_insensitive(dir: &Path, name: &OsString) -> Option<OsString> {
    let wanted = name.to_string_lossy().to_lowercase();
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .find(|candidate| candidate.to_string_lossy().to_lowercase() == wanted)
}

/// Maps a path to the casing already present on disk.
///
/// Walks up to the nearest existing ancestor and substitutes the on-disk
/// spelling of each segment that matches case-insensitively. If some segment
/// has no match, the original path is returned unchanged.
pub fn resolve_existing_case(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }

    let (Some(parent), Some(item)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };

    let parent = if parent.as_os_str().is_empty() || parent.exists() {
        parent.to_path_buf()
    } else {
        let resolved = resolve_existing_case(parent);
        if !resolved.exists() {
            return path.to_path_buf();
        }
        resolved
    };

    let item = item.to_os_string();
    let lookup_dir = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent.as_path()
    };

    match find_case_insensitive(lookup_dir, &item) {
        Some(found) => {
            if found != item {
                debug!("Picking {:?} for {:?}.", found, item);
            }
            parent.join(found)
        }
        None => path.to_path_buf(),
    }
}

/// Moves a single file, falling back to copy + delete across filesystems.
pub fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
    }
}

/// Moves the contents of `src` into `dest` so that `src/a/b.dat` ends up at
/// `dest/a/b.dat`, overwriting existing files.
///
/// With `fix_case`, each top-level item of `src` is redirected onto an existing
/// sibling in `dest` that differs only in case. Subdirectories are merged
/// without repeating the case fix.
pub fn move_tree(src: &Path, dest: &Path, fix_case: bool) -> io::Result<()> {
    let dest = if fix_case {
        resolve_existing_case(dest)
    } else {
        dest.to_path_buf()
    };

    if !dest.is_dir() {
        fs::create_dir_all(&dest)?;
    }

    let mut siblings: Vec<OsString> = if fix_case {
        fs::read_dir(&dest)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name())
            .collect()
    } else {
        Vec::new()
    };

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let item = entry.file_name();
        let spath = entry.path();
        let mut dpath = dest.join(&item);

        if fix_case && !dpath.exists() {
            let wanted = item.to_string_lossy().to_lowercase();
            match siblings
                .iter()
                .find(|s| s.to_string_lossy().to_lowercase() == wanted)
            {
                Some(existing) => {
                    let redirected = dest.join(existing);
                    warn!(
                        "Changing path {} to {} to avoid case problems...",
                        dpath.display(),
                        redirected.display()
                    );
                    dpath = redirected;
                }
                None => siblings.push(item.clone()),
            }
        }

        if entry.file_type()?.is_dir() {
            move_tree(&spath, &dpath, false)?;
        } else {
            if dpath.is_file() {
                fs::remove_file(&dpath)?;
            }
            move_file(&spath, &dpath)?;
        }
    }

    Ok(())
}
