//! Parsed mod entries.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One or more mirrors offering the same set of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileGroup {
    pub mirrors: Vec<String>,
    pub files: Vec<String>,
}

/// A path renamed before downloads start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub source: String,
    pub destination: String,
}

/// A digest expected for an installed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub algorithm: String,
    pub path: String,
    pub digest: String,
}

/// One installable unit, possibly with nested packages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEntry {
    pub name: String,
    pub description: String,
    pub note: String,
    /// Relative to the game root. Empty means the root itself.
    pub install_folder: String,
    pub version: String,
    pub deletions: Vec<String>,
    pub renames: Vec<Rename>,
    pub file_groups: Vec<FileGroup>,
    pub hashes: Vec<FileHash>,
    /// Names of required entries. Not resolved here.
    pub dependencies: Vec<String>,
    pub sub_entries: Vec<ModEntry>,
    /// Name of the enclosing entry. Lookup only; see [`ModEntry::parent_in`].
    pub parent: Option<String>,
    /// Flatten archive contents into the install folder.
    #[serde(default)]
    pub ignore_subpath: bool,
}

impl ModEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Filenames of all file groups in declared order, restricted to `selection` if given.
    pub fn files(&self, selection: Option<&HashSet<String>>) -> Vec<String> {
        self.file_groups
            .iter()
            .flat_map(|group| group.files.iter())
            .filter(|f| selection.map_or(true, |sel| sel.contains(*f)))
            .cloned()
            .collect()
    }

    /// Depth-first search for an entry named `name`, including `self`.
    pub fn find(&self, name: &str) -> Option<&ModEntry> {
        if self.name == name {
            return Some(self);
        }
        self.sub_entries.iter().find_map(|sub| sub.find(name))
    }

    /// This entry and all descendants in pre-order.
    pub fn walk(&self) -> Vec<&ModEntry> {
        let mut out = vec![self];
        for sub in &self.sub_entries {
            out.extend(sub.walk());
        }
        out
    }

    /// Resolves the parent reference against the trees it was parsed into.
    pub fn parent_in<'a>(&self, roots: &'a [ModEntry]) -> Option<&'a ModEntry> {
        let parent = self.parent.as_deref()?;
        roots.iter().find_map(|root| {
            root.walk()
                .into_iter()
                .find(|e| e.name == parent && e.sub_entries.iter().any(|s| s.name == self.name))
        })
    }
}

/// Looks up `name` across several trees.
pub fn find_entry<'a>(roots: &'a [ModEntry], name: &str) -> Option<&'a ModEntry> {
    roots.iter().find_map(|root| root.find(name))
}

fn write_block(f: &mut fmt::Formatter<'_>, token: &str, end: &str, text: &str) -> fmt::Result {
    writeln!(f, "{}", token)?;
    if !text.is_empty() {
        writeln!(f, "{}", text)?;
    }
    writeln!(f, "{}", end)
}

/// Renders the entry back into manifest syntax.
impl fmt::Display for ModEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NAME")?;
        writeln!(f, "{}", self.name)?;

        if !self.description.is_empty() {
            write_block(f, "DESC", "ENDDESC", &self.description)?;
        }
        if !self.install_folder.is_empty() {
            writeln!(f, "FOLDER\n{}", self.install_folder)?;
        }
        if !self.version.is_empty() {
            writeln!(f, "VERSION\n{}", self.version)?;
        }
        if !self.note.is_empty() {
            write_block(f, "NOTE", "ENDNOTE", &self.note)?;
        }
        for path in &self.deletions {
            writeln!(f, "DELETE\n{}", path)?;
        }
        for rename in &self.renames {
            writeln!(f, "RENAME\n{}\n{}", rename.source, rename.destination)?;
        }
        for group in &self.file_groups {
            if group.mirrors.len() == 1 {
                writeln!(f, "URL\n{}", group.mirrors[0])?;
            } else {
                write_block(f, "MULTIURL", "ENDMULTI", &group.mirrors.join("\n"))?;
            }
            for file in &group.files {
                writeln!(f, "{}", file)?;
            }
        }
        for hash in &self.hashes {
            if hash.path.split_whitespace().count() == 1 {
                writeln!(f, "HASH\n{} {} {}", hash.algorithm, hash.path, hash.digest)?;
            } else {
                writeln!(f, "HASH\n{}\n{}\n{}", hash.algorithm, hash.path, hash.digest)?;
            }
        }
        if !self.dependencies.is_empty() {
            write_block(f, "DEPENDENCIES", "ENDDEPENDENCIES", &self.dependencies.join("\n"))?;
        }
        for sub in &self.sub_entries {
            write!(f, "{}", sub)?;
        }
        writeln!(f, "END")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ModEntry {
        let mut root = ModEntry::new("Root");
        let mut child = ModEntry::new("Child");
        child.parent = Some("Root".into());
        let mut grandchild = ModEntry::new("Grandchild");
        grandchild.parent = Some("Child".into());
        child.sub_entries.push(grandchild);
        root.sub_entries.push(child);
        root.file_groups.push(FileGroup {
            mirrors: vec!["http://a/".into()],
            files: vec!["one.zip".into(), "two.zip".into()],
        });
        root
    }

    #[test]
    fn test_find_and_walk() {
        let root = tree();
        assert_eq!(root.find("Grandchild").unwrap().name, "Grandchild");
        assert!(root.find("Nope").is_none());
        let names: Vec<_> = root.walk().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Child", "Grandchild"]);
    }

    #[test]
    fn test_parent_lookup() {
        let roots = vec![tree()];
        let grandchild = find_entry(&roots, "Grandchild").unwrap();
        assert_eq!(grandchild.parent_in(&roots).unwrap().name, "Child");
        assert!(roots[0].parent_in(&roots).is_none());
    }

    #[test]
    fn test_selected_files() {
        let root = tree();
        assert_eq!(root.files(None), vec!["one.zip", "two.zip"]);
        let selection: HashSet<String> = ["two.zip".to_string()].into_iter().collect();
        assert_eq!(root.files(Some(&selection)), vec!["two.zip"]);
    }
}
