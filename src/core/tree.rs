//! core::tree
//!
//! Assembling nested tree objects from a flat entry list.
//!
//! # Architecture
//!
//! Callers describe the desired repository state as a flat list of
//! [`Entry`] values. Backends that store trees level by level (the local
//! git repository and the in-memory store) share this module to turn that
//! list into tree objects: intermediate directories are derived from path
//! segments, and each backend only supplies [`TreeObjects`] for reading and
//! writing a single level.
//!
//! # Invariants
//!
//! - A directory-mode entry reuses the existing subtree by hash
//! - Blob entries listed below a directory-mode entry overlay that subtree
//! - Directories that end up with no children are not written
//! - A blob path that is also used as a directory is replaced by the directory
//!
//! # Example
//!
//! ```ignore
//! let root = build_tree(&mut objects, &entries)?;
//! ```

use std::collections::BTreeMap;

use crate::core::types::{Entry, EntryMode, Oid};

/// One record of a single tree level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRecord {
    /// Entry name (a single path segment).
    pub name: String,
    pub mode: EntryMode,
    pub oid: Oid,
}

/// Level-by-level access to a backend's tree objects.
pub trait TreeObjects {
    type Error;

    /// Read the records of the tree object `oid`.
    fn read_level(&mut self, oid: &Oid) -> Result<Vec<TreeRecord>, Self::Error>;

    /// Write a tree object containing exactly `records` and return its hash.
    fn write_level(&mut self, records: &[TreeRecord]) -> Result<Oid, Self::Error>;
}

#[derive(Debug, Default)]
struct DirNode {
    /// Existing subtree this directory starts from.
    base: Option<Oid>,
    leaves: BTreeMap<String, (EntryMode, Oid)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    /// Walk to (creating as needed) the directory at `segments`.
    fn dir_mut<'a>(&mut self, segments: impl Iterator<Item = &'a str>) -> &mut DirNode {
        let mut node = self;
        for segment in segments {
            node.leaves.remove(segment);
            node = node.dirs.entry(segment.to_string()).or_default();
        }
        node
    }

    fn insert(&mut self, entry: &Entry) {
        let segments: Vec<&str> = entry.path.segments().collect();
        let Some((name, parents)) = segments.split_last() else {
            return;
        };
        if entry.is_tree() {
            let dir = self.dir_mut(segments.iter().copied());
            dir.base = Some(entry.oid.clone());
            return;
        }
        let parent = self.dir_mut(parents.iter().copied());
        // A directory already claimed this name; the deeper paths win.
        if !parent.dirs.contains_key(*name) {
            parent
                .leaves
                .insert((*name).to_string(), (entry.mode, entry.oid.clone()));
        }
    }

    /// Write this directory, returning `None` when it would be empty.
    fn write<T: TreeObjects>(self, objects: &mut T) -> Result<Option<Oid>, T::Error> {
        if self.leaves.is_empty() && self.dirs.is_empty() {
            return Ok(self.base);
        }

        let mut records: BTreeMap<String, TreeRecord> = BTreeMap::new();
        if let Some(base) = &self.base {
            for record in objects.read_level(base)? {
                records.insert(record.name.clone(), record);
            }
        }

        for (name, (mode, oid)) in self.leaves {
            records.insert(name.clone(), TreeRecord { name, mode, oid });
        }

        for (name, dir) in self.dirs {
            match dir.write(objects)? {
                Some(oid) => {
                    records.insert(
                        name.clone(),
                        TreeRecord {
                            name,
                            mode: EntryMode::Directory,
                            oid,
                        },
                    );
                }
                None => {
                    records.remove(&name);
                }
            }
        }

        if records.is_empty() {
            return Ok(None);
        }
        let records: Vec<TreeRecord> = records.into_values().collect();
        objects.write_level(&records).map(Some)
    }
}

/// Build the nested tree objects for `entries` and return the root hash.
///
/// The root is always written, even when `entries` is empty.
pub fn build_tree<T: TreeObjects>(objects: &mut T, entries: &[Entry]) -> Result<Oid, T::Error> {
    let mut root = DirNode::default();
    for entry in entries {
        root.insert(entry);
    }
    match root.write(objects)? {
        Some(oid) => Ok(oid),
        None => objects.write_level(&[]),
    }
}

/// Flatten a tree into entries by walking it level by level.
///
/// When `recursive` is false only the top level is returned. Directory
/// entries are included alongside their contents.
pub fn walk_tree<T: TreeObjects>(
    objects: &mut T,
    root: &Oid,
    recursive: bool,
) -> Result<Vec<(String, EntryMode, Oid)>, T::Error> {
    let mut out = Vec::new();
    let mut pending = vec![(String::new(), root.clone())];
    while let Some((prefix, oid)) = pending.pop() {
        for record in objects.read_level(&oid)? {
            let path = if prefix.is_empty() {
                record.name.clone()
            } else {
                format!("{}/{}", prefix, record.name)
            };
            if recursive && record.mode == EntryMode::Directory {
                pending.push((path.clone(), record.oid.clone()));
            }
            out.push((path, record.mode, record.oid));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoPath;
    use std::collections::HashMap;

    /// Trees keyed by a counter-derived id.
    #[derive(Default)]
    struct FakeObjects {
        trees: HashMap<Oid, Vec<TreeRecord>>,
        writes: usize,
    }

    impl TreeObjects for FakeObjects {
        type Error = String;

        fn read_level(&mut self, oid: &Oid) -> Result<Vec<TreeRecord>, String> {
            self.trees
                .get(oid)
                .cloned()
                .ok_or_else(|| format!("missing tree {oid}"))
        }

        fn write_level(&mut self, records: &[TreeRecord]) -> Result<Oid, String> {
            if let Some((oid, _)) = self.trees.iter().find(|(_, r)| r.as_slice() == records) {
                return Ok(oid.clone());
            }
            self.writes += 1;
            let oid = Oid::new(format!("{:040x}", self.writes)).map_err(|e| e.to_string())?;
            self.trees.insert(oid.clone(), records.to_vec());
            Ok(oid)
        }
    }

    fn blob(path: &str, n: u8) -> Entry {
        Entry::blob(RepoPath::new(path).unwrap(), Oid::new(format!("{:040x}", 1000 + n as u32)).unwrap())
    }

    fn paths(objects: &mut FakeObjects, root: &Oid) -> Vec<String> {
        walk_tree(objects, root, true)
            .unwrap()
            .into_iter()
            .filter(|(_, mode, _)| *mode != EntryMode::Directory)
            .map(|(p, _, _)| p)
            .collect()
    }

    #[test]
    fn derives_intermediate_directories() {
        let mut objects = FakeObjects::default();
        let root = build_tree(
            &mut objects,
            &[blob("a.md", 1), blob("dir/b.md", 2), blob("dir/sub/c.md", 3)],
        )
        .unwrap();
        assert_eq!(
            paths(&mut objects, &root),
            vec!["a.md", "dir/b.md", "dir/sub/c.md"]
        );
    }

    #[test]
    fn empty_entries_write_empty_root() {
        let mut objects = FakeObjects::default();
        let root = build_tree(&mut objects, &[]).unwrap();
        assert!(objects.read_level(&root).unwrap().is_empty());
    }

    #[test]
    fn directory_entry_reuses_subtree() {
        let mut objects = FakeObjects::default();
        let original = build_tree(&mut objects, &[blob("old/x.md", 1), blob("old/y.md", 2)]).unwrap();
        let old_tree = objects
            .read_level(&original)
            .unwrap()
            .into_iter()
            .find(|r| r.name == "old")
            .unwrap()
            .oid;

        let writes_before = objects.writes;
        let moved = build_tree(
            &mut objects,
            &[Entry::tree(RepoPath::new("new").unwrap(), old_tree.clone())],
        )
        .unwrap();
        // Only the new root is written; the subtree is reused as-is.
        assert_eq!(objects.writes, writes_before + 1);
        assert_eq!(paths(&mut objects, &moved), vec!["new/x.md", "new/y.md"]);
    }

    #[test]
    fn blobs_overlay_directory_entry() {
        let mut objects = FakeObjects::default();
        let original = build_tree(&mut objects, &[blob("d/x.md", 1)]).unwrap();
        let d = objects.read_level(&original).unwrap()[0].oid.clone();

        let root = build_tree(
            &mut objects,
            &[
                Entry::tree(RepoPath::new("d").unwrap(), d),
                blob("d/y.md", 2),
            ],
        )
        .unwrap();
        assert_eq!(paths(&mut objects, &root), vec!["d/x.md", "d/y.md"]);
    }

    #[test]
    fn non_recursive_walk_lists_top_level() {
        let mut objects = FakeObjects::default();
        let root = build_tree(&mut objects, &[blob("a.md", 1), blob("d/b.md", 2)]).unwrap();
        let top: Vec<String> = walk_tree(&mut objects, &root, false)
            .unwrap()
            .into_iter()
            .map(|(p, _, _)| p)
            .collect();
        assert_eq!(top, vec!["a.md", "d"]);
    }

    #[test]
    fn preserves_leaf_modes() {
        let mut objects = FakeObjects::default();
        let mut exec = blob("run.sh", 1);
        exec.mode = EntryMode::Executable;
        let root = build_tree(&mut objects, &[exec]).unwrap();
        let records = objects.read_level(&root).unwrap();
        assert_eq!(records[0].mode, EntryMode::Executable);
    }
}
