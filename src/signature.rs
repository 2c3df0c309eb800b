//! Resource signatures: the compact summary of a resource's content that a
//! build record remembers, and that change detection compares against.

use crate::fs::{FileStat, FileSystem};
use crate::graph::Resource;
use anyhow::bail;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Opaque signature bytes.  Two signatures of the same resource differ iff
/// the resource changed in between.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn empty() -> Self {
        Signature(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("-");
        }
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

const UNIT_SEPARATOR: u8 = 0x1F;

fn stat_file(fs: &dyn FileSystem, path: &Path) -> anyhow::Result<FileStat> {
    match fs.stat(path) {
        Ok(FileStat::Dir) => bail!("{}: is a directory, not a regular file", path.display()),
        Ok(stat) => Ok(stat),
        Err(err) => bail!("stat {}: {}", path.display(), err),
    }
}

impl Resource {
    pub fn exists(&self, fs: &dyn FileSystem) -> anyhow::Result<bool> {
        match self {
            Resource::File(path) => Ok(stat_file(fs, path)? != FileStat::Missing),
            // Actions and groups are "missing" only in the sense that they
            // have no output to look at; whether they run is decided by
            // their parents.
            Resource::Action | Resource::Group => Ok(true),
        }
    }

    /// The current signature.  A missing file has none.
    pub fn signature(&self, fs: &dyn FileSystem) -> anyhow::Result<Signature> {
        match self {
            Resource::File(path) => match stat_file(fs, path)? {
                FileStat::File { mtime, len } => {
                    let mut hasher = FxHasher::default();
                    path.hash(&mut hasher);
                    hasher.write_u8(UNIT_SEPARATOR);
                    mtime.hash(&mut hasher);
                    hasher.write_u64(len);
                    Ok(Signature(hasher.finish().to_be_bytes().to_vec()))
                }
                _ => bail!("{}: file not found", path.display()),
            },
            Resource::Action | Resource::Group => Ok(Signature::empty()),
        }
    }

    pub fn changed(old: &Signature, new: &Signature) -> bool {
        old != new
    }
}
