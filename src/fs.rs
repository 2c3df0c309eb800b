//! Filesystem access used for existence and change checks, behind a trait
//! so the engine can be driven against an in-memory filesystem.

use std::path::Path;
use std::time::SystemTime;

/// What stat() found at a path.  This also models "file is absent".
/// It's not using an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FileStat {
    Missing,
    Dir,
    File { mtime: SystemTime, len: u64 },
}

pub trait FileSystem {
    /// stat() an on-disk path.  A missing path is not an error.
    fn stat(&self, path: &Path) -> std::io::Result<FileStat>;
}

#[derive(Default)]
pub struct RealFileSystem {}
impl RealFileSystem {
    pub fn new() -> Self {
        RealFileSystem {}
    }
}

impl FileSystem for RealFileSystem {
    fn stat(&self, path: &Path) -> std::io::Result<FileStat> {
        Ok(match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => FileStat::Dir,
            Ok(meta) => FileStat::File {
                mtime: meta.modified()?,
                len: meta.len(),
            },
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    FileStat::Missing
                } else {
                    return Err(err);
                }
            }
        })
    }
}
