//! The build record store remembers, for every target, the signatures its
//! parents had the last time it was built successfully.  Comparing those
//! against the current signatures is how change detection decides what is
//! stale.

use crate::signature::Signature;
use crate::smallmap::SmallMap;
use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::{Path, PathBuf};

const RECORD_VERSION: u32 = 0;

/// What a target was built from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildRecord {
    target: Signature,
    parents: SmallMap<String, Signature>,
}

impl BuildRecord {
    pub fn new(target: Signature) -> Self {
        BuildRecord {
            target,
            parents: SmallMap::new(),
        }
    }

    pub fn target_signature(&self) -> &Signature {
        &self.target
    }

    pub fn add_parent(&mut self, name: impl Into<String>, sig: Signature) {
        self.parents.insert(name.into(), sig);
    }

    /// The signature a parent had when the target was built.
    pub fn source_signature(&self, name: &str) -> Option<&Signature> {
        self.parents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    pub fn parent_names(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(|k| k.as_str())
    }

    pub fn dump(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "  target: {}", self.target)?;
        for (name, sig) in self.parents.iter() {
            writeln!(w, "  {}: {}", name, sig)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&RECORD_VERSION.to_be_bytes());
        put_bytes(&mut buf, self.target.as_bytes());
        buf.extend_from_slice(&(self.parents.len() as u32).to_be_bytes());
        for (name, sig) in self.parents.iter() {
            put_bytes(&mut buf, name.as_bytes());
            put_bytes(&mut buf, sig.as_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> anyhow::Result<BuildRecord> {
        let mut r = Reader { buf };
        let version = r.read_u32()?;
        if version > RECORD_VERSION {
            bail!("unsupported record version {}", version);
        }
        let mut record = BuildRecord::new(Signature(r.read_bytes()?.to_vec()));
        let count = r.read_u32()?;
        for _ in 0..count {
            let name = std::str::from_utf8(r.read_bytes()?)?.to_owned();
            let sig = Signature(r.read_bytes()?.to_vec());
            record.add_parent(name, sig);
        }
        if !r.buf.is_empty() {
            bail!("{} trailing bytes after record", r.buf.len());
        }
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn read_u32(&mut self) -> anyhow::Result<u32> {
        if self.buf.len() < 4 {
            bail!("unexpected end of data");
        }
        let (n, rest) = self.buf.split_at(4);
        self.buf = rest;
        Ok(u32::from_be_bytes([n[0], n[1], n[2], n[3]]))
    }

    fn read_bytes(&mut self) -> anyhow::Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        if self.buf.len() < len {
            bail!("unexpected end of data");
        }
        let (bytes, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(bytes)
    }
}

/// Persistent storage of build records, keyed by node name.
pub trait BuildDb {
    fn lookup_node(&self, name: &str) -> anyhow::Result<Option<BuildRecord>>;
    fn write_node(&mut self, name: &str, record: BuildRecord) -> anyhow::Result<()>;
    /// Human-readable listing of every record, sorted by name.
    fn dump(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

fn dump_records(records: &FxHashMap<String, BuildRecord>, w: &mut dyn Write) -> std::io::Result<()> {
    let mut names: Vec<&String> = records.keys().collect();
    names.sort();
    for name in names {
        writeln!(w, "{}:", name)?;
        records[name].dump(w)?;
    }
    Ok(())
}

/// Records held in memory only.
#[derive(Default)]
pub struct MemDb {
    records: FxHashMap<String, BuildRecord>,
}

impl MemDb {
    pub fn new() -> Self {
        MemDb::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BuildDb for MemDb {
    fn lookup_node(&self, name: &str) -> anyhow::Result<Option<BuildRecord>> {
        Ok(self.records.get(name).cloned())
    }

    fn write_node(&mut self, name: &str, record: BuildRecord) -> anyhow::Result<()> {
        self.records.insert(name.to_owned(), record);
        Ok(())
    }

    fn dump(&self, w: &mut dyn Write) -> std::io::Result<()> {
        dump_records(&self.records, w)
    }
}

const DB_SIGNATURE: &[u8] = b"kilndb\n";
const DB_VERSION: u32 = 1;

/// Records kept in an append-only log file.  Each write appends an entry;
/// on open, the log is replayed and the last entry for a name wins.
pub struct FileDb {
    path: PathBuf,
    records: FxHashMap<String, BuildRecord>,
    w: BufWriter<File>,
}

fn write_header(w: &mut dyn Write) -> std::io::Result<()> {
    w.write_all(DB_SIGNATURE)?;
    w.write_all(&DB_VERSION.to_be_bytes())
}

fn write_entry(w: &mut dyn Write, name: &str, record: &[u8]) -> std::io::Result<()> {
    w.write_all(&(name.len() as u32).to_be_bytes())?;
    w.write_all(name.as_bytes())?;
    w.write_all(&(record.len() as u32).to_be_bytes())?;
    w.write_all(record)
}

/// The result of replaying a log.
struct Replay {
    records: FxHashMap<String, BuildRecord>,
    /// Number of complete entries in the log.
    entries: usize,
    /// Length of the log up to the end of the last complete entry.
    good_len: usize,
}

fn replay(path: &Path, data: &[u8]) -> anyhow::Result<Replay> {
    let header_len = DB_SIGNATURE.len() + 4;
    if data.len() < header_len || &data[..DB_SIGNATURE.len()] != DB_SIGNATURE {
        bail!("{}: not a build record database", path.display());
    }
    let mut r = Reader {
        buf: &data[DB_SIGNATURE.len()..],
    };
    let version = r.read_u32()?;
    if version != DB_VERSION {
        bail!(
            "{}: database version is {}, expected {}",
            path.display(),
            version,
            DB_VERSION
        );
    }

    let mut records = FxHashMap::default();
    let mut entries = 0;
    let mut good_len = header_len;
    loop {
        if r.buf.is_empty() {
            break;
        }
        // A crash mid-write can leave a partial entry at the end; it is
        // dropped along with anything after it.
        let Ok(name) = r.read_bytes() else { break };
        let Ok(record) = r.read_bytes() else { break };
        let name = std::str::from_utf8(name)
            .map_err(|err| anyhow!("{}: corrupt entry: {}", path.display(), err))?;
        let record = BuildRecord::decode(record)
            .map_err(|err| anyhow!("{}: corrupt record for {}: {}", path.display(), name, err))?;
        records.insert(name.to_owned(), record);
        entries += 1;
        good_len = data.len() - r.buf.len();
    }
    Ok(Replay {
        records,
        entries,
        good_len,
    })
}

impl FileDb {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<FileDb> {
        let path = path.into();
        let mut data = Vec::new();
        match File::open(&path) {
            Ok(mut f) => {
                f.read_to_end(&mut data)
                    .map_err(|err| anyhow!("read {}: {}", path.display(), err))?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => bail!("open {}: {}", path.display(), err),
        }

        if data.is_empty() {
            let f = File::create(&path).map_err(|err| anyhow!("create {}: {}", path.display(), err))?;
            let mut w = BufWriter::new(f);
            write_header(&mut w)?;
            w.flush()?;
            return Ok(FileDb {
                path,
                records: FxHashMap::default(),
                w,
            });
        }

        let replay = replay(&path, &data)?;
        let f = if replay.entries > 2 * replay.records.len() {
            Self::compact(&path, &replay.records)?
        } else {
            let f = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|err| anyhow!("open {}: {}", path.display(), err))?;
            if replay.good_len < data.len() {
                f.set_len(replay.good_len as u64)?;
            }
            f
        };
        Ok(FileDb {
            path,
            records: replay.records,
            w: BufWriter::new(f),
        })
    }

    /// Rewrite the log with only its live entries, returning the new log
    /// opened for appending.
    fn compact(path: &Path, records: &FxHashMap<String, BuildRecord>) -> anyhow::Result<File> {
        let tmp = path.with_extension("tmp");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            write_header(&mut w)?;
            let mut names: Vec<&String> = records.keys().collect();
            names.sort();
            for name in names {
                write_entry(&mut w, name, &records[name].encode())?;
            }
            w.flush()?;
        }
        std::fs::rename(&tmp, path)
            .map_err(|err| anyhow!("rename {} to {}: {}", tmp.display(), path.display(), err))?;
        Ok(std::fs::OpenOptions::new().append(true).open(path)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BuildDb for FileDb {
    fn lookup_node(&self, name: &str) -> anyhow::Result<Option<BuildRecord>> {
        Ok(self.records.get(name).cloned())
    }

    fn write_node(&mut self, name: &str, record: BuildRecord) -> anyhow::Result<()> {
        write_entry(&mut self.w, name, &record.encode())
            .and_then(|_| self.w.flush())
            .map_err(|err| anyhow!("write {}: {}", self.path.display(), err))?;
        self.records.insert(name.to_owned(), record);
        Ok(())
    }

    fn dump(&self, w: &mut dyn Write) -> std::io::Result<()> {
        dump_records(&self.records, w)
    }
}
