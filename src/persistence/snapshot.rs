//! Snapshot Module
//!
//! Saves the full entry set of a [`ShardedCache`] to a checksummed binary file
//! and restores it at startup.
//!
//! # File Layout (big-endian)
//! ```text
//! magic    u32   0xCAFEBABE
//! version  u32   1
//! saved_at u64   ms since epoch
//! count    u32
//! count x { key, value, expires_at u64 (0 = never) }
//! checksum u64   CRC32 of every preceding byte
//! ```

use std::fs::{self, File};
use std::hash::Hash;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{ShardedCache, NO_EXPIRY};
use crate::clock::TimeSource;
use crate::error::{CacheError, Result};
use crate::persistence::Serializer;

/// File signature.
pub const SNAPSHOT_MAGIC: u32 = 0xCAFE_BABE;

/// Current format version.
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8 + 4;
const CHECKSUM_LEN: usize = 8;

// == Load Report ==
/// Outcome of a successful [`SnapshotManager::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries inserted into the cache
    pub restored: usize,
    /// Entries skipped because they had expired by load time
    pub expired: usize,
    /// Save timestamp from the header; `None` when no file existed
    pub saved_at_ms: Option<u64>,
}

struct Record<K, V> {
    key: K,
    value: V,
    expires_at: u64,
}

// == Snapshot Manager ==
/// Reads and writes snapshot files for caches of `K -> V`.
pub struct SnapshotManager<K, V> {
    path: PathBuf,
    key_serializer: Arc<dyn Serializer<K>>,
    value_serializer: Arc<dyn Serializer<V>>,
    clock: Arc<dyn TimeSource>,
    /// Held from encoding until the rename; saves share one temp path.
    save_lock: Mutex<()>,
}

impl<K, V> SnapshotManager<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a manager for the snapshot at `path`.
    ///
    /// `clock` must be the cache's own time source so that load-time expiry
    /// filtering agrees with the cache's notion of now.
    pub fn new(
        path: impl Into<PathBuf>,
        key_serializer: Arc<dyn Serializer<K>>,
        value_serializer: Arc<dyn Serializer<V>>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            path: path.into(),
            key_serializer,
            value_serializer,
            clock,
            save_lock: Mutex::new(()),
        }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Save ==
    /// Writes every entry of `cache` to the snapshot file.
    ///
    /// The image goes to `<path>.tmp`, is flushed and fsynced, then renamed
    /// over `path`. On any failure the previous snapshot is left untouched.
    /// Concurrent saves through the same manager run one after another.
    /// Returns the number of entries written.
    pub fn save(&self, cache: &ShardedCache<K, V>) -> Result<usize> {
        let _guard = self.save_lock.lock();
        let saved_at = self.clock.now_ms();
        let (body, count) = self.encode_entries(cache)?;
        let count_field = u32::try_from(count)
            .map_err(|_| CacheError::Format(format!("too many entries to save: {count}")))?;

        let mut image = Vec::with_capacity(HEADER_LEN + body.len() + CHECKSUM_LEN);
        image.extend_from_slice(&SNAPSHOT_MAGIC.to_be_bytes());
        image.extend_from_slice(&SNAPSHOT_VERSION.to_be_bytes());
        image.extend_from_slice(&saved_at.to_be_bytes());
        image.extend_from_slice(&count_field.to_be_bytes());
        image.extend_from_slice(&body);
        let checksum = u64::from(crc32fast::hash(&image));
        image.extend_from_slice(&checksum.to_be_bytes());

        let temp = self.temp_path();
        if let Err(e) = write_synced(&temp, &image) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        sync_parent_dir(&self.path);

        info!(
            "Snapshot saved: {} entries, {} bytes to {}",
            count,
            image.len(),
            self.path.display()
        );
        Ok(count)
    }

    // == Load ==
    /// Restores the snapshot file into `cache`.
    ///
    /// A missing file is not an error. The whole file is validated (header,
    /// checksum, every record) before the first entry is inserted, so a
    /// damaged snapshot never changes the cache. Entries already expired at
    /// load time are skipped; the rest keep their absolute deadline.
    pub fn load(&self, cache: &ShardedCache<K, V>) -> Result<LoadReport> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", self.path.display());
                return Ok(LoadReport::default());
            }
            Err(e) => return Err(e.into()),
        };

        let (saved_at, records) = self.decode(&bytes)?;
        info!(
            "Recovering {} entries from snapshot taken at {}",
            records.len(),
            format_timestamp(saved_at)
        );

        let now = self.clock.now_ms();
        let mut report = LoadReport {
            saved_at_ms: Some(saved_at),
            ..LoadReport::default()
        };
        // Records are MRU-first per shard; insert oldest first so the most
        // recent entries end up most recently used again.
        for record in records.into_iter().rev() {
            let ttl = if record.expires_at == NO_EXPIRY {
                0
            } else if record.expires_at > now {
                record.expires_at - now
            } else {
                report.expired += 1;
                continue;
            };
            cache.put(record.key, record.value, ttl);
            report.restored += 1;
        }

        if report.expired > 0 {
            debug!("Skipped {} entries that expired while offline", report.expired);
        }
        Ok(report)
    }

    fn encode_entries(&self, cache: &ShardedCache<K, V>) -> Result<(Vec<u8>, usize)> {
        let mut body = Vec::new();
        let mut count = 0usize;
        let mut failure: Option<io::Error> = None;

        cache.for_each(|key, value, expires_at| {
            if failure.is_some() {
                return;
            }
            let written = self
                .key_serializer
                .serialize(key, &mut body)
                .and_then(|()| self.value_serializer.serialize(value, &mut body))
                .and_then(|()| body.write_all(&expires_at.to_be_bytes()));
            match written {
                Ok(()) => count += 1,
                Err(e) => failure = Some(e),
            }
        });

        match failure {
            Some(e) => Err(e.into()),
            None => Ok((body, count)),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<(u64, Vec<Record<K, V>>)> {
        if bytes.len() < 8 {
            return Err(CacheError::Format(format!(
                "file too short for a header: {} bytes",
                bytes.len()
            )));
        }
        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != SNAPSHOT_MAGIC {
            return Err(CacheError::Format(format!("bad signature {magic:#010x}")));
        }
        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SNAPSHOT_VERSION {
            return Err(CacheError::Format(format!("unsupported version {version}")));
        }
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(CacheError::Format(format!(
                "file truncated: {} bytes",
                bytes.len()
            )));
        }

        let (payload, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let mut stored = [0u8; CHECKSUM_LEN];
        stored.copy_from_slice(trailer);
        let expected = u64::from_be_bytes(stored);
        let actual = u64::from(crc32fast::hash(payload));
        if expected != actual {
            return Err(CacheError::Corruption { expected, actual });
        }

        let mut cursor = Cursor::new(&payload[8..]);
        let saved_at = read_u64(&mut cursor)?;
        let count = read_u32(&mut cursor)? as usize;

        // Each record takes at least its 8-byte expiry.
        let mut records = Vec::with_capacity(count.min(payload.len() / 8));
        for i in 0..count {
            records.push(self.read_record(&mut cursor).map_err(|e| {
                CacheError::Format(format!("entry {i} of {count} unreadable: {e}"))
            })?);
        }

        let trailing = cursor.get_ref().len() as u64 - cursor.position();
        if trailing != 0 {
            return Err(CacheError::Format(format!(
                "{trailing} unexpected bytes after {count} entries"
            )));
        }
        Ok((saved_at, records))
    }

    fn read_record(&self, input: &mut dyn Read) -> io::Result<Record<K, V>> {
        let key = self.key_serializer.deserialize(input)?;
        let value = self.value_serializer.deserialize(input)?;
        let expires_at = read_u64(input)?;
        Ok(Record {
            key,
            value,
            expires_at,
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn read_u64(input: &mut dyn Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_u32(input: &mut dyn Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn write_synced(path: &Path, image: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(image)?;
    file.flush()?;
    file.sync_all()
}

/// Makes the rename itself durable; failure only costs durability, not
/// correctness, so it is logged and ignored.
fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            warn!("Could not sync directory {}: {}", parent.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| format!("{ms}ms"))
}
