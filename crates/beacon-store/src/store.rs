//! The mutex-guarded object table with durable write-through.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::{error, info, warn};

use beacon_types::{ObjectRecord, Origin, Timestamp};

use crate::error::StoreError;
use crate::rowlog::{RowLog, RowRecord};

/// The authoritative object table of one registry node.
///
/// All operations are serialized by a single mutex held for the duration of
/// each call, including the synchronous durable write-through. Durable
/// failures during a mutation are logged and swallowed: the in-memory state
/// is authoritative for the response and the next snapshot retries the full
/// dump.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<StoreInner>,
    ttl: Duration,
}

#[derive(Debug)]
struct StoreInner {
    objects: HashMap<String, ObjectRecord>,
    log: RowLog,
}

impl Store {
    /// Opens the store backed by the row log at `path`.
    ///
    /// Does not load existing rows; call [`Store::load_snapshot`] once at
    /// boot.
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, StoreError> {
        let log = RowLog::open(path)?;
        Ok(Self {
            inner: Mutex::new(StoreInner {
                objects: HashMap::new(),
                log,
            }),
            ttl,
        })
    }

    /// Returns the configured TTL for locally-owned records.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Repopulates the map from the durable log.
    ///
    /// All loaded records are tagged [`Origin::Local`]: after a restart this
    /// node owns their liveness again. Loading never fails the process; an
    /// unreadable log yields an empty table.
    pub fn load_snapshot(&self) -> usize {
        let mut inner = self.lock();
        match inner.log.load() {
            Ok(rows) => {
                inner.objects = rows
                    .into_iter()
                    .map(|(name, row)| {
                        let rec = ObjectRecord {
                            address: row.address,
                            language: row.language,
                            version: row.version,
                            region: row.region,
                            last_seen: Timestamp::from_secs(row.last_seen),
                            origin: Origin::Local,
                        };
                        (name, rec)
                    })
                    .collect();
                let count = inner.objects.len();
                if count > 0 {
                    info!(count, "restored records from snapshot");
                }
                count
            }
            Err(e) => {
                error!(error = %e, "failed to load snapshot, starting empty");
                inner.objects.clear();
                0
            }
        }
    }

    /// Inserts or replaces a record, stamping `last_seen` with the current
    /// time and writing the row through to the durable log.
    pub fn put(&self, name: &str, mut rec: ObjectRecord) {
        let mut inner = self.lock();
        // last_seen never decreases, even across a wall-clock regression.
        let floor = inner
            .objects
            .get(name)
            .map_or(Timestamp::EPOCH, |prev| prev.last_seen);
        rec.last_seen = Timestamp::now().max(floor);

        let row = to_row(name, &rec);
        if let Err(e) = inner.log.append_put(&row) {
            error!(name, error = %e, "durable write failed, keeping in-memory state");
        }
        inner.objects.insert(name.to_string(), rec);
    }

    /// Removes a record from memory and the durable log.
    ///
    /// Returns `true` if the record was present.
    pub fn delete(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.objects.remove(name).is_some();
        if removed && let Err(e) = inner.log.append_delete(name) {
            error!(name, error = %e, "durable delete failed, keeping in-memory state");
        }
        removed
    }

    /// Returns a copy of the record, if present.
    pub fn get(&self, name: &str) -> Option<ObjectRecord> {
        self.lock().objects.get(name).cloned()
    }

    /// Returns a snapshot copy of all records, in unspecified order.
    pub fn list(&self) -> Vec<(String, ObjectRecord)> {
        self.lock()
            .objects
            .iter()
            .map(|(name, rec)| (name.clone(), rec.clone()))
            .collect()
    }

    /// Refreshes `last_seen` if the record exists.
    ///
    /// Returns `true` iff the record was present.
    pub fn touch(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(rec) = inner.objects.get_mut(name) else {
            return false;
        };
        rec.last_seen = Timestamp::now().max(rec.last_seen);
        let row = to_row(name, rec);
        if let Err(e) = inner.log.append_put(&row) {
            error!(name, error = %e, "durable write failed, keeping in-memory state");
        }
        true
    }

    /// Number of records currently in the table.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes a full compacted dump of the current state to the durable log.
    ///
    /// Idempotent; safe to run on a timer and once more at shutdown.
    pub fn save_snapshot(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let rows: Vec<RowRecord> = inner
            .objects
            .iter()
            .map(|(name, rec)| to_row(name, rec))
            .collect();
        inner.log.rewrite(rows.iter())
    }

    /// Evicts every locally-owned record whose TTL has elapsed.
    ///
    /// Records received via replication are immune: their authoritative
    /// liveness is tracked on the primary, which replicates the deregister.
    /// Returns the evicted names.
    pub fn sweep_expired(&self) -> Vec<String> {
        let mut inner = self.lock();
        let now = Timestamp::now();
        let ttl_secs = self.ttl.as_secs_f64();

        let expired: Vec<String> = inner
            .objects
            .iter()
            .filter(|(_, rec)| {
                rec.origin.is_local() && now.seconds_since(rec.last_seen) > ttl_secs
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in &expired {
            inner.objects.remove(name);
            if let Err(e) = inner.log.append_delete(name) {
                error!(name, error = %e, "durable delete failed during eviction");
            }
            warn!(name, "ttl expired, record evicted");
        }
        expired
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

fn to_row(name: &str, rec: &ObjectRecord) -> RowRecord {
    RowRecord {
        name: name.to_string(),
        address: rec.address.clone(),
        language: rec.language.clone(),
        version: rec.version.clone(),
        region: rec.region.clone(),
        last_seen: rec.last_seen.as_secs_f64(),
    }
}
