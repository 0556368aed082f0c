//! LMDB environment setup and shared JSON helpers.

use std::path::Path;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::LmdbError;

/// Number of named databases opened below.
const MAX_DBS: u32 = 16;

/// Separator for composite keys. Cannot appear in ids typed by users.
pub(crate) const SEP: char = '\x1f';

pub(crate) type JsonDb = Database<Str, Bytes>;

/// The LMDB environment and every database handle.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) submissions: JsonDb,
    pub(crate) vote_boxes: JsonDb,
    pub(crate) reviewers: JsonDb,
    pub(crate) activity: JsonDb,
    pub(crate) agreements: JsonDb,
    pub(crate) moderation_log: JsonDb,
    pub(crate) trust_followups: JsonDb,
    pub(crate) ledgers: JsonDb,
    pub(crate) holds: JsonDb,
    pub(crate) profiles: JsonDb,
    pub(crate) rep_events: JsonDb,
    pub(crate) vote_weights: JsonDb,
    pub(crate) stakes: JsonDb,
}

impl LmdbStore {
    /// Open or create an LMDB environment at the given directory.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per process for this path and
        // the memory map is never handed out beyond heed's own borrow checks.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let submissions = env.create_database(&mut wtxn, Some("submissions"))?;
        let vote_boxes = env.create_database(&mut wtxn, Some("vote_boxes"))?;
        let reviewers = env.create_database(&mut wtxn, Some("reviewers"))?;
        let activity = env.create_database(&mut wtxn, Some("activity"))?;
        let agreements = env.create_database(&mut wtxn, Some("agreements"))?;
        let moderation_log = env.create_database(&mut wtxn, Some("moderation_log"))?;
        let trust_followups = env.create_database(&mut wtxn, Some("trust_followups"))?;
        let ledgers = env.create_database(&mut wtxn, Some("ledgers"))?;
        let holds = env.create_database(&mut wtxn, Some("holds"))?;
        let profiles = env.create_database(&mut wtxn, Some("profiles"))?;
        let rep_events = env.create_database(&mut wtxn, Some("rep_events"))?;
        let vote_weights = env.create_database(&mut wtxn, Some("vote_weights"))?;
        let stakes = env.create_database(&mut wtxn, Some("stakes"))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env,
            submissions,
            vote_boxes,
            reviewers,
            activity,
            agreements,
            moderation_log,
            trust_followups,
            ledgers,
            holds,
            profiles,
            rep_events,
            vote_weights,
            stakes,
        })
    }

    /// Read and decode one value in its own read transaction.
    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        db: JsonDb,
        key: &str,
    ) -> Result<Option<T>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        read_json(&rtxn, db, key)
    }

    /// Encode and write one value in its own write transaction.
    pub(crate) fn put_json<T: Serialize>(
        &self,
        db: JsonDb,
        key: &str,
        value: &T,
    ) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        write_json(&mut wtxn, db, key, value)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Decode every value whose key starts with `prefix`.
    pub(crate) fn scan_prefix<T: DeserializeOwned>(
        &self,
        db: JsonDb,
        prefix: &str,
    ) -> Result<Vec<T>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for item in db.prefix_iter(&rtxn, prefix)? {
            let (_key, bytes) = item?;
            out.push(serde_json::from_slice(bytes)?);
        }
        Ok(out)
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(
    txn: &RoTxn<'_>,
    db: JsonDb,
    key: &str,
) -> Result<Option<T>, LmdbError> {
    match db.get(txn, key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn write_json<T: Serialize>(
    txn: &mut RwTxn<'_>,
    db: JsonDb,
    key: &str,
    value: &T,
) -> Result<(), LmdbError> {
    let bytes = serde_json::to_vec(value)?;
    db.put(txn, key, &bytes)?;
    Ok(())
}

/// Join key parts with the composite-key separator.
pub(crate) fn key(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(SEP);
        }
        out.push_str(part);
    }
    out
}

/// Prefix that matches every key starting with `parts` followed by a separator.
pub(crate) fn prefix(parts: &[&str]) -> String {
    let mut out = key(parts);
    out.push(SEP);
    out
}

#[cfg(test)]
pub(crate) fn temp_store() -> (tempfile::TempDir, LmdbStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = LmdbStore::open(dir.path(), 16 * 1024 * 1024).expect("open store");
    (dir, store)
}
