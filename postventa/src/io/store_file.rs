//! Store load/save helpers with schema + invariant validation.
//!
//! Writers that started from a loaded copy use [`write_store_checked`]: it
//! takes `<store>.lock` and refuses to replace a file whose bytes no longer
//! match the [`StoreStamp`] taken at load, so the CLI and a running server
//! never silently drop each other's changes.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::validator_for;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::invariants::validate_invariants;
use crate::model::Store;

/// Schema compiled into the binary; `init` also writes it to disk.
pub const STORE_SCHEMA: &str = include_str!("../../schemas/store/v1.schema.json");

const LOCK_WAIT: Duration = Duration::from_secs(2);
const LOCK_POLL: Duration = Duration::from_millis(20);
/// A lock older than this is left over from a crashed writer.
const LOCK_STALE: Duration = Duration::from_secs(10);

/// SHA-256 of the store file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStamp(String);

impl StoreStamp {
    pub fn of(contents: &str) -> Self {
        Self(hex::encode(Sha256::digest(contents.as_bytes())))
    }
}

/// The file changed on disk after it was loaded.
#[derive(Debug, thiserror::Error)]
#[error("store {} was changed by another process since it was read", .path.display())]
pub struct StoreChanged {
    pub path: PathBuf,
}

/// Result of [`load_store_for_repair`].
#[derive(Debug)]
pub struct RepairLoad {
    pub store: Store,
    pub errors: Vec<String>,
    pub stamp: StoreStamp,
}

/// Load and validate the store from disk (schema + invariants).
pub fn load_store(store_path: &Path) -> Result<Store> {
    load_store_stamped(store_path).map(|(store, _)| store)
}

/// Like [`load_store`], also returning the stamp to hand to [`write_store_checked`].
pub fn load_store_stamped(store_path: &Path) -> Result<(Store, StoreStamp)> {
    let contents = read_contents(store_path)?;
    let store =
        parse_store(&contents).with_context(|| format!("load store {}", store_path.display()))?;
    Ok((store, StoreStamp::of(&contents)))
}

/// Stamp of the file as it is on disk now.
pub fn read_stamp(store_path: &Path) -> Result<StoreStamp> {
    read_contents(store_path).map(|contents| StoreStamp::of(&contents))
}

/// Parse and validate a store document.
pub fn parse_store(contents: &str) -> Result<Store> {
    let value: Value = serde_json::from_str(contents).context("parse store json")?;
    validate_schema(&value)?;
    let store: Store = serde_json::from_value(value).context("deserialize store")?;
    validate_store_invariants(&store)?;
    Ok(store)
}

/// Load a store that passes the schema but may break invariants.
///
/// The invariant errors come back next to the store so repair commands can
/// fix the data and re-check before writing.
pub fn load_store_for_repair(store_path: &Path) -> Result<RepairLoad> {
    let contents = read_contents(store_path)?;
    let value: Value = serde_json::from_str(&contents).context("parse store json")?;
    validate_schema(&value)?;
    let store: Store = serde_json::from_value(value).context("deserialize store")?;
    let errors = validate_invariants(&store);
    Ok(RepairLoad {
        store,
        errors,
        stamp: StoreStamp::of(&contents),
    })
}

/// Write the store atomically with pretty formatting and a trailing newline.
pub fn write_store(store_path: &Path, store: &Store) -> Result<StoreStamp> {
    let buf = render_store(store)?;
    super::write_atomic(store_path, &buf)?;
    debug!(path = %store_path.display(), claims = store.claims.len(), "wrote store");
    Ok(StoreStamp::of(&buf))
}

/// Write the store only if the file still matches `expected`.
///
/// Fails with [`StoreChanged`] otherwise; the caller reloads and retries.
pub fn write_store_checked(
    store_path: &Path,
    store: &Store,
    expected: &StoreStamp,
) -> Result<StoreStamp> {
    let _lock = WriteLock::acquire(store_path)?;
    if read_stamp(store_path)? != *expected {
        return Err(StoreChanged {
            path: store_path.to_path_buf(),
        }
        .into());
    }
    write_store(store_path, store)
}

fn read_contents(store_path: &Path) -> Result<String> {
    fs::read_to_string(store_path).with_context(|| format!("read store {}", store_path.display()))
}

fn render_store(store: &Store) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(store).context("serialize store")?;
    buf.push('\n');
    Ok(buf)
}

/// `<store>.lock`, created exclusively and removed on drop.
struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    fn acquire(store_path: &Path) -> Result<Self> {
        let mut name = store_path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        let path = store_path.with_file_name(name);
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Owner pid, for whoever finds a stale lock.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        warn!(path = %path.display(), "removing stale store lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        bail!("store is locked by another process ({})", path.display());
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("create lock {}", path.display()));
                }
            }
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(lock_path: &Path) -> bool {
    fs::metadata(lock_path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE)
}

fn validate_schema(store: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(STORE_SCHEMA).context("parse embedded store schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(store) {
        let messages = compiled
            .iter_errors(store)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "store schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_store_invariants(store: &Store) -> Result<()> {
    let errors = validate_invariants(store);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("store invariants failed: {}", errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ClaimId;
    use crate::test_support::sample_store;

    #[test]
    fn write_then_load_keeps_the_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state").join("store.json");
        let store = sample_store();
        write_store(&path, &store).expect("write");

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.ends_with("}\n"));
        assert!(!temp.path().join("state").join("store.json.tmp").exists());

        let loaded = load_store(&path).expect("load");
        assert_eq!(loaded, store);
    }

    #[test]
    fn schema_rejects_unknown_claim_status() {
        let mut value = serde_json::to_value(sample_store()).expect("to value");
        value["claims"][0]["status"] = Value::String("perdido".to_string());
        let err = parse_store(&value.to_string()).expect_err("bad status");
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn invariant_violations_fail_the_load() {
        let mut store = sample_store();
        store.claims[1].id = ClaimId(1);
        let text = serde_json::to_string(&store).expect("serialize");
        let err = parse_store(&text).expect_err("duplicate id");
        assert!(err.to_string().contains("store invariants failed"));
    }

    #[test]
    fn repair_load_returns_invariant_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");
        let mut store = sample_store();
        let mut copy = store.availability[0].clone();
        copy.id = crate::core::types::AvailabilityId(40);
        store.availability.push(copy);
        fs::write(&path, serde_json::to_string(&store).expect("serialize")).expect("write");

        assert!(load_store(&path).is_err());
        let repair = load_store_for_repair(&path).expect("repair load");
        assert_eq!(repair.store, store);
        assert_eq!(
            repair.errors,
            vec!["availability 40: duplicates availability 1".to_string()]
        );
        assert_eq!(repair.stamp, read_stamp(&path).expect("stamp"));
    }

    #[test]
    fn checked_write_refuses_a_file_changed_since_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");
        write_store(&path, &sample_store()).expect("seed");
        let (mut ours, stamp) = load_store_stamped(&path).expect("load");

        let mut theirs = sample_store();
        theirs.technicians[1].active = false;
        write_store(&path, &theirs).expect("other writer");

        ours.materials[0].stock = Some(1);
        let err = write_store_checked(&path, &ours, &stamp).expect_err("stale stamp");
        assert!(err.downcast_ref::<StoreChanged>().is_some());
        assert_eq!(load_store(&path).expect("load"), theirs);
        assert!(!temp.path().join("store.json.lock").exists());

        let (_, fresh) = load_store_stamped(&path).expect("reload");
        let written = write_store_checked(&path, &ours, &fresh).expect("fresh stamp");
        assert_eq!(written, read_stamp(&path).expect("stamp"));
    }

    #[test]
    fn stale_lock_is_taken_over_and_live_lock_blocks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("store.json");
        let stamp = write_store(&path, &sample_store()).expect("seed");
        let lock_path = temp.path().join("store.json.lock");

        let held = WriteLock::acquire(&path).expect("lock");
        let err = write_store_checked(&path, &sample_store(), &stamp).expect_err("locked");
        assert!(err.to_string().contains("locked by another process"));
        drop(held);
        assert!(!lock_path.exists());

        fs::write(&lock_path, "4242\n").expect("leftover lock");
        let old = std::time::SystemTime::now() - Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&lock_path)
            .and_then(|file| file.set_modified(old))
            .expect("age lock");
        write_store_checked(&path, &sample_store(), &stamp).expect("stale lock ignored");
        assert!(!lock_path.exists());
    }

    #[test]
    fn empty_document_is_a_valid_store() {
        let store = parse_store("{}").expect("parse");
        assert!(store.claims.is_empty());
    }
}
