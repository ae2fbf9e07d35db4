use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use std::sync::RwLock;

use indexmap::IndexMap;
use indexmap::map::Entry as MapEntry;

use crate::digest::Digest;
use crate::entry::{Entry, Region};
use crate::exchange::ExchangeLog;

/// The command surface of a durable register store.
///
/// Stores see only register names, regions, keys and canonical item payloads;
/// they know nothing about schemas or indexes. Streaming commands
/// (`ensure_*`, `delete_untouched`) are applied in call order; `init` and
/// `dump` block until the store has finished.
///
/// All methods take `&self` so that several registers can share one store
/// connection; implementations serialize writes internally.
pub trait Store {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates the register if it does not exist yet.
    fn init(&self, register: &str) -> Result<(), Self::Error>;

    /// Append-if-changed: identical payloads for a current key are a no-op.
    fn ensure_entry(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), Self::Error>;

    /// Batch form of `ensure_entry` used for merged multi-item entries.
    fn ensure_items(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), Self::Error>;

    /// Retires every key in the region not ensured since the connection opened.
    fn delete_untouched(&self, register: &str, region: Region) -> Result<(), Self::Error>;

    /// Writes the register's current state in exchange format to `output`.
    fn dump(&self, register: &str, output: &Path) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("register not initialised: {0}")]
    UnknownRegister(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
struct Slot {
    items: Vec<String>,
    entry: Entry,
    versions: usize,
    touched: bool,
    retired: bool,
}

#[derive(Debug, Default)]
struct StoredRegister {
    regions: BTreeMap<Region, IndexMap<String, Slot>>,
}

/// An in-memory store with the full store semantics.
///
/// Useful for testing and as a reference implementation. `reconnect` starts
/// a new connection lifetime, which is what `delete_untouched` measures
/// against.
#[derive(Debug, Default)]
pub struct MemoryStore {
    registers: RwLock<HashMap<String, StoredRegister>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets which keys were touched, as if the channel had been reopened.
    pub fn reconnect(&self) {
        let mut registers = self.registers.write().unwrap();
        for slot in registers
            .values_mut()
            .flat_map(|r| r.regions.values_mut())
            .flat_map(|keys| keys.values_mut())
        {
            slot.touched = false;
        }
    }

    /// Keys of a region that are still current, in first-write order.
    pub fn current_keys(&self, register: &str, region: Region) -> Vec<String> {
        self.keys_where(register, region, |slot| !slot.retired)
    }

    /// Keys of a region that have been retired.
    pub fn retired_keys(&self, register: &str, region: Region) -> Vec<String> {
        self.keys_where(register, region, |slot| slot.retired)
    }

    /// Number of versions written for a key (0 if never written).
    pub fn versions(&self, register: &str, region: Region, key: &str) -> usize {
        self.with_slot(register, region, key, |slot| slot.versions)
            .unwrap_or(0)
    }

    /// Current payloads of a key, or None if absent or retired.
    pub fn items(&self, register: &str, region: Region, key: &str) -> Option<Vec<String>> {
        self.with_slot(register, region, key, |slot| {
            (!slot.retired).then(|| slot.items.clone())
        })
        .flatten()
    }

    /// The current (non-retired) state of a register as an exchange log.
    pub fn exchange(&self, register: &str) -> Result<ExchangeLog, MemoryStoreError> {
        let registers = self.registers.read().unwrap();
        let stored = registers
            .get(register)
            .ok_or_else(|| MemoryStoreError::UnknownRegister(register.to_string()))?;

        let mut log = ExchangeLog::new();
        for slot in stored
            .regions
            .values()
            .flat_map(|keys| keys.values())
            .filter(|slot| !slot.retired)
        {
            log.append(slot.entry.clone(), slot.items.iter().map(String::as_str));
        }
        Ok(log)
    }

    fn keys_where(
        &self,
        register: &str,
        region: Region,
        pred: impl Fn(&Slot) -> bool,
    ) -> Vec<String> {
        let registers = self.registers.read().unwrap();
        registers
            .get(register)
            .and_then(|r| r.regions.get(&region))
            .map(|keys| {
                keys.iter()
                    .filter(|(_, slot)| pred(slot))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn with_slot<T>(
        &self,
        register: &str,
        region: Region,
        key: &str,
        f: impl FnOnce(&Slot) -> T,
    ) -> Option<T> {
        let registers = self.registers.read().unwrap();
        registers
            .get(register)
            .and_then(|r| r.regions.get(&region))
            .and_then(|keys| keys.get(key))
            .map(f)
    }

    fn ensure(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), MemoryStoreError> {
        let mut registers = self.registers.write().unwrap();
        let stored = registers
            .get_mut(register)
            .ok_or_else(|| MemoryStoreError::UnknownRegister(register.to_string()))?;

        let digests = items.iter().map(|i| Digest::of(i.as_bytes())).collect();
        let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();

        match stored.regions.entry(region).or_default().entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.touched = true;
                if !slot.retired && slot.items == items {
                    return Ok(());
                }
                slot.items = items;
                slot.entry = Entry::now(region, key, digests);
                slot.versions += 1;
                slot.retired = false;
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Slot {
                    items,
                    entry: Entry::now(region, key, digests),
                    versions: 1,
                    touched: true,
                    retired: false,
                });
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    type Error = MemoryStoreError;

    fn init(&self, register: &str) -> Result<(), Self::Error> {
        self.registers
            .write()
            .unwrap()
            .entry(register.to_string())
            .or_default();
        Ok(())
    }

    fn ensure_entry(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), Self::Error> {
        self.ensure(register, region, key, items)
    }

    fn ensure_items(
        &self,
        register: &str,
        region: Region,
        key: &str,
        items: &[&str],
    ) -> Result<(), Self::Error> {
        self.ensure(register, region, key, items)
    }

    fn delete_untouched(&self, register: &str, region: Region) -> Result<(), Self::Error> {
        let mut registers = self.registers.write().unwrap();
        let stored = registers
            .get_mut(register)
            .ok_or_else(|| MemoryStoreError::UnknownRegister(register.to_string()))?;

        if let Some(keys) = stored.regions.get_mut(&region) {
            for slot in keys.values_mut().filter(|slot| !slot.touched) {
                slot.retired = true;
            }
        }
        Ok(())
    }

    fn dump(&self, register: &str, output: &Path) -> Result<(), Self::Error> {
        self.exchange(register)?.write_file(output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.init("body-type").unwrap();
        store
    }

    #[test]
    fn ensure_unknown_register() {
        let store = MemoryStore::new();
        let err = store.ensure_entry("nope", Region::User, "k", &["{}"]).unwrap_err();
        assert!(matches!(err, MemoryStoreError::UnknownRegister(_)));
    }

    #[test]
    fn ensure_same_content_is_noop() {
        let store = store();
        store.ensure_entry("body-type", Region::User, "NB", &[r#"{"body-type":"NB"}"#]).unwrap();
        store.ensure_entry("body-type", Region::User, "NB", &[r#"{"body-type":"NB"}"#]).unwrap();
        assert_eq!(store.versions("body-type", Region::User, "NB"), 1);
    }

    #[test]
    fn ensure_changed_content_adds_version() {
        let store = store();
        store.ensure_entry("body-type", Region::User, "NB", &[r#"{"a":"1"}"#]).unwrap();
        store.ensure_entry("body-type", Region::User, "NB", &[r#"{"a":"2"}"#]).unwrap();
        assert_eq!(store.versions("body-type", Region::User, "NB"), 2);
        assert_eq!(
            store.items("body-type", Region::User, "NB"),
            Some(vec![r#"{"a":"2"}"#.to_string()])
        );
    }

    #[test]
    fn delete_untouched_retires_only_untouched() {
        let store = store();
        for key in ["CAB", "NB", "UI"] {
            store.ensure_entry("body-type", Region::User, key, &["{}"]).unwrap();
        }

        store.reconnect();
        store.ensure_entry("body-type", Region::User, "NB", &["{}"]).unwrap();
        store.delete_untouched("body-type", Region::User).unwrap();

        assert_eq!(store.current_keys("body-type", Region::User), vec!["NB"]);
        assert_eq!(store.retired_keys("body-type", Region::User), vec!["CAB", "UI"]);
        assert_eq!(store.items("body-type", Region::User, "CAB"), None);
    }

    #[test]
    fn delete_untouched_is_per_region() {
        let store = store();
        store.ensure_entry("body-type", Region::System, "name", &["{}"]).unwrap();
        store.reconnect();
        store.delete_untouched("body-type", Region::User).unwrap();
        assert_eq!(store.current_keys("body-type", Region::System), vec!["name"]);
    }

    #[test]
    fn ensure_revives_retired_key() {
        let store = store();
        store.ensure_entry("body-type", Region::User, "NB", &["{}"]).unwrap();
        store.reconnect();
        store.delete_untouched("body-type", Region::User).unwrap();
        store.ensure_entry("body-type", Region::User, "NB", &["{}"]).unwrap();

        assert_eq!(store.current_keys("body-type", Region::User), vec!["NB"]);
        assert_eq!(store.versions("body-type", Region::User, "NB"), 2);
    }

    #[test]
    fn exchange_lists_current_state() {
        let store = store();
        store
            .ensure_entry("body-type", Region::System, "name", &[r#"{"name":"body-type"}"#])
            .unwrap();
        store.ensure_entry("body-type", Region::User, "NB", &["{}"]).unwrap();
        store
            .ensure_items("body-type", Region::User, "UI", &[r#"{"a":"1"}"#, r#"{"a":"2"}"#])
            .unwrap();

        let log = store.exchange("body-type").unwrap();
        let keys: Vec<_> = log.entries().map(|e| (e.region, e.key.as_str())).collect();
        assert_eq!(
            keys,
            [(Region::System, "name"), (Region::User, "NB"), (Region::User, "UI")]
        );
        assert_eq!(log.entries().last().unwrap().digests.len(), 2);
    }

    #[test]
    fn dump_writes_exchange_file() {
        let store = store();
        store.ensure_entry("body-type", Region::User, "NB", &["{}"]).unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("body-type.rsf");
        store.dump("body-type", &path).unwrap();

        let file = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
        let log = ExchangeLog::parse(file).unwrap();
        assert_eq!(log.entries().count(), 1);
    }
}
