use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::entry::{Entry, Region};
use crate::exchange::ExchangeLog;
use crate::index::{Collision, IndexManager};
use crate::item::{Curie, Item, Value};
use crate::record::Record;
use crate::schema::{Schema, SchemaError};
use crate::store::Store;

/// Errors raised by register operations.
///
/// Everything except `Store` is a caller bug and should not be retried.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("key cannot be empty")]
    EmptyKey,
    #[error("key {0:?} contains a tab or newline")]
    InvalidKey(String),
    #[error("incorrect key for item: key is {key:?} but {field} is {actual:?}")]
    KeyMismatch {
        key: String,
        field: String,
        actual: Option<String>,
    },
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("register {0} is already finished")]
    Finished(String),
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> RegisterError {
    RegisterError::Store(Box::new(err))
}

/// A lookup against already-ingested records found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{register}: no record with {attribute} = {value:?}")]
pub struct Unresolved {
    pub register: String,
    pub attribute: String,
    pub value: String,
}

/// How a write reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Entry,
    Items,
}

/// A named, schema-bound, append-only dataset.
///
/// A register is created with [`Register::init`], filled with
/// [`append_entry`](Register::append_entry), and reconciled against its store
/// with [`finish`](Register::finish), which retires every key that was not
/// written during this pass. It keeps its own exchange log of everything it
/// appended, independent of the store.
///
/// The primary-key index (named after the register) is always present; the
/// indexes double as a cache for lookups made while ingesting other records.
pub struct Register<'s, S: Store> {
    store: &'s S,
    schema: Schema,
    indexes: IndexManager,
    log: ExchangeLog,
    finished: bool,
}

impl<'s, S: Store> Register<'s, S> {
    /// Creates the register in the store and writes its schema to the system region.
    pub fn init(store: &'s S, schema: Schema) -> Result<Self, RegisterError> {
        info!(register = schema.name(), "initialising register");
        store.init(schema.name()).map_err(store_error)?;

        let mut indexes = IndexManager::new();
        indexes.add_index(schema.name());

        let mut register = Register {
            store,
            schema,
            indexes,
            log: ExchangeLog::new(),
            finished: false,
        };
        for (key, item) in register.schema.system_items() {
            register.append_entry(Region::System, &key, item)?;
        }
        Ok(register)
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Records the custodian of the register as a system entry.
    pub fn set_custodian(&mut self, custodian: &str) -> Result<(), RegisterError> {
        self.append_entry(Region::System, "custodian", Item::new().with("custodian", custodian))?;
        Ok(())
    }

    /// Appends an item under `key`.
    ///
    /// For the user region the item must conform to the schema and its
    /// primary key field must equal `key`. User records become visible to
    /// [`find`](Register::find) and [`items`](Register::items) immediately.
    pub fn append_entry(
        &mut self,
        region: Region,
        key: &str,
        item: Item,
    ) -> Result<Arc<Record>, RegisterError> {
        self.check_writable(key)?;
        if region == Region::User {
            self.check_user_item(key, &item)?;
        }

        let record = Arc::new(Record::new(item));
        self.write(region, key, std::slice::from_ref(&record), WriteKind::Entry)?;
        if region == Region::User {
            self.indexes.insert(Arc::clone(&record));
        }
        Ok(record)
    }

    /// Validates and indexes a user item without writing it.
    pub(crate) fn stage(&mut self, key: &str, item: Item) -> Result<Arc<Record>, RegisterError> {
        self.check_writable(key)?;
        self.check_user_item(key, &item)?;

        let record = Arc::new(Record::new(item));
        self.indexes.insert(Arc::clone(&record));
        debug!(register = self.name(), key, "staged item");
        Ok(record)
    }

    /// Sends records for one key to the store and records them in the log.
    pub(crate) fn write(
        &mut self,
        region: Region,
        key: &str,
        records: &[Arc<Record>],
        how: WriteKind,
    ) -> Result<(), RegisterError> {
        let payloads: Vec<&str> = records.iter().map(|r| r.payload()).collect();
        let sent = match how {
            WriteKind::Entry => self.store.ensure_entry(self.schema.name(), region, key, &payloads),
            WriteKind::Items => self.store.ensure_items(self.schema.name(), region, key, &payloads),
        };
        sent.map_err(store_error)?;

        let entry = Entry::now(region, key, records.iter().map(|r| r.digest()).collect());
        self.log.append(entry, payloads);
        debug!(
            register = self.schema.name(),
            %region,
            key,
            items = records.len(),
            "appended entry"
        );
        Ok(())
    }

    fn check_writable(&self, key: &str) -> Result<(), RegisterError> {
        if self.finished {
            return Err(RegisterError::Finished(self.name().to_string()));
        }
        if key.is_empty() {
            return Err(RegisterError::EmptyKey);
        }
        if key.contains(['\t', '\n', '\r']) {
            return Err(RegisterError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn check_user_item(&self, key: &str, item: &Item) -> Result<(), RegisterError> {
        self.schema.validate(item)?;
        let actual = item.get(self.name()).map(Value::to_string);
        if actual.as_deref() != Some(key) {
            return Err(RegisterError::KeyMismatch {
                key: key.to_string(),
                field: self.name().to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Starts indexing another attribute. Already-ingested records are back-filled.
    pub fn add_index(&mut self, attribute: &str) -> bool {
        self.indexes.add_index(attribute)
    }

    /// Records indexed under `value` for `attribute`, in ingestion order.
    pub fn find(&self, attribute: &str, value: impl Into<Value>) -> &[Arc<Record>] {
        self.indexes.find(attribute, &value.into())
    }

    /// Every record in the primary-key index.
    pub fn items(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.indexes.records(self.schema.name())
    }

    /// First record matching a predicate, scanning [`items`](Register::items).
    pub fn find_where(&self, mut pred: impl FnMut(&Item) -> bool) -> Option<&Arc<Record>> {
        self.items().find(|record| pred(record.item()))
    }

    /// First record indexed under `value`, or an [`Unresolved`] error.
    pub fn resolve(
        &self,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<&Arc<Record>, Unresolved> {
        let value = value.into();
        self.indexes
            .find(attribute, &value)
            .first()
            .ok_or_else(|| self.unresolved(attribute, &value))
    }

    fn unresolved(&self, attribute: &str, value: &Value) -> Unresolved {
        Unresolved {
            register: self.name().to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    /// A `<register>:<key>` reference to one of this register's records.
    pub fn curie(&self, record: &Record) -> Option<Curie> {
        record
            .get(self.name())
            .map(|key| Curie::new(self.name(), key.to_string()))
    }

    /// Resolves `value` and returns a reference to the matching record.
    pub fn reference(&self, attribute: &str, value: impl Into<Value>) -> Result<Curie, Unresolved> {
        let value = value.into();
        self.resolve(attribute, value.clone())
            .ok()
            .and_then(|record| self.curie(record))
            .ok_or_else(|| self.unresolved(attribute, &value))
    }

    /// Like [`reference`](Register::reference), but logs a warning and
    /// returns None when nothing matches.
    pub fn try_reference(&self, attribute: &str, value: impl Into<Value>) -> Option<Curie> {
        match self.reference(attribute, value) {
            Ok(curie) => Some(curie),
            Err(unresolved) => {
                warn!(
                    register = %unresolved.register,
                    attribute = %unresolved.attribute,
                    value = %unresolved.value,
                    "reference not found"
                );
                None
            }
        }
    }

    /// Primary keys held by more than one record.
    pub fn collisions(&self) -> Vec<Collision> {
        self.indexes.collisions(self.schema.name())
    }

    /// Retires everything this pass did not write, in both regions.
    ///
    /// Primary-key collisions are logged as warnings and returned; the
    /// colliding records stay in the index. Calling `finish` again issues the
    /// same retirement.
    pub fn finish(&mut self) -> Result<Vec<Collision>, RegisterError> {
        self.finish_with(true)
    }

    #[instrument(skip_all, fields(register = %self.schema.name()))]
    pub(crate) fn finish_with(
        &mut self,
        check_collisions: bool,
    ) -> Result<Vec<Collision>, RegisterError> {
        let collisions = if check_collisions { self.collisions() } else { Vec::new() };
        for collision in &collisions {
            warn!(
                key = %collision.key,
                count = collision.count,
                "multiple items share a primary key"
            );
        }

        for region in Region::ALL {
            self.store
                .delete_untouched(self.schema.name(), region)
                .map_err(store_error)?;
        }
        self.finished = true;
        info!(items = self.indexes.len(), "register finished");
        Ok(collisions)
    }

    /// The register's own exchange log.
    pub fn log(&self) -> &ExchangeLog {
        &self.log
    }

    /// Writes the register's own log in exchange format.
    pub fn write_exchange(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.log.write_file(path)
    }

    /// Asks the store to dump the register's current state.
    pub fn dump(&self, output: &Path) -> Result<(), RegisterError> {
        info!(register = self.name(), output = %output.display(), "dumping register");
        self.store.dump(self.name(), output).map_err(store_error)
    }

    /// Finishes the register if needed and returns its log.
    pub fn close(mut self) -> Result<ExchangeLog, RegisterError> {
        if !self.finished {
            self.finish()?;
        }
        Ok(self.log)
    }

    pub(crate) fn primary_buckets(&self) -> Vec<(String, Vec<Arc<Record>>)> {
        self.indexes
            .buckets(self.schema.name())
            .map(|(key, records)| (key.to_string(), records.to_vec()))
            .collect()
    }

    pub(crate) fn into_log(self) -> ExchangeLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Datatype, Field};
    use crate::store::MemoryStore;

    fn schema() -> Schema {
        Schema::new(
            "body-type",
            "european-commission",
            "Types of body defined by NANDO.",
            [
                Field::new(
                    "body-type",
                    Datatype::String,
                    "Unique abbreviation representing the type of the body.",
                ),
                Field::new("name", Datatype::String, "Full name of the body type."),
            ],
        )
        .unwrap()
    }

    fn body_type(code: &str, name: &str) -> Item {
        Item::new().with("body-type", code).with("name", name)
    }

    #[test]
    fn init_writes_system_entries() {
        let store = MemoryStore::new();
        let register = Register::init(&store, schema()).unwrap();

        assert_eq!(
            store.current_keys("body-type", Region::System),
            vec!["name", "register:body-type", "field:body-type", "field:name"]
        );
        assert_eq!(register.log().entries().count(), 4);
        assert_eq!(register.items().count(), 0);
    }

    #[test]
    fn append_rejects_empty_key() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        let err = register.append_entry(Region::User, "", body_type("", "x")).unwrap_err();
        assert!(matches!(err, RegisterError::EmptyKey));
    }

    #[test]
    fn append_rejects_mismatched_key() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();

        let err = register
            .append_entry(Region::User, "NB", body_type("CAB", "Conformity Assessment Body"))
            .unwrap_err();
        assert!(matches!(err, RegisterError::KeyMismatch { .. }));

        let err = register
            .append_entry(Region::User, "NB", Item::new().with("name", "Notified Body"))
            .unwrap_err();
        assert!(matches!(err, RegisterError::KeyMismatch { actual: None, .. }));
        assert!(store.current_keys("body-type", Region::User).is_empty());
    }

    #[test]
    fn append_rejects_unknown_field() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        let err = register
            .append_entry(
                Region::User,
                "NB",
                body_type("NB", "Notified Body").with("colour", "red"),
            )
            .unwrap_err();
        assert!(matches!(err, RegisterError::Schema(SchemaError::UnknownField(_))));
    }

    #[test]
    fn system_entries_skip_key_check() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        register.set_custodian("Simon Worthington").unwrap();
        assert!(store
            .current_keys("body-type", Region::System)
            .contains(&"custodian".to_string()));
        assert_eq!(register.items().count(), 0);
    }

    #[test]
    fn appended_records_are_findable() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        register.add_index("name");
        register
            .append_entry(Region::User, "NB", body_type("NB", "Notified Body"))
            .unwrap();

        assert_eq!(register.find("body-type", "NB").len(), 1);
        assert_eq!(register.find("name", "Notified Body").len(), 1);
        assert!(register.find("name", "Other").is_empty());
    }

    #[test]
    fn resolve_and_reference() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        register.add_index("name");
        register
            .append_entry(Region::User, "UI", body_type("UI", "User Inspectorate"))
            .unwrap();

        let curie = register.reference("name", "User Inspectorate").unwrap();
        assert_eq!(curie.to_string(), "body-type:UI");

        let err = register.resolve("name", "Unknown").unwrap_err();
        assert_eq!(err.register, "body-type");
        assert_eq!(err.value, "Unknown");
        assert_eq!(register.try_reference("name", "Unknown"), None);

        let found = register
            .find_where(|item| item.get("name") == Some(&Value::from("User Inspectorate")));
        assert!(found.is_some());
    }

    #[test]
    fn append_after_finish_fails() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        register.finish().unwrap();
        let err = register
            .append_entry(Region::User, "NB", body_type("NB", "Notified Body"))
            .unwrap_err();
        assert!(matches!(err, RegisterError::Finished(_)));
    }

    #[test]
    fn close_finishes() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        register
            .append_entry(Region::User, "NB", body_type("NB", "Notified Body"))
            .unwrap();
        let log = register.close().unwrap();
        assert_eq!(log.entries().count(), 5);
    }

    #[test]
    fn store_failure_propagates() {
        let store = MemoryStore::new();
        let mut register = Register::init(&store, schema()).unwrap();
        let other =
            Schema::new("other", "", "", [Field::new("other", Datatype::String, "")]).unwrap();
        // Bypass init so the store has never heard of the register.
        register.schema = other;
        let err = register
            .append_entry(Region::User, "x", Item::new().with("other", "x"))
            .unwrap_err();
        assert!(matches!(err, RegisterError::Store(_)));
    }
}
