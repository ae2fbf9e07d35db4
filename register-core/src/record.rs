use std::sync::OnceLock;

use crate::digest::Digest;
use crate::item::{Item, Value};

/// A record wraps an ingested item and caches its canonical payload and digest.
///
/// Both are computed on first access and reused afterwards; indexes share
/// records behind `Arc` so a record appearing in several buckets is
/// serialized at most once.
pub struct Record {
    item: Item,
    payload: OnceLock<String>,
    digest: OnceLock<Digest>,
}

impl Record {
    pub fn new(item: Item) -> Self {
        Record {
            item,
            payload: OnceLock::new(),
            digest: OnceLock::new(),
        }
    }

    /// Canonical serialization of the item.
    pub fn payload(&self) -> &str {
        self.payload.get_or_init(|| self.item.canonical())
    }

    /// Content digest, computing it if necessary.
    pub fn digest(&self) -> Digest {
        *self.digest.get_or_init(|| Digest::of(self.payload().as_bytes()))
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Shorthand for `item().get(field)`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.item.get(field)
    }

    pub fn into_item(self) -> Item {
        self.item
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("item", &self.item)
            .field("digest", &self.digest.get())
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.item == other.item
    }
}

impl Eq for Record {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lazy_digest() {
        let record = Record::new(Item::new().with("name", "x"));
        let d1 = record.digest();
        let d2 = record.digest();
        assert_eq!(d1, d2);
        assert_eq!(d1, record.item().digest());
    }

    #[test]
    fn record_payload_is_canonical() {
        let record = Record::new(Item::new().with("b", "2").with("a", "1"));
        assert_eq!(record.payload(), r#"{"a":"1","b":"2"}"#);
    }

    #[test]
    fn record_field_access() {
        let record = Record::new(Item::new().with("name", "hello"));
        assert_eq!(record.get("name").and_then(Value::as_str), Some("hello"));
        assert_eq!(record.into_item().len(), 1);
    }
}
