use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use crate::entry::Region;
use crate::exchange::ExchangeLog;
use crate::item::Item;
use crate::record::Record;
use crate::register::{Register, RegisterError, WriteKind};
use crate::schema::Schema;
use crate::store::Store;

/// A register whose keys may legitimately accumulate several items per pass.
///
/// User-region appends are only indexed. On [`finish`](MultiValueRegister::finish)
/// every key in the primary index is written once, as a single batch carrying
/// all of its items in append order; retirement then proceeds as for a plain
/// [`Register`]. Read access (`find`, `items`, ...) goes through `Deref`.
pub struct MultiValueRegister<'s, S: Store> {
    inner: Register<'s, S>,
    flushed: bool,
}

impl<'s, S: Store> MultiValueRegister<'s, S> {
    pub fn init(store: &'s S, schema: Schema) -> Result<Self, RegisterError> {
        Ok(MultiValueRegister {
            inner: Register::init(store, schema)?,
            flushed: false,
        })
    }

    /// System items are written immediately; user items are held until finish.
    pub fn append_entry(
        &mut self,
        region: Region,
        key: &str,
        item: Item,
    ) -> Result<Arc<Record>, RegisterError> {
        match region {
            Region::System => self.inner.append_entry(region, key, item),
            Region::User => self.inner.stage(key, item),
        }
    }

    pub fn set_custodian(&mut self, custodian: &str) -> Result<(), RegisterError> {
        self.inner.set_custodian(custodian)
    }

    pub fn add_index(&mut self, attribute: &str) -> bool {
        self.inner.add_index(attribute)
    }

    /// Writes one merged entry per key, then retires untouched keys.
    pub fn finish(&mut self) -> Result<(), RegisterError> {
        if !self.flushed {
            let buckets = self.inner.primary_buckets();
            debug!(register = self.inner.name(), keys = buckets.len(), "writing merged entries");
            for (key, records) in buckets {
                self.inner.write(Region::User, &key, &records, WriteKind::Items)?;
            }
            self.flushed = true;
        }
        self.inner.finish_with(false)?;
        Ok(())
    }

    /// Finishes the register if needed and returns its log.
    pub fn close(mut self) -> Result<ExchangeLog, RegisterError> {
        if !self.inner.is_finished() {
            self.finish()?;
        }
        Ok(self.inner.into_log())
    }
}

impl<'s, S: Store> Deref for MultiValueRegister<'s, S> {
    type Target = Register<'s, S>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
