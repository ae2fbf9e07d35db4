//! Register is an append-only, content-addressed dataset engine.
//!
//! Core concepts:
//! - **Schema**: the immutable, ordered field declarations of a register
//! - **Item**: a record conforming to a schema; its canonical JSON is hashed into a **Digest**
//! - **Entry**: one log record `{region, key, timestamp, digests}`
//! - **Register**: owns a schema, an append log and an **IndexManager**; reconciles
//!   against a **Store** on finish by retiring everything not written this pass
//! - **MultiValueRegister**: merges all items seen for a key into one entry at finish
//! - **ExchangeLog**: the portable, replayable line format of a register's log
//!
//! # Example
//!
//! ```
//! use register_core::{Datatype, Field, Item, MemoryStore, Region, Register, Schema};
//!
//! let store = MemoryStore::new();
//! let schema = Schema::new(
//!     "body-type",
//!     "european-commission",
//!     "Types of body.",
//!     [
//!         Field::new("body-type", Datatype::String, "Abbreviation."),
//!         Field::new("name", Datatype::String, "Full name."),
//!     ],
//! )
//! .unwrap();
//!
//! let mut register = Register::init(&store, schema).unwrap();
//! register
//!     .append_entry(
//!         Region::User,
//!         "NB",
//!         Item::new().with("body-type", "NB").with("name", "Notified Body"),
//!     )
//!     .unwrap();
//! assert_eq!(register.find("body-type", "NB").len(), 1);
//!
//! let log = register.close().unwrap();
//! println!("{}", log);
//! ```

mod digest;
mod entry;
mod exchange;
mod index;
mod item;
mod multi;
mod record;
mod register;
mod schema;
mod store;

pub use digest::{Digest, ParseDigestError};
pub use entry::{Entry, ParseRegionError, Region};
pub use exchange::{ExchangeError, ExchangeLog, Line};
pub use index::{Collision, IndexManager};
pub use item::{Curie, Item, ParseCurieError, Value};
pub use multi::MultiValueRegister;
pub use record::Record;
pub use register::{Register, RegisterError, Unresolved};
pub use schema::{Cardinality, Datatype, Field, Schema, SchemaError};
pub use store::{MemoryStore, MemoryStoreError, Store};
