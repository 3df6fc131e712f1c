//! Core data structures shared by every bridge component

mod attr;
pub mod etype;
mod ids;
mod record;
mod triple;
mod tx;

pub use attr::{Attribute, Attrs, Ident};
pub use etype::{canonical_key, system_attributes, SystemEtype};
pub use ids::{AppId, AttrId, EntityId};
pub use record::{AppMigrationState, CanonicalRecord, FieldValue, Representation};
pub use triple::Triple;
pub use tx::{Lookup, TxReport, TxStep};
