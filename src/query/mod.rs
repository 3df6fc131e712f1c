//! Query helpers: flatten engine results and read canonical records

mod collect;
mod reader;
mod types;

pub use collect::{collect, Collected};
pub use reader::{EntityReader, Scope};
pub use types::{BindingSet, InstaqlForm, QueryNode, Symbol, SymbolBindings, Where};
