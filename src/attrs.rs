//! Label → attribute id resolution

use crate::error::{BridgeError, BridgeResult};
use crate::model::{AttrId, Attrs};

/// Resolve a field label on `etype` to its attribute id.
///
/// Forward names win over reverse names. A label with no attribute is a
/// broken caller contract and fails with `AttributeUnresolved`.
pub fn resolve_attr_id(attrs: &Attrs, etype: &str, label: &str) -> BridgeResult<AttrId> {
    attrs
        .seek_by_fwd_ident(etype, label)
        .or_else(|| attrs.seek_by_rev_ident(etype, label))
        .map(|attr| attr.id)
        .ok_or_else(|| BridgeError::AttributeUnresolved {
            etype: etype.to_string(),
            label: label.to_string(),
        })
}
