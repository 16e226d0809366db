//! Static registry of stock processor classes.
//!
//! Class ids distinguish processor types inside program keys, so they must
//! be unique process-wide. The stock table is built once at first use;
//! embedder-defined processors pick ids above [`FIRST_USER_CLASS_ID`].

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

pub const QUAD_PROCESSOR_CLASS_ID: u32 = 0x1;
pub const TEXTURE_COLOR_CLASS_ID: u32 = 0x2;
pub const COVERAGE_SCALE_CLASS_ID: u32 = 0x3;
pub const SRC_OVER_TRANSFER_CLASS_ID: u32 = 0x4;
pub const DST_READ_BLEND_CLASS_ID: u32 = 0x5;

/// First id available to embedder-defined processors.
pub const FIRST_USER_CLASS_ID: u32 = 0x100;

static STOCK_CLASSES: Lazy<BTreeMap<u32, &'static str>> = Lazy::new(|| {
    let mut classes = BTreeMap::new();
    classes.insert(QUAD_PROCESSOR_CLASS_ID, "QuadProcessor");
    classes.insert(TEXTURE_COLOR_CLASS_ID, "TextureColorProcessor");
    classes.insert(COVERAGE_SCALE_CLASS_ID, "CoverageScaleProcessor");
    classes.insert(SRC_OVER_TRANSFER_CLASS_ID, "SrcOverTransfer");
    classes.insert(DST_READ_BLEND_CLASS_ID, "DstReadBlendTransfer");
    classes
});

/// Human-readable name of a class id, for logs and diagnostics.
pub fn class_name(id: u32) -> &'static str {
    STOCK_CLASSES.get(&id).copied().unwrap_or("UserProcessor")
}

/// The registered stock classes, in id order.
pub fn stock_classes() -> impl Iterator<Item = (u32, &'static str)> {
    STOCK_CLASSES.iter().map(|(id, name)| (*id, *name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_ids_stay_below_user_range() {
        for (id, _) in stock_classes() {
            assert!(id < FIRST_USER_CLASS_ID);
        }
    }

    #[test]
    fn unknown_ids_resolve_to_user_processor() {
        assert_eq!(class_name(FIRST_USER_CLASS_ID + 7), "UserProcessor");
        assert_eq!(class_name(QUAD_PROCESSOR_CLASS_ID), "QuadProcessor");
    }
}
