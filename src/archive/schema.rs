//! Archive table schemas.
//!
//! Each entity kind has a deterministic column order and a subset of
//! required columns. Decoding validates the header against the required
//! set and tolerates unknown extra columns, so archives written by newer
//! builds still import (schema evolution by tolerant parsing).

use crate::model::EntityKind;

/// Directory inside the archive holding photo files.
pub const PHOTOS_DIR: &str = "photos";

/// Manifest entry name. Its presence marks the snapshot variant; the
/// CSV-table variant carries no manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Database payload entry name in the snapshot variant.
pub const SNAPSHOT_DB_FILE: &str = "inventory.sqlite";

/// `format` value inside a snapshot manifest.
pub const SNAPSHOT_FORMAT: &str = "snapshot";

pub const HOME_COLUMNS: &[&str] = &[
    "id",
    "name",
    "address1",
    "address2",
    "city",
    "state",
    "postal_code",
    "country",
    "color",
    "is_primary",
];

pub const LOCATION_COLUMNS: &[&str] = &["id", "name", "description", "symbol", "home_id"];

pub const LABEL_COLUMNS: &[&str] = &["id", "name", "description", "color", "home_id"];

pub const ITEM_COLUMNS: &[&str] = &[
    "id",
    "title",
    "quantity",
    "quantity_string",
    "description",
    "make",
    "model",
    "serial_number",
    "price",
    "insured",
    "notes",
    "location_id",
    "label_id",
    "photo",
];

pub const POLICY_COLUMNS: &[&str] = &[
    "id",
    "provider",
    "policy_number",
    "deductible",
    "dwelling_coverage",
    "personal_property_coverage",
    "loss_of_use_coverage",
    "liability_coverage",
    "medical_coverage",
    "start_date",
    "end_date",
    "home_ids",
];

/// Full column order for a kind's table.
#[must_use]
pub const fn columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Home => HOME_COLUMNS,
        EntityKind::Location => LOCATION_COLUMNS,
        EntityKind::Label => LABEL_COLUMNS,
        EntityKind::Item => ITEM_COLUMNS,
        EntityKind::InsurancePolicy => POLICY_COLUMNS,
    }
}

/// Columns that must be present in the header for the table to decode.
/// Everything else defaults to empty when absent.
#[must_use]
pub const fn required_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Home | EntityKind::Location | EntityKind::Label => &["id", "name"],
        EntityKind::Item => &["id", "title"],
        EntityKind::InsurancePolicy => &["id", "provider"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_subset_of_columns() {
        for kind in EntityKind::ALL {
            for required in required_columns(kind) {
                assert!(
                    columns(kind).contains(required),
                    "{kind}: required column '{required}' not in column order"
                );
            }
        }
    }

    #[test]
    fn test_id_always_first() {
        for kind in EntityKind::ALL {
            assert_eq!(columns(kind)[0], "id");
        }
    }
}
