//! CSV table encoding and decoding.
//!
//! One UTF-8 CSV file per entity kind with a fixed header row and
//! deterministic column order. Quoting follows standard CSV rules (the
//! `csv` crate). Decimal monetary fields serialize as fixed-point text;
//! optional references serialize as the referenced UUID or the empty
//! string.
//!
//! Decoding validates headers against [`schema::required_columns`],
//! tolerates unknown extra columns, and yields untyped [`RawRow`]s; the
//! reconciler performs the typed conversion so that reference demotion
//! can be counted as preview warnings instead of hard failures.

use std::collections::HashMap;

use uuid::Uuid;

use crate::archive::schema;
use crate::error::{PackboxError, Result};
use crate::model::{EntityKind, Home, InsurancePolicy, Item, Label, Location};

/// One decoded CSV row: header-keyed values plus the source line number
/// for error reporting.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub line: usize,
    values: HashMap<String, String>,
}

impl RawRow {
    #[must_use]
    pub fn new(line: usize) -> Self {
        Self {
            line,
            values: HashMap::new(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    /// Value of a column, or the empty string when absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map_or("", String::as_str)
    }

    #[must_use]
    pub fn is_blank(&self, column: &str) -> bool {
        self.get(column).trim().is_empty()
    }

    /// Parse a reference column. `Ok(None)` for blank, `Err` with the
    /// raw text for malformed UUIDs (the caller decides whether that is
    /// fatal or a demotion warning).
    pub fn uuid_opt(&self, column: &str) -> std::result::Result<Option<Uuid>, String> {
        let raw = self.get(column).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Uuid::parse_str(raw).map(Some).map_err(|_| raw.to_string())
    }

    #[must_use]
    pub fn bool_field(&self, column: &str) -> bool {
        matches!(
            self.get(column).trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )
    }
}

fn bool_text(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

fn uuid_or_empty(id: Option<Uuid>) -> String {
    id.map(|u| u.to_string()).unwrap_or_default()
}

fn money_or_empty(value: Option<crate::model::Money>) -> String {
    value.map(|m| m.to_string()).unwrap_or_default()
}

fn write_table<F>(kind: EntityKind, row_count: usize, mut write_rows: F) -> Result<String>
where
    F: FnMut(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(schema::columns(kind))
        .and_then(|()| write_rows(&mut writer))
        .map_err(|e| PackboxError::MalformedTable {
            table: kind.table_file().to_string(),
            line: row_count,
            reason: e.to_string(),
        })?;
    let bytes = writer
        .into_inner()
        .map_err(|e| PackboxError::Validation {
            field: kind.table_file().to_string(),
            reason: e.to_string(),
        })?;
    // The writer only ever receives valid UTF-8.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Encode homes as `homes.csv` text.
///
/// # Errors
///
/// Returns `MalformedTable` if serialization fails.
pub fn encode_homes(homes: &[Home]) -> Result<String> {
    write_table(EntityKind::Home, homes.len(), |writer| {
        for home in homes {
            writer.write_record(&[
                home.id.to_string(),
                home.name.clone(),
                home.address1.clone(),
                home.address2.clone(),
                home.city.clone(),
                home.state.clone(),
                home.postal_code.clone(),
                home.country.clone(),
                home.color.clone(),
                bool_text(home.is_primary),
            ])?;
        }
        Ok(())
    })
}

/// Encode locations as `locations.csv` text.
///
/// # Errors
///
/// Returns `MalformedTable` if serialization fails.
pub fn encode_locations(locations: &[Location]) -> Result<String> {
    write_table(EntityKind::Location, locations.len(), |writer| {
        for location in locations {
            writer.write_record(&[
                location.id.to_string(),
                location.name.clone(),
                location.description.clone(),
                location.symbol.clone(),
                uuid_or_empty(location.home_id),
            ])?;
        }
        Ok(())
    })
}

/// Encode labels as `labels.csv` text.
///
/// # Errors
///
/// Returns `MalformedTable` if serialization fails.
pub fn encode_labels(labels: &[Label]) -> Result<String> {
    write_table(EntityKind::Label, labels.len(), |writer| {
        for label in labels {
            writer.write_record(&[
                label.id.to_string(),
                label.name.clone(),
                label.description.clone(),
                label.color.clone(),
                uuid_or_empty(label.home_id),
            ])?;
        }
        Ok(())
    })
}

/// Encode items as `items.csv` text.
///
/// # Errors
///
/// Returns `MalformedTable` if serialization fails.
pub fn encode_items(items: &[Item]) -> Result<String> {
    write_table(EntityKind::Item, items.len(), |writer| {
        for item in items {
            writer.write_record(&[
                item.id.to_string(),
                item.title.clone(),
                item.quantity.to_string(),
                item.quantity_string.clone(),
                item.description.clone(),
                item.make.clone(),
                item.model.clone(),
                item.serial_number.clone(),
                money_or_empty(item.price),
                bool_text(item.insured),
                item.notes.clone(),
                uuid_or_empty(item.location_id),
                uuid_or_empty(item.label_id),
                item.photo_path.clone().unwrap_or_default(),
            ])?;
        }
        Ok(())
    })
}

/// Encode insurance policies as `insurance_policies.csv` text.
///
/// The many-to-many home join serializes as a `;`-separated UUID list.
///
/// # Errors
///
/// Returns `MalformedTable` if serialization fails.
pub fn encode_policies(policies: &[InsurancePolicy]) -> Result<String> {
    write_table(EntityKind::InsurancePolicy, policies.len(), |writer| {
        for policy in policies {
            let home_ids = policy
                .home_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(";");
            writer.write_record(&[
                policy.id.to_string(),
                policy.provider.clone(),
                policy.policy_number.clone(),
                money_or_empty(policy.deductible),
                money_or_empty(policy.dwelling_coverage),
                money_or_empty(policy.personal_property_coverage),
                money_or_empty(policy.loss_of_use_coverage),
                money_or_empty(policy.liability_coverage),
                money_or_empty(policy.medical_coverage),
                policy.start_date.map(|d| d.to_string()).unwrap_or_default(),
                policy.end_date.map(|d| d.to_string()).unwrap_or_default(),
                home_ids,
            ])?;
        }
        Ok(())
    })
}

/// Decode a kind's CSV text into raw rows.
///
/// The header must contain every required column for `kind`; unknown
/// extra columns are carried through untouched (and ignored downstream),
/// known-but-absent optional columns read as empty.
///
/// # Errors
///
/// Returns `MissingColumn` on a short header or `MalformedTable` on an
/// unparseable row.
pub fn decode_table(kind: EntityKind, text: &str) -> Result<Vec<RawRow>> {
    let table = kind.table_file();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PackboxError::MalformedTable {
            table: table.to_string(),
            line: 1,
            reason: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    for required in schema::required_columns(kind) {
        if !headers.iter().any(|h| h == required) {
            return Err(PackboxError::MissingColumn {
                table: table.to_string(),
                column: (*required).to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 2; // 1-based, after the header
        let record = record.map_err(|e| PackboxError::MalformedTable {
            table: table.to_string(),
            line,
            reason: e.to_string(),
        })?;

        let mut row = RawRow::new(line);
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Money;

    fn sample_item() -> Item {
        let mut item = Item::new("Sofa, velvet \"Oslo\"");
        item.set_quantity(2);
        item.price = Some("1299.50".parse::<Money>().unwrap());
        item.insured = true;
        item.notes = "left arm\nscratched".to_string();
        item
    }

    #[test]
    fn test_item_roundtrip_preserves_fields() {
        let item = sample_item();
        let csv_text = encode_items(std::slice::from_ref(&item)).unwrap();
        let rows = decode_table(EntityKind::Item, &csv_text).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.get("id"), item.id.to_string());
        assert_eq!(row.get("title"), "Sofa, velvet \"Oslo\"");
        assert_eq!(row.get("quantity"), "2");
        assert_eq!(row.get("price"), "1299.50");
        assert!(row.bool_field("insured"));
        assert_eq!(row.get("notes"), "left arm\nscratched");
    }

    #[test]
    fn test_decimal_exactness_through_text() {
        let mut item = Item::new("Watch");
        item.price = Some("0.10".parse::<Money>().unwrap());
        let csv_text = encode_items(&[item]).unwrap();
        let rows = decode_table(EntityKind::Item, &csv_text).unwrap();
        let price: Money = rows[0].get("price").parse().unwrap();
        assert_eq!(price.to_string(), "0.10");
    }

    #[test]
    fn test_empty_reference_serializes_as_empty_string() {
        let item = Item::new("Unplaced");
        let csv_text = encode_items(&[item]).unwrap();
        let rows = decode_table(EntityKind::Item, &csv_text).unwrap();
        assert_eq!(rows[0].uuid_opt("location_id").unwrap(), None);
    }

    #[test]
    fn test_missing_required_column_fails() {
        let csv_text = "id,quantity\nabc,1\n";
        let err = decode_table(EntityKind::Item, csv_text).unwrap_err();
        assert!(matches!(
            err,
            PackboxError::MissingColumn { ref column, .. } if column == "title"
        ));
    }

    #[test]
    fn test_unknown_extra_column_tolerated() {
        let id = Uuid::new_v4();
        let csv_text = format!("id,title,future_field\n{id},Chair,whatever\n");
        let rows = decode_table(EntityKind::Item, &csv_text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title"), "Chair");
        assert_eq!(rows[0].get("future_field"), "whatever");
    }

    #[test]
    fn test_absent_optional_column_reads_empty() {
        let id = Uuid::new_v4();
        let csv_text = format!("id,title\n{id},Chair\n");
        let rows = decode_table(EntityKind::Item, &csv_text).unwrap();
        assert_eq!(rows[0].get("price"), "");
        assert!(rows[0].is_blank("location_id"));
    }

    #[test]
    fn test_malformed_uuid_reported_with_raw_text() {
        let mut row = RawRow::new(2);
        row.insert("location_id", "not-a-uuid");
        assert_eq!(row.uuid_opt("location_id").unwrap_err(), "not-a-uuid");
    }

    #[test]
    fn test_policy_home_ids_join_roundtrip() {
        let mut policy = InsurancePolicy::new("Acme Mutual");
        policy.home_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        policy.deductible = Some("500.00".parse::<Money>().unwrap());
        let csv_text = encode_policies(std::slice::from_ref(&policy)).unwrap();
        let rows = decode_table(EntityKind::InsurancePolicy, &csv_text).unwrap();

        let joined = rows[0].get("home_ids");
        let parsed: Vec<Uuid> = joined
            .split(';')
            .map(|s| Uuid::parse_str(s).unwrap())
            .collect();
        assert_eq!(parsed, policy.home_ids);
    }

    #[test]
    fn test_header_only_table_decodes_empty() {
        let csv_text = encode_homes(&[]).unwrap();
        let rows = decode_table(EntityKind::Home, &csv_text).unwrap();
        assert!(rows.is_empty());
    }
}
