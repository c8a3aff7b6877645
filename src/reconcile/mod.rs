//! Entity reconciliation: raw archive rows to insert-ready entities.
//!
//! A first pass builds an ID index per kind so forward references (an
//! item row preceding its location row in file order) still resolve.
//! Reference resolution never fails the import: a reference whose
//! target is absent from the batch (or whose kind is excluded by the
//! [`ImportConfig`]) demotes to `None` and is counted as a preview
//! warning. Rows that cannot form an entity at all (blank ID, blank
//! name) are skipped with a warning rather than aborting the archive.
//!
//! Everything here is computed without touching the persistent store;
//! the preview is discarded wholesale if the user cancels.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::archive::{decode_table, CsvContents, PhotoEntry, RawRow};
use crate::error::{PackboxError, Result};
use crate::model::{
    EntityCounts, EntityKind, Home, InsurancePolicy, Item, Label, Location, Money,
};

/// How many row titles/names to surface per kind in the preview.
const SAMPLE_LIMIT: usize = 5;

/// Which entity kinds participate in an import.
///
/// Excluded kinds' rows are still parsed (for preview counts) but are
/// never committed, and references into an excluded kind always resolve
/// `Unresolved`.
#[derive(Debug, Clone, Copy, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ImportConfig {
    pub include_homes: bool,
    pub include_locations: bool,
    pub include_labels: bool,
    pub include_items: bool,
    pub include_policies: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            include_homes: true,
            include_locations: true,
            include_labels: true,
            include_items: true,
            include_policies: true,
        }
    }
}

impl ImportConfig {
    #[must_use]
    pub const fn includes(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Home => self.include_homes,
            EntityKind::Location => self.include_locations,
            EntityKind::Label => self.include_labels,
            EntityKind::Item => self.include_items,
            EntityKind::InsurancePolicy => self.include_policies,
        }
    }

    /// Items only; the most common selective import.
    #[must_use]
    pub const fn items_only() -> Self {
        Self {
            include_homes: false,
            include_locations: false,
            include_labels: false,
            include_items: true,
            include_policies: false,
        }
    }
}

/// Outcome of a single reference lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Uuid),
    Unresolved,
}

/// ID index over the current import batch, per kind.
#[derive(Debug, Default)]
pub struct RowIndex {
    ids: HashMap<EntityKind, HashSet<Uuid>>,
}

impl RowIndex {
    pub fn insert(&mut self, kind: EntityKind, id: Uuid) {
        self.ids.entry(kind).or_default().insert(id);
    }

    /// Resolve a reference against the batch. References into excluded
    /// kinds are always `Unresolved`.
    #[must_use]
    pub fn resolve(&self, kind: EntityKind, id: Uuid, config: &ImportConfig) -> Resolution {
        if config.includes(kind) && self.ids.get(&kind).is_some_and(|set| set.contains(&id)) {
            Resolution::Resolved(id)
        } else {
            Resolution::Unresolved
        }
    }
}

/// A non-fatal observation surfaced in the preview.
#[derive(Debug, Clone, Serialize)]
pub struct ImportWarning {
    pub entity: EntityKind,
    pub line: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (line {}, {}): {}",
            self.entity, self.line, self.field, self.message
        )
    }
}

/// Insert-ready entities carrying archive-scoped IDs.
///
/// The commit phase regenerates IDs and remaps references; nothing in
/// the plan points at the persistent store yet.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub homes: Vec<Home>,
    pub locations: Vec<Location>,
    pub labels: Vec<Label>,
    pub items: Vec<Item>,
    pub policies: Vec<InsurancePolicy>,
    /// Photo entries keyed by the owning item's archive ID.
    pub photos: HashMap<Uuid, PhotoEntry>,
    /// Source archive, needed by the commit phase to stream photos out.
    pub archive_path: PathBuf,
}

/// Read-only summary of what an import would do.
#[derive(Debug, Serialize)]
pub struct ImportPreview {
    /// Rows that will be committed, per kind.
    pub counts: EntityCounts,
    /// All parsed rows, including excluded kinds.
    pub parsed_counts: EntityCounts,
    /// First few row titles/names per included kind.
    pub samples: HashMap<EntityKind, Vec<String>>,
    pub warnings: Vec<ImportWarning>,
    #[serde(skip)]
    pub plan: ImportPlan,
}

impl ImportPreview {
    #[must_use]
    pub fn unresolved_reference_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| w.message.starts_with("unresolved"))
            .count()
    }
}

/// Build a preview (and commit plan) from unpacked archive contents.
///
/// # Errors
///
/// Returns `MissingTable` if an included kind has no table in the
/// archive, or a decode error for a structurally broken table. Row
/// level problems become warnings, not errors.
pub fn reconcile(
    archive_path: &Path,
    contents: &CsvContents,
    config: &ImportConfig,
) -> Result<ImportPreview> {
    // Decode every table that is present; excluded kinds still count.
    let mut rows_by_kind: HashMap<EntityKind, Vec<RawRow>> = HashMap::new();
    for kind in EntityKind::ALL {
        match contents.tables.get(&kind) {
            Some(text) => {
                rows_by_kind.insert(kind, decode_table(kind, text)?);
            }
            None if config.includes(kind) => {
                return Err(PackboxError::MissingTable {
                    table: kind.table_file().to_string(),
                });
            }
            None => {}
        }
    }

    let mut state = Reconciler::new(config, contents, &rows_by_kind);
    let plan = state.build_plan(archive_path, &rows_by_kind);

    let mut counts = EntityCounts::default();
    counts.add(EntityKind::Home, plan.homes.len());
    counts.add(EntityKind::Location, plan.locations.len());
    counts.add(EntityKind::Label, plan.labels.len());
    counts.add(EntityKind::Item, plan.items.len());
    counts.add(EntityKind::InsurancePolicy, plan.policies.len());

    let mut parsed_counts = EntityCounts::default();
    for (kind, rows) in &rows_by_kind {
        parsed_counts.add(*kind, rows.len());
    }

    debug!(
        committable = counts.total(),
        parsed = parsed_counts.total(),
        warnings = state.warnings.len(),
        "reconciled archive"
    );

    Ok(ImportPreview {
        counts,
        parsed_counts,
        samples: state.samples,
        warnings: state.warnings,
        plan,
    })
}

struct Reconciler<'a> {
    config: &'a ImportConfig,
    contents: &'a CsvContents,
    index: RowIndex,
    warnings: Vec<ImportWarning>,
    samples: HashMap<EntityKind, Vec<String>>,
}

impl<'a> Reconciler<'a> {
    fn new(
        config: &'a ImportConfig,
        contents: &'a CsvContents,
        rows_by_kind: &HashMap<EntityKind, Vec<RawRow>>,
    ) -> Self {
        // First pass: index every parseable ID so forward references
        // resolve regardless of row order.
        let mut index = RowIndex::default();
        for (kind, rows) in rows_by_kind {
            for row in rows {
                if let Ok(Some(id)) = row.uuid_opt("id") {
                    index.insert(*kind, id);
                }
            }
        }
        Self {
            config,
            contents,
            index,
            warnings: Vec::new(),
            samples: HashMap::new(),
        }
    }

    fn build_plan(
        &mut self,
        archive_path: &Path,
        rows_by_kind: &HashMap<EntityKind, Vec<RawRow>>,
    ) -> ImportPlan {
        let mut plan = ImportPlan {
            archive_path: archive_path.to_path_buf(),
            ..ImportPlan::default()
        };

        for kind in EntityKind::ALL {
            let Some(rows) = rows_by_kind.get(&kind) else {
                continue;
            };
            for row in rows {
                self.sample(kind, row);
                if !self.config.includes(kind) {
                    continue;
                }
                match kind {
                    EntityKind::Home => {
                        if let Some(home) = self.home_from_row(row) {
                            plan.homes.push(home);
                        }
                    }
                    EntityKind::Location => {
                        if let Some(location) = self.location_from_row(row) {
                            plan.locations.push(location);
                        }
                    }
                    EntityKind::Label => {
                        if let Some(label) = self.label_from_row(row) {
                            plan.labels.push(label);
                        }
                    }
                    EntityKind::Item => {
                        if let Some((item, photo)) = self.item_from_row(row) {
                            if let Some(photo) = photo {
                                plan.photos.insert(item.id, photo);
                            }
                            plan.items.push(item);
                        }
                    }
                    EntityKind::InsurancePolicy => {
                        if let Some(policy) = self.policy_from_row(row) {
                            plan.policies.push(policy);
                        }
                    }
                }
            }
        }

        // An archive may carry several primary homes; keep the first.
        let mut seen_primary = false;
        for home in &mut plan.homes {
            if home.is_primary {
                if seen_primary {
                    home.is_primary = false;
                    self.warnings.push(ImportWarning {
                        entity: EntityKind::Home,
                        line: 0,
                        field: "is_primary".to_string(),
                        message: format!(
                            "'{}' demoted: archive has more than one primary home",
                            home.name
                        ),
                    });
                }
                seen_primary = true;
            }
        }

        plan
    }

    fn sample(&mut self, kind: EntityKind, row: &RawRow) {
        let name_column = if kind == EntityKind::Item {
            "title"
        } else if kind == EntityKind::InsurancePolicy {
            "provider"
        } else {
            "name"
        };
        let name = row.get(name_column);
        if name.is_empty() {
            return;
        }
        let entries = self.samples.entry(kind).or_default();
        if entries.len() < SAMPLE_LIMIT {
            entries.push(name.to_string());
        }
    }

    fn warn(&mut self, entity: EntityKind, line: usize, field: &str, message: impl Into<String>) {
        self.warnings.push(ImportWarning {
            entity,
            line,
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Required identity fields: archive ID and display name. Rows
    /// missing either are skipped with a warning.
    fn identity(&mut self, kind: EntityKind, row: &RawRow, name_column: &str) -> Option<(Uuid, String)> {
        let id = match row.uuid_opt("id") {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.warn(kind, row.line, "id", "skipped: blank id");
                return None;
            }
            Err(raw) => {
                self.warn(kind, row.line, "id", format!("skipped: malformed id '{raw}'"));
                return None;
            }
        };
        let name = row.get(name_column).trim().to_string();
        if name.is_empty() {
            self.warn(kind, row.line, name_column, "skipped: blank");
            return None;
        }
        Some((id, name))
    }

    /// Resolve a reference column; demote to `None` with a warning when
    /// the target is absent from the batch or the target kind excluded.
    fn reference(
        &mut self,
        entity: EntityKind,
        row: &RawRow,
        field: &str,
        target: EntityKind,
    ) -> Option<Uuid> {
        match row.uuid_opt(field) {
            Ok(None) => None,
            Ok(Some(id)) => match self.index.resolve(target, id, self.config) {
                Resolution::Resolved(id) => Some(id),
                Resolution::Unresolved => {
                    self.warn(
                        entity,
                        row.line,
                        field,
                        format!("unresolved {target} reference {id}; importing without it"),
                    );
                    None
                }
            },
            Err(raw) => {
                self.warn(
                    entity,
                    row.line,
                    field,
                    format!("malformed {target} reference '{raw}'; importing without it"),
                );
                None
            }
        }
    }

    fn home_from_row(&mut self, row: &RawRow) -> Option<Home> {
        let (id, name) = self.identity(EntityKind::Home, row, "name")?;
        Some(Home {
            id,
            name,
            address1: row.get("address1").to_string(),
            address2: row.get("address2").to_string(),
            city: row.get("city").to_string(),
            state: row.get("state").to_string(),
            postal_code: row.get("postal_code").to_string(),
            country: row.get("country").to_string(),
            color: row.get("color").to_string(),
            is_primary: row.bool_field("is_primary"),
        })
    }

    fn location_from_row(&mut self, row: &RawRow) -> Option<Location> {
        let (id, name) = self.identity(EntityKind::Location, row, "name")?;
        let home_id = self.reference(EntityKind::Location, row, "home_id", EntityKind::Home);
        Some(Location {
            id,
            name,
            description: row.get("description").to_string(),
            symbol: row.get("symbol").to_string(),
            home_id,
        })
    }

    fn label_from_row(&mut self, row: &RawRow) -> Option<Label> {
        let (id, name) = self.identity(EntityKind::Label, row, "name")?;
        let home_id = self.reference(EntityKind::Label, row, "home_id", EntityKind::Home);
        Some(Label {
            id,
            name,
            description: row.get("description").to_string(),
            color: row.get("color").to_string(),
            home_id,
        })
    }

    fn item_from_row(&mut self, row: &RawRow) -> Option<(Item, Option<PhotoEntry>)> {
        let (id, title) = self.identity(EntityKind::Item, row, "title")?;

        let quantity = row
            .get("quantity")
            .trim()
            .parse::<i64>()
            .unwrap_or(1);
        let mut quantity_string = row.get("quantity_string").to_string();
        if quantity_string.trim().is_empty() {
            quantity_string = quantity.to_string();
        }

        let price = match row.get("price").trim() {
            "" => None,
            raw => match raw.parse::<Money>() {
                Ok(money) => Some(money),
                Err(_) => {
                    self.warn(
                        EntityKind::Item,
                        row.line,
                        "price",
                        format!("malformed price '{raw}'; importing without it"),
                    );
                    None
                }
            },
        };

        let location_id = self.reference(EntityKind::Item, row, "location_id", EntityKind::Location);
        let label_id = self.reference(EntityKind::Item, row, "label_id", EntityKind::Label);

        // The photo column names a file that must exist in the archive.
        let photo = match row.get("photo").trim() {
            "" => None,
            raw => {
                let wanted = raw.rsplit('/').next().unwrap_or(raw);
                match self
                    .contents
                    .photos
                    .iter()
                    .find(|entry| entry.file_name == wanted)
                {
                    Some(entry) => Some(entry.clone()),
                    None => {
                        self.warn(
                            EntityKind::Item,
                            row.line,
                            "photo",
                            format!("photo '{raw}' not present in archive"),
                        );
                        None
                    }
                }
            }
        };

        let item = Item {
            id,
            title,
            quantity,
            quantity_string,
            description: row.get("description").to_string(),
            make: row.get("make").to_string(),
            model: row.get("model").to_string(),
            serial_number: row.get("serial_number").to_string(),
            price,
            insured: row.bool_field("insured"),
            notes: row.get("notes").to_string(),
            location_id,
            label_id,
            photo_path: None, // assigned at commit, after ID regeneration
        };
        Some((item, photo))
    }

    fn policy_from_row(&mut self, row: &RawRow) -> Option<InsurancePolicy> {
        let (id, provider) = self.identity(EntityKind::InsurancePolicy, row, "provider")?;

        let mut money_field = |field: &str| -> Option<Money> {
            match row.get(field).trim() {
                "" => None,
                raw => raw.parse().ok().or_else(|| {
                    self.warnings.push(ImportWarning {
                        entity: EntityKind::InsurancePolicy,
                        line: row.line,
                        field: field.to_string(),
                        message: format!("malformed amount '{raw}'; importing without it"),
                    });
                    None
                }),
            }
        };

        let deductible = money_field("deductible");
        let dwelling_coverage = money_field("dwelling_coverage");
        let personal_property_coverage = money_field("personal_property_coverage");
        let loss_of_use_coverage = money_field("loss_of_use_coverage");
        let liability_coverage = money_field("liability_coverage");
        let medical_coverage = money_field("medical_coverage");

        let date_field = |field: &str| row.get(field).trim().parse().ok();
        let start_date = date_field("start_date");
        let end_date = date_field("end_date");

        let mut home_ids = Vec::new();
        for raw in row.get("home_ids").split(';') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match Uuid::parse_str(raw) {
                Ok(home_id) => match self.index.resolve(EntityKind::Home, home_id, self.config) {
                    Resolution::Resolved(resolved) => home_ids.push(resolved),
                    Resolution::Unresolved => self.warn(
                        EntityKind::InsurancePolicy,
                        row.line,
                        "home_ids",
                        format!("unresolved home reference {home_id}; dropping from join"),
                    ),
                },
                Err(_) => self.warn(
                    EntityKind::InsurancePolicy,
                    row.line,
                    "home_ids",
                    format!("malformed home reference '{raw}'; dropping from join"),
                ),
            }
        }

        Some(InsurancePolicy {
            id,
            provider,
            policy_number: row.get("policy_number").to_string(),
            deductible,
            dwelling_coverage,
            personal_property_coverage,
            loss_of_use_coverage,
            liability_coverage,
            medical_coverage,
            start_date,
            end_date,
            home_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::table;

    fn csv_contents(tables: Vec<(EntityKind, String)>) -> CsvContents {
        CsvContents {
            tables: tables.into_iter().collect(),
            photos: Vec::new(),
        }
    }

    fn full_tables(
        homes: &[Home],
        locations: &[Location],
        labels: &[Label],
        items: &[Item],
        policies: &[InsurancePolicy],
    ) -> CsvContents {
        csv_contents(vec![
            (EntityKind::Home, table::encode_homes(homes).unwrap()),
            (
                EntityKind::Location,
                table::encode_locations(locations).unwrap(),
            ),
            (EntityKind::Label, table::encode_labels(labels).unwrap()),
            (EntityKind::Item, table::encode_items(items).unwrap()),
            (
                EntityKind::InsurancePolicy,
                table::encode_policies(policies).unwrap(),
            ),
        ])
    }

    #[test]
    fn test_forward_reference_resolves() {
        // Item row decodes before its location row; the index still
        // resolves the reference.
        let location = Location::new("Garage");
        let mut item = Item::new("Drill");
        item.location_id = Some(location.id);

        let contents = full_tables(&[], &[location.clone()], &[], &[item], &[]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::default()).unwrap();

        assert_eq!(preview.counts.items, 1);
        assert_eq!(preview.plan.items[0].location_id, Some(location.id));
        assert!(preview.warnings.is_empty());
    }

    #[test]
    fn test_unresolved_reference_demotes_with_one_warning() {
        let mut item = Item::new("Orphan lamp");
        item.label_id = Some(Uuid::new_v4()); // label not in archive

        let contents = full_tables(&[], &[], &[], &[item], &[]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::default()).unwrap();

        assert_eq!(preview.counts.items, 1);
        assert_eq!(preview.plan.items[0].label_id, None);
        assert_eq!(preview.unresolved_reference_count(), 1);
    }

    #[test]
    fn test_excluded_kind_parsed_but_not_planned() {
        let location = Location::new("Attic");
        let mut item = Item::new("Box of cables");
        item.location_id = Some(location.id);

        let contents = full_tables(&[], &[location], &[], &[item], &[]);
        let config = ImportConfig {
            include_locations: false,
            ..ImportConfig::default()
        };
        let preview = reconcile(Path::new("a.zip"), &contents, &config).unwrap();

        // Parsed for counts, never committed.
        assert_eq!(preview.parsed_counts.locations, 1);
        assert_eq!(preview.counts.locations, 0);
        assert!(preview.plan.locations.is_empty());

        // Reference into the excluded kind demotes.
        assert_eq!(preview.plan.items[0].location_id, None);
        assert_eq!(preview.unresolved_reference_count(), 1);
    }

    #[test]
    fn test_missing_table_for_included_kind_fails() {
        let contents = csv_contents(vec![(
            EntityKind::Home,
            table::encode_homes(&[Home::new("Casa")]).unwrap(),
        )]);
        let err =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::default()).unwrap_err();
        assert!(matches!(err, PackboxError::MissingTable { .. }));
    }

    #[test]
    fn test_items_only_config_tolerates_missing_other_tables() {
        let contents = csv_contents(vec![(
            EntityKind::Item,
            table::encode_items(&[Item::new("Couch")]).unwrap(),
        )]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::items_only()).unwrap();
        assert_eq!(preview.counts.items, 1);
        assert_eq!(preview.counts.total(), 1);
    }

    #[test]
    fn test_blank_title_row_skipped_with_warning() {
        let id = Uuid::new_v4();
        let csv_text = format!("id,title\n{id},\n");
        let contents = csv_contents(vec![(EntityKind::Item, csv_text)]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::items_only()).unwrap();

        assert_eq!(preview.counts.items, 0);
        assert_eq!(preview.warnings.len(), 1);
        assert!(preview.warnings[0].message.contains("skipped"));
    }

    #[test]
    fn test_second_primary_home_demoted() {
        let mut first = Home::new("Main house");
        first.is_primary = true;
        let mut second = Home::new("Cabin");
        second.is_primary = true;

        let contents = full_tables(&[first, second], &[], &[], &[], &[]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::default()).unwrap();

        assert!(preview.plan.homes[0].is_primary);
        assert!(!preview.plan.homes[1].is_primary);
        assert!(preview
            .warnings
            .iter()
            .any(|w| w.field == "is_primary"));
    }

    #[test]
    fn test_samples_capped() {
        let items: Vec<Item> = (0..10).map(|i| Item::new(format!("Item {i}"))).collect();
        let contents = full_tables(&[], &[], &[], &items, &[]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::default()).unwrap();
        assert_eq!(preview.samples[&EntityKind::Item].len(), SAMPLE_LIMIT);
    }

    #[test]
    fn test_policy_join_keeps_resolved_homes_only() {
        let home = Home::new("Villa");
        let mut policy = InsurancePolicy::new("Acme Mutual");
        policy.home_ids = vec![home.id, Uuid::new_v4()];

        let contents = full_tables(&[home.clone()], &[], &[], &[], &[policy]);
        let preview =
            reconcile(Path::new("a.zip"), &contents, &ImportConfig::default()).unwrap();

        assert_eq!(preview.plan.policies[0].home_ids, vec![home.id]);
        assert_eq!(preview.unresolved_reference_count(), 1);
    }
}
