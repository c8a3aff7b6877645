//! Core data types for `packbox`.
//!
//! The entity kinds that participate in export/import (Home, Location,
//! Label, Item, `InsurancePolicy`) plus the exact-decimal [`Money`] type
//! and the per-kind [`EntityCounts`] aggregate used by previews,
//! summaries, and partial-commit reporting.
//!
//! Every entity carries a stable UUID that is the unit of cross-reference
//! inside an archive. IDs are archive-scoped: the import engine
//! regenerates them on commit and remaps child references.

mod money;

pub use money::Money;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the five entity kinds exchanged through archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Home,
    Location,
    Label,
    Item,
    InsurancePolicy,
}

impl EntityKind {
    /// All kinds in foreign-key dependency order (parents first).
    pub const ALL: [Self; 5] = [
        Self::Home,
        Self::Location,
        Self::Label,
        Self::Item,
        Self::InsurancePolicy,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Location => "location",
            Self::Label => "label",
            Self::Item => "item",
            Self::InsurancePolicy => "insurance_policy",
        }
    }

    /// Fixed top-level path of this kind's table inside an archive.
    #[must_use]
    pub const fn table_file(self) -> &'static str {
        match self {
            Self::Home => "homes.csv",
            Self::Location => "locations.csv",
            Self::Label => "labels.csv",
            Self::Item => "items.csv",
            Self::InsurancePolicy => "insurance_policies.csv",
        }
    }

    #[must_use]
    pub fn from_table_file(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table_file() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::error::PackboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "home" => Ok(Self::Home),
            "location" => Ok(Self::Location),
            "label" => Ok(Self::Label),
            "item" => Ok(Self::Item),
            "insurance_policy" | "policy" => Ok(Self::InsurancePolicy),
            other => Err(crate::error::PackboxError::validation(
                "kind",
                format!("unknown entity kind '{other}'"),
            )),
        }
    }
}

/// Per-kind entity tally.
///
/// Used by import previews, import/export summaries, and the
/// `PartialCommit` error (how far a failed commit got).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub homes: usize,
    pub locations: usize,
    pub labels: usize,
    pub items: usize,
    pub policies: usize,
}

impl EntityCounts {
    pub fn increment(&mut self, kind: EntityKind) {
        *self.slot(kind) += 1;
    }

    pub fn add(&mut self, kind: EntityKind, count: usize) {
        *self.slot(kind) += count;
    }

    #[must_use]
    pub const fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Home => self.homes,
            EntityKind::Location => self.locations,
            EntityKind::Label => self.labels,
            EntityKind::Item => self.items,
            EntityKind::InsurancePolicy => self.policies,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.homes + self.locations + self.labels + self.items + self.policies
    }

    fn slot(&mut self, kind: EntityKind) -> &mut usize {
        match kind {
            EntityKind::Home => &mut self.homes,
            EntityKind::Location => &mut self.locations,
            EntityKind::Label => &mut self.labels,
            EntityKind::Item => &mut self.items,
            EntityKind::InsurancePolicy => &mut self.policies,
        }
    }
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} homes, {} locations, {} labels, {} items, {} policies",
            self.homes, self.locations, self.labels, self.items, self.policies
        )
    }
}

/// A home: the root of the ownership graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Home {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    /// Color tag (hex string, e.g. "#34C759").
    #[serde(default)]
    pub color: String,
    /// At most one home per store is primary.
    #[serde(default)]
    pub is_primary: bool,
}

impl Home {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address1: String::new(),
            address2: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            country: String::new(),
            color: String::new(),
            is_primary: false,
        }
    }
}

/// A place inside a home that holds items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Symbol tag (SF-symbol-style name, e.g. "sofa.fill").
    #[serde(default)]
    pub symbol: String,
    /// Owning home, if any.
    #[serde(default)]
    pub home_id: Option<Uuid>,
}

impl Location {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            symbol: String::new(),
            home_id: None,
        }
    }
}

/// A user-defined tag attachable to items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    /// Owning home; `None` for global labels.
    #[serde(default)]
    pub home_id: Option<Uuid>,
}

impl Label {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            color: String::new(),
            home_id: None,
        }
    }
}

/// An inventoried possession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    /// Numeric quantity; kept in sync with `quantity_string`.
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Free-text quantity as the user typed it (e.g. "2 boxes").
    #[serde(default)]
    pub quantity_string: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    /// Exact decimal purchase price.
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub insured: bool,
    #[serde(default)]
    pub notes: String,
    /// Containing location; unresolved references demote to `None`.
    #[serde(default)]
    pub location_id: Option<Uuid>,
    /// Attached label; unresolved references demote to `None`.
    #[serde(default)]
    pub label_id: Option<Uuid>,
    /// Relative photo path inside the workspace (`photos/<id>.<ext>`).
    #[serde(default)]
    pub photo_path: Option<String>,
}

const fn default_quantity() -> i64 {
    1
}

impl Item {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            quantity: 1,
            quantity_string: "1".to_string(),
            description: String::new(),
            make: String::new(),
            model: String::new(),
            serial_number: String::new(),
            price: None,
            insured: false,
            notes: String::new(),
            location_id: None,
            label_id: None,
            photo_path: None,
        }
    }

    /// Set the numeric quantity and keep the free-text form in sync.
    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity;
        self.quantity_string = quantity.to_string();
    }

    /// Re-derive the free-text quantity when it is missing (tolerant
    /// archive decoding leaves it empty if the column was absent).
    pub fn sync_quantity_string(&mut self) {
        if self.quantity_string.trim().is_empty() {
            self.quantity_string = self.quantity.to_string();
        }
    }
}

/// An insurance policy, joined to one or more homes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub id: Uuid,
    pub provider: String,
    #[serde(default)]
    pub policy_number: String,
    #[serde(default)]
    pub deductible: Option<Money>,
    #[serde(default)]
    pub dwelling_coverage: Option<Money>,
    #[serde(default)]
    pub personal_property_coverage: Option<Money>,
    #[serde(default)]
    pub loss_of_use_coverage: Option<Money>,
    #[serde(default)]
    pub liability_coverage: Option<Money>,
    #[serde(default)]
    pub medical_coverage: Option<Money>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Covered homes (many-to-many join).
    #[serde(default)]
    pub home_ids: Vec<Uuid>,
}

impl InsurancePolicy {
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            policy_number: String::new(),
            deductible: None,
            dwelling_coverage: None,
            personal_property_coverage: None,
            loss_of_use_coverage: None,
            liability_coverage: None,
            medical_coverage: None,
            start_date: None,
            end_date: None,
            home_ids: Vec::new(),
        }
    }
}

/// Output shape of the external photo-analysis collaborator.
///
/// Only the data contract is modeled here; the analysis itself is an
/// external HTTP service. Used to pre-populate a new [`Item`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDetails {
    pub title: String,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub price: Option<Money>,
}

impl From<ItemDetails> for Item {
    fn from(details: ItemDetails) -> Self {
        let mut item = Self::new(details.title);
        if let Some(quantity) = details.quantity {
            item.set_quantity(quantity);
        }
        item.description = details.description;
        item.make = details.make;
        item.model = details.model;
        item.price = details.price;
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_table_files() {
        assert_eq!(EntityKind::Item.table_file(), "items.csv");
        assert_eq!(
            EntityKind::from_table_file("insurance_policies.csv"),
            Some(EntityKind::InsurancePolicy)
        );
        assert_eq!(EntityKind::from_table_file("readme.txt"), None);
    }

    #[test]
    fn test_kind_from_str_accepts_policy_alias() {
        assert_eq!(
            "policy".parse::<EntityKind>().unwrap(),
            EntityKind::InsurancePolicy
        );
        assert!("gadget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_counts_increment_and_total() {
        let mut counts = EntityCounts::default();
        counts.increment(EntityKind::Item);
        counts.increment(EntityKind::Item);
        counts.add(EntityKind::Location, 3);
        assert_eq!(counts.get(EntityKind::Item), 2);
        assert_eq!(counts.get(EntityKind::Location), 3);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_item_quantity_sync() {
        let mut item = Item::new("Desk lamp");
        item.set_quantity(4);
        assert_eq!(item.quantity_string, "4");

        item.quantity_string.clear();
        item.sync_quantity_string();
        assert_eq!(item.quantity_string, "4");
    }

    #[test]
    fn test_item_from_details() {
        let details = ItemDetails {
            title: "Espresso machine".to_string(),
            quantity: Some(1),
            make: "Rancilio".to_string(),
            model: "Silvia".to_string(),
            price: Some("650.00".parse().unwrap()),
            ..Default::default()
        };
        let item: Item = details.into();
        assert_eq!(item.title, "Espresso machine");
        assert_eq!(item.make, "Rancilio");
        assert_eq!(item.price.unwrap().to_string(), "650.00");
    }
}
