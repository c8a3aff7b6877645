use uuid::Uuid;

use crate::cli::{AddCommand, AddEntity, Context};
use crate::config::Workspace;
use crate::error::{PackboxError, Result};
use crate::model::{EntityKind, Home, InsurancePolicy, Item, Label, Location, Money};
use crate::store::InventoryStore;

/// Execute the add command.
///
/// # Errors
///
/// Returns `NotFound` for a named reference that does not exist,
/// `Validation` for a malformed price.
pub fn execute(ctx: &Context, command: AddCommand) -> Result<()> {
    let workspace = Workspace::require()?;
    let store = InventoryStore::open(&workspace.db_path())?;

    let (kind, id, name) = match command.entity {
        AddEntity::Home {
            name,
            primary,
            city,
            country,
        } => {
            let mut home = Home::new(name);
            home.city = city;
            home.country = country;
            home.is_primary = primary && !store.has_primary_home()?;
            if primary && !home.is_primary {
                tracing::warn!("store already has a primary home, adding as secondary");
            }
            store.insert_home(&home)?;
            (EntityKind::Home, home.id, home.name)
        }
        AddEntity::Location { name, home, symbol } => {
            let mut location = Location::new(name);
            location.symbol = symbol;
            location.home_id = resolve_home(&store, home.as_deref())?;
            store.insert_location(&location)?;
            (EntityKind::Location, location.id, location.name)
        }
        AddEntity::Label { name, color } => {
            let mut label = Label::new(name);
            label.color = color;
            store.insert_label(&label)?;
            (EntityKind::Label, label.id, label.name)
        }
        AddEntity::Item {
            title,
            quantity,
            price,
            location,
            label,
            make,
            model,
            serial,
            insured,
            notes,
        } => {
            let mut item = Item::new(title);
            item.set_quantity(quantity);
            item.price = price.as_deref().map(str::parse::<Money>).transpose()?;
            item.location_id = location
                .as_deref()
                .map(|name| {
                    store.find_location(name)?.map(|l| l.id).ok_or_else(|| {
                        PackboxError::NotFound {
                            kind: EntityKind::Location,
                            name: name.to_string(),
                        }
                    })
                })
                .transpose()?;
            item.label_id = label
                .as_deref()
                .map(|name| {
                    store.find_label(name)?.map(|l| l.id).ok_or_else(|| {
                        PackboxError::NotFound {
                            kind: EntityKind::Label,
                            name: name.to_string(),
                        }
                    })
                })
                .transpose()?;
            item.make = make;
            item.model = model;
            item.serial_number = serial;
            item.insured = insured;
            item.notes = notes;
            store.insert_item(&item)?;
            (EntityKind::Item, item.id, item.title)
        }
        AddEntity::Policy {
            provider,
            number,
            home,
        } => {
            let mut policy = InsurancePolicy::new(provider);
            policy.policy_number = number;
            for name in &home {
                if let Some(id) = resolve_home(&store, Some(name))? {
                    policy.home_ids.push(id);
                }
            }
            store.insert_policy(&policy)?;
            (EntityKind::InsurancePolicy, policy.id, policy.provider)
        }
    };

    if ctx.json {
        println!(
            "{}",
            serde_json::json!({ "kind": kind, "id": id, "name": name })
        );
    } else {
        println!("Added {kind} '{name}' ({id})");
    }
    Ok(())
}

fn resolve_home(store: &InventoryStore, name: Option<&str>) -> Result<Option<Uuid>> {
    let Some(name) = name else {
        return Ok(None);
    };
    store
        .find_home(name)?
        .map(|home| Some(home.id))
        .ok_or_else(|| PackboxError::NotFound {
            kind: EntityKind::Home,
            name: name.to_string(),
        })
}
