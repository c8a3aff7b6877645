use crate::cli::{Context, ListArgs};
use crate::config::Workspace;
use crate::error::Result;
use crate::model::{EntityCounts, EntityKind};
use crate::store::InventoryStore;

/// Execute the list command.
///
/// # Errors
///
/// Returns `Validation` for an unknown kind.
pub fn execute(ctx: &Context, args: &ListArgs) -> Result<()> {
    let workspace = Workspace::require()?;
    let store = InventoryStore::open(&workspace.db_path())?;

    let Some(kind_text) = &args.kind else {
        return print_counts(ctx, &store);
    };
    let kind: EntityKind = kind_text.parse()?;

    if ctx.json {
        let json = match kind {
            EntityKind::Home => serde_json::to_string_pretty(&store.fetch_homes()?)?,
            EntityKind::Location => serde_json::to_string_pretty(&store.fetch_locations()?)?,
            EntityKind::Label => serde_json::to_string_pretty(&store.fetch_labels()?)?,
            EntityKind::Item => serde_json::to_string_pretty(&store.fetch_items()?)?,
            EntityKind::InsurancePolicy => {
                serde_json::to_string_pretty(&store.fetch_policies()?)?
            }
        };
        println!("{json}");
        return Ok(());
    }

    match kind {
        EntityKind::Home => {
            for home in store.fetch_homes()? {
                let marker = if home.is_primary { " (primary)" } else { "" };
                println!("{}  {}{marker}", home.id, home.name);
            }
        }
        EntityKind::Location => {
            for location in store.fetch_locations()? {
                println!("{}  {}", location.id, location.name);
            }
        }
        EntityKind::Label => {
            for label in store.fetch_labels()? {
                println!("{}  {}", label.id, label.name);
            }
        }
        EntityKind::Item => {
            for item in store.fetch_items()? {
                let price = item.price.map(|p| format!("  {p}")).unwrap_or_default();
                println!("{}  {} x{}{price}", item.id, item.title, item.quantity);
            }
        }
        EntityKind::InsurancePolicy => {
            for policy in store.fetch_policies()? {
                println!(
                    "{}  {} {} ({} homes)",
                    policy.id,
                    policy.provider,
                    policy.policy_number,
                    policy.home_ids.len()
                );
            }
        }
    }
    Ok(())
}

fn print_counts(ctx: &Context, store: &InventoryStore) -> Result<()> {
    let mut counts = EntityCounts::default();
    for kind in EntityKind::ALL {
        counts.add(kind, store.count(kind)?);
    }
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("{counts}");
    }
    Ok(())
}
