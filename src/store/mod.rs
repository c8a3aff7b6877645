//! SQLite-backed inventory store.
//!
//! One writer at a time; the engines take the store by value so a
//! long-running export or import owns the connection for its duration.
//! IDs and monetary amounts are stored as TEXT so values round-trip
//! exactly; dates are ISO-8601 TEXT.
//!
//! A staged restore file (`pending-restore.sqlite` next to the live
//! database) is swapped in by [`InventoryStore::open`] before the
//! connection is made, so a restore never replaces a database that a
//! running process already has open.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PackboxError, Result};
use crate::model::{EntityKind, Home, InsurancePolicy, Item, Label, Location, Money};

/// Current on-disk schema version (SQLite `user_version`).
pub const SCHEMA_VERSION: i32 = 1;

/// Database file name inside a workspace.
pub const STORE_FILE: &str = "inventory.sqlite";

/// Staged restore payload, applied on the next open.
pub const PENDING_RESTORE_FILE: &str = "pending-restore.sqlite";

// Entity references (home_id, location_id, label_id) are soft: plain
// TEXT ids with no FOREIGN KEY constraint, so a row whose reference no
// longer resolves is still storable and exportable. Resolution happens
// in the import reconciler, not in the database. Only the policy_homes
// join table keeps real constraints; its rows are always derived from
// ids known to exist.
const SCHEMA_SQL: &str = "
CREATE TABLE homes (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    address1    TEXT NOT NULL DEFAULT '',
    address2    TEXT NOT NULL DEFAULT '',
    city        TEXT NOT NULL DEFAULT '',
    state       TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    country     TEXT NOT NULL DEFAULT '',
    color       TEXT NOT NULL DEFAULT '',
    is_primary  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE locations (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    symbol      TEXT NOT NULL DEFAULT '',
    home_id     TEXT
);

CREATE TABLE labels (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    color       TEXT NOT NULL DEFAULT '',
    home_id     TEXT
);

CREATE TABLE items (
    id              TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    quantity        INTEGER NOT NULL DEFAULT 1,
    quantity_string TEXT NOT NULL DEFAULT '1',
    description     TEXT NOT NULL DEFAULT '',
    make            TEXT NOT NULL DEFAULT '',
    model           TEXT NOT NULL DEFAULT '',
    serial_number   TEXT NOT NULL DEFAULT '',
    price           TEXT,
    insured         INTEGER NOT NULL DEFAULT 0,
    notes           TEXT NOT NULL DEFAULT '',
    location_id     TEXT,
    label_id        TEXT,
    photo_path      TEXT
);

CREATE TABLE insurance_policies (
    id                         TEXT PRIMARY KEY,
    provider                   TEXT NOT NULL,
    policy_number              TEXT NOT NULL DEFAULT '',
    deductible                 TEXT,
    dwelling_coverage          TEXT,
    personal_property_coverage TEXT,
    loss_of_use_coverage       TEXT,
    liability_coverage         TEXT,
    medical_coverage           TEXT,
    start_date                 TEXT,
    end_date                   TEXT
);

CREATE TABLE policy_homes (
    policy_id TEXT NOT NULL REFERENCES insurance_policies(id) ON DELETE CASCADE,
    home_id   TEXT NOT NULL REFERENCES homes(id) ON DELETE CASCADE,
    PRIMARY KEY (policy_id, home_id)
);

CREATE INDEX idx_items_location ON items(location_id);
CREATE INDEX idx_items_label ON items(label_id);
CREATE INDEX idx_locations_home ON locations(home_id);
";

/// Column parse failure mapped into rusqlite's error channel so it can
/// surface through `query_map`.
fn column_error(
    index: usize,
    source: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(source))
}

fn uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(index)?;
    Uuid::parse_str(&text).map_err(|e| column_error(index, e))
}

fn opt_uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(index)?;
    text.map(|t| Uuid::parse_str(&t).map_err(|e| column_error(index, e)))
        .transpose()
}

fn money_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<Money>> {
    let text: Option<String> = row.get(index)?;
    text.map(|t| t.parse::<Money>().map_err(|e| column_error(index, e)))
        .transpose()
}

fn date_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<chrono::NaiveDate>> {
    let text: Option<String> = row.get(index)?;
    text.map(|t| t.parse().map_err(|e| column_error(index, e)))
        .transpose()
}

pub struct InventoryStore {
    conn: Connection,
    path: PathBuf,
}

impl InventoryStore {
    /// Open (creating if needed) the database at `path`, after applying
    /// any staged restore sitting next to it.
    ///
    /// # Errors
    ///
    /// Returns `Io` on filesystem failure, `Database` on SQLite failure.
    pub fn open(path: &Path) -> Result<Self> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let pending = parent.join(PENDING_RESTORE_FILE);
        if pending.is_file() {
            info!(path = %path.display(), "applying staged restore");
            // Sidecar journal files belong to the database being
            // replaced and must not outlive it.
            for suffix in ["-wal", "-shm"] {
                let mut sidecar = path.as_os_str().to_os_string();
                sidecar.push(suffix);
                let _ = fs::remove_file(PathBuf::from(sidecar));
            }
            if path.exists() {
                fs::remove_file(path)?;
            }
            fs::rename(&pending, path)?;
        }

        let conn = Connection::open(path)?;
        // journal_mode returns the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.apply_schema()?;
        Ok(store)
    }

    fn apply_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("SELECT user_version FROM pragma_user_version", [], |row| {
                row.get(0)
            })?;
        if version == 0 {
            debug!("initializing schema");
            self.conn.execute_batch(SCHEMA_SQL)?;
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if version > SCHEMA_VERSION {
            return Err(PackboxError::SnapshotVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consistent copy of the whole database to `dest`, usable while
    /// this connection stays open.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    pub fn copy_database_to(&self, dest: &Path) -> Result<()> {
        self.conn
            .execute("VACUUM INTO ?1", params![dest.to_string_lossy().into_owned()])?;
        Ok(())
    }

    pub fn insert_home(&self, home: &Home) -> Result<()> {
        self.conn.execute(
            "INSERT INTO homes (id, name, address1, address2, city, state, postal_code, country, color, is_primary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                home.id.to_string(),
                home.name,
                home.address1,
                home.address2,
                home.city,
                home.state,
                home.postal_code,
                home.country,
                home.color,
                home.is_primary,
            ],
        )?;
        Ok(())
    }

    pub fn insert_location(&self, location: &Location) -> Result<()> {
        self.conn.execute(
            "INSERT INTO locations (id, name, description, symbol, home_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                location.id.to_string(),
                location.name,
                location.description,
                location.symbol,
                location.home_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn insert_label(&self, label: &Label) -> Result<()> {
        self.conn.execute(
            "INSERT INTO labels (id, name, description, color, home_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                label.id.to_string(),
                label.name,
                label.description,
                label.color,
                label.home_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn insert_item(&self, item: &Item) -> Result<()> {
        self.conn.execute(
            "INSERT INTO items (id, title, quantity, quantity_string, description, make, model,
                                serial_number, price, insured, notes, location_id, label_id, photo_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                item.id.to_string(),
                item.title,
                item.quantity,
                item.quantity_string,
                item.description,
                item.make,
                item.model,
                item.serial_number,
                item.price.map(|p| p.to_string()),
                item.insured,
                item.notes,
                item.location_id.map(|id| id.to_string()),
                item.label_id.map(|id| id.to_string()),
                item.photo_path,
            ],
        )?;
        Ok(())
    }

    /// Insert a policy and its home join rows in one transaction.
    pub fn insert_policy(&self, policy: &InsurancePolicy) -> Result<()> {
        // Single-statement-per-row joins are fine at this scale; the
        // unchecked transaction is safe because the store is the only
        // writer on this connection.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO insurance_policies (id, provider, policy_number, deductible,
                dwelling_coverage, personal_property_coverage, loss_of_use_coverage,
                liability_coverage, medical_coverage, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                policy.id.to_string(),
                policy.provider,
                policy.policy_number,
                policy.deductible.map(|m| m.to_string()),
                policy.dwelling_coverage.map(|m| m.to_string()),
                policy.personal_property_coverage.map(|m| m.to_string()),
                policy.loss_of_use_coverage.map(|m| m.to_string()),
                policy.liability_coverage.map(|m| m.to_string()),
                policy.medical_coverage.map(|m| m.to_string()),
                policy.start_date.map(|d| d.to_string()),
                policy.end_date.map(|d| d.to_string()),
            ],
        )?;
        for home_id in &policy.home_ids {
            tx.execute(
                "INSERT OR IGNORE INTO policy_homes (policy_id, home_id) VALUES (?1, ?2)",
                params![policy.id.to_string(), home_id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_homes(&self) -> Result<Vec<Home>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, address1, address2, city, state, postal_code, country, color, is_primary
             FROM homes ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Home {
                id: uuid_column(row, 0)?,
                name: row.get(1)?,
                address1: row.get(2)?,
                address2: row.get(3)?,
                city: row.get(4)?,
                state: row.get(5)?,
                postal_code: row.get(6)?,
                country: row.get(7)?,
                color: row.get(8)?,
                is_primary: row.get(9)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub fn fetch_locations(&self) -> Result<Vec<Location>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, symbol, home_id FROM locations ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Location {
                id: uuid_column(row, 0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                symbol: row.get(3)?,
                home_id: opt_uuid_column(row, 4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub fn fetch_labels(&self) -> Result<Vec<Label>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, color, home_id FROM labels ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Label {
                id: uuid_column(row, 0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                color: row.get(3)?,
                home_id: opt_uuid_column(row, 4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub fn fetch_items(&self) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, quantity, quantity_string, description, make, model,
                    serial_number, price, insured, notes, location_id, label_id, photo_path
             FROM items ORDER BY title",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Item {
                id: uuid_column(row, 0)?,
                title: row.get(1)?,
                quantity: row.get(2)?,
                quantity_string: row.get(3)?,
                description: row.get(4)?,
                make: row.get(5)?,
                model: row.get(6)?,
                serial_number: row.get(7)?,
                price: money_column(row, 8)?,
                insured: row.get(9)?,
                notes: row.get(10)?,
                location_id: opt_uuid_column(row, 11)?,
                label_id: opt_uuid_column(row, 12)?,
                photo_path: row.get(13)?,
            })
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub fn fetch_policies(&self) -> Result<Vec<InsurancePolicy>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, provider, policy_number, deductible, dwelling_coverage,
                    personal_property_coverage, loss_of_use_coverage, liability_coverage,
                    medical_coverage, start_date, end_date
             FROM insurance_policies ORDER BY provider",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(InsurancePolicy {
                id: uuid_column(row, 0)?,
                provider: row.get(1)?,
                policy_number: row.get(2)?,
                deductible: money_column(row, 3)?,
                dwelling_coverage: money_column(row, 4)?,
                personal_property_coverage: money_column(row, 5)?,
                loss_of_use_coverage: money_column(row, 6)?,
                liability_coverage: money_column(row, 7)?,
                medical_coverage: money_column(row, 8)?,
                start_date: date_column(row, 9)?,
                end_date: date_column(row, 10)?,
                home_ids: Vec::new(),
            })
        })?;
        let mut policies: Vec<InsurancePolicy> = rows.collect::<rusqlite::Result<_>>()?;

        let mut join = self
            .conn
            .prepare("SELECT home_id FROM policy_homes WHERE policy_id = ?1")?;
        for policy in &mut policies {
            let homes = join.query_map(params![policy.id.to_string()], |row| {
                uuid_column(row, 0)
            })?;
            policy.home_ids = homes.collect::<rusqlite::Result<_>>()?;
        }
        Ok(policies)
    }

    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let table = match kind {
            EntityKind::Home => "homes",
            EntityKind::Location => "locations",
            EntityKind::Label => "labels",
            EntityKind::Item => "items",
            EntityKind::InsurancePolicy => "insurance_policies",
        };
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn has_primary_home(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM homes WHERE is_primary = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Case-insensitive name lookup used by the CLI.
    pub fn find_location(&self, name: &str) -> Result<Option<Location>> {
        Ok(self
            .fetch_locations()?
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name)))
    }

    pub fn find_label(&self, name: &str) -> Result<Option<Label>> {
        Ok(self
            .fetch_labels()?
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name)))
    }

    pub fn find_home(&self, name: &str) -> Result<Option<Home>> {
        Ok(self
            .fetch_homes()?
            .into_iter()
            .find(|h| h.name.eq_ignore_ascii_case(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;

    fn open_temp() -> (tempfile::TempDir, InventoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::open(&dir.path().join(STORE_FILE)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_insert_and_fetch_item_roundtrip() {
        init_test_logging();
        let (_dir, store) = open_temp();

        let location = Location::new("Office");
        store.insert_location(&location).unwrap();

        let mut item = Item::new("Monitor");
        item.set_quantity(2);
        item.price = Some("349.99".parse().unwrap());
        item.location_id = Some(location.id);
        item.insured = true;
        store.insert_item(&item).unwrap();

        let fetched = store.fetch_items().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0], item);
    }

    #[test]
    fn test_policy_join_roundtrip() {
        init_test_logging();
        let (_dir, store) = open_temp();

        let home_a = Home::new("House");
        let home_b = Home::new("Cabin");
        store.insert_home(&home_a).unwrap();
        store.insert_home(&home_b).unwrap();

        let mut policy = InsurancePolicy::new("Acme Mutual");
        policy.deductible = Some("1000".parse().unwrap());
        policy.start_date = Some(chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        policy.home_ids = vec![home_a.id, home_b.id];
        store.insert_policy(&policy).unwrap();

        let fetched = store.fetch_policies().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].deductible, policy.deductible);
        assert_eq!(fetched[0].start_date, policy.start_date);
        let mut home_ids = fetched[0].home_ids.clone();
        home_ids.sort();
        let mut expected = policy.home_ids.clone();
        expected.sort();
        assert_eq!(home_ids, expected);
    }

    #[test]
    fn test_dangling_references_are_storable() {
        init_test_logging();
        let (_dir, store) = open_temp();

        // References are soft ids; an item may point at a location or
        // label the store has never seen.
        let mut item = Item::new("Orphan lamp");
        item.location_id = Some(Uuid::new_v4());
        item.label_id = Some(Uuid::new_v4());
        store.insert_item(&item).unwrap();

        let mut location = Location::new("Attic");
        location.home_id = Some(Uuid::new_v4());
        store.insert_location(&location).unwrap();

        let fetched = store.fetch_items().unwrap();
        assert_eq!(fetched[0].location_id, item.location_id);
        assert_eq!(fetched[0].label_id, item.label_id);
    }

    #[test]
    fn test_counts_per_kind() {
        init_test_logging();
        let (_dir, store) = open_temp();
        store.insert_home(&Home::new("House")).unwrap();
        store.insert_item(&Item::new("Chair")).unwrap();
        store.insert_item(&Item::new("Table")).unwrap();

        assert_eq!(store.count(EntityKind::Home).unwrap(), 1);
        assert_eq!(store.count(EntityKind::Item).unwrap(), 2);
        assert_eq!(store.count(EntityKind::Label).unwrap(), 0);
    }

    #[test]
    fn test_reopen_preserves_data() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join(STORE_FILE);

        let store = InventoryStore::open(&db).unwrap();
        store.insert_item(&Item::new("Couch")).unwrap();
        drop(store);

        let store = InventoryStore::open(&db).unwrap();
        assert_eq!(store.count(EntityKind::Item).unwrap(), 1);
    }

    #[test]
    fn test_pending_restore_swapped_in_on_open() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join(STORE_FILE);

        let store = InventoryStore::open(&db).unwrap();
        store.insert_item(&Item::new("Old")).unwrap();

        // Stage a copy with different contents as the pending restore.
        let pending = dir.path().join(PENDING_RESTORE_FILE);
        store.copy_database_to(&pending).unwrap();
        store.insert_item(&Item::new("Newer")).unwrap();
        assert_eq!(store.count(EntityKind::Item).unwrap(), 2);
        drop(store);

        let store = InventoryStore::open(&db).unwrap();
        assert_eq!(store.count(EntityKind::Item).unwrap(), 1);
        assert!(!pending.exists());
    }

    #[test]
    fn test_has_primary_home() {
        init_test_logging();
        let (_dir, store) = open_temp();
        assert!(!store.has_primary_home().unwrap());

        let mut home = Home::new("Main");
        home.is_primary = true;
        store.insert_home(&home).unwrap();
        assert!(store.has_primary_home().unwrap());
    }

    #[test]
    fn test_find_by_name_case_insensitive() {
        init_test_logging();
        let (_dir, store) = open_temp();
        store.insert_location(&Location::new("Garage")).unwrap();
        assert!(store.find_location("garage").unwrap().is_some());
        assert!(store.find_location("attic").unwrap().is_none());
    }
}
