use super::StoreDb;
use crate::error::StoreError;
use crate::store::schema::mirrors::{self, dsl as mirrors_dsl};
use crate::store::{Mirror, MirrorStatus, NewMirror, Result, now_timestamp};
use diesel::prelude::*;

impl StoreDb {
    /// Provision a mirror unless one with the same name already exists.
    ///
    /// Existing rows are never overwritten so operator edits made through
    /// the API survive restarts. Returns true when a row was inserted.
    pub fn seed_mirror(&self, mirror: &NewMirror) -> Result<bool> {
        let mut conn = self.connection()?;
        let now = now_timestamp();
        let row = NewMirrorRow {
            name: &mirror.name,
            mirror_type: &mirror.mirror_type,
            upstream_url: &mirror.upstream_url,
            local_path: &mirror.local_path,
            enabled: mirror.enabled,
            status: MirrorStatus::Active.as_str(),
            created_at: now,
            updated_at: now,
        };

        let inserted = diesel::insert_or_ignore_into(mirrors::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(inserted > 0)
    }

    /// All mirrors ordered by name
    pub fn list_mirrors(&self) -> Result<Vec<Mirror>> {
        let mut conn = self.connection()?;
        let rows = mirrors_dsl::mirrors
            .order(mirrors_dsl::name.asc())
            .select(MirrorRow::as_select())
            .load::<MirrorRow>(&mut conn)?;

        rows.into_iter().map(Mirror::try_from).collect()
    }

    /// Mirrors included in fleet-wide runs, in id order
    pub fn enabled_mirrors(&self) -> Result<Vec<Mirror>> {
        let mut conn = self.connection()?;
        let rows = mirrors_dsl::mirrors
            .filter(mirrors_dsl::enabled.eq(true))
            .order(mirrors_dsl::id.asc())
            .select(MirrorRow::as_select())
            .load::<MirrorRow>(&mut conn)?;

        rows.into_iter().map(Mirror::try_from).collect()
    }

    pub fn get_mirror(&self, mirror_id: i64) -> Result<Option<Mirror>> {
        let mut conn = self.connection()?;
        let row = mirrors_dsl::mirrors
            .find(mirror_id)
            .select(MirrorRow::as_select())
            .first::<MirrorRow>(&mut conn)
            .optional()?;

        row.map(Mirror::try_from).transpose()
    }

    pub fn get_mirror_by_name(&self, name: &str) -> Result<Option<Mirror>> {
        let mut conn = self.connection()?;
        let row = mirrors_dsl::mirrors
            .filter(mirrors_dsl::name.eq(name))
            .select(MirrorRow::as_select())
            .first::<MirrorRow>(&mut conn)
            .optional()?;

        row.map(Mirror::try_from).transpose()
    }
}

// =========================================================================
// Row Types
// =========================================================================

#[derive(Queryable, Selectable)]
#[diesel(table_name = mirrors)]
pub(crate) struct MirrorRow {
    pub id: i64,
    pub name: String,
    pub mirror_type: String,
    pub upstream_url: String,
    pub local_path: String,
    pub enabled: bool,
    pub status: String,
    pub last_sync_started: Option<i64>,
    pub last_sync_completed: Option<i64>,
    pub last_sync_error: Option<String>,
    pub total_size_bytes: Option<i64>,
    pub file_count: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = mirrors)]
struct NewMirrorRow<'a> {
    name: &'a str,
    mirror_type: &'a str,
    upstream_url: &'a str,
    local_path: &'a str,
    enabled: bool,
    status: &'a str,
    created_at: i64,
    updated_at: i64,
}

/// Runtime-status columns owned by the scheduler.
///
/// `None` leaves a column untouched; `last_sync_error: Some(None)` clears it.
#[derive(AsChangeset, Default)]
#[diesel(table_name = mirrors)]
pub(crate) struct MirrorRuntimeChangeset {
    pub status: Option<String>,
    pub last_sync_started: Option<i64>,
    pub last_sync_completed: Option<i64>,
    pub last_sync_error: Option<Option<String>>,
    pub total_size_bytes: Option<i64>,
    pub file_count: Option<i64>,
    pub updated_at: Option<i64>,
}

impl TryFrom<MirrorRow> for Mirror {
    type Error = StoreError;

    fn try_from(row: MirrorRow) -> Result<Self> {
        let status = MirrorStatus::from_str(&row.status).ok_or(StoreError::Corrupt {
            column: "mirrors.status",
            value: row.status.clone(),
        })?;

        Ok(Mirror {
            id: row.id,
            name: row.name,
            mirror_type: row.mirror_type,
            upstream_url: row.upstream_url,
            local_path: row.local_path,
            enabled: row.enabled,
            status,
            last_sync_started: row.last_sync_started,
            last_sync_completed: row.last_sync_completed,
            last_sync_error: row.last_sync_error,
            total_size_bytes: row.total_size_bytes,
            file_count: row.file_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::migrated_store;
    use super::*;

    #[test]
    fn test_seed_mirror_keeps_operator_edits() {
        let (_dir, db) = migrated_store();
        let seed = NewMirror::new("freebsd", "freebsd", "rsync://a/FreeBSD/", "/data/FreeBSD");

        assert!(db.seed_mirror(&seed).unwrap());

        // Simulate an operator disabling the mirror and pointing it elsewhere
        let mut conn = db.connection().unwrap();
        diesel::update(mirrors_dsl::mirrors.filter(mirrors_dsl::name.eq("freebsd")))
            .set((
                mirrors_dsl::enabled.eq(false),
                mirrors_dsl::upstream_url.eq("rsync://b/FreeBSD/"),
            ))
            .execute(&mut conn)
            .unwrap();
        drop(conn);

        assert!(!db.seed_mirror(&seed).unwrap());

        let mirror = db.get_mirror_by_name("freebsd").unwrap().unwrap();
        assert!(!mirror.enabled);
        assert_eq!(mirror.upstream_url, "rsync://b/FreeBSD/");
        assert_eq!(mirror.status, MirrorStatus::Active);
    }

    #[test]
    fn test_enabled_mirrors_skips_disabled() {
        let (_dir, db) = migrated_store();
        db.seed_mirror(&NewMirror::new("freebsd", "freebsd", "rsync://f/", "/f"))
            .unwrap();
        db.seed_mirror(&NewMirror::new("netbsd", "netbsd", "rsync://n/", "/n").with_enabled(false))
            .unwrap();
        db.seed_mirror(&NewMirror::new("openbsd", "openbsd", "rsync://o/", "/o"))
            .unwrap();

        let names: Vec<_> = db
            .enabled_mirrors()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["freebsd", "openbsd"]);
        assert_eq!(db.list_mirrors().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_status_is_reported() {
        let (_dir, db) = migrated_store();
        db.seed_mirror(&NewMirror::new("freebsd", "freebsd", "rsync://f/", "/f"))
            .unwrap();

        let mut conn = db.connection().unwrap();
        diesel::update(mirrors_dsl::mirrors)
            .set(mirrors_dsl::status.eq("exploded"))
            .execute(&mut conn)
            .unwrap();
        drop(conn);

        assert!(matches!(
            db.list_mirrors(),
            Err(StoreError::Corrupt { column: "mirrors.status", .. })
        ));
    }
}
