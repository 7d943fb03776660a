use super::StoreDb;
use crate::store::schema::settings::{self, dsl as settings_dsl};
use crate::store::{Result, SettingSeed, now_timestamp};
use diesel::prelude::*;
use std::collections::HashMap;

impl StoreDb {
    /// Insert default settings whose keys are not present yet.
    ///
    /// Returns how many rows were written; existing values are never touched.
    pub fn seed_settings(&self, seeds: &[SettingSeed]) -> Result<usize> {
        if seeds.is_empty() {
            return Ok(0);
        }

        let now = now_timestamp();
        let rows: Vec<NewSettingRow<'_>> = seeds
            .iter()
            .map(|seed| NewSettingRow {
                key: &seed.key,
                value: Some(&seed.value),
                description: Some(&seed.description),
                updated_at: now,
            })
            .collect();

        let mut conn = self.connection()?;
        let mut inserted = 0;
        for row in &rows {
            inserted += diesel::insert_or_ignore_into(settings::table)
                .values(row)
                .execute(&mut conn)?;
        }
        Ok(inserted)
    }

    /// Every setting as `key → value`; keys with a NULL value are omitted
    pub fn load_settings(&self) -> Result<HashMap<String, String>> {
        let mut conn = self.connection()?;
        let rows = settings_dsl::settings
            .select((settings_dsl::key, settings_dsl::value))
            .load::<(String, Option<String>)>(&mut conn)?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }

    /// Set a value, creating the key when absent
    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let now = now_timestamp();

        diesel::insert_into(settings::table)
            .values(NewSettingRow {
                key,
                value: Some(value),
                description: None,
                updated_at: now,
            })
            .on_conflict(settings_dsl::key)
            .do_update()
            .set((settings_dsl::value.eq(value), settings_dsl::updated_at.eq(now)))
            .execute(&mut conn)?;
        Ok(())
    }
}

#[derive(Insertable)]
#[diesel(table_name = settings)]
struct NewSettingRow<'a> {
    key: &'a str,
    value: Option<&'a str>,
    description: Option<&'a str>,
    updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::super::test_support::migrated_store;
    use super::*;

    #[test]
    fn test_seed_settings_does_not_overwrite() {
        let (_dir, db) = migrated_store();
        let seeds = vec![
            SettingSeed::new("sync_schedule", "0 4 * * *", "Cron expression"),
            SettingSeed::new("sync_timeout", "600", "Seconds"),
        ];

        assert_eq!(db.seed_settings(&seeds).unwrap(), 2);
        db.put_setting("sync_timeout", "900").unwrap();
        assert_eq!(db.seed_settings(&seeds).unwrap(), 0);

        let settings = db.load_settings().unwrap();
        assert_eq!(settings.get("sync_schedule").map(String::as_str), Some("0 4 * * *"));
        assert_eq!(settings.get("sync_timeout").map(String::as_str), Some("900"));
    }

    #[test]
    fn test_put_setting_creates_missing_key() {
        let (_dir, db) = migrated_store();
        db.put_setting("sync_bandwidth_limit", "500").unwrap();
        assert_eq!(
            db.load_settings().unwrap().get("sync_bandwidth_limit").map(String::as_str),
            Some("500")
        );
    }

    #[test]
    fn test_load_settings_fails_before_migration() {
        let dir = tempfile::tempdir().unwrap();
        let db = StoreDb::open(dir.path().join("fresh.db"), 1).unwrap();
        assert!(db.load_settings().is_err());
    }
}
