use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "graderd.sqlite3";
pub const APP_DATA_KEY: &str = "appData";
pub const ONBOARDING_KEY: &str = "hasSeenOnboarding";

/// Single-table key/value store. The whole application snapshot lives under
/// one key; there are no partial updates and no schema migrations.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Store> {
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("failed to create workspace {}", workspace.to_string_lossy())
        })?;
        let db_path = workspace.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
        Store::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Store> {
        Store::init(Connection::open_in_memory()?)
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn init(conn: Connection) -> anyhow::Result<Store> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Store { conn })
    }

    pub fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv_store(key, value, updated_at) VALUES(?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                (key, value, &now),
            )
            .with_context(|| format!("failed to write key {key}"))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let v = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| {
                r.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("failed to read key {key}"))?;
        Ok(v)
    }

    pub fn get_flag(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.map(|v| v == "true").unwrap_or(false))
    }

    pub fn set_flag(&self, key: &str, value: bool) -> anyhow::Result<()> {
        self.put(key, if value { "true" } else { "false" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overwrites_and_get_returns_latest() {
        let store = Store::open_in_memory().expect("store");
        assert_eq!(store.get(APP_DATA_KEY).expect("get"), None);
        store.put(APP_DATA_KEY, "{\"a\":1}").expect("put");
        store.put(APP_DATA_KEY, "{\"a\":2}").expect("put");
        assert_eq!(
            store.get(APP_DATA_KEY).expect("get").as_deref(),
            Some("{\"a\":2}")
        );
    }

    #[test]
    fn flags_default_to_false() {
        let store = Store::open_in_memory().expect("store");
        assert!(!store.get_flag(ONBOARDING_KEY).expect("flag"));
        store.set_flag(ONBOARDING_KEY, true).expect("set");
        assert!(store.get_flag(ONBOARDING_KEY).expect("flag"));
        assert_eq!(store.get(APP_DATA_KEY).expect("get"), None);
    }

    #[test]
    fn missing_table_surfaces_as_error() {
        let store = Store::open_in_memory().expect("store");
        store.conn().execute("DROP TABLE kv_store", []).expect("drop");
        assert!(store.get(APP_DATA_KEY).is_err());
        assert!(store.put(APP_DATA_KEY, "{}").is_err());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("graderd-db-{}", uuid::Uuid::new_v4()));
        {
            let store = Store::open(&dir).expect("open");
            store.put(APP_DATA_KEY, "persisted").expect("put");
        }
        let store = Store::open(&dir).expect("reopen");
        assert_eq!(
            store.get(APP_DATA_KEY).expect("get").as_deref(),
            Some("persisted")
        );
        let _ = std::fs::remove_dir_all(dir);
    }
}
