//! SQLite persistence layer.
//!
//! Stores per-channel command prefixes and per-user homework profiles.
//! Uses WAL mode so a file-backed database tolerates concurrent readers.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};

/// Name and topic used to file downloaded homework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeworkProfile {
    pub fullname: String,
    pub topic: String,
}

/// Database handle wrapping a SQLite connection.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self { conn: Mutex::new(conn) };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> SqlResult<()> {
        self.conn.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS prefixes (
                id      TEXT PRIMARY KEY,
                prefix  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS homework (
                id        TEXT PRIMARY KEY,
                fullname  TEXT NOT NULL,
                topic     TEXT NOT NULL
            );
            ",
        )
    }

    // ── Prefixes ────────────────────────────────────────────────────

    /// Custom prefix for a channel, if one was set.
    pub fn prefix(&self, channel: &str) -> SqlResult<Option<String>> {
        self.conn
            .lock()
            .query_row(
                "SELECT prefix FROM prefixes WHERE id = ?1",
                params![channel.to_lowercase()],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set_prefix(&self, channel: &str, prefix: &str) -> SqlResult<()> {
        self.conn.lock().execute(
            "INSERT INTO prefixes (id, prefix) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET prefix = excluded.prefix",
            params![channel.to_lowercase(), prefix],
        )?;
        Ok(())
    }

    /// Drop a channel's custom prefix. Returns whether one existed.
    pub fn clear_prefix(&self, channel: &str) -> SqlResult<bool> {
        let n = self.conn.lock().execute(
            "DELETE FROM prefixes WHERE id = ?1",
            params![channel.to_lowercase()],
        )?;
        Ok(n > 0)
    }

    // ── Homework ────────────────────────────────────────────────────

    pub fn homework(&self, user: &str) -> SqlResult<Option<HomeworkProfile>> {
        self.conn
            .lock()
            .query_row(
                "SELECT fullname, topic FROM homework WHERE id = ?1",
                params![user.to_lowercase()],
                |row| {
                    Ok(HomeworkProfile {
                        fullname: row.get(0)?,
                        topic: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn set_homework(&self, user: &str, fullname: &str, topic: &str) -> SqlResult<()> {
        self.conn.lock().execute(
            "INSERT INTO homework (id, fullname, topic) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET fullname = excluded.fullname, topic = excluded.topic",
            params![user.to_lowercase(), fullname, topic],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_roundtrip() {
        let db = Db::open_memory().unwrap();
        assert_eq!(db.prefix("#math").unwrap(), None);

        db.set_prefix("#math", "!").unwrap();
        assert_eq!(db.prefix("#math").unwrap().as_deref(), Some("!"));

        db.set_prefix("#math", "guh ").unwrap();
        assert_eq!(db.prefix("#math").unwrap().as_deref(), Some("guh "));
    }

    #[test]
    fn prefix_lookup_ignores_channel_case() {
        let db = Db::open_memory().unwrap();
        db.set_prefix("#Math", "$").unwrap();
        assert_eq!(db.prefix("#math").unwrap().as_deref(), Some("$"));
    }

    #[test]
    fn clear_prefix() {
        let db = Db::open_memory().unwrap();
        assert!(!db.clear_prefix("#math").unwrap());
        db.set_prefix("#math", "!").unwrap();
        assert!(db.clear_prefix("#math").unwrap());
        assert_eq!(db.prefix("#math").unwrap(), None);
    }

    #[test]
    fn prefixes_are_per_channel() {
        let db = Db::open_memory().unwrap();
        db.set_prefix("#a", "!").unwrap();
        db.set_prefix("#b", "?").unwrap();
        assert_eq!(db.prefix("#a").unwrap().as_deref(), Some("!"));
        assert_eq!(db.prefix("#b").unwrap().as_deref(), Some("?"));
    }

    #[test]
    fn homework_upsert() {
        let db = Db::open_memory().unwrap();
        assert_eq!(db.homework("alice").unwrap(), None);

        db.set_homework("alice", "Alice Liddell", "Algebra").unwrap();
        db.set_homework("Alice", "Alice L.", "Geometry").unwrap();

        assert_eq!(
            db.homework("alice").unwrap(),
            Some(HomeworkProfile {
                fullname: "Alice L.".to_string(),
                topic: "Geometry".to_string(),
            })
        );
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harper.db");
        {
            let db = Db::open(&path).unwrap();
            db.set_prefix("#math", "!").unwrap();
        }
        let db = Db::open(&path).unwrap();
        assert_eq!(db.prefix("#math").unwrap().as_deref(), Some("!"));
    }
}
