//! Forward-only schema migrations keyed on `PRAGMA user_version`.
//!
//! Each step runs in its own transaction together with the version bump,
//! so an interrupted upgrade leaves the database at the last completed
//! version.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Migration steps, indexed by the version they produce.
const STEPS: &[(u32, &str)] = &[(1, schema::SCHEMA_V1)];

/// The schema version recorded in the database file.
pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// # Errors
///
/// - [`DbError::Migration`] if the file was written by a newer release or a
///   step is missing
pub fn run(conn: &mut Connection) -> Result<()> {
    let from = current_version(conn)?;
    if from > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema v{from} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    for version in (from + 1)..=SCHEMA_VERSION {
        let sql = STEPS
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, sql)| *sql)
            .ok_or_else(|| DbError::Migration(format!("no migration to v{version}")))?;

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(from, to = version, "pool database migrated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .expect("sqlite_master")
            == 1
    }

    #[test]
    fn test_fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().expect("open");
        assert_eq!(current_version(&conn).expect("version"), 0);
        run(&mut conn).expect("migrate");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);
        for table in schema::TABLES {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut conn = Connection::open_in_memory().expect("open");
        run(&mut conn).expect("first");
        run(&mut conn).expect("second");
        assert_eq!(current_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_database_refused() {
        let mut conn = Connection::open_in_memory().expect("open");
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("set version");
        assert!(matches!(run(&mut conn), Err(DbError::Migration(_))));
        assert!(!table_exists(&conn, "vault_state"));
    }

    #[test]
    fn test_steps_cover_every_version() {
        for version in 1..=SCHEMA_VERSION {
            assert!(STEPS.iter().any(|(v, _)| *v == version));
        }
    }
}
