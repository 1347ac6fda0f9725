//! Note tree leaves and root history.

use rusqlite::{Connection, OptionalExtension};
use shroud_pool::NoteTreeSnapshot;

use crate::{bytes32, Result};

/// Replace the stored note tree.
pub fn save(conn: &Connection, tree: &NoteTreeSnapshot) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO note_tree (id, height, history_size) VALUES (1, ?1, ?2)",
        rusqlite::params![tree.height, tree.history_size as i64],
    )?;

    conn.execute("DELETE FROM note_leaves", [])?;
    let mut stmt =
        conn.prepare("INSERT INTO note_leaves (leaf_index, commitment) VALUES (?1, ?2)")?;
    for (index, commitment) in tree.leaves.iter().enumerate() {
        stmt.execute(rusqlite::params![index as i64, commitment.as_slice()])?;
    }

    conn.execute("DELETE FROM note_roots", [])?;
    let mut stmt = conn.prepare("INSERT INTO note_roots (position, root) VALUES (?1, ?2)")?;
    for (position, root) in tree.roots.iter().enumerate() {
        stmt.execute(rusqlite::params![position as i64, root.as_slice()])?;
    }
    Ok(())
}

/// Number of stored note leaves.
pub fn leaf_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM note_leaves", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// The stored note tree, if any.
pub fn load(conn: &Connection) -> Result<Option<NoteTreeSnapshot>> {
    let header = conn
        .query_row(
            "SELECT height, history_size FROM note_tree WHERE id = 1",
            [],
            |row| Ok((row.get::<_, u8>(0)?, row.get::<_, i64>(1)? as usize)),
        )
        .optional()?;
    let Some((height, history_size)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT commitment FROM note_leaves ORDER BY leaf_index")?;
    let leaves = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|blob| bytes32(blob, "note commitment"))
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT root FROM note_roots ORDER BY position")?;
    let roots = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|blob| bytes32(blob, "note root"))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(NoteTreeSnapshot {
        height,
        history_size,
        leaves,
        roots,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(leaves: u8) -> NoteTreeSnapshot {
        NoteTreeSnapshot {
            height: 4,
            history_size: 3,
            leaves: (1..=leaves).map(|i| [i; 32]).collect(),
            roots: vec![[0xA1; 32], [0xA2; 32]],
        }
    }

    #[test]
    fn test_round_trip_and_overwrite() {
        let conn = crate::open_memory().expect("open test db");
        assert!(load(&conn).expect("load").is_none());

        save(&conn, &snapshot(5)).expect("save");
        save(&conn, &snapshot(3)).expect("overwrite");
        assert_eq!(leaf_count(&conn).expect("count"), 3);
        assert_eq!(load(&conn).expect("load"), Some(snapshot(3)));
    }
}
