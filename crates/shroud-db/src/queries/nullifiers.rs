//! Nullifier registry: indexed tree leaves, transient records and epoch
//! roots.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use shroud_nullifier::epoch::EpochLedger;
use shroud_nullifier::{IndexedLeaf, NullifierRecord, RecordState, RegistrySnapshot};

use crate::{bytes32, DbError, Result};

/// Replace the stored registry.
pub fn save(conn: &Connection, registry: &RegistrySnapshot) -> Result<()> {
    let epochs = &registry.epochs;
    conn.execute(
        "INSERT OR REPLACE INTO nullifier_registry (
             id, tree_height, next_pending_index, reclaimed, current_epoch,
             earliest_provable_epoch, last_advance_time, last_finalized_len, min_epoch_secs
         ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            registry.tree_height,
            registry.next_pending_index as i64,
            registry.reclaimed as i64,
            epochs.current_epoch() as i64,
            epochs.earliest_provable_epoch() as i64,
            epochs.last_advance_time() as i64,
            epochs.last_finalized_len() as i64,
            epochs.min_epoch_secs() as i64,
        ],
    )?;

    conn.execute("DELETE FROM nullifier_leaves", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO nullifier_leaves (leaf_index, value, next_value, next_index)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (index, leaf) in registry.leaves.iter().enumerate() {
        stmt.execute(rusqlite::params![
            index as i64,
            leaf.value.as_slice(),
            leaf.next_value.as_slice(),
            leaf.next_index as i64,
        ])?;
    }

    conn.execute("DELETE FROM nullifier_records", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO nullifier_records (
             nullifier, spent_epoch, spent_at, pending_index, state, leaf_index, inserted_epoch
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for record in &registry.records {
        let (state, leaf_index, inserted_epoch) = match record.state {
            RecordState::Pending => ("pending", None, None),
            RecordState::Committed {
                leaf_index,
                inserted_epoch,
            } => (
                "committed",
                Some(leaf_index as i64),
                Some(inserted_epoch as i64),
            ),
        };
        stmt.execute(rusqlite::params![
            record.nullifier.as_slice(),
            record.spent_epoch as i64,
            record.spent_at as i64,
            record.pending_index as i64,
            state,
            leaf_index,
            inserted_epoch,
        ])?;
    }

    conn.execute("DELETE FROM epoch_roots", [])?;
    let mut stmt = conn.prepare("INSERT INTO epoch_roots (epoch, root) VALUES (?1, ?2)")?;
    for (epoch, root) in epochs.roots() {
        stmt.execute(rusqlite::params![*epoch as i64, root.as_slice()])?;
    }
    Ok(())
}

/// Number of spent nullifiers still held as transient records.
pub fn record_count(conn: &Connection) -> Result<u64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM nullifier_records", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Number of records still waiting for a batch commit.
pub fn pending_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM nullifier_records WHERE state = 'pending'",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// The stored registry, if any.
pub fn load(conn: &Connection) -> Result<Option<RegistrySnapshot>> {
    let header = conn
        .query_row(
            "SELECT tree_height, next_pending_index, reclaimed, current_epoch,
                    earliest_provable_epoch, last_advance_time, last_finalized_len,
                    min_epoch_secs
             FROM nullifier_registry WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, u8>(0)?,
                    [
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, i64>(3)? as u64,
                        row.get::<_, i64>(4)? as u64,
                        row.get::<_, i64>(5)? as u64,
                        row.get::<_, i64>(6)? as u64,
                        row.get::<_, i64>(7)? as u64,
                    ],
                ))
            },
        )
        .optional()?;
    let Some((tree_height, cursors)) = header else {
        return Ok(None);
    };
    let [next_pending_index, reclaimed, current_epoch, earliest_provable_epoch, last_advance_time, last_finalized_len, min_epoch_secs] =
        cursors;

    let mut stmt = conn.prepare(
        "SELECT value, next_value, next_index FROM nullifier_leaves ORDER BY leaf_index",
    )?;
    let leaves = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(value, next_value, next_index)| {
            Ok(IndexedLeaf {
                value: bytes32(value, "nullifier leaf")?,
                next_value: bytes32(next_value, "nullifier leaf link")?,
                next_index,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT nullifier, spent_epoch, spent_at, pending_index, state, leaf_index, inserted_epoch
         FROM nullifier_records ORDER BY pending_index",
    )?;
    let records = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, i64>(3)? as u64,
                row.get::<_, String>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(
            |(nullifier, spent_epoch, spent_at, pending_index, state, leaf_index, inserted_epoch)| {
                let state = match (state.as_str(), leaf_index, inserted_epoch) {
                    ("pending", None, None) => RecordState::Pending,
                    ("committed", Some(leaf_index), Some(inserted_epoch)) => {
                        RecordState::Committed {
                            leaf_index: leaf_index as u64,
                            inserted_epoch: inserted_epoch as u64,
                        }
                    }
                    (other, ..) => {
                        return Err(DbError::Corrupt(format!(
                            "nullifier record in state {other:?} with mismatched columns"
                        )))
                    }
                };
                Ok(NullifierRecord {
                    nullifier: bytes32(nullifier, "nullifier")?,
                    spent_epoch,
                    spent_at,
                    pending_index,
                    state,
                })
            },
        )
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare("SELECT epoch, root FROM epoch_roots ORDER BY epoch")?;
    let roots = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, Vec<u8>>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(epoch, root)| Ok((epoch, bytes32(root, "epoch root")?)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let epochs = EpochLedger::from_parts(
        current_epoch,
        earliest_provable_epoch,
        last_advance_time,
        last_finalized_len,
        min_epoch_secs,
        roots,
    )
    .map_err(|e| DbError::Corrupt(e.to_string()))?;

    Ok(Some(RegistrySnapshot {
        tree_height,
        leaves,
        records,
        next_pending_index,
        reclaimed,
        epochs,
    }))
}
