//! Whole-pool save and load.

use rusqlite::Connection;
use shroud_pool::PoolSnapshot;

use crate::queries::{economics, notes, nullifiers, params, vault};
use crate::{DbError, Result};

/// Write every record of `snapshot` in one transaction.
///
/// A failure rolls back, leaving the previously saved snapshot intact.
pub fn save_snapshot(conn: &mut Connection, snapshot: &PoolSnapshot) -> Result<()> {
    let tx = conn.transaction()?;
    params::save(&tx, &snapshot.params, snapshot.next_event_sequence)?;
    economics::save(&tx, &snapshot.economics)?;
    vault::save(&tx, &snapshot.vault)?;
    notes::save(&tx, &snapshot.notes)?;
    nullifiers::save(&tx, &snapshot.nullifiers)?;
    tx.commit()?;

    tracing::debug!(
        notes = snapshot.notes.leaves.len(),
        nullifier_records = snapshot.nullifiers.records.len(),
        balance = snapshot.vault.balance,
        "pool snapshot saved"
    );
    Ok(())
}

/// Read the saved snapshot, or `None` if nothing was saved yet.
///
/// # Errors
///
/// - [`DbError::Corrupt`] if some records are present and others missing
pub fn load_snapshot(conn: &Connection) -> Result<Option<PoolSnapshot>> {
    let Some((params, next_event_sequence)) = params::load(conn)? else {
        return Ok(None);
    };
    let missing = |what: &str| DbError::Corrupt(format!("{what} record missing"));

    Ok(Some(PoolSnapshot {
        params,
        economics: economics::load(conn)?.ok_or_else(|| missing("economic state"))?,
        vault: vault::load(conn)?.ok_or_else(|| missing("vault state"))?,
        notes: notes::load(conn)?.ok_or_else(|| missing("note tree"))?,
        nullifiers: nullifiers::load(conn)?.ok_or_else(|| missing("nullifier registry"))?,
        next_event_sequence,
    }))
}
