//! Vault balance, breaker latch and running totals.

use rusqlite::{Connection, OptionalExtension};
use shroud_guard::{BreakerTrip, CircuitBreaker, VaultState};
use shroud_types::events::BreakerTrigger;

use crate::{DbError, Result};

/// Breaker triggers are stored under their serde names.
fn trigger_name(trigger: BreakerTrigger) -> Result<String> {
    match serde_json::to_value(trigger) {
        Ok(serde_json::Value::String(name)) => Ok(name),
        Ok(other) => Err(DbError::Serialization(format!(
            "breaker trigger serialized as {other}"
        ))),
        Err(e) => Err(DbError::Serialization(e.to_string())),
    }
}

fn parse_trigger(name: String) -> Result<BreakerTrigger> {
    serde_json::from_value(serde_json::Value::String(name))
        .map_err(|e| DbError::Corrupt(format!("breaker trigger: {e}")))
}

/// Replace the stored vault state.
pub fn save(conn: &Connection, vault: &VaultState) -> Result<()> {
    let trip = vault.breaker.trip_record();
    let trigger = trip.map(|t| trigger_name(t.trigger)).transpose()?;
    conn.execute(
        "INSERT OR REPLACE INTO vault_state (
             id, balance, minimum_reserve, breaker_threshold, breaker_trigger,
             breaker_tripped_at, total_deposited, total_paid_out, total_fees_withdrawn,
             deposit_count, withdrawal_count
         ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            vault.balance as i64,
            vault.minimum_reserve as i64,
            vault.breaker.threshold() as i64,
            trigger,
            trip.map(|t| t.tripped_at as i64),
            vault.total_deposited as i64,
            vault.total_paid_out as i64,
            vault.total_fees_withdrawn as i64,
            vault.deposit_count as i64,
            vault.withdrawal_count as i64,
        ],
    )?;
    Ok(())
}

/// The stored vault state, if any.
pub fn load(conn: &Connection) -> Result<Option<VaultState>> {
    let row = conn
        .query_row(
            "SELECT balance, minimum_reserve, breaker_threshold, breaker_trigger,
                    breaker_tripped_at, total_deposited, total_paid_out,
                    total_fees_withdrawn, deposit_count, withdrawal_count
             FROM vault_state WHERE id = 1",
            [],
            |row| {
                Ok((
                    [
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                    ],
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    [
                        row.get::<_, i64>(5)? as u64,
                        row.get::<_, i64>(6)? as u64,
                        row.get::<_, i64>(7)? as u64,
                        row.get::<_, i64>(8)? as u64,
                        row.get::<_, i64>(9)? as u64,
                    ],
                ))
            },
        )
        .optional()?;

    let Some(([balance, minimum_reserve, threshold], trigger, tripped_at, totals)) = row else {
        return Ok(None);
    };
    let trip = match (trigger, tripped_at) {
        (Some(name), Some(at)) => Some(BreakerTrip {
            trigger: parse_trigger(name)?,
            tripped_at: at as u64,
        }),
        (None, None) => None,
        _ => return Err(DbError::Corrupt("breaker trigger without trip time".into())),
    };
    let [total_deposited, total_paid_out, total_fees_withdrawn, deposit_count, withdrawal_count] =
        totals;

    Ok(Some(VaultState {
        balance,
        minimum_reserve,
        breaker: CircuitBreaker::from_parts(threshold, trip),
        total_deposited,
        total_paid_out,
        total_fees_withdrawn,
        deposit_count,
        withdrawal_count,
    }))
}
