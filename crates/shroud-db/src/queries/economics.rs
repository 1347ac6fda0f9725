//! Economic state: authority, multiplier schedule, accumulators and the
//! hourly window.

use rusqlite::{Connection, OptionalExtension};
use shroud_guard::{EconomicState, MultiplierSchedule, PendingMultiplier, WithdrawalWindow};
use shroud_types::AccountId;

use crate::{bytes32, DbError, Result};

/// Replace the stored economic state.
pub fn save(conn: &Connection, state: &EconomicState) -> Result<()> {
    let pending = state.multiplier.pending();
    conn.execute(
        "INSERT OR REPLACE INTO economic_state (
             id, authority, base_fee_bps, active_multiplier, pending_multiplier,
             pending_activation_time, pending_reason, emergency_since,
             total_fees_collected, total_volume, window_start, window_total
         ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            state.authority.as_bytes().as_slice(),
            state.base_fee_bps as i64,
            state.multiplier.active() as i64,
            pending.map(|p| p.multiplier as i64),
            pending.map(|p| p.activation_time as i64),
            pending.map(|p| p.reason.as_str()),
            state.emergency_since.map(|t| t as i64),
            state.total_fees_collected as i64,
            state.total_volume as i64,
            state.withdrawal_window.window_start as i64,
            state.withdrawal_window.window_total as i64,
        ],
    )?;
    Ok(())
}

struct EconomicRow {
    authority: Vec<u8>,
    base_fee_bps: i64,
    active_multiplier: i64,
    pending_multiplier: Option<i64>,
    pending_activation_time: Option<i64>,
    pending_reason: Option<String>,
    emergency_since: Option<i64>,
    total_fees_collected: i64,
    total_volume: i64,
    window_start: i64,
    window_total: i64,
}

/// The stored economic state, if any.
pub fn load(conn: &Connection) -> Result<Option<EconomicState>> {
    let row = conn
        .query_row(
            "SELECT authority, base_fee_bps, active_multiplier, pending_multiplier,
                    pending_activation_time, pending_reason, emergency_since,
                    total_fees_collected, total_volume, window_start, window_total
             FROM economic_state WHERE id = 1",
            [],
            |row| {
                Ok(EconomicRow {
                    authority: row.get(0)?,
                    base_fee_bps: row.get(1)?,
                    active_multiplier: row.get(2)?,
                    pending_multiplier: row.get(3)?,
                    pending_activation_time: row.get(4)?,
                    pending_reason: row.get(5)?,
                    emergency_since: row.get(6)?,
                    total_fees_collected: row.get(7)?,
                    total_volume: row.get(8)?,
                    window_start: row.get(9)?,
                    window_total: row.get(10)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let pending = match (row.pending_multiplier, row.pending_activation_time) {
        (Some(multiplier), Some(activation_time)) => Some(PendingMultiplier {
            multiplier: multiplier as u64,
            activation_time: activation_time as u64,
            reason: row.pending_reason.unwrap_or_default(),
        }),
        (None, None) => None,
        _ => {
            return Err(DbError::Corrupt(
                "pending multiplier without activation time".into(),
            ))
        }
    };
    let multiplier = MultiplierSchedule::from_parts(row.active_multiplier as u64, pending)
        .map_err(|e| DbError::Corrupt(e.to_string()))?;

    Ok(Some(EconomicState {
        authority: AccountId::new(bytes32(row.authority, "authority")?),
        base_fee_bps: row.base_fee_bps as u64,
        multiplier,
        emergency_since: row.emergency_since.map(|t| t as u64),
        total_fees_collected: row.total_fees_collected as u64,
        total_volume: row.total_volume as u64,
        withdrawal_window: WithdrawalWindow {
            window_start: row.window_start as u64,
            window_total: row.window_total as u64,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn state() -> EconomicState {
        EconomicState::new(AccountId::new([3u8; 32]), 25).expect("state")
    }

    #[test]
    fn test_round_trip_without_pending() {
        let conn = test_db();
        let mut state = state();
        state.total_fees_collected = 42;
        state.total_volume = 9_000;
        save(&conn, &state).expect("save");
        assert_eq!(load(&conn).expect("load"), Some(state));
    }

    #[test]
    fn test_round_trip_with_emergency() {
        let conn = test_db();
        let mut state = state();
        let authority = state.authority;
        state
            .trigger_emergency_mode(&authority, 4, "drain", 1_000)
            .expect("trigger");
        state.withdrawal_window = WithdrawalWindow {
            window_start: 900,
            window_total: 77,
        };
        save(&conn, &state).expect("save");

        let loaded = load(&conn).expect("load").expect("present");
        assert_eq!(loaded, state);
        assert_eq!(loaded.multiplier.pending().map(|p| p.reason.as_str()), Some("drain"));
        assert_eq!(loaded.emergency_since, Some(1_000));
    }

    #[test]
    fn test_invalid_multiplier_is_corrupt() {
        let conn = test_db();
        save(&conn, &state()).expect("save");
        conn.execute("UPDATE economic_state SET active_multiplier = 0", [])
            .expect("tamper");
        assert!(matches!(load(&conn), Err(DbError::Corrupt(_))));
    }
}
