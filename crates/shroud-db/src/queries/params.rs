//! Pool parameters and the event sequence cursor.

use rusqlite::{Connection, OptionalExtension};
use shroud_guard::GuardParams;

use crate::Result;

/// Replace the stored parameters.
pub fn save(conn: &Connection, params: &GuardParams, next_event_sequence: u64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pool_params (
             id, base_fee_bps, min_deposit, max_deposit, minimum_vault_reserve,
             circuit_breaker_threshold, hourly_withdrawal_limit, next_event_sequence
         ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            params.base_fee_bps as i64,
            params.min_deposit as i64,
            params.max_deposit as i64,
            params.minimum_vault_reserve as i64,
            params.circuit_breaker_threshold as i64,
            params.hourly_withdrawal_limit as i64,
            next_event_sequence as i64,
        ],
    )?;
    Ok(())
}

/// Stored parameters and event cursor, or `None` for a fresh database.
pub fn load(conn: &Connection) -> Result<Option<(GuardParams, u64)>> {
    let row = conn
        .query_row(
            "SELECT base_fee_bps, min_deposit, max_deposit, minimum_vault_reserve,
                    circuit_breaker_threshold, hourly_withdrawal_limit, next_event_sequence
             FROM pool_params WHERE id = 1",
            [],
            |row| {
                Ok((
                    GuardParams {
                        base_fee_bps: row.get::<_, i64>(0)? as u64,
                        min_deposit: row.get::<_, i64>(1)? as u64,
                        max_deposit: row.get::<_, i64>(2)? as u64,
                        minimum_vault_reserve: row.get::<_, i64>(3)? as u64,
                        circuit_breaker_threshold: row.get::<_, i64>(4)? as u64,
                        hourly_withdrawal_limit: row.get::<_, i64>(5)? as u64,
                    },
                    row.get::<_, i64>(6)? as u64,
                ))
            },
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_database() {
        let conn = crate::open_memory().expect("open test db");
        assert!(load(&conn).expect("load").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let conn = crate::open_memory().expect("open test db");
        let params = GuardParams {
            max_deposit: u64::MAX,
            hourly_withdrawal_limit: 0,
            ..GuardParams::default()
        };
        save(&conn, &params, 17).expect("save");
        save(&conn, &params, 18).expect("overwrite");

        let (loaded, sequence) = load(&conn).expect("load").expect("present");
        assert_eq!(loaded, params);
        assert_eq!(sequence, 18);
    }
}
