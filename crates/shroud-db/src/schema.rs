//! SQL schema definitions.
//!
//! Amounts, counters and timestamps are `u64` stored bit-for-bit in
//! SQLite's signed INTEGER. Field elements and accounts are 32-byte BLOBs.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Pool parameters and economic guard
-- ============================================================

CREATE TABLE IF NOT EXISTS pool_params (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    base_fee_bps INTEGER NOT NULL,
    min_deposit INTEGER NOT NULL,
    max_deposit INTEGER NOT NULL,
    minimum_vault_reserve INTEGER NOT NULL,
    circuit_breaker_threshold INTEGER NOT NULL,
    hourly_withdrawal_limit INTEGER NOT NULL,
    next_event_sequence INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS economic_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    authority BLOB NOT NULL CHECK (length(authority) = 32),
    base_fee_bps INTEGER NOT NULL,
    active_multiplier INTEGER NOT NULL,
    pending_multiplier INTEGER,
    pending_activation_time INTEGER,
    pending_reason TEXT,
    emergency_since INTEGER,
    total_fees_collected INTEGER NOT NULL,
    total_volume INTEGER NOT NULL,
    window_start INTEGER NOT NULL,
    window_total INTEGER NOT NULL,
    CHECK ((pending_multiplier IS NULL) = (pending_activation_time IS NULL))
);

CREATE TABLE IF NOT EXISTS vault_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    balance INTEGER NOT NULL,
    minimum_reserve INTEGER NOT NULL,
    breaker_threshold INTEGER NOT NULL,
    breaker_trigger TEXT,
    breaker_tripped_at INTEGER,
    total_deposited INTEGER NOT NULL,
    total_paid_out INTEGER NOT NULL,
    total_fees_withdrawn INTEGER NOT NULL,
    deposit_count INTEGER NOT NULL,
    withdrawal_count INTEGER NOT NULL,
    CHECK ((breaker_trigger IS NULL) = (breaker_tripped_at IS NULL))
);

-- ============================================================
-- Note commitment tree
-- ============================================================

CREATE TABLE IF NOT EXISTS note_tree (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    height INTEGER NOT NULL,
    history_size INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS note_leaves (
    leaf_index INTEGER PRIMARY KEY,
    commitment BLOB NOT NULL CHECK (length(commitment) = 32)
);

-- Root history, oldest first
CREATE TABLE IF NOT EXISTS note_roots (
    position INTEGER PRIMARY KEY,
    root BLOB NOT NULL CHECK (length(root) = 32)
);

-- ============================================================
-- Nullifier registry
-- ============================================================

CREATE TABLE IF NOT EXISTS nullifier_registry (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    tree_height INTEGER NOT NULL,
    next_pending_index INTEGER NOT NULL,
    reclaimed INTEGER NOT NULL,
    current_epoch INTEGER NOT NULL,
    earliest_provable_epoch INTEGER NOT NULL,
    last_advance_time INTEGER NOT NULL,
    last_finalized_len INTEGER NOT NULL,
    min_epoch_secs INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nullifier_leaves (
    leaf_index INTEGER PRIMARY KEY,
    value BLOB NOT NULL UNIQUE CHECK (length(value) = 32),
    next_value BLOB NOT NULL CHECK (length(next_value) = 32),
    next_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nullifier_records (
    nullifier BLOB PRIMARY KEY CHECK (length(nullifier) = 32),
    spent_epoch INTEGER NOT NULL,
    spent_at INTEGER NOT NULL,
    pending_index INTEGER NOT NULL UNIQUE,
    state TEXT NOT NULL CHECK (state IN ('pending', 'committed')),
    leaf_index INTEGER,
    inserted_epoch INTEGER,
    CHECK ((state = 'committed') = (leaf_index IS NOT NULL AND inserted_epoch IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_nullifier_records_state ON nullifier_records(state);

CREATE TABLE IF NOT EXISTS epoch_roots (
    epoch INTEGER PRIMARY KEY,
    root BLOB NOT NULL CHECK (length(root) = 32)
);
"#;

/// Every table created by [`SCHEMA_V1`].
pub const TABLES: [&str; 10] = [
    "pool_params",
    "economic_state",
    "vault_state",
    "note_tree",
    "note_leaves",
    "note_roots",
    "nullifier_registry",
    "nullifier_leaves",
    "nullifier_records",
    "epoch_roots",
];
