/// Shannons per CKB.
pub const CKB_UNIT: u64 = 100_000_000;

/// Denominator of the conversion fee, in hundred-thousandths.
pub const DEFAULT_FEE_BASE: u64 = 100_000;

/// Default minimum-match exponent; `1 << 33` shannons is roughly 86 CKB.
pub const DEFAULT_CKB_MIN_MATCH_LOG: u8 = 33;

/// Largest accepted minimum-match exponent.
pub const MAX_CKB_MIN_MATCH_LOG: u8 = 64;

/// Default transaction fee rate, shannons per 1000 bytes.
pub const DEFAULT_FEE_RATE: u64 = 1_000;

/// Default per-step allowance of the sequential matcher, 1000 CKB.
pub const DEFAULT_CKB_ALLOWANCE_STEP: u128 = 1_000 * CKB_UNIT as u128;

/// Serialized size of one transaction input, charged on top of the order
/// cell size when estimating the per-partial mining fee.
pub const INPUT_SIZE: u64 = 36;

/// Page size for on-chain cell searches.
pub const DEFAULT_FIND_CELLS_LIMIT: usize = 400;
