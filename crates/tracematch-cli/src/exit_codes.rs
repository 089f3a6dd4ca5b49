//! Exit codes of the `tracematch` binary. These are part of the public contract.

pub const OK: i32 = 0;
pub const TEST_FAILED: i32 = 1; // Actual trace does not match the expected trace
pub const CONFIG_ERROR: i32 = 2; // Unreadable or invalid config, expected or actual file
