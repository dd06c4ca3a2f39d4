//! Interpreter parameters

/// Number of reserved argument aliases (`arg1` .. `argN`).
///
/// Alias calls bind at most this many positional arguments; the
/// compiler drops anything past the limit with explicit pops.
pub const MAX_ARGUMENTS: usize = 25;

/// Number of nested result contexts the compiler may flatten before it
/// falls back to a full VM re-entry for an inner expression.
pub const MAX_RESULTS: usize = 4;

/// Default limit for nested VM invocations.
pub const DEFAULT_MAX_RUN_DEPTH: usize = 1024;

/// Smallest integer literal that fits the 24-bit inline instruction
/// payload.
pub const INLINE_INT_MIN: i64 = -0x80_0000;

/// Largest integer literal that fits the 24-bit inline instruction
/// payload.
pub const INLINE_INT_MAX: i64 = 0x7F_FFFF;

/// Default number of call-stack frames captured into an error snapshot;
/// the `dbgalias` variable adjusts it at runtime.
pub const DEFAULT_DBGALIAS: i64 = 4;

/// Upper bound for `dbgalias`.
pub const MAX_DBGALIAS: i64 = 1000;

/// Name of the dummy identifier used where an ident operand is required
/// but none was given.
pub const DUMMY_NAME: &str = "//dummy";
