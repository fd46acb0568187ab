//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Plan requested when no override is provided.
pub const DEFAULT_PLAN: &str = "94";

/// Region requested when no override is provided.
pub const DEFAULT_REGION: &str = "EU-East-1";

/// Image requested when no override is provided.
pub const DEFAULT_IMAGE: &str = "Ubuntu 16.04 64bit";
