//! Process-wide tracing setup shared by binaries and tests.

/// Install the JSON subscriber (see [`tracing::init`]).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

pub mod tracing;

pub use self::tracing::{LogFormat, init_for_tests, init_with};
