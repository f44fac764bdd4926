//! Common test utilities for ensina-session integration tests

pub mod mock_store;

use std::sync::Once;

#[allow(unused_imports)]
pub use mock_store::{sample_user, MeOutcome, MockSessionStore};

static TRACING: Once = Once::new();

/// Install an env-filtered subscriber once per test binary.
///
/// `RUST_LOG=ensina_session=debug cargo test` surfaces the SDK's tracing
/// output through the test writer; without the variable the subscriber stays
/// silent.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
