//! Expiry sweeper: bounds registry growth.
//!
//! Each finalized record gets a deferred removal after the retention window.
//! Removal is unconditional; whether the report was delivered does not
//! matter, and there is no way to keep a record past the window. Callers
//! must tolerate not-found for ids they listed moments earlier.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::ResultRegistry;

/// Schedule removal of `id` from the registry after `retention`.
pub fn schedule_removal(registry: Arc<ResultRegistry>, id: String, retention: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        registry.remove(&id).await;
        debug!(test_id = %id, "expired test record swept");
    });
}
