//! Shared utilities for use cases.

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless cancellation fires first.
///
/// Returns `false` when cancelled.
pub(crate) async fn sleep_cancellable(
    duration: std::time::Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
