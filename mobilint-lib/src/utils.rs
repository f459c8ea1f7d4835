use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` if the sleep was cut short.
pub(crate) async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
