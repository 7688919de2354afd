use tokio::select;
use tokio_util::sync::CancellationToken;

/// Waits for Ctrl-C and cancels the token, which is how a running `track` command gets stopped.
/// Returns early if something else cancels the token first.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}
