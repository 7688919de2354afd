use anyhow::Result;
use casetime::cli::run_cli;
use tracing::error;

/// Timer ticks and debounced writes are cooperative tasks, one thread is enough.
fn main() -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async {
            run_cli().await.inspect_err(|e| {
                error!("Error running cli {e:?}");
            })
        })
}
