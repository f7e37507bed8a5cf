use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: level-tagged, timestamped lines on stdout.
///
/// The returned guard flushes buffered lines when dropped, so keep it alive for the
/// lifetime of the process.
pub fn init_tracing() -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("stock_watcher=info".parse()?),
        )
        .with_writer(writer)
        .with_target(false)
        .init();

    Ok(guard)
}
