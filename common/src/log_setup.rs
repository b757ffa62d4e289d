use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

/// Starts the process-wide logger.
///
/// Everything is written to rotating files under `logs/`, duplicated to stdout,
/// and warnings additionally go to stderr. The returned handle must be kept
/// alive for the lifetime of the program.
pub fn setup_logging(base_level: &str) -> anyhow::Result<LoggerHandle> {
    let handle = Logger::try_with_str(base_level)?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .basename("myosoft"),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .duplicate_to_stdout(Duplicate::All)
        .rotate(
            Criterion::Size(1024 * 1024), //1MB
            Naming::Timestamps,
            Cleanup::KeepLogFiles(5),
        )
        .start()?;

    Ok(handle)
}
