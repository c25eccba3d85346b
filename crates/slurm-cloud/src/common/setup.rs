use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use env_logger::{DEFAULT_FILTER_ENV, Target};
use log::LevelFilter;

/// Sets the behavior of the logger, based on passed environment variables
/// such as `RUST_LOG`.
///
/// Every line is prefixed with `hook`, because Slurm hook output usually ends up interleaved
/// with other programs in a single log file.
pub fn setup_logging(
    hook: &'static str,
    verbose: bool,
    log_file: Option<&Path>,
) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::default();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    let has_debug = std::env::var(DEFAULT_FILTER_ENV)
        .map(|v| v.contains("debug"))
        .unwrap_or(false);

    if verbose || has_debug {
        builder.format(move |buf, record| {
            writeln!(
                buf,
                "{} {hook}[{}] {} {}: {}",
                buf.timestamp_millis(),
                std::process::id(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    } else {
        // Shortened format
        // <time> <hook> <level> <message>
        builder.format(move |buf, record| {
            let level_style = buf.default_level_style(record.level()).bold();
            writeln!(
                buf,
                "{} {hook}: {level_style}{}{level_style:#} {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        });
    }

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
    }

    // Overwrite the defaults from env
    builder.parse_default_env();
    builder.init();
    Ok(())
}
