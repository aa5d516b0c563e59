use std::io::Write;

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Level from the argument, then `RUST_LOG`, then `info`.
pub fn resolve_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|v| v.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info)
}

/// Install the global logger. A second call is a no-op, so tests can call
/// it freely.
pub fn init_logging(level: Option<&str>) {
    let log_level = resolve_level(level);
    let installed = Builder::new()
        .filter_level(log_level)
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if installed.is_ok() {
        log::debug!("Logging initialised at {}", log_level);
    }
}
