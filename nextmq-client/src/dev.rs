use env_logger::Builder;
use std::io::Write;

/// Convenience function for setting up `env_logger` to see log messages.
///
/// The level comes from `RUST_LOG`. Calling it more than once is harmless, so tests can call it
/// freely.
pub fn setup_logger() {
    let mut builder = Builder::from_default_env();

    let _ = builder
        .format_timestamp_millis()
        .format(|buf, record| {
            let style = buf.default_level_style(record.level());

            writeln!(
                buf,
                "{} - [{style}{}{style:#}] {}:{} {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.args()
            )
        })
        .try_init();
}
