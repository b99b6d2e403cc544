//! Helpers shared by the command line front ends: clap styling, verbosity
//! flags and tracing setup.

use std::{io::Write, sync::Mutex};

pub use clap;
pub use clap_verbosity_flag as verbose;

/// Color scheme for `--help` output.
pub fn get_styles() -> clap::builder::Styles {
    use clap::builder::styling::{AnsiColor, Effects, Styles};
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Map the `-v`/`-q` count to a tracing level.
///
/// The default verbosity (errors only) still lets warnings through, each
/// extra `-v` unlocks one more level.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr unless `file` is given, in which case they are written
/// to it as JSON lines.
pub fn logging_setup<W>(level: &tracing::Level, file: Option<W>)
where
    W: Write + Send + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false);
    match file {
        Some(file) => builder
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}
