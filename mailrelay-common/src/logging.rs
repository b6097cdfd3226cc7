use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Compact,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format {other}")),
        }
    }
}

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Resolve the level filter from the value of `LOG_LEVEL`, if any
pub fn level_from(value: Option<&str>) -> LevelFilter {
    let default = default_level();

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Resolve the output format from the value of `LOG_FORMAT`, if any
pub fn format_from(value: Option<&str>) -> Format {
    value.map_or_else(Format::default, |format| {
        format.parse().unwrap_or_else(|e| {
            eprintln!("{e}, defaulting to compact output");
            Format::default()
        })
    })
}

fn only_mailrelay() -> FilterFn {
    FilterFn::new(|metadata| metadata.target().starts_with("mailrelay"))
}

/// Install the global subscriber.
///
/// Reads `LOG_LEVEL` and `LOG_FORMAT` from the environment. Only events from
/// `mailrelay*` targets are emitted.
pub fn init() {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref());
    let format = format_from(std::env::var("LOG_FORMAT").ok().as_deref());

    let registry = tracing_subscriber::Registry::default();

    match format {
        Format::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
                    .compact()
                    .with_ansi(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_filter(level)
                    .with_filter(only_mailrelay()),
            )
            .init(),
        Format::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_filter(level)
                    .with_filter(only_mailrelay()),
            )
            .init(),
    }
}
