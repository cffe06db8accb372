#![forbid(unsafe_code)]

//! Logger initialization for the binaries.

use std::io::Write;

use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

/// Chatty dependencies and the most verbose level they get by default.
const QUIET_MODULES: [(&str, LevelFilter); 4] = [
    ("reqwest", LevelFilter::Info),
    ("hyper", LevelFilter::Info),
    ("hyper_util", LevelFilter::Info),
    ("fantoccini", LevelFilter::Warn),
];

/// Installs `env_logger`. Chatty dependencies are quietened first, module
/// directives from `RUST_LOG` then replace those defaults, and `level` sets the
/// global filter last so `--log-level` always wins over a bare `RUST_LOG`.
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    let filters = std::env::var(env_logger::DEFAULT_FILTER_ENV).ok();
    let mut builder = builder(level, filters.as_deref());
    if let Ok(style) = std::env::var(env_logger::DEFAULT_WRITE_STYLE_ENV) {
        builder.parse_write_style(&style);
    }
    builder.try_init()
}

fn builder(level: LevelFilter, filters: Option<&str>) -> Builder {
    let mut builder = Builder::new();
    for (module, cap) in QUIET_MODULES {
        builder.filter_module(module, cap.min(level));
    }
    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}",
            chrono::Local::now().format("%H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    builder
}
