//! Logging configuration of the node.
use std::fmt;
use std::panic::Location;
use std::panic::PanicInfo;

use backtrace::Backtrace;
use clap::ValueEnum;
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::filter;
use tracing_subscriber::fmt as fmt_layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(val: LogLevel) -> Self {
        match val {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            x => Err(crate::error::Error::InvalidLoggingLevel(x.to_string())),
        }
    }
}

/// Panic location
#[derive(Debug, Clone)]
struct PanicLocation {
    file: String,
    line: u32,
    column: u32,
}

impl From<&Location<'_>> for PanicLocation {
    fn from(lo: &Location<'_>) -> Self {
        Self {
            file: lo.file().to_string(),
            line: lo.line(),
            column: lo.column(),
        }
    }
}

impl fmt::Display for PanicLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Necessary information for recording panic
struct PanicData<'a> {
    message: &'a PanicInfo<'a>,
    backtrace: String,
    location: Option<PanicLocation>,
}

impl<'a> From<&'a PanicInfo<'a>> for PanicData<'a> {
    fn from(panic: &'a PanicInfo<'a>) -> PanicData<'a> {
        PanicData {
            message: panic,
            backtrace: format!("{:?}", Backtrace::new()),
            location: panic.location().map(PanicLocation::from),
        }
    }
}

impl<'a> fmt::Display for PanicData<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(l) => write!(f, "{}, {} \n\n {}", self.message, l, self.backtrace),
            None => write!(f, "{} \n\n {}", self.message, self.backtrace),
        }
    }
}

/// Record panics as `ERROR` events, inside the span that was current when they happened.
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let data = PanicData::from(panic);
        tracing::error!("{}", data)
    }));
}

/// Install the stderr subscriber and the panic hook. Calling it twice is harmless.
pub fn init_logging(level: LogLevel) {
    set_panic_hook();

    let level_filter = filter::LevelFilter::from_level(level.into());
    let subscriber = Registry::default().with(
        fmt_layer::layer()
            .with_writer(std::io::stderr)
            .with_filter(level_filter),
    );

    // Bridge `log` records, ignoring a bridge that is already set.
    let _ = LogTracer::init();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
