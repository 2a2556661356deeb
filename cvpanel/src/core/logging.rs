use env_logger::{Builder, Env};
use log::{Level, LevelFilter, Record};
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

pub use log::{debug, error, info, trace, warn};

/// Installs the coloured stderr logger. `RUST_LOG` overrides the default
/// filter. Safe to call more than once.
pub fn init_logger() {
    let env = Env::default().default_filter_or("cvpanel=info,panels=info");
    let mut builder = Builder::from_env(env);
    builder.filter_module("midir", LevelFilter::Warn);

    builder.format(|_buf, record| {
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut line = stderr.buffer();

        let now = chrono::Local::now().format("%H:%M:%S%.3f");
        write!(line, "{} ", now)?;
        line.set_color(ColorSpec::new().set_fg(Some(level_color(record))))?;
        write!(line, "{:<5}", record.level())?;
        line.reset()?;

        let target = record.module_path().unwrap_or(record.target());
        writeln!(line, " {}: {}", short_target(target), record.args())?;
        stderr.print(&line)
    });

    let _ = builder.try_init();
}

fn level_color(record: &Record) -> Color {
    match record.level() {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Blue,
        Level::Trace => Color::Cyan,
    }
}

/// `cvpanel::render::scheduler` => `render::scheduler`
fn short_target(target: &str) -> &str {
    match target.split_once("::") {
        Some(("cvpanel" | "panels", rest)) => rest,
        _ => target,
    }
}

/// Backing check for the throttled logging macros. Returns true (and records
/// `now`) when at least `interval` has passed since the last emission from the
/// same call site.
#[doc(hidden)]
pub fn should_emit(last: &Mutex<Option<Instant>>, interval: Duration) -> bool {
    let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
    let now = Instant::now();
    match *last {
        Some(at) if now.saturating_duration_since(at) < interval => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

/// `warn_throttled!(Duration::from_secs(1), "queue depth {}", depth)`
///
/// Emits at most once per interval per call site.
#[macro_export]
macro_rules! warn_throttled {
    ($interval:expr, $($arg:tt)+) => {{
        static __LAST: ::std::sync::Mutex<Option<::std::time::Instant>> =
            ::std::sync::Mutex::new(None);
        if $crate::core::logging::should_emit(&__LAST, $interval) {
            $crate::core::logging::warn!($($arg)+);
        }
    }};
}

/// Like [`warn_throttled!`] at debug level.
#[macro_export]
macro_rules! debug_throttled {
    ($interval:expr, $($arg:tt)+) => {{
        static __LAST: ::std::sync::Mutex<Option<::std::time::Instant>> =
            ::std::sync::Mutex::new(None);
        if $crate::core::logging::should_emit(&__LAST, $interval) {
            $crate::core::logging::debug!($($arg)+);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_emit_throttles_within_interval() {
        let last = Mutex::new(None);
        assert!(should_emit(&last, Duration::from_secs(60)));
        assert!(!should_emit(&last, Duration::from_secs(60)));
    }

    #[test]
    fn short_target_drops_the_crate_name() {
        let target = short_target("cvpanel::pages::controller");
        assert_eq!(target, "pages::controller");
        assert_eq!(short_target("panels"), "panels");
        assert_eq!(short_target("midir::backend"), "midir::backend");
    }

    #[test]
    fn should_emit_always_fires_with_zero_interval() {
        let last = Mutex::new(None);
        assert!(should_emit(&last, Duration::ZERO));
        assert!(should_emit(&last, Duration::ZERO));
    }
}
