//! Logging facade for spindle.
//!
//! Enable with `--features tracing`. Without the feature every macro below
//! only borrows its field values and formats nothing, so the queue hot path
//! and the worker loop carry no logging cost in production builds.

/// Installs a `tracing` subscriber with uptime timestamps and thread names.
///
/// Call this at the start of tests or the benchmark binary. The filter comes
/// from `RUST_LOG` and defaults to `spindle=trace`. Does nothing if the
/// `tracing` feature is not enabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spindle=trace"));

    // A second call (e.g. from another test binary helper) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

/// Stand-in for every level when logging is compiled out.
///
/// Field values are still borrowed, so bindings that exist only to be logged
/// do not turn into unused-variable warnings.
#[cfg(not(feature = "tracing"))]
macro_rules! noop {
    () => {};
    ($name:ident = %$value:expr $(, $($rest:tt)*)?) => {{
        let _ = &$value;
        $($crate::trace::noop!($($rest)*);)?
    }};
    ($name:ident = ?$value:expr $(, $($rest:tt)*)?) => {{
        let _ = &$value;
        $($crate::trace::noop!($($rest)*);)?
    }};
    ($name:ident = $value:expr $(, $($rest:tt)*)?) => {{
        let _ = &$value;
        $($crate::trace::noop!($($rest)*);)?
    }};
    ($name:ident $(, $($rest:tt)*)?) => {{
        let _ = &$name;
        $($crate::trace::noop!($($rest)*);)?
    }};
    ($message:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use noop;
#[cfg(not(feature = "tracing"))]
pub(crate) use {noop as debug, noop as error, noop as info, noop as trace, noop as warn};
