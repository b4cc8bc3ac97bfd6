//! Logger setup and raw frame tracing.
//!
//! Frame tracing is a process-wide switch turned on by `debugFrames` in the
//! config or `ROOMBA_BRIDGE_DEBUG=1`. When off, [`trace_frame!`] costs one
//! atomic load.
//!
//! ```ignore
//! use roomba_bridge_lib::trace_frame;
//!
//! roomba_bridge_lib::utils::logging::set_frame_tracing(true);
//! trace_frame!("blid", "<-", br#"{"event":"state","payload":{}}"#);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use log::LevelFilter;

static FRAME_TRACING: AtomicBool = AtomicBool::new(false);

/// Installs the global logger at `info`, overridable through `RUST_LOG`.
/// Safe to call more than once.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    let _ = builder.try_init();
}

pub fn set_frame_tracing(enabled: bool) {
    FRAME_TRACING.store(enabled, Ordering::Relaxed);
}

pub fn frame_tracing() -> bool {
    FRAME_TRACING.load(Ordering::Relaxed)
}

/// Logs a raw wire frame at debug level when frame tracing is on.
#[macro_export]
macro_rules! trace_frame {
    ($device:expr, $direction:expr, $frame:expr) => {
        if $crate::utils::logging::frame_tracing() {
            log::debug!(
                target: "roomba_bridge::frames",
                "[{}] {} {}",
                $device,
                $direction,
                String::from_utf8_lossy($frame)
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_tracing_toggle() {
        set_frame_tracing(true);
        assert!(frame_tracing());
        trace_frame!("blid", "->", b"{}");
        set_frame_tracing(false);
        assert!(!frame_tracing());
    }
}
