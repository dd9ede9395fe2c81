//! Tracing subscriber setup

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "datapilot=info";

/// Formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`, writing events to `writer`.
pub fn subscriber<W>(default_filter: &str, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .finish()
}

/// Install the global subscriber. Events go to stderr so stdout stays
/// reserved for command output. Returns `false` if a global subscriber was
/// already set.
pub fn init(default_filter: &str) -> bool {
    subscriber(default_filter, std::io::stderr).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_events_reach_the_configured_writer() {
        let buffer = Buffer::default();
        tracing::subscriber::with_default(subscriber("info", buffer.clone()), || {
            tracing::info!(rows = 3, "table loaded");
        });
        let out = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert!(out.contains("table loaded"), "captured: {}", out);
    }

    #[test]
    fn test_init_is_idempotent() {
        let _ = init(DEFAULT_FILTER);
        assert!(!init(DEFAULT_FILTER));
    }
}
