//! Test harness helpers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Install a test subscriber that writes through the test output capture.
///
/// Honours `RUST_LOG`; defaults to `debug` for modsync crates. Safe to call
/// from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("modsync_registry=debug,modsync_poller=debug,modsync_devwatch=debug")
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A tracing layer that panics while emitting one specific log message,
/// like a writer whose output stream has gone away.
///
/// Starts armed. Install it on the current thread with
/// [`install`](Self::install); `#[tokio::test]` runtimes poll spawned tasks
/// on that thread too.
#[derive(Debug, Clone)]
pub struct BrokenLogLayer {
    message: &'static str,
    armed: Arc<AtomicBool>,
    once: bool,
}

impl BrokenLogLayer {
    /// Panic on every event whose message is `message`.
    #[must_use]
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
            armed: Arc::new(AtomicBool::new(true)),
            once: false,
        }
    }

    /// Disarm after the first panic.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Start panicking again.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Stop panicking.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Make this layer the current thread's subscriber until the guard drops.
    #[must_use]
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }
}

impl<S: Subscriber> Layer<S> for BrokenLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor::default();
        event.record(&mut message);
        if message.0 != self.message {
            return;
        }
        let fire = if self.once {
            self.armed.swap(false, Ordering::SeqCst)
        } else {
            self.armed.load(Ordering::SeqCst)
        };
        if fire {
            panic!("broken log stream");
        }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
