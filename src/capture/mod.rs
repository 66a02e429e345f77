//! Packet capture, injected behind a trait so the monitor and training
//! entry points don't care whether frames come from a live interface or a
//! replayed fixture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pipeline::parse_ip_frame;

/// A backend that can deliver raw frame bytes for an interface until told to
/// stop. A live implementation would open a raw socket or packet-capture
/// handle for `iface`; this crate ships only the trait and a synthetic
/// backend, since the specific OS capture mechanism is out of scope here.
pub trait CaptureBackend: Send + Sync {
    /// Delivers frames to `on_packet` until `shutdown` is set or the backend
    /// runs out of frames. `on_packet` receives raw bytes and a timestamp in
    /// seconds.
    fn sniff(
        &self,
        iface: &str,
        shutdown: &AtomicBool,
        on_packet: &mut dyn FnMut(&[u8], f64),
    ) -> anyhow::Result<()>;
}

/// Replays a fixed list of frames, optionally looping. Used for
/// `Monitoring.SimulateTraffic` and for tests that need a deterministic
/// packet stream without a live interface.
pub struct SyntheticBackend {
    frames: Vec<Vec<u8>>,
    interval: std::time::Duration,
    repeat: bool,
}

impl SyntheticBackend {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames, interval: std::time::Duration::from_millis(1), repeat: false }
    }

    pub fn repeating(frames: Vec<Vec<u8>>, interval: std::time::Duration) -> Self {
        Self { frames, interval, repeat: true }
    }
}

impl CaptureBackend for SyntheticBackend {
    fn sniff(
        &self,
        _iface: &str,
        shutdown: &AtomicBool,
        on_packet: &mut dyn FnMut(&[u8], f64),
    ) -> anyhow::Result<()> {
        let start = std::time::Instant::now();
        loop {
            for frame in &self.frames {
                if shutdown.load(Ordering::Relaxed) {
                    return Ok(());
                }
                on_packet(frame, start.elapsed().as_secs_f64());
                if !self.interval.is_zero() {
                    std::thread::sleep(self.interval);
                }
            }
            if !self.repeat {
                return Ok(());
            }
        }
    }
}

/// Owns a dedicated capture thread and the flag that stops it. Dropping the
/// engine requests shutdown so a forgotten handle doesn't leak a thread that
/// runs forever.
pub struct CaptureEngine {
    shutdown: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CaptureEngine {
    pub fn start(
        backend: Arc<dyn CaptureBackend>,
        iface: String,
        mut on_packet: impl FnMut(&[u8], f64) + Send + 'static,
    ) -> anyhow::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new().name("capture".into()).spawn(move || {
            if let Err(e) = backend.sniff(&iface, &shutdown_clone, &mut on_packet) {
                tracing::error!("capture loop exited: {e:#}");
            }
        })?;

        tracing::info!("capture engine started");
        Ok(Self { shutdown, thread: Some(thread) })
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Re-exported for callers that want to validate a frame before handing it
/// to a backend-agnostic pipeline stage.
pub fn is_parseable(data: &[u8]) -> bool {
    parse_ip_frame(data).is_some()
}
