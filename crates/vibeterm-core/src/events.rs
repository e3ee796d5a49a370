//! Session output delivery.
//!
//! The session manager pushes every output chunk into an [`OutputSink`].
//! [`ChannelSink`] turns those calls into a [`SessionEvents`] stream the UI
//! layer consumes asynchronously, and [`GatedSink`] silences delivery once
//! the UI has started tearing down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Receives output produced by live sessions.
///
/// Called from each session's reader thread, in the order the process
/// produced its output. Implementations must not block for long.
pub trait OutputSink: Send + Sync + 'static {
    /// A chunk of output from `session_id`.
    fn output(&self, session_id: &str, data: &[u8]);

    /// The process behind `session_id` has ended, whoever initiated it.
    fn exited(&self, _session_id: &str, _exit_code: Option<u32>) {}
}

impl<F> OutputSink for F
where
    F: Fn(&str, &[u8]) + Send + Sync + 'static,
{
    fn output(&self, session_id: &str, data: &[u8]) {
        self(session_id, data);
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl OutputSink for DiscardSink {
    fn output(&self, _session_id: &str, _data: &[u8]) {}
}

/// Events emitted by live sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session produced output.
    Output {
        /// Session the output belongs to.
        session_id: String,
        /// Raw bytes as read from the terminal.
        data: Vec<u8>,
    },

    /// The session's process ended.
    Exited {
        /// Session that ended.
        session_id: String,
        /// Exit code, when the process reported one.
        exit_code: Option<u32>,
    },
}

/// Create a connected [`ChannelSink`] / [`SessionEvents`] pair.
pub fn channel() -> (ChannelSink, SessionEvents) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (ChannelSink { event_tx }, SessionEvents { event_rx })
}

/// Sink forwarding session output into an async channel.
///
/// Unbounded so the blocking reader threads never wait on the consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl OutputSink for ChannelSink {
    fn output(&self, session_id: &str, data: &[u8]) {
        // A closed receiver means the consumer is gone; nothing left to notify.
        let _ = self.event_tx.send(SessionEvent::Output {
            session_id: session_id.to_owned(),
            data: data.to_vec(),
        });
    }

    fn exited(&self, session_id: &str, exit_code: Option<u32>) {
        let _ = self.event_tx.send(SessionEvent::Exited {
            session_id: session_id.to_owned(),
            exit_code,
        });
    }
}

/// Handle for consuming session events.
#[derive(Debug)]
pub struct SessionEvents {
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    /// Get the next session event.
    ///
    /// Returns `None` once every sink feeding this stream has been dropped.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Get the next event if one is already queued.
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Shared teardown flag controlling a [`GatedSink`].
#[derive(Debug, Clone, Default)]
pub struct TeardownGate {
    quitting: Arc<AtomicBool>,
}

impl TeardownGate {
    /// Stop delivering output; sessions keep running until destroyed.
    pub fn begin_teardown(&self) {
        self.quitting.store(true, Ordering::SeqCst);
    }

    /// Resume delivery, e.g. when a new window is created.
    pub fn reset(&self) {
        self.quitting.store(false, Ordering::SeqCst);
    }

    pub fn is_tearing_down(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }
}

/// Sink wrapper that becomes a no-op once teardown begins.
#[derive(Debug)]
pub struct GatedSink<S> {
    inner: S,
    gate: TeardownGate,
}

impl<S: OutputSink> GatedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gate: TeardownGate::default(),
        }
    }

    /// Returns a handle to the flag controlling this sink.
    pub fn gate(&self) -> TeardownGate {
        self.gate.clone()
    }
}

impl<S: OutputSink> OutputSink for GatedSink<S> {
    fn output(&self, session_id: &str, data: &[u8]) {
        if !self.gate.is_tearing_down() {
            self.inner.output(session_id, data);
        }
    }

    fn exited(&self, session_id: &str, exit_code: Option<u32>) {
        if !self.gate.is_tearing_down() {
            self.inner.exited(session_id, exit_code);
        }
    }
}
