//! Lifecycle events for observing a session.
//!
//! Events are notifications, not control flow. The session has already acted
//! on whatever an event reports by the time the callback runs.

use std::sync::Arc;

use crate::SessionState;

/// Events emitted while a session runs.
///
/// # Example
///
/// ```
/// use mic_stream::SessionEvent;
///
/// fn handle_event(event: SessionEvent) {
///     match event {
///         SessionEvent::StateChanged { from, to } => {
///             eprintln!("session {from:?} -> {to:?}");
///         }
///         SessionEvent::DeviceOpened { device } => {
///             eprintln!("capturing from {device}");
///         }
///         SessionEvent::StreamFailed { error } => {
///             eprintln!("stream failed: {error}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session moved to a new lifecycle state.
    StateChanged {
        /// State before the transition.
        from: SessionState,
        /// State after the transition.
        to: SessionState,
    },

    /// The capture device was opened.
    DeviceOpened {
        /// Name reported by the source.
        device: String,
    },

    /// A mid-stream error ended the session.
    ///
    /// Emitted before the session enters `Stopping`.
    StreamFailed {
        /// Description of the error.
        error: String,
    },
}

/// Callback type for receiving session events.
///
/// Register one with [`MicStreamBuilder::on_event()`].
///
/// [`MicStreamBuilder::on_event()`]: crate::MicStreamBuilder::on_event
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use mic_stream::{event_callback, SessionEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_event_debug() {
        let event = SessionEvent::StateChanged {
            from: SessionState::Streaming,
            to: SessionState::Stopping,
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("Streaming"));
        assert!(debug.contains("Stopping"));
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(SessionEvent::DeviceOpened {
            device: "mock".to_string(),
        });
        assert!(called.load(Ordering::SeqCst));
    }
}
