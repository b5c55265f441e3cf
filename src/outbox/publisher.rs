//! Outbox adapters.

use std::sync::{Arc, Mutex};

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;
use tracing::info;

use crate::bus::{Envelope, PublishError, Publisher};

/// Writes envelopes to the log, or to a buffer when one is given.
#[derive(Clone, Default)]
pub struct LogOutbox {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

impl Publisher for LogOutbox {
    fn publish(&self, envelope: Envelope) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&envelope.payload);
        match &self.buffer {
            Some(buffer) => {
                let mut buffer = buffer
                    .lock()
                    .map_err(|_| PublishError::Rejected("outbox buffer poisoned".into()))?;
                buffer.push(format!("[OUTBOX] {} {}", envelope.message_type, payload));
            }
            None => info!(
                id = %envelope.id,
                message_type = %envelope.message_type,
                payload = %payload,
                "outbox"
            ),
        }
        Ok(())
    }
}

/// Emits envelopes on an [`EventEmitter`] for in-process subscribers.
///
/// The event name is the envelope's message type and the value is its
/// payload as a (lossy) UTF-8 string, so JSON encoding is the useful choice
/// here.
#[cfg(feature = "emitter")]
pub struct EmitterOutbox {
    emitter: Mutex<EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterOutbox {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            emitter: Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
impl Publisher for EmitterOutbox {
    fn publish(&self, envelope: Envelope) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&envelope.payload).into_owned();
        self.emitter
            .lock()
            .map_err(|_| PublishError::Rejected("event emitter poisoned".into()))?
            .emit(&envelope.message_type, payload);
        Ok(())
    }
}
