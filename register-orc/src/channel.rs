use std::io::Write;
use std::sync::Mutex;

use tracing::trace;

use crate::OrcError;
use crate::protocol::StoreCommand;

/// The shared, ordered command stream to a batch-edit process.
///
/// Registers sharing one channel have their writes serialized by the inner
/// lock; each command is flushed as soon as it is written so the store sees
/// it before any later one-shot `init` or `dump`. Once closed, every send fails.
#[derive(Debug)]
pub struct CommandChannel<W: Write> {
    writer: Mutex<Option<W>>,
}

impl<W: Write> CommandChannel<W> {
    pub fn new(writer: W) -> Self {
        CommandChannel {
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Writes one command line. No acknowledgement is awaited.
    pub fn send(&self, command: &StoreCommand<'_>) -> Result<(), OrcError> {
        let mut guard = self.writer.lock().unwrap();
        let writer = guard.as_mut().ok_or(OrcError::Closed)?;
        writeln!(writer, "{}", command)?;
        writer.flush()?;
        trace!(command = command.name(), "sent");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.lock().unwrap().is_none()
    }

    /// Takes the writer out of the channel, flushing it first.
    ///
    /// Returns None if the channel was already closed.
    pub fn close(&self) -> Result<Option<W>, OrcError> {
        let mut writer = self.writer.lock().unwrap().take();
        if let Some(w) = writer.as_mut() {
            w.flush()?;
        }
        Ok(writer)
    }
}
