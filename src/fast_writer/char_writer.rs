//! Buffered writer for character sinks
//!
//! Used when the destination is an [`std::fmt::Write`] such as a `String`:
//! there is no byte-level transcoding, every character is representable.

use std::fmt::Write;

use super::encoding::Encoding;
use super::escape;
use super::{EscapeSettings, XmlOutput};
use crate::config::WriterConfig;
use crate::error::{Result, XmlWriteError};

/// Character-buffered XML writer
pub struct CharWriter<W: Write> {
    writer: Option<W>,
    buffer: String,
    capacity: usize,
    small_write: usize,
    encoding: Encoding,
    settings: EscapeSettings,
    pending_surrogate: Option<u16>,
    bracket_run: usize,
    closed: bool,
}

impl<W: Write> CharWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_config(writer, &WriterConfig::default())
    }

    pub fn with_config(writer: W, config: &WriterConfig) -> Self {
        let capacity = config.buffer_size.max(16);
        CharWriter {
            writer: Some(writer),
            buffer: String::with_capacity(capacity),
            capacity,
            small_write: config.small_write.clamp(1, capacity),
            encoding: Encoding::Utf8,
            settings: EscapeSettings::from(config),
            pending_surrogate: None,
            bracket_run: 0,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    /// Flush and return the sink
    pub fn into_inner(mut self) -> Result<W> {
        if !self.closed {
            self.flush()?;
        }
        self.writer.take().ok_or(XmlWriteError::Closed)
    }

    fn sink(&mut self) -> Result<&mut W> {
        self.writer.as_mut().ok_or(XmlWriteError::Closed)
    }
}

impl<W: Write> XmlOutput for CharWriter<W> {
    fn write_raw(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(XmlWriteError::Closed);
        }
        self.bracket_run = escape::bracket_run_after(self.bracket_run, text);
        let len = text.len();
        if len < self.small_write {
            if self.buffer.len() + len > self.capacity {
                self.flush_buffer()?;
            }
            self.buffer.push_str(text);
            return Ok(());
        }

        let room = self.capacity - self.buffer.len();
        if len <= room {
            self.buffer.push_str(text);
            return Ok(());
        }

        let mut cut = if self.buffer.is_empty() { 0 } else { room };
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = text.split_at(cut);
        self.buffer.push_str(head);
        self.flush_buffer()?;
        self.sink()?.write_str(tail)?;
        Ok(())
    }

    fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    fn settings(&self) -> &EscapeSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut EscapeSettings {
        &mut self.settings
    }

    fn pending_surrogate(&mut self) -> &mut Option<u16> {
        &mut self.pending_surrogate
    }

    fn trailing_brackets(&self) -> usize {
        self.bracket_run
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            let Some(writer) = self.writer.as_mut() else {
                return Err(XmlWriteError::Closed);
            };
            writer.write_str(&self.buffer)?;
            log::trace!(target: "xmlstream::buffer", "flushed {} chars", self.buffer.len());
            self.buffer.clear();
        }
        Ok(())
    }

    fn flush_sink(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self, close_sink: bool) {
        self.buffer = String::new();
        self.closed = true;
        if close_sink {
            self.writer = None;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
