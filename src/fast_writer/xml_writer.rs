//! Buffered, encoding-aware byte writer

use std::io::Write;

use super::encoding::Encoding;
use super::escape;
use super::{EscapeSettings, XmlOutput};
use crate::config::WriterConfig;
use crate::error::{Result, XmlWriteError};

/// Fast XML writer that coalesces small writes into one buffer.
///
/// Writes shorter than the small-write threshold are copied into the buffer,
/// which is handed to the sink only when full. Longer writes top up whatever
/// room the buffer has left, flush it, and go straight to the sink.
pub struct XmlWriter<W: Write> {
    writer: Option<W>,
    buffer: Vec<u8>,
    capacity: usize,
    small_write: usize,
    encoding: Encoding,
    settings: EscapeSettings,
    pending_surrogate: Option<u16>,
    bracket_run: usize,
    closed: bool,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_encoding(writer, Encoding::Utf8)
    }

    pub fn with_encoding(writer: W, encoding: Encoding) -> Self {
        Self::with_config(writer, encoding, &WriterConfig::default())
    }

    pub fn with_config(writer: W, encoding: Encoding, config: &WriterConfig) -> Self {
        if !encoding.is_supported() {
            log::warn!(
                target: "xmlstream::buffer",
                "unsupported encoding {encoding}: writing UTF-8 bytes without transcoding"
            );
        }
        let capacity = config.buffer_size.max(16);
        XmlWriter {
            writer: Some(writer),
            buffer: Vec::with_capacity(capacity),
            capacity,
            small_write: config.small_write.clamp(1, capacity),
            encoding,
            settings: EscapeSettings::from(config),
            pending_surrogate: None,
            bracket_run: 0,
            closed: false,
        }
    }

    /// Bytes waiting in the buffer
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
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

    /// Route one chunk of encoded bytes through the buffer
    fn append(&mut self, data: &[u8]) -> Result<()> {
        let len = data.len();
        if len < self.small_write {
            if self.buffer.len() + len > self.capacity {
                self.flush_buffer()?;
            }
            self.buffer.extend_from_slice(data);
            return Ok(());
        }

        let room = self.capacity - self.buffer.len();
        if len <= room {
            self.buffer.extend_from_slice(data);
            if self.buffer.len() == self.capacity {
                self.flush_buffer()?;
            }
            return Ok(());
        }

        // Top up the remainder so the buffered bytes go out in one full chunk
        let (head, tail) = data.split_at(if self.buffer.is_empty() { 0 } else { room });
        self.buffer.extend_from_slice(head);
        self.flush_buffer()?;
        self.sink()?.write_all(tail)?;
        Ok(())
    }

    /// Single-byte charsets: every char maps to its code point
    fn append_narrow(&mut self, text: &str, ceiling: u32) -> Result<()> {
        if let Some(ch) = text.chars().find(|&c| c as u32 > ceiling) {
            return Err(XmlWriteError::Unencodable {
                code_point: ch as u32,
                encoding: self.encoding.name().to_string(),
            });
        }
        let mut chunk = [0u8; 128];
        let mut n = 0;
        for ch in text.chars() {
            chunk[n] = ch as u32 as u8;
            n += 1;
            if n == chunk.len() {
                self.append(&chunk)?;
                n = 0;
            }
        }
        if n > 0 {
            self.append(&chunk[..n])?;
        }
        Ok(())
    }
}

impl<W: Write> XmlOutput for XmlWriter<W> {
    fn write_raw(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(XmlWriteError::Closed);
        }
        self.bracket_run = escape::bracket_run_after(self.bracket_run, text);
        let ceiling = self.encoding.max_code_point();
        if ceiling >= 0x10_FFFF || text.is_ascii() {
            self.append(text.as_bytes())
        } else {
            self.append_narrow(text, ceiling)
        }
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
            writer.write_all(&self.buffer)?;
            log::trace!(target: "xmlstream::buffer", "flushed {} bytes", self.buffer.len());
            self.buffer.clear();
        }
        Ok(())
    }

    fn flush_sink(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn release(&mut self, close_sink: bool) {
        self.buffer = Vec::new();
        self.closed = true;
        if close_sink {
            self.writer = None;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
