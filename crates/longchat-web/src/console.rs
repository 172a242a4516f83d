#![forbid(unsafe_code)]

//! `tracing` output for a browser console.
//!
//! The fmt subscriber writes each event in pieces; [`ConsoleWriter`] buffers
//! them and hands the finished line to an emit function when the event is
//! done (on flush or drop). In the browser the emit function is
//! `console.log`; tests pass a recorder.

use std::io::{self, Write};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Receives one formatted log line, without its trailing newline.
pub type Emit = fn(&str);

/// Line-buffering writer for one log event.
#[derive(Debug)]
pub struct ConsoleWriter {
    buf: Vec<u8>,
    emit: Emit,
}

impl ConsoleWriter {
    #[must_use]
    pub fn new(emit: Emit) -> Self {
        Self { buf: Vec::new(), emit }
    }
}

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&self.buf);
        (self.emit)(line.trim_end_matches('\n'));
        self.buf.clear();
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// [`MakeWriter`] producing a fresh [`ConsoleWriter`] per event.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleMakeWriter {
    emit: Emit,
}

impl ConsoleMakeWriter {
    #[must_use]
    pub fn new(emit: Emit) -> Self {
        Self { emit }
    }
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter::new(self.emit)
    }
}

/// Install the global console subscriber when `debug` is set.
///
/// Returns whether a subscriber was installed; `false` when logging is off
/// or another subscriber got there first.
pub fn init_logging(debug: bool, emit: Emit) -> bool {
    if !debug {
        return false;
    }
    tracing_subscriber::fmt()
        .without_time()
        .with_max_level(Level::DEBUG)
        .with_writer(ConsoleMakeWriter::new(emit))
        .try_init()
        .is_ok()
}
