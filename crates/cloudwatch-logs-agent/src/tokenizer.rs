// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte stream to line tokens.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::ShipError;

/// Callback receiving each complete line, delimiter stripped.
pub type EmitFn = Box<dyn FnMut(&[u8]) + Send>;

/// Splits an incoming byte stream into `\n`-delimited tokens.
///
/// Complete lines are handed to the emit callback as they are recognized,
/// whatever their length; bytes after the last delimiter are buffered until
/// the next write, an explicit flush, or close. Only an undelimited run
/// larger than the buffer cap is an error. A single trailing `\r` is stripped
/// from every token and empty lines produce empty tokens, so the token
/// sequence does not depend on how the stream is split across writes.
///
/// All operations are mutually exclusive under one internal lock, and close
/// is one-way.
pub struct LineTokenizer {
    inner: Mutex<Inner>,
}

struct Inner {
    emit: EmitFn,
    backlog: Vec<u8>,
    max_buffer: usize,
    closed: bool,
}

impl LineTokenizer {
    /// Tokenizer buffering at most `max_buffer` undelimited bytes.
    #[must_use]
    pub fn new(max_buffer: usize, emit: EmitFn) -> Self {
        Self {
            inner: Mutex::new(Inner {
                emit,
                backlog: Vec::new(),
                max_buffer,
                closed: false,
            }),
        }
    }

    /// Scans `data` for complete lines, emitting each one and buffering any
    /// trailing remainder.
    ///
    /// Returns the full length of `data` on success. Fails with
    /// [`ShipError::BufferOverflow`] when the buffered remainder would exceed
    /// the cap (the run is discarded; lines already emitted during this call
    /// stay emitted) and with [`ShipError::WriterClosed`] after close.
    pub fn write(&self, data: &[u8]) -> Result<usize, ShipError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ShipError::WriterClosed);
        }
        inner.scan(data)?;
        Ok(data.len())
    }

    /// Emits a non-empty backlog as a final token. Used at stream end.
    pub fn flush(&self) -> Result<(), ShipError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ShipError::WriterClosed);
        }
        inner.emit_backlog();
        Ok(())
    }

    /// Flushes, then permanently rejects further operations, including a
    /// second close.
    pub fn close(&self) -> Result<(), ShipError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ShipError::WriterClosed);
        }
        inner.emit_backlog();
        inner.closed = true;
        inner.backlog = Vec::new();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A write that panicked inside the emit callback must not wedge the
        // other call sites.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn scan(&mut self, data: &[u8]) -> Result<(), ShipError> {
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if self.backlog.is_empty() {
                (self.emit)(strip_cr(line));
            } else {
                self.backlog.extend_from_slice(line);
                let token = std::mem::take(&mut self.backlog);
                (self.emit)(strip_cr(&token));
            }
        }
        if !rest.is_empty() {
            if self.backlog.len() + rest.len() > self.max_buffer {
                self.backlog.clear();
                return Err(ShipError::BufferOverflow {
                    limit: self.max_buffer,
                });
            }
            self.backlog.extend_from_slice(rest);
        }
        Ok(())
    }

    fn emit_backlog(&mut self) {
        if self.backlog.is_empty() {
            return;
        }
        let token = std::mem::take(&mut self.backlog);
        (self.emit)(strip_cr(&token));
    }
}

/// Drops a single trailing carriage return.
fn strip_cr(line: &[u8]) -> &[u8] {
    match line {
        [head @ .., b'\r'] => head,
        _ => line,
    }
}
