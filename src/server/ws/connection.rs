//! A single WebSocket connection
//!
//! Owned exclusively by the server's connection registry. There is no
//! dedicated reader task: the registry's periodic sweep calls `tick`,
//! which drains whatever bytes are pending without blocking. Sends are
//! likewise non-blocking -- an unwritable tail is buffered and flushed on
//! the next tick, so a stalled client only affects itself.

use super::frame::{
    self, Frame, OPCODE_BINARY, OPCODE_CLOSE, OPCODE_PING, OPCODE_PONG, OPCODE_TEXT,
};
use std::io;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub(crate) struct WsConnection {
    stream: TcpStream,
    /// Bearer token supplied at handshake time (already validated).
    token: String,
    /// Accumulates partial reads until complete frames can be decoded.
    receive_buffer: Vec<u8>,
    /// Bytes accepted for sending but not yet written to the transport.
    outbound: Vec<u8>,
    open: bool,
}

impl WsConnection {
    pub(crate) fn new(stream: TcpStream, token: String) -> Self {
        Self {
            stream,
            token,
            receive_buffer: Vec::new(),
            outbound: Vec::new(),
            open: true,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// Queue a text frame and attempt to write it immediately.
    pub(crate) fn send_text(&mut self, text: &str) {
        if !self.open {
            return;
        }
        let encoded = frame::encode_text_frame(text);
        self.outbound.extend_from_slice(&encoded);
        self.flush();
    }

    /// Send a close frame (best-effort) and mark the connection closed.
    pub(crate) fn close(&mut self, code: u16) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = self.stream.try_write(&frame::encode_close_frame(code));
    }

    /// Pump the connection once: drain pending reads, decode as many
    /// complete frames as are buffered, flush pending writes. Returns
    /// false when the connection should be dropped from the registry.
    pub(crate) fn tick(&mut self) -> bool {
        if !self.open {
            return false;
        }

        loop {
            let mut chunk = [0u8; 4096];
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    debug!("connection closed by client");
                    self.open = false;
                    return false;
                }
                Ok(n) => self.receive_buffer.extend_from_slice(&chunk[..n]),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(error = %err, "connection read failed");
                    self.open = false;
                    return false;
                }
            }
        }

        while let Some((decoded, consumed)) = frame::decode_frame(&self.receive_buffer) {
            self.receive_buffer.drain(..consumed);
            self.process_frame(decoded);
            if !self.open {
                return false;
            }
        }

        self.flush();
        self.open
    }

    fn process_frame(&mut self, decoded: Frame) {
        match decoded.opcode {
            OPCODE_CLOSE => {
                debug!("received close frame");
                self.open = false;
            }
            OPCODE_PING => {
                let pong = frame::encode_pong_frame(&decoded.payload);
                self.outbound.extend_from_slice(&pong);
                self.flush();
            }
            OPCODE_PONG => {}
            OPCODE_TEXT | OPCODE_BINARY => {
                // The server expects no client-to-server application data.
                debug!(
                    opcode = decoded.opcode,
                    len = decoded.payload.len(),
                    "discarding client data frame"
                );
            }
            other => warn!(opcode = other, "unknown opcode"),
        }
    }

    fn flush(&mut self) {
        while !self.outbound.is_empty() {
            match self.stream.try_write(&self.outbound) {
                Ok(0) => {
                    self.open = false;
                    return;
                }
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    debug!(error = %err, "connection write failed");
                    self.open = false;
                    return;
                }
            }
        }
    }
}
