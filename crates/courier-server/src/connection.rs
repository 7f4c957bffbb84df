//! Connection state management.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Interest, Token};

use courier_wire::{Frame, Request, Response, FRAME_HEADER_LEN};

use crate::call::Call;
use crate::error::ServerResult;

const READ_CHUNK: usize = 4096;
const INITIAL_BUFFER: usize = 8 * 1024;

/// State of one client connection.
pub struct Connection {
    /// Unique token for this connection within its worker's poll.
    pub token: Token,
    /// TCP stream.
    pub stream: TcpStream,
    /// Read buffer.
    pub read_buf: BytesMut,
    /// Write buffer.
    pub write_buf: BytesMut,
    /// Whether the connection is closing.
    pub closing: bool,
    /// Calls whose responses sit in `write_buf`, retired on flush.
    pub pending_calls: Vec<Call>,
}

impl Connection {
    /// Creates a new connection.
    pub fn new(token: Token, stream: TcpStream) -> Self {
        Self {
            token,
            stream,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER),
            closing: false,
            pending_calls: Vec::new(),
        }
    }

    /// Reads available data from the socket into the read buffer.
    ///
    /// Returns `false` once the peer has closed.
    pub fn read(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes buffered data to the socket.
    ///
    /// Returns `true` once the write buffer is fully flushed.
    pub fn write(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => {
                    let _ = self.write_buf.split_to(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Attempts to decode one request from the read buffer.
    pub fn try_decode_request(&mut self) -> ServerResult<Option<Request>> {
        match Frame::decode(&mut self.read_buf)? {
            Some(frame) => Ok(Some(Request::from_frame(&frame)?)),
            None => Ok(None),
        }
    }

    /// Queues a response for sending.
    pub fn queue_response(&mut self, response: &Response) -> ServerResult<()> {
        let frame = response.to_frame()?;
        frame.encode(&mut self.write_buf);
        Ok(())
    }

    /// The interest flags this connection currently needs.
    pub fn interest(&self) -> Interest {
        if self.write_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Whether the read buffer may hold a complete frame.
    pub fn has_buffered_input(&self) -> bool {
        self.read_buf.len() >= FRAME_HEADER_LEN
    }
}
