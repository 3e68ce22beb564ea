//! A client for QEMU's human monitor (HMP) over TCP.
//!
//! Start QEMU with `-monitor tcp:127.0.0.1:4444,server,nowait` and pass
//! `--monitor 127.0.0.1:4444`. Physical memory is read one doubleword at a
//! time with `xp /1gx`; registers come from `info registers`.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use rvmmu::{MemoryReader, PhysicalAddress, ReadError};

use crate::hex::parse_hex;
use crate::registers::{LiveRegisters, RegisterFile};

const PROMPT: &[u8] = b"(qemu) ";

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("{0} did not resolve to any address")]
    Unresolved(String),
    #[error("monitor closed the connection")]
    Closed,
    #[error("unexpected response to `{command}`: {response:?}")]
    UnexpectedResponse { command: String, response: String },
}

struct Connection<S> {
    stream: S,
    /// Bytes received past the last prompt.
    pending: Vec<u8>,
}

impl<S: Read> Connection<S> {
    /// Reads until the next prompt and returns everything before it.
    fn read_until_prompt(&mut self) -> Result<String, MonitorError> {
        loop {
            if let Some(pos) = find(&self.pending, PROMPT) {
                let rest = self.pending.split_off(pos + PROMPT.len());
                let mut output = std::mem::replace(&mut self.pending, rest);
                output.truncate(pos);
                return Ok(clean(&String::from_utf8_lossy(&output)));
            }

            let mut chunk = [0u8; 4096];
            let read = self.stream.read(&mut chunk)?;
            if read == 0 {
                return Err(MonitorError::Closed);
            }
            self.pending.extend_from_slice(&chunk[..read]);
        }
    }
}

/// A monitor session. Every request blocks until QEMU prints its next prompt.
pub struct QemuMonitor<S = TcpStream> {
    connection: RefCell<Connection<S>>,
}

impl QemuMonitor<TcpStream> {
    /// Connects to the monitor at `address` (`host:port`).
    ///
    /// `timeout` bounds the connect and every single read and write.
    pub fn connect(address: &str, timeout: Option<Duration>) -> Result<Self, MonitorError> {
        let stream = match timeout {
            None => TcpStream::connect(address)?,
            Some(timeout) => {
                let mut last_error = None;
                let mut stream = None;
                for candidate in address.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&candidate, timeout) {
                        Ok(connected) => {
                            stream = Some(connected);
                            break;
                        }
                        Err(err) => last_error = Some(err),
                    }
                }
                match (stream, last_error) {
                    (Some(stream), _) => stream,
                    (None, Some(err)) => return Err(err.into()),
                    (None, None) => return Err(MonitorError::Unresolved(address.to_string())),
                }
            }
        };

        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        log::debug!("connected to monitor at {address}");

        Self::new(stream)
    }
}

impl<S: Read + Write> QemuMonitor<S> {
    /// Starts a session on an already connected stream and consumes the greeting.
    pub fn new(stream: S) -> Result<Self, MonitorError> {
        let monitor = Self {
            connection: RefCell::new(Connection {
                stream,
                pending: Vec::new(),
            }),
        };

        let banner = monitor.connection.borrow_mut().read_until_prompt()?;
        log::debug!("monitor banner: {}", banner.trim());

        Ok(monitor)
    }

    /// Runs a monitor command and returns its output without the echoed command line.
    pub fn command(&self, command: &str) -> Result<String, MonitorError> {
        let mut connection = self.connection.borrow_mut();

        log::debug!("monitor <- {command}");
        connection.stream.write_all(command.as_bytes())?;
        connection.stream.write_all(b"\n")?;
        connection.stream.flush()?;

        let output = connection.read_until_prompt()?;
        Ok(strip_echo(command, &output).to_string())
    }

    /// Reads one little-endian doubleword of guest physical memory.
    pub fn read_physical_u64(&self, address: PhysicalAddress) -> Result<u64, MonitorError> {
        let command = format!("xp /1gx {:#x}", address.as_u64());
        let response = self.command(&command)?;

        parse_xp_response(address, &response)
            .ok_or(MonitorError::UnexpectedResponse { command, response })
    }

    pub fn into_inner(self) -> S {
        self.connection.into_inner().stream
    }
}

impl<S: Read + Write> MemoryReader for QemuMonitor<S> {
    fn read_u64(&self, address: PhysicalAddress) -> Result<u64, ReadError> {
        self.read_physical_u64(address)
            .map_err(|err| ReadError::Backend(err.to_string()))
    }
}

impl<S: Read + Write> LiveRegisters for QemuMonitor<S> {
    fn info_registers(&self) -> Result<RegisterFile, MonitorError> {
        let output = self.command("info registers")?;
        Ok(RegisterFile::parse(&output))
    }
}

/// Extracts the value for `address` from the output of `xp /1gx`.
///
/// QEMU answers with `<address>: 0x<value>`; an unbacked address gets an
/// error message instead, which yields `None`.
pub fn parse_xp_response(address: PhysicalAddress, response: &str) -> Option<u64> {
    response.lines().find_map(|line| {
        let (at, value) = line.split_once(':')?;
        if parse_hex(at).ok()? != address.as_u64() {
            return None;
        }
        parse_hex(value.split_whitespace().next()?).ok()
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Drops carriage returns and the terminal escape sequences the monitor uses
/// for line editing.
fn clean(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => {
                // CSI: ESC [ parameters final-byte
                if chars.next() == Some('[') {
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                }
            }
            '\r' => {}
            c => output.push(c),
        }
    }

    output
}

fn strip_echo<'o>(command: &str, output: &'o str) -> &'o str {
    match output.split_once('\n') {
        Some((first, rest)) if first.trim_end().ends_with(command) => rest,
        None if output.trim_end().ends_with(command) => "",
        _ => output,
    }
}
