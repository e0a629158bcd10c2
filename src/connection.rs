/*
 * This file is part of the Handover key/value store.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Per-connection byte stream: line reads bounded at [`MAX_COMMAND_LEN`], and
//! a read timeout that turns a blocking read into a cancellation point.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Commands longer than this are rejected without ever reaching the interpreter.
pub const MAX_COMMAND_LEN: usize = 4096;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub enum ReadOutcome {
    Line(String),
    TooLong,
    Eof,
    Cancelled,
    Error(io::Error),
}

pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// A handle to the underlying socket, for the registry to force-close on cancel-all.
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.writer.try_clone()
    }

    pub fn read_command(&mut self, cancelled: &AtomicBool) -> ReadOutcome {
        let mut line = String::new();
        loop {
            if cancelled.load(Ordering::Relaxed) {
                return ReadOutcome::Cancelled;
            }
            match self.reader.read_line(&mut line) {
                Ok(0) => return ReadOutcome::Eof,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    return if trimmed.len() > MAX_COMMAND_LEN {
                        ReadOutcome::TooLong
                    } else {
                        ReadOutcome::Line(trimmed.to_owned())
                    };
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => return ReadOutcome::Error(e),
            }
        }
    }

    pub fn write_reply(&mut self, reply: &str) -> io::Result<()> {
        self.writer.write_all(reply.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
