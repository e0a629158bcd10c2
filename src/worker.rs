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

//! One worker thread per connection: admission, registration, a serve loop
//! that interprets commands, and cleanup that fires on every exit path.

use crate::command;
use crate::connection::{Connection, ReadOutcome};
use crate::registry::{WorkerHandle, WorkerId};
use crate::server::Server;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Deregisters a worker on the way out, whatever the exit path was.
struct Cleanup<'a> {
    server: &'a Server,
    id: WorkerId,
}

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        self.server.registry.remove(self.id);
    }
}

pub fn spawn(stream: TcpStream, server: Arc<Server>) -> std::io::Result<()> {
    thread::Builder::new()
        .name("worker".to_owned())
        .spawn(move || worker_main(stream, &server))?;
    Ok(())
}

fn worker_main(stream: TcpStream, server: &Server) {
    if !server.is_accepting() || server.at_capacity() {
        log::warn!("refusing connection: server not accepting or at capacity");
        let _ = stream.shutdown(Shutdown::Both);
        return;
    }

    let mut conn = match Connection::new(stream) {
        Ok(conn) => conn,
        Err(e) => {
            log::warn!("failed to prepare connection: {e}");
            return;
        }
    };
    let handle_stream = match conn.try_clone_stream() {
        Ok(s) => s,
        Err(e) => {
            log::warn!("failed to clone connection handle: {e}");
            return;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let id = server.registry.next_id();
    server
        .registry
        .insert(id, WorkerHandle::new(Arc::clone(&cancel), handle_stream));
    let _cleanup = Cleanup { server, id };

    log::info!("worker {id}: connected");
    loop {
        server.pause_gate.wait_while_paused(&cancel);
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match conn.read_command(&cancel) {
            ReadOutcome::Line(line) => {
                let reply = command::interpret(&server.tree, &line, &cancel);
                if let Err(e) = conn.write_reply(&reply) {
                    log::warn!("worker {id}: disconnecting after write error: {e}");
                    break;
                }
            }
            ReadOutcome::TooLong => {
                if conn.write_reply("ill-formed command").is_err() {
                    break;
                }
            }
            ReadOutcome::Eof => {
                log::info!("worker {id}: client disconnected");
                break;
            }
            ReadOutcome::Cancelled => {
                log::info!("worker {id}: cancelled");
                break;
            }
            ReadOutcome::Error(e) => {
                log::warn!("worker {id}: disconnecting after read error: {e}");
                break;
            }
        }
    }
}
