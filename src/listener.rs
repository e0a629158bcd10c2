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

//! The accept loop. `std::net::TcpListener` has no native way to interrupt a
//! blocked `accept()`, so the listener is put in non-blocking mode and polled
//! against a shutdown flag instead.

use crate::server::Server;
use crate::worker;
use std::io;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(listener: TcpListener, server: Arc<Server>, shutdown: &AtomicBool) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("accepted connection from {addr}");
                if let Err(e) = worker::spawn(stream, Arc::clone(&server)) {
                    log::warn!("failed to spawn worker for {addr}: {e}");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                log::warn!("accept error: {e}");
            }
        }
    }
    Ok(())
}
