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

//! The operator console: reads `p [PATH]` / `s` / `g` lines from standard
//! input, owns the signal-monitor thread, and runs the shutdown sequence on
//! end-of-input.

use crate::listener;
use crate::server::Server;
use crate::signal::SignalMonitor;
use std::fs::File;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub fn run(server: Arc<Server>, tcp: std::net::TcpListener) -> io::Result<()> {
    let monitor_server = Arc::clone(&server);
    let monitor = SignalMonitor::spawn(move || monitor_server.registry.cancel_all())?;

    let listener_shutdown = Arc::new(AtomicBool::new(false));
    let listener_server = Arc::clone(&server);
    let listener_flag = Arc::clone(&listener_shutdown);
    let listener_thread = thread::Builder::new()
        .name("listener".to_owned())
        .spawn(move || {
            if let Err(e) = listener::run(tcp, listener_server, &listener_flag) {
                log::error!("listener exited with error: {e}");
            }
        })?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("operator console read error: {e}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        match parts.next() {
            Some("p") => {
                let path = parts.next().map(str::trim).filter(|s| !s.is_empty());
                snapshot_to(&server, path);
            }
            Some("s") => {
                server.pause_gate.pause();
                log::info!("workers paused at next gate pass");
            }
            Some("g") => {
                server.pause_gate.resume();
                log::info!("workers resumed");
            }
            _ => log::warn!("unrecognized operator command: {trimmed}"),
        }
    }

    log::info!("operator console closed, shutting down");

    // Stop the one thread that could re-enter cancel-all out from under us,
    // then stop admitting new workers so the quiescence wait below can
    // actually reach zero.
    monitor.join();
    server.stop_accepting();
    server.registry.cancel_all();
    server.registry.wait_until_empty();
    assert!(
        server.registry.is_empty(),
        "registry non-empty after every worker reported quiescent"
    );

    listener_shutdown.store(true, Ordering::Relaxed);
    let _ = listener_thread.join();

    // By now the listener thread (the only other long-lived holder of a
    // `Server` clone) has exited, so this is the last reference and the tree
    // can be freed.
    match Arc::try_unwrap(server) {
        Ok(server) => server.tree.shutdown(),
        Err(_) => log::error!("server state still shared at shutdown; tree was not freed"),
    }

    Ok(())
}

fn snapshot_to(server: &Server, path: Option<&str>) {
    match path {
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            if let Err(e) = server.tree.snapshot(&mut lock) {
                log::warn!("snapshot to stdout failed: {e}");
            }
        }
        Some(path) => match File::create(path) {
            Ok(mut f) => {
                if let Err(e) = server.tree.snapshot(&mut f) {
                    log::warn!("snapshot to {path} failed: {e}");
                }
            }
            Err(e) => log::warn!("failed to open {path} for snapshot: {e}"),
        },
    }
}
