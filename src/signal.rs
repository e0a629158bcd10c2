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

//! A dedicated thread that waits for `SIGINT` synchronously via `sigwait`,
//! so the signal is delivered to exactly one thread instead of racing every
//! worker thread's default disposition.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Block `SIGINT` on the calling thread. Every thread spawned afterwards
/// inherits a blocked mask, which is what makes `sigwait` on the monitor
/// thread the sole receiver. Must run on the process's main thread before
/// any other thread is spawned.
pub fn block_sigint_on_current_thread() -> io::Result<()> {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

/// Ignore `SIGPIPE` process-wide, so a write to a socket the peer has closed
/// surfaces as an `EPIPE` `io::Error` instead of terminating the process.
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

pub struct SignalMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SignalMonitor {
    /// Spawn the monitor thread. `on_interrupt` runs every time `SIGINT`
    /// arrives for real (not on the poison wakeup used by [`Self::join`]).
    pub fn spawn<F>(on_interrupt: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("signal-monitor".to_owned())
            .spawn(move || signal_loop(&loop_stop, on_interrupt))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the monitor to stop and join it. Delivers a poison `SIGINT` to
    /// wake a blocked `sigwait` without treating it as a real interrupt.
    ///
    /// The wakeup must be process-directed (`kill`), not thread-directed
    /// (`raise`): `raise` targets the calling thread, which is the operator
    /// console thread that blocked `SIGINT` on itself in `main`, not the
    /// monitor thread parked in `sigwait`. A thread-directed signal to a
    /// thread that has it blocked just queues it there forever and the
    /// monitor never wakes, hanging shutdown.
    pub fn join(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        unsafe {
            libc::kill(libc::getpid(), libc::SIGINT);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn signal_loop<F>(stop: &AtomicBool, on_interrupt: F)
where
    F: Fn(),
{
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
    }
    loop {
        let mut delivered: libc::c_int = 0;
        let rc = unsafe { libc::sigwait(&set, &mut delivered) };
        if rc != 0 {
            log::error!("sigwait failed with code {rc}, signal monitor exiting");
            return;
        }
        if stop.load(Ordering::Relaxed) {
            return;
        }
        log::info!("SIGINT received, cancelling all clients");
        on_interrupt();
    }
}
