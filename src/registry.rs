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

//! The live-worker registry: tracks every connected client's cancellation flag
//! and socket handle, and provides the quiescence barrier shutdown waits on.
//!
//! Spec-wise this plays the role of the intrusive doubly-linked worker list;
//! a `HashMap` keyed by a monotonic id gives the same O(1) insert/remove and
//! full-registry iteration without unsafe intrusive-list bookkeeping.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub type WorkerId = u64;

/// What the registry needs to reach into a live worker from the outside:
/// a flag it can raise to ask the worker to stop, and the socket whose
/// blocking read that flag alone cannot interrupt.
pub struct WorkerHandle {
    cancel: Arc<AtomicBool>,
    stream: TcpStream,
}

impl WorkerHandle {
    pub fn new(cancel: Arc<AtomicBool>, stream: TcpStream) -> Self {
        Self { cancel, stream }
    }
}

#[derive(Default)]
struct Inner {
    workers: HashMap<WorkerId, WorkerHandle>,
}

pub struct Registry {
    inner: Mutex<Inner>,
    all_gone: Condvar,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            all_gone: Condvar::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh id for a worker that is about to be registered.
    pub fn next_id(&self) -> WorkerId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, id: WorkerId, handle: WorkerHandle) {
        self.inner.lock().workers.insert(id, handle);
    }

    /// Remove a worker on its way out. Wakes anyone waiting for quiescence
    /// if this was the last one.
    pub fn remove(&self, id: WorkerId) {
        let mut inner = self.inner.lock();
        inner.workers.remove(&id);
        if inner.workers.is_empty() {
            self.all_gone.notify_all();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raise the cancellation flag on every live worker and force its socket
    /// closed so a blocked read unblocks immediately rather than waiting out
    /// the next poll interval.
    pub fn cancel_all(&self) {
        let inner = self.inner.lock();
        for handle in inner.workers.values() {
            handle.cancel.store(true, Ordering::Relaxed);
            let _ = handle.stream.shutdown(Shutdown::Both);
        }
    }

    /// Block until every registered worker has deregistered.
    pub fn wait_until_empty(&self) {
        let mut inner = self.inner.lock();
        while !inner.workers.is_empty() {
            self.all_gone.wait(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn dummy_stream() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        client
    }

    #[test]
    fn insert_and_remove_tracks_count() {
        let reg = Registry::new();
        assert!(reg.is_empty());
        let id = reg.next_id();
        reg.insert(id, WorkerHandle::new(Arc::new(AtomicBool::new(false)), dummy_stream()));
        assert_eq!(reg.len(), 1);
        reg.remove(id);
        assert!(reg.is_empty());
    }

    #[test]
    fn cancel_all_raises_every_flag() {
        let reg = Registry::new();
        let flags: Vec<Arc<AtomicBool>> = (0..5).map(|_| Arc::new(AtomicBool::new(false))).collect();
        for flag in &flags {
            let id = reg.next_id();
            reg.insert(id, WorkerHandle::new(Arc::clone(flag), dummy_stream()));
        }
        reg.cancel_all();
        for flag in &flags {
            assert!(flag.load(Ordering::Relaxed));
        }
    }

    #[test]
    fn wait_until_empty_returns_once_last_worker_leaves() {
        let reg = Arc::new(Registry::new());
        let id = reg.next_id();
        reg.insert(id, WorkerHandle::new(Arc::new(AtomicBool::new(false)), dummy_stream()));

        let waiter_reg = Arc::clone(&reg);
        let waiter = std::thread::spawn(move || {
            waiter_reg.wait_until_empty();
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        reg.remove(id);
        waiter.join().unwrap();
    }
}
