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

//! The cooperative pause/resume gate every worker passes through before
//! interpreting a command. `p` stops new commands from being served; `g`
//! lets them through again.
//!
//! The wait is timed rather than unbounded so a worker that gets cancelled
//! while paused notices promptly instead of sleeping until the next resume.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            resumed: Condvar::new(),
        }
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Block the caller while the gate is paused. Returns early if `cancelled`
    /// becomes set, whether or not the gate has since resumed.
    pub fn wait_while_paused(&self, cancelled: &AtomicBool) {
        let mut guard = self.paused.lock();
        while *guard {
            if cancelled.load(Ordering::Relaxed) {
                return;
            }
            self.resumed.wait_for(&mut guard, POLL_INTERVAL);
        }
    }
}
