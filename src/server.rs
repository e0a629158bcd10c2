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

//! The shared state every long-lived thread (listener, workers, control plane)
//! holds a clone of: the tree, the worker registry, the pause gate, and the
//! accept flag.

use crate::pausegate::PauseGate;
use crate::registry::Registry;
use crate::tree::Tree;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Server {
    pub tree: Tree,
    pub registry: Registry,
    pub pause_gate: PauseGate,
    pub accepting: AtomicBool,
    pub max_connections: usize,
}

impl Server {
    pub fn new(max_connections: usize) -> Self {
        Self {
            tree: Tree::new(),
            registry: Registry::new(),
            pause_gate: PauseGate::new(),
            accepting: AtomicBool::new(true),
            max_connections,
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }

    pub fn at_capacity(&self) -> bool {
        self.registry.len() >= self.max_connections
    }
}
