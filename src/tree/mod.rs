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

//! A concurrent, unbalanced binary search tree with hand-over-hand (lock-coupled)
//! reader/writer locking.
//!
//! Every node carries its own [`RwLock`]. A descent never holds more than two locks
//! at once (the current node and the child it is about to step into), and always
//! acquires the child's lock before releasing the current node's — this is what makes
//! the descent safe against a concurrent insert/remove splicing a node in or out
//! behind it. Nodes are reference-counted (`Arc`) rather than owned outright, so a
//! node unlinked by `remove` is freed the moment the last in-flight descent holding a
//! clone of it drops that clone; there is no unsafe manual reclamation here.
//!
//! The root is a permanent sentinel with an empty key. Because an empty key compares
//! less than every real key, all real data lives in the sentinel's right subtree; no
//! special case is needed in the descent code for this.

use crate::util::compiler::{likely, unlikely};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use std::io::{self, Write};
use std::sync::Arc;

/// Keys and values longer than this (in bytes) are rejected.
pub const MAX_FIELD_LEN: usize = 256;

type NodeRef = Arc<RwLock<NodeData>>;
type ReadGuard = ArcRwLockReadGuard<RawRwLock, NodeData>;
type WriteGuard = ArcRwLockWriteGuard<RawRwLock, NodeData>;

struct NodeData {
    key: String,
    value: String,
    left: Option<NodeRef>,
    right: Option<NodeRef>,
}

impl NodeData {
    fn leaf(key: String, value: String) -> Self {
        Self {
            key,
            value,
            left: None,
            right: None,
        }
    }
    fn sentinel() -> Self {
        Self::leaf(String::new(), String::new())
    }
}

/// Outcome of [`Tree::insert`].
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    AlreadyPresent,
    /// Key or value exceeded [`MAX_FIELD_LEN`] bytes.
    Rejected,
}

/// Outcome of [`Tree::remove`].
#[derive(Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Absent,
}

/// The concurrent ordered map.
pub struct Tree {
    root: NodeRef,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` if `key` and `value` are each within the accepted field length.
fn fields_within_limit(key: &str, value: &str) -> bool {
    key.len() <= MAX_FIELD_LEN && value.len() <= MAX_FIELD_LEN
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(NodeData::sentinel())),
        }
    }

    /// Look up `key`. Never mutates; may run concurrently with any other `query`.
    pub fn query(&self, key: &str) -> Option<String> {
        let mut guard: ReadGuard = self.root.read_arc();
        loop {
            let child = if key < guard.key.as_str() {
                guard.left.clone()
            } else {
                guard.right.clone()
            };
            match child {
                None => return None,
                Some(child_ref) => {
                    // acquire the child's lock while the parent is still held
                    // (hand-over-hand), compare, then drop the parent by replacing
                    // `guard` with the child's guard.
                    let child_guard = child_ref.read_arc();
                    if likely(child_guard.key == key) {
                        return Some(child_guard.value.clone());
                    }
                    guard = child_guard;
                }
            }
        }
    }

    /// Insert `key` -> `value`. Leaves the tree unchanged if `key` is already present.
    pub fn insert(&self, key: String, value: String) -> InsertOutcome {
        if unlikely(!fields_within_limit(&key, &value)) {
            return InsertOutcome::Rejected;
        }
        let mut guard: WriteGuard = self.root.write_arc();
        loop {
            let go_left = key.as_str() < guard.key.as_str();
            let child = if go_left {
                guard.left.clone()
            } else {
                guard.right.clone()
            };
            match child {
                None => {
                    let node = Arc::new(RwLock::new(NodeData::leaf(key, value)));
                    if go_left {
                        guard.left = Some(node);
                    } else {
                        guard.right = Some(node);
                    }
                    return InsertOutcome::Added;
                }
                Some(child_ref) => {
                    let child_guard = child_ref.write_arc();
                    if child_guard.key == key {
                        return InsertOutcome::AlreadyPresent;
                    }
                    guard = child_guard;
                }
            }
        }
    }

    /// Remove `key`, if present.
    pub fn remove(&self, key: &str) -> RemoveOutcome {
        let mut parent: WriteGuard = self.root.write_arc();
        loop {
            let go_left = key < parent.key.as_str();
            let child = if go_left {
                parent.left.clone()
            } else {
                parent.right.clone()
            };
            match child {
                None => return RemoveOutcome::Absent,
                Some(child_ref) => {
                    let d = child_ref.write_arc();
                    if d.key == key {
                        self.remove_found(parent, d, go_left);
                        return RemoveOutcome::Removed;
                    }
                    parent = d;
                }
            }
        }
    }

    /// `parent` and `d` (the node being removed) are both write-locked; `go_left`
    /// says which of `parent`'s child links points at `d`.
    fn remove_found(&self, mut parent: WriteGuard, mut d: WriteGuard, go_left: bool) {
        if d.left.is_none() || d.right.is_none() {
            // Case A: at most one child.
            let replacement = d.left.clone().or_else(|| d.right.clone());
            if go_left {
                parent.left = replacement;
            } else {
                parent.right = replacement;
            }
            // d and parent drop here, releasing their locks; d's Arc clone held
            // by this function is the last reference once the caller's own
            // clone (used only to get here) is gone, so the node is freed.
        } else {
            // Case B: two children. D is not relinked; only its key/value are
            // overwritten with the in-order successor's. D's own lock is held
            // for the whole successor search, so no other mutator can touch it.
            drop(parent);
            let mut cur = d
                .right
                .clone()
                .expect("two children implies a right child")
                .write_arc();
            let mut pred: Option<WriteGuard> = None;
            loop {
                let left = cur.left.clone();
                match left {
                    None => break,
                    Some(next_ref) => {
                        let next = next_ref.write_arc();
                        pred = Some(cur);
                        cur = next;
                    }
                }
            }
            // `cur` is the successor S; rewrite whichever link pointed at it.
            let s_right = cur.right.clone();
            match pred {
                None => d.right = s_right,
                Some(mut p) => p.left = s_right,
            }
            d.key = std::mem::take(&mut cur.key);
            d.value = std::mem::take(&mut cur.value);
            // cur (S) and d drop here.
        }
    }

    /// Pre-order snapshot of the whole tree to `writer`, one node per line, each
    /// line indented by one space per depth level. See module docs for the exact
    /// textual format.
    pub fn snapshot(&self, writer: &mut dyn Write) -> io::Result<()> {
        let guard = self.root.read_arc();
        writeln!(writer, "(root)")?;
        Self::snapshot_child(guard.left.clone(), 1, writer)?;
        Self::snapshot_child(guard.right.clone(), 1, writer)?;
        Ok(())
    }

    fn snapshot_child(link: Option<NodeRef>, depth: usize, writer: &mut dyn Write) -> io::Result<()> {
        let indent = " ".repeat(depth);
        match link {
            None => writeln!(writer, "{indent}(null)"),
            Some(node_ref) => {
                let guard = node_ref.read_arc();
                writeln!(writer, "{indent}{} {}", guard.key, guard.value)?;
                let (left, right) = (guard.left.clone(), guard.right.clone());
                drop(guard);
                Self::snapshot_child(left, depth + 1, writer)?;
                Self::snapshot_child(right, depth + 1, writer)
            }
        }
    }

    /// Consume the tree, freeing every node. Must only be called once all workers
    /// have been joined (no tree lock may be held by anyone else at this point).
    ///
    /// Frees iteratively with an explicit work stack instead of relying on `Arc`'s
    /// recursive `Drop`, so an adversarially skewed (effectively linear) tree can't
    /// blow the stack on the way down.
    pub fn shutdown(self) {
        let mut stack = Vec::new();
        {
            let mut root = self.root.write();
            stack.extend(root.left.take());
            stack.extend(root.right.take());
        }
        while let Some(node) = stack.pop() {
            if let Ok(mut data) = Arc::try_unwrap(node).map(RwLock::into_inner) {
                stack.extend(data.left.take());
                stack.extend(data.right.take());
            }
            // else: another clone of this Arc is still outstanding (an in-flight
            // descent); it will be freed when that clone drops instead.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_query_roundtrips() {
        let t = Tree::new();
        assert_eq!(t.insert("apple".into(), "red".into()), InsertOutcome::Added);
        assert_eq!(t.query("apple"), Some("red".to_owned()));
        assert_eq!(t.query("banana"), None);
    }

    #[test]
    fn insert_is_idempotent() {
        let t = Tree::new();
        assert_eq!(t.insert("apple".into(), "red".into()), InsertOutcome::Added);
        assert_eq!(
            t.insert("apple".into(), "green".into()),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(t.query("apple"), Some("red".to_owned()));
    }

    #[test]
    fn remove_then_query_is_absent() {
        let t = Tree::new();
        t.insert("apple".into(), "red".into());
        assert_eq!(t.remove("apple"), RemoveOutcome::Removed);
        assert_eq!(t.query("apple"), None);
        assert_eq!(t.remove("apple"), RemoveOutcome::Absent);
    }

    #[test]
    fn remove_on_empty_tree_is_absent() {
        let t = Tree::new();
        assert_eq!(t.remove("anything"), RemoveOutcome::Absent);
    }

    #[test]
    fn remove_case_a_relinks_single_child() {
        let t = Tree::new();
        // b has only a left child `a` once `c` is not present.
        t.insert("b".into(), "2".into());
        t.insert("a".into(), "1".into());
        assert_eq!(t.remove("b"), RemoveOutcome::Removed);
        assert_eq!(t.query("a"), Some("1".to_owned()));
        assert_eq!(t.query("b"), None);
    }

    #[test]
    fn remove_case_b_uses_successor_at_depth_two() {
        let t = Tree::new();
        // Build: b (root-ish) with left=a, right=f; f's left subtree has a
        // leftmost descendant several levels deep, so the successor search
        // takes more than one hop.
        for (k, v) in [
            ("b", "2"),
            ("a", "1"),
            ("f", "6"),
            ("d", "4"),
            ("e", "5"),
            ("c", "3"),
            ("h", "8"),
        ] {
            assert_eq!(t.insert(k.into(), v.into()), InsertOutcome::Added);
        }
        // successor of b's right subtree (rooted at f) walking left: f -> d -> c
        assert_eq!(t.remove("b"), RemoveOutcome::Removed);
        assert_eq!(t.query("b"), None);
        for (k, v) in [("a", "1"), ("f", "6"), ("d", "4"), ("e", "5"), ("c", "3"), ("h", "8")] {
            assert_eq!(t.query(k), Some(v.to_owned()));
        }
    }

    #[test]
    fn snapshot_matches_scenario_3() {
        let t = Tree::new();
        t.insert("b".into(), "2".into());
        t.insert("a".into(), "1".into());
        t.insert("c".into(), "3".into());
        t.remove("b");
        let mut buf = Vec::new();
        t.snapshot(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "(root)");
        assert_eq!(lines[1], " a 1");
        assert_eq!(lines[2], "  (null)");
        assert_eq!(lines[3], "  c 3");
    }

    #[test]
    fn boundary_256_accepted_257_rejected() {
        let t = Tree::new();
        let k256 = "k".repeat(MAX_FIELD_LEN);
        let v256 = "v".repeat(MAX_FIELD_LEN);
        assert_eq!(t.insert(k256.clone(), v256), InsertOutcome::Added);
        let k257 = "k".repeat(MAX_FIELD_LEN + 1);
        assert_eq!(
            t.insert(k257, "v".repeat(MAX_FIELD_LEN)),
            InsertOutcome::Rejected
        );
    }

    #[test]
    fn in_order_traversal_is_sorted_and_unique() {
        let t = Tree::new();
        let keys = ["m", "a", "z", "c", "m2", "b", "a0", "zz"];
        for k in keys {
            t.insert(k.into(), "x".into());
        }
        let mut buf = Vec::new();
        t.snapshot(&mut buf).unwrap();
        // Re-derive sorted order from the snapshot's pre-order text by re-parsing
        // (pre-order isn't sorted, so instead assert BST property directly via a
        // manual in-order walk)
        fn in_order(node: &Option<NodeRef>, out: &mut Vec<String>) {
            if let Some(n) = node {
                let g = n.read();
                in_order(&g.left, out);
                out.push(g.key.clone());
                in_order(&g.right, out);
            }
        }
        let mut out = Vec::new();
        {
            let g = t.root.read();
            in_order(&g.left, &mut out);
            in_order(&g.right, &mut out);
        }
        let mut sorted = out.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(out, sorted);
        assert_eq!(out.len(), keys.len());
        let _ = buf;
    }

    #[test]
    fn concurrent_inserts_of_same_key_have_exactly_one_winner() {
        use std::thread;
        let t = Arc::new(Tree::new());
        let mut handles = Vec::new();
        for v in ["v1", "v2"] {
            let t = Arc::clone(&t);
            let v = v.to_owned();
            handles.push(thread::spawn(move || t.insert("k".into(), v)));
        }
        let results: Vec<InsertOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let added = results.iter().filter(|r| **r == InsertOutcome::Added).count();
        let present = results
            .iter()
            .filter(|r| **r == InsertOutcome::AlreadyPresent)
            .count();
        assert_eq!(added, 1);
        assert_eq!(present, 1);
        let winner = t.query("k").unwrap();
        assert!(winner == "v1" || winner == "v2");
    }

    #[test]
    fn shutdown_frees_a_skewed_tree_without_overflow() {
        let t = Tree::new();
        for i in 0..50_000u32 {
            t.insert(format!("{i:010}"), "x".into());
        }
        t.shutdown();
    }
}
