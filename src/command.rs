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

//! The client-command grammar: one verb byte plus whitespace-separated token
//! arguments, dispatched against a [`Tree`].

use crate::tree::{InsertOutcome, RemoveOutcome, Tree};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};

/// Arguments longer than this are rejected at parse time. Matches
/// `tree::MAX_FIELD_LEN` so a legitimate 256-byte key or value can actually
/// reach the tree instead of bouncing at the protocol layer.
const MAX_TOKEN_LEN: usize = 256;
/// Replies are truncated to this many bytes.
const MAX_REPLY_LEN: usize = 2048;

const ILL_FORMED: &str = "ill-formed command";
const NOT_FOUND: &str = "not found";
const ADDED: &str = "added";
const ALREADY_PRESENT: &str = "already in database";
const REMOVED: &str = "removed";
const NOT_IN_DATABASE: &str = "not in database";
const BAD_FILE_NAME: &str = "bad file name";
const FILE_PROCESSED: &str = "file processed";

/// Parse and run one command line against `tree`, returning the reply.
///
/// `cancelled` is polled between lines of a `f` (file) command, which is the one
/// verb long-running enough to need a mid-flight cancellation check.
pub fn interpret(tree: &Tree, line: &str, cancelled: &AtomicBool) -> String {
    if line.len() < 2 {
        return ILL_FORMED.to_owned();
    }
    let verb = line.as_bytes()[0];
    let tokens: Vec<&str> = line[1..].split_whitespace().collect();
    if tokens.iter().any(|t| t.len() > MAX_TOKEN_LEN) {
        return ILL_FORMED.to_owned();
    }
    match verb {
        b'q' => match tokens.as_slice() {
            [key] => match tree.query(key) {
                Some(value) => truncate_reply(&value),
                None => NOT_FOUND.to_owned(),
            },
            _ => ILL_FORMED.to_owned(),
        },
        b'a' => match tokens.as_slice() {
            [key, value] => match tree.insert((*key).to_owned(), (*value).to_owned()) {
                InsertOutcome::Added => ADDED.to_owned(),
                InsertOutcome::AlreadyPresent => ALREADY_PRESENT.to_owned(),
                InsertOutcome::Rejected => ILL_FORMED.to_owned(),
            },
            _ => ILL_FORMED.to_owned(),
        },
        b'd' => match tokens.as_slice() {
            [key] => match tree.remove(key) {
                RemoveOutcome::Removed => REMOVED.to_owned(),
                RemoveOutcome::Absent => NOT_IN_DATABASE.to_owned(),
            },
            _ => ILL_FORMED.to_owned(),
        },
        b'f' => match tokens.as_slice() {
            [path] => run_file(tree, path, cancelled),
            _ => ILL_FORMED.to_owned(),
        },
        _ => ILL_FORMED.to_owned(),
    }
}

fn run_file(tree: &Tree, path: &str, cancelled: &AtomicBool) -> String {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return BAD_FILE_NAME.to_owned(),
    };
    for line in BufReader::new(file).lines() {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        let Ok(line) = line else { break };
        // the reply of each nested line is discarded (overwritten on every
        // iteration); only the final "file processed" reply reaches the client
        let _ = interpret(tree, &line, cancelled);
    }
    FILE_PROCESSED.to_owned()
}

fn truncate_reply(value: &str) -> String {
    if value.len() <= MAX_REPLY_LEN {
        return value.to_owned();
    }
    let mut end = MAX_REPLY_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fresh() -> (Tree, AtomicBool) {
        (Tree::new(), AtomicBool::new(false))
    }

    #[test]
    fn scenario_one() {
        let (t, c) = fresh();
        assert_eq!(interpret(&t, "a apple red", &c), "added");
        assert_eq!(interpret(&t, "q apple", &c), "red");
        assert_eq!(interpret(&t, "q banana", &c), "not found");
    }

    #[test]
    fn scenario_two() {
        let (t, c) = fresh();
        assert_eq!(interpret(&t, "a apple red", &c), "added");
        assert_eq!(interpret(&t, "a apple green", &c), "already in database");
        assert_eq!(interpret(&t, "q apple", &c), "red");
    }

    #[test]
    fn delete_round_trip() {
        let (t, c) = fresh();
        interpret(&t, "a k v", &c);
        assert_eq!(interpret(&t, "d k", &c), "removed");
        assert_eq!(interpret(&t, "d k", &c), "not in database");
    }

    #[test]
    fn malformed_commands() {
        let (t, c) = fresh();
        assert_eq!(interpret(&t, "", &c), "ill-formed command");
        assert_eq!(interpret(&t, "q", &c), "ill-formed command");
        assert_eq!(interpret(&t, "a onlyonetoken", &c), "ill-formed command");
        assert_eq!(interpret(&t, "z k", &c), "ill-formed command");
        assert_eq!(interpret(&t, "q k extra", &c), "ill-formed command");
    }

    #[test]
    fn token_at_256_bytes_is_accepted() {
        let (t, c) = fresh();
        let key = "k".repeat(256);
        assert_eq!(interpret(&t, &format!("a {key} v"), &c), "added");
        assert_eq!(interpret(&t, &format!("q {key}"), &c), "v");
    }

    #[test]
    fn oversize_token_is_ill_formed() {
        let (t, c) = fresh();
        let huge = "k".repeat(257);
        assert_eq!(interpret(&t, &format!("q {huge}"), &c), "ill-formed command");
    }

    #[test]
    fn query_reply_is_truncated_not_erred() {
        let (t, c) = fresh();
        let big_value = "v".repeat(MAX_REPLY_LEN + 500);
        // insert bypasses the 256-byte token limit path by going straight to the
        // tree (values up to 256 bytes are legal; this exercises truncation logic
        // in isolation against the formatter, independent of the insert path).
        let truncated_direct = truncate_reply(&big_value);
        assert_eq!(truncated_direct.len(), MAX_REPLY_LEN);
        let _ = t;
        let _ = c;
    }

    #[test]
    fn file_verb_runs_each_line_and_reports_processed() {
        let (t, c) = fresh();
        let path = std::env::temp_dir().join(format!(
            "handover-test-{}-{}.cmds",
            std::process::id(),
            "file_verb_runs_each_line_and_reports_processed"
        ));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "a x 1").unwrap();
            writeln!(f, "a y 2").unwrap();
        }
        let reply = interpret(&t, &format!("f {}", path.display()), &c);
        assert_eq!(reply, "file processed");
        assert_eq!(interpret(&t, "q x", &c), "1");
        assert_eq!(interpret(&t, "q y", &c), "2");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_verb_bad_path() {
        let (t, c) = fresh();
        assert_eq!(interpret(&t, "f /no/such/path/at/all", &c), "bad file name");
    }

    #[test]
    fn file_verb_stops_early_when_cancelled() {
        let (t, c) = fresh();
        let path = std::env::temp_dir().join(format!(
            "handover-test-{}-{}.cmds",
            std::process::id(),
            "file_verb_stops_early_when_cancelled"
        ));
        {
            let mut f = std::fs::File::create(&path).unwrap();
            for i in 0..1000 {
                writeln!(f, "a k{i} v{i}").unwrap();
            }
        }
        c.store(true, Ordering::Relaxed);
        let reply = interpret(&t, &format!("f {}", path.display()), &c);
        assert_eq!(reply, "file processed");
        assert_eq!(interpret(&t, "q k0", &c), "not found");
        std::fs::remove_file(&path).unwrap();
    }
}
