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

//! Fatal/startup error type. Per-command outcomes are plain reply strings, not this type.

use std::{fmt, io};

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    IoErrorExtra(io::Error, String),
    Config(String),
}

impl Error {
    pub fn ioerror_extra(ioe: io::Error, extra: impl ToString) -> Self {
        Self::IoErrorExtra(ioe, extra.to_string())
    }
    pub fn config(msg: impl ToString) -> Self {
        Self::Config(msg.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "I/O error: {e}"),
            Self::IoErrorExtra(e, extra) => write!(f, "I/O error while {extra}: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e)
    }
}
