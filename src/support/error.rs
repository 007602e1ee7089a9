//-
// Copyright (c) 2020, Jason Lingle
// Copyright (c) 2026, The Exgate Developers
//
// This file is part of Exgate.
//
// Exgate is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Exgate is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Exgate. If not, see <http://www.gnu.org/licenses/>.

use std::io;

use thiserror::Error;

/// Every failure the session core can report.
///
/// Front-ends translate these into their own wire codes; nothing below the
/// front-end ever produces an untyped error.
#[derive(Error, Debug)]
pub enum Error {
    /// The server could not be reached at all. Never retried.
    #[error("Unable to connect: {0}")]
    Connectivity(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Bad credentials, exhausted OTP attempts, or a login flow that could
    /// not be driven to completion.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    /// Optimistic concurrency conflict; the caller must re-read and retry.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// An unexpected but well-formed response, or a body we could not parse.
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Interrupted by client")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error indicates that the server is unreachable, as opposed
    /// to the server rejecting what we asked of it.
    pub fn is_connectivity(&self) -> bool {
        matches!(*self, Error::Connectivity(..) | Error::Timeout(..))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(*self, Error::NotFound(..))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::ServerError(format!("Malformed XML response: {}", e))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::ServerError(format!("Malformed XML attribute: {}", e))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Configuration(format!("Bad URL: {}", e))
    }
}
