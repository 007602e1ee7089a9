//-
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

//! A scripted in-memory `Transport` for tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Request, Response, Transport};
use crate::support::error::Error;

pub type RequestLog = Rc<RefCell<Vec<Request>>>;

pub struct FakeTransport {
    handler: Box<dyn FnMut(&Request) -> Result<Response, Error>>,
    log: RequestLog,
    ntlm: Option<Rc<Cell<bool>>>,
}

impl FakeTransport {
    /// Create a transport which answers every request with `handler`.
    ///
    /// Every request is also appended to the returned log.
    pub fn new(
        handler: impl FnMut(&Request) -> Result<Response, Error> + 'static,
    ) -> (Self, RequestLog) {
        let log = RequestLog::default();
        (
            FakeTransport {
                handler: Box::new(handler),
                log: Rc::clone(&log),
                ntlm: None,
            },
            log,
        )
    }

    /// Make the transport claim NTLM support; `flag` is set once the client
    /// switches to it.
    pub fn with_ntlm(mut self, flag: Rc<Cell<bool>>) -> Self {
        self.ntlm = Some(flag);
        self
    }
}

impl Transport for FakeTransport {
    fn execute(&mut self, request: &Request) -> Result<Response, Error> {
        self.log.borrow_mut().push(request.clone());
        (self.handler)(request)
    }

    fn enable_ntlm(&mut self) -> bool {
        match self.ntlm {
            Some(ref flag) => {
                flag.set(true);
                true
            }
            None => false,
        }
    }
}

/// The path and query of `request`, e.g. `/owa/auth.owa?a=b`.
pub fn path_of(request: &Request) -> String {
    match url::Url::parse(&request.url) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_owned(),
        },
        Err(_) => request.url.clone(),
    }
}
