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

//! Raw HTTP exchange types and the seam behind which the real network lives.
//!
//! Everything above this module speaks in terms of `Request` and `Response`;
//! only `http::UreqTransport` knows about sockets.

pub mod client;
pub mod cookie;
#[cfg(test)]
pub mod fake;
pub mod http;

use std::fmt;

use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Propfind,
    Proppatch,
    Search,
    Move,
    Copy,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Propfind => "PROPFIND",
            Method::Proppatch => "PROPPATCH",
            Method::Search => "SEARCH",
            Method::Move => "MOVE",
            Method::Copy => "COPY",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    /// Absolute URL. `client::HttpClient` resolves relative references
    /// before the request reaches a `Transport`.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Request::new(Method::Get, url)
    }

    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers
            .push(("Content-Type".to_owned(), content_type.to_owned()));
        self.body = body;
        self
    }

    /// Build an `application/x-www-form-urlencoded` POST.
    pub fn form(url: impl Into<String>, params: &[(String, String)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|&(ref k, ref v)| (k, v)))
            .finish();
        Request::new(Method::Post, url).body(
            "application/x-www-form-urlencoded",
            encoded.into_bytes(),
        )
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    /// The URL this response was actually served from.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Response {
            status,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn all_headers<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |&&(ref k, _)| k.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
            && self.header("Location").is_some()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Map a non-success status onto the error taxonomy.
    pub fn check(self) -> Result<Self, Error> {
        match self.status {
            200..=299 => Ok(self),
            401 => Err(Error::AuthenticationFailed(format!(
                "{} rejected credentials",
                self.url
            ))),
            404 => Err(Error::NotFound(self.url)),
            412 => Err(Error::PreconditionFailed(self.url)),
            status => Err(Error::ServerError(format!(
                "{} returned status {}",
                self.url, status
            ))),
        }
    }
}

fn find_header<'a>(
    headers: &'a [(String, String)],
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|&&(ref k, _)| k.eq_ignore_ascii_case(name))
        .map(|&(_, ref v)| v.as_str())
}

/// A single raw HTTP exchange.
///
/// Implementations do not follow redirects and do not turn statuses into
/// errors; a 401 or 500 is returned as an ordinary `Response`. Only failure
/// to complete the exchange at all is an `Err`.
pub trait Transport {
    fn execute(&mut self, request: &Request) -> Result<Response, Error>;

    /// Switch to NTLM negotiation for subsequent requests.
    ///
    /// Returns whether the transport supports it. Called at most once per
    /// session, when endpoint verification failed with plain credentials.
    fn enable_ntlm(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(Response::new(207, "u").check().is_ok());
        assert_matches!(
            Err(Error::AuthenticationFailed(..)),
            Response::new(401, "u").check()
        );
        assert_matches!(Err(Error::NotFound(..)), Response::new(404, "u").check());
        assert_matches!(
            Err(Error::PreconditionFailed(..)),
            Response::new(412, "u").check()
        );
        assert_matches!(
            Err(Error::ServerError(..)),
            Response::new(503, "u").check()
        );
    }

    #[test]
    fn form_encoding() {
        let request = Request::form(
            "https://host/owa/auth.owa",
            &[
                ("username".to_owned(), "DOM\\user".to_owned()),
                ("password".to_owned(), "p&ss w".to_owned()),
            ],
        );
        assert_eq!(Method::Post, request.method);
        assert_eq!(
            Some("application/x-www-form-urlencoded"),
            request.header_value("content-type")
        );
        assert_eq!("username=DOM%5Cuser&password=p%26ss+w", request.body_text());
    }
}
