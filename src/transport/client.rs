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

use std::io::Read;

use log::debug;
use url::Url;

use super::cookie::CookieJar;
use super::{Method, Request, Response, Transport};
use crate::support::error::Error;
use crate::support::interrupt::Interrupt;
use crate::support::log_prefix::LogPrefix;

const MAX_REDIRECTS: u32 = 10;

/// Basic credentials, only ever sent to the origin they were set for.
struct Credentials {
    origin: url::Origin,
    header: String,
}

/// The stateful HTTP client owned by one session.
///
/// Wraps a raw `Transport` with the things every page fetch needs: cookie
/// replay, optional Basic credentials, relative URL resolution, redirect
/// following and gzip decoding.
pub struct HttpClient {
    transport: Box<dyn Transport>,
    cookies: CookieJar,
    credentials: Option<Credentials>,
    user_agent: String,
    last_url: Url,
    interrupt: Interrupt,
    log_prefix: LogPrefix,
}

impl HttpClient {
    pub fn new(
        transport: Box<dyn Transport>,
        base_url: &str,
        user_agent: String,
        log_prefix: LogPrefix,
    ) -> Result<Self, Error> {
        Ok(HttpClient {
            transport,
            cookies: CookieJar::new(),
            credentials: None,
            user_agent,
            last_url: Url::parse(base_url)?,
            interrupt: Interrupt::new(),
            log_prefix,
        })
    }

    /// Attach Basic credentials to every later request to the origin of
    /// the current URL.
    pub fn set_basic_credentials(&mut self, user: &str, password: &str) {
        self.credentials = Some(Credentials {
            origin: self.last_url.origin(),
            header: format!(
                "Basic {}",
                base64::encode(format!("{}:{}", user, password))
            ),
        });
    }

    pub fn clear_basic_credentials(&mut self) {
        self.credentials = None;
    }

    pub fn has_basic_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// Set a cookie for the host of the current URL.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.set(&self.last_url, name, value);
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// The URL of the most recently received response.
    pub fn last_url(&self) -> &Url {
        &self.last_url
    }

    pub fn resolve(&self, reference: &str) -> Result<Url, Error> {
        Ok(self.last_url.join(reference)?)
    }

    pub fn enable_ntlm(&mut self) -> bool {
        self.transport.enable_ntlm()
    }

    /// Perform exactly one exchange without following redirects.
    pub fn send(&mut self, mut request: Request) -> Result<Response, Error> {
        let url = self.resolve(&request.url)?;
        request.url = url.to_string();

        if request.header_value("Cookie").is_none() {
            if let Some(cookie) = self.cookies.header_value(&url) {
                request.headers.push(("Cookie".to_owned(), cookie));
            }
        }
        if let Some(ref credentials) = self.credentials {
            if credentials.origin == url.origin() {
                request.headers.push((
                    "Authorization".to_owned(),
                    credentials.header.clone(),
                ));
            } else {
                debug!(
                    "{} Not sending credentials to {}",
                    self.log_prefix,
                    url.origin().ascii_serialization()
                );
            }
        }
        if request.header_value("User-Agent").is_none() {
            request
                .headers
                .push(("User-Agent".to_owned(), self.user_agent.clone()));
        }
        request
            .headers
            .push(("Accept-Encoding".to_owned(), "gzip".to_owned()));

        let mut response = self.transport.execute(&request)?;
        debug!(
            "{} {} {} -> {}",
            self.log_prefix, request.method, request.url, response.status
        );

        let response_url = Url::parse(&response.url).unwrap_or(url);
        for set_cookie in response.all_headers("Set-Cookie") {
            self.cookies.store(&response_url, set_cookie);
        }
        decode_body(&mut response)?;

        self.last_url = response_url;

        Ok(response)
    }

    /// Perform `request`, following up to 10 redirects.
    ///
    /// 301, 302 and 303 turn the request into a body-less GET (except for
    /// HEAD); 307 and 308 replay it unchanged.
    pub fn fetch(&mut self, mut request: Request) -> Result<Response, Error> {
        for _ in 0..=MAX_REDIRECTS {
            let response = self.send(request.clone())?;
            if !response.is_redirect() {
                return Ok(response);
            }

            let location = response.header("Location").unwrap_or_default();
            let next = Url::parse(&response.url)?.join(location)?;
            debug!("{} Redirected to {}", self.log_prefix, next);

            if matches!(response.status, 301 | 302 | 303)
                && Method::Head != request.method
            {
                request.method = Method::Get;
                request.body.clear();
                request
                    .headers
                    .retain(|&(ref k, _)| !k.eq_ignore_ascii_case("content-type"));
            }
            request.url = next.to_string();
        }

        Err(Error::ServerError(format!(
            "Too many redirects from {}",
            request.url
        )))
    }

    pub fn get(&mut self, url: &str) -> Result<Response, Error> {
        self.fetch(Request::get(url))
    }

    pub fn post_form(
        &mut self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Response, Error> {
        self.fetch(Request::form(url, params))
    }
}

fn decode_body(response: &mut Response) -> Result<(), Error> {
    let gzipped = response
        .header("Content-Encoding")
        .map_or(false, |v| v.trim().eq_ignore_ascii_case("gzip"));
    if !gzipped || response.body.is_empty() {
        return Ok(());
    }

    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(&response.body[..])
        .read_to_end(&mut decoded)
        .map_err(|e| {
            Error::ServerError(format!(
                "Bad gzip body from {}: {}",
                response.url, e
            ))
        })?;
    response.body = decoded;
    response
        .headers
        .retain(|&(ref k, _)| !k.eq_ignore_ascii_case("content-encoding"));
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::super::fake::{path_of, FakeTransport};
    use super::*;

    fn client(transport: FakeTransport) -> HttpClient {
        HttpClient::new(
            Box::new(transport),
            "https://mail.example.com/owa/",
            "exgate-test".to_owned(),
            LogPrefix::new("test".to_owned()),
        )
        .unwrap()
    }

    #[test]
    fn follows_redirects_and_keeps_cookies() {
        crate::init_test_log();

        let (transport, log) = FakeTransport::new(|request| {
            Ok(match path_of(request).as_str() {
                "/owa/auth.owa" => Response::new(302, &request.url)
                    .with_header("Set-Cookie", "sessionid=s1; path=/")
                    .with_header("Location", "/owa/?ae=Folder"),
                "/owa/?ae=Folder" => {
                    Response::new(200, &request.url).with_body("inbox")
                }
                _ => Response::new(404, &request.url),
            })
        });
        let mut client = client(transport);

        let response = client
            .post_form("/owa/auth.owa", &[("a".to_owned(), "b".to_owned())])
            .unwrap();
        assert_eq!(200, response.status);
        assert_eq!("inbox", response.text());
        assert_eq!("/owa/", client.last_url().path());
        assert_eq!(Some("s1"), client.cookies().get("sessionid"));

        let log = log.borrow();
        assert_eq!(2, log.len());
        assert_eq!(Method::Post, log[0].method);
        assert_eq!(Method::Get, log[1].method);
        assert!(log[1].body.is_empty());
        assert_eq!(Some("sessionid=s1"), log[1].header_value("Cookie"));
    }

    #[test]
    fn redirect_to_other_host_drops_cookies_and_credentials() {
        let (transport, log) = FakeTransport::new(|request| {
            Ok(if request.url.starts_with("https://mail.example.com/") {
                Response::new(302, &request.url)
                    .with_header("Set-Cookie", "cadata=SECRET; path=/")
                    .with_header("Location", "https://other.example.org/landing")
            } else {
                Response::new(200, &request.url)
            })
        });
        let mut client = client(transport);
        client.set_basic_credentials("user", "pass");

        assert_eq!(200, client.get("/owa/").unwrap().status);
        assert_eq!(Some("SECRET"), client.cookies().get("cadata"));

        {
            let requests = log.borrow();
            assert_eq!(2, requests.len());
            assert_eq!(
                Some("Basic dXNlcjpwYXNz"),
                requests[0].header_value("Authorization")
            );
            assert_eq!("https://other.example.org/landing", requests[1].url);
            assert_eq!(None, requests[1].header_value("Cookie"));
            assert_eq!(None, requests[1].header_value("Authorization"));
        }

        // Back on the original host, both are sent again
        client.get("https://mail.example.com/owa/").unwrap();
        let requests = log.borrow();
        assert_eq!(
            Some("cadata=SECRET"),
            requests[2].header_value("Cookie")
        );
        assert_eq!(
            Some("Basic dXNlcjpwYXNz"),
            requests[2].header_value("Authorization")
        );
        assert_eq!(None, requests[3].header_value("Authorization"));
    }

    #[test]
    fn redirect_loop_is_bounded() {
        let (transport, log) = FakeTransport::new(|request| {
            Ok(Response::new(302, &request.url)
                .with_header("Location", "/owa/loop"))
        });
        let mut client = client(transport);
        assert_matches!(Err(Error::ServerError(..)), client.get("/owa/"));
        assert_eq!(MAX_REDIRECTS as usize + 1, log.borrow().len());
    }

    #[test]
    fn basic_credentials_and_gzip() {
        let mut encoder = flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"<html>hello</html>").unwrap();
        let compressed = encoder.finish().unwrap();

        let (transport, log) = FakeTransport::new(move |request| {
            Ok(Response::new(200, &request.url)
                .with_header("Content-Encoding", "gzip")
                .with_body(compressed.clone()))
        });
        let mut client = client(transport);
        client.set_basic_credentials("user", "pass");

        let response = client.get("https://mail.example.com/owa/").unwrap();
        assert_eq!("<html>hello</html>", response.text());
        assert_eq!(None, response.header("Content-Encoding"));
        assert_eq!(
            Some("Basic dXNlcjpwYXNz"),
            log.borrow()[0].header_value("Authorization")
        );
    }
}
