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

use std::collections::BTreeMap;

use url::Url;

/// One stored cookie, keyed in the jar by name, domain and path.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Cookie {
    value: String,
    /// Set when the server gave no `Domain` attribute; the cookie then only
    /// goes back to the exact host which set it.
    host_only: bool,
    secure: bool,
}

type Key = (String, String, String);

/// The cookies of one login session.
///
/// Cookies are scoped the usual way: to the host (or `Domain`) and `Path`
/// they were set for, and `Secure` cookies never travel over plain HTTP.
/// A redirect to a foreign host therefore carries none of the session
/// cookies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<Key, Cookie>,
}

/// A copy of the jar taken before an optional request, so a failed attempt can
/// be rolled back.
#[derive(Clone, Debug)]
pub struct CookieSnapshot(BTreeMap<Key, Cookie>);

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one `Set-Cookie` header value received from `url`.
    pub fn store(&mut self, url: &Url, set_cookie: &str) {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return,
        };

        let mut parts = set_cookie.split(';');
        let pair = match parts.next() {
            Some(pair) => pair,
            None => return,
        };
        let (name, value) = match split_pair(pair) {
            Some(nv) => nv,
            None => return,
        };
        if name.is_empty() {
            return;
        }

        let mut domain = None;
        let mut path = None;
        let mut secure = false;
        let mut expired = false;
        for (k, v) in parts.filter_map(split_pair) {
            if k.eq_ignore_ascii_case("domain") {
                let v = v.trim_start_matches('.').to_ascii_lowercase();
                if !v.is_empty() {
                    domain = Some(v);
                }
            } else if k.eq_ignore_ascii_case("path") {
                if v.starts_with('/') {
                    path = Some(v.to_owned());
                }
            } else if k.eq_ignore_ascii_case("secure") {
                secure = true;
            } else if (k.eq_ignore_ascii_case("max-age") && v.starts_with('0'))
                || (k.eq_ignore_ascii_case("expires") && v.contains("1970"))
            {
                expired = true;
            }
        }

        let host_only = domain.is_none();
        let domain = match domain {
            Some(domain) if domain_matches(&host, &domain) => domain,
            // A server may not set cookies for somebody else's domain
            Some(_) => return,
            None => host,
        };
        let path = path.unwrap_or_else(|| default_path(url.path()));

        let key = (name.to_owned(), domain, path);
        if expired || value.is_empty() {
            self.cookies.remove(&key);
        } else {
            self.cookies.insert(
                key,
                Cookie {
                    value: value.to_owned(),
                    host_only,
                    secure,
                },
            );
        }
    }

    /// Set a host-only cookie for the whole of `url`'s host.
    pub fn set(&mut self, url: &Url, name: &str, value: &str) {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return,
        };
        self.cookies.insert(
            (name.to_owned(), host, "/".to_owned()),
            Cookie {
                value: value.to_owned(),
                host_only: true,
                secure: false,
            },
        );
    }

    /// The value of the cookie called `name`, whatever its scope.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|&(&(ref n, _, _), _)| n == name)
            .map(|(_, cookie)| cookie.value.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(|&(ref name, _, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// The value for the `Cookie` header of a request to `url`, or `None` if
    /// no cookie applies to it.
    pub fn header_value(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let request_path = url.path();
        let https = "https" == url.scheme();

        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|&(&(_, ref domain, ref path), cookie)| {
                let host_ok = if cookie.host_only {
                    host == *domain
                } else {
                    domain_matches(&host, domain)
                };
                host_ok
                    && path_matches(request_path, path)
                    && (https || !cookie.secure)
            })
            .map(|(&(ref name, _, _), cookie)| {
                format!("{}={}", name, cookie.value)
            })
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    pub fn snapshot(&self) -> CookieSnapshot {
        CookieSnapshot(self.cookies.clone())
    }

    pub fn restore(&mut self, snapshot: CookieSnapshot) {
        self.cookies = snapshot.0;
    }
}

fn split_pair(s: &str) -> Option<(&str, &str)> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    match s.find('=') {
        Some(ix) => Some((s[..ix].trim(), s[ix + 1..].trim())),
        None => Some((s, "")),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host[..host.len() - domain.len()].ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

/// The directory of the request path, used when `Set-Cookie` has no
/// `Path`.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(ix) => request_path[..ix].to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn store_and_replay() {
        let owa = url("https://mail.example.com/owa/auth.owa");
        let mut jar = CookieJar::new();
        assert_eq!(None, jar.header_value(&owa));

        jar.store(&owa, "sessionid=abc-123; path=/; HttpOnly");
        jar.store(&owa, "cadata=\"xyz\"; secure; path=/");
        jar.store(&owa, "PBack=0; path=/");
        assert_eq!(Some("abc-123"), jar.get("sessionid"));
        assert_eq!(
            Some("PBack=0; cadata=\"xyz\"; sessionid=abc-123".to_owned()),
            jar.header_value(&url("https://mail.example.com/owa/"))
        );

        jar.store(&owa, "sessionid=; path=/; expires=Thu, 01-Jan-1970 00:00:00 GMT");
        jar.store(&owa, "cadata=gone; path=/; Max-Age=0");
        assert_eq!(vec!["PBack"], jar.names().collect::<Vec<_>>());
    }

    #[test]
    fn cookies_stay_with_their_host() {
        let mut jar = CookieJar::new();
        jar.store(&url("https://mail.example.com/owa/"), "cadata=SECRET; path=/");
        jar.store(
            &url("https://mail.example.com/owa/"),
            "shared=1; domain=.example.com; path=/",
        );
        jar.store(
            &url("https://mail.example.com/owa/"),
            "evil=1; domain=other.example.org; path=/",
        );

        assert_eq!(None, jar.get("evil"));
        assert_eq!(
            Some("cadata=SECRET; shared=1".to_owned()),
            jar.header_value(&url("https://mail.example.com/ews/exchange.asmx"))
        );
        assert_eq!(
            Some("shared=1".to_owned()),
            jar.header_value(&url("https://autodiscover.example.com/a"))
        );
        assert_eq!(
            None,
            jar.header_value(&url("https://other.example.org/landing"))
        );
        assert_eq!(
            None,
            jar.header_value(&url("https://badexample.com/"))
        );
    }

    #[test]
    fn path_and_secure_scoping() {
        let mut jar = CookieJar::new();
        jar.store(&url("https://mail.example.com/owa/auth/logon.aspx"), "a=1");
        jar.store(&url("https://mail.example.com/"), "b=2; path=/exchange");
        jar.store(&url("https://mail.example.com/"), "c=3; path=/; secure");

        assert_eq!(
            Some("a=1; c=3".to_owned()),
            jar.header_value(&url("https://mail.example.com/owa/auth/x"))
        );
        assert_eq!(
            Some("b=2; c=3".to_owned()),
            jar.header_value(&url("https://mail.example.com/exchange/jdoe/"))
        );
        assert_eq!(
            Some("c=3".to_owned()),
            jar.header_value(&url("https://mail.example.com/exchangeX"))
        );
        assert_eq!(
            None,
            jar.header_value(&url("http://mail.example.com/"))
        );
    }

    #[test]
    fn snapshot_restore() {
        let owa = url("https://mail.example.com/owa/");
        let mut jar = CookieJar::new();
        jar.set(&owa, "UserContext", "1");
        let snapshot = jar.snapshot();
        jar.store(&owa, "exchangecookie=2");
        jar.clear();
        assert!(jar.is_empty());
        jar.restore(snapshot);
        assert_eq!(Some("1"), jar.get("UserContext"));
        assert_eq!(None, jar.get("exchangecookie"));
    }
}
