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

//! Working out who the logged-in user is once the handshake is done.
//!
//! None of this is authoritative: each source is tried in turn and the
//! first one that yields an answer wins.

use log::{debug, warn};

use crate::auth::LoginIdentity;
use crate::support::error::Error;
use crate::transport::client::HttpClient;
use crate::transport::{Request, Response};

/// The OWA options page, which shows the mailbox DN and primary address.
pub const OPTIONS_PAGE: &str = "/owa/?ae=Options&t=About";

const MAILBOX_BASE: &str = "/cn=";

/// Extract `(alias, email)` from the OWA options page.
///
/// The page has a line of the form
/// `... /o=Org/ou=Site/cn=Recipients/cn=jdoe<br>John Doe [jdoe@example.com]`;
/// the alias is the last `cn=` component and the email is what is between
/// the last pair of brackets.
pub fn scrape_options_page(html: &str) -> Option<(String, String)> {
    let line = html.lines().find(|line| {
        (line.contains('[') && line.contains('@') && line.contains(']'))
            || line.to_ascii_lowercase().contains(MAILBOX_BASE)
    })?;

    let alias_start =
        line.to_ascii_lowercase().rfind(MAILBOX_BASE)? + MAILBOX_BASE.len();
    let alias_end = alias_start + line[alias_start..].find('<')?;
    let email_end = line.rfind(']')?;
    let email_start = line[..email_end].rfind('[')? + 1;

    let alias = line[alias_start..alias_end].trim();
    let email = line[email_start..email_end].trim();
    if alias.is_empty() || !email.contains('@') {
        return None;
    }

    Some((alias.to_owned(), email.to_owned()))
}

/// Guess an address from an alias and the OWA host name by dropping the
/// host's first label: `jdoe` on `mail.example.com` is `jdoe@example.com`.
pub fn fallback_email(alias: &str, host: &str) -> String {
    if alias.contains('@') {
        return alias.to_owned();
    }

    match host.find('.') {
        Some(dot) => format!("{}@{}", alias, &host[dot + 1..]),
        None => format!("{}@", alias),
    }
}

/// `@` followed by the last two labels of `host`.
pub fn email_suffix_from_host(host: &str) -> String {
    let domain = host
        .rfind('.')
        .and_then(|last| host[..last].rfind('.'))
        .map_or(host, |start| &host[start + 1..]);
    format!("@{}", domain)
}

/// Derive `(alias, email)` from the login name alone.
pub fn identity_from_login(
    identity: &LoginIdentity,
    host: &str,
) -> (String, String) {
    let login = identity.login();
    match login.find('@') {
        Some(at) => (login[..at].to_owned(), login.to_owned()),
        None => {
            let alias = identity.alias().unwrap_or(login).to_owned();
            let email = format!("{}{}", alias, email_suffix_from_host(host));
            (alias, email)
        }
    }
}

/// The parent of `mail_path`, e.g. `/exchange/` for `/exchange/jdoe/`.
pub fn root_path(mail_path: &str) -> String {
    let trimmed = mail_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(ix) => trimmed[..=ix].to_owned(),
        None => "/".to_owned(),
    }
}

/// The mailbox name at the end of `mail_path`, e.g. `jdoe` for
/// `/exchange/jdoe/`.
pub fn mailbox_name(mail_path: &str) -> Option<&str> {
    let trimmed = mail_path.strip_suffix('/')?;
    let name = &trimmed[trimmed.rfind('/')? + 1..];
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Send a request whose failure is not fatal to the caller.
///
/// Connectivity failures and interrupts are still returned as errors.
/// Anything else is logged and yields `None`, with the cookie jar rolled
/// back to how it was before the attempt.
pub fn fetch_optional(
    client: &mut HttpClient,
    request: Request,
) -> Result<Option<Response>, Error> {
    let snapshot = client.cookies().snapshot();
    let url = request.url.clone();
    match client.fetch(request).and_then(Response::check) {
        Ok(response) => Ok(Some(response)),
        Err(e) if e.is_connectivity() => Err(e),
        Err(Error::Interrupted) => Err(Error::Interrupted),
        Err(e) => {
            debug!("{} {} failed: {}", client.log_prefix(), url, e);
            client.cookies_mut().restore(snapshot);
            Ok(None)
        }
    }
}

/// Load and scrape the options page, if the server has one.
pub fn options_page(
    client: &mut HttpClient,
) -> Result<Option<(String, String)>, Error> {
    let response = match fetch_optional(client, Request::get(OPTIONS_PAGE))? {
        Some(response) => response,
        None => return Ok(None),
    };

    let found = scrape_options_page(&response.text());
    if found.is_none() {
        warn!(
            "{} No mailbox address on options page {}",
            client.log_prefix(),
            response.url
        );
    }
    Ok(found)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::log_prefix::LogPrefix;
    use crate::transport::fake::{path_of, FakeTransport};

    #[test]
    fn options_page_scraping() {
        let html = "<html>\n<td>Mailbox</td>\n\
                    <td>/o=Example/ou=First/cn=Recipients/CN=jdoe<br>\
                    John Doe [John.Doe@example.com]</td>\n</html>";
        assert_eq!(
            Some(("jdoe".to_owned(), "John.Doe@example.com".to_owned())),
            scrape_options_page(html)
        );

        assert_eq!(None, scrape_options_page("<html>nothing</html>"));
        assert_eq!(
            None,
            scrape_options_page("<td>Write to [someone@example.com]</td>")
        );
    }

    #[test]
    fn email_guessing() {
        assert_eq!("jdoe@example.com", fallback_email("jdoe", "mail.example.com"));
        assert_eq!("jdoe@x.org", fallback_email("jdoe@x.org", "mail.example.com"));
        assert_eq!("jdoe@", fallback_email("jdoe", "localhost"));

        assert_eq!("@example.com", email_suffix_from_host("owa.eu.example.com"));
        assert_eq!("@localhost", email_suffix_from_host("localhost"));

        assert_eq!(
            ("jdoe".to_owned(), "jdoe@example.com".to_owned()),
            identity_from_login(
                &LoginIdentity::parse("CORP\\jdoe"),
                "owa.example.com"
            )
        );
        assert_eq!(
            ("john".to_owned(), "john@other.org".to_owned()),
            identity_from_login(
                &LoginIdentity::parse("john@other.org"),
                "owa.example.com"
            )
        );
    }

    #[test]
    fn mail_path_components() {
        assert_eq!("/exchange/", root_path("/exchange/jdoe/"));
        assert_eq!("/", root_path("/jdoe/"));
        assert_eq!(Some("jdoe"), mailbox_name("/exchange/jdoe/"));
        assert_eq!(None, mailbox_name("/exchange/jdoe"));
        assert_eq!(None, mailbox_name("/"));
    }

    #[test]
    fn optional_fetch_rolls_back_cookies() {
        crate::init_test_log();

        let (transport, log) = FakeTransport::new(|request| {
            Ok(match path_of(request).as_str() {
                "/owa/" => Response::new(500, request.url.clone())
                    .with_header("Set-Cookie", "junk=1"),
                _ => Response::new(200, request.url.clone()).with_body(
                    "<td>/o=Example/cn=jdoe<br>[jdoe@example.com]</td>",
                ),
            })
        });
        let mut client = HttpClient::new(
            Box::new(transport),
            "https://mail.example.com/",
            "test".to_owned(),
            LogPrefix::new("test".to_owned()),
        )
        .unwrap();

        assert!(fetch_optional(&mut client, Request::get("/owa/"))
            .unwrap()
            .is_none());
        assert_eq!(None, client.cookies().get("junk"));

        assert_eq!(
            Some(("jdoe".to_owned(), "jdoe@example.com".to_owned())),
            options_page(&mut client).unwrap()
        );
        assert_eq!(2, log.borrow().len());
    }
}
