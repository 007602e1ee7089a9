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

//! Just enough HTML scraping to drive OWA login pages.
//!
//! Login pages are generated by a handful of known server versions and
//! front-end appliances, so a set of targeted patterns is sufficient; no
//! attempt is made to build a document tree.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

pub const USERNAME_FIELDS: &[&str] =
    &["username", "txtUserName", "userid", "SafeWordUser", "user_name"];
pub const PASSWORD_FIELDS: &[&str] =
    &["password", "txtUserPass", "pw", "basicPassword"];
pub const TOKEN_FIELDS: &[&str] = &["SafeWordPassword", "passcode"];
/// An input with this name marks a page whose form only redirects.
pub const REDIRECT_FIELD: &str = "addr";
pub const CAPTCHA_FIELD: &str = "otc";

lazy_static! {
    static ref FORM: Regex =
        Regex::new(r"(?is)<form\b([^>]*)>(.*?)(?:</form\s*>|\z)").unwrap();
    static ref INPUT: Regex = Regex::new(r"(?is)<input\b([^>]*)>").unwrap();
    static ref FRAME: Regex = Regex::new(r"(?is)<frame\b([^>]*)>").unwrap();
    static ref SCRIPT: Regex =
        Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap();
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--(.*?)-->").unwrap();
    static ref SELECT: Regex =
        Regex::new(r"(?is)<select\b([^>]*)>(.*?)</select\s*>").unwrap();
    static ref OPTION: Regex = Regex::new(r"(?is)<option\b([^>]*)>").unwrap();
    static ref ATTRIBUTE: Regex = Regex::new(
        r#"(?is)([a-z_:][-a-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#
    )
    .unwrap();
    static ref BASE_HREF: Regex =
        Regex::new(r#"(?is)<base\b[^>]*\bhref\s*=\s*["']([^"']*)["']"#)
            .unwrap();
}

/// The attributes of one tag, keyed by lower-cased name.
fn attributes(tag_body: &str) -> BTreeMap<String, String> {
    ATTRIBUTE
        .captures_iter(tag_body)
        .map(|cap| {
            let name = cap[1].to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map_or("", |m| m.as_str());
            (name, decode_entities(value))
        })
        .collect()
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_owned();
    }

    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Return the text between `start` and the next `end` following it.
fn token<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(&haystack[from..from + len])
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// The raw `action` attribute; empty actions are already replaced with
    /// the OWA default.
    pub action: String,
    /// Parameters to echo back, in document order.
    pub params: Vec<(String, String)>,
    pub username_fields: Vec<String>,
    pub password_field: Option<String>,
    pub token_field: Option<String>,
    pub captcha_field: Option<String>,
    /// The page only contains a form which redirects to the real one.
    pub redirect_only: bool,
}

impl LoginForm {
    /// The form to use when the landing page has none at all.
    pub fn fallback() -> Self {
        LoginForm {
            action: "/owa/auth/owaauth.dll".to_owned(),
            username_fields: vec!["username".to_owned()],
            password_field: Some("password".to_owned()),
            ..LoginForm::default()
        }
    }

    pub fn remove_param(&mut self, name: &str) {
        self.params.retain(|&(ref k, _)| k != name);
    }

    pub fn set_param(&mut self, name: &str, value: &str) {
        self.remove_param(name);
        self.params.push((name.to_owned(), value.to_owned()));
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|&&(ref k, _)| k == name)
            .map(|&(_, ref v)| v.as_str())
    }

    /// Whether this form asks for a one-time code instead of a password.
    pub fn is_otp_preauth(&self) -> bool {
        self.password_field.is_none()
            && (self.token_field.is_some() || !self.username_fields.is_empty())
    }
}

/// What a page in the login flow wants us to do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginPage {
    Form(LoginForm),
    /// A frameset with a single frame; the form lives in the frame.
    Frame(String),
    /// A legacy script that assembles the form URL from two variables.
    /// The value is the path-and-query to load, relative to the page.
    ScriptForm(String),
    /// A post-login script redirect (`window.location.replace`).
    LocationReplace(String),
    Unrecognised,
}

pub fn parse_login_page(html: &str) -> LoginPage {
    let forms = FORM.captures_iter(html).collect::<Vec<_>>();
    let form = if 1 == forms.len() {
        forms.first()
    } else {
        forms.iter().find(|cap| {
            attributes(&cap[1]).get("name").map(String::as_str)
                == Some("logonForm")
        })
    };

    if let Some(form) = form {
        let form_attrs = attributes(&form[1]);
        let mut login_form = LoginForm {
            action: form_attrs.get("action").cloned().unwrap_or_default(),
            ..LoginForm::default()
        };
        if login_form.action.is_empty() {
            login_form.action = "/owa/auth.owa".to_owned();
        }

        // Inputs anywhere in the page count, not just inside the form.
        // Some login pages close the form before the inputs.
        for input in INPUT.captures_iter(html) {
            let attrs = attributes(&input[1]);
            let name = match attrs.get("name") {
                Some(name) => name.clone(),
                None => continue,
            };
            let is_hidden = attrs
                .get("type")
                .map_or(false, |t| t.eq_ignore_ascii_case("hidden"));
            if is_hidden {
                if let Some(value) = attrs.get("value") {
                    login_form.params.push((name.clone(), value.clone()));
                }
            }

            if USERNAME_FIELDS.contains(&name.as_str()) {
                login_form.username_fields.push(name);
            } else if PASSWORD_FIELDS.contains(&name.as_str()) {
                login_form.password_field = Some(name);
            } else if REDIRECT_FIELD == name {
                login_form.redirect_only = true;
            } else if TOKEN_FIELDS.contains(&name.as_str()) {
                login_form.token_field = Some(name);
            } else if CAPTCHA_FIELD == name {
                login_form.captcha_field = Some(name);
            }
        }

        return LoginPage::Form(login_form);
    }

    let frames = FRAME.captures_iter(html).collect::<Vec<_>>();
    if 1 == frames.len() {
        if let Some(src) = attributes(&frames[0][1]).remove("src") {
            return LoginPage::Frame(src);
        }
    }

    for script in SCRIPT.captures_iter(html) {
        let body = &script[1];
        for comment in COMMENT.captures_iter(body) {
            let commented = &comment[1];
            let url = token(commented, "var a_sUrl = \"", "\"");
            let lgn = token(commented, "var a_sLgnQS = \"", "\"")
                .or_else(|| token(commented, "var a_sLgn = \"", "\""));
            if let (Some(url), Some(lgn)) = (url, lgn) {
                return LoginPage::ScriptForm(format!("{}{}", lgn, url));
            }
        }

        if let Some(location) =
            token(body, "window.location.replace(\"", "\"")
        {
            return LoginPage::LocationReplace(location.to_owned());
        }
    }

    LoginPage::Unrecognised
}

/// Extract the parameters to submit for a language selection page: every
/// named input with a value, plus the pre-selected option of every select.
///
/// Returns the form action and parameters, or `None` if the page does not
/// contain exactly one form.
pub fn parse_language_form(
    html: &str,
) -> Option<(String, Vec<(String, String)>)> {
    let forms = FORM.captures_iter(html).collect::<Vec<_>>();
    if 1 != forms.len() {
        return None;
    }

    let form = &forms[0];
    let action = attributes(&form[1]).remove("action").unwrap_or_default();
    let body = &form[2];
    let mut params = Vec::new();

    for input in INPUT.captures_iter(body) {
        let mut attrs = attributes(&input[1]);
        if let (Some(name), Some(value)) =
            (attrs.remove("name"), attrs.remove("value"))
        {
            params.push((name, value));
        }
    }

    for select in SELECT.captures_iter(body) {
        let name = match attributes(&select[1]).remove("name") {
            Some(name) => name,
            None => continue,
        };
        let selected = OPTION.captures_iter(&select[2]).find_map(|option| {
            let mut attrs = attributes(&option[1]);
            if attrs.contains_key("selected") {
                attrs.remove("value")
            } else {
                None
            }
        });
        if let Some(value) = selected {
            params.push((name, value));
        }
    }

    Some((action, params))
}

/// The `<base href>` of a page, which on Exchange 2003 is the mailbox URL.
pub fn base_href(html: &str) -> Option<String> {
    BASE_HREF.captures(html).map(|cap| decode_entities(&cap[1]))
}

#[cfg(test)]
mod test {
    use super::*;

    const OWA_2007_LOGON: &str = r#"
<html><body>
<form action="owaauth.dll" method="POST" name="logonForm" autocomplete="off">
<input type="hidden" name="destination" value="https://mail.example.com/owa/">
<input type="hidden" name="flags" value="0">
<input type="hidden" name="forcedownlevel" value="0">
<input id="rdoPblc" type="radio" name="trusted" value="0" checked>
<input id="username" name="username" type="text">
<input id="password" onfocus="g_fFcs=0" name="password" type="password">
<input type="submit" class="btn" value="Log On">
</form>
<form name="other" action="/search"></form>
</body></html>
"#;

    #[test]
    fn owa_logon_form() {
        let form = match parse_login_page(OWA_2007_LOGON) {
            LoginPage::Form(form) => form,
            other => panic!("Unexpected page: {:?}", other),
        };

        assert_eq!("owaauth.dll", form.action);
        assert_eq!(
            vec![
                (
                    "destination".to_owned(),
                    "https://mail.example.com/owa/".to_owned()
                ),
                ("flags".to_owned(), "0".to_owned()),
                ("forcedownlevel".to_owned(), "0".to_owned()),
            ],
            form.params
        );
        assert_eq!(vec!["username".to_owned()], form.username_fields);
        assert_eq!(Some("password".to_owned()), form.password_field);
        assert_eq!(None, form.token_field);
        assert!(!form.redirect_only);
        assert!(!form.is_otp_preauth());
    }

    #[test]
    fn otp_and_captcha_fields() {
        let html = r#"<form action="" name="f">
            <input type='text' name=SafeWordUser>
            <input type="password" name="SafeWordPassword">
            <input type="text" name="otc">
            </form>"#;
        let form = match parse_login_page(html) {
            LoginPage::Form(form) => form,
            other => panic!("Unexpected page: {:?}", other),
        };
        assert_eq!("/owa/auth.owa", form.action);
        assert_eq!(vec!["SafeWordUser".to_owned()], form.username_fields);
        assert_eq!(Some("SafeWordPassword".to_owned()), form.token_field);
        assert_eq!(Some("otc".to_owned()), form.captcha_field);
        assert!(form.is_otp_preauth());
    }

    #[test]
    fn frames_and_scripts() {
        assert_eq!(
            LoginPage::Frame("/owa/auth/logon.aspx?a=1&b=2".to_owned()),
            parse_login_page(
                r#"<frameset><frame src="/owa/auth/logon.aspx?a=1&amp;b=2"></frameset>"#
            )
        );

        assert_eq!(
            LoginPage::ScriptForm(
                "/exchweb/bin/auth/owalogon.asp?url=https://h/exchange"
                    .to_owned()
            ),
            parse_login_page(
                r#"<script language="javascript"><!--
                var a_sUrl = "https://h/exchange";
                var a_sLgn = "/exchweb/bin/auth/owalogon.asp?url=";
                --></script>"#
            )
        );

        assert_eq!(
            LoginPage::LocationReplace("/owa/?uag=1".to_owned()),
            parse_login_page(
                r#"<script>window.location.replace("/owa/?uag=1");</script>"#
            )
        );

        assert_eq!(
            LoginPage::Unrecognised,
            parse_login_page("<html><body>Welcome</body></html>")
        );
    }

    #[test]
    fn language_selection() {
        let html = r#"<form method="post" action="lang.owa">
            <input type="hidden" name="destination" value="/owa/">
            <select name="lcid"><option value="1031">Deutsch</option>
            <option value="1033" selected>English</option></select>
            <select name="tzid"><option value="UTC">UTC</option></select>
            <input type="submit" value="OK" name="ok">
            </form>"#;

        let (action, params) = parse_language_form(html).unwrap();
        assert_eq!("lang.owa", action);
        assert_eq!(
            vec![
                ("destination".to_owned(), "/owa/".to_owned()),
                ("ok".to_owned(), "OK".to_owned()),
                ("lcid".to_owned(), "1033".to_owned()),
            ],
            params
        );

        assert_eq!(None, parse_language_form("<p>no form</p>"));
    }

    #[test]
    fn base_href_extraction() {
        assert_eq!(
            Some("https://h/exchange/jdoe/".to_owned()),
            base_href(r#"<HEAD><BASE href="https://h/exchange/jdoe/"></HEAD>"#)
        );
        assert_eq!(None, base_href("<head></head>"));
    }
}
