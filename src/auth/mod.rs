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

//! The OWA login handshake.
//!
//! Exchange front-ends present anything from a plain Basic challenge to a
//! chain of HTML pages (frames, script redirects, OTP and captcha forms, a
//! language picker) before handing out a session cookie. `authenticate`
//! drives that chain as an explicit state machine with a bounded number of
//! page transitions.

pub mod form;
pub mod identity;
pub mod prompt;

use log::{debug, info, warn};

use self::form::{LoginForm, LoginPage};
pub use self::identity::LoginIdentity;
pub use self::prompt::{NoPrompt, OtpPrompt, TtyPrompt};
use crate::support::error::Error;
use crate::transport::client::HttpClient;
use crate::transport::cookie::CookieJar;
use crate::transport::{Request, Response};

/// Maximum number of pages parsed in one handshake.
const MAX_HOPS: u32 = 16;
/// Maximum number of one-time passwords submitted in one handshake.
const MAX_OTP_ATTEMPTS: u32 = 3;
/// Credential submissions allowed before giving up: the first plus one
/// retry on whatever page the first landed on.
const MAX_CREDENTIAL_POSTS: u32 = 2;

const LOGON_PAGE_PATH: &str = "/owa/auth/logon.aspx";
const LANGUAGE_PAGE_PATH: &str = "/owa/languageselection.aspx";
const CAPTCHA_PATH: &str = "/PINsafeISAFilter.dll";

/// The outcome of a successful handshake.
#[derive(Debug)]
pub struct Authenticated {
    /// The page the handshake finally landed on.
    pub landing: Response,
    /// The identity as narrowed by the login pages.
    pub identity: LoginIdentity,
    /// Whether the server accepted HTTP Basic credentials, in which case
    /// they remain attached to the client.
    pub basic: bool,
}

/// Whether `cookies` contain anything OWA hands out only to logged-in
/// users.
pub fn has_session_cookie(cookies: &CookieJar) -> bool {
    cookies.names().any(|name| {
        name.starts_with("cadata")
            || "sessionid" == name
            || "UserContext" == name
            || "exchangecookie" == name
    })
}

/// Log in to the OWA server at `url`.
///
/// On success the client holds whatever cookies or credentials the server
/// requires for subsequent requests. Any failure is reported as
/// `Connectivity`, `Configuration`, `AuthenticationFailed` or `Interrupted`.
pub fn authenticate(
    client: &mut HttpClient,
    url: &str,
    identity: LoginIdentity,
    password: &str,
    prompt: &mut dyn OtpPrompt,
) -> Result<Authenticated, Error> {
    let mut handshake = Handshake {
        client,
        url,
        identity,
        password,
        prompt,
        hops: 0,
        otp_attempts: 0,
        credential_posts: 0,
        basic: false,
    };

    match handshake.run() {
        Ok(landing) => {
            info!(
                "{} Logged in as {} ({})",
                handshake.client.log_prefix(),
                handshake.identity,
                if handshake.basic { "basic" } else { "form" }
            );
            handshake
                .client
                .log_prefix()
                .set_user(handshake.identity.login().to_owned());
            Ok(Authenticated {
                landing,
                identity: handshake.identity,
                basic: handshake.basic,
            })
        }
        Err(e) => {
            warn!("{} Login failed: {}", handshake.client.log_prefix(), e);
            Err(classify(e))
        }
    }
}

fn classify(e: Error) -> Error {
    match e {
        e @ Error::Connectivity(..)
        | e @ Error::Configuration(..)
        | e @ Error::AuthenticationFailed(..)
        | e @ Error::Interrupted => e,
        Error::Timeout(msg) => Error::Connectivity(msg),
        e => Error::AuthenticationFailed(format!("Exchange login failed: {}", e)),
    }
}

#[derive(Debug)]
enum State {
    Start,
    Basic,
    ParseForm(Response),
    SubmitCaptcha(LoginForm),
    SubmitOtp(LoginForm),
    SubmitCredentials(LoginForm),
    AfterCredentials(Response),
    SelectLanguage(Response),
    Authenticated(Response),
}

struct Handshake<'a> {
    client: &'a mut HttpClient,
    url: &'a str,
    identity: LoginIdentity,
    password: &'a str,
    prompt: &'a mut dyn OtpPrompt,
    hops: u32,
    otp_attempts: u32,
    credential_posts: u32,
    basic: bool,
}

impl Handshake<'_> {
    fn run(&mut self) -> Result<Response, Error> {
        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => self.start()?,
                State::Basic => self.basic()?,
                State::ParseForm(page) => self.parse_form(page)?,
                State::SubmitCaptcha(form) => self.submit_captcha(form)?,
                State::SubmitOtp(form) => self.submit_otp(form)?,
                State::SubmitCredentials(form) => {
                    self.submit_credentials(form)?
                }
                State::AfterCredentials(page) => {
                    self.after_credentials(page)?
                }
                State::SelectLanguage(page) => self.select_language(page)?,
                State::Authenticated(page) => return Ok(page),
            };
        }
    }

    fn start(&mut self) -> Result<State, Error> {
        self.client.cookies_mut().clear();
        self.client.clear_basic_credentials();

        let response = self.client.get(self.url)?;
        if 401 == response.status {
            debug!("{} Server wants Basic auth", self.client.log_prefix());
            Ok(State::Basic)
        } else {
            Ok(State::ParseForm(response))
        }
    }

    fn basic(&mut self) -> Result<State, Error> {
        self.client
            .set_basic_credentials(self.identity.login(), self.password);
        let response = self.client.get(self.url)?;
        if 401 == response.status {
            return Err(self.invalid_credentials());
        }

        if self.client.last_url().path() == LOGON_PAGE_PATH {
            debug!(
                "{} Basic auth landed on the logon form",
                self.client.log_prefix()
            );
            self.client.clear_basic_credentials();
            return Ok(State::ParseForm(response));
        }

        self.basic = true;
        Ok(State::Authenticated(response.check()?))
    }

    fn parse_form(&mut self, page: Response) -> Result<State, Error> {
        self.hops += 1;
        if self.hops > MAX_HOPS {
            return Err(Error::AuthenticationFailed(format!(
                "Gave up after {} login pages",
                MAX_HOPS
            )));
        }

        if self.client.last_url().path() == LANGUAGE_PAGE_PATH {
            return Ok(State::SelectLanguage(page));
        }
        if has_session_cookie(self.client.cookies()) {
            return Ok(State::Authenticated(page));
        }

        let page = page.check()?;
        match form::parse_login_page(&page.text()) {
            LoginPage::Form(mut form) => {
                form.action = self.client.resolve(&form.action)?.to_string();
                if form.redirect_only {
                    debug!(
                        "{} Following redirect form to {}",
                        self.client.log_prefix(),
                        form.action
                    );
                    let next =
                        self.client.post_form(&form.action, &form.params)?;
                    Ok(State::ParseForm(next))
                } else if form.captcha_field.is_some() {
                    Ok(State::SubmitCaptcha(form))
                } else if form.password_field.is_some() {
                    Ok(State::SubmitCredentials(form))
                } else if form.is_otp_preauth() {
                    Ok(State::SubmitOtp(form))
                } else {
                    Err(self.form_not_found())
                }
            }

            LoginPage::Frame(src)
            | LoginPage::ScriptForm(src)
            | LoginPage::LocationReplace(src) => {
                debug!("{} Following {}", self.client.log_prefix(), src);
                Ok(State::ParseForm(self.client.get(&src)?))
            }

            LoginPage::Unrecognised => {
                if 0 == self.credential_posts && 0 == self.otp_attempts {
                    Ok(State::SubmitCredentials(LoginForm::fallback()))
                } else {
                    Err(self.form_not_found())
                }
            }
        }
    }

    fn submit_captcha(&mut self, mut form: LoginForm) -> Result<State, Error> {
        let username =
            self.identity.alias().unwrap_or(self.identity.login()).to_owned();
        let url = format!(
            "{}?{}",
            CAPTCHA_PATH,
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("username", &username)
                .finish()
        );
        let image = self.client.get(&url)?;
        if 200 != image.status {
            return Err(Error::ServerError(format!(
                "Unable to fetch captcha image: status {}",
                image.status
            )));
        }

        let text = self.prompt.captcha(&image.body)?;
        if let Some(field) = form.captcha_field.take() {
            form.set_param(&field, &text);
        }

        if form.password_field.is_some() {
            Ok(State::SubmitCredentials(form))
        } else {
            Ok(State::SubmitOtp(form))
        }
    }

    fn submit_otp(&mut self, mut form: LoginForm) -> Result<State, Error> {
        if self.otp_attempts >= MAX_OTP_ATTEMPTS {
            return Err(Error::AuthenticationFailed(format!(
                "One-time password rejected {} times",
                MAX_OTP_ATTEMPTS
            )));
        }
        self.otp_attempts += 1;

        let code = self.prompt.one_time_password()?;
        for field in &form.username_fields.clone() {
            form.set_param(field, self.identity.preauth());
        }
        if let Some(ref field) = form.token_field.clone() {
            form.set_param(field, &code);
        }

        debug!(
            "{} Submitting one-time password ({}/{})",
            self.client.log_prefix(),
            self.otp_attempts,
            MAX_OTP_ATTEMPTS
        );
        let next = self.client.post_form(&form.action, &form.params)?;
        Ok(State::ParseForm(next))
    }

    fn submit_credentials(
        &mut self,
        mut form: LoginForm,
    ) -> Result<State, Error> {
        for field in &form.username_fields.clone() {
            form.remove_param(field);
        }
        if let Some(ref field) = form.password_field.clone() {
            form.remove_param(field);
        }
        form.remove_param("trusted");
        form.remove_param("flags");

        if 2 == form.username_fields.len() {
            // The identity narrowed here is what the rest of the session
            // knows the user as.
            let (userid, narrowed) = self.identity.split_userid();
            self.identity = narrowed;
            form.set_param("userid", &userid);
            form.set_param("username", self.identity.login());
        } else {
            for field in &form.username_fields.clone() {
                form.set_param(field, self.identity.login());
            }
        }

        if let Some(ref field) = form.password_field.clone() {
            form.set_param(field, self.password);
        }
        if let Some(ref field) = form.token_field.clone() {
            if self.otp_attempts >= MAX_OTP_ATTEMPTS {
                return Err(Error::AuthenticationFailed(
                    "One-time password attempts exhausted".to_owned(),
                ));
            }
            self.otp_attempts += 1;
            let code = self.prompt.one_time_password()?;
            form.set_param(field, &code);
        }
        form.set_param("trusted", "4");
        form.set_param("flags", "4");

        self.client.set_cookie("PBack", "0");
        self.credential_posts += 1;
        debug!(
            "{} Posting credentials to {}",
            self.client.log_prefix(),
            form.action
        );
        let next = self.client.post_form(&form.action, &form.params)?;
        Ok(State::AfterCredentials(next))
    }

    fn after_credentials(&mut self, page: Response) -> Result<State, Error> {
        let rejected = self
            .client
            .last_url()
            .query_pairs()
            .any(|(k, v)| "reason" == k && ("2" == v || "4" == v));
        if rejected {
            return Err(self.invalid_credentials());
        }

        if self.client.last_url().path() == LANGUAGE_PAGE_PATH
            || has_session_cookie(self.client.cookies())
        {
            return Ok(State::ParseForm(page));
        }

        if self.credential_posts < MAX_CREDENTIAL_POSTS {
            debug!(
                "{} No session after login, retrying on {}",
                self.client.log_prefix(),
                self.client.last_url()
            );
            Ok(State::ParseForm(page))
        } else {
            Err(self.invalid_credentials())
        }
    }

    fn select_language(&mut self, page: Response) -> Result<State, Error> {
        let (action, params) = form::parse_language_form(&page.text())
            .ok_or_else(|| {
                Error::AuthenticationFailed(
                    "Unable to parse language selection form".to_owned(),
                )
            })?;

        debug!("{} Submitting language selection", self.client.log_prefix());
        let next = self.client.post_form(&action, &params)?;
        if self.client.last_url().path() == LANGUAGE_PAGE_PATH {
            return Err(Error::AuthenticationFailed(
                "Language selection was not accepted".to_owned(),
            ));
        }
        Ok(State::ParseForm(next))
    }

    fn invalid_credentials(&self) -> Error {
        if self.identity.has_domain() {
            Error::AuthenticationFailed("Invalid user or password".to_owned())
        } else {
            Error::AuthenticationFailed(
                "Invalid user or password, retry with domain\\user".to_owned(),
            )
        }
    }

    fn form_not_found(&self) -> Error {
        Error::AuthenticationFailed(format!(
            "No login form found at {}",
            self.client.last_url()
        ))
    }
}
