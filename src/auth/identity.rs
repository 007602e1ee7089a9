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

use std::fmt;

/// The login name as configured by the operator, possibly carrying a
/// distinct identity for OTP pre-authentication.
///
/// The composite syntax is `preauth"login`: everything before the first
/// double quote (which must not be the first character) is used on OTP
/// pages, everything after it on the password page.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    preauth: String,
    login: String,
}

impl LoginIdentity {
    pub fn parse(configured: &str) -> Self {
        match configured.find('"') {
            Some(ix) if ix > 0 => LoginIdentity {
                preauth: configured[..ix].to_owned(),
                login: configured[ix + 1..].to_owned(),
            },
            _ => LoginIdentity {
                preauth: configured.to_owned(),
                login: configured.to_owned(),
            },
        }
    }

    /// The identity submitted on OTP pre-authentication pages.
    pub fn preauth(&self) -> &str {
        &self.preauth
    }

    /// The identity submitted with the password.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Split a `userid|name` login for pages which carry two username
    /// fields.
    ///
    /// Returns the user id to submit and the narrowed identity, whose login
    /// is the name part. Logins without `|` are submitted as both.
    pub fn split_userid(&self) -> (String, LoginIdentity) {
        match self.login.find('|') {
            Some(ix) => (
                self.login[..ix].to_owned(),
                LoginIdentity {
                    preauth: self.preauth.clone(),
                    login: self.login[ix + 1..].to_owned(),
                },
            ),
            None => (self.login.clone(), self.clone()),
        }
    }

    /// Whether the login is qualified with a Windows domain.
    pub fn has_domain(&self) -> bool {
        self.login.contains('\\')
    }

    /// The mailbox alias implied by the login, if any.
    ///
    /// E-mail style logins have no alias; `DOMAIN\user` and `DOMAIN/user`
    /// have alias `user`. The domain ends at whichever of the first `\` and
    /// the first `/` comes later, so only that one prefix is removed.
    pub fn alias(&self) -> Option<&str> {
        if self.login.contains('@') {
            return None;
        }

        let backslash = self.login.find('\\');
        let slash = self.login.find('/');
        match backslash.max(slash) {
            Some(ix) => Some(&self.login[ix + 1..]),
            None => Some(&self.login),
        }
    }
}

impl fmt::Debug for LoginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.preauth == self.login {
            write!(f, "{:?}", self.login)
        } else {
            write!(f, "{:?}\"{:?}", self.preauth, self.login)
        }
    }
}

impl fmt::Display for LoginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.login)
    }
}
