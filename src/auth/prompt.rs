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

use std::io::{self, Write};

use log::info;

use crate::support::error::Error;

/// Out-of-band interaction with the operator during login.
///
/// The handshake calls this only when the login page demands it; a prompt
/// which cannot reach anyone should fail with `AuthenticationFailed`.
pub trait OtpPrompt {
    /// Ask for a one-time password or token code.
    fn one_time_password(&mut self) -> Result<String, Error>;

    /// Show the captcha `image` and ask for the text it contains.
    fn captcha(&mut self, image: &[u8]) -> Result<String, Error>;
}

/// Prompts on the controlling terminal.
pub struct TtyPrompt;

impl OtpPrompt for TtyPrompt {
    fn one_time_password(&mut self) -> Result<String, Error> {
        rpassword::read_password_from_tty(Some("One-time password: "))
            .map_err(Error::Io)
    }

    fn captcha(&mut self, image: &[u8]) -> Result<String, Error> {
        let mut file = tempfile::Builder::new()
            .prefix("exgate-captcha-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;
        info!("Captcha image written to {}", file.path().display());

        print!("Captcha text (see {}): ", file.path().display());
        io::stdout().flush()?;
        let mut text = String::new();
        io::stdin().read_line(&mut text)?;
        Ok(text.trim().to_owned())
    }
}

/// For callers with nobody to ask; any OTP or captcha page fails the login.
pub struct NoPrompt;

impl OtpPrompt for NoPrompt {
    fn one_time_password(&mut self) -> Result<String, Error> {
        Err(Error::AuthenticationFailed(
            "One-time password required but no prompt available".to_owned(),
        ))
    }

    fn captcha(&mut self, _: &[u8]) -> Result<String, Error> {
        Err(Error::AuthenticationFailed(
            "Captcha required but no prompt available".to_owned(),
        ))
    }
}
