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

use std::fmt;
use std::sync::{Arc, Mutex};

/// Text included at the start of every log statement about one session.
///
/// Clones of a `LogPrefix` share the same underlying data, so the handshake
/// can fill in the principal and server generation after the prefix has
/// already been handed to the transport.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    protocol: String,
    user: Option<String>,
    server: Option<String>,
}

impl LogPrefix {
    pub fn new(protocol: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                protocol,
                user: None,
                server: None,
            })),
        }
    }

    pub fn set_user(&self, user: String) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.user = Some(sanitise(user));
        }
    }

    pub fn set_server(&self, server: String) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.server = Some(sanitise(server));
        }
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return write!(f, "?"),
        };
        write!(f, "{}", inner.protocol)?;
        match (&inner.user, &inner.server) {
            (None, None) => Ok(()),
            (Some(user), None) => write!(f, "[{}]", user),
            (None, Some(server)) => write!(f, "[@{}]", server),
            (Some(user), Some(server)) => write!(f, "[{}@{}]", user, server),
        }
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formatting() {
        let prefix = LogPrefix::new("imap".to_owned());
        assert_eq!("imap", prefix.to_string());

        let clone = prefix.clone();
        clone.set_user("DOMAIN\\jdoe\r\n".to_owned());
        assert_eq!("imap[DOMAIN\\jdoe]", prefix.to_string());

        prefix.set_server("Exchange2007".to_owned());
        assert_eq!("imap[DOMAIN\\jdoe@Exchange2007]", clone.to_string());
    }
}
