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

use std::error::Error as _;
use std::io::{self, Read};
use std::time::Duration;

use super::{Method, Request, Response, Transport};
use crate::support::error::Error;
use crate::support::system_config::HttpConfig;

/// The production transport, backed by a blocking `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            // HttpClient follows redirects itself so it can see every
            // intermediate Set-Cookie and landing URL.
            .redirects(0)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        UreqTransport { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&mut self, request: &Request) -> Result<Response, Error> {
        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for &(ref name, ref value) in &request.headers {
            call = call.set(name, value);
        }

        let result = if request.body.is_empty()
            && matches!(request.method, Method::Get | Method::Head)
        {
            call.call()
        } else {
            call.send_bytes(&request.body)
        };

        let response = match result {
            Ok(response) => response,
            // Statuses are data at this layer
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => {
                return Err(transport_error(&request.url, &e))
            }
        };

        let status = response.status();
        let url = response.get_url().to_owned();
        let mut headers = Vec::new();
        for name in response.headers_names() {
            for value in response.all(&name) {
                headers.push((name.clone(), value.to_owned()));
            }
        }

        let mut body = Vec::new();
        response.into_reader().read_to_end(&mut body).map_err(|e| {
            if is_timeout(&e) {
                Error::Timeout(format!("{}: {}", url, e))
            } else {
                Error::Connectivity(format!("{}: {}", url, e))
            }
        })?;

        Ok(Response {
            status,
            url,
            headers,
            body,
        })
    }

    /// ureq only speaks Basic; NTLM-only servers must be reached through
    /// form login or a front-end proxy.
    fn enable_ntlm(&mut self) -> bool {
        false
    }
}

fn transport_error(url: &str, e: &ureq::Transport) -> Error {
    let timed_out = e
        .source()
        .and_then(|s| s.downcast_ref::<io::Error>())
        .map_or(false, is_timeout);

    if timed_out {
        Error::Timeout(format!("{}: {}", url, e))
    } else {
        match e.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                Error::Configuration(format!("{}: {}", url, e))
            }
            _ => Error::Connectivity(format!("{}: {}", url, e)),
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_ntlm_escalation() {
        let mut transport = UreqTransport::new(&HttpConfig::default());
        assert!(!transport.enable_ntlm());
    }
}
