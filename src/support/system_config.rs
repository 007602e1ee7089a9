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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// The gateway-wide configuration.
///
/// This is stored in a file typically named `exgate.toml`. Every section is
/// optional except for `exchange.url`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    /// Where the groupware server lives and how to talk to it.
    pub exchange: ExchangeConfig,

    /// Options for the underlying HTTP transport.
    #[serde(default)]
    pub http: HttpConfig,

    /// Behavioural tuning for folder listing, content and calendar queries.
    #[serde(default)]
    pub settings: Settings,

    /// Overrides mapping IMAP flags to Exchange keywords (categories).
    ///
    /// Keys are IMAP flag names such as `$label1`; values are the Exchange
    /// keyword. Entries here take precedence over the built-in table.
    #[serde(default)]
    pub imap_flags: BTreeMap<String, String>,
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| {
            Error::Configuration(format!("{}: {}", path.display(), e))
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct ExchangeConfig {
    /// The OWA URL, e.g. `https://mail.example.com/owa/`.
    pub url: String,

    /// Which backend protocol to use.
    #[serde(default)]
    pub mode: BackendMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Try the SQL-like WebDAV backend first and fall back to EWS.
    Auto,
    Dav,
    Ews,
}

impl Default for BackendMode {
    fn default() -> Self {
        BackendMode::Auto
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall timeout for a single request, in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: 120,
            user_agent: format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of messages returned when listing a folder. 0 means
    /// unlimited.
    pub folder_size_limit: u32,

    /// If true, folder listings include calendar, contact and other
    /// non-mail folders.
    pub include_special_folders: bool,

    /// If true, a message whose content can neither be downloaded nor
    /// rebuilt from its properties is deleted from the server. The error is
    /// still reported to the client.
    pub delete_broken: bool,

    /// Days to keep messages in Trash. 0 disables purging.
    pub keep_delay: u32,

    /// Days to keep messages in Sent. 0 disables purging.
    pub sent_keep_delay: u32,

    /// Calendar events that ended more than this many days ago are not
    /// listed. 0 lists everything.
    pub caldav_past_delay: u32,

    /// Hide private events when listing shared or public calendars.
    pub exclude_private_events: bool,

    /// Do not merge the tasks folder into the main calendar.
    pub disable_tasks: bool,

    /// List tasks created directly in calendar folders.
    pub enable_legacy_tasks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            folder_size_limit: 0,
            include_special_folders: false,
            delete_broken: false,
            keep_delay: 30,
            sent_keep_delay: 0,
            caldav_past_delay: 90,
            exclude_private_events: true,
            disable_tasks: false,
            enable_legacy_tasks: false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
[exchange]
url = "https://mail.example.com/owa/"
"#,
        )
        .unwrap();

        assert_eq!("https://mail.example.com/owa/", config.exchange.url);
        assert_eq!(BackendMode::Auto, config.exchange.mode);
        assert_eq!(120, config.http.timeout_secs);
        assert_eq!(30, config.settings.keep_delay);
        assert!(config.settings.exclude_private_events);
        assert!(config.imap_flags.is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[exchange]
url = "https://owa.example.org/owa/"
mode = "ews"

[settings]
folder_size_limit = 500
delete_broken = true

[imap_flags]
"$label1" = "Important"
"#
        )
        .unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(BackendMode::Ews, config.exchange.mode);
        assert_eq!(500, config.settings.folder_size_limit);
        assert!(config.settings.delete_broken);
        assert_eq!(90, config.settings.caldav_past_delay);
        assert_eq!(
            Some("Important"),
            config.imap_flags.get("$label1").map(String::as_str)
        );
    }

    #[test]
    fn bad_mode_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[exchange]
url = "https://owa.example.org/owa/"
mode = "carrier-pigeon"
"#
        )
        .unwrap();

        assert_matches!(
            Err(Error::Configuration(..)),
            GatewayConfig::load(file.path())
        );
    }
}
