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

use std::path::{Path, PathBuf};

use structopt::StructOpt;

use super::commands;
use crate::support::sysexits::*;
use crate::support::system_config::GatewayConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The gateway configuration file
    /// [default: /etc/exgate/exgate.toml or /usr/local/etc/exgate/exgate.toml]
    #[structopt(long, short, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Default)]
pub(super) struct LoginOptions {
    /// The login to present to the server, e.g. `DOMAIN\user` or
    /// `user@example.com` [default: current UNIX user name]
    #[structopt(long, short)]
    pub(super) user: Option<String>,
}

#[derive(StructOpt)]
enum Command {
    /// Log in, report what was discovered about the mailbox, and log out.
    ///
    /// If this succeeds, the login flow, the backend selection and the
    /// mailbox discovery all work against the configured server.
    Check(LoginOptions),
    /// List folders.
    Folders(FoldersSubcommand),
    /// List the messages of one folder, newest first.
    Messages(MessagesSubcommand),
    /// Search the global address list.
    Gal(GalSubcommand),
}

impl Command {
    fn login(&self) -> &LoginOptions {
        match *self {
            Command::Check(ref c) => c,
            Command::Folders(ref c) => &c.login,
            Command::Messages(ref c) => &c.login,
            Command::Gal(ref c) => &c.login,
        }
    }
}

#[derive(StructOpt)]
pub(super) struct FoldersSubcommand {
    #[structopt(flatten)]
    pub(super) login: LoginOptions,

    /// Also list folders below the immediate children.
    #[structopt(long, short)]
    pub(super) recursive: bool,

    /// The folder to list, e.g. `INBOX` or `/public`. Lists the mailbox
    /// root if not given.
    #[structopt(default_value = "")]
    pub(super) path: String,
}

#[derive(StructOpt)]
pub(super) struct MessagesSubcommand {
    #[structopt(flatten)]
    pub(super) login: LoginOptions,

    /// Only show this many messages.
    #[structopt(long, short, default_value = "20")]
    pub(super) limit: usize,

    #[structopt(default_value = "INBOX")]
    pub(super) path: String,
}

#[derive(StructOpt)]
pub(super) struct GalSubcommand {
    #[structopt(flatten)]
    pub(super) login: LoginOptions,

    /// Stop after this many entries. 0 means no limit.
    #[structopt(long, short, default_value = "50")]
    pub(super) limit: usize,

    /// A name, alias or address to look for.
    pub(super) query: String,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options = Options::from_clap(&match Options::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let config_path = options.config.unwrap_or_else(|| {
        if Path::new("/etc/exgate/exgate.toml").is_file() {
            "/etc/exgate/exgate.toml".to_owned().into()
        } else if Path::new("/usr/local/etc/exgate/exgate.toml").is_file() {
            "/usr/local/etc/exgate/exgate.toml".to_owned().into()
        } else {
            eprintln!(
                "Neither /etc/exgate/exgate.toml nor \
                 /usr/local/etc/exgate/exgate.toml exists;\n\
                 use --config=/path/to/exgate.toml if your configuration \
                 is elsewhere."
            );
            EX_CONFIG.exit()
        }
    });

    let config = match GatewayConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            EX_CONFIG.exit()
        }
    };
    if config.exchange.url.is_empty() {
        eprintln!(
            "No exchange.url set in '{}'",
            config_path.display()
        );
        EX_CONFIG.exit();
    }

    init_log(config_path.parent().unwrap_or_else(|| Path::new(".")));

    let login = match options.command.login().user {
        Some(ref user) => user.clone(),
        None => match nix::unistd::User::from_uid(nix::unistd::getuid()) {
            Ok(Some(user)) => user.name,
            _ => {
                eprintln!("Unable to determine your user name; use --user");
                EX_USAGE.exit()
            }
        },
    };

    let password =
        match rpassword::read_password_from_tty(Some("Password: ")) {
            Ok(password) => password,
            Err(e) => {
                eprintln!("Unable to read password: {}", e);
                EX_USAGE.exit()
            }
        };

    let result = match options.command {
        Command::Check(_) => commands::check(&config, &login, &password),
        Command::Folders(cmd) => {
            commands::folders(&config, &login, &password, cmd)
        }
        Command::Messages(cmd) => {
            commands::messages(&config, &login, &password, cmd)
        }
        Command::Gal(cmd) => commands::gal(&config, &login, &password, cmd),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        Sysexit::from(&e).exit();
    }
}

fn init_log(config_dir: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    // log4rs or syslog, but not both: log4rs-syslog is long unmaintained.
    let log_config_file = config_dir.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            eprintln!(
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
            EX_CONFIG.exit();
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let result = syslog::unix(formatter).map_err(|e| e.to_string()).and_then(
            |logger| {
                log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                    .map(|_| log::set_max_level(log::LevelFilter::Info))
                    .map_err(|e| e.to_string())
            },
        );
        if let Err(e) = result {
            eprintln!("Failed to initialise logging: {}", e);
            EX_UNAVAILABLE.exit();
        }
    }
}
