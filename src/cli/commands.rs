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

//! The interactive commands, each of which runs one short session.

use log::info;

use super::main::{FoldersSubcommand, GalSubcommand, MessagesSubcommand};
use crate::auth::prompt::TtyPrompt;
use crate::condition::Condition;
use crate::mailbox::Folder;
use crate::session::Session;
use crate::support::error::Error;
use crate::support::system_config::GatewayConfig;

fn open(
    config: &GatewayConfig,
    login: &str,
    password: &str,
) -> Result<Session, Error> {
    let session = Session::open(config, login, password, &mut TtyPrompt)?;
    info!(
        "Logged in as {} <{}>",
        session.info().alias,
        session.info().email
    );
    Ok(session)
}

pub(super) fn check(
    config: &GatewayConfig,
    login: &str,
    password: &str,
) -> Result<(), Error> {
    let mut session = open(config, login, password)?;
    let info = session.info().clone();
    println!("Server:    {}", info.version);
    println!("Alias:     {}", info.alias);
    println!("Email:     {}", info.email);
    println!("Mailbox:   {}", info.mail_path);

    let inbox = session.get_folder("INBOX")?;
    println!(
        "INBOX:     {} messages, {} unread",
        inbox.count, inbox.unread_count
    );

    if session.is_expired()? {
        return Err(Error::AuthenticationFailed(
            "session expired right after login".to_owned(),
        ));
    }
    Ok(())
}

fn print_folder(folder: &Folder) {
    println!(
        "{:<40} {:>7} {:>7}  {}",
        if folder.path.is_empty() { "/" } else { &folder.path },
        folder.count,
        folder.unread_count,
        folder.flags()
    );
}

pub(super) fn folders(
    config: &GatewayConfig,
    login: &str,
    password: &str,
    cmd: FoldersSubcommand,
) -> Result<(), Error> {
    let mut session = open(config, login, password)?;
    let mut folders = session.get_sub_folders(&cmd.path, cmd.recursive)?;
    folders.sort_by(|a, b| a.path.cmp(&b.path));
    for folder in &folders {
        print_folder(folder);
    }
    Ok(())
}

pub(super) fn messages(
    config: &GatewayConfig,
    login: &str,
    password: &str,
    cmd: MessagesSubcommand,
) -> Result<(), Error> {
    let mut session = open(config, login, password)?;
    let mut folder = session.get_folder(&cmd.path)?;
    session.load_messages(&mut folder)?;

    if let Some(ref messages) = folder.messages {
        for message in messages.iter().rev().take(cmd.limit) {
            println!(
                "{:>8} {:>10} {:<25} {}",
                message.uid,
                message.size,
                message.date.as_deref().unwrap_or("-"),
                message.imap_flags(session.flag_map())
            );
        }
    }
    Ok(())
}

pub(super) fn gal(
    config: &GatewayConfig,
    login: &str,
    password: &str,
    cmd: GalSubcommand,
) -> Result<(), Error> {
    let mut session = open(config, login, password)?;
    let condition = if cmd.query.contains('@') {
        Condition::equals("smtpemail1", &cmd.query)
    } else {
        Condition::or(vec![
            Condition::equals("imapUid", &cmd.query),
            Condition::contains("cn", &cmd.query),
        ])
    };

    for (name, contact) in session.gal_find(&condition, cmd.limit)? {
        println!(
            "{:<20} {:<30} {}",
            name,
            contact.get("cn").unwrap_or(""),
            contact.get("smtpemail1").unwrap_or("")
        );
    }
    Ok(())
}
