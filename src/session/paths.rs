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

//! Mapping from the logical folder paths clients use to backend locations.
//!
//! Clients name folders either relative to the user's mailbox (`INBOX`,
//! `Sent/2019`), relative to another principal's mailbox
//! (`/users/boss@example.com/calendar`), in the public folder tree
//! (`/public/Team`), or by absolute server path.

use super::SessionInfo;

/// The folders every mailbox has, which the server names differently
/// depending on locale and protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WellKnown {
    Inbox,
    Trash,
    Drafts,
    Sent,
    SendMsg,
    Junk,
    Outbox,
    Calendar,
    Tasks,
    Contacts,
}

pub const ALL_WELL_KNOWN: &[WellKnown] = &[
    WellKnown::Inbox,
    WellKnown::Trash,
    WellKnown::Drafts,
    WellKnown::Sent,
    WellKnown::SendMsg,
    WellKnown::Junk,
    WellKnown::Outbox,
    WellKnown::Calendar,
    WellKnown::Tasks,
    WellKnown::Contacts,
];

impl WellKnown {
    /// Recognise the first segment of a mailbox-relative logical path.
    pub fn from_logical(segment: &str) -> Option<Self> {
        match segment {
            s if s.eq_ignore_ascii_case("INBOX") => Some(WellKnown::Inbox),
            "Trash" => Some(WellKnown::Trash),
            "Drafts" => Some(WellKnown::Drafts),
            "Sent" => Some(WellKnown::Sent),
            "sendmsg" => Some(WellKnown::SendMsg),
            "Junk" => Some(WellKnown::Junk),
            "Unsent Messages" => Some(WellKnown::Outbox),
            "calendar" => Some(WellKnown::Calendar),
            "tasks" => Some(WellKnown::Tasks),
            "contacts" | "addressbook" => Some(WellKnown::Contacts),
            _ => None,
        }
    }

    /// The name clients see.
    pub fn logical_name(self) -> &'static str {
        match self {
            WellKnown::Inbox => "INBOX",
            WellKnown::Trash => "Trash",
            WellKnown::Drafts => "Drafts",
            WellKnown::Sent => "Sent",
            WellKnown::SendMsg => "sendmsg",
            WellKnown::Junk => "Junk",
            WellKnown::Outbox => "Unsent Messages",
            WellKnown::Calendar => "calendar",
            WellKnown::Tasks => "tasks",
            WellKnown::Contacts => "contacts",
        }
    }

    /// The `urn:schemas:httpmail:` property on the mailbox root which holds
    /// this folder's URL, if the WebDAV backend advertises one.
    pub fn dav_property(self) -> Option<&'static str> {
        match self {
            WellKnown::Inbox => Some("inbox"),
            WellKnown::Trash => Some("deleteditems"),
            WellKnown::Drafts => Some("drafts"),
            WellKnown::Sent => Some("sentitems"),
            WellKnown::SendMsg => Some("sendmsg"),
            WellKnown::Outbox => Some("outbox"),
            WellKnown::Calendar => Some("calendar"),
            WellKnown::Tasks => Some("tasks"),
            WellKnown::Contacts => Some("contacts"),
            WellKnown::Junk => None,
        }
    }

    /// The EWS `DistinguishedFolderId` name.
    pub fn ews_id(self) -> &'static str {
        match self {
            WellKnown::Inbox => "inbox",
            WellKnown::Trash => "deleteditems",
            WellKnown::Drafts => "drafts",
            WellKnown::Sent => "sentitems",
            WellKnown::SendMsg | WellKnown::Outbox => "outbox",
            WellKnown::Junk => "junkemail",
            WellKnown::Calendar => "calendar",
            WellKnown::Tasks => "tasks",
            WellKnown::Contacts => "contacts",
        }
    }
}

/// Where a logical path points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderRef {
    /// A folder inside a mailbox. `owner` is `None` for the user's own
    /// mailbox. `rest` is the remaining `/`-separated path below the
    /// well-known folder, or below the mailbox root if there is none.
    Mailbox {
        owner: Option<String>,
        well_known: Option<WellKnown>,
        rest: String,
    },
    /// A path below the public folder root.
    Public(String),
    /// `/users/` itself: the root of all mailboxes.
    Root,
    /// An absolute server path given verbatim.
    Absolute(String),
}

const USERS_PREFIX: &str = "/users/";
const PUBLIC_ROOT: &str = "/public";

/// If `path` is `prefix` or starts with `prefix/`, return what follows.
pub fn strip_segment<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

fn split_first(path: &str) -> (&str, &str) {
    match path.find('/') {
        Some(ix) => (&path[..ix], &path[ix + 1..]),
        None => (path, ""),
    }
}

fn mailbox_relative(owner: Option<String>, path: &str) -> FolderRef {
    let (first, rest) = split_first(path);
    match WellKnown::from_logical(first) {
        Some(well_known) => FolderRef::Mailbox {
            owner,
            well_known: Some(well_known),
            rest: rest.to_owned(),
        },
        None => FolderRef::Mailbox {
            owner,
            well_known: None,
            rest: path.to_owned(),
        },
    }
}

pub fn resolve(path: &str, info: &SessionInfo) -> FolderRef {
    if let Some(rest) = path.strip_prefix(USERS_PREFIX) {
        let (principal, local) = split_first(rest);
        if principal.is_empty() {
            return FolderRef::Root;
        }

        let own = principal.eq_ignore_ascii_case(&info.alias)
            || principal.eq_ignore_ascii_case(&info.email);
        let owner = if own { None } else { Some(principal.to_owned()) };
        return mailbox_relative(owner, local);
    }

    if let Some(rest) = strip_segment(path, PUBLIC_ROOT) {
        return FolderRef::Public(rest.to_owned());
    }

    if path.starts_with('/') {
        return FolderRef::Absolute(path.to_owned());
    }

    mailbox_relative(None, path)
}

/// Whether `path` lies outside the user's own mailbox.
pub fn is_shared(path: &str, info: &SessionInfo) -> bool {
    match resolve(path, info) {
        FolderRef::Mailbox { owner, .. } => owner.is_some(),
        FolderRef::Public(_) | FolderRef::Root => true,
        FolderRef::Absolute(absolute) => !absolute
            .to_lowercase()
            .starts_with(&info.mail_path.to_lowercase()),
    }
}

/// Whether `path` is the user's own default calendar.
pub fn is_main_calendar(path: &str, info: &SessionInfo) -> bool {
    matches!(
        resolve(path, info),
        FolderRef::Mailbox {
            owner: None,
            well_known: Some(WellKnown::Calendar),
            ref rest,
        } if rest.is_empty()
    )
}

/// Join `parent` and `child` with exactly one slash between them.
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_owned()
    } else if child.is_empty() {
        parent.to_owned()
    } else {
        format!(
            "{}/{}",
            parent.trim_end_matches('/'),
            child.trim_start_matches('/')
        )
    }
}
