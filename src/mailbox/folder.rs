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

use std::collections::HashMap;

use log::debug;

use super::message::MessageList;
use super::{Properties, Uid};

/// One folder as seen by a client session.
///
/// Besides the properties reported by the server, a folder owns the state
/// needed to present a stable view to IMAP clients across reloads: the UID
/// watermark and the map from permanent message id to the UID first seen
/// for it.
#[derive(Debug, Default)]
pub struct Folder {
    /// Logical path, e.g. `INBOX/Archive`.
    pub path: String,
    /// EWS folder id; unused on DAV.
    pub backend_id: Option<String>,
    pub display_name: Option<String>,
    /// `PR_CONTAINER_CLASS`, e.g. `IPF.Note`.
    pub folder_class: Option<String>,
    pub count: u32,
    pub unread_count: u32,
    pub has_children: bool,
    pub no_inferiors: bool,
    /// Changes whenever the folder content changes.
    pub ctag: Option<String>,
    /// Changes whenever the folder object itself changes.
    pub etag: Option<String>,
    pub uid_next: u64,
    pub recent: u32,
    /// Empty until messages are loaded.
    pub messages: Option<MessageList>,
    uid_map: HashMap<String, Uid>,
}

fn parse_u32(value: Option<&String>) -> u32 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn truthy(value: Option<&String>) -> bool {
    value.map_or(false, |v| "1" == v || v.eq_ignore_ascii_case("true"))
}

impl Folder {
    pub fn new(path: impl Into<String>) -> Self {
        Folder {
            path: path.into(),
            ..Folder::default()
        }
    }

    pub fn from_properties(path: String, props: &Properties) -> Self {
        let unread_count = parse_u32(props.get("unreadcount"));
        Folder {
            path,
            backend_id: None,
            display_name: props.get("displayname").cloned(),
            folder_class: props.get("folderclass").cloned(),
            count: parse_u32(props.get("count")),
            unread_count,
            has_children: truthy(props.get("hassubs")),
            no_inferiors: truthy(props.get("nosubs")),
            ctag: props.get("ctag").cloned(),
            etag: props.get("lastmodified").cloned(),
            uid_next: u64::from(parse_u32(props.get("uidNext"))),
            // The server has no notion of recent, so approximate it
            recent: unread_count,
            messages: None,
            uid_map: HashMap::new(),
        }
    }

    /// The IMAP LIST attribute for this folder.
    pub fn flags(&self) -> &'static str {
        if self.no_inferiors {
            "\\NoInferiors"
        } else if self.has_children {
            "\\HasChildren"
        } else {
            "\\HasNoChildren"
        }
    }

    pub fn is_calendar(&self) -> bool {
        self.folder_class.as_deref() == Some("IPF.Appointment")
    }

    pub fn is_contact(&self) -> bool {
        self.folder_class.as_deref() == Some("IPF.Contact")
    }

    pub fn is_task(&self) -> bool {
        self.folder_class.as_deref() == Some("IPF.Task")
    }

    /// The message count, from the loaded list if there is one.
    pub fn count(&self) -> u32 {
        match self.messages {
            Some(ref messages) => messages.len() as u32,
            None => self.count,
        }
    }

    /// Merge freshly fetched properties of this folder into `self`.
    ///
    /// Returns whether the content changed, in which case the caller must
    /// reload the messages. A folder never refreshed before always counts
    /// as changed. `uid_next` only ever grows.
    pub fn apply_refresh(&mut self, fetched: &Folder) -> bool {
        if self.ctag.is_some() && self.ctag == fetched.ctag {
            return false;
        }

        debug!(
            "Content tag changed on {} {:?} => {:?}, reloading messages",
            self.path, self.ctag, fetched.ctag
        );
        self.has_children = fetched.has_children;
        self.no_inferiors = fetched.no_inferiors;
        self.unread_count = fetched.unread_count;
        self.count = fetched.count;
        self.ctag = fetched.ctag.clone();
        self.etag = fetched.etag.clone();
        if fetched.uid_next > self.uid_next {
            self.uid_next = fetched.uid_next;
        }
        true
    }

    /// Install a full listing of this folder's messages.
    ///
    /// UIDs are corrected through the UID map, the recent count is
    /// recomputed and `uid_next` raised past the greatest UID.
    pub fn install_messages(&mut self, mut messages: MessageList) {
        self.fix_uids(&mut messages);
        self.recent = messages.recent_count();

        let computed = messages.last_uid().map_or(1, Uid::successor);
        if computed > self.uid_next {
            self.uid_next = computed;
        }

        self.messages = Some(messages);
    }

    /// Restore UIDs the server reassigned since we first saw each message.
    ///
    /// Exchange gives a message a new article number when its flags are
    /// changed over DAV, which would look to an IMAP client like the message
    /// being expunged and a new one appearing.
    pub fn fix_uids(&mut self, messages: &mut MessageList) {
        let mut sort_needed = false;
        for message in messages.messages_mut() {
            match self.uid_map.get(&message.permanent_id) {
                Some(&previous) => {
                    if previous != message.uid {
                        debug!(
                            "Restoring IMAP uid {} -> {} for message {}",
                            message.uid, previous, message.permanent_id
                        );
                        message.uid = previous;
                        sort_needed = true;
                    }
                }
                None => {
                    self.uid_map
                        .insert(message.permanent_id.clone(), message.uid);
                }
            }
        }

        if sort_needed {
            messages.sort();
        }
    }

    /// Drop the cached message body, if any.
    pub fn clear_cache(&mut self) {
        if let Some(ref mut messages) = self.messages {
            messages.clear_cache();
        }
    }
}
