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

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use log::debug;

use super::flags::FlagMap;
use super::{Properties, Uid};
use crate::support::error::Error;

bitflags! {
    /// The per-message state Exchange tracks as distinct properties.
    pub struct MessageFlags: u32 {
        const READ = 1 << 0;
        const DELETED = 1 << 1;
        const RECENT = 1 << 2;
        const FLAGGED = 1 << 3;
        const JUNK = 1 << 4;
        const DRAFT = 1 << 5;
        const ANSWERED = 1 << 6;
        const FORWARDED = 1 << 7;
    }
}

/// `PR_MESSAGE_FLAGS` bit for unsent messages.
const MSGFLAG_UNSENT: u32 = 8;

/// The properties requested for every IMAP message listing.
pub const IMAP_MESSAGE_ATTRIBUTES: &[&str] = &[
    "permanenturl",
    "urlcompname",
    "uid",
    "messageSize",
    "imapUid",
    "junk",
    "flagStatus",
    "messageFlags",
    "lastVerbExecuted",
    "read",
    "deleted",
    "date",
    "lastmodified",
    "keywords",
    "contentclass",
];

/// The properties a POP3 listing needs.
pub const POP_MESSAGE_ATTRIBUTES: &[&str] = &["uid", "imapUid", "messageSize"];

pub const UID_MESSAGE_ATTRIBUTES: &[&str] = &["uid"];

/// One mail message as listed by the backend.
///
/// Equality and ordering of messages within a folder are by `uid` alone.
#[derive(Clone, Debug)]
pub struct Message {
    /// Where the message currently lives: the item URL on DAV, the item id
    /// on EWS. Changes when the message is moved.
    pub href: String,
    /// EWS change key, if any.
    pub change_key: Option<String>,
    /// Stable across moves. Keys the UID map.
    pub permanent_id: String,
    pub uid: Uid,
    /// The Exchange message uid, unrelated to `uid`.
    pub exchange_uid: Option<String>,
    pub content_class: Option<String>,
    pub size: u32,
    pub date: Option<String>,
    pub last_modified: Option<String>,
    pub flags: MessageFlags,
    /// Comma-separated Exchange keywords (categories).
    pub keywords: Option<String>,
}

fn truthy(value: Option<&str>) -> bool {
    value.map_or(false, |v| "1" == v || v.eq_ignore_ascii_case("true"))
}

fn int(value: Option<&str>) -> u32 {
    value.and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0)
}

impl Message {
    /// Build a message from the listing properties of one item.
    ///
    /// `href` is the location id; the permanent id falls back to it when the
    /// server did not report one.
    pub fn from_properties(
        href: String,
        change_key: Option<String>,
        props: &Properties,
    ) -> Result<Self, Error> {
        let get = |name: &str| props.get(name).map(String::as_str);

        let uid = get("imapUid")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .and_then(Uid::of)
            .ok_or_else(|| {
                Error::ServerError(format!("{} has no valid imapUid", href))
            })?;

        let mut flags = MessageFlags::empty();
        flags.set(MessageFlags::READ, truthy(get("read")));
        flags.set(MessageFlags::JUNK, truthy(get("junk")));
        flags.set(MessageFlags::FLAGGED, Some("2") == get("flagStatus"));
        flags.set(
            MessageFlags::DRAFT,
            0 != int(get("messageFlags")) & MSGFLAG_UNSENT,
        );
        let last_verb = get("lastVerbExecuted");
        flags.set(
            MessageFlags::ANSWERED,
            Some("102") == last_verb || Some("103") == last_verb,
        );
        flags.set(MessageFlags::FORWARDED, Some("104") == last_verb);
        flags.set(MessageFlags::DELETED, truthy(get("deleted")));

        let date = get("date").map(str::to_owned);
        let last_modified = get("lastmodified").map(str::to_owned);
        flags.set(
            MessageFlags::RECENT,
            !flags.contains(MessageFlags::READ)
                && last_modified.is_some()
                && last_modified == date,
        );

        let message = Message {
            permanent_id: get("permanenturl")
                .map_or_else(|| href.clone(), str::to_owned),
            href,
            change_key,
            uid,
            exchange_uid: get("uid").map(str::to_owned),
            content_class: get("contentclass").map(str::to_owned),
            size: int(get("messageSize")),
            date,
            last_modified,
            flags,
            keywords: get("keywords")
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
        };
        debug!(
            "Message IMAP uid: {} uid: {:?} href: {} permanent: {}",
            message.uid, message.exchange_uid, message.href, message.permanent_id
        );
        Ok(message)
    }

    /// The flags in IMAP syntax, system flags first, then keywords.
    pub fn imap_flags(&self, flag_map: &FlagMap) -> String {
        let mut out = Vec::<String>::new();
        for &(flag, name) in &[
            (MessageFlags::READ, "\\Seen"),
            (MessageFlags::DELETED, "\\Deleted"),
            (MessageFlags::RECENT, "\\Recent"),
            (MessageFlags::FLAGGED, "\\Flagged"),
            (MessageFlags::JUNK, "Junk"),
            (MessageFlags::DRAFT, "\\Draft"),
            (MessageFlags::ANSWERED, "\\Answered"),
            (MessageFlags::FORWARDED, "$Forwarded"),
        ] {
            if self.flags.contains(flag) {
                out.push(name.to_owned());
            }
        }

        for keyword in self.keyword_list() {
            out.push(flag_map.to_flag(keyword));
        }

        out.join(" ")
    }

    fn keyword_list(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter(|k| !k.is_empty())
    }

    /// Add the keyword for IMAP `flag`, returning the new keyword list.
    pub fn add_flag(&mut self, flag: &str, flag_map: &FlagMap) -> String {
        let keyword = flag_map.to_keyword(flag);
        let mut keywords = self
            .keyword_list()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword)) {
            keywords.push(keyword);
        }
        self.store_keywords(keywords)
    }

    /// Remove the keyword for IMAP `flag`, returning the new keyword list.
    pub fn remove_flag(&mut self, flag: &str, flag_map: &FlagMap) -> String {
        let keyword = flag_map.to_keyword(flag);
        let keywords = self
            .keyword_list()
            .filter(|k| !k.eq_ignore_ascii_case(&keyword))
            .map(str::to_owned)
            .collect::<Vec<_>>();
        self.store_keywords(keywords)
    }

    /// Replace the keywords with those of `flags`, returning the new list.
    pub fn set_flags<'a>(
        &mut self,
        flags: impl IntoIterator<Item = &'a str>,
        flag_map: &FlagMap,
    ) -> String {
        let mut keywords = Vec::<String>::new();
        for flag in flags {
            let keyword = flag_map.to_keyword(flag);
            if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword)) {
                keywords.push(keyword);
            }
        }
        self.store_keywords(keywords)
    }

    fn store_keywords(&mut self, keywords: Vec<String>) -> String {
        let joined = keywords.join(",");
        self.keywords = if joined.is_empty() {
            None
        } else {
            Some(joined.clone())
        };
        joined
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for Message {}

/// A downloaded message, split into header and body.
#[derive(Debug)]
pub struct MessageContent {
    raw: Vec<u8>,
    start: usize,
    header_end: usize,
    body_start: usize,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Return (end of headers, start of body) for the message starting at
/// `start`.
fn split_header(raw: &[u8], start: usize) -> (usize, usize) {
    let rest = &raw[start..];
    let crlf = find(rest, b"\r\n\r\n").map(|ix| (ix + 2, ix + 4));
    let lf = find(rest, b"\n\n").map(|ix| (ix + 1, ix + 2));
    let (header_end, body_start) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => (rest.len(), rest.len()),
    };
    (start + header_end, start + body_start)
}

impl MessageContent {
    pub fn parse(raw: Vec<u8>) -> Self {
        let (header_end, body_start) = split_header(&raw, 0);
        let mut content = MessageContent {
            raw,
            start: 0,
            header_end,
            body_start,
        };

        // Exchange 2003 sometimes wraps the real message in an SMTP envelope
        // rendered as headers; the message proper is then the body.
        if content.header("MAIL FROM").is_some() {
            let (header_end, body_start) =
                split_header(&content.raw, content.body_start);
            content.start = content.body_start;
            content.header_end = header_end;
            content.body_start = body_start;
        }

        content
    }

    /// The full message as a client should see it.
    pub fn raw(&self) -> &[u8] {
        &self.raw[self.start..]
    }

    pub fn headers(&self) -> &[u8] {
        &self.raw[self.start..self.header_end]
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[self.body_start..]
    }

    pub fn size(&self) -> usize {
        self.raw.len() - self.start
    }

    /// The unfolded value of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<String> {
        let headers = String::from_utf8_lossy(self.headers());
        let mut value: Option<String> = None;
        for line in headers.split('\n') {
            let line = line.trim_end_matches('\r');
            if let Some(ref mut v) = value {
                if line.starts_with(' ') || line.starts_with('\t') {
                    v.push(' ');
                    v.push_str(line.trim());
                    continue;
                }
                break;
            }

            if let Some(colon) = line.find(':') {
                if line[..colon].trim().eq_ignore_ascii_case(name) {
                    value = Some(line[colon + 1..].trim().to_owned());
                }
            }
        }
        value
    }
}

/// The messages of one folder listing, in ascending UID order.
///
/// Holds at most one downloaded message body, that of the most recently
/// loaded message, so a client fetching messages one part at a time does
/// not download each message repeatedly while a bulk fetch still only keeps
/// one message in memory.
#[derive(Debug, Default)]
pub struct MessageList {
    messages: Vec<Message>,
    cached: Option<(Uid, Arc<MessageContent>)>,
}

impl MessageList {
    pub fn new(mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.uid);
        MessageList {
            messages,
            cached: None,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn by_uid(&self, uid: Uid) -> Option<&Message> {
        self.messages
            .binary_search_by_key(&uid, |m| m.uid)
            .ok()
            .map(|ix| &self.messages[ix])
    }

    pub fn by_uid_mut(&mut self, uid: Uid) -> Option<&mut Message> {
        match self.messages.binary_search_by_key(&uid, |m| m.uid) {
            Ok(ix) => Some(&mut self.messages[ix]),
            Err(_) => None,
        }
    }

    pub(super) fn messages_mut(&mut self) -> &mut Vec<Message> {
        &mut self.messages
    }

    pub(super) fn sort(&mut self) {
        self.messages.sort_by_key(|m| m.uid);
    }

    pub fn last_uid(&self) -> Option<Uid> {
        self.messages.last().map(|m| m.uid)
    }

    pub fn recent_count(&self) -> u32 {
        self.messages
            .iter()
            .filter(|m| m.flags.contains(MessageFlags::RECENT))
            .count() as u32
    }

    /// The IMAP flags of every message, by UID.
    pub fn imap_flag_map(&self, flag_map: &FlagMap) -> BTreeMap<Uid, String> {
        self.messages
            .iter()
            .map(|m| (m.uid, m.imap_flags(flag_map)))
            .collect()
    }

    /// Return the content of the message with `uid`, downloading it with
    /// `load` unless it is the one currently cached.
    ///
    /// The result replaces whatever was cached before.
    pub fn content(
        &mut self,
        uid: Uid,
        load: impl FnOnce(&Message) -> Result<Vec<u8>, Error>,
    ) -> Result<Arc<MessageContent>, Error> {
        if let Some((cached_uid, ref content)) = self.cached {
            if cached_uid == uid {
                debug!("Got message content for {} from cache", uid);
                return Ok(Arc::clone(content));
            }
        }

        let message = self
            .by_uid(uid)
            .ok_or_else(|| Error::NotFound(format!("IMAP uid {}", uid)))?;
        let content = Arc::new(MessageContent::parse(load(message)?));
        debug!(
            "Downloaded full message content for IMAP UID {} ({} bytes)",
            uid,
            content.size()
        );
        self.cached = Some((uid, Arc::clone(&content)));
        Ok(content)
    }

    pub fn cached_uid(&self) -> Option<Uid> {
        self.cached.as_ref().map(|&(uid, _)| uid)
    }

    pub fn clear_cache(&mut self) {
        self.cached = None;
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
pub(crate) fn test_message(permanent_id: &str, uid: u32) -> Message {
    Message {
        href: format!("/exchange/jdoe/Inbox/{}.EML", permanent_id),
        change_key: None,
        permanent_id: permanent_id.to_owned(),
        uid: Uid::u(uid),
        exchange_uid: None,
        content_class: None,
        size: 100,
        date: None,
        last_modified: None,
        flags: MessageFlags::empty(),
        keywords: None,
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn flags_from_properties() {
        let message = Message::from_properties(
            "/exchange/jdoe/Inbox/a.EML".to_owned(),
            None,
            &props(&[
                ("imapUid", "42"),
                ("permanenturl", "/exchange/jdoe/-FlatUrlSpace-/a"),
                ("messageSize", "1234"),
                ("read", "0"),
                ("junk", "1"),
                ("flagStatus", "2"),
                ("messageFlags", "9"),
                ("lastVerbExecuted", "103"),
                ("date", "2020-01-01T00:00:00Z"),
                ("lastmodified", "2020-01-01T00:00:00Z"),
                ("keywords", "Important,Custom"),
            ]),
        )
        .unwrap();

        assert_eq!(Uid::u(42), message.uid);
        assert_eq!("/exchange/jdoe/-FlatUrlSpace-/a", message.permanent_id);
        assert_eq!(1234, message.size);
        assert_eq!(
            MessageFlags::JUNK
                | MessageFlags::FLAGGED
                | MessageFlags::DRAFT
                | MessageFlags::ANSWERED
                | MessageFlags::RECENT,
            message.flags
        );
        assert_eq!(
            "\\Recent \\Flagged Junk \\Draft \\Answered $label1 Custom",
            message.imap_flags(&FlagMap::default())
        );
    }

    #[test]
    fn ews_style_booleans_and_no_recent_when_read() {
        let message = Message::from_properties(
            "AAMkAD=".to_owned(),
            Some("CQAAAB".to_owned()),
            &props(&[
                ("imapUid", "7"),
                ("read", "true"),
                ("deleted", "1"),
                ("lastVerbExecuted", "104"),
                ("date", "x"),
                ("lastmodified", "x"),
            ]),
        )
        .unwrap();
        assert_eq!("AAMkAD=", message.permanent_id);
        assert_eq!(
            "\\Seen \\Deleted $Forwarded",
            message.imap_flags(&FlagMap::default())
        );
    }

    #[test]
    fn missing_uid_is_rejected() {
        assert_matches!(
            Err(Error::ServerError(..)),
            Message::from_properties("x".to_owned(), None, &props(&[]))
        );
        assert_matches!(
            Err(Error::ServerError(..)),
            Message::from_properties(
                "x".to_owned(),
                None,
                &props(&[("imapUid", "0")])
            )
        );
    }

    #[test]
    fn keyword_operations() {
        let map = FlagMap::default();
        let mut message = test_message("a", 1);

        assert_eq!("Important", message.add_flag("$label1", &map));
        assert_eq!("Important,Work", message.add_flag("$label2", &map));
        assert_eq!("Important,Work", message.add_flag("$label2", &map));
        assert_eq!("Important", message.remove_flag("$label2", &map));
        assert_eq!("", message.remove_flag("$label1", &map));
        assert_eq!(None, message.keywords);

        assert_eq!(
            "Personal,Mine",
            message.set_flags(vec!["$label3", "Mine", "mine"], &map)
        );
    }

    #[test]
    fn header_split_and_envelope_workaround() {
        let content = MessageContent::parse(
            b"Subject: Hello\r\n  World\r\nFrom: a@b\r\n\r\nBody\r\n".to_vec(),
        );
        assert_eq!(Some("Hello World".to_owned()), content.header("subject"));
        assert_eq!(b"Body\r\n", content.body());

        let wrapped = MessageContent::parse(
            b"MAIL FROM: <a@b>\nRCPT TO: <c@d>\n\nSubject: Inner\n\nText"
                .to_vec(),
        );
        assert_eq!(Some("Inner".to_owned()), wrapped.header("Subject"));
        assert_eq!(b"Subject: Inner\n\nText", wrapped.raw());
        assert_eq!(b"Text", wrapped.body());
    }

    #[test]
    fn single_message_content_cache() {
        let mut list = MessageList::new(vec![
            test_message("b", 11),
            test_message("a", 10),
        ]);
        assert_eq!(Some(Uid::u(10)), list.get(0).map(|m| m.uid));

        let loads = Cell::new(0);
        let loader = |m: &Message| {
            loads.set(loads.get() + 1);
            Ok::<_, Error>(
                format!("Subject: {}\r\n\r\n", m.permanent_id).into_bytes(),
            )
        };

        let a = list.content(Uid::u(10), loader).unwrap();
        assert_eq!(Some("a".to_owned()), a.header("Subject"));
        list.content(Uid::u(10), loader).unwrap();
        assert_eq!(1, loads.get());

        let b = list.content(Uid::u(11), loader).unwrap();
        assert_eq!(Some("b".to_owned()), b.header("Subject"));
        assert_eq!(2, loads.get());
        assert_eq!(Some(Uid::u(11)), list.cached_uid());

        // A was evicted
        list.content(Uid::u(10), loader).unwrap();
        assert_eq!(3, loads.get());

        assert_matches!(
            Err(Error::NotFound(..)),
            list.content(Uid::u(99), loader)
        );
        list.clear_cache();
        assert_eq!(None, list.cached_uid());
    }
}
