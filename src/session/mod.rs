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

//! The per-connection session.
//!
//! A `Session` owns exactly one authenticated `Backend` and layers the
//! operations protocol front-ends need on top of it: folder listing and
//! refresh, message listing with stable UIDs, content download with
//! failover, contacts, calendar events and directory search.

pub mod dav;
pub mod discovery;
pub mod ews;
pub mod gal;
pub mod paths;
pub mod xml;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::prelude::*;
use chrono::Duration;
use log::{debug, info, warn};

use self::dav::DavBackend;
use self::ews::EwsBackend;
use crate::auth::{self, Authenticated, LoginIdentity, OtpPrompt};
use crate::condition::{CompareOp, Condition};
use crate::mailbox::message::{
    IMAP_MESSAGE_ATTRIBUTES, POP_MESSAGE_ATTRIBUTES, UID_MESSAGE_ATTRIBUTES,
};
use crate::mailbox::{
    Contact, Event, FlagMap, Folder, Item, Message, MessageContent,
    MessageList, Properties, Uid,
};
use crate::support::error::Error;
use crate::support::interrupt::Interrupt;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::{BackendMode, GatewayConfig, Settings};
use crate::transport::client::HttpClient;
use crate::transport::http::UreqTransport;

/// The server generation, which decides a few query dialect details.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerVersion {
    Exchange2003,
    Exchange2007,
    Exchange2010,
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ServerVersion::Exchange2003 => "Exchange2003",
            ServerVersion::Exchange2007 => "Exchange2007",
            ServerVersion::Exchange2010 => "Exchange2010",
        })
    }
}

/// Who is logged in and where their mailbox lives.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub identity: LoginIdentity,
    pub email: String,
    pub alias: String,
    pub version: ServerVersion,
    /// Server path of the user's mailbox, with a trailing slash.
    pub mail_path: String,
    /// Server path under which all mailboxes live, with a trailing slash.
    pub root_path: String,
}

/// A raw search result: where the item lives and the requested properties
/// keyed by logical field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemRecord {
    /// The item URL (WebDAV) or item id (EWS).
    pub href: String,
    pub change_key: Option<String>,
    pub properties: Properties,
}

impl ItemRecord {
    /// The item's name within its folder: `urlcompname` if the server
    /// reported it, else the last segment of the href.
    pub fn name(&self) -> String {
        match self.properties.get("urlcompname") {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self
                .href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_owned(),
        }
    }

    fn into_item(self, folder_path: &str) -> (Item, Properties) {
        let item = Item {
            folder_path: folder_path.to_owned(),
            name: self.name(),
            etag: self.properties.get("etag").cloned(),
            permanent_url: self.properties.get("permanenturl").cloned(),
        };
        (item, self.properties)
    }
}

/// The capabilities one backend protocol provides.
///
/// Paths are the logical folder paths of `paths`. Attributes and
/// conditions use logical field names; attributes the backend has no
/// mapping for are silently not returned, while unknown fields in a
/// condition are an `InvalidQuery`.
pub trait Backend {
    fn info(&self) -> &SessionInfo;
    fn interrupt(&self) -> &Interrupt;
    fn log_prefix(&self) -> &LogPrefix;

    fn get_folder(&mut self, path: &str) -> Result<Folder, Error>;

    /// List the folders below `path` matching `condition`.
    fn find_folders(
        &mut self,
        path: &str,
        condition: &Condition,
        recursive: bool,
    ) -> Result<Vec<Folder>, Error>;

    /// Search the non-folder items directly inside `path`, greatest
    /// `imapUid` first. `max` of 0 means unlimited.
    fn search_items(
        &mut self,
        path: &str,
        attributes: &[&str],
        condition: &Condition,
        max: u32,
    ) -> Result<Vec<ItemRecord>, Error>;

    /// Fetch the item called `name` in `path` directly.
    fn get_item(
        &mut self,
        path: &str,
        name: &str,
        attributes: &[&str],
    ) -> Result<ItemRecord, Error>;

    /// Download the raw MIME content of the item at `href`.
    fn get_content(&mut self, href: &str) -> Result<Vec<u8>, Error>;

    fn get_properties(
        &mut self,
        href: &str,
        attributes: &[&str],
    ) -> Result<Properties, Error>;

    fn delete_item(&mut self, href: &str) -> Result<(), Error>;

    /// Look up directory entries by a single field comparison.
    fn gal_lookup(
        &mut self,
        field: &str,
        op: CompareOp,
        value: &str,
    ) -> Result<Vec<Contact>, Error>;

    /// Render `date` the way date comparisons in conditions expect it.
    fn format_search_date(&self, date: DateTime<Utc>) -> String;
}

pub const FOLDER_ATTRIBUTES: &[&str] = &[
    "displayname",
    "folderclass",
    "hassubs",
    "nosubs",
    "count",
    "unreadcount",
    "ctag",
    "lastmodified",
    "uidNext",
];

pub const CONTACT_ATTRIBUTES: &[&str] = &[
    "imapUid",
    "etag",
    "urlcompname",
    "permanenturl",
    "cn",
    "givenName",
    "sn",
    "smtpemail1",
    "title",
    "o",
    "department",
    "l",
];

pub const EVENT_ATTRIBUTES: &[&str] = &[
    "permanenturl",
    "urlcompname",
    "etag",
    "contentclass",
    "subject",
    "outlookmessageclass",
];

/// Properties used to rebuild a message whose MIME content is gone.
const CONTENT_ATTRIBUTES: &[&str] = &[
    "contentclass",
    "date",
    "from",
    "to",
    "cc",
    "subject",
    "htmldescription",
    "textdescription",
];

const CALENDAR_MESSAGE_CLASS: &str = "urn:content-classes:calendarmessage";
/// `Date:` header format of rebuilt messages, with a two-digit day.
const RFC822_DATE: &str = "%a, %d %b %Y %H:%M:%S %z";

pub struct Session {
    backend: Box<dyn Backend>,
    settings: Settings,
    flag_map: FlagMap,
}

impl Session {
    /// Log in to the server configured in `config` and connect to whichever
    /// backend it offers.
    pub fn open(
        config: &GatewayConfig,
        login: &str,
        password: &str,
        prompt: &mut dyn OtpPrompt,
    ) -> Result<Self, Error> {
        let log_prefix = LogPrefix::new("exgate".to_owned());
        let transport = UreqTransport::new(&config.http);
        let mut client = HttpClient::new(
            Box::new(transport),
            &config.exchange.url,
            config.http.user_agent.clone(),
            log_prefix,
        )?;

        let authenticated = auth::authenticate(
            &mut client,
            &config.exchange.url,
            LoginIdentity::parse(login),
            password,
            prompt,
        )?;
        let backend =
            select_backend(config.exchange.mode, client, &authenticated)?;
        Ok(Session::new(backend, config))
    }

    pub fn new(backend: Box<dyn Backend>, config: &GatewayConfig) -> Self {
        Session {
            backend,
            settings: config.settings.clone(),
            flag_map: FlagMap::new(config.imap_flags.clone()),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        self.backend.info()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn flag_map(&self) -> &FlagMap {
        &self.flag_map
    }

    /// A handle the front-end can raise to abort the current multi-page
    /// operation.
    pub fn interrupt(&self) -> Interrupt {
        self.backend.interrupt().clone()
    }

    /// Whether the server no longer accepts this session.
    ///
    /// Connectivity problems are reported as errors rather than expiry,
    /// since the session may well still be valid once the network is back.
    pub fn is_expired(&mut self) -> Result<bool, Error> {
        match self.backend.get_folder("") {
            Ok(_) => Ok(false),
            Err(e) if e.is_connectivity() => Err(e),
            Err(e) => {
                info!(
                    "{} Session expired: {}",
                    self.backend.log_prefix(),
                    e
                );
                Ok(true)
            }
        }
    }

    pub fn is_shared_folder(&self, path: &str) -> bool {
        paths::is_shared(path, self.info())
    }

    pub fn is_main_calendar(&self, path: &str) -> bool {
        paths::is_main_calendar(path, self.info())
    }

    /// Fetch the current properties of the folder at `path`.
    ///
    /// The main calendar also shows tasks, so its content tag covers the
    /// tasks folder too.
    pub fn get_folder(&mut self, path: &str) -> Result<Folder, Error> {
        let mut folder = self.backend.get_folder(path)?;
        if self.is_main_calendar(path) && !self.settings.disable_tasks {
            let tasks = self.backend.get_folder("tasks")?;
            if let Some(task_ctag) = tasks.ctag {
                folder.ctag =
                    Some(format!("{}{}", folder.ctag.unwrap_or_default(), task_ctag));
            }
        }
        Ok(folder)
    }

    /// Bring `folder` up to date, reloading its messages if the server
    /// reports a different content tag.
    ///
    /// Returns whether anything changed.
    pub fn refresh_folder(&mut self, folder: &mut Folder) -> Result<bool, Error> {
        let fetched = self.get_folder(&folder.path)?;
        if !folder.apply_refresh(&fetched) {
            debug!(
                "{} Folder {} unchanged, ctag: {:?}",
                self.backend.log_prefix(),
                folder.path,
                folder.ctag
            );
            return Ok(false);
        }

        self.load_messages(folder)?;
        Ok(true)
    }

    /// Replace the message listing of `folder` with a fresh one.
    pub fn load_messages(&mut self, folder: &mut Folder) -> Result<(), Error> {
        let messages = self.search_messages(&folder.path, &Condition::empty())?;
        folder.install_messages(messages);
        Ok(())
    }

    /// List the folders below `path`.
    ///
    /// Unless configured otherwise, only mail folders are listed. A
    /// recursive listing of anything but the root includes `path` itself.
    pub fn get_sub_folders(
        &mut self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<Folder>, Error> {
        let condition = if self.settings.include_special_folders {
            Condition::empty()
        } else {
            Condition::or(vec![
                Condition::equals("folderclass", "IPF.Note"),
                Condition::is_null("folderclass"),
            ])
        };

        let mut folders =
            self.backend.find_folders(path, &condition, recursive)?;
        if recursive && !path.is_empty() {
            folders.push(self.get_folder(path)?);
        }
        Ok(folders)
    }

    pub fn get_sub_calendar_folders(
        &mut self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<Folder>, Error> {
        self.backend.find_folders(
            path,
            &Condition::equals("folderclass", "IPF.Appointment"),
            recursive,
        )
    }

    fn messages_from(&self, records: Vec<ItemRecord>) -> Vec<Message> {
        let log_prefix = self.backend.log_prefix();
        records
            .into_iter()
            .filter_map(|record| {
                match Message::from_properties(
                    record.href,
                    record.change_key,
                    &record.properties,
                ) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!("{} Skipping message: {}", log_prefix, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// List the messages in `path` matching `condition`, sorted by UID.
    ///
    /// At most `folder_size_limit` messages (the newest) are returned. UIDs
    /// are as reported by the server; see `search_folder`.
    pub fn search_messages(
        &mut self,
        path: &str,
        condition: &Condition,
    ) -> Result<MessageList, Error> {
        let records = self.backend.search_items(
            path,
            IMAP_MESSAGE_ATTRIBUTES,
            condition,
            self.settings.folder_size_limit,
        )?;
        Ok(MessageList::new(self.messages_from(records)))
    }

    /// Search within a loaded folder, restoring UIDs through its UID map.
    pub fn search_folder(
        &mut self,
        folder: &mut Folder,
        condition: &Condition,
    ) -> Result<MessageList, Error> {
        let mut messages = self.search_messages(&folder.path, condition)?;
        folder.fix_uids(&mut messages);
        Ok(messages)
    }

    /// The lightweight listing POP3 needs: every message with its size.
    pub fn search_pop_messages(
        &mut self,
        path: &str,
    ) -> Result<MessageList, Error> {
        let records = self.backend.search_items(
            path,
            POP_MESSAGE_ATTRIBUTES,
            &Condition::empty(),
            0,
        )?;
        Ok(MessageList::new(self.messages_from(records)))
    }

    /// The Exchange uids of every message in `path`.
    pub fn list_message_uids(&mut self, path: &str) -> Result<Vec<String>, Error> {
        let records = self.backend.search_items(
            path,
            UID_MESSAGE_ATTRIBUTES,
            &Condition::empty(),
            0,
        )?;
        Ok(records
            .into_iter()
            .filter_map(|mut r| r.properties.remove("uid"))
            .collect())
    }

    /// The parsed content of the message with `uid` in the loaded listing
    /// of `folder`.
    ///
    /// Only the most recently requested message stays cached.
    pub fn message_content(
        &mut self,
        folder: &mut Folder,
        uid: Uid,
    ) -> Result<Arc<MessageContent>, Error> {
        let path = folder.path.clone();
        let messages = folder.messages.as_mut().ok_or_else(|| {
            Error::NotFound(format!("{} has no message listing", path))
        })?;

        let backend = &mut *self.backend;
        let settings = &self.settings;
        messages.content(uid, |message| load_content(backend, settings, message))
    }

    pub fn delete_message(&mut self, message: &Message) -> Result<(), Error> {
        debug!(
            "{} Deleting message {}",
            self.backend.log_prefix(),
            message.href
        );
        self.backend.delete_item(&message.href)
    }

    /// Delete messages in Trash and Sent which have not been touched for
    /// longer than the configured keep delays.
    ///
    /// Returns the number of messages deleted.
    pub fn purge_oldest_trash_and_sent_messages(&mut self) -> Result<usize, Error> {
        let mut purged = 0;
        for &(path, delay) in &[
            ("Trash", self.settings.keep_delay),
            ("Sent", self.settings.sent_keep_delay),
        ] {
            if 0 == delay {
                continue;
            }

            let cutoff = Utc::now() - Duration::days(i64::from(delay));
            let condition = Condition::lt(
                "lastmodified",
                &self.backend.format_search_date(cutoff),
            );
            let records =
                self.backend
                    .search_items(path, UID_MESSAGE_ATTRIBUTES, &condition, 0)?;
            if !records.is_empty() {
                info!(
                    "{} Purging {} messages older than {} days from {}",
                    self.backend.log_prefix(),
                    records.len(),
                    delay,
                    path
                );
            }
            for record in records {
                self.backend.delete_item(&record.href)?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Search the contacts in `path`.
    pub fn search_contacts(
        &mut self,
        path: &str,
        attributes: &[&str],
        condition: &Condition,
        max: u32,
    ) -> Result<Vec<Contact>, Error> {
        let condition = Condition::and(vec![
            Condition::equals("outlookmessageclass", "IPM.Contact"),
            condition.clone(),
        ]);
        let records =
            self.backend.search_items(path, attributes, &condition, max)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let (item, properties) = record.into_item(path);
                Contact::new(item, properties)
            })
            .collect())
    }

    pub fn get_all_contacts(&mut self, path: &str) -> Result<Vec<Contact>, Error> {
        self.search_contacts(path, CONTACT_ATTRIBUTES, &Condition::empty(), 0)
    }

    /// `gt(field, now - caldav_past_delay)`, or nothing if the delay is 0.
    pub fn past_delay_condition(&self, field: &str) -> Condition {
        let delay = self.settings.caldav_past_delay;
        if 0 == delay {
            return Condition::empty();
        }

        let cutoff = Utc::now() - Duration::days(i64::from(delay));
        Condition::gt(field, &self.backend.format_search_date(cutoff))
    }

    /// Calendar items: single appointments, plus recurring masters within
    /// `date_condition`.
    pub fn calendar_item_condition(&self, date_condition: Condition) -> Condition {
        let occurrences = Condition::or(vec![
            Condition::equals_int("instancetype", 1),
            Condition::and(vec![
                Condition::equals_int("instancetype", 0),
                date_condition,
            ]),
        ]);

        if self.settings.enable_legacy_tasks {
            Condition::or(vec![Condition::is_null("instancetype"), occurrences])
        } else {
            Condition::and(vec![
                Condition::equals("outlookmessageclass", "IPM.Appointment"),
                occurrences,
            ])
        }
    }

    /// The condition for events overlapping the range given by two
    /// iCalendar UTC timestamps (`20200131T120000Z`), either of which may be
    /// absent.
    pub fn range_condition(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Condition, Error> {
        let mut parts = Vec::new();
        if let Some(start) = start {
            parts.push(Condition::gt(
                "dtend",
                &self.backend.format_search_date(parse_zulu(start)?),
            ));
        }
        if let Some(end) = end {
            parts.push(Condition::lt(
                "dtstart",
                &self.backend.format_search_date(parse_zulu(end)?),
            ));
        }
        Ok(Condition::and(parts))
    }

    /// Search events in `path`, hiding private ones in shared calendars if
    /// so configured.
    pub fn search_events(
        &mut self,
        path: &str,
        attributes: &[&str],
        condition: Condition,
    ) -> Result<Vec<Event>, Error> {
        let condition = if self.settings.exclude_private_events
            && self.is_shared_folder(path)
        {
            Condition::and(vec![
                condition,
                Condition::equals_int("sensitivity", 0),
            ])
        } else {
            condition
        };

        let records =
            self.backend.search_items(path, attributes, &condition, 0)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let (item, properties) = record.into_item(path);
                Event::new(item, &properties)
            })
            .collect())
    }

    /// Tasks in `path` which are not completed, or were completed within
    /// the past delay.
    pub fn search_tasks_only(&mut self, path: &str) -> Result<Vec<Event>, Error> {
        let condition = Condition::and(vec![
            Condition::equals("outlookmessageclass", "IPM.Task"),
            Condition::or(vec![
                Condition::is_null("datecompleted"),
                self.past_delay_condition("datecompleted"),
            ]),
        ]);
        self.search_events(path, EVENT_ATTRIBUTES, condition)
    }

    /// Every event in `path` within the past delay. The main calendar also
    /// lists tasks unless they are disabled.
    pub fn get_all_events(&mut self, path: &str) -> Result<Vec<Event>, Error> {
        let condition =
            self.calendar_item_condition(self.past_delay_condition("dtstart"));
        let mut events = self.search_events(path, EVENT_ATTRIBUTES, condition)?;

        if !self.settings.disable_tasks && self.is_main_calendar(path) {
            events.extend(self.search_tasks_only("tasks")?);
        }
        Ok(events)
    }

    /// Events in `path` overlapping the given time range.
    pub fn search_events_in_range(
        &mut self,
        path: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Event>, Error> {
        let range = self.range_condition(start, end)?;
        let condition = self.calendar_item_condition(range);
        self.search_events(path, EVENT_ATTRIBUTES, condition)
    }

    /// Meeting requests and responses in `path` not yet processed.
    pub fn get_event_messages(&mut self, path: &str) -> Result<Vec<Event>, Error> {
        let condition = Condition::and(vec![
            Condition::equals("contentclass", CALENDAR_MESSAGE_CLASS),
            Condition::or(vec![
                Condition::is_null("processed"),
                Condition::is_false("processed"),
            ]),
        ]);
        let records =
            self.backend.search_items(path, EVENT_ATTRIBUTES, &condition, 0)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let (item, properties) = record.into_item(path);
                Event::new(item, &properties)
            })
            .collect())
    }

    /// Find the event or task called `name` in `path`.
    ///
    /// The item is fetched directly first. If that fails with `NotFound`, it
    /// is searched by its URL component name, and failing that by scanning
    /// every event in the folder.
    pub fn get_item(&mut self, path: &str, name: &str) -> Result<Event, Error> {
        let eml_name = to_eml_name(name);
        match self.backend.get_item(path, &eml_name, EVENT_ATTRIBUTES) {
            Ok(record) => {
                let (item, properties) = record.into_item(path);
                return Ok(Event::new(item, &properties));
            }
            Err(e) if e.is_not_found() => debug!(
                "{} {}/{} not found, searching by name",
                self.backend.log_prefix(),
                path,
                eml_name
            ),
            Err(e) => return Err(e),
        }

        let by_name = Condition::equals("urlcompname", &eml_name);
        let mut found = self.search_events(path, EVENT_ATTRIBUTES, by_name.clone())?;
        if found.is_empty()
            && !self.settings.disable_tasks
            && self.is_main_calendar(path)
        {
            found = self.search_events("tasks", EVENT_ATTRIBUTES, by_name)?;
        }
        if let Some(event) = found.into_iter().next() {
            return Ok(event);
        }

        debug!(
            "{} {}/{} not found by name, scanning all events",
            self.backend.log_prefix(),
            path,
            eml_name
        );
        self.get_all_events(path)?
            .into_iter()
            .find(|event| event.item.name == name || event.item.name == eml_name)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", path, name)))
    }

    /// Search the directory, keyed by lower-case contact name.
    pub fn gal_find(
        &mut self,
        condition: &Condition,
        size_limit: usize,
    ) -> Result<BTreeMap<String, Contact>, Error> {
        let interrupt = self.interrupt();
        let backend = &mut *self.backend;
        gal::gal_find(
            condition,
            size_limit,
            &interrupt,
            &mut |field: &str, op: CompareOp, value: &str| {
                backend.gal_lookup(field, op, value)
            },
        )
    }
}

/// Choose and connect the backend after a successful login.
///
/// In `Auto` mode the WebDAV backend is tried first; any failure other
/// than one which would equally doom EWS falls back to EWS.
pub fn select_backend(
    mode: BackendMode,
    mut client: HttpClient,
    authenticated: &Authenticated,
) -> Result<Box<dyn Backend>, Error> {
    let backend: Box<dyn Backend> = match mode {
        BackendMode::Dav => {
            let setup = DavBackend::detect(&mut client, authenticated)?;
            Box::new(DavBackend::new(client, setup))
        }
        BackendMode::Ews => Box::new(EwsBackend::connect(client, authenticated)?),
        BackendMode::Auto => match DavBackend::detect(&mut client, authenticated) {
            Ok(setup) => Box::new(DavBackend::new(client, setup)),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                info!(
                    "{} WebDAV not available ({}), trying EWS",
                    client.log_prefix(),
                    e
                );
                Box::new(EwsBackend::connect(client, authenticated)?)
            }
        },
    };

    let info = backend.info();
    backend.log_prefix().set_server(info.version.to_string());
    info!(
        "{} Connected to mailbox {} <{}> at {}",
        backend.log_prefix(),
        info.alias,
        info.email,
        info.mail_path
    );
    Ok(backend)
}

fn is_fatal(e: &Error) -> bool {
    e.is_connectivity()
        || matches!(
            *e,
            Error::AuthenticationFailed(..)
                | Error::Configuration(..)
                | Error::Interrupted
        )
}

/// Exchange stores contacts as `.EML` items.
fn to_eml_name(name: &str) -> String {
    match name.strip_suffix(".vcf") {
        Some(stem) => format!("{}.EML", stem),
        None => name.to_owned(),
    }
}

/// Parse an iCalendar UTC timestamp such as `20200131T120000Z`.
fn parse_zulu(value: &str) -> Result<DateTime<Utc>, Error> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
        .map(|naive| DateTime::<Utc>::from_utc(naive, Utc))
        .map_err(|e| {
            Error::InvalidQuery(format!("Bad timestamp {:?}: {}", value, e))
        })
}

/// Download a message, falling back to its permanent URL and then to a
/// reconstruction from its properties.
///
/// If all of that fails and `delete_broken` is set, the message is deleted
/// from the server; the original error is still returned.
fn load_content(
    backend: &mut dyn Backend,
    settings: &Settings,
    message: &Message,
) -> Result<Vec<u8>, Error> {
    let error = match backend.get_content(&message.href) {
        Ok(content) => return Ok(content),
        Err(e) if e.is_not_found() && message.permanent_id != message.href => {
            debug!(
                "{} {} not found, trying permanent URL {}",
                backend.log_prefix(),
                message.href,
                message.permanent_id
            );
            match backend.get_content(&message.permanent_id) {
                Ok(content) => return Ok(content),
                Err(e) => e,
            }
        }
        Err(e) => e,
    };

    if error.is_connectivity() || matches!(error, Error::Interrupted) {
        return Err(error);
    }

    warn!(
        "{} Unable to load content of {} ({}), rebuilding from properties",
        backend.log_prefix(),
        message.href,
        error
    );
    match backend.get_properties(&message.href, CONTENT_ATTRIBUTES) {
        Ok(properties) => {
            if let Some(content) = rebuild_content(&properties) {
                return Ok(content);
            }
        }
        Err(e) => warn!(
            "{} Unable to rebuild {}: {}",
            backend.log_prefix(),
            message.href,
            e
        ),
    }

    if settings.delete_broken {
        warn!(
            "{} Deleting broken message {}",
            backend.log_prefix(),
            message.href
        );
        if let Err(e) = backend.delete_item(&message.href) {
            warn!(
                "{} Unable to delete broken message {}: {}",
                backend.log_prefix(),
                message.href,
                e
            );
        }
    }

    Err(error)
}

/// Build a minimal RFC 822 message from individual properties, or `None`
/// if there is nothing to build it from.
fn rebuild_content(properties: &Properties) -> Option<Vec<u8>> {
    let get = |name: &str| {
        properties
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    };

    let (content_type, body) = match (get("htmldescription"), get("textdescription")) {
        (Some(html), _) => ("text/html", html),
        (None, Some(text)) => ("text/plain", text),
        (None, None) => ("text/plain", ""),
    };
    if body.is_empty() && get("subject").is_none() {
        return None;
    }

    let mut out = String::new();
    if let Some(class) = get("contentclass") {
        out.push_str(&format!("Content-class: {}\r\n", class));
    }
    if let Some(date) = get("date") {
        let date = DateTime::parse_from_rfc3339(date)
            .map(|d| d.format(RFC822_DATE).to_string())
            .unwrap_or_else(|_| date.to_owned());
        out.push_str(&format!("Date: {}\r\n", date));
    }
    for &(field, header) in &[
        ("from", "From"),
        ("to", "To"),
        ("cc", "Cc"),
        ("subject", "Subject"),
    ] {
        if let Some(value) = get(field) {
            out.push_str(&format!("{}: {}\r\n", header, value));
        }
    }
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str(&format!(
        "Content-Type: {}; charset=UTF-8\r\n\r\n",
        content_type
    ));
    out.push_str(body);
    Some(out.into_bytes())
}

#[cfg(test)]
pub(crate) fn test_info() -> SessionInfo {
    SessionInfo {
        identity: LoginIdentity::parse("jdoe"),
        email: "jdoe@example.com".to_owned(),
        alias: "jdoe".to_owned(),
        version: ServerVersion::Exchange2007,
        mail_path: "/exchange/jdoe/".to_owned(),
        root_path: "/exchange/".to_owned(),
    }
}
