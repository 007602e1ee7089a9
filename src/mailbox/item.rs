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

use super::Properties;
use crate::condition::Record;
use crate::support::error::Error;

/// Location and version of a non-mail item (contact, event, task).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Item {
    pub folder_path: String,
    /// The item's file name within the folder, e.g. `abc.EML`.
    pub name: String,
    pub etag: Option<String>,
    pub permanent_url: Option<String>,
}

impl Item {
    pub fn new(folder_path: impl Into<String>, name: impl Into<String>) -> Self {
        Item {
            folder_path: folder_path.into(),
            name: name.into(),
            ..Item::default()
        }
    }

    /// Split an absolute item href into folder and name.
    pub fn from_href(href: &str) -> Result<Self, Error> {
        match href.rfind('/') {
            Some(ix) => Ok(Item::new(&href[..ix], &href[ix + 1..])),
            None => Err(Error::ServerError(format!("Bad item href {}", href))),
        }
    }

    pub fn href(&self) -> String {
        format!("{}/{}", self.folder_path, self.name)
    }
}

/// Replace the extension of `name` (the part after the last dot, which must
/// be `from`) with `to`.
fn swap_extension(name: &str, from: &str, to: &str) -> String {
    match name.strip_suffix(from) {
        Some(stem) if stem.ends_with('.') => format!("{}{}", stem, to),
        _ => name.to_owned(),
    }
}

/// A contact; the vCard encoding lives with the CardDAV front-end.
#[derive(Clone, Debug, Default)]
pub struct Contact {
    pub item: Item,
    pub properties: Properties,
}

impl Contact {
    /// Exchange stores contacts as `.EML`; clients know them as `.vcf`.
    pub fn new(item: Item, properties: Properties) -> Self {
        let name = swap_extension(&item.name, "vcf", "EML");
        Contact {
            item: Item { name, ..item },
            properties,
        }
    }

    /// The name as presented to clients.
    pub fn name(&self) -> String {
        swap_extension(&self.item.name, "EML", "vcf")
    }

    /// The contact's vCard UID: the client-facing name without extension.
    pub fn uid(&self) -> String {
        let name = self.name();
        match name.rfind('.') {
            Some(ix) if ix > 0 => name[..ix].to_owned(),
            _ => name,
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.properties.get(field).map(String::as_str)
    }
}

impl Record for Contact {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

/// A calendar event or task, with the iCalendar body passed through
/// unparsed.
#[derive(Clone, Debug, Default)]
pub struct Event {
    pub item: Item,
    pub content_class: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl Event {
    pub fn new(item: Item, properties: &Properties) -> Self {
        let content_class = properties.get("contentclass").cloned();
        let mut item = item;
        if properties
            .get("outlookmessageclass")
            .map_or(false, |c| c.starts_with("IPM.Task"))
        {
            item.name = swap_extension(&item.name, "ics", "EML");
        }
        Event {
            item,
            content_class,
            subject: properties.get("subject").cloned(),
            body: None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        "text/calendar;charset=UTF-8"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn item_href() {
        let item = Item::from_href("/exchange/jdoe/Calendar/abc.EML").unwrap();
        assert_eq!("/exchange/jdoe/Calendar", item.folder_path);
        assert_eq!("abc.EML", item.name);
        assert_eq!("/exchange/jdoe/Calendar/abc.EML", item.href());
        assert_matches!(Err(Error::ServerError(..)), Item::from_href("abc"));
    }

    #[test]
    fn contact_names() {
        let contact = Contact::new(
            Item::new("/exchange/jdoe/Contacts", "jane.vcf"),
            Properties::new(),
        );
        assert_eq!("jane.EML", contact.item.name);
        assert_eq!("jane.vcf", contact.name());
        assert_eq!("jane", contact.uid());

        let contact = Contact::new(
            Item::new("/exchange/jdoe/Contacts", "odd.vcfx"),
            Properties::new(),
        );
        assert_eq!("odd.vcfx", contact.name());
    }

    #[test]
    fn task_names() {
        let mut props = Properties::new();
        props.insert("outlookmessageclass".to_owned(), "IPM.Task".to_owned());
        let task = Event::new(Item::new("/tasks", "t.ics"), &props);
        assert_eq!("t.EML", task.item.name);

        let event = Event::new(Item::new("/cal", "e.ics"), &Properties::new());
        assert_eq!("e.ics", event.item.name);
    }
}
