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

//! Mapping from logical field names to backend locators.
//!
//! Conditions and sessions only ever speak of logical names (`imapUid`,
//! `folderclass`, `cn`, ...). Each backend has its own registry saying where
//! that field lives and whether its values are numeric.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// For the DAV backend, the property URI. For EWS, the rendered field
    /// path element.
    pub locator: String,
    pub kind: ValueKind,
    /// DAV only: the SQL type literals of this field must be cast to.
    pub cast: Option<String>,
    /// The key under which the parsed response carries this field's value.
    pub response_name: String,
}

impl FieldDef {
    pub fn new(locator: &str, kind: ValueKind) -> Self {
        FieldDef {
            locator: locator.to_owned(),
            kind,
            cast: None,
            response_name: locator.to_owned(),
        }
    }

    pub fn string(locator: &str) -> Self {
        FieldDef::new(locator, ValueKind::String)
    }

    pub fn int(locator: &str) -> Self {
        FieldDef::new(locator, ValueKind::Int)
    }

    pub fn cast(mut self, cast: &str) -> Self {
        self.cast = Some(cast.to_owned());
        self
    }

    pub fn is_int(&self) -> bool {
        ValueKind::Int == self.kind
    }

    /// Split a DAV property URI into XML namespace and local name.
    pub fn dav_name(&self) -> (&str, &str) {
        let split = self
            .locator
            .rfind(|c: char| ':' == c || '/' == c || '#' == c)
            .map_or(0, |ix| ix + 1);
        self.locator.split_at(split)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldRegistry {
    fields: HashMap<String, FieldDef>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, def: FieldDef) -> Self {
        self.fields.insert(name.to_owned(), def);
        self
    }

    pub fn get(&self, name: &str) -> Result<&FieldDef, Error> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::InvalidQuery(format!("Unknown field {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The registry for the WebDAV/SQL backend.
    pub fn dav() -> &'static FieldRegistry {
        &DAV_FIELDS
    }

    /// The registry for the EWS/SOAP backend.
    pub fn ews() -> &'static FieldRegistry {
        &EWS_FIELDS
    }
}

const DATE_CAST: &str = "dateTime.tz";
const MAPI_TAG: &str = "http://schemas.microsoft.com/mapi/proptag/";

fn mapi_int(tag: &str) -> FieldDef {
    FieldDef::int(&format!("{}{}", MAPI_TAG, tag))
}

fn mapi_string(tag: &str) -> FieldDef {
    FieldDef::string(&format!("{}{}", MAPI_TAG, tag))
}

lazy_static! {
    static ref DAV_FIELDS: FieldRegistry = FieldRegistry::new()
        // Folders
        .with("displayname", FieldDef::string("DAV:displayname"))
        .with(
            "folderclass",
            FieldDef::string(
                "http://schemas.microsoft.com/exchange/outlookfolderclass",
            ),
        )
        .with("hassubs", FieldDef::string("DAV:hassubs"))
        .with("nosubs", FieldDef::string("DAV:nosubs"))
        .with("isfolder", FieldDef::string("DAV:isfolder"))
        .with("ishidden", FieldDef::string("DAV:ishidden"))
        .with("count", mapi_int("x36020003"))
        .with(
            "unreadcount",
            FieldDef::int("urn:schemas:httpmail:unreadcount"),
        )
        .with(
            "ctag",
            FieldDef::string("http://schemas.microsoft.com/repl/contenttag"),
        )
        .with(
            "lastmodified",
            FieldDef::string("DAV:getlastmodified").cast(DATE_CAST),
        )
        .with("uidNext", mapi_int("x67510003"))
        .with("urlcompname", mapi_string("x10f3001f"))
        .with("etag", FieldDef::string("DAV:getetag"))
        // Messages
        .with(
            "permanenturl",
            FieldDef::string("http://schemas.microsoft.com/exchange/permanenturl"),
        )
        .with("uid", FieldDef::string("DAV:uid"))
        .with("imapUid", mapi_int("x0e230003"))
        .with("messageSize", mapi_int("x0e080003"))
        .with("read", FieldDef::int("urn:schemas:httpmail:read"))
        .with("junk", mapi_int("x10830003"))
        .with("flagStatus", mapi_int("x10900003"))
        .with("messageFlags", mapi_int("x0e070003"))
        .with("lastVerbExecuted", mapi_int("x10810003"))
        .with(
            "date",
            FieldDef::string("urn:schemas:httpmail:date").cast(DATE_CAST),
        )
        .with(
            "deleted",
            FieldDef::string(
                "http://schemas.microsoft.com/mapi/id/\
                 {00062008-0000-0000-C000-000000000046}/0x8570",
            ),
        )
        .with(
            "keywords",
            FieldDef::string("urn:schemas-microsoft-com:office:office#Keywords"),
        )
        .with("contentclass", FieldDef::string("DAV:contentclass"))
        .with("subject", FieldDef::string("urn:schemas:httpmail:subject"))
        .with("from", FieldDef::string("urn:schemas:httpmail:from"))
        .with("to", FieldDef::string("urn:schemas:httpmail:to"))
        .with("cc", FieldDef::string("urn:schemas:httpmail:cc"))
        .with(
            "htmldescription",
            FieldDef::string("urn:schemas:httpmail:htmldescription"),
        )
        .with(
            "textdescription",
            FieldDef::string("urn:schemas:httpmail:textdescription"),
        )
        .with(
            "outlookmessageclass",
            FieldDef::string(
                "http://schemas.microsoft.com/exchange/outlookmessageclass",
            ),
        )
        // Calendar and tasks
        .with(
            "instancetype",
            FieldDef::int("urn:schemas:calendar:instancetype"),
        )
        .with(
            "dtstart",
            FieldDef::string("urn:schemas:calendar:dtstart").cast(DATE_CAST),
        )
        .with(
            "dtend",
            FieldDef::string("urn:schemas:calendar:dtend").cast(DATE_CAST),
        )
        .with("sensitivity", mapi_int("x00360003"))
        .with("processed", mapi_string("x65e8000b"))
        .with(
            "datecompleted",
            FieldDef::string(
                "http://schemas.microsoft.com/mapi/id/\
                 {00062003-0000-0000-C000-000000000046}/0x810f",
            )
            .cast(DATE_CAST),
        )
        // Contacts
        .with("cn", FieldDef::string("urn:schemas:contacts:cn"))
        .with("givenName", FieldDef::string("urn:schemas:contacts:givenName"))
        .with("sn", FieldDef::string("urn:schemas:contacts:sn"))
        .with("smtpemail1", FieldDef::string("urn:schemas:contacts:email1"))
        .with("title", FieldDef::string("urn:schemas:contacts:title"))
        .with("o", FieldDef::string("urn:schemas:contacts:o"))
        .with(
            "department",
            FieldDef::string("urn:schemas:contacts:department"),
        )
        .with("l", FieldDef::string("urn:schemas:contacts:l"));

    static ref EWS_FIELDS: FieldRegistry = FieldRegistry::new()
        // Folders
        .with("displayname", unindexed("folder:DisplayName"))
        .with("folderclass", unindexed("folder:FolderClass"))
        .with("hassubs", tagged(0x360a, "Boolean"))
        .with("count", unindexed("folder:TotalCount").kind(ValueKind::Int))
        .with(
            "unreadcount",
            unindexed("folder:UnreadCount").kind(ValueKind::Int),
        )
        .with("ctag", tagged(0x670a, "SystemTime"))
        .with("lastmodified", tagged(0x3008, "SystemTime"))
        .with("etag", tagged(0x3008, "SystemTime"))
        .with("uidNext", tagged(0x6751, "Integer"))
        .with("urlcompname", tagged(0x10f3, "String"))
        // Messages
        .with("permanenturl", tagged(0x670e, "String"))
        .with("imapUid", tagged(0x0e23, "Integer"))
        .with("messageSize", tagged(0x0e08, "Integer"))
        .with("read", unindexed("message:IsRead"))
        .with("junk", tagged(0x1083, "Integer"))
        .with("flagStatus", tagged(0x1090, "Integer"))
        .with("messageFlags", tagged(0x0e07, "Integer"))
        .with("lastVerbExecuted", tagged(0x1081, "Integer"))
        .with("date", tagged(0x0e06, "SystemTime"))
        .with("deleted", distinguished("Common", 0x8570, "Integer"))
        .with("keywords", unindexed("item:Categories"))
        .with(
            "contentclass",
            named("PublicStrings", "urn:schemas:mailheader:content-class"),
        )
        .with("subject", unindexed("item:Subject"))
        .with("from", tagged(0x0c1a, "String"))
        .with("to", tagged(0x0e04, "String"))
        .with("cc", tagged(0x0e03, "String"))
        .with("msgfrom", tagged(0x0065, "String"))
        .with("msgto", tagged(0x0e04, "String"))
        .with("msgcc", tagged(0x0e03, "String"))
        .with("bcc", tagged(0x0e02, "String"))
        .with("message-id", unindexed("message:InternetMessageId"))
        .with("messageheaders", tagged(0x007d, "String"))
        .with("htmldescription", tagged(0x1013, "String"))
        .with("textdescription", tagged(0x1000, "String"))
        .with("outlookmessageclass", unindexed("item:ItemClass"))
        // Calendar and tasks
        .with(
            "instancetype",
            named("PublicStrings", "urn:schemas:calendar:instancetype")
                .kind(ValueKind::Int),
        )
        .with("dtstart", unindexed("calendar:Start"))
        .with("dtend", unindexed("calendar:End"))
        .with("sensitivity", tagged(0x0036, "Integer"))
        .with("processed", tagged(0x65e8, "Boolean"))
        .with("datecompleted", unindexed("task:CompleteDate"))
        // Contacts
        .with("cn", unindexed("contacts:DisplayName"))
        .with("givenName", unindexed("contacts:GivenName"))
        .with("sn", unindexed("contacts:Surname"))
        .with(
            "smtpemail1",
            indexed("contacts:EmailAddress", "EmailAddress1"),
        )
        .with("title", unindexed("contacts:JobTitle"))
        .with("o", unindexed("contacts:CompanyName"))
        .with("department", unindexed("contacts:Department"));
}

impl FieldDef {
    fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A core EWS property, e.g. `item:Subject`. Responses carry it as an
/// element named after the part following the colon.
fn unindexed(uri: &str) -> FieldDef {
    let response_name = uri.rsplit(':').next().unwrap_or(uri);
    FieldDef {
        locator: format!("<t:FieldURI FieldURI=\"{}\"/>", uri),
        kind: ValueKind::String,
        cast: None,
        response_name: response_name.to_owned(),
    }
}

fn indexed(uri: &str, index: &str) -> FieldDef {
    FieldDef {
        locator: format!(
            "<t:IndexedFieldURI FieldURI=\"{}\" FieldIndex=\"{}\"/>",
            uri, index
        ),
        kind: ValueKind::String,
        cast: None,
        response_name: index.to_owned(),
    }
}

/// A MAPI property addressed by tag. Responses identify it by the tag in
/// lower-case hex without leading zeroes, e.g. `0xe23`.
fn tagged(tag: u32, property_type: &str) -> FieldDef {
    FieldDef {
        locator: format!(
            "<t:ExtendedFieldURI PropertyTag=\"0x{:04x}\" \
             PropertyType=\"{}\"/>",
            tag, property_type
        ),
        kind: extended_kind(property_type),
        cast: None,
        response_name: format!("0x{:x}", tag),
    }
}

fn distinguished(set: &str, id: u32, property_type: &str) -> FieldDef {
    FieldDef {
        locator: format!(
            "<t:ExtendedFieldURI DistinguishedPropertySetId=\"{}\" \
             PropertyId=\"{}\" PropertyType=\"{}\"/>",
            set, id, property_type
        ),
        kind: extended_kind(property_type),
        cast: None,
        response_name: format!("{}:{}", set, id),
    }
}

fn named(set: &str, name: &str) -> FieldDef {
    FieldDef {
        locator: format!(
            "<t:ExtendedFieldURI DistinguishedPropertySetId=\"{}\" \
             PropertyName=\"{}\" PropertyType=\"String\"/>",
            set, name
        ),
        kind: ValueKind::String,
        cast: None,
        response_name: name.to_owned(),
    }
}

fn extended_kind(property_type: &str) -> ValueKind {
    if "Integer" == property_type {
        ValueKind::Int
    } else {
        ValueKind::String
    }
}

/// The EWS field path for an Internet header, which is not in the registry
/// since any header name is allowed.
pub fn ews_header_locator(header: &str) -> String {
    format!(
        "<t:ExtendedFieldURI DistinguishedPropertySetId=\"InternetHeaders\" \
         PropertyName=\"{}\" PropertyType=\"String\"/>",
        header
    )
}

/// The DAV property URI for an Internet header.
pub fn dav_header_locator(header: &str) -> String {
    format!("urn:schemas:mailheader:{}", header)
}
