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

//! Parsing of the XML bodies the two backends answer with.
//!
//! Both parsers are deliberately shallow: they flatten whatever they find
//! into string maps and leave it to the backends to pick out the
//! properties they asked for.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Reader;

use crate::support::error::Error;

/// One `<response>` of a WebDAV multistatus body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    /// Properties from `200 OK` propstats, keyed by full property URI
    /// (namespace immediately followed by local name).
    pub properties: BTreeMap<String, String>,
}

impl DavResponse {
    pub fn get(&self, uri: &str) -> Option<&str> {
        self.properties.get(uri).map(String::as_str)
    }
}

/// Exchange writes property names which are not valid XML names (such as
/// `0x8570`) in ISO 9075 form, `_x0030_x8570`.
pub fn encode_element_name(local: &str) -> String {
    match local.chars().next() {
        Some(c) if c.is_ascii_digit() => {
            format!("_x{:04x}_{}", c as u32, &local[1..])
        }
        _ => local.to_owned(),
    }
}

fn decode_element_name(local: &str) -> String {
    let mut out = String::with_capacity(local.len());
    let mut rest = local;
    while let Some(ix) = rest.find("_x") {
        out.push_str(&rest[..ix]);
        let tail = &rest[ix..];
        let decoded = tail
            .get(2..6)
            .filter(|_| Some("_") == tail.get(6..7))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(std::char::from_u32);
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[7..];
            }
            None => {
                out.push_str("_x");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn full_name(ns: &ResolveResult, local: &[u8]) -> String {
    let mut name = match *ns {
        ResolveResult::Bound(Namespace(uri)) => {
            String::from_utf8_lossy(uri).into_owned()
        }
        _ => String::new(),
    };
    name.push_str(&decode_element_name(&String::from_utf8_lossy(local)));
    name
}

struct PendingProperty {
    name: String,
    depth: usize,
    values: Vec<String>,
}

/// Parse a `207 Multi-Status` body.
pub fn parse_multistatus(body: &[u8]) -> Result<Vec<DavResponse>, Error> {
    let text = String::from_utf8_lossy(body);
    let mut reader = NsReader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut responses = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<DavResponse> = None;
    let mut propstat: Vec<(String, String)> = Vec::new();
    let mut status_ok = true;
    let mut property: Option<PendingProperty> = None;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(ref e) => {
                let name = full_name(&ns, e.local_name().as_ref());
                match name.as_str() {
                    "DAV:response" => current = Some(DavResponse::default()),
                    "DAV:propstat" => {
                        propstat.clear();
                        status_ok = true;
                    }
                    _ => {
                        if property.is_none()
                            && Some("DAV:prop") == stack.last().map(String::as_str)
                        {
                            property = Some(PendingProperty {
                                name: name.clone(),
                                depth: stack.len(),
                                values: Vec::new(),
                            });
                        }
                    }
                }
                stack.push(name);
            }

            Event::Empty(ref e) => {
                let name = full_name(&ns, e.local_name().as_ref());
                if property.is_none()
                    && Some("DAV:prop") == stack.last().map(String::as_str)
                {
                    propstat.push((name, String::new()));
                }
            }

            Event::Text(ref t) => {
                let value = t.unescape()?.into_owned();
                if let Some(ref mut property) = property {
                    property.values.push(value);
                } else {
                    match stack.last().map(String::as_str) {
                        Some("DAV:href") => {
                            if let Some(ref mut current) = current {
                                current.href = value;
                            }
                        }
                        Some("DAV:status") => {
                            if stack.len() >= 2
                                && "DAV:propstat" == stack[stack.len() - 2]
                            {
                                status_ok = value.contains(" 200 ");
                            }
                        }
                        _ => (),
                    }
                }
            }

            Event::CData(ref c) => {
                if let Some(ref mut property) = property {
                    property
                        .values
                        .push(String::from_utf8_lossy(c).into_owned());
                }
            }

            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                if property.as_ref().map_or(false, |p| p.depth == stack.len()) {
                    if let Some(done) = property.take() {
                        propstat.push((done.name, done.values.join(",")));
                    }
                }

                match name.as_str() {
                    "DAV:propstat" => {
                        if let Some(ref mut current) = current {
                            if status_ok {
                                current.properties.extend(propstat.drain(..));
                            }
                        }
                        propstat.clear();
                    }
                    "DAV:response" => {
                        if let Some(done) = current.take() {
                            responses.push(done);
                        }
                    }
                    _ => (),
                }
            }

            Event::Eof => break,
            _ => (),
        }
    }

    Ok(responses)
}

/// One item or folder from an EWS response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EwsItem {
    /// The element name, e.g. `Message`, `Folder` or `CalendarItem`.
    pub kind: String,
    pub id: Option<String>,
    pub change_key: Option<String>,
    /// Values keyed by the response name of the field: the element name
    /// for core properties, the normalised tag or property name for
    /// extended properties, the entry key for indexed ones.
    pub fields: BTreeMap<String, String>,
}

impl EwsItem {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EwsResponse {
    pub items: Vec<EwsItem>,
    /// Whether a paged search has reached the end of the view.
    pub last_page: bool,
}

fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>, Error> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Normalise an `ExtendedFieldURI` to the response name used by the field
/// registry.
fn extended_key(e: &BytesStart) -> Result<Option<String>, Error> {
    if let Some(tag) = attribute(e, b"PropertyTag")? {
        let digits = tag.trim_start_matches("0x").trim_start_matches("0X");
        return Ok(Some(match u32::from_str_radix(digits, 16) {
            Ok(tag) => format!("0x{:x}", tag),
            Err(_) => tag.to_lowercase(),
        }));
    }
    if let Some(name) = attribute(e, b"PropertyName")? {
        return Ok(Some(name));
    }
    match (
        attribute(e, b"DistinguishedPropertySetId")?,
        attribute(e, b"PropertyId")?,
    ) {
        (Some(set), Some(id)) => Ok(Some(format!("{}:{}", set, id))),
        _ => Ok(None),
    }
}

struct OpenItem {
    item: EwsItem,
    depth: usize,
}

struct OpenExtended {
    key: Option<String>,
    values: Vec<String>,
}

/// Parse an EWS SOAP response envelope.
///
/// A SOAP fault or a response message of class `Error` becomes an `Err`;
/// item and folder lookups that found nothing become `NotFound`.
pub fn parse_ews_response(body: &[u8]) -> Result<EwsResponse, Error> {
    let text = String::from_utf8_lossy(body);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut response = EwsResponse {
        items: Vec::new(),
        last_page: true,
    };
    let mut stack: Vec<String> = Vec::new();
    let mut item: Option<OpenItem> = None;
    let mut extended: Option<OpenExtended> = None;
    let mut entry_key: Option<String> = None;
    let mut error_class = false;
    let mut response_code = None;
    let mut message_text = None;
    let mut fault = None;

    loop {
        let event = reader.read_event()?;
        let (e, empty) = match event {
            Event::Start(ref e) => (e, false),
            Event::Empty(ref e) => (e, true),

            Event::Text(ref t) => {
                let value = t.unescape()?.into_owned();
                let top = stack.last().map(String::as_str).unwrap_or("");
                match top {
                    "ResponseCode" => response_code = Some(value),
                    "MessageText" => message_text = Some(value),
                    "faultstring" => fault = Some(value),
                    _ => {
                        if let Some(ref mut extended) = extended {
                            if "Value" == top {
                                extended.values.push(value);
                            }
                        } else if let Some(ref mut open) = item {
                            let key = if "Entry" == top {
                                entry_key.clone()
                            } else if "String" == top && stack.len() >= 2 {
                                Some(stack[stack.len() - 2].clone())
                            } else {
                                Some(top.to_owned())
                            };
                            if let Some(key) = key {
                                let slot =
                                    open.item.fields.entry(key).or_default();
                                if "String" == top && !slot.is_empty() {
                                    slot.push(',');
                                    slot.push_str(&value);
                                } else {
                                    *slot = value;
                                }
                            }
                        }
                    }
                }
                continue;
            }

            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                if "ExtendedProperty" == name {
                    if let Some(done) = extended.take() {
                        if let (Some(key), Some(ref mut open)) =
                            (done.key, item.as_mut())
                        {
                            open.item.fields.insert(key, done.values.join(","));
                        }
                    }
                }
                if item.as_ref().map_or(false, |i| i.depth == stack.len()) {
                    if let Some(done) = item.take() {
                        response.items.push(done.item);
                    }
                }
                continue;
            }

            Event::Eof => break,
            _ => continue,
        };

        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        if name.ends_with("ResponseMessage") {
            if let Some(class) = attribute(e, b"ResponseClass")? {
                error_class |= "Error" == class;
            }
        } else if "RootFolder" == name {
            if let Some(last) = attribute(e, b"IncludesLastItemInRange")? {
                response.last_page = "true" == last;
            }
        }

        if let Some(ref mut open) = item {
            match name.as_str() {
                "ItemId" | "FolderId" if open.depth + 1 == stack.len() => {
                    open.item.id = attribute(e, b"Id")?;
                    open.item.change_key = attribute(e, b"ChangeKey")?;
                }
                "ExtendedProperty" => {
                    extended = Some(OpenExtended {
                        key: None,
                        values: Vec::new(),
                    });
                }
                "ExtendedFieldURI" => {
                    if let Some(ref mut extended) = extended {
                        extended.key = extended_key(e)?;
                    }
                }
                "Entry" => entry_key = attribute(e, b"Key")?,
                _ => (),
            }
        } else {
            let parent = stack.last().map(String::as_str);
            if Some("Items") == parent
                || Some("Folders") == parent
                || "Resolution" == name
            {
                item = Some(OpenItem {
                    item: EwsItem {
                        kind: name.clone(),
                        ..EwsItem::default()
                    },
                    depth: stack.len(),
                });
                if empty {
                    if let Some(done) = item.take() {
                        response.items.push(done.item);
                    }
                }
            }
        }

        if !empty {
            stack.push(name);
        }
    }

    if let Some(fault) = fault {
        return Err(Error::ServerError(format!("SOAP fault: {}", fault)));
    }

    if error_class {
        let code = response_code.unwrap_or_default();
        let message = message_text.unwrap_or_else(|| code.clone());
        return match code.as_str() {
            "ErrorItemNotFound" | "ErrorFolderNotFound" => {
                Err(Error::NotFound(message))
            }
            "ErrorNameResolutionNoResults" => Ok(response),
            "ErrorAccessDenied" => Err(Error::AuthenticationFailed(message)),
            _ => Err(Error::ServerError(format!("{}: {}", code, message))),
        };
    }

    Ok(response)
}

/// Parse the body of an OWA `Cmd=galfind` request into one map per
/// directory entry, keyed by the short attribute codes (`AN`, `DN`, ...).
pub fn parse_galfind(body: &[u8]) -> Result<Vec<BTreeMap<String, String>>, Error> {
    let text = String::from_utf8_lossy(body);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<BTreeMap<String, String>> = None;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name =
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if "item" == name {
                    current = Some(BTreeMap::new());
                } else if current.is_some() {
                    field = Some(name);
                }
            }
            Event::Text(ref t) => {
                if let (Some(ref mut current), Some(ref field)) =
                    (current.as_mut(), field.as_ref())
                {
                    current.insert(field.to_string(), t.unescape()?.into_owned());
                }
            }
            Event::End(ref e) => {
                if b"item" == e.local_name().as_ref() {
                    if let Some(done) = current.take() {
                        entries.push(done);
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => (),
        }
    }

    Ok(entries)
}

/// The text of the first element named `local`, anywhere in the document.
pub fn first_text(body: &[u8], local: &str) -> Result<Option<String>, Error> {
    let text = String::from_utf8_lossy(body);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                inside = e.local_name().as_ref() == local.as_bytes();
            }
            Event::Text(ref t) if inside => {
                return Ok(Some(t.unescape()?.into_owned()));
            }
            Event::End(_) => inside = false,
            Event::Eof => return Ok(None),
            _ => (),
        }
    }
}
