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

//! The Exchange Web Services backend, for Exchange 2007 and later.

use std::collections::{BTreeMap, BTreeSet};

use chrono::prelude::*;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use quick_xml::escape::escape;
use regex::Regex;

use super::discovery;
use super::paths::{self, FolderRef, WellKnown};
use super::xml::{first_text, parse_ews_response, EwsItem, EwsResponse};
use super::{Backend, ItemRecord, ServerVersion, SessionInfo};
use crate::auth::Authenticated;
use crate::condition::ews::EwsCompiler;
use crate::condition::field::FieldRegistry;
use crate::condition::{CompareOp, Condition};
use crate::mailbox::{Contact, Folder, Item, Properties};
use crate::support::error::Error;
use crate::support::interrupt::Interrupt;
use crate::support::log_prefix::LogPrefix;
use crate::transport::client::HttpClient;
use crate::transport::{Method, Request};

const EWS_PATH: &str = "/ews/exchange.asmx";
const PAGE_SIZE: u32 = 100;
const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Folders whose ids are loaded at startup so that listings can show them
/// under their logical names.
const STARTUP_FOLDERS: &[WellKnown] = &[
    WellKnown::Inbox,
    WellKnown::Calendar,
    WellKnown::Contacts,
    WellKnown::Sent,
    WellKnown::Drafts,
    WellKnown::Trash,
    WellKnown::Junk,
    WellKnown::Outbox,
];

/// Directory attributes returned by `ResolveNames`, with the logical
/// contact field each one fills.
const RESOLUTION_ATTRIBUTES: &[(&str, &str)] = &[
    ("DisplayName", "cn"),
    ("GivenName", "givenName"),
    ("Surname", "sn"),
    ("EmailAddress", "smtpemail1"),
    ("OfficeLocation", "roomnumber"),
    ("Street", "street"),
    ("City", "l"),
    ("CompanyName", "o"),
    ("PostalCode", "postalcode"),
    ("State", "st"),
    ("CountryOrRegion", "co"),
    ("Manager", "manager"),
    ("Initials", "middlename"),
    ("JobTitle", "title"),
    ("Department", "department"),
    ("OtherTelephone", "otherTelephone"),
    ("BusinessPhone", "telephoneNumber"),
    ("MobilePhone", "mobile"),
    ("BusinessFax", "facsimiletelephonenumber"),
    ("AssistantName", "secretarycn"),
];

lazy_static! {
    static ref MAJOR_VERSION: Regex =
        Regex::new(r#"ServerVersionInfo[^>]*MajorVersion="(\d+)""#).unwrap();
}

/// A folder as EWS addresses it.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FolderId {
    Distinguished {
        name: &'static str,
        mailbox: Option<String>,
    },
    Id(String),
}

impl FolderId {
    fn to_xml(&self) -> String {
        match *self {
            FolderId::Distinguished {
                name,
                mailbox: None,
            } => format!("<t:DistinguishedFolderId Id=\"{}\"/>", name),
            FolderId::Distinguished {
                name,
                mailbox: Some(ref mailbox),
            } => format!(
                "<t:DistinguishedFolderId Id=\"{}\"><t:Mailbox>\
                 <t:EmailAddress>{}</t:EmailAddress>\
                 </t:Mailbox></t:DistinguishedFolderId>",
                name,
                escape(mailbox.as_str())
            ),
            FolderId::Id(ref id) => {
                format!("<t:FolderId Id=\"{}\"/>", escape(id.as_str()))
            }
        }
    }
}

fn request_version(version: ServerVersion) -> &'static str {
    match version {
        ServerVersion::Exchange2010 => "Exchange2010",
        _ => "Exchange2007_SP1",
    }
}

fn envelope(version: ServerVersion, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <soap:Envelope \
         xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         xmlns:t=\"http://schemas.microsoft.com/exchange/services/2006/types\" \
         xmlns:m=\"http://schemas.microsoft.com/exchange/services/2006/messages\">\
         <soap:Header><t:RequestServerVersion Version=\"{}\"/></soap:Header>\
         <soap:Body>{}</soap:Body></soap:Envelope>",
        request_version(version),
        body
    )
}

/// Run one SOAP call, returning the raw response body.
fn call(
    client: &mut HttpClient,
    endpoint: &str,
    version: ServerVersion,
    body: &str,
) -> Result<Vec<u8>, Error> {
    let request = Request::new(Method::Post, endpoint)
        .body(SOAP_CONTENT_TYPE, envelope(version, body).into_bytes());
    Ok(client.fetch(request)?.check()?.body)
}

/// The distinct locators of `attributes` known to the EWS registry.
fn additional_properties<'a>(
    attributes: impl IntoIterator<Item = &'a str>,
) -> String {
    let registry = FieldRegistry::ews();
    let mut seen = BTreeSet::new();
    let mut out = String::new();
    for attribute in attributes {
        if let Ok(def) = registry.get(attribute) {
            if seen.insert(def.locator.as_str()) {
                out.push_str(&def.locator);
            }
        }
    }

    if out.is_empty() {
        out
    } else {
        format!("<t:AdditionalProperties>{}</t:AdditionalProperties>", out)
    }
}

/// Map the fields of a response item back to the logical attribute names.
fn properties_of(item: &EwsItem, attributes: &[&str]) -> Properties {
    let registry = FieldRegistry::ews();
    attributes
        .iter()
        .filter_map(|&name| {
            let def = registry.get(name).ok()?;
            let value = item.get(&def.response_name)?;
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}

fn get_folder_body(ids: &[FolderId], attributes: &[&str]) -> String {
    format!(
        "<m:GetFolder><m:FolderShape><t:BaseShape>IdOnly</t:BaseShape>{}\
         </m:FolderShape><m:FolderIds>{}</m:FolderIds></m:GetFolder>",
        additional_properties(attributes.iter().cloned()),
        ids.iter().map(FolderId::to_xml).collect::<String>()
    )
}

/// Check that `endpoint` answers as an EWS endpoint, returning its absolute
/// URL and the server generation.
fn check_endpoint(
    client: &mut HttpClient,
    endpoint: &str,
) -> Result<(String, ServerVersion), Error> {
    let url = client.resolve(endpoint)?.to_string();
    let response = client.fetch(Request::new(Method::Head, url.as_str()))?;
    match response.status {
        200..=299 => (),
        401 => {
            return Err(Error::AuthenticationFailed(format!(
                "{} rejected credentials",
                url
            )))
        }
        status => {
            return Err(Error::ServerError(format!(
                "{} returned status {}",
                url, status
            )))
        }
    }

    // Some servers only start answering properly after a first real call
    let body = call(
        client,
        &url,
        ServerVersion::Exchange2007,
        &get_folder_body(
            &[FolderId::Distinguished {
                name: "msgfolderroot",
                mailbox: None,
            }],
            &[],
        ),
    )?;
    parse_ews_response(&body)?;

    let text = String::from_utf8_lossy(&body);
    let version = match MAJOR_VERSION
        .captures(&text)
        .and_then(|cap| cap[1].parse::<u32>().ok())
    {
        Some(major) if major >= 14 => ServerVersion::Exchange2010,
        _ => ServerVersion::Exchange2007,
    };
    Ok((url, version))
}

fn autodiscover_url(email: &str) -> Option<String> {
    let domain = &email[email.find('@')? + 1..];
    if domain.is_empty() {
        None
    } else {
        Some(format!(
            "https://autodiscover.{}/autodiscover/autodiscover.xml",
            domain
        ))
    }
}

/// Ask the autodiscover service where the EWS endpoint of `email` is.
fn ews_url_from_autodiscover(
    client: &mut HttpClient,
    email: &str,
) -> Result<String, Error> {
    let url = autodiscover_url(email).ok_or_else(|| {
        Error::Configuration(format!("No domain in address {}", email))
    })?;
    let body = format!(
        "<Autodiscover xmlns=\"http://schemas.microsoft.com/exchange/\
         autodiscover/outlook/requestschema/2006\"><Request>\
         <EMailAddress>{}</EMailAddress><AcceptableResponseSchema>\
         http://schemas.microsoft.com/exchange/autodiscover/outlook/\
         responseschema/2006a</AcceptableResponseSchema>\
         </Request></Autodiscover>",
        escape(email)
    );
    let response = client
        .fetch(Request::new(Method::Post, url.as_str()).body("text/xml", body.into_bytes()))?
        .check()?;
    let ews_url = first_text(&response.body, "EwsUrl")?.ok_or_else(|| {
        Error::ServerError(format!("No EwsUrl in autodiscover response from {}", url))
    })?;
    debug!("{} Autodiscover found {}", client.log_prefix(), ews_url);
    Ok(ews_url)
}

/// Find a working endpoint: the standard path, then the same with NTLM,
/// then whatever autodiscover says.
fn find_endpoint(
    client: &mut HttpClient,
    email: &str,
) -> Result<(String, ServerVersion), Error> {
    let first = match check_endpoint(client, EWS_PATH) {
        Ok(found) => return Ok(found),
        Err(e) if e.is_connectivity() => return Err(e),
        Err(Error::Interrupted) => return Err(Error::Interrupted),
        Err(e) => e,
    };
    debug!("{} {} failed: {}", client.log_prefix(), EWS_PATH, first);

    if client.enable_ntlm() {
        match check_endpoint(client, EWS_PATH) {
            Ok(found) => return Ok(found),
            Err(e) if e.is_connectivity() => return Err(e),
            Err(Error::Interrupted) => return Err(Error::Interrupted),
            Err(e) => {
                debug!("{} {} with NTLM failed: {}", client.log_prefix(), EWS_PATH, e)
            }
        }
    } else {
        info!(
            "{} NTLM is not available on this transport, trying autodiscover",
            client.log_prefix()
        );
    }

    let discovered = ews_url_from_autodiscover(client, email)
        .and_then(|url| check_endpoint(client, &url));
    match discovered {
        Ok(found) => Ok(found),
        Err(e) if e.is_connectivity() => Err(e),
        Err(Error::Interrupted) => Err(Error::Interrupted),
        Err(e) => {
            debug!("{} Autodiscover failed: {}", client.log_prefix(), e);
            match first {
                Error::AuthenticationFailed(_) => Err(first),
                _ => {
                    error!(
                        "{} No usable EWS endpoint: {}",
                        client.log_prefix(),
                        first
                    );
                    Err(Error::ServerError("EWS not available".to_owned()))
                }
            }
        }
    }
}

/// The client-facing name of a `ResolveNames` result: the alias if the
/// server includes it, else the local part of the address, else the
/// display name.
fn resolution_name(item: &EwsItem) -> Option<String> {
    item.get("Alias")
        .map(str::to_owned)
        .or_else(|| {
            item.get("EmailAddress")
                .and_then(|email| email.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_owned)
        })
        .or_else(|| item.get("Name").map(str::to_owned))
}

fn resolution_contact(item: &EwsItem) -> Option<Contact> {
    let name = resolution_name(item)?;
    let mut properties = Properties::new();
    properties.insert("imapUid".to_owned(), name.clone());
    properties.insert("uid".to_owned(), name.clone());
    for &(key, field) in RESOLUTION_ATTRIBUTES {
        if let Some(value) = item.get(key) {
            properties.insert(field.to_owned(), value.to_owned());
        }
    }
    Some(Contact::new(Item::new("", name), properties))
}

fn resolve_names_body(entry: &str) -> String {
    format!(
        "<m:ResolveNames ReturnFullContactData=\"true\">\
         <m:UnresolvedEntry>{}</m:UnresolvedEntry></m:ResolveNames>",
        escape(entry)
    )
}

pub struct EwsBackend {
    client: HttpClient,
    info: SessionInfo,
    endpoint: String,
    /// Ids of the well-known folders of the user's own mailbox.
    well_known_ids: BTreeMap<String, WellKnown>,
}

impl EwsBackend {
    /// Locate the EWS endpoint and load the user's mailbox layout.
    pub fn connect(
        mut client: HttpClient,
        authenticated: &Authenticated,
    ) -> Result<Self, Error> {
        let host = client.last_url().host_str().unwrap_or_default().to_owned();
        let scraped = discovery::options_page(&mut client)?;
        let (mut alias, mut email) = match scraped {
            Some(ref found) => found.clone(),
            None => discovery::identity_from_login(&authenticated.identity, &host),
        };

        let (endpoint, version) = find_endpoint(&mut client, &email)?;

        if scraped.is_none() {
            match resolve_primary_email(&mut client, &endpoint, version, &alias) {
                Ok(Some(found)) => email = found,
                Ok(None) => (),
                Err(e) if e.is_connectivity() => return Err(e),
                Err(Error::Interrupted) => return Err(Error::Interrupted),
                Err(e) => warn!(
                    "{} Unable to get primary email address: {}",
                    client.log_prefix(),
                    e
                ),
            }
        }
        if alias.is_empty() {
            alias = email.split('@').next().unwrap_or_default().to_owned();
        }

        let well_known_ids = load_well_known(&mut client, &endpoint, version)?;

        let mail_path = format!("/users/{}/", email.to_lowercase());
        let info = SessionInfo {
            identity: authenticated.identity.clone(),
            email,
            alias,
            version,
            mail_path,
            root_path: "/users/".to_owned(),
        };
        info!(
            "{} EWS endpoint {} ({}), mailbox {}",
            client.log_prefix(),
            endpoint,
            version,
            info.email
        );

        Ok(EwsBackend {
            client,
            info,
            endpoint,
            well_known_ids,
        })
    }

    fn call(&mut self, body: &str) -> Result<EwsResponse, Error> {
        let raw = call(&mut self.client, &self.endpoint, self.info.version, body)?;
        parse_ews_response(&raw)
    }

    fn compiler(&self) -> EwsCompiler<'static> {
        EwsCompiler::new(FieldRegistry::ews())
            .exchange2010(ServerVersion::Exchange2010 <= self.info.version)
    }

    /// The address of another user's mailbox, given by alias or address.
    fn owner_address(&self, owner: &str) -> String {
        if owner.contains('@') {
            owner.to_owned()
        } else {
            match self.info.email.find('@') {
                Some(at) => format!("{}{}", owner, &self.info.email[at..]),
                None => owner.to_owned(),
            }
        }
    }

    fn folder_id(&mut self, path: &str) -> Result<FolderId, Error> {
        let (start, rest) = match paths::resolve(path, &self.info) {
            FolderRef::Mailbox {
                owner,
                well_known,
                rest,
            } => (
                FolderId::Distinguished {
                    name: well_known.map_or("msgfolderroot", WellKnown::ews_id),
                    mailbox: owner.map(|owner| self.owner_address(&owner)),
                },
                rest,
            ),
            FolderRef::Public(rest) => (
                FolderId::Distinguished {
                    name: "publicfoldersroot",
                    mailbox: None,
                },
                rest,
            ),
            FolderRef::Root | FolderRef::Absolute(_) => {
                return Err(Error::NotFound(path.to_owned()))
            }
        };

        let mut current = start;
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            current = self
                .child_folder_id(&current, segment)?
                .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        }
        Ok(current)
    }

    fn child_folder_id(
        &mut self,
        parent: &FolderId,
        name: &str,
    ) -> Result<Option<FolderId>, Error> {
        let restriction = self
            .compiler()
            .restriction(&Condition::equals("displayname", name))?
            .unwrap_or_default();
        let body = format!(
            "<m:FindFolder Traversal=\"Shallow\"><m:FolderShape>\
             <t:BaseShape>IdOnly</t:BaseShape></m:FolderShape>\
             <m:IndexedPageFolderView MaxEntriesReturned=\"1\" Offset=\"0\" \
             BasePoint=\"Beginning\"/>{}<m:ParentFolderIds>{}</m:ParentFolderIds>\
             </m:FindFolder>",
            restriction,
            parent.to_xml()
        );
        Ok(self
            .call(&body)?
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id)
            .map(FolderId::Id))
    }

    /// Run a paged `FindItem` or `FindFolder`, collecting up to `max`
    /// results (all if 0).
    fn find_paged(
        &mut self,
        max: u32,
        mut render: impl FnMut(u32, u32) -> String,
    ) -> Result<Vec<EwsItem>, Error> {
        let mut results = Vec::new();
        loop {
            self.client.interrupt().check()?;
            let page_size = if max > 0 {
                PAGE_SIZE.min(max - results.len() as u32)
            } else {
                PAGE_SIZE
            };
            let response = self.call(&render(page_size, results.len() as u32))?;
            let fetched = response.items.len();
            results.extend(response.items);

            if response.last_page
                || 0 == fetched
                || (max > 0 && results.len() as u32 >= max)
            {
                break;
            }
        }
        if max > 0 {
            results.truncate(max as usize);
        }
        Ok(results)
    }

    fn find_folders_under(
        &mut self,
        parent: FolderId,
        path: &str,
        condition: &Condition,
        recursive: bool,
        out: &mut Vec<Folder>,
    ) -> Result<(), Error> {
        let restriction = self.compiler().restriction(condition)?.unwrap_or_default();
        let shape = additional_properties(super::FOLDER_ATTRIBUTES.iter().cloned());
        let parent_xml = parent.to_xml();
        let items = self.find_paged(0, |page_size, offset| {
            format!(
                "<m:FindFolder Traversal=\"Shallow\"><m:FolderShape>\
                 <t:BaseShape>IdOnly</t:BaseShape>{}</m:FolderShape>\
                 <m:IndexedPageFolderView MaxEntriesReturned=\"{}\" \
                 Offset=\"{}\" BasePoint=\"Beginning\"/>{}\
                 <m:ParentFolderIds>{}</m:ParentFolderIds></m:FindFolder>",
                shape, page_size, offset, restriction, parent_xml
            )
        })?;

        for item in items {
            let id = match item.id {
                Some(ref id) => id.clone(),
                None => continue,
            };
            let properties = properties_of(&item, super::FOLDER_ATTRIBUTES);
            let child_path = match self.well_known_ids.get(&id) {
                Some(&well_known) => well_known.logical_name().to_owned(),
                None => paths::join(
                    path,
                    properties.get("displayname").map_or("", String::as_str),
                ),
            };
            let mut folder = Folder::from_properties(child_path, &properties);
            folder.backend_id = Some(id.clone());

            let descend = recursive && folder.has_children;
            let child_path = folder.path.clone();
            out.push(folder);
            if descend {
                self.find_folders_under(
                    FolderId::Id(id),
                    &child_path,
                    condition,
                    true,
                    out,
                )?;
            }
        }
        Ok(())
    }

    fn get_item_by_id(
        &mut self,
        id: &str,
        attributes: &[&str],
        mime: bool,
    ) -> Result<EwsItem, Error> {
        let body = format!(
            "<m:GetItem><m:ItemShape><t:BaseShape>IdOnly</t:BaseShape>{}{}\
             </m:ItemShape><m:ItemIds><t:ItemId Id=\"{}\"/></m:ItemIds>\
             </m:GetItem>",
            if mime {
                "<t:IncludeMimeContent>true</t:IncludeMimeContent>"
            } else {
                ""
            },
            additional_properties(attributes.iter().cloned()),
            escape(id)
        );
        self.call(&body)?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(id.to_owned()))
    }
}

fn resolve_primary_email(
    client: &mut HttpClient,
    endpoint: &str,
    version: ServerVersion,
    alias: &str,
) -> Result<Option<String>, Error> {
    let body = call(client, endpoint, version, &resolve_names_body(alias))?;
    Ok(parse_ews_response(&body)?
        .items
        .into_iter()
        .find(|item| {
            item.get("Name")
                .map_or(false, |name| name.eq_ignore_ascii_case(alias))
        })
        .and_then(|item| item.get("EmailAddress").map(str::to_owned)))
}

fn load_well_known(
    client: &mut HttpClient,
    endpoint: &str,
    version: ServerVersion,
) -> Result<BTreeMap<String, WellKnown>, Error> {
    let ids: Vec<FolderId> = STARTUP_FOLDERS
        .iter()
        .map(|&well_known| FolderId::Distinguished {
            name: well_known.ews_id(),
            mailbox: None,
        })
        .collect();

    let response = call(client, endpoint, version, &get_folder_body(&ids, &[]))
        .and_then(|body| parse_ews_response(&body));
    let response = match response {
        Ok(response) => response,
        Err(e) if e.is_connectivity() => return Err(e),
        Err(Error::Interrupted) => return Err(Error::Interrupted),
        Err(e) => {
            error!("{} Loading well-known folders: {}", client.log_prefix(), e);
            return Err(Error::ServerError("EWS not available".to_owned()));
        }
    };

    Ok(response
        .items
        .into_iter()
        .zip(STARTUP_FOLDERS.iter().cloned())
        .filter_map(|(item, well_known)| item.id.map(|id| (id, well_known)))
        .collect())
}

impl Backend for EwsBackend {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn interrupt(&self) -> &Interrupt {
        self.client.interrupt()
    }

    fn log_prefix(&self) -> &LogPrefix {
        self.client.log_prefix()
    }

    fn get_folder(&mut self, path: &str) -> Result<Folder, Error> {
        let id = self.folder_id(path)?;
        let item = self
            .call(&get_folder_body(&[id], super::FOLDER_ATTRIBUTES))?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        let mut folder = Folder::from_properties(
            path.to_owned(),
            &properties_of(&item, super::FOLDER_ATTRIBUTES),
        );
        folder.backend_id = item.id;
        Ok(folder)
    }

    fn find_folders(
        &mut self,
        path: &str,
        condition: &Condition,
        recursive: bool,
    ) -> Result<Vec<Folder>, Error> {
        let parent = self.folder_id(path)?;
        let mut folders = Vec::new();
        self.find_folders_under(parent, path, condition, recursive, &mut folders)?;
        Ok(folders)
    }

    fn search_items(
        &mut self,
        path: &str,
        attributes: &[&str],
        condition: &Condition,
        max: u32,
    ) -> Result<Vec<ItemRecord>, Error> {
        let parent = self.folder_id(path)?.to_xml();
        let restriction = self.compiler().restriction(condition)?.unwrap_or_default();
        let mut requested = vec!["permanenturl", "urlcompname"];
        requested.extend_from_slice(attributes);
        let shape = additional_properties(requested.iter().cloned());
        let sort = &FieldRegistry::ews().get("imapUid")?.locator;

        let items = self.find_paged(max, |page_size, offset| {
            format!(
                "<m:FindItem Traversal=\"Shallow\"><m:ItemShape>\
                 <t:BaseShape>IdOnly</t:BaseShape>{}</m:ItemShape>\
                 <m:IndexedPageItemView MaxEntriesReturned=\"{}\" \
                 Offset=\"{}\" BasePoint=\"Beginning\"/>{}\
                 <m:SortOrder><t:FieldOrder Order=\"Descending\">{}\
                 </t:FieldOrder></m:SortOrder>\
                 <m:ParentFolderIds>{}</m:ParentFolderIds></m:FindItem>",
                shape, page_size, offset, restriction, sort, parent
            )
        })?;
        debug!(
            "{} Search in {} returned {} items",
            self.client.log_prefix(),
            path,
            items.len()
        );

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let properties = properties_of(&item, &requested);
                Some(ItemRecord {
                    href: item.id?,
                    change_key: item.change_key,
                    properties,
                })
            })
            .collect())
    }

    fn get_item(
        &mut self,
        path: &str,
        name: &str,
        attributes: &[&str],
    ) -> Result<ItemRecord, Error> {
        self.search_items(
            path,
            attributes,
            &Condition::equals("urlcompname", name),
            1,
        )?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(paths::join(path, name)))
    }

    fn get_content(&mut self, href: &str) -> Result<Vec<u8>, Error> {
        let item = self.get_item_by_id(href, &[], true)?;
        let encoded = item.get("MimeContent").ok_or_else(|| {
            Error::ServerError(format!("No MIME content for {}", href))
        })?;
        let compact: String =
            encoded.chars().filter(|c| !c.is_whitespace()).collect();
        base64::decode(&compact).map_err(|e| {
            Error::ServerError(format!("Bad MIME content for {}: {}", href, e))
        })
    }

    fn get_properties(
        &mut self,
        href: &str,
        attributes: &[&str],
    ) -> Result<Properties, Error> {
        let item = self.get_item_by_id(href, attributes, false)?;
        Ok(properties_of(&item, attributes))
    }

    fn delete_item(&mut self, href: &str) -> Result<(), Error> {
        let body = format!(
            "<m:DeleteItem DeleteType=\"HardDelete\"><m:ItemIds>\
             <t:ItemId Id=\"{}\"/></m:ItemIds></m:DeleteItem>",
            escape(href)
        );
        match self.call(&body) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("{} {} already gone", self.client.log_prefix(), href);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn gal_lookup(
        &mut self,
        field: &str,
        op: CompareOp,
        value: &str,
    ) -> Result<Vec<Contact>, Error> {
        let mut entry = match field {
            "smtpemail1" => format!("smtp:{}", value.to_lowercase()),
            "imapUid" | "cn" | "givenName" | "sn" => value.to_lowercase(),
            _ => return Ok(Vec::new()),
        };
        if CompareOp::IsEqualTo == op {
            entry.insert(0, '=');
        }

        let items = self.call(&resolve_names_body(&entry))?.items;
        debug!(
            "{} ResolveNames({}) returned {} results",
            self.client.log_prefix(),
            entry,
            items.len()
        );
        Ok(items.iter().filter_map(resolution_contact).collect())
    }

    fn format_search_date(&self, date: DateTime<Utc>) -> String {
        date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}
