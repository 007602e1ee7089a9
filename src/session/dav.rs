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

//! The WebDAV backend, which speaks PROPFIND and the SQL-like SEARCH
//! dialect of Exchange 2003 and 2007.

use std::collections::BTreeMap;

use chrono::prelude::*;
use log::{debug, info, warn};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use quick_xml::escape::escape;
use url::Url;

use super::discovery;
use super::gal;
use super::paths::{self, FolderRef, WellKnown, ALL_WELL_KNOWN};
use super::xml::{encode_element_name, parse_galfind, parse_multistatus, DavResponse};
use super::{Backend, ItemRecord, ServerVersion, SessionInfo};
use crate::auth::{form, Authenticated, LoginIdentity};
use crate::condition::dav::DavCompiler;
use crate::condition::field::FieldRegistry;
use crate::condition::{CompareOp, Condition};
use crate::mailbox::{Contact, Folder, Properties};
use crate::support::error::Error;
use crate::support::interrupt::Interrupt;
use crate::support::log_prefix::LogPrefix;
use crate::transport::client::HttpClient;
use crate::transport::{Method, Request};

const PUBLIC_ROOT: &str = "/public";
const HTTPMAIL: &str = "urn:schemas:httpmail:";
const XML_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

/// Characters which must be escaped in a URL path. `%`, `#` and `?` are
/// legal in Exchange folder names but not in a path.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SET).to_string()
}

/// The decoded path of an href, which may be absolute or server-relative.
fn decode_href(href: &str) -> String {
    let path = match Url::parse(href) {
        Ok(url) => url.path().to_owned(),
        Err(_) => href.to_owned(),
    };
    percent_decode_str(&path).decode_utf8_lossy().into_owned()
}

/// What probing the server found out.
#[derive(Clone, Debug)]
pub struct DavSetup {
    info: SessionInfo,
    /// Either the absolute URL of the public folder tree, or just
    /// `/public` if it could not be verified.
    public_url: String,
    /// Decoded server path of each well-known folder, without trailing
    /// slash.
    well_known: BTreeMap<WellKnown, String>,
    galfind_enabled: bool,
}

pub struct DavBackend {
    client: HttpClient,
    info: SessionInfo,
    public_url: String,
    well_known: BTreeMap<WellKnown, String>,
    galfind_enabled: bool,
}

impl DavBackend {
    /// Work out the mailbox location after login and check that WebDAV is
    /// actually available there.
    pub fn detect(
        client: &mut HttpClient,
        authenticated: &Authenticated,
    ) -> Result<DavSetup, Error> {
        let host = client.last_url().host_str().unwrap_or_default().to_owned();

        let (version, base_mail_path, scraped) =
            match form::base_href(&authenticated.landing.text()) {
                Some(href) => {
                    let url = client.resolve(&href)?;
                    let mut path = decode_href(url.as_str());
                    if !path.ends_with('/') {
                        path.push('/');
                    }
                    debug!(
                        "{} Base href found on landing page, mail path is {}",
                        client.log_prefix(),
                        path
                    );
                    (ServerVersion::Exchange2003, Some(path), None)
                }
                None => (
                    ServerVersion::Exchange2007,
                    None,
                    discovery::options_page(client)?,
                ),
            };

        let public_url = check_public_folder(client)?;
        let mut galfind_enabled = true;

        let (alias, email) = match scraped {
            Some(found) => found,
            None => {
                let galfind_base = match base_mail_path {
                    Some(ref mail_path)
                        if ServerVersion::Exchange2003 == version
                            || PUBLIC_ROOT == public_url =>
                    {
                        mail_path.clone()
                    }
                    _ => public_url.clone(),
                };
                build_email(
                    client,
                    base_mail_path.as_deref().and_then(discovery::mailbox_name),
                    &authenticated.identity,
                    &host,
                    &galfind_base,
                    &mut galfind_enabled,
                )?
            }
        };

        let mail_path =
            base_mail_path.unwrap_or_else(|| format!("/exchange/{}/", email));
        let well_known = load_well_known(client, &mail_path)?;

        let info = SessionInfo {
            identity: authenticated.identity.clone(),
            root_path: discovery::root_path(&mail_path),
            email,
            alias,
            version,
            mail_path,
        };
        info!(
            "{} WebDAV mailbox at {} ({})",
            client.log_prefix(),
            info.mail_path,
            info.version
        );

        Ok(DavSetup {
            info,
            public_url,
            well_known,
            galfind_enabled,
        })
    }

    pub fn new(client: HttpClient, setup: DavSetup) -> Self {
        DavBackend {
            client,
            info: setup.info,
            public_url: setup.public_url,
            well_known: setup.well_known,
            galfind_enabled: setup.galfind_enabled,
        }
    }

    fn well_known_name(&self, well_known: WellKnown) -> String {
        self.well_known
            .get(&well_known)
            .and_then(|url| url.rsplit('/').next())
            .unwrap_or_else(|| well_known.logical_name())
            .to_owned()
    }

    /// The unencoded server path (or public URL) of the folder at the
    /// logical `path`.
    fn folder_url(&self, path: &str) -> String {
        match paths::resolve(path, &self.info) {
            FolderRef::Mailbox {
                owner,
                well_known,
                rest,
            } => {
                let base = match owner {
                    None => self.info.mail_path.clone(),
                    Some(owner) => {
                        debug!(
                            "{} Shared path for principal {}",
                            self.client.log_prefix(),
                            owner
                        );
                        format!("{}{}/", self.info.root_path, owner)
                    }
                };
                match well_known {
                    Some(well_known) => paths::join(
                        &format!("{}{}", base, self.well_known_name(well_known)),
                        &rest,
                    ),
                    None => format!("{}{}", base, rest),
                }
            }
            FolderRef::Public(rest) => paths::join(&self.public_url, &rest),
            FolderRef::Root => self.info.root_path.clone(),
            FolderRef::Absolute(absolute) => absolute,
        }
    }

    /// Map a folder href from the server back to the logical path clients
    /// know it by.
    fn logical_path(&self, href: &str) -> String {
        let decoded = decode_href(href);
        let path = decoded.trim_end_matches('/');

        for (&well_known, url) in &self.well_known {
            if let Some(rest) = paths::strip_segment(path, url) {
                return paths::join(well_known.logical_name(), rest);
            }
        }

        let mailbox = self.info.mail_path.trim_end_matches('/');
        if let Some(rest) = paths::strip_segment(path, mailbox) {
            return rest.to_owned();
        }

        path.to_owned()
    }

    fn compiler(&self) -> DavCompiler<'static> {
        DavCompiler::new(FieldRegistry::dav())
            .exchange2003(ServerVersion::Exchange2003 == self.info.version)
    }

    fn galfind_base(&self) -> &str {
        if ServerVersion::Exchange2003 == self.info.version
            || PUBLIC_ROOT == self.public_url
        {
            &self.info.mail_path
        } else {
            &self.public_url
        }
    }

    fn search(
        &mut self,
        folder_url: &str,
        attributes: &[&str],
        condition: &Condition,
        deep: bool,
        max: u32,
    ) -> Result<Vec<DavResponse>, Error> {
        let registry = FieldRegistry::dav();
        let mut sql = String::from("SELECT ");
        sql.push_str(&quote(&registry.get("permanenturl")?.locator));
        for &attribute in attributes {
            if let Ok(def) = registry.get(attribute) {
                sql.push(',');
                sql.push_str(&quote(&def.locator));
            }
        }
        sql.push_str(&format!(
            " FROM SCOPE('{} TRAVERSAL OF \"{}\"')",
            if deep { "DEEP" } else { "SHALLOW" },
            folder_url
        ));
        let filter = self.compiler().compile(condition)?;
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&quote(&registry.get("imapUid")?.locator));
        sql.push_str(" DESC");
        debug!("{} Search: {}", self.client.log_prefix(), sql);

        let body = format!(
            "<?xml version=\"1.0\"?>\n\
             <d:searchrequest xmlns:d=\"DAV:\"><d:sql>{}</d:sql></d:searchrequest>",
            escape(sql.as_str())
        );
        let mut request = Request::new(Method::Search, encode_path(folder_url))
            .body(XML_CONTENT_TYPE, body.into_bytes());
        if max > 0 {
            request = request.header("Range", format!("rows=0-{}", max - 1));
        }

        let response = self.client.fetch(request)?.check()?;
        let responses = parse_multistatus(&response.body)?;
        debug!(
            "{} Search returned {} results",
            self.client.log_prefix(),
            responses.len()
        );
        Ok(responses)
    }

    fn folder_from(&self, response: &DavResponse) -> Folder {
        Folder::from_properties(
            self.logical_path(&response.href),
            &properties_of(response, super::FOLDER_ATTRIBUTES),
        )
    }
}

fn quote(locator: &str) -> String {
    format!("\"{}\"", locator)
}

/// Pick the values of `attributes` out of a response, keyed by logical
/// name. `permanenturl` is always included when present.
fn properties_of(response: &DavResponse, attributes: &[&str]) -> Properties {
    let registry = FieldRegistry::dav();
    std::iter::once("permanenturl")
        .chain(attributes.iter().cloned())
        .filter_map(|name| {
            let def = registry.get(name).ok()?;
            let value = response.get(&def.locator)?;
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}

fn record_from(response: DavResponse, attributes: &[&str]) -> ItemRecord {
    let properties = properties_of(&response, attributes);
    ItemRecord {
        href: response.href,
        change_key: None,
        properties,
    }
}

fn propfind_body<'a>(uris: impl IntoIterator<Item = &'a str>) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <d:propfind xmlns:d=\"DAV:\"><d:prop>",
    );
    for (ix, uri) in uris.into_iter().enumerate() {
        let split = uri
            .rfind(|c: char| ':' == c || '/' == c || '#' == c)
            .map_or(0, |ix| ix + 1);
        let (ns, local) = uri.split_at(split);
        body.push_str(&format!(
            "<p{ix}:{local} xmlns:p{ix}=\"{ns}\"/>",
            ix = ix,
            local = encode_element_name(local),
            ns = escape(ns),
        ));
    }
    body.push_str("</d:prop></d:propfind>");
    body
}

/// Depth-0 PROPFIND of the given property URIs.
fn propfind<'a>(
    client: &mut HttpClient,
    url: &str,
    uris: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<DavResponse>, Error> {
    let request = Request::new(Method::Propfind, encode_path(url))
        .header("Depth", "0")
        .body(XML_CONTENT_TYPE, propfind_body(uris).into_bytes());
    let response = client.fetch(request)?.check()?;
    parse_multistatus(&response.body)
}

fn propfind_attributes(
    client: &mut HttpClient,
    url: &str,
    attributes: &[&str],
) -> Result<DavResponse, Error> {
    let registry = FieldRegistry::dav();
    let uris = std::iter::once("permanenturl")
        .chain(attributes.iter().cloned())
        .filter_map(|name| registry.get(name).ok())
        .map(|def| def.locator.as_str());
    propfind(client, url, uris)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(url.to_owned()))
}

/// Check whether the public folder tree is reachable, returning its URL or
/// just `/public` if not.
fn check_public_folder(client: &mut HttpClient) -> Result<String, Error> {
    let displayname = &FieldRegistry::dav().get("displayname")?.locator;
    let request = Request::new(Method::Propfind, PUBLIC_ROOT)
        .header("Depth", "0")
        .body(
            XML_CONTENT_TYPE,
            propfind_body(std::iter::once(displayname.as_str())).into_bytes(),
        );

    match discovery::fetch_optional(client, request)? {
        Some(response) => Ok(response.url.trim_end_matches('/').to_owned()),
        None => {
            warn!("{} Public folders not available", client.log_prefix());
            Ok(PUBLIC_ROOT.to_owned())
        }
    }
}

/// Run one `Cmd=galfind` request.
fn galfind(
    client: &mut HttpClient,
    base: &str,
    query: &str,
) -> Result<Vec<BTreeMap<String, String>>, Error> {
    let url = format!("{}?Cmd=galfind{}", encode_path(base), query);
    let response = client.get(&url)?.check()?;
    let entries = parse_galfind(&response.body)?;
    debug!(
        "{} {}: {} result(s)",
        client.log_prefix(),
        url,
        entries.len()
    );
    Ok(entries)
}

/// Determine the user's address when neither the options page nor the
/// mail path gave it away.
fn build_email(
    client: &mut HttpClient,
    mailbox_name: Option<&str>,
    identity: &LoginIdentity,
    host: &str,
    galfind_base: &str,
    galfind_enabled: &mut bool,
) -> Result<(String, String), Error> {
    let login_alias = identity.alias().unwrap_or_else(|| identity.login());
    if let Some(name) = mailbox_name {
        if name.contains('@') {
            return Ok((login_alias.to_owned(), name.to_owned()));
        }
    }

    let alias = mailbox_name.unwrap_or(login_alias).to_owned();
    if *galfind_enabled {
        if let Some(query) = gal::galfind_query("imapUid", &alias) {
            match galfind(client, galfind_base, &query) {
                Ok(entries) => {
                    let email = entries
                        .into_iter()
                        .find(|entry| {
                            entry
                                .get("AN")
                                .map_or(false, |an| an.eq_ignore_ascii_case(&alias))
                        })
                        .and_then(|mut entry| entry.remove("EM"));
                    if let Some(email) = email {
                        return Ok((alias, email));
                    }
                }
                Err(e) if e.is_connectivity() => return Err(e),
                Err(Error::Interrupted) => return Err(Error::Interrupted),
                Err(e) => {
                    debug!(
                        "{} galfind not available: {}",
                        client.log_prefix(),
                        e
                    );
                    *galfind_enabled = false;
                }
            }
        }
    }

    let email = discovery::fallback_email(&alias, host);
    debug!(
        "{} Unable to look up email of {}, assuming {}",
        client.log_prefix(),
        alias,
        email
    );
    Ok((alias, email))
}

/// Read the well-known folder URLs off the mailbox root. Failure here means
/// WebDAV is not usable.
fn load_well_known(
    client: &mut HttpClient,
    mail_path: &str,
) -> Result<BTreeMap<WellKnown, String>, Error> {
    let properties: Vec<(WellKnown, String)> = ALL_WELL_KNOWN
        .iter()
        .filter_map(|&wk| {
            wk.dav_property()
                .map(|property| (wk, format!("{}{}", HTTPMAIL, property)))
        })
        .collect();

    let responses = match propfind(
        client,
        mail_path,
        properties.iter().map(|&(_, ref uri)| uri.as_str()),
    ) {
        Ok(responses) => responses,
        Err(e) if e.is_connectivity() => return Err(e),
        Err(Error::Interrupted) => return Err(Error::Interrupted),
        Err(e) => {
            return Err(Error::ServerError(format!(
                "WebDAV not available at {}: {}",
                mail_path, e
            )))
        }
    };
    let response = responses.into_iter().next().ok_or_else(|| {
        Error::ServerError(format!("WebDAV not available at {}", mail_path))
    })?;

    let mut well_known = BTreeMap::new();
    for (wk, uri) in properties {
        if let Some(url) = response.get(&uri).filter(|url| !url.is_empty()) {
            let path = decode_href(url).trim_end_matches('/').to_owned();
            debug!("{} {:?} is {}", client.log_prefix(), wk, path);
            well_known.insert(wk, path);
        }
    }
    Ok(well_known)
}

impl Backend for DavBackend {
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
        let url = self.folder_url(path);
        let response =
            propfind_attributes(&mut self.client, &url, super::FOLDER_ATTRIBUTES)?;
        Ok(Folder::from_properties(
            path.to_owned(),
            &properties_of(&response, super::FOLDER_ATTRIBUTES),
        ))
    }

    fn find_folders(
        &mut self,
        path: &str,
        condition: &Condition,
        recursive: bool,
    ) -> Result<Vec<Folder>, Error> {
        let public = matches!(paths::resolve(path, &self.info), FolderRef::Public(_));
        let filter = Condition::and(vec![
            Condition::is_true("isfolder"),
            Condition::is_false("ishidden"),
            condition.clone(),
        ]);

        let url = self.folder_url(path);
        let responses = self.search(
            &url,
            super::FOLDER_ATTRIBUTES,
            &filter,
            recursive && !public,
            0,
        )?;

        let mut folders = Vec::with_capacity(responses.len());
        for response in &responses {
            let folder = self.folder_from(response);
            // Deep traversal is not supported on public folders
            if public && recursive {
                self.client.interrupt().check()?;
                let children = self.find_folders(&folder.path, condition, true)?;
                folders.push(folder);
                folders.extend(children);
            } else {
                folders.push(folder);
            }
        }
        Ok(folders)
    }

    fn search_items(
        &mut self,
        path: &str,
        attributes: &[&str],
        condition: &Condition,
        max: u32,
    ) -> Result<Vec<ItemRecord>, Error> {
        let condition = Condition::and(vec![
            Condition::is_false("isfolder"),
            Condition::is_false("ishidden"),
            condition.clone(),
        ]);
        let url = self.folder_url(path);
        Ok(self
            .search(&url, attributes, &condition, false, max)?
            .into_iter()
            .map(|response| record_from(response, attributes))
            .collect())
    }

    fn get_item(
        &mut self,
        path: &str,
        name: &str,
        attributes: &[&str],
    ) -> Result<ItemRecord, Error> {
        let url = paths::join(&self.folder_url(path), name);
        let response = propfind_attributes(&mut self.client, &url, attributes)?;
        Ok(record_from(response, attributes))
    }

    fn get_content(&mut self, href: &str) -> Result<Vec<u8>, Error> {
        let request = Request::get(href).header("Translate", "f");
        Ok(self.client.fetch(request)?.check()?.body)
    }

    fn get_properties(
        &mut self,
        href: &str,
        attributes: &[&str],
    ) -> Result<Properties, Error> {
        let response = propfind_attributes(&mut self.client, href, attributes)?;
        Ok(properties_of(&response, attributes))
    }

    fn delete_item(&mut self, href: &str) -> Result<(), Error> {
        match self.client.fetch(Request::new(Method::Delete, href))?.check() {
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
        _op: CompareOp,
        value: &str,
    ) -> Result<Vec<Contact>, Error> {
        if !self.galfind_enabled {
            return Ok(Vec::new());
        }
        let query = match gal::galfind_query(field, value) {
            Some(query) => query,
            None => return Ok(Vec::new()),
        };

        let base = self.galfind_base().to_owned();
        match galfind(&mut self.client, &base, &query) {
            Ok(entries) => {
                Ok(entries.iter().filter_map(gal::galfind_contact).collect())
            }
            Err(e) => {
                if !e.is_connectivity() {
                    warn!(
                        "{} Disabling directory search: {}",
                        self.client.log_prefix(),
                        e
                    );
                    self.galfind_enabled = false;
                }
                Err(e)
            }
        }
    }

    fn format_search_date(&self, date: DateTime<Utc>) -> String {
        date.format("%Y/%m/%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::super::test_info;
    use super::*;
    use crate::transport::fake::{path_of, FakeTransport, RequestLog};
    use crate::transport::Response;

    const HOST: &str = "https://mail.example.com";

    fn multistatus(responses: &[(&str, &[(&str, &str, &str)])]) -> String {
        let mut body = String::from(
            "<?xml version=\"1.0\"?>\n<a:multistatus xmlns:a=\"DAV:\">",
        );
        for &(href, props) in responses {
            body.push_str(&format!(
                "<a:response><a:href>{}</a:href><a:propstat>\
                 <a:status>HTTP/1.1 200 OK</a:status><a:prop>",
                href
            ));
            for (ix, &(ns, local, value)) in props.iter().enumerate() {
                body.push_str(&format!(
                    "<p{ix}:{local} xmlns:p{ix}=\"{ns}\">{value}</p{ix}:{local}>",
                    ix = ix,
                    ns = ns,
                    local = local,
                    value = value
                ));
            }
            body.push_str("</a:prop></a:propstat></a:response>");
        }
        body.push_str("</a:multistatus>");
        body
    }

    fn well_known_body(mailbox: &str) -> String {
        let base = format!("{}{}", HOST, mailbox);
        multistatus(&[(
            &base,
            &[
                (HTTPMAIL, "inbox", &format!("{}Inbox/", base)),
                (HTTPMAIL, "deleteditems", &format!("{}Deleted%20Items/", base)),
                (HTTPMAIL, "sentitems", &format!("{}Sent%20Items/", base)),
                (HTTPMAIL, "calendar", &format!("{}Calendar/", base)),
            ],
        )])
    }

    fn client(
        handler: impl FnMut(&Request) -> Result<Response, Error> + 'static,
    ) -> (HttpClient, RequestLog) {
        crate::init_test_log();
        let (transport, log) = FakeTransport::new(handler);
        let client = HttpClient::new(
            Box::new(transport),
            &format!("{}/owa/", HOST),
            "test".to_owned(),
            LogPrefix::new("test".to_owned()),
        )
        .unwrap();
        (client, log)
    }

    fn authenticated(landing: &str) -> Authenticated {
        Authenticated {
            landing: Response::new(200, format!("{}/owa/", HOST)).with_body(landing),
            identity: LoginIdentity::parse("CORP\\jdoe"),
            basic: false,
        }
    }

    fn respond(request: &Request, status: u16, body: String) -> Result<Response, Error> {
        Ok(Response::new(status, request.url.clone()).with_body(body))
    }

    #[test]
    fn detect_exchange_2007() {
        let (mut client, log) = client(|request| {
            match (request.method, path_of(request).as_str()) {
                (Method::Get, "/owa/?ae=Options&t=About") => respond(
                    request,
                    200,
                    "<td>/o=Example/ou=Site/cn=Recipients/cn=jdoe<br>\
                     John Doe [john.doe@example.com]</td>"
                        .to_owned(),
                ),
                (Method::Propfind, "/public") => respond(request, 404, String::new()),
                (Method::Propfind, "/exchange/john.doe@example.com/") => respond(
                    request,
                    207,
                    well_known_body("/exchange/john.doe@example.com/"),
                ),
                _ => respond(request, 500, String::new()),
            }
        });

        let setup = DavBackend::detect(&mut client, &authenticated("<html/>")).unwrap();
        assert_eq!(ServerVersion::Exchange2007, setup.info.version);
        assert_eq!("jdoe", setup.info.alias);
        assert_eq!("john.doe@example.com", setup.info.email);
        assert_eq!("/exchange/john.doe@example.com/", setup.info.mail_path);
        assert_eq!("/exchange/", setup.info.root_path);
        assert_eq!(PUBLIC_ROOT, setup.public_url);
        assert_eq!(
            Some("/exchange/john.doe@example.com/Deleted Items"),
            setup.well_known.get(&WellKnown::Trash).map(String::as_str)
        );
        assert!(!setup.well_known.contains_key(&WellKnown::Contacts));

        let requests = log.borrow();
        let body = requests[2].body_text();
        assert!(body.contains("xmlns:p0=\"urn:schemas:httpmail:\""));
        assert_eq!(Some("0"), requests[2].header_value("Depth"));
    }

    #[test]
    fn detect_exchange_2003_with_galfind() {
        let (mut client, _) = client(|request| {
            match (request.method, path_of(request).as_str()) {
                (Method::Propfind, "/public") => respond(request, 207, multistatus(&[])),
                (Method::Get, "/exchange/jdoe/?Cmd=galfind&AN=jdoe") => respond(
                    request,
                    200,
                    "<xml><item><AN>jdoe</AN><EM>john.doe@example.com</EM></item></xml>"
                        .to_owned(),
                ),
                (Method::Propfind, "/exchange/jdoe/") => {
                    respond(request, 207, well_known_body("/exchange/jdoe/"))
                }
                _ => respond(request, 500, String::new()),
            }
        });

        let setup = DavBackend::detect(
            &mut client,
            &authenticated(
                "<html><head><base href=\"https://mail.example.com/exchange/jdoe/\">",
            ),
        )
        .unwrap();
        assert_eq!(ServerVersion::Exchange2003, setup.info.version);
        assert_eq!("/exchange/jdoe/", setup.info.mail_path);
        assert_eq!("jdoe", setup.info.alias);
        assert_eq!("john.doe@example.com", setup.info.email);
        assert_eq!(format!("{}/public", HOST), setup.public_url);
        assert!(setup.galfind_enabled);
    }

    #[test]
    fn detect_without_webdav_fails() {
        let (mut client, _) = client(|request| {
            match (request.method, path_of(request).as_str()) {
                (Method::Get, "/owa/?ae=Options&t=About") => {
                    respond(request, 200, String::new())
                }
                _ => respond(request, 404, String::new()),
            }
        });

        assert_matches!(
            Err(Error::ServerError(..)),
            DavBackend::detect(&mut client, &authenticated("<html/>"))
        );
    }

    fn backend(
        handler: impl FnMut(&Request) -> Result<Response, Error> + 'static,
    ) -> (DavBackend, RequestLog) {
        let (client, log) = client(handler);
        let mut well_known = BTreeMap::new();
        well_known.insert(WellKnown::Inbox, "/exchange/jdoe/Boîte".to_owned());
        well_known.insert(WellKnown::Sent, "/exchange/jdoe/Sent Items".to_owned());
        let backend = DavBackend::new(
            client,
            DavSetup {
                info: test_info(),
                public_url: PUBLIC_ROOT.to_owned(),
                well_known,
                galfind_enabled: true,
            },
        );
        (backend, log)
    }

    #[test]
    fn folder_paths() {
        let (backend, _) = backend(|request| respond(request, 500, String::new()));

        assert_eq!("/exchange/jdoe/Boîte/Sub", backend.folder_url("INBOX/Sub"));
        assert_eq!("/exchange/jdoe/Sent Items", backend.folder_url("Sent"));
        assert_eq!("/exchange/jdoe/Archive", backend.folder_url("Archive"));
        assert_eq!("/exchange/jdoe/Trash", backend.folder_url("Trash"));
        assert_eq!(
            "/exchange/boss/Boîte",
            backend.folder_url("/users/boss/inbox")
        );
        assert_eq!(
            "/exchange/jdoe/calendar",
            backend.folder_url("/users/JDOE/calendar")
        );
        assert_eq!("/public/Team", backend.folder_url("/public/Team"));
        assert_eq!("/exchange/", backend.folder_url("/users/"));

        assert_eq!(
            "INBOX/Sub",
            backend.logical_path("https://mail.example.com/exchange/jdoe/Bo%C3%AEte/Sub/")
        );
        assert_eq!(
            "Sent",
            backend.logical_path("/exchange/jdoe/Sent%20Items/")
        );
        assert_eq!("Archive", backend.logical_path("/exchange/jdoe/Archive"));
        assert_eq!("", backend.logical_path("/exchange/jdoe/"));
        assert_eq!("/public/Team", backend.logical_path("/public/Team/"));

        assert_eq!("/a%20b%23c%3F%25", encode_path("/a b#c?%"));
    }

    #[test]
    fn search_request_and_records() {
        let body = multistatus(&[
            (
                "/exchange/jdoe/Boîte/b.EML",
                &[
                    ("http://schemas.microsoft.com/mapi/proptag/", "x0e230003", "11"),
                    ("http://schemas.microsoft.com/exchange/", "permanenturl", "/perm/b"),
                    ("urn:schemas:httpmail:", "read", "1"),
                ],
            ),
            (
                "/exchange/jdoe/Boîte/a.EML",
                &[("http://schemas.microsoft.com/mapi/proptag/", "x0e230003", "10")],
            ),
        ]);
        let (mut backend, log) =
            backend(move |request| respond(request, 207, body.clone()));

        let records = backend
            .search_items("INBOX", &["imapUid", "read", "bogus"], &Condition::equals("read", "1"), 5)
            .unwrap();
        assert_eq!(2, records.len());
        assert_eq!("/exchange/jdoe/Boîte/b.EML", records[0].href);
        assert_eq!(Some("11"), records[0].properties.get("imapUid").map(String::as_str));
        assert_eq!(Some("/perm/b"), records[0].properties.get("permanenturl").map(String::as_str));
        assert_eq!(Some("1"), records[0].properties.get("read").map(String::as_str));
        assert_eq!(None, records[1].properties.get("read"));

        let requests = log.borrow();
        let request = &requests[0];
        assert_eq!(Method::Search, request.method);
        assert_eq!("/exchange/jdoe/Bo%C3%AEte", path_of(request));
        assert_eq!(Some("rows=0-4"), request.header_value("Range"));
        let sql = request.body_text();
        assert!(sql.contains(
            "SELECT &quot;http://schemas.microsoft.com/exchange/permanenturl&quot;,\
             &quot;http://schemas.microsoft.com/mapi/proptag/x0e230003&quot;,\
             &quot;urn:schemas:httpmail:read&quot; FROM"
        ));
        assert!(sql.contains(
            "FROM SCOPE(&apos;SHALLOW TRAVERSAL OF \
             &quot;/exchange/jdoe/Boîte&quot;&apos;) WHERE ("
        ));
        assert!(sql.contains("&quot;DAV:isfolder&quot;"));
        assert!(sql.contains("&quot;urn:schemas:httpmail:read&quot; = "));
        assert!(sql.ends_with(
            "ORDER BY &quot;http://schemas.microsoft.com/mapi/proptag/x0e230003&quot; DESC\
             </d:sql></d:searchrequest>"
        ));

        assert_matches!(
            Err(Error::InvalidQuery(..)),
            backend.search_items("INBOX", &[], &Condition::equals("bogus", "1"), 0)
        );
    }

    #[test]
    fn folders_and_content() {
        let (mut backend, log) = backend(|request| {
            match (request.method, path_of(request).as_str()) {
                (Method::Propfind, "/exchange/jdoe/Archive") => respond(
                    request,
                    207,
                    multistatus(&[(
                        "/exchange/jdoe/Archive/",
                        &[
                            ("DAV:", "displayname", "Archive"),
                            ("http://schemas.microsoft.com/repl/", "contenttag", "ct9"),
                            ("DAV:", "hassubs", "1"),
                        ],
                    )]),
                ),
                (Method::Search, "/exchange/jdoe/Archive") => respond(
                    request,
                    207,
                    multistatus(&[(
                        "/exchange/jdoe/Archive/2019/",
                        &[("DAV:", "displayname", "2019")],
                    )]),
                ),
                (Method::Get, "/exchange/jdoe/Archive/m.EML") => {
                    respond(request, 200, "Subject: x\r\n\r\nbody".to_owned())
                }
                (Method::Delete, _) => respond(request, 404, String::new()),
                _ => respond(request, 404, String::new()),
            }
        });

        let folder = backend.get_folder("Archive").unwrap();
        assert_eq!("Archive", folder.path);
        assert_eq!(Some("ct9"), folder.ctag.as_deref());
        assert!(folder.has_children);

        let children = backend
            .find_folders("Archive", &Condition::empty(), true)
            .unwrap();
        assert_eq!(1, children.len());
        assert_eq!("Archive/2019", children[0].path);
        assert!(log.borrow()[1].body_text().contains("DEEP TRAVERSAL"));

        assert_eq!(
            b"Subject: x\r\n\r\nbody".to_vec(),
            backend.get_content("/exchange/jdoe/Archive/m.EML").unwrap()
        );
        assert_eq!(Some("f"), log.borrow()[2].header_value("Translate"));
        assert_matches!(
            Err(Error::NotFound(..)),
            backend.get_content("/exchange/jdoe/Archive/gone.EML")
        );
        assert!(backend.delete_item("/exchange/jdoe/Archive/gone.EML").is_ok());
        assert_matches!(Err(Error::NotFound(..)), backend.get_folder("Nowhere"));
    }

    #[test]
    fn public_folders_are_listed_one_level_at_a_time() {
        let (mut backend, log) = backend(|request| {
            let body = match path_of(request).as_str() {
                "/public" => multistatus(&[(
                    "/public/Team/",
                    &[("DAV:", "displayname", "Team")],
                )]),
                "/public/Team" => multistatus(&[(
                    "/public/Team/Minutes/",
                    &[("DAV:", "displayname", "Minutes")],
                )]),
                _ => multistatus(&[]),
            };
            respond(request, 207, body)
        });

        let folders = backend
            .find_folders("/public", &Condition::empty(), true)
            .unwrap();
        let paths: Vec<&str> =
            folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(vec!["/public/Team", "/public/Team/Minutes"], paths);

        let requests = log.borrow();
        assert_eq!(3, requests.len());
        for request in requests.iter() {
            assert!(request.body_text().contains("SHALLOW TRAVERSAL"));
        }
    }

    #[test]
    fn galfind_failure_disables_lookups() {
        let fail = Rc::new(RefCell::new(false));
        let fail2 = Rc::clone(&fail);
        let (mut backend, log) = backend(move |request| {
            if *fail2.borrow() {
                return respond(request, 500, String::new());
            }
            respond(
                request,
                200,
                "<xml><item><AN>jdoe</AN><DN>John Doe</DN>\
                 <EM>jdoe@example.com</EM></item></xml>"
                    .to_owned(),
            )
        });

        let found = backend
            .gal_lookup("cn", CompareOp::Contains, "John")
            .unwrap();
        assert_eq!(1, found.len());
        assert_eq!("jdoe", found[0].name());
        assert_eq!(
            "/exchange/jdoe/?Cmd=galfind&DN=John",
            path_of(&log.borrow()[0])
        );

        *fail.borrow_mut() = true;
        assert_matches!(
            Err(Error::ServerError(..)),
            backend.gal_lookup("cn", CompareOp::Contains, "John")
        );
        assert!(backend
            .gal_lookup("cn", CompareOp::Contains, "John")
            .unwrap()
            .is_empty());
        assert_eq!(2, log.borrow().len());
    }

    #[test]
    fn search_date_format() {
        let (backend, _) = backend(|request| respond(request, 500, String::new()));
        assert_eq!(
            "2020/01/02 03:04:05",
            backend.format_search_date(Utc.ymd(2020, 1, 2).and_hms(3, 4, 5))
        );
    }
}
