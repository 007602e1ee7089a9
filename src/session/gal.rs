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

//! Directory (global address list) search.
//!
//! Neither backend can evaluate an arbitrary condition against the
//! directory. Each can only look up one attribute/value pair at a time, so
//! the condition tree is walked here: disjunctions become a union of
//! lookups, conjunctions look up their first term and filter the result
//! locally with the remaining ones.

use std::collections::BTreeMap;

use log::debug;

use crate::condition::{CompareOp, Condition, Literal, LogicOp};
use crate::mailbox::{Contact, Item, Properties};
use crate::support::error::Error;
use crate::support::interrupt::Interrupt;

/// Logical contact fields the OWA `galfind` command can search on, with
/// the query parameter for each.
const GALFIND_CRITERIA: &[(&str, &str)] = &[
    ("imapUid", "AN"),
    ("smtpemail1", "EM"),
    ("cn", "DN"),
    ("givenName", "FN"),
    ("sn", "LN"),
    ("title", "TL"),
    ("o", "CP"),
    ("l", "OF"),
    ("department", "DP"),
];

/// Logical contact fields filled in from `galfind` result entries.
const GALFIND_ATTRIBUTES: &[(&str, &str)] = &[
    ("uid", "AN"),
    ("smtpemail1", "EM"),
    ("cn", "DN"),
    ("displayName", "DN"),
    ("telephoneNumber", "PH"),
    ("l", "OFFICE"),
    ("o", "CP"),
    ("title", "TL"),
    ("givenName", "first"),
    ("initials", "initials"),
    ("sn", "last"),
    ("street", "street"),
    ("st", "state"),
    ("postalcode", "zip"),
    ("co", "country"),
    ("department", "department"),
    ("mobile", "mobile"),
    ("roomnumber", "office"),
];

/// Build the query string suffix (`&XX=value...`) for one `galfind`
/// lookup, or `None` if the field is not searchable.
///
/// E-mail addresses are not searchable as such; the local part is assumed
/// to be `first.last` and searched by name instead.
pub fn galfind_query(field: &str, value: &str) -> Option<String> {
    let criterion = GALFIND_CRITERIA
        .iter()
        .find(|&&(name, _)| name == field)
        .map(|&(_, criterion)| criterion)?;

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    if "EM" == criterion {
        let local = value.split('@').next().unwrap_or(value);
        match local.find('.') {
            Some(dot) => {
                query.append_pair("FN", &local[..dot]);
                query.append_pair("LN", &local[dot + 1..]);
            }
            None => {
                query.append_pair("FN", local);
            }
        }
    } else {
        query.append_pair(criterion, value);
    }
    Some(format!("&{}", query.finish()))
}

/// Turn one `galfind` result entry into a contact named by its alias.
pub fn galfind_contact(entry: &BTreeMap<String, String>) -> Option<Contact> {
    let alias = entry.get("AN")?;
    let mut properties = Properties::new();
    properties.insert("imapUid".to_owned(), alias.clone());
    for &(field, code) in GALFIND_ATTRIBUTES {
        if let Some(value) = entry.get(code) {
            properties.insert(field.to_owned(), value.clone());
        }
    }
    Some(Contact::new(Item::new("", alias.as_str()), properties))
}

/// Run `condition` against the directory.
///
/// `lookup` performs one backend request for a single field comparison.
/// The interrupt is observed before every lookup. Results are keyed by
/// lower-case contact name; at most `size_limit` are returned if it is
/// non-zero.
pub fn gal_find(
    condition: &Condition,
    size_limit: usize,
    interrupt: &Interrupt,
    lookup: &mut dyn FnMut(&str, CompareOp, &str) -> Result<Vec<Contact>, Error>,
) -> Result<BTreeMap<String, Contact>, Error> {
    let mut results = BTreeMap::new();
    walk(condition, interrupt, lookup, &mut results)?;

    if size_limit > 0 && results.len() > size_limit {
        if let Some(first_dropped) = results.keys().nth(size_limit).cloned() {
            let _ = results.split_off(&first_dropped);
        }
    }
    Ok(results)
}

fn walk(
    condition: &Condition,
    interrupt: &Interrupt,
    lookup: &mut dyn FnMut(&str, CompareOp, &str) -> Result<Vec<Contact>, Error>,
    results: &mut BTreeMap<String, Contact>,
) -> Result<(), Error> {
    match *condition {
        Condition::Multi {
            op: LogicOp::Or,
            ref children,
        } => {
            for child in children.iter().filter(|c| !c.is_empty()) {
                walk(child, interrupt, lookup, results)?;
            }
        }

        Condition::Multi {
            op: LogicOp::And,
            ref children,
        } => {
            if let Some(first) = children.iter().find(|c| !c.is_empty()) {
                let mut candidates = BTreeMap::new();
                walk(first, interrupt, lookup, &mut candidates)?;
                results.extend(
                    candidates
                        .into_iter()
                        .filter(|&(_, ref contact)| condition.matches(contact)),
                );
            }
        }

        Condition::Attribute {
            ref field,
            op,
            ref value,
        } => {
            interrupt.check()?;
            let value = match *value {
                Literal::Text(ref text) => text.clone(),
                Literal::Int(i) => i.to_string(),
            };
            for contact in lookup(field, op, &value)? {
                if condition.matches(&contact) {
                    results.insert(contact.name().to_lowercase(), contact);
                }
            }
        }

        _ => debug!("Directory search ignores condition {:?}", condition),
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;

    fn contact(alias: &str, fields: &[(&str, &str)]) -> Contact {
        let mut properties = Properties::new();
        for &(k, v) in fields {
            properties.insert(k.to_owned(), v.to_owned());
        }
        Contact::new(Item::new("", alias), properties)
    }

    fn directory() -> Vec<Contact> {
        vec![
            contact(
                "jdoe",
                &[("cn", "John Doe"), ("givenName", "John"), ("sn", "Doe")],
            ),
            contact("jsmith", &[("cn", "Jane Smith"), ("sn", "Smith")]),
            contact("asmith", &[("cn", "Alan Smith")]),
        ]
    }

    fn run(
        condition: &Condition,
        size_limit: usize,
    ) -> (Result<BTreeMap<String, Contact>, Error>, Vec<String>) {
        let calls = RefCell::new(Vec::new());
        let result = gal_find(
            condition,
            size_limit,
            &Interrupt::new(),
            &mut |field, _, value| {
                calls.borrow_mut().push(format!("{}={}", field, value));
                let wanted = Condition::contains(field, value);
                Ok(directory()
                    .into_iter()
                    .filter(|c| wanted.matches(c))
                    .collect())
            },
        );
        (result, calls.into_inner())
    }

    #[test]
    fn or_is_union_of_lookups() {
        let (result, calls) = run(
            &Condition::or(vec![
                Condition::contains("cn", "john"),
                Condition::contains("cn", "alan"),
            ]),
            0,
        );
        let result = result.unwrap();
        assert_eq!(vec!["asmith", "jdoe"], result.keys().collect::<Vec<_>>());
        assert_eq!(vec!["cn=john", "cn=alan"], calls);
    }

    #[test]
    fn and_filters_first_lookup_locally() {
        let (result, calls) = run(
            &Condition::and(vec![
                Condition::contains("cn", "smith"),
                Condition::contains("cn", "jane"),
            ]),
            0,
        );
        assert_eq!(
            vec!["jsmith"],
            result.unwrap().keys().collect::<Vec<_>>()
        );
        assert_eq!(vec!["cn=smith"], calls);
    }

    #[test]
    fn given_name_falls_back_to_display_name() {
        let (result, _) = run(&Condition::contains("givenName", "alan"), 0);
        assert_eq!(
            vec!["asmith"],
            result.unwrap().keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn size_limit_applies() {
        let (result, _) = run(&Condition::contains("cn", "s"), 1);
        assert_eq!(1, result.unwrap().len());
    }

    #[test]
    fn size_limit_keeps_lowest_names() {
        let (result, _) = run(&Condition::contains("cn", "Smith"), 1);
        let names: Vec<String> = result.unwrap().into_keys().collect();
        assert_eq!(vec!["asmith".to_owned()], names);

        let (result, _) = run(&Condition::contains("cn", "Smith"), 5);
        assert_eq!(2, result.unwrap().len());
    }

    #[test]
    fn size_limit_on_large_result() {
        let result = gal_find(
            &Condition::contains("cn", "user"),
            10_000,
            &Interrupt::new(),
            &mut |_, _, _| {
                Ok((0..20_000)
                    .map(|i| {
                        contact(&format!("user{:05}", i), &[("cn", "user")])
                    })
                    .collect())
            },
        )
        .unwrap();
        assert_eq!(10_000, result.len());
        assert_eq!(Some("user00000"), result.keys().next().map(|k| &k[..]));
        assert_eq!(Some("user09999"), result.keys().last().map(|k| &k[..]));
    }

    #[test]
    fn interrupt_between_lookups() {
        let interrupt = Interrupt::new();
        let mut calls = 0;
        let result = gal_find(
            &Condition::or(vec![
                Condition::contains("cn", "a"),
                Condition::contains("cn", "b"),
            ]),
            0,
            &interrupt,
            &mut |_, _, _| {
                calls += 1;
                interrupt.raise();
                Ok(Vec::new())
            },
        );
        assert_matches!(Err(Error::Interrupted), result);
        assert_eq!(1, calls);
    }

    #[test]
    fn galfind_queries() {
        assert_eq!(Some("&DN=Doe%2C+John".to_owned()), galfind_query("cn", "Doe, John"));
        assert_eq!(
            Some("&FN=john&LN=doe".to_owned()),
            galfind_query("smtpemail1", "john.doe@example.com")
        );
        assert_eq!(
            Some("&FN=jdoe".to_owned()),
            galfind_query("smtpemail1", "jdoe@example.com")
        );
        assert_eq!(None, galfind_query("keywords", "x"));
    }

    #[test]
    fn galfind_entries() {
        let mut entry = BTreeMap::new();
        entry.insert("AN".to_owned(), "jdoe".to_owned());
        entry.insert("DN".to_owned(), "Doe, John".to_owned());
        entry.insert("EM".to_owned(), "jdoe@example.com".to_owned());

        let contact = galfind_contact(&entry).unwrap();
        assert_eq!("jdoe", contact.name());
        assert_eq!(Some("jdoe"), contact.get("imapUid"));
        assert_eq!(Some("Doe, John"), contact.get("cn"));
        assert_eq!(Some("jdoe@example.com"), contact.get("smtpemail1"));

        entry.remove("AN");
        assert!(galfind_contact(&entry).is_none());
    }
}
