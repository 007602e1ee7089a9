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

use std::collections::{BTreeMap, HashMap};

use super::{CompareOp, Condition, LogicOp, UnaryOp};

/// Anything a `Condition` can be evaluated against locally.
///
/// Fields are looked up by their logical name, never a backend locator.
pub trait Record {
    fn field(&self, name: &str) -> Option<&str>;
}

impl Record for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Record for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Structured name fields some clients search on even though directory
/// lookups without a full record only carry the display name.
const NAME_FIELDS: &[&str] = &["givenName", "sn"];
const DISPLAY_NAME_FIELD: &str = "cn";

impl Condition {
    /// Evaluate this condition against `record`.
    ///
    /// An empty condition matches everything. Ordering comparisons and header
    /// tests cannot be evaluated locally and match nothing.
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        if self.is_empty() {
            return true;
        }

        match *self {
            Condition::Multi {
                op: LogicOp::And,
                ref children,
            } => Condition::effective_children(children)
                .into_iter()
                .all(|c| c.matches(record)),
            Condition::Multi {
                op: LogicOp::Or,
                ref children,
            } => Condition::effective_children(children)
                .into_iter()
                .any(|c| c.matches(record)),
            Condition::Not(ref child) => !child.matches(record),
            Condition::Unary { ref field, op } => {
                let actual = record.field(field);
                match op {
                    UnaryOp::IsNull => actual.is_none(),
                    UnaryOp::IsTrue => Some("true") == actual,
                    UnaryOp::IsFalse => Some("false") == actual,
                }
            }
            Condition::Attribute {
                ref field,
                op,
                ref value,
            } => {
                let (actual, op) = match record.field(field) {
                    Some(actual) => (actual, op),
                    None if NAME_FIELDS.contains(&field.as_str()) => {
                        match record.field(DISPLAY_NAME_FIELD) {
                            Some(actual) => (actual, CompareOp::Contains),
                            None => return false,
                        }
                    }
                    None => return false,
                };

                let actual = actual.to_lowercase();
                let expected = value.as_text().to_lowercase();
                match op {
                    CompareOp::IsEqualTo => actual == expected,
                    CompareOp::Contains => actual.contains(&expected),
                    CompareOp::StartsWith => actual.starts_with(&expected),
                    CompareOp::IsGreaterThan
                    | CompareOp::IsGreaterThanOrEqualTo
                    | CompareOp::IsLessThan
                    | CompareOp::IsLessThanOrEqualTo => false,
                }
            }
            Condition::Header { .. } => false,
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn record(fields: &[(&str, &str)]) -> BTreeMap<String, String> {
        fields
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn folder_class_filter_matches_missing_class() {
        let condition = Condition::or(vec![
            Condition::equals("folderclass", "IPF.Note"),
            Condition::is_null("folderclass"),
        ]);

        assert!(condition.matches(&record(&[])));
        assert!(condition.matches(&record(&[("folderclass", "ipf.note")])));
        assert!(!condition
            .matches(&record(&[("folderclass", "IPF.Appointment")])));
    }

    #[test]
    fn name_field_falls_back_to_display_name() {
        let jdoe = record(&[("cn", "John Doe"), ("uid", "jdoe")]);
        assert!(Condition::equals("givenName", "john").matches(&jdoe));
        assert!(Condition::starts_with("sn", "DOE").matches(&jdoe));
        assert!(!Condition::equals("givenName", "jane").matches(&jdoe));

        // The fallback is limited to the structured name fields
        assert!(!Condition::contains("title", "john").matches(&jdoe));

        // and only applies when the field itself is missing
        let with_given = record(&[("cn", "John Doe"), ("givenName", "Jon")]);
        assert!(!Condition::equals("givenName", "john").matches(&with_given));
    }

    #[test]
    fn truth_table() {
        let r = record(&[
            ("cn", "Alice Smith"),
            ("mail", "alice@example.com"),
            ("active", "true"),
            ("archived", "false"),
        ]);

        assert!(Condition::equals("mail", "ALICE@example.com").matches(&r));
        assert!(!Condition::equals("mail", "alice").matches(&r));
        assert!(Condition::contains("mail", "@EXAMPLE").matches(&r));
        assert!(Condition::starts_with("cn", "ali").matches(&r));
        assert!(!Condition::starts_with("cn", "smith").matches(&r));
        assert!(!Condition::equals("missing", "x").matches(&r));

        assert!(Condition::is_true("active").matches(&r));
        assert!(!Condition::is_false("active").matches(&r));
        assert!(Condition::is_false("archived").matches(&r));
        assert!(Condition::is_null("missing").matches(&r));
        assert!(!Condition::is_null("cn").matches(&r));

        assert!(!Condition::gt("cn", "a").matches(&r));
        assert!(!Condition::header_equals("from", "alice").matches(&r));

        assert!(Condition::and(vec![
            Condition::is_true("active"),
            Condition::contains("cn", "smith"),
        ])
        .matches(&r));
        assert!(!Condition::and(vec![
            Condition::is_true("active"),
            Condition::contains("cn", "jones"),
        ])
        .matches(&r));
        assert!(Condition::or(vec![
            Condition::contains("cn", "jones"),
            Condition::is_false("archived"),
        ])
        .matches(&r));
        assert!(Condition::not(Condition::contains("cn", "jones")).matches(&r));

        // Empty children are ignored rather than treated as false
        assert!(!Condition::or(vec![
            Condition::empty(),
            Condition::contains("cn", "jones"),
        ])
        .matches(&r));
        assert!(Condition::and(vec![
            Condition::empty(),
            Condition::contains("cn", "alice"),
        ])
        .matches(&r));
    }

    fn arb_leaf() -> impl Strategy<Value = Condition> {
        let field = prop_oneof![
            Just("cn"),
            Just("givenName"),
            Just("mail"),
            Just("flag")
        ];
        let value = prop_oneof![Just("a"), Just("ab"), Just("true"), Just("")];
        (field, value, 0..9u32).prop_map(|(field, value, kind)| match kind {
            0 => Condition::equals(field, value),
            1 => Condition::contains(field, value),
            2 => Condition::starts_with(field, value),
            3 => Condition::is_null(field),
            4 => Condition::is_true(field),
            5 => Condition::is_false(field),
            6 => Condition::gte(field, value),
            7 => Condition::header_equals(field, value),
            _ => Condition::equals_int(field, 1),
        })
    }

    fn arb_condition() -> impl Strategy<Value = Condition> {
        arb_leaf().prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4)
                    .prop_map(|c| Condition::and(c)),
                prop::collection::vec(inner.clone(), 1..4)
                    .prop_map(|c| Condition::or(c)),
                inner.prop_map(Condition::not),
            ]
        })
    }

    fn arb_record() -> impl Strategy<Value = BTreeMap<String, String>> {
        let value = prop_oneof![
            Just("a".to_owned()),
            Just("AB".to_owned()),
            Just("true".to_owned()),
            Just("false".to_owned()),
            Just("1".to_owned()),
        ];
        prop::collection::btree_map(
            prop_oneof![
                Just("cn".to_owned()),
                Just("givenName".to_owned()),
                Just("mail".to_owned()),
                Just("flag".to_owned()),
            ],
            value,
            0..4,
        )
    }

    proptest! {
        #[test]
        fn negation_is_exact_complement(
            condition in arb_condition(),
            record in arb_record(),
        ) {
            prop_assert!(!condition.is_empty());
            prop_assert_eq!(
                !condition.matches(&record),
                Condition::not(condition.clone()).matches(&record)
            );
        }

        #[test]
        fn empty_trees_match_everything(
            depth in 0..4usize,
            record in arb_record(),
        ) {
            let mut condition = Condition::empty();
            for i in 0..depth {
                condition = match i % 3 {
                    0 => Condition::or(vec![condition, Condition::empty()]),
                    1 => Condition::not(condition),
                    _ => Condition::and(vec![Condition::empty(), condition]),
                };
            }
            prop_assert!(condition.is_empty());
            prop_assert!(condition.matches(&record));
        }
    }
}
