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

//! Backend-neutral search conditions.
//!
//! Protocol front-ends build a `Condition` once; it is then either compiled
//! into one of the backend query languages (`dav`, `ews`) or evaluated
//! directly against an in-memory record (`matcher`).

pub mod dav;
pub mod ews;
pub mod field;
pub mod matcher;

use std::borrow::Cow;

pub use self::matcher::Record;

/// Binary comparison between a field and a literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    IsEqualTo,
    IsGreaterThan,
    IsGreaterThanOrEqualTo,
    IsLessThan,
    IsLessThanOrEqualTo,
    /// Case-insensitive substring match.
    Contains,
    /// Case-insensitive prefix match.
    StartsWith,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    IsNull,
    IsTrue,
    IsFalse,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Text(String),
    Int(i32),
}

impl Literal {
    pub fn as_text(&self) -> Cow<str> {
        match *self {
            Literal::Text(ref s) => Cow::Borrowed(s),
            Literal::Int(i) => Cow::Owned(i.to_string()),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(*self, Literal::Int(..))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    Attribute {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    Header {
        header: String,
        op: CompareOp,
        value: String,
    },
    Multi {
        op: LogicOp,
        children: Vec<Condition>,
    },
    Not(Box<Condition>),
    Unary {
        field: String,
        op: UnaryOp,
    },
}

impl Condition {
    /// Conjunction of `children`.
    ///
    /// Callers with optional parts pass an iterator of `Option<Condition>`
    /// through `.flatten()`; an absent child and an empty one are equivalent.
    pub fn and(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Multi {
            op: LogicOp::And,
            children: children.into_iter().collect(),
        }
    }

    pub fn or(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Multi {
            op: LogicOp::Or,
            children: children.into_iter().collect(),
        }
    }

    pub fn not(child: Condition) -> Self {
        Condition::Not(Box::new(child))
    }

    /// The empty condition, which filters nothing.
    pub fn empty() -> Self {
        Condition::and(Vec::new())
    }

    fn attribute(field: &str, op: CompareOp, value: Literal) -> Self {
        Condition::Attribute {
            field: field.to_owned(),
            op,
            value,
        }
    }

    pub fn equals(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::IsEqualTo,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn equals_int(field: &str, value: i32) -> Self {
        Condition::attribute(field, CompareOp::IsEqualTo, Literal::Int(value))
    }

    pub fn header_equals(header: &str, value: &str) -> Self {
        Condition::Header {
            header: header.to_owned(),
            op: CompareOp::IsEqualTo,
            value: value.to_owned(),
        }
    }

    pub fn gte(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::IsGreaterThanOrEqualTo,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn gt(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::IsGreaterThan,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn lte(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::IsLessThanOrEqualTo,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn lt(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::IsLessThan,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::Contains,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn starts_with(field: &str, value: &str) -> Self {
        Condition::attribute(
            field,
            CompareOp::StartsWith,
            Literal::Text(value.to_owned()),
        )
    }

    pub fn is_null(field: &str) -> Self {
        Condition::Unary {
            field: field.to_owned(),
            op: UnaryOp::IsNull,
        }
    }

    pub fn is_true(field: &str) -> Self {
        Condition::Unary {
            field: field.to_owned(),
            op: UnaryOp::IsTrue,
        }
    }

    pub fn is_false(field: &str) -> Self {
        Condition::Unary {
            field: field.to_owned(),
            op: UnaryOp::IsFalse,
        }
    }

    /// Whether this condition filters nothing.
    ///
    /// Only combinators can be empty: one is empty iff every child is.
    /// A negation is empty iff its child is.
    pub fn is_empty(&self) -> bool {
        match *self {
            Condition::Multi { ref children, .. } => {
                children.iter().all(Condition::is_empty)
            }
            Condition::Not(ref child) => child.is_empty(),
            Condition::Attribute { .. }
            | Condition::Header { .. }
            | Condition::Unary { .. } => false,
        }
    }

    /// The non-empty children of a combinator, in order.
    fn effective_children(children: &[Condition]) -> Vec<&Condition> {
        children.iter().filter(|c| !c.is_empty()).collect()
    }
}

/// Encode a URL component name the way the server stores it in
/// `urlcompname`.
pub fn encode_urlcompname(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '+' => out.push_str("%2B"),
            '#' => out.push_str("%23"),
            '&' => out.push_str("%26"),
            '/' => out.push_str("_xF8FF_"),
            ch => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emptiness_is_structural() {
        assert!(Condition::empty().is_empty());
        assert!(Condition::or(vec![
            Condition::and(Vec::new()),
            Condition::empty()
        ])
        .is_empty());
        assert!(Condition::not(Condition::empty()).is_empty());
        assert!(!Condition::and(vec![
            Condition::empty(),
            Condition::is_null("cn")
        ])
        .is_empty());
        assert!(!Condition::not(Condition::equals("a", "b")).is_empty());

        let maybe: Option<Condition> = None;
        assert!(Condition::and(maybe.into_iter()).is_empty());
    }

    #[test]
    fn urlcompname_encoding() {
        assert_eq!("a%25b_xF8FF_c%2B.EML", encode_urlcompname("a%b/c+.EML"));
        assert_eq!("plain.eml", encode_urlcompname("plain.eml"));
    }
}
