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

//! Compilation of conditions into the WHERE clause of the WebDAV SEARCH
//! SQL dialect.

use super::field::{dav_header_locator, FieldRegistry};
use super::{
    encode_urlcompname, CompareOp, Condition, Literal, LogicOp, UnaryOp,
};
use crate::support::error::Error;

const DELETED_FIELD: &str = "deleted";

#[derive(Clone, Copy, Debug)]
pub struct DavCompiler<'a> {
    registry: &'a FieldRegistry,
    exchange2003: bool,
}

impl<'a> DavCompiler<'a> {
    pub fn new(registry: &'a FieldRegistry) -> Self {
        DavCompiler {
            registry,
            exchange2003: false,
        }
    }

    /// Exchange 2003 has no boolean `deleted` property; tests on it are
    /// rewritten to compare against `"1"` instead.
    pub fn exchange2003(self, exchange2003: bool) -> Self {
        DavCompiler {
            exchange2003,
            ..self
        }
    }

    /// Render `condition`. An empty condition renders as the empty string.
    pub fn compile(&self, condition: &Condition) -> Result<String, Error> {
        let mut out = String::new();
        self.append(&mut out, condition)?;
        Ok(out)
    }

    fn append(
        &self,
        out: &mut String,
        condition: &Condition,
    ) -> Result<(), Error> {
        match *condition {
            Condition::Multi { op, ref children } => {
                let mut first = true;
                for child in Condition::effective_children(children) {
                    if first {
                        out.push('(');
                        first = false;
                    } else {
                        out.push_str(match op {
                            LogicOp::And => " AND ",
                            LogicOp::Or => " OR ",
                        });
                    }
                    self.append(out, child)?;
                }
                if !first {
                    out.push(')');
                }
            }

            Condition::Not(ref child) => {
                if !child.is_empty() {
                    out.push_str("(Not ");
                    self.append(out, child)?;
                    out.push(')');
                }
            }

            Condition::Unary {
                ref field,
                op: UnaryOp::IsTrue,
            } if self.exchange2003 && DELETED_FIELD == field => {
                self.append(out, &Condition::equals(field, "1"))?
            }

            Condition::Unary {
                ref field,
                op: UnaryOp::IsFalse,
            } if self.exchange2003 && DELETED_FIELD == field => self.append(
                out,
                &Condition::or(vec![
                    Condition::equals(field, "0"),
                    Condition::is_null(field),
                ]),
            )?,

            Condition::Unary { ref field, op } => {
                self.append_unary(out, field, op)?
            }

            Condition::Attribute {
                ref field,
                op,
                ref value,
            } => self.append_attribute(out, field, op, value)?,

            Condition::Header {
                ref header,
                op,
                ref value,
            } => {
                out.push('"');
                out.push_str(&dav_header_locator(header));
                out.push('"');
                out.push_str(operator(op));
                out.push('\'');
                if CompareOp::Contains == op {
                    out.push('%');
                }
                out.push_str(&search_encode(value));
                if matches!(op, CompareOp::Contains | CompareOp::StartsWith) {
                    out.push('%');
                }
                out.push('\'');
            }
        }

        Ok(())
    }

    fn append_unary(
        &self,
        out: &mut String,
        field: &str,
        op: UnaryOp,
    ) -> Result<(), Error> {
        let def = self.registry.get(field)?;
        out.push('"');
        out.push_str(&def.locator);
        out.push('"');
        out.push_str(match op {
            UnaryOp::IsNull => " is null",
            UnaryOp::IsTrue => " = true",
            UnaryOp::IsFalse => " = false",
        });
        Ok(())
    }

    fn append_attribute(
        &self,
        out: &mut String,
        field: &str,
        op: CompareOp,
        value: &Literal,
    ) -> Result<(), Error> {
        let def = self.registry.get(field)?;
        let quoted = !value.is_int() && !def.is_int();

        out.push('"');
        out.push_str(&def.locator);
        out.push('"');
        out.push_str(operator(op));

        if def.cast.is_some() {
            out.push_str("CAST (\"");
        } else if quoted {
            out.push('\'');
        }
        if CompareOp::Contains == op {
            out.push('%');
        }

        let text = value.as_text();
        if "urlcompname" == field {
            out.push_str(&encode_urlcompname(&search_encode(&text)));
        } else if def.is_int() {
            // Clients send arbitrary text here; anything non-numeric
            // degrades to 0 rather than failing the whole search.
            match text.parse::<i32>() {
                Ok(_) => out.push_str(&text),
                Err(_) => out.push('0'),
            }
        } else {
            out.push_str(&search_encode(&text));
        }

        if matches!(op, CompareOp::Contains | CompareOp::StartsWith) {
            out.push('%');
        }
        if let Some(ref cast) = def.cast {
            out.push_str("\" as '");
            out.push_str(cast);
            out.push_str("')");
        } else if quoted {
            out.push('\'');
        }

        Ok(())
    }
}

fn operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::IsEqualTo => " = ",
        CompareOp::IsGreaterThanOrEqualTo => " >= ",
        CompareOp::IsGreaterThan => " > ",
        CompareOp::IsLessThanOrEqualTo => " <= ",
        CompareOp::IsLessThan => " < ",
        CompareOp::Contains | CompareOp::StartsWith => " like ",
    }
}

/// Escape a string literal for the SEARCH SQL dialect.
pub fn search_encode(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod test {
    use super::super::field::FieldDef;
    use super::*;

    fn identity_registry() -> FieldRegistry {
        FieldRegistry::new()
            .with("folderclass", FieldDef::string("folderclass"))
            .with("count", FieldDef::int("count"))
    }

    #[test]
    fn folder_class_filter() {
        let registry = identity_registry();
        let compiler = DavCompiler::new(&registry);
        let condition = Condition::or(vec![
            Condition::equals("folderclass", "IPF.Note"),
            Condition::is_null("folderclass"),
        ]);

        assert_eq!(
            "(\"folderclass\" = 'IPF.Note' OR \"folderclass\" is null)",
            compiler.compile(&condition).unwrap()
        );
    }

    #[test]
    fn empty_conditions_render_nothing() {
        let compiler = DavCompiler::new(FieldRegistry::dav());
        assert_eq!("", compiler.compile(&Condition::empty()).unwrap());
        assert_eq!(
            "",
            compiler
                .compile(&Condition::or(vec![
                    Condition::and(Vec::new()),
                    Condition::not(Condition::empty()),
                ]))
                .unwrap()
        );

        // Empty children are skipped, not rendered as true
        assert_eq!(
            "(\"DAV:isfolder\" = false)",
            compiler
                .compile(&Condition::and(vec![
                    Condition::empty(),
                    Condition::is_false("isfolder"),
                ]))
                .unwrap()
        );
    }

    #[test]
    fn builtin_field_rendering() {
        let compiler = DavCompiler::new(FieldRegistry::dav());

        assert_eq!(
            "(\"DAV:isfolder\" = false AND \"DAV:ishidden\" = false \
             AND (\"urn:schemas:contacts:cn\" like '%O''Brien%' \
             OR \"urn:schemas:contacts:sn\" like 'jo%'))",
            compiler
                .compile(&Condition::and(vec![
                    Condition::is_false("isfolder"),
                    Condition::is_false("ishidden"),
                    Condition::or(vec![
                        Condition::contains("cn", "O'Brien"),
                        Condition::starts_with("sn", "jo"),
                    ]),
                ]))
                .unwrap()
        );

        assert_eq!(
            "\"urn:schemas:calendar:dtend\" > \
             CAST (\"2024-01-01T00:00:00Z\" as 'dateTime.tz')",
            compiler
                .compile(&Condition::gt("dtend", "2024-01-01T00:00:00Z"))
                .unwrap()
        );

        assert_eq!(
            "(Not \"urn:schemas:calendar:instancetype\" = 1)",
            compiler
                .compile(&Condition::not(Condition::equals_int(
                    "instancetype",
                    1
                )))
                .unwrap()
        );

        assert_eq!(
            "\"urn:schemas:mailheader:message-id\" = '<a@b>'",
            compiler
                .compile(&Condition::header_equals("message-id", "<a@b>"))
                .unwrap()
        );

        assert_eq!(
            "\"http://schemas.microsoft.com/mapi/proptag/x10f3001f\" = \
             'a_xF8FF_b.EML'",
            compiler
                .compile(&Condition::equals("urlcompname", "a/b.EML"))
                .unwrap()
        );
    }

    #[test]
    fn unparsable_numbers_become_zero() {
        let compiler = DavCompiler::new(FieldRegistry::dav());
        assert_eq!(
            "\"http://schemas.microsoft.com/mapi/proptag/x0e230003\" >= 0",
            compiler
                .compile(&Condition::gte("imapUid", "12abc"))
                .unwrap()
        );
        assert_eq!(
            "\"http://schemas.microsoft.com/mapi/proptag/x0e230003\" >= 42",
            compiler.compile(&Condition::gte("imapUid", "42")).unwrap()
        );
    }

    #[test]
    fn exchange2003_deleted_flag() {
        let registry = FieldRegistry::dav();
        let deleted = registry.get("deleted").unwrap().locator.clone();

        let modern = DavCompiler::new(registry);
        assert_eq!(
            format!("\"{}\" = true", deleted),
            modern.compile(&Condition::is_true("deleted")).unwrap()
        );

        let legacy = DavCompiler::new(registry).exchange2003(true);
        assert_eq!(
            format!("\"{}\" = '1'", deleted),
            legacy.compile(&Condition::is_true("deleted")).unwrap()
        );
        assert_eq!(
            format!("(\"{0}\" = '0' OR \"{0}\" is null)", deleted),
            legacy.compile(&Condition::is_false("deleted")).unwrap()
        );
        assert_eq!(
            format!("\"{}\" is null", deleted),
            legacy.compile(&Condition::is_null("deleted")).unwrap()
        );
    }

    #[test]
    fn unknown_field_rejected() {
        let compiler = DavCompiler::new(FieldRegistry::dav());
        assert_matches!(
            Err(Error::InvalidQuery(..)),
            compiler.compile(&Condition::and(vec![
                Condition::is_null("cn"),
                Condition::equals("bogus", "x"),
            ]))
        );
    }
}
