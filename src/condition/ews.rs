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

//! Compilation of conditions into EWS `Restriction` search expressions.

use quick_xml::escape::escape;

use super::field::{ews_header_locator, FieldRegistry};
use super::{
    encode_urlcompname, CompareOp, Condition, Literal, LogicOp, UnaryOp,
};
use crate::support::error::Error;

#[derive(Clone, Copy, Debug)]
pub struct EwsCompiler<'a> {
    registry: &'a FieldRegistry,
    exchange2010: bool,
}

impl<'a> EwsCompiler<'a> {
    pub fn new(registry: &'a FieldRegistry) -> Self {
        EwsCompiler {
            registry,
            exchange2010: false,
        }
    }

    /// Exchange 2010 cannot search Internet headers directly. Header tests
    /// are rewritten into substring matches on the corresponding message
    /// property, or on the raw transport headers.
    pub fn exchange2010(self, exchange2010: bool) -> Self {
        EwsCompiler {
            exchange2010,
            ..self
        }
    }

    /// Render the search expression for `condition`, without the enclosing
    /// `Restriction` element. An empty condition renders as the empty
    /// string.
    pub fn compile(&self, condition: &Condition) -> Result<String, Error> {
        let mut out = String::new();
        self.append(&mut out, condition)?;
        Ok(out)
    }

    /// Render a complete `<m:Restriction>`, or `None` if the condition is
    /// empty and the request must not filter at all.
    pub fn restriction(
        &self,
        condition: &Condition,
    ) -> Result<Option<String>, Error> {
        if condition.is_empty() {
            return Ok(None);
        }

        Ok(Some(format!(
            "<m:Restriction>{}</m:Restriction>",
            self.compile(condition)?
        )))
    }

    fn append(
        &self,
        out: &mut String,
        condition: &Condition,
    ) -> Result<(), Error> {
        match *condition {
            Condition::Multi { op, ref children } => {
                let children = Condition::effective_children(children);
                let name = match op {
                    LogicOp::And => "And",
                    LogicOp::Or => "Or",
                };
                let wrap = children.len() > 1;

                if wrap {
                    out.push_str("<t:");
                    out.push_str(name);
                    out.push('>');
                }
                for child in children {
                    self.append(out, child)?;
                }
                if wrap {
                    out.push_str("</t:");
                    out.push_str(name);
                    out.push('>');
                }
            }

            Condition::Not(ref child) => {
                if !child.is_empty() {
                    out.push_str("<t:Not>");
                    self.append(out, child)?;
                    out.push_str("</t:Not>");
                }
            }

            Condition::Unary {
                ref field,
                op: UnaryOp::IsNull,
            } => {
                out.push_str("<t:Not><t:Exists>");
                out.push_str(&self.registry.get(field)?.locator);
                out.push_str("</t:Exists></t:Not>");
            }

            Condition::Unary {
                ref field,
                op: UnaryOp::IsTrue,
            } => self.append_attribute(
                out,
                field,
                CompareOp::IsEqualTo,
                &Literal::Text("true".to_owned()),
            )?,

            Condition::Unary {
                ref field,
                op: UnaryOp::IsFalse,
            } => self.append_attribute(
                out,
                field,
                CompareOp::IsEqualTo,
                &Literal::Text("false".to_owned()),
            )?,

            Condition::Attribute {
                ref field,
                op,
                ref value,
            } => self.append_attribute(out, field, op, value)?,

            Condition::Header {
                ref header,
                ref value,
                ..
            } => self.append_header(out, header, value)?,
        }

        Ok(())
    }

    fn append_header(
        &self,
        out: &mut String,
        header: &str,
        value: &str,
    ) -> Result<(), Error> {
        let header = header.to_ascii_lowercase();
        if !self.exchange2010 {
            return self.append_comparison(
                out,
                &ews_header_locator(&escape(header.as_str())),
                CompareOp::Contains,
                &escape(value),
            );
        }

        let (field, value) = match header.as_str() {
            "from" | "to" | "cc" => {
                (format!("msg{}", header), value.to_owned())
            }
            "message-id" | "bcc" => (header.clone(), value.to_owned()),
            _ => (
                "messageheaders".to_owned(),
                format!("{}: {}", header, value),
            ),
        };
        self.append_attribute(
            out,
            &field,
            CompareOp::Contains,
            &Literal::Text(value),
        )
    }

    fn append_attribute(
        &self,
        out: &mut String,
        field: &str,
        op: CompareOp,
        value: &Literal,
    ) -> Result<(), Error> {
        let def = self.registry.get(field)?;
        let text = value.as_text();

        let rendered = if "urlcompname" == field {
            escape(encode_urlcompname(&text).as_str()).into_owned()
        } else if def.is_int() {
            match text.parse::<i32>() {
                Ok(_) => text.into_owned(),
                Err(_) => "0".to_owned(),
            }
        } else {
            escape(text.as_ref()).into_owned()
        };

        self.append_comparison(out, &def.locator, op, &rendered)
    }

    /// Emit one comparison element. `value` must already be escaped.
    fn append_comparison(
        &self,
        out: &mut String,
        locator: &str,
        op: CompareOp,
        value: &str,
    ) -> Result<(), Error> {
        let name = match op {
            CompareOp::IsEqualTo => "IsEqualTo",
            CompareOp::IsGreaterThan => "IsGreaterThan",
            CompareOp::IsGreaterThanOrEqualTo => "IsGreaterThanOrEqualTo",
            CompareOp::IsLessThan => "IsLessThan",
            CompareOp::IsLessThanOrEqualTo => "IsLessThanOrEqualTo",
            CompareOp::Contains | CompareOp::StartsWith => "Contains",
        };
        let containment =
            matches!(op, CompareOp::Contains | CompareOp::StartsWith);

        out.push_str("<t:");
        out.push_str(name);
        if containment {
            out.push_str(if CompareOp::StartsWith == op {
                " ContainmentMode=\"Prefixed\""
            } else {
                " ContainmentMode=\"Substring\""
            });
            out.push_str(" ContainmentComparison=\"IgnoreCase\"");
        }
        out.push('>');
        out.push_str(locator);
        if !containment {
            out.push_str("<t:FieldURIOrConstant>");
        }
        out.push_str("<t:Constant Value=\"");
        out.push_str(value);
        out.push_str("\"/>");
        if !containment {
            out.push_str("</t:FieldURIOrConstant>");
        }
        out.push_str("</t:");
        out.push_str(name);
        out.push('>');

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SUBJECT: &str = "<t:FieldURI FieldURI=\"item:Subject\"/>";
    const FOLDER_CLASS: &str = "<t:FieldURI FieldURI=\"folder:FolderClass\"/>";

    #[test]
    fn folder_class_filter() {
        let compiler = EwsCompiler::new(FieldRegistry::ews());
        let condition = Condition::or(vec![
            Condition::equals("folderclass", "IPF.Note"),
            Condition::is_null("folderclass"),
        ]);

        assert_eq!(
            format!(
                "<t:Or><t:IsEqualTo>{0}<t:FieldURIOrConstant>\
                 <t:Constant Value=\"IPF.Note\"/></t:FieldURIOrConstant>\
                 </t:IsEqualTo><t:Not><t:Exists>{0}</t:Exists></t:Not></t:Or>",
                FOLDER_CLASS
            ),
            compiler.compile(&condition).unwrap()
        );
    }

    #[test]
    fn single_child_is_not_wrapped() {
        let compiler = EwsCompiler::new(FieldRegistry::ews());
        let condition = Condition::and(vec![
            Condition::empty(),
            Condition::contains("subject", "a<b"),
            Condition::or(Vec::new()),
        ]);

        assert_eq!(
            format!(
                "<t:Contains ContainmentMode=\"Substring\" \
                 ContainmentComparison=\"IgnoreCase\">{}\
                 <t:Constant Value=\"a&lt;b\"/></t:Contains>",
                SUBJECT
            ),
            compiler.compile(&condition).unwrap()
        );
    }

    #[test]
    fn empty_condition_has_no_restriction() {
        let compiler = EwsCompiler::new(FieldRegistry::ews());
        assert_eq!(None, compiler.restriction(&Condition::empty()).unwrap());
        assert_eq!(
            "",
            compiler
                .compile(&Condition::not(Condition::or(vec![
                    Condition::empty()
                ])))
                .unwrap()
        );
        assert_eq!(
            Some(format!(
                "<m:Restriction><t:Not><t:IsEqualTo>{}\
                 <t:FieldURIOrConstant><t:Constant Value=\"true\"/>\
                 </t:FieldURIOrConstant></t:IsEqualTo></t:Not>\
                 </m:Restriction>",
                "<t:FieldURI FieldURI=\"message:IsRead\"/>"
            )),
            compiler
                .restriction(&Condition::not(Condition::is_true("read")))
                .unwrap()
        );
    }

    #[test]
    fn prefix_and_numeric_literals() {
        let compiler = EwsCompiler::new(FieldRegistry::ews());
        let uid = &FieldRegistry::ews().get("imapUid").unwrap().locator;

        assert_eq!(
            format!(
                "<t:IsGreaterThan>{}<t:FieldURIOrConstant>\
                 <t:Constant Value=\"0\"/></t:FieldURIOrConstant>\
                 </t:IsGreaterThan>",
                uid
            ),
            compiler.compile(&Condition::gt("imapUid", "n/a")).unwrap()
        );
        assert_eq!(
            format!(
                "<t:Contains ContainmentMode=\"Prefixed\" \
                 ContainmentComparison=\"IgnoreCase\">{}\
                 <t:Constant Value=\"Re:\"/></t:Contains>",
                SUBJECT
            ),
            compiler
                .compile(&Condition::starts_with("subject", "Re:"))
                .unwrap()
        );
    }

    #[test]
    fn header_search() {
        let plain = EwsCompiler::new(FieldRegistry::ews());
        assert_eq!(
            "<t:Contains ContainmentMode=\"Substring\" \
             ContainmentComparison=\"IgnoreCase\">\
             <t:ExtendedFieldURI DistinguishedPropertySetId=\"InternetHeaders\" \
             PropertyName=\"x-mailer\" PropertyType=\"String\"/>\
             <t:Constant Value=\"mutt\"/></t:Contains>",
            plain
                .compile(&Condition::header_equals("X-Mailer", "mutt"))
                .unwrap()
        );

        let legacy = EwsCompiler::new(FieldRegistry::ews()).exchange2010(true);
        let headers =
            &FieldRegistry::ews().get("messageheaders").unwrap().locator;
        assert_eq!(
            format!(
                "<t:Contains ContainmentMode=\"Substring\" \
                 ContainmentComparison=\"IgnoreCase\">{}\
                 <t:Constant Value=\"x-mailer: mutt\"/></t:Contains>",
                headers
            ),
            legacy
                .compile(&Condition::header_equals("X-Mailer", "mutt"))
                .unwrap()
        );

        let from = &FieldRegistry::ews().get("msgfrom").unwrap().locator;
        assert!(legacy
            .compile(&Condition::header_equals("from", "bob"))
            .unwrap()
            .contains(from.as_str()));
    }
}
