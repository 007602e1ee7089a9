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

use std::collections::BTreeMap;

/// IMAP keywords with a well-known Exchange category.
const BUILTIN: &[(&str, &str)] = &[
    ("$label1", "Important"),
    ("$label2", "Work"),
    ("$label3", "Personal"),
    ("$label4", "To Do"),
    ("$label5", "Later"),
];

/// Translates between IMAP keyword flags and Exchange keywords (categories).
///
/// Operator overrides from the `[imap_flags]` configuration table take
/// precedence over the built-in table. Anything found in neither is passed
/// through unchanged.
#[derive(Clone, Debug, Default)]
pub struct FlagMap {
    overrides: BTreeMap<String, String>,
}

impl FlagMap {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        FlagMap { overrides }
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(BUILTIN.iter().copied())
    }

    pub fn to_keyword(&self, flag: &str) -> String {
        self.entries()
            .find(|&(k, _)| k == flag)
            .map_or(flag, |(_, v)| v)
            .to_owned()
    }

    pub fn to_flag(&self, keyword: &str) -> String {
        self.entries()
            .find(|&(_, v)| v.eq_ignore_ascii_case(keyword))
            .map_or(keyword, |(k, _)| k)
            .to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_and_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("$label1".to_owned(), "Urgent".to_owned());
        overrides.insert("$Receipt".to_owned(), "Receipt".to_owned());
        let map = FlagMap::new(overrides);

        assert_eq!("Urgent", map.to_keyword("$label1"));
        assert_eq!("Work", map.to_keyword("$label2"));
        assert_eq!("Whatever", map.to_keyword("Whatever"));

        assert_eq!("$label1", map.to_flag("urgent"));
        assert_eq!("$label3", map.to_flag("Personal"));
        assert_eq!("$Receipt", map.to_flag("RECEIPT"));
        // Shadowed built-in entries still map back
        assert_eq!("$label1", map.to_flag("Important"));
        assert_eq!("Unmapped", map.to_flag("Unmapped"));
    }
}
