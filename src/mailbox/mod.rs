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

//! The typed objects a session hands to protocol front-ends.
//!
//! Backends return loosely-typed property maps keyed by logical field name
//! (the same names `Condition`s use); everything here is built from those.

pub mod flags;
pub mod folder;
pub mod item;
pub mod message;

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

pub use self::flags::FlagMap;
pub use self::folder::Folder;
pub use self::item::{Contact, Event, Item};
pub use self::message::{Message, MessageContent, MessageFlags, MessageList};

/// Properties of one backend object, keyed by logical field name.
pub type Properties = BTreeMap<String, String>;

/// Identifies a message within a single folder for IMAP purposes.
///
/// The value comes from the server (`PR_INTERNET_ARTICLE_NUMBER`), which
/// sometimes reassigns it when a message is modified; `Folder` keeps the
/// first value seen for each message so that clients never observe the
/// change.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Uid {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Uid(NonZeroU32::new_unchecked(1)) };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The UIDNEXT implied by this being the greatest UID in a folder.
    pub fn successor(self) -> u64 {
        u64::from(self.0.get()) + 1
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}
