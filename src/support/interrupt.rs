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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::Error;

/// An interrupt flag shared between a session and whatever owns the client
/// connection.
///
/// The front-end raises it (e.g. when the client disconnects or sends IDLE
/// DONE); multi-page operations poll it between pages. Observing the flag
/// clears it, so one raise aborts exactly one operation.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Return `Err(Error::Interrupted)` if the flag has been raised since the
    /// last check, clearing it in the process.
    pub fn check(&self) -> Result<(), Error> {
        if self.raised.swap(false, Ordering::SeqCst) {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn raise_is_observed_once() {
        let interrupt = Interrupt::new();
        let other = interrupt.clone();
        assert!(interrupt.check().is_ok());
        other.raise();
        assert_matches!(Err(Error::Interrupted), interrupt.check());
        assert!(interrupt.check().is_ok());
    }
}
