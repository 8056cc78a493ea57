//! Order flag bitmask
//!
//! Flags are independent bits and may be combined (e.g. `POST_ONLY | STP`).
//! Bits outside the known set are carried but ignored by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Time-in-force and matching modifiers carried on an order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    /// No modifiers.
    pub const NONE: Flags = Flags(0);
    /// Immediate-or-cancel: never rest the leftover after matching.
    pub const IOC: Flags = Flags(1 << 0);
    /// Fill-or-kill: fill in full during matching or do nothing at all.
    pub const FOK: Flags = Flags(1 << 1);
    /// Reject the order outright if it would trade on arrival.
    pub const POST_ONLY: Flags = Flags(1 << 2);
    /// Self-trade prevention: cancel same-user resting orders instead of
    /// trading against them.
    pub const STP: Flags = Flags(1 << 3);

    const KNOWN: u32 = Self::IOC.0 | Self::FOK.0 | Self::POST_ONLY.0 | Self::STP.0;

    /// Reconstruct from a raw bit pattern. Unknown bits are preserved.
    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit in `other` is set in `self`.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bits outside the known flag set (ignored by the engine).
    pub const fn unknown_bits(self) -> u32 {
        self.0 & !Self::KNOWN
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Flags(NONE)");
        }
        let mut names = Vec::new();
        if self.contains(Flags::IOC) {
            names.push("IOC");
        }
        if self.contains(Flags::FOK) {
            names.push("FOK");
        }
        if self.contains(Flags::POST_ONLY) {
            names.push("POST_ONLY");
        }
        if self.contains(Flags::STP) {
            names.push("STP");
        }
        if self.unknown_bits() != 0 {
            write!(f, "Flags({}|{:#x})", names.join("|"), self.unknown_bits())
        } else {
            write!(f, "Flags({})", names.join("|"))
        }
    }
}
