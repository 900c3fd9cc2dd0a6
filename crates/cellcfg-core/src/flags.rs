//! Flag words carried by the header, memory regions and the console.
//!
//! Each flag word is a closed set: bits outside the known mask are a format
//! error at load time rather than being carried along silently.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

macro_rules! flag_word {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) {
            $( $(#[$fmeta:meta])* $flag:ident = $value:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name {
            bits: $repr,
        }

        impl $name {
            /// No flags set.
            pub const NONE: $name = $name { bits: 0 };

            $( $(#[$fmeta])* pub const $flag: $name = $name { bits: $value }; )*

            /// Every bit this word may legally carry.
            pub const KNOWN_MASK: $repr = 0 $( | $value )*;

            /// Build from raw bits, rejecting unknown bits.
            pub fn from_bits(bits: $repr) -> Option<Self> {
                if bits & !Self::KNOWN_MASK == 0 {
                    Some(Self { bits })
                } else {
                    None
                }
            }

            pub fn bits(&self) -> $repr {
                self.bits
            }

            /// True if every bit of `other` is set.
            pub fn contains(&self, other: $name) -> bool {
                self.bits & other.bits == other.bits
            }

            /// True if any bit of `other` is set.
            pub fn intersects(&self, other: $name) -> bool {
                self.bits & other.bits != 0
            }

            pub fn insert(&mut self, other: $name) {
                self.bits |= other.bits;
            }

            pub fn remove(&mut self, other: $name) {
                self.bits &= !other.bits;
            }

            pub fn is_empty(&self) -> bool {
                self.bits == 0
            }

            fn named() -> &'static [(&'static str, $name)] {
                &[ $( (stringify!($flag), $name::$flag) ),* ]
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name { bits: self.bits | rhs.bits }
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.bits |= rhs.bits;
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut rest = self.bits;
                let mut first = true;
                for (label, flag) in Self::named() {
                    if flag.bits != 0 && rest & flag.bits == flag.bits {
                        if !first {
                            f.write_str("|")?;
                        }
                        f.write_str(label)?;
                        rest &= !flag.bits;
                        first = false;
                    }
                }
                if rest != 0 {
                    if !first {
                        f.write_str("|")?;
                    }
                    write!(f, "{rest:#x}")?;
                } else if first {
                    f.write_str("NONE")?;
                }
                Ok(())
            }
        }
    };
}

flag_word! {
    /// Cell-wide flags from the descriptor header.
    CellFlags(u32) {
        /// The cell only uses the comm region passively (no handshake).
        PASSIVE_COMMREG = 0x0000_0001;
        TEST_DEVICE = 0x0000_0002;
        AARCH32 = 0x0000_0004;
        VIRTUAL_CONSOLE_PERMITTED = 0x4000_0000;
        VIRTUAL_CONSOLE_ACTIVE = 0x8000_0000;
    }
}

flag_word! {
    /// Access and role flags of a memory region.
    MemFlags(u64) {
        READ = 0x0001;
        WRITE = 0x0002;
        EXECUTE = 0x0004;
        DMA = 0x0008;
        IO = 0x0010;
        /// Hypervisor-to-cell communication page.
        COMM_REGION = 0x0020;
        LOADABLE = 0x0040;
        /// Duplicate projection of a root-cell region.
        ROOTSHARED = 0x0080;
        NO_HUGEPAGES = 0x0100;
        IO_UNALIGNED = 0x8000;
        IO_8 = 0x1_0000;
        IO_16 = 0x2_0000;
        IO_32 = 0x4_0000;
        IO_64 = 0x8_0000;
    }
}

impl MemFlags {
    /// Access-width restriction bits of an IO region.
    pub const IO_WIDTH_MASK: u64 = 0xf_0000;

    /// Whether any IO access-width bit is set.
    pub fn has_io_width(&self) -> bool {
        self.bits & Self::IO_WIDTH_MASK != 0
    }
}

flag_word! {
    /// Console access flags.
    ConsoleFlags(u16) {
        /// MMIO access; cleared means port IO.
        ACCESS_MMIO = 0x0001;
        /// 4-byte register distance; cleared means 1 byte.
        REGDIST_4 = 0x0002;
        FB_1920X1080 = 0x0004;
        /// Clear instead of set the clock gate.
        INVERTED_GATE = 0x1000;
    }
}
