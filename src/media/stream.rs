//! Stream endpoints and transport sets

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// One payloader output of a media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    /// Index `N` of the `payN` element
    pub index: u32,
    /// Name of the payloader element
    pub payloader: String,
    /// Name of the pad exposed on the media's bin
    pub pad: String,
}

impl MediaStream {
    /// Stream for payloader `payN`
    pub fn new(index: u32, payloader: impl Into<String>) -> Self {
        Self {
            index,
            payloader: payloader.into(),
            pad: format!("pay{}", index),
        }
    }
}

/// Set of lower transports a media may be streamed over
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LowerTransport(u8);

impl LowerTransport {
    pub const UDP: Self = Self(0b001);
    pub const UDP_MCAST: Self = Self(0b010);
    pub const TCP: Self = Self(0b100);

    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every transport
    pub const fn all() -> Self {
        Self(0b111)
    }

    /// Whether all transports in `other` are in this set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for LowerTransport {
    fn default() -> Self {
        Self::UDP | Self::TCP
    }
}

impl BitOr for LowerTransport {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LowerTransport {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for LowerTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::UDP) {
            names.push("UDP");
        }
        if self.contains(Self::UDP_MCAST) {
            names.push("UDP_MCAST");
        }
        if self.contains(Self::TCP) {
            names.push("TCP");
        }
        if names.is_empty() {
            f.write_str("LowerTransport(empty)")
        } else {
            write!(f, "LowerTransport({})", names.join(" | "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transports() {
        let t = LowerTransport::default();

        assert!(t.contains(LowerTransport::UDP));
        assert!(t.contains(LowerTransport::TCP));
        assert!(!t.contains(LowerTransport::UDP_MCAST));
        assert_eq!(format!("{:?}", t), "LowerTransport(UDP | TCP)");
    }

    #[test]
    fn test_stream_pad_name() {
        let stream = MediaStream::new(1, "pay1");

        assert_eq!(stream.pad, "pay1");
    }
}
