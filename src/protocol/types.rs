//! Link-layer address types

use std::fmt;
use std::str::FromStr;

/// Ethernet MAC address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseMacAddrError {
    #[error("MAC address must have 6 octets")]
    Length,
    #[error("invalid hex octet {0:?} in MAC address")]
    Octet(String),
}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts "00:11:22:33:44:55" or "00-11-22-33-44-55".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let parts: Vec<&str> = s.trim().split(sep).collect();
        if parts.len() != 6 {
            return Err(ParseMacAddrError::Length);
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseMacAddrError::Octet(part.to_string()));
            }
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| ParseMacAddrError::Octet(part.into()))?;
        }
        Ok(MacAddr(octets))
    }
}

/// Link-layer address carried in a Source/Target Link-Layer Address option.
///
/// The bytes are the option payload as it appears on the wire, padding
/// up to the 8-octet boundary included. The proxy never interprets them
/// beyond comparing and copying.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LinkAddr(Vec<u8>);

impl LinkAddr {
    /// Zero-pads `bytes` so that, with the 2-byte option header, they
    /// fill whole 8-octet units. A 6-byte MAC stays as it is.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        let padded = (bytes.len() + 2).div_ceil(8) * 8 - 2;
        bytes.resize(padded, 0);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<MacAddr> for LinkAddr {
    fn from(mac: MacAddr) -> Self {
        Self(mac.0.to_vec())
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(octets) = <[u8; 6]>::try_from(self.0.as_slice()) {
            return fmt::Display::fmt(&MacAddr(octets), f);
        }
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
