//! NDP options (RFC 4861 Section 4.6)
//!
//! Options are a chain of `type | length | payload` records where length
//! counts 8-octet units including the two header bytes. [`OptionReader`]
//! walks the chain and never reads past the length an option declares.

use super::icmpv6::DecodeError;
use super::LinkAddr;

/// Source Link-Layer Address option type
pub const OPT_SOURCE_LINK_ADDR: u8 = 1;
/// Target Link-Layer Address option type
pub const OPT_TARGET_LINK_ADDR: u8 = 2;

/// Options are sized in units of 8 octets
const OPTION_UNIT: usize = 8;
const OPTION_HEADER_SIZE: usize = 2;

/// A single NDP option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdOption {
    SourceLinkAddr(LinkAddr),
    TargetLinkAddr(LinkAddr),
    /// Any other option, kept verbatim (payload after the 2-byte header)
    Unknown { kind: u8, data: Vec<u8> },
}

impl NdOption {
    pub fn kind(&self) -> u8 {
        match self {
            NdOption::SourceLinkAddr(_) => OPT_SOURCE_LINK_ADDR,
            NdOption::TargetLinkAddr(_) => OPT_TARGET_LINK_ADDR,
            NdOption::Unknown { kind, .. } => *kind,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            NdOption::SourceLinkAddr(addr) | NdOption::TargetLinkAddr(addr) => addr.as_bytes(),
            NdOption::Unknown { data, .. } => data,
        }
    }

    /// Size on the wire, header and padding included
    pub fn wire_len(&self) -> usize {
        (OPTION_HEADER_SIZE + self.payload().len()).div_ceil(OPTION_UNIT) * OPTION_UNIT
    }

    /// Append the encoded option to `buf`, zero-padding to the unit boundary.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let total = self.wire_len();
        debug_assert!(total / OPTION_UNIT <= u8::MAX as usize);

        let start = buf.len();
        buf.push(self.kind());
        buf.push((total / OPTION_UNIT) as u8);
        buf.extend_from_slice(self.payload());
        buf.resize(start + total, 0);
    }
}

/// Bounds-checked cursor over an option chain.
///
/// Yields one `Result` per option. The first malformed option ends the
/// iteration; callers collect into `Result<Vec<_>, _>` so a single bad
/// option rejects the whole packet.
#[derive(Debug)]
pub struct OptionReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> OptionReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn fail(&mut self, reason: &'static str) -> Option<Result<NdOption, DecodeError>> {
        self.pos = self.buf.len();
        Some(Err(DecodeError::Malformed(reason)))
    }
}

impl Iterator for OptionReader<'_> {
    type Item = Result<NdOption, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < OPTION_HEADER_SIZE {
            return self.fail("truncated option header");
        }

        let kind = rest[0];
        let len = rest[1] as usize * OPTION_UNIT;
        if len == 0 {
            return self.fail("zero-length option");
        }
        let Some(record) = rest.get(..len) else {
            return self.fail("option exceeds buffer");
        };

        let data = &record[OPTION_HEADER_SIZE..];
        self.pos += len;

        let option = match kind {
            OPT_SOURCE_LINK_ADDR => NdOption::SourceLinkAddr(LinkAddr::new(data)),
            OPT_TARGET_LINK_ADDR => NdOption::TargetLinkAddr(LinkAddr::new(data)),
            _ => NdOption::Unknown {
                kind,
                data: data.to_vec(),
            },
        };
        Some(Ok(option))
    }
}

/// Parse a complete option chain, rejecting it if any option is malformed.
pub fn parse_options(buf: &[u8]) -> Result<Vec<NdOption>, DecodeError> {
    OptionReader::new(buf).collect()
}

pub(crate) fn write_options(options: &[NdOption], buf: &mut Vec<u8>) {
    for option in options {
        option.write_to(buf);
    }
}

/// First Source Link-Layer Address in the chain
pub fn source_link_addr(options: &[NdOption]) -> Option<&LinkAddr> {
    options.iter().find_map(|o| match o {
        NdOption::SourceLinkAddr(addr) => Some(addr),
        _ => None,
    })
}

/// First Target Link-Layer Address in the chain
pub fn target_link_addr(options: &[NdOption]) -> Option<&LinkAddr> {
    options.iter().find_map(|o| match o {
        NdOption::TargetLinkAddr(addr) => Some(addr),
        _ => None,
    })
}

/// Replace the payload of every option of `kind` with `addr`.
///
/// Returns true if at least one option was rewritten.
pub fn rewrite_link_addr(options: &mut [NdOption], kind: u8, addr: &LinkAddr) -> bool {
    let mut rewritten = false;
    for option in options.iter_mut() {
        match option {
            NdOption::SourceLinkAddr(a) if kind == OPT_SOURCE_LINK_ADDR => {
                *a = addr.clone();
                rewritten = true;
            }
            NdOption::TargetLinkAddr(a) if kind == OPT_TARGET_LINK_ADDR => {
                *a = addr.clone();
                rewritten = true;
            }
            _ => {}
        }
    }
    rewritten
}
