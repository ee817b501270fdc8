//! Ethernet II and 802.1Q header construction and parsing
//!
//! CFM PDUs ride directly on Ethernet with EtherType 0x8902, optionally
//! behind a single VLAN tag. This module builds and strips those headers;
//! the PDU itself is left to the protocol codecs.

use bytes::{BufMut, BytesMut};
use cfm_core::types::ethertypes;
use cfm_core::MacAddr;
use std::fmt;

/// EtherType values relevant to CFM frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    /// CFM / Y.1731 OAM (0x8902)
    Cfm,
    /// C-tag (0x8100)
    Dot1Q,
    /// S-tag (0x88A8)
    Dot1ad,
    /// Legacy S-tag (0x9100)
    QinQLegacy,
    /// Custom EtherType
    Custom(u16),
}

impl EtherType {
    /// Convert EtherType to u16 value
    pub fn to_u16(self) -> u16 {
        match self {
            EtherType::Cfm => ethertypes::CFM,
            EtherType::Dot1Q => ethertypes::DOT1Q,
            EtherType::Dot1ad => ethertypes::DOT1AD,
            EtherType::QinQLegacy => ethertypes::QINQ_LEGACY,
            EtherType::Custom(val) => val,
        }
    }

    /// Create EtherType from u16 value
    pub fn from_u16(value: u16) -> Self {
        match value {
            ethertypes::CFM => EtherType::Cfm,
            ethertypes::DOT1Q => EtherType::Dot1Q,
            ethertypes::DOT1AD => EtherType::Dot1ad,
            ethertypes::QINQ_LEGACY => EtherType::QinQLegacy,
            val => EtherType::Custom(val),
        }
    }

    /// Whether this value announces a VLAN tag
    pub fn is_vlan_tpid(self) -> bool {
        matches!(
            self,
            EtherType::Dot1Q | EtherType::Dot1ad | EtherType::QinQLegacy
        )
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::Cfm => write!(f, "CFM"),
            EtherType::Dot1Q => write!(f, "802.1Q"),
            EtherType::Dot1ad => write!(f, "802.1ad"),
            EtherType::QinQLegacy => write!(f, "Q-in-Q"),
            EtherType::Custom(val) => write!(f, "0x{:04X}", val),
        }
    }
}

/// A single VLAN tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    pub tpid: u16,
    pub pcp: u8,
    pub dei: bool,
    pub vid: u16,
}

impl VlanTag {
    /// Tag size on the wire
    pub const SIZE: usize = 4;

    pub fn new(tpid: u16, pcp: u8, vid: u16) -> Self {
        Self {
            tpid,
            pcp,
            dei: false,
            vid,
        }
    }

    /// Tag Control Information: PCP (3 bits), DEI (1 bit), VID (12 bits)
    pub fn tci(&self) -> u16 {
        ((self.pcp as u16 & 0x07) << 13) | ((self.dei as u16) << 12) | (self.vid & 0x0FFF)
    }

    fn from_tci(tpid: u16, tci: u16) -> Self {
        Self {
            tpid,
            pcp: (tci >> 13) as u8,
            dei: tci & 0x1000 != 0,
            vid: tci & 0x0FFF,
        }
    }
}

/// Ethernet II header with an optional VLAN tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination MAC address
    pub destination: MacAddr,
    /// Source MAC address
    pub source: MacAddr,
    /// Outer VLAN tag, if any
    pub vlan: Option<VlanTag>,
    /// EtherType of the payload
    pub ethertype: EtherType,
}

impl EthernetHeader {
    /// Untagged header size (dst + src + type)
    pub const HEADER_SIZE: usize = 14;

    /// Minimum Ethernet frame size (without FCS)
    pub const MIN_FRAME_SIZE: usize = 60;

    pub fn new(destination: MacAddr, source: MacAddr, ethertype: EtherType) -> Self {
        Self {
            destination,
            source,
            vlan: None,
            ethertype,
        }
    }

    pub fn with_vlan(mut self, tag: VlanTag) -> Self {
        self.vlan = Some(tag);
        self
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        Self::HEADER_SIZE + if self.vlan.is_some() { VlanTag::SIZE } else { 0 }
    }

    /// Headers are never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Append the header to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self.destination.as_bytes());
        buf.put_slice(self.source.as_bytes());

        if let Some(tag) = self.vlan {
            buf.put_u16(tag.tpid);
            buf.put_u16(tag.tci());
        }

        buf.put_u16(self.ethertype.to_u16());
    }

    /// Parse a header from the start of `data`
    ///
    /// Returns the header and the offset of the payload. At most one VLAN tag
    /// is stripped.
    pub fn parse(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < Self::HEADER_SIZE {
            return None;
        }

        let destination = mac_at(data, 0)?;
        let source = mac_at(data, 6)?;
        let mut offset = 12;
        let mut vlan = None;

        let mut ethertype = EtherType::from_u16(u16::from_be_bytes([data[12], data[13]]));
        if ethertype.is_vlan_tpid() {
            if data.len() < Self::HEADER_SIZE + VlanTag::SIZE {
                return None;
            }

            let tci = u16::from_be_bytes([data[14], data[15]]);
            vlan = Some(VlanTag::from_tci(ethertype.to_u16(), tci));
            ethertype = EtherType::from_u16(u16::from_be_bytes([data[16], data[17]]));
            offset += VlanTag::SIZE;
        }

        offset += 2;

        Some((
            EthernetHeader {
                destination,
                source,
                vlan,
                ethertype,
            },
            offset,
        ))
    }
}

fn mac_at(data: &[u8], offset: usize) -> Option<MacAddr> {
    let bytes: [u8; 6] = data.get(offset..offset + 6)?.try_into().ok()?;
    Some(MacAddr(bytes))
}
