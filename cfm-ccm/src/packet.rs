//! CCM PDU Structures and Parsing
//!
//! Offsets below are relative to the first byte of the CFM PDU, i.e. right
//! after the EtherType. Received PDUs are validated in a fixed order; the
//! first failing rule is reported as a [`Rejection`].

use bytes::{BufMut, BytesMut};
use cfm_core::{
    CcmInterval, InterfaceStatus, MepId, OrganizationSpecificTlv, PortStatus, SenderId,
};
use thiserror::Error;

use crate::maid::{Maid, MAID_LEN};

/// CFM OpCode of a Continuity Check Message
pub const CFM_OPCODE_CCM: u8 = 1;

/// First TLV Offset carried in CCMs (sequence number, MEP id, MAID, Y.1731 area)
pub const FIRST_TLV_OFFSET: u8 = 70;

/// Common CFM header size
pub const CFM_HEADER_SIZE: usize = 4;

/// Offset of the sequence number
pub const SEQUENCE_NUMBER_OFFSET: usize = 4;

/// Offset of the MEP id
pub const MEP_ID_OFFSET: usize = 8;

/// Offset of the MAID
pub const MAID_OFFSET: usize = 10;

/// Offset of the first TLV in transmitted CCMs
pub const TLV_OFFSET: usize = CFM_HEADER_SIZE + FIRST_TLV_OFFSET as usize;

/// Size of the Y.1731 reserved area following the MAID
const Y1731_RESERVED_SIZE: usize = 16;

/// TLV type and length fields
pub const TLV_HEADER_SIZE: usize = 3;

/// CFM TLV types used by CCMs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CfmTlvType {
    End = 0,
    SenderId = 1,
    PortStatus = 2,
    InterfaceStatus = 4,
    OrganizationSpecific = 31,
}

impl CfmTlvType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CfmTlvType::End),
            1 => Some(CfmTlvType::SenderId),
            2 => Some(CfmTlvType::PortStatus),
            4 => Some(CfmTlvType::InterfaceStatus),
            31 => Some(CfmTlvType::OrganizationSpecific),
            _ => None,
        }
    }
}

/// Level and OpCode, enough to demultiplex a CFM PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfmHeader {
    pub level: u8,
    pub version: u8,
    pub opcode: u8,
}

impl CfmHeader {
    pub fn peek(pdu: &[u8]) -> Option<Self> {
        let first = *pdu.first()?;
        let opcode = *pdu.get(1)?;
        Some(Self {
            level: first >> 5,
            version: first & 0x1F,
            opcode,
        })
    }
}

/// Why a received CCM was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("PDU too short to hold the First TLV Offset")]
    TooShort,
    #[error("invalid CCM interval code")]
    InvalidInterval,
    #[error("First TLV Offset {0} below 70")]
    FirstTlvOffsetTooSmall(u8),
    #[error("fixed header overruns the PDU")]
    HeaderOverrun,
    #[error("TLV of type {0} runs past the end of the PDU")]
    TruncatedTlv(u8),
    #[error("malformed Sender ID TLV")]
    SenderId,
    #[error("Port Status TLV length {0} is not 1")]
    PortStatusLength(u16),
    #[error("Port Status TLV value {0} not allowed")]
    PortStatusValue(u8),
    #[error("Interface Status TLV length {0} is not 1")]
    InterfaceStatusLength(u16),
    #[error("Interface Status TLV value {0} not allowed")]
    InterfaceStatusValue(u8),
    #[error("Organization-Specific TLV length {0} below 4")]
    OrganizationSpecificLength(u16),
}

/// A Continuity Check Message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcmPdu {
    pub level: u8,
    pub rdi: bool,
    pub interval: CcmInterval,
    pub sequence_number: u32,
    pub mep_id: MepId,
    pub maid: Maid,
    pub sender_id: Option<SenderId>,
    pub port_status: PortStatus,
    pub interface_status: InterfaceStatus,
    pub organization_specific: Option<OrganizationSpecificTlv>,
}

impl CcmPdu {
    /// Append the PDU, End TLV included, to `buf`
    ///
    /// TLVs are written in Sender ID, Port Status, Interface Status,
    /// Organization-Specific order. `NotReceived` status values are omitted.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.level & 0x07) << 5);
        buf.put_u8(CFM_OPCODE_CCM);
        buf.put_u8(((self.rdi as u8) << 7) | self.interval.code());
        buf.put_u8(FIRST_TLV_OFFSET);
        buf.put_u32(self.sequence_number);
        buf.put_u16(self.mep_id);
        buf.put_slice(self.maid.as_bytes());
        buf.put_bytes(0, Y1731_RESERVED_SIZE);

        if let Some(sender_id) = &self.sender_id {
            put_tlv_header(buf, CfmTlvType::SenderId, sender_id_value_len(sender_id));
            buf.put_u8(sender_id.chassis_id.len() as u8);
            if sender_id.has_chassis_id() {
                buf.put_u8(sender_id.chassis_id_subtype);
                buf.put_slice(&sender_id.chassis_id);
            }

            if sender_id.has_mgmt_addr() {
                buf.put_u8(sender_id.mgmt_addr_domain.len() as u8);
                buf.put_slice(&sender_id.mgmt_addr_domain);
                buf.put_u8(sender_id.mgmt_addr.len() as u8);
                buf.put_slice(&sender_id.mgmt_addr);
            }
        }

        if self.port_status != PortStatus::NotReceived {
            put_tlv_header(buf, CfmTlvType::PortStatus, 1);
            buf.put_u8(self.port_status as u8);
        }

        if self.interface_status != InterfaceStatus::NotReceived {
            put_tlv_header(buf, CfmTlvType::InterfaceStatus, 1);
            buf.put_u8(self.interface_status as u8);
        }

        if let Some(tlv) = &self.organization_specific {
            put_tlv_header(buf, CfmTlvType::OrganizationSpecific, 4 + tlv.value.len());
            buf.put_slice(&tlv.oui);
            buf.put_u8(tlv.subtype);
            buf.put_slice(&tlv.value);
        }

        buf.put_u8(CfmTlvType::End as u8);
    }

    /// Validate and parse a received CCM PDU
    ///
    /// The OpCode is assumed to have been checked by the caller.
    pub fn decode(pdu: &[u8]) -> Result<Self, Rejection> {
        let len = pdu.len();
        if len < CFM_HEADER_SIZE {
            return Err(Rejection::TooShort);
        }

        let level = pdu[0] >> 5;
        let rdi = pdu[2] & 0x80 != 0;
        let interval = CcmInterval::from_code(pdu[2]);
        if !interval.is_valid() {
            return Err(Rejection::InvalidInterval);
        }

        let first_tlv_offset = pdu[3];
        if first_tlv_offset < FIRST_TLV_OFFSET {
            return Err(Rejection::FirstTlvOffsetTooSmall(first_tlv_offset));
        }

        // The End TLV may be missing, so only the fixed part is required
        let mut offset = CFM_HEADER_SIZE + first_tlv_offset as usize;
        if len < offset {
            return Err(Rejection::HeaderOverrun);
        }

        let sequence_number = u32::from_be_bytes([pdu[4], pdu[5], pdu[6], pdu[7]]);
        let mep_id = u16::from_be_bytes([pdu[MEP_ID_OFFSET], pdu[MEP_ID_OFFSET + 1]]);
        let maid = Maid::from_slice(&pdu[MAID_OFFSET..MAID_OFFSET + MAID_LEN])
            .ok_or(Rejection::HeaderOverrun)?;

        let mut ccm = CcmPdu {
            level,
            rdi,
            interval,
            sequence_number,
            mep_id,
            maid,
            sender_id: None,
            port_status: PortStatus::NotReceived,
            interface_status: InterfaceStatus::NotReceived,
            organization_specific: None,
        };

        while offset < len {
            let tlv_type = pdu[offset];
            offset += 1;
            let known = CfmTlvType::from_u8(tlv_type);
            if known == Some(CfmTlvType::End) {
                break;
            }

            let length_bytes = pdu
                .get(offset..offset + 2)
                .ok_or(Rejection::TruncatedTlv(tlv_type))?;
            let tlv_len = u16::from_be_bytes([length_bytes[0], length_bytes[1]]);
            offset += 2;

            let value = pdu
                .get(offset..offset + tlv_len as usize)
                .ok_or(Rejection::TruncatedTlv(tlv_type))?;

            match known {
                Some(CfmTlvType::SenderId) => {
                    ccm.sender_id = Some(parse_sender_id(value)?);
                }
                Some(CfmTlvType::PortStatus) => {
                    if tlv_len != 1 {
                        return Err(Rejection::PortStatusLength(tlv_len));
                    }
                    ccm.port_status =
                        PortStatus::from_wire(value[0]).ok_or(Rejection::PortStatusValue(value[0]))?;
                }
                Some(CfmTlvType::InterfaceStatus) => {
                    if tlv_len != 1 {
                        return Err(Rejection::InterfaceStatusLength(tlv_len));
                    }
                    ccm.interface_status = InterfaceStatus::from_wire(value[0])
                        .ok_or(Rejection::InterfaceStatusValue(value[0]))?;
                }
                Some(CfmTlvType::OrganizationSpecific) => {
                    if tlv_len < 4 {
                        return Err(Rejection::OrganizationSpecificLength(tlv_len));
                    }
                    ccm.organization_specific = Some(OrganizationSpecificTlv {
                        oui: [value[0], value[1], value[2]],
                        subtype: value[3],
                        value: value[4..].to_vec(),
                    });
                }
                // Unknown TLVs are skipped
                Some(CfmTlvType::End) | None => {}
            }

            offset += tlv_len as usize;
        }

        Ok(ccm)
    }
}

fn put_tlv_header(buf: &mut BytesMut, tlv_type: CfmTlvType, value_len: usize) {
    buf.put_u8(tlv_type as u8);
    buf.put_u16(value_len as u16);
}

/// Length of the Sender ID TLV value (everything after the Length field)
pub fn sender_id_value_len(sender_id: &SenderId) -> usize {
    let mut len = 1;
    if sender_id.has_chassis_id() {
        len += 1 + sender_id.chassis_id.len();
    }
    if sender_id.has_mgmt_addr() {
        len += 1 + sender_id.mgmt_addr_domain.len() + 1 + sender_id.mgmt_addr.len();
    }
    len
}

/// Parse a Sender ID TLV value (802.1Q 21.5.3)
fn parse_sender_id(value: &[u8]) -> Result<SenderId, Rejection> {
    let tlv_len = value.len();
    let chassis_id_len = *value.first().ok_or(Rejection::SenderId)? as usize;
    if chassis_id_len + 1 >= tlv_len {
        return Err(Rejection::SenderId);
    }

    let mut sender_id = SenderId::default();
    let mut pos = 1;

    if chassis_id_len > 0 {
        sender_id.chassis_id_subtype = value[pos];
        pos += 1;
        sender_id.chassis_id = value
            .get(pos..pos + chassis_id_len)
            .ok_or(Rejection::SenderId)?
            .to_vec();
        pos += chassis_id_len;
    }

    if pos >= tlv_len {
        return Ok(sender_id);
    }

    let domain_len = value[pos] as usize;
    pos += 1;
    if domain_len == 0 {
        return Ok(sender_id);
    }

    sender_id.mgmt_addr_domain = value
        .get(pos..pos + domain_len)
        .ok_or(Rejection::SenderId)?
        .to_vec();
    pos += domain_len;

    if pos >= tlv_len {
        return Ok(sender_id);
    }

    let addr_len = value[pos] as usize;
    pos += 1;
    if addr_len > 0 {
        sender_id.mgmt_addr = value
            .get(pos..pos + addr_len)
            .ok_or(Rejection::SenderId)?
            .to_vec();
    }

    Ok(sender_id)
}
