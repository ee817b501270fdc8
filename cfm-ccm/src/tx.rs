//! CCM frame generation and transmit scheduling
//!
//! A MEP's CCM is built once and handed to an [`InjectionScheduler`], which
//! repeats it at the configured rate. The frame is rebuilt whenever a
//! transmit-affecting change happens; a rebuilt frame identical to the one
//! already scheduled is dropped so the running schedule is left alone.

use bytes::{Bytes, BytesMut};
use cfm_core::{
    Error, InterfaceStatus, MacAddr, MepDefinition, MepKey, PortStatus, Result, SenderId,
    SenderIdTlvOption, TlvOption,
};
use cfm_packet::{EtherType, EthernetHeader, VlanTag};
use std::net::IpAddr;
use tracing::{debug, error, info};

use crate::maid::{Maid, MAID_LEN};
use crate::packet::{CcmPdu, CFM_HEADER_SIZE, SEQUENCE_NUMBER_OFFSET, TLV_HEADER_SIZE};

/// transportDomainUdpIpv4 (1.3.6.1.2.1.100.1.1), BER-encoded
pub const TRANSPORT_DOMAIN_UDP_IPV4: [u8; 10] =
    [0x06, 0x08, 0x2B, 0x06, 0x01, 0x02, 0x01, 0x64, 0x01, 0x01];

/// transportDomainUdpIpv6 (1.3.6.1.2.1.100.1.2), BER-encoded
pub const TRANSPORT_DOMAIN_UDP_IPV6: [u8; 10] =
    [0x06, 0x08, 0x2B, 0x06, 0x01, 0x02, 0x01, 0x64, 0x01, 0x02];

/// SNMP UDP port appended to the management address
const SNMP_PORT: u16 = 161;

/// Chassis ID subtype "MAC address" (802.1AB Table 8-2)
const CHASSIS_ID_SUBTYPE_MAC: u8 = 4;

/// Length of a MAC address in `xx-xx-xx-xx-xx-xx` form
const CHASSIS_ID_TEXT_LEN: usize = 17;

/// Residence port and system facts the engine does not own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortContext {
    /// MAC address of the residence port
    pub smac: MacAddr,
    /// System MAC, sent as the Sender ID chassis ID
    pub system_mac: MacAddr,
    /// TPID used when CCMs are tagged
    pub tpid: u16,
    pub link_up: bool,
    /// Whether remote MEP defects may be raised (port forwarding, link up)
    pub enable_rmep_defect: bool,
    /// Management address sent in the Sender ID TLV
    pub mgmt_address: Option<IpAddr>,
}

impl Default for PortContext {
    fn default() -> Self {
        Self {
            smac: MacAddr::zero(),
            system_mac: MacAddr::zero(),
            tpid: cfm_core::types::ethertypes::DOT1Q,
            link_up: true,
            enable_rmep_defect: true,
            mgmt_address: None,
        }
    }
}

/// A built CCM, ready for injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcmFrame {
    /// Complete Ethernet frame with a zero sequence number
    pub bytes: Bytes,
    /// Position of the sequence number inside `bytes`
    pub seq_offset: usize,
    pub frames_per_hour: u64,
}

impl CcmFrame {
    /// Build the CCM of a MEP
    ///
    /// The frame length is computed from the resolved TLV options before
    /// anything is written and checked against what was actually written.
    pub fn generate(
        def: &MepDefinition,
        port: &PortContext,
        maid: &Maid,
        rdi: bool,
    ) -> Result<Self> {
        let frames_per_hour = def.ma.ccm_interval.frames_per_hour().ok_or_else(|| {
            Error::invalid_config("ccm_interval", "cannot transmit with an invalid interval")
        })?;

        let policy = def.tlv_policy();
        let mut header = EthernetHeader::new(
            MacAddr::ccm_multicast(def.md.level),
            def.mep.smac.unwrap_or(port.smac),
            EtherType::Cfm,
        );
        if def.ma.vlan != 0 {
            header = header.with_vlan(VlanTag::new(port.tpid, def.mep.pcp, def.ma.vlan));
        }

        let org_value_len = def.global.organization_specific_tlv_contents.value.len();
        let expected_len = header.len()
            + CFM_HEADER_SIZE
            + 4
            + 2
            + MAID_LEN
            + 16
            + sender_id_tlv_len(policy.sender_id, port.mgmt_address)
            + status_tlv_len(policy.port_status)
            + status_tlv_len(policy.interface_status)
            + organization_specific_tlv_len(policy.organization_specific, org_value_len)
            + 1;

        let pdu = CcmPdu {
            level: def.md.level,
            rdi,
            interval: def.ma.ccm_interval,
            sequence_number: 0,
            mep_id: def.mep.mep_id,
            maid: *maid,
            sender_id: sender_id(policy.sender_id, port),
            port_status: match policy.port_status {
                TlvOption::Enable if port.enable_rmep_defect => PortStatus::Up,
                TlvOption::Enable => PortStatus::Blocked,
                _ => PortStatus::NotReceived,
            },
            interface_status: match policy.interface_status {
                TlvOption::Enable if port.link_up => InterfaceStatus::Up,
                TlvOption::Enable => InterfaceStatus::Down,
                _ => InterfaceStatus::NotReceived,
            },
            organization_specific: (policy.organization_specific == TlvOption::Enable)
                .then(|| def.global.organization_specific_tlv_contents.clone()),
        };

        let mut buf = BytesMut::with_capacity(expected_len);
        header.encode(&mut buf);
        let pdu_offset = buf.len();
        pdu.encode(&mut buf);

        if buf.len() != expected_len {
            error!(
                mep = %def.key,
                expected = expected_len,
                actual = buf.len(),
                "Pre-calculated CCM length doesn't match the encoded length"
            );
            return Err(Error::internal(format!(
                "CCM length {} != pre-calculated {}",
                buf.len(),
                expected_len
            )));
        }

        Ok(Self {
            bytes: buf.freeze(),
            seq_offset: pdu_offset + SEQUENCE_NUMBER_OFFSET,
            frames_per_hour,
        })
    }

    /// Copy of the frame carrying `sequence_number`
    pub fn stamp(&self, sequence_number: u32) -> Bytes {
        let mut buf = BytesMut::from(&self.bytes[..]);
        buf[self.seq_offset..self.seq_offset + 4].copy_from_slice(&sequence_number.to_be_bytes());
        buf.freeze()
    }

    /// Milliseconds between two transmissions
    pub fn period_ms(&self) -> u64 {
        3_600_000 / self.frames_per_hour.max(1)
    }
}

/// Total Sender ID TLV length, type and length fields included
fn sender_id_tlv_len(option: SenderIdTlvOption, mgmt_address: Option<IpAddr>) -> usize {
    let mgmt_addr_len = match mgmt_address {
        Some(IpAddr::V6(_)) => 18,
        _ => 6,
    };

    match option {
        SenderIdTlvOption::Disable | SenderIdTlvOption::Defer => 0,
        SenderIdTlvOption::Chassis => TLV_HEADER_SIZE + 1 + 1 + CHASSIS_ID_TEXT_LEN,
        SenderIdTlvOption::Manage => TLV_HEADER_SIZE + 1 + 1 + 10 + 1 + mgmt_addr_len,
        SenderIdTlvOption::ChassisManage => {
            TLV_HEADER_SIZE + 1 + 1 + CHASSIS_ID_TEXT_LEN + 1 + 10 + 1 + mgmt_addr_len
        }
    }
}

fn status_tlv_len(option: TlvOption) -> usize {
    if option == TlvOption::Enable {
        TLV_HEADER_SIZE + 1
    } else {
        0
    }
}

fn organization_specific_tlv_len(option: TlvOption, value_len: usize) -> usize {
    if option == TlvOption::Enable {
        TLV_HEADER_SIZE + 3 + 1 + value_len
    } else {
        0
    }
}

fn sender_id(option: SenderIdTlvOption, port: &PortContext) -> Option<SenderId> {
    if !option.has_chassis() && !option.has_manage() {
        return None;
    }

    let mut sender_id = SenderId::default();
    if option.has_chassis() {
        sender_id.chassis_id_subtype = CHASSIS_ID_SUBTYPE_MAC;
        sender_id.chassis_id = port.system_mac.to_chassis_text().into_bytes();
    }

    if option.has_manage() {
        // No management address yet: announce 0.0.0.0
        let address = port
            .mgmt_address
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
        let (domain, mut mgmt_addr) = match address {
            IpAddr::V4(v4) => (TRANSPORT_DOMAIN_UDP_IPV4, v4.octets().to_vec()),
            IpAddr::V6(v6) => (TRANSPORT_DOMAIN_UDP_IPV6, v6.octets().to_vec()),
        };
        mgmt_addr.extend_from_slice(&SNMP_PORT.to_be_bytes());
        sender_id.mgmt_addr_domain = domain.to_vec();
        sender_id.mgmt_addr = mgmt_addr;
    }

    Some(sender_id)
}

/// Handle of a running injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectionHandle(pub u128);

impl std::fmt::Display for InjectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Repeats a frame at a fixed rate
///
/// Implementations send the first frame immediately on `start`.
pub trait InjectionScheduler: Send {
    fn start(&mut self, key: &MepKey, frame: &CcmFrame) -> Result<InjectionHandle>;

    /// Stopping an unknown or stopped handle is not an error
    fn stop(&mut self, handle: InjectionHandle) -> Result<()>;
}

/// The frame currently scheduled for a MEP
#[derive(Debug, Clone)]
pub struct ScheduledFrame {
    pub frame: CcmFrame,
    pub handle: InjectionHandle,
}

/// What [`replace_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxUpdate {
    /// The new frame equals the scheduled one
    Unchanged,
    Started,
    Replaced,
}

/// Schedule `frame`, replacing whatever is currently scheduled
///
/// The new injection is started before the old one is stopped. On error the
/// previous schedule is left exactly as it was.
pub fn replace_frame(
    key: &MepKey,
    scheduled: &mut Option<ScheduledFrame>,
    frame: CcmFrame,
    injector: &mut dyn InjectionScheduler,
) -> Result<TxUpdate> {
    if let Some(current) = scheduled.as_ref() {
        if current.frame == frame {
            debug!(mep = %key, "CCM unchanged, keeping the running schedule");
            return Ok(TxUpdate::Unchanged);
        }
    }

    let handle = injector.start(key, &frame).map_err(|e| {
        error!(mep = %key, error = %e, "Failed to start CCM injection");
        e
    })?;

    if let Some(old) = scheduled.as_ref() {
        if let Err(e) = injector.stop(old.handle) {
            error!(mep = %key, handle = %old.handle, error = %e, "Failed to stop previous CCM");
            if let Err(undo) = injector.stop(handle) {
                error!(mep = %key, handle = %handle, error = %undo, "Failed to stop new CCM");
            }
            return Err(e);
        }
    }

    info!(
        mep = %key,
        handle = %handle,
        fph = frame.frames_per_hour,
        len = frame.bytes.len(),
        "CCM scheduled"
    );
    let previous = scheduled.replace(ScheduledFrame { frame, handle });
    Ok(if previous.is_some() {
        TxUpdate::Replaced
    } else {
        TxUpdate::Started
    })
}

/// Stop transmission, if running
///
/// The schedule is only forgotten once the injector has stopped it.
pub fn cancel_frame(
    key: &MepKey,
    scheduled: &mut Option<ScheduledFrame>,
    injector: &mut dyn InjectionScheduler,
) -> Result<()> {
    if let Some(old) = scheduled.as_ref() {
        injector.stop(old.handle)?;
        debug!(mep = %key, handle = %old.handle, "CCM transmission stopped");
        *scheduled = None;
    }
    Ok(())
}
