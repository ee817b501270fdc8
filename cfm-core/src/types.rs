//! Common types used throughout CFM-RS

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MEP and RMEP identifier (1..=8191)
pub type MepId = u16;

/// Highest valid MEP identifier
pub const MEP_ID_MAX: MepId = 8191;

/// Highest valid maintenance level
pub const LEVEL_MAX: u8 = 7;

/// MAC Address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Create a new MAC address
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Zero MAC address (00:00:00:00:00:00)
    pub const fn zero() -> Self {
        Self([0x00; 6])
    }

    /// Class 1 CCM group address for a maintenance level: 01:80:C2:00:00:3L
    pub const fn ccm_multicast(level: u8) -> Self {
        Self([0x01, 0x80, 0xC2, 0x00, 0x00, 0x30 | (level & 0x07)])
    }

    /// Get bytes as slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to array
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Check whether all octets are zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 6]
    }

    /// The 17-character "xx-xx-xx-xx-xx-xx" form carried as a Sender ID chassis ID
    pub fn to_chassis_text(&self) -> String {
        format!(
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(crate::Error::invalid_config("mac", "invalid MAC address format"));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| crate::Error::invalid_config("mac", "invalid MAC address hex"))?;
        }

        Ok(MacAddr(bytes))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// Identifies one MEP: MD name, MA name and MEP id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MepKey {
    pub md: String,
    pub ma: String,
    pub mep_id: MepId,
}

impl MepKey {
    pub fn new<S: Into<String>>(md: S, ma: S, mep_id: MepId) -> Self {
        Self {
            md: md.into(),
            ma: ma.into(),
            mep_id,
        }
    }
}

impl fmt::Display for MepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.md, self.ma, self.mep_id)
    }
}

/// CCM transmission interval (802.1Q Table 21-15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CcmInterval {
    Invalid = 0,
    /// 3.33 ms (300 frames per second)
    #[serde(rename = "300hz")]
    Hz300 = 1,
    #[serde(rename = "10ms")]
    Ms10 = 2,
    #[serde(rename = "100ms")]
    Ms100 = 3,
    #[default]
    #[serde(rename = "1s")]
    Sec1 = 4,
    #[serde(rename = "10s")]
    Sec10 = 5,
    #[serde(rename = "1min")]
    Min1 = 6,
    #[serde(rename = "10min")]
    Min10 = 7,
}

impl CcmInterval {
    /// Decode the 3-bit interval code of the CCM flags field
    pub fn from_code(code: u8) -> Self {
        match code & 0x07 {
            1 => CcmInterval::Hz300,
            2 => CcmInterval::Ms10,
            3 => CcmInterval::Ms100,
            4 => CcmInterval::Sec1,
            5 => CcmInterval::Sec10,
            6 => CcmInterval::Min1,
            7 => CcmInterval::Min10,
            _ => CcmInterval::Invalid,
        }
    }

    /// The 3-bit interval code
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_valid(self) -> bool {
        self != CcmInterval::Invalid
    }

    /// Frames per hour, `None` for the invalid code
    pub fn frames_per_hour(self) -> Option<u64> {
        match self {
            CcmInterval::Invalid => None,
            CcmInterval::Hz300 => Some(300 * 3600),
            CcmInterval::Ms10 => Some(100 * 3600),
            CcmInterval::Ms100 => Some(10 * 3600),
            CcmInterval::Sec1 => Some(3600),
            CcmInterval::Sec10 => Some(360),
            CcmInterval::Min1 => Some(60),
            CcmInterval::Min10 => Some(6),
        }
    }

    /// Milliseconds between two transmitted CCMs
    pub fn tx_period_ms(self) -> Option<u64> {
        self.frames_per_hour().map(|fph| 3_600_000 / fph)
    }

    /// 3.5 transmission periods, in milliseconds
    pub fn timeout_ms(self) -> Option<u64> {
        self.frames_per_hour().map(timeout_ms_from_fph)
    }
}

/// Loss-of-continuity and mismatch timeout: `(35 * 3600000) / (10 * fph)`
pub const fn timeout_ms_from_fph(fph: u64) -> u64 {
    (35 * 3_600_000) / (10 * fph)
}

impl fmt::Display for CcmInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CcmInterval::Invalid => "invalid",
            CcmInterval::Hz300 => "300hz",
            CcmInterval::Ms10 => "10ms",
            CcmInterval::Ms100 => "100ms",
            CcmInterval::Sec1 => "1s",
            CcmInterval::Sec10 => "10s",
            CcmInterval::Min1 => "1min",
            CcmInterval::Min10 => "10min",
        };
        f.write_str(s)
    }
}

/// MEP defects, ordered by priority (NONE lowest, XCON highest)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MepDefect {
    #[default]
    None = 0,
    Rdi = 1,
    MacStatus = 2,
    RemoteCcm = 3,
    ErrorCcm = 4,
    XconCcm = 5,
}

impl MepDefect {
    /// Bit of this defect in the defects mask (NONE has no bit)
    pub fn mask(self) -> u8 {
        match self {
            MepDefect::None => 0,
            other => 1 << (other as u8 - 1),
        }
    }
}

impl fmt::Display for MepDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MepDefect::None => "none",
            MepDefect::Rdi => "rdi",
            MepDefect::MacStatus => "mac-status",
            MepDefect::RemoteCcm => "remote-ccm",
            MepDefect::ErrorCcm => "error-ccm",
            MepDefect::XconCcm => "xcon-ccm",
        };
        f.write_str(s)
    }
}

/// Defects bitmask values
pub mod defect_mask {
    pub const RDI: u8 = 0x01;
    pub const MAC_STATUS: u8 = 0x02;
    pub const REMOTE_CCM: u8 = 0x04;
    pub const ERROR_CCM: u8 = 0x08;
    pub const XCON_CCM: u8 = 0x10;
}

/// Fault Notification Generator state (802.1Q 20.37)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FngState {
    #[default]
    Reset = 1,
    Defect = 2,
    /// Transitional; never stored by the engine
    ReportDefect = 3,
    DefectReported = 4,
    DefectClearing = 5,
}

impl fmt::Display for FngState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FngState::Reset => "FNG_RESET",
            FngState::Defect => "FNG_DEFECT",
            FngState::ReportDefect => "FNG_REPORT_DEFECT",
            FngState::DefectReported => "FNG_DEFECT_REPORTED",
            FngState::DefectClearing => "FNG_DEFECT_CLEARING",
        };
        f.write_str(s)
    }
}

/// Remote MEP state (802.1Q 20.20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RmepState {
    #[default]
    Start = 2,
    Failed = 3,
    Ok = 4,
}

impl fmt::Display for RmepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RmepState::Start => "RMEP_START",
            RmepState::Failed => "RMEP_FAILED",
            RmepState::Ok => "RMEP_OK",
        };
        f.write_str(s)
    }
}

/// Port Status TLV value (802.1Q Table 21-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PortStatus {
    /// No Port Status TLV in the last CCM
    #[default]
    NotReceived = 0,
    Blocked = 1,
    Up = 2,
}

impl PortStatus {
    /// Decode a TLV value; only BLOCKED and UP are acceptable on the wire
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(PortStatus::Blocked),
            2 => Some(PortStatus::Up),
            _ => None,
        }
    }
}

/// Interface Status TLV value (802.1Q Table 21-11)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InterfaceStatus {
    /// No Interface Status TLV in the last CCM
    #[default]
    NotReceived = 0,
    Up = 1,
    Down = 2,
    Testing = 3,
    Unknown = 4,
    Dormant = 5,
    NotPresent = 6,
    LowerLayerDown = 7,
}

impl InterfaceStatus {
    /// Decode a TLV value. Only UP..=UNKNOWN are accepted on receive.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(InterfaceStatus::Up),
            2 => Some(InterfaceStatus::Down),
            3 => Some(InterfaceStatus::Testing),
            4 => Some(InterfaceStatus::Unknown),
            _ => None,
        }
    }
}

/// Sender ID TLV contents (802.1Q 21.5.3)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SenderId {
    /// Chassis ID subtype (802.1AB Table 8-2); only meaningful with a chassis ID
    pub chassis_id_subtype: u8,
    pub chassis_id: Vec<u8>,
    /// BER-encoded management address domain OID
    pub mgmt_addr_domain: Vec<u8>,
    pub mgmt_addr: Vec<u8>,
}

impl SenderId {
    pub fn has_chassis_id(&self) -> bool {
        !self.chassis_id.is_empty()
    }

    pub fn has_mgmt_addr(&self) -> bool {
        !self.mgmt_addr_domain.is_empty()
    }
}

/// Organization-Specific TLV contents (802.1Q 21.5.2)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrganizationSpecificTlv {
    pub oui: [u8; 3],
    pub subtype: u8,
    #[serde(default)]
    pub value: Vec<u8>,
}

/// Largest value we transmit in an Organization-Specific TLV
pub const ORGANIZATION_SPECIFIC_VALUE_MAX: usize = 63;

/// Ethertype constants
pub mod ethertypes {
    pub const DOT1Q: u16 = 0x8100;
    pub const DOT1AD: u16 = 0x88A8;
    pub const QINQ_LEGACY: u16 = 0x9100;
    pub const CFM: u16 = 0x8902;
}
