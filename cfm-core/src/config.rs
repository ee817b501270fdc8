//! Configuration model
//!
//! Configuration is layered the way 802.1Q describes it: global settings,
//! Maintenance Domains (MD) holding Maintenance Associations (MA), which in
//! turn hold MEPs. The four TLV inclusion options can be set at MA, MD or
//! global scope; a `Defer` value at one scope hands the decision to the next
//! one out (MA > MD > global).
//!
//! A whole configuration can be loaded from TOML:
//!
//! ```toml
//! [global]
//! port_status_tlv = "enable"
//!
//! [[domains]]
//! name = "operator"
//! level = 4
//!
//! [[domains.associations]]
//! name = "svc-100"
//! vlan = 100
//! ccm_interval = "1s"
//!
//! [[domains.associations.meps]]
//! mep_id = 1
//! rmep_ids = [2]
//! admin_active = true
//! ccm_enable = true
//! ```

use crate::types::{
    CcmInterval, MacAddr, MepId, MepKey, OrganizationSpecificTlv, LEVEL_MAX, MEP_ID_MAX,
    ORGANIZATION_SPECIFIC_VALUE_MAX,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A value that may hand its decision to an outer scope
pub trait Deferrable: Copy {
    fn is_defer(&self) -> bool;
}

/// Resolve a precedence chain: the first entry that does not defer wins,
/// otherwise `fallback`.
pub fn resolve<T: Deferrable>(chain: &[T], fallback: T) -> T {
    chain
        .iter()
        .copied()
        .find(|option| !option.is_defer())
        .unwrap_or(fallback)
}

/// Inclusion option for Port Status, Interface Status and Organization-Specific TLVs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlvOption {
    Disable,
    Enable,
    #[default]
    Defer,
}

impl Deferrable for TlvOption {
    fn is_defer(&self) -> bool {
        *self == TlvOption::Defer
    }
}

/// Inclusion option for the Sender ID TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderIdTlvOption {
    Disable,
    /// Chassis ID only
    Chassis,
    /// Management address only
    Manage,
    /// Both chassis ID and management address
    ChassisManage,
    #[default]
    Defer,
}

impl Deferrable for SenderIdTlvOption {
    fn is_defer(&self) -> bool {
        *self == SenderIdTlvOption::Defer
    }
}

impl SenderIdTlvOption {
    pub fn has_chassis(self) -> bool {
        matches!(
            self,
            SenderIdTlvOption::Chassis | SenderIdTlvOption::ChassisManage
        )
    }

    pub fn has_manage(self) -> bool {
        matches!(
            self,
            SenderIdTlvOption::Manage | SenderIdTlvOption::ChassisManage
        )
    }
}

/// The four per-scope TLV inclusion options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlvPolicy {
    #[serde(rename = "sender_id_tlv")]
    pub sender_id: SenderIdTlvOption,
    #[serde(rename = "port_status_tlv")]
    pub port_status: TlvOption,
    #[serde(rename = "interface_status_tlv")]
    pub interface_status: TlvOption,
    #[serde(rename = "organization_specific_tlv")]
    pub organization_specific: TlvOption,
}

impl TlvPolicy {
    /// Effective policy of an MA inside an MD under a global configuration
    pub fn resolve(ma: &TlvPolicy, md: &TlvPolicy, global: &TlvPolicy) -> TlvPolicy {
        TlvPolicy {
            sender_id: resolve(&[ma.sender_id, md.sender_id], global.sender_id),
            port_status: resolve(&[ma.port_status, md.port_status], global.port_status),
            interface_status: resolve(
                &[ma.interface_status, md.interface_status],
                global.interface_status,
            ),
            organization_specific: resolve(
                &[ma.organization_specific, md.organization_specific],
                global.organization_specific,
            ),
        }
    }

    fn has_defer(&self) -> bool {
        self.sender_id.is_defer()
            || self.port_status.is_defer()
            || self.interface_status.is_defer()
            || self.organization_specific.is_defer()
    }
}

/// Global configuration
///
/// Unlike MD and MA options, none of these may be `Defer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConf {
    pub sender_id_tlv: SenderIdTlvOption,
    pub port_status_tlv: TlvOption,
    pub interface_status_tlv: TlvOption,
    pub organization_specific_tlv: TlvOption,
    /// Contents of transmitted Organization-Specific TLVs
    pub organization_specific_tlv_contents: OrganizationSpecificTlv,
}

impl Default for GlobalConf {
    fn default() -> Self {
        Self {
            sender_id_tlv: SenderIdTlvOption::Disable,
            port_status_tlv: TlvOption::Disable,
            interface_status_tlv: TlvOption::Disable,
            organization_specific_tlv: TlvOption::Disable,
            organization_specific_tlv_contents: OrganizationSpecificTlv::default(),
        }
    }
}

impl GlobalConf {
    /// The global options as the outermost policy scope
    pub fn tlv_policy(&self) -> TlvPolicy {
        TlvPolicy {
            sender_id: self.sender_id_tlv,
            port_status: self.port_status_tlv,
            interface_status: self.interface_status_tlv,
            organization_specific: self.organization_specific_tlv,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tlv_policy().has_defer() {
            return Err(Error::invalid_config(
                "global",
                "TLV options cannot defer at global scope",
            ));
        }

        if self.organization_specific_tlv_contents.value.len() > ORGANIZATION_SPECIFIC_VALUE_MAX {
            return Err(Error::invalid_config(
                "organization_specific_tlv_contents",
                format!("value longer than {} bytes", ORGANIZATION_SPECIFIC_VALUE_MAX),
            ));
        }

        Ok(())
    }
}

/// Maintenance Domain name format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MdFormat {
    None = 1,
    #[default]
    String = 4,
}

/// Maintenance Domain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdConf {
    pub name: String,
    #[serde(default)]
    pub format: MdFormat,
    #[serde(default)]
    pub level: u8,
    #[serde(flatten)]
    pub tlv: TlvPolicy,
}

/// Longest MD name (STRING format)
pub const MD_NAME_MAX: usize = 43;

impl MdConf {
    pub fn new<S: Into<String>>(name: S, level: u8) -> Self {
        Self {
            name: name.into(),
            format: MdFormat::String,
            level,
            tlv: TlvPolicy::default(),
        }
    }

    /// Bytes of the MD name as carried in the MAID (empty for format NONE)
    pub fn maid_name(&self) -> &[u8] {
        match self.format {
            MdFormat::None => &[],
            MdFormat::String => self.name.as_bytes(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.level > LEVEL_MAX {
            return Err(Error::invalid_config("level", "must be in range 0..=7"));
        }

        if self.format == MdFormat::String {
            let len = self.name.len();
            if len == 0 || len > MD_NAME_MAX {
                return Err(Error::invalid_config(
                    "md.name",
                    format!("length must be in range 1..={}", MD_NAME_MAX),
                ));
            }

            if !self.name.bytes().all(|b| (32..=126).contains(&b)) {
                return Err(Error::invalid_config("md.name", "must be printable ASCII"));
            }
        }

        Ok(())
    }
}

/// Maintenance Association short name format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaFormat {
    #[default]
    String,
    TwoOctetInteger,
    /// Two-octet primary VID, taken from the MA's VLAN
    PrimaryVid,
    Y1731Icc,
    Y1731IccCc,
}

impl MaFormat {
    /// Short MA name format code carried in the MAID
    pub fn code(self) -> u8 {
        match self {
            MaFormat::String => 2,
            // Primary VID is carried with the two-octet integer code
            MaFormat::TwoOctetInteger | MaFormat::PrimaryVid => 3,
            MaFormat::Y1731Icc => 32,
            MaFormat::Y1731IccCc => 33,
        }
    }
}

/// Maintenance Association configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaConf {
    pub name: String,
    #[serde(default)]
    pub format: MaFormat,
    /// Primary VID; 0 for port MEPs (untagged CCMs)
    #[serde(default)]
    pub vlan: u16,
    #[serde(default)]
    pub ccm_interval: CcmInterval,
    #[serde(flatten)]
    pub tlv: TlvPolicy,
}

impl MaConf {
    pub fn new<S: Into<String>>(name: S, ccm_interval: CcmInterval) -> Self {
        Self {
            name: name.into(),
            format: MaFormat::String,
            vlan: 0,
            ccm_interval,
            tlv: TlvPolicy::default(),
        }
    }

    /// Validate against the enclosing MD so that the MAID fits in 48 bytes
    pub fn validate(&self, md: &MdConf) -> Result<()> {
        if !self.ccm_interval.is_valid() {
            return Err(Error::invalid_config("ccm_interval", "invalid interval"));
        }

        if self.vlan > 4095 {
            return Err(Error::invalid_config("vlan", "must be in range 0..=4095"));
        }

        let name_len = self.name.len();
        let required = match self.format {
            MaFormat::String => {
                if name_len == 0 {
                    return Err(Error::invalid_config("ma.name", "must not be empty"));
                }
                name_len
            }
            MaFormat::TwoOctetInteger => {
                if name_len != 2 {
                    return Err(Error::invalid_config(
                        "ma.name",
                        "two-octet integer names are exactly 2 bytes",
                    ));
                }
                2
            }
            MaFormat::PrimaryVid => {
                if self.vlan == 0 {
                    return Err(Error::invalid_config(
                        "vlan",
                        "primary VID format requires a VLAN in range 1..=4095",
                    ));
                }
                2
            }
            MaFormat::Y1731Icc | MaFormat::Y1731IccCc => {
                let exact = if self.format == MaFormat::Y1731Icc { 13 } else { 15 };
                if name_len != exact {
                    return Err(Error::invalid_config(
                        "ma.name",
                        format!("{:?} names are exactly {} bytes", self.format, exact),
                    ));
                }

                if md.format != MdFormat::None {
                    return Err(Error::invalid_config(
                        "md.format",
                        "Y.1731 MA formats require MD format none",
                    ));
                }
                name_len
            }
        };

        let available = match md.format {
            MdFormat::None => 45,
            MdFormat::String => 44usize.saturating_sub(md.name.len()),
        };

        if required > available {
            return Err(Error::invalid_config(
                "ma.name",
                format!("MAID too long ({} > {} bytes available)", required, available),
            ));
        }

        Ok(())
    }
}

fn default_pcp() -> u8 {
    7
}

fn default_alarm_level() -> u8 {
    2
}

fn default_alarm_time_present_ms() -> u32 {
    2500
}

fn default_alarm_time_absent_ms() -> u32 {
    10000
}

/// MEP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MepConf {
    pub mep_id: MepId,
    /// Expected remote MEP ids
    #[serde(default)]
    pub rmep_ids: BTreeSet<MepId>,
    /// PCP of transmitted CCMs when tagged
    #[serde(default = "default_pcp")]
    pub pcp: u8,
    /// Source MAC override; the residence port's MAC is used otherwise
    #[serde(default)]
    pub smac: Option<MacAddr>,
    /// Lowest defect priority allowed to raise a fault alarm (1..=6, 6 = none)
    #[serde(default = "default_alarm_level")]
    pub alarm_level: u8,
    /// fngAlarmTime
    #[serde(default = "default_alarm_time_present_ms")]
    pub alarm_time_present_ms: u32,
    /// fngResetTime
    #[serde(default = "default_alarm_time_absent_ms")]
    pub alarm_time_absent_ms: u32,
    #[serde(default)]
    pub ccm_enable: bool,
    #[serde(default)]
    pub admin_active: bool,
}

impl MepConf {
    pub fn new(mep_id: MepId) -> Self {
        Self {
            mep_id,
            rmep_ids: BTreeSet::new(),
            pcp: default_pcp(),
            smac: None,
            alarm_level: default_alarm_level(),
            alarm_time_present_ms: default_alarm_time_present_ms(),
            alarm_time_absent_ms: default_alarm_time_absent_ms(),
            ccm_enable: false,
            admin_active: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mep_id == 0 || self.mep_id > MEP_ID_MAX {
            return Err(Error::invalid_config("mep_id", "must be in range 1..=8191"));
        }

        for rmep_id in &self.rmep_ids {
            if *rmep_id == 0 || *rmep_id > MEP_ID_MAX {
                return Err(Error::invalid_config(
                    "rmep_ids",
                    format!("{} not in range 1..=8191", rmep_id),
                ));
            }

            if *rmep_id == self.mep_id {
                return Err(Error::invalid_config(
                    "rmep_ids",
                    "a MEP cannot be its own remote MEP",
                ));
            }
        }

        if self.pcp > 7 {
            return Err(Error::invalid_config("pcp", "must be in range 0..=7"));
        }

        if !(1..=6).contains(&self.alarm_level) {
            return Err(Error::invalid_config("alarm_level", "must be in range 1..=6"));
        }

        if !(2500..=10000).contains(&self.alarm_time_present_ms) {
            return Err(Error::invalid_config(
                "alarm_time_present_ms",
                "must be in range 2500..=10000",
            ));
        }

        if !(2500..=10000).contains(&self.alarm_time_absent_ms) {
            return Err(Error::invalid_config(
                "alarm_time_absent_ms",
                "must be in range 2500..=10000",
            ));
        }

        Ok(())
    }
}

/// Everything needed to run one MEP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MepDefinition {
    pub key: MepKey,
    pub global: GlobalConf,
    pub md: MdConf,
    pub ma: MaConf,
    pub mep: MepConf,
}

impl MepDefinition {
    pub fn new(global: GlobalConf, md: MdConf, ma: MaConf, mep: MepConf) -> Self {
        let key = MepKey::new(md.name.clone(), ma.name.clone(), mep.mep_id);
        Self {
            key,
            global,
            md,
            ma,
            mep,
        }
    }

    /// TLV options after MA > MD > global resolution
    pub fn tlv_policy(&self) -> TlvPolicy {
        TlvPolicy::resolve(&self.ma.tlv, &self.md.tlv, &self.global.tlv_policy())
    }

    pub fn validate(&self) -> Result<()> {
        self.global.validate()?;
        self.md.validate()?;
        self.ma.validate(&self.md)?;
        self.mep.validate()
    }
}

/// An MA with its MEPs, as found in a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaEntry {
    #[serde(flatten)]
    pub conf: MaConf,
    #[serde(default)]
    pub meps: Vec<MepConf>,
}

/// An MD with its MAs, as found in a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdEntry {
    #[serde(flatten)]
    pub conf: MdConf,
    #[serde(default)]
    pub associations: Vec<MaEntry>,
}

/// Complete CFM configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CfmConfig {
    pub global: GlobalConf,
    pub domains: Vec<MdEntry>,
}

impl CfmConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: CfmConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Flatten into one definition per MEP
    pub fn mep_definitions(&self) -> Vec<MepDefinition> {
        let mut definitions = Vec::new();
        for md in &self.domains {
            for ma in &md.associations {
                for mep in &ma.meps {
                    definitions.push(MepDefinition::new(
                        self.global.clone(),
                        md.conf.clone(),
                        ma.conf.clone(),
                        mep.clone(),
                    ));
                }
            }
        }
        definitions
    }

    pub fn validate(&self) -> Result<()> {
        self.global.validate()?;

        let mut keys = BTreeSet::new();
        for definition in self.mep_definitions() {
            definition.validate()?;
            if !keys.insert(definition.key.clone()) {
                return Err(Error::AlreadyExists(format!("MEP {}", definition.key)));
            }
        }

        for md in &self.domains {
            md.conf.validate()?;
            for ma in &md.associations {
                ma.conf.validate(&md.conf)?;
            }
        }

        Ok(())
    }
}
