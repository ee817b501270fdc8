//! Frame construction and parsing library for CFM-RS
//!
//! CFM PDUs are carried directly over Ethernet (EtherType 0x8902), either
//! untagged or behind one 802.1Q/802.1ad tag. This crate owns that framing:
//!
//! - [`ethernet`] - Ethernet II header with optional VLAN tag
//!
//! # Quick Start
//!
//! ```rust
//! use bytes::BytesMut;
//! use cfm_core::MacAddr;
//! use cfm_packet::{EtherType, EthernetHeader, VlanTag};
//!
//! let src = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
//! let header = EthernetHeader::new(MacAddr::ccm_multicast(4), src, EtherType::Cfm)
//!     .with_vlan(VlanTag::new(0x8100, 7, 100));
//!
//! let mut buf = BytesMut::with_capacity(header.len());
//! header.encode(&mut buf);
//! assert_eq!(buf.len(), 18);
//! ```

pub mod ethernet;

pub use ethernet::{EtherType, EthernetHeader, VlanTag};
