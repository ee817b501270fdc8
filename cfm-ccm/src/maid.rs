//! Maintenance Association Identifier (MAID / MEGID)
//!
//! The 48-byte MAID carried in every CCM is derived from the MD and MA
//! naming (802.1Q 21.6.5, Y.1731 Annex A). Unused trailing bytes are zero.

use cfm_core::{Error, MaConf, MaFormat, MdConf, MdFormat, Result};
use std::fmt;

/// MAID size on the wire
pub const MAID_LEN: usize = 48;

/// A 48-byte MAID
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Maid(pub [u8; MAID_LEN]);

impl Maid {
    /// Build the MAID of an MA inside an MD
    pub fn build(md: &MdConf, ma: &MaConf) -> Result<Self> {
        let mut maid = [0u8; MAID_LEN];
        let mut writer = MaidWriter {
            buf: &mut maid,
            offset: 0,
        };

        writer.put(md.format as u8)?;
        if md.format == MdFormat::String {
            writer.put_name(md.maid_name())?;
        }

        writer.put(ma.format.code())?;
        match ma.format {
            MaFormat::TwoOctetInteger => {
                let name = ma.name.as_bytes();
                if name.len() < 2 {
                    return Err(Error::invalid_config(
                        "ma.name",
                        "two-octet integer names are exactly 2 bytes",
                    ));
                }
                writer.put_name(&name[..2])?;
            }
            MaFormat::PrimaryVid => writer.put_name(&ma.vlan.to_be_bytes())?,
            MaFormat::String | MaFormat::Y1731Icc | MaFormat::Y1731IccCc => {
                writer.put_name(ma.name.as_bytes())?
            }
        }

        Ok(Maid(maid))
    }

    /// Wrap received MAID bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; MAID_LEN] = bytes.try_into().ok()?;
        Some(Maid(array))
    }

    pub fn as_bytes(&self) -> &[u8; MAID_LEN] {
        &self.0
    }
}

impl Default for Maid {
    fn default() -> Self {
        Maid([0u8; MAID_LEN])
    }
}

impl fmt::Debug for Maid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self
            .0
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |pos| pos + 1);
        write!(f, "Maid(")?;
        for byte in &self.0[..used] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

struct MaidWriter<'a> {
    buf: &'a mut [u8; MAID_LEN],
    offset: usize,
}

impl MaidWriter<'_> {
    fn put(&mut self, byte: u8) -> Result<()> {
        if self.offset >= MAID_LEN {
            return Err(Error::internal("MAID exceeds 48 bytes"));
        }
        self.buf[self.offset] = byte;
        self.offset += 1;
        Ok(())
    }

    fn put_name(&mut self, name: &[u8]) -> Result<()> {
        let len = u8::try_from(name.len())
            .map_err(|_| Error::internal("MAID name longer than 255 bytes"))?;
        self.put(len)?;

        let end = self.offset + name.len();
        if end > MAID_LEN {
            return Err(Error::internal(format!(
                "MAID exceeds 48 bytes ({} needed)",
                end
            )));
        }
        self.buf[self.offset..end].copy_from_slice(name);
        self.offset = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfm_core::CcmInterval;

    #[test]
    fn test_string_string() {
        let md = MdConf::new("dom", 3);
        let ma = MaConf::new("assoc", CcmInterval::Sec1);
        let maid = Maid::build(&md, &ma).unwrap();

        let expected = [4, 3, b'd', b'o', b'm', 2, 5, b'a', b's', b's', b'o', b'c'];
        assert_eq!(&maid.0[..expected.len()], &expected);
        assert!(maid.0[expected.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_md_none_primary_vid() {
        let md = MdConf {
            format: MdFormat::None,
            ..MdConf::new("ignored", 0)
        };
        let ma = MaConf {
            format: MaFormat::PrimaryVid,
            vlan: 0x0123,
            ..MaConf::new("ignored", CcmInterval::Sec1)
        };
        let maid = Maid::build(&md, &ma).unwrap();
        assert_eq!(&maid.0[..5], &[1, 3, 2, 0x01, 0x23]);
    }

    #[test]
    fn test_two_octet_integer() {
        let md = MdConf {
            format: MdFormat::None,
            ..MdConf::new("", 0)
        };
        let ma = MaConf {
            format: MaFormat::TwoOctetInteger,
            ..MaConf::new("\u{1}\u{2}", CcmInterval::Sec1)
        };
        let maid = Maid::build(&md, &ma).unwrap();
        assert_eq!(&maid.0[..5], &[1, 3, 2, 0x01, 0x02]);
    }

    #[test]
    fn test_y1731_icc() {
        let md = MdConf {
            format: MdFormat::None,
            ..MdConf::new("", 0)
        };
        let ma = MaConf {
            format: MaFormat::Y1731Icc,
            ..MaConf::new("ICC000MEG0001", CcmInterval::Sec1)
        };
        let maid = Maid::build(&md, &ma).unwrap();
        assert_eq!(&maid.0[..3], &[1, 32, 13]);
        assert_eq!(&maid.0[3..16], b"ICC000MEG0001");
    }

    #[test]
    fn test_longest_names_fit() {
        let md = MdConf::new("m".repeat(43), 0);
        let ma = MaConf::new("a".to_string(), CcmInterval::Sec1);
        let maid = Maid::build(&md, &ma).unwrap();
        assert_eq!(maid.0[MAID_LEN - 1], b'a');
    }

    #[test]
    fn test_overflow_is_error() {
        let md = MdConf::new("m".repeat(43), 0);
        let ma = MaConf::new("ab".to_string(), CcmInterval::Sec1);
        assert!(matches!(Maid::build(&md, &ma), Err(Error::Internal(_))));
    }
}
