use core::cmp::Ordering;

use crate::constants::MAX_CKB_MIN_MATCH_LOG;
use crate::error::Error;
use crate::{decode_u64, decode_u8};

pub const INFO_DATA_LEN: usize = 33;

/// Exchange rate `ckb_scale / udt_scale` for the direction it is attached
/// to. A value of `c` CKB and `u` UDT weighs `c * ckb_scale + u * udt_scale`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ratio {
    pub ckb_scale: u64,
    pub udt_scale: u64,
}

impl Ratio {
    pub const EMPTY: Ratio = Ratio {
        ckb_scale: 0,
        udt_scale: 0,
    };

    pub fn new(ckb_scale: u64, udt_scale: u64) -> Self {
        Ratio {
            ckb_scale,
            udt_scale,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ckb_scale == 0 && self.udt_scale == 0
    }

    pub fn is_populated(&self) -> bool {
        self.ckb_scale > 0 && self.udt_scale > 0
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.is_empty() || self.is_populated() {
            Ok(())
        } else {
            Err(Error::RatioHalfPopulated)
        }
    }

    /// Compares two rates in the cross product domain. Distinct scale pairs
    /// can denote the same rate, so this is deliberately not `Ord`.
    pub fn compare(&self, other: &Ratio) -> Ordering {
        if self.ckb_scale == other.ckb_scale {
            // Same numerator, the bigger denominator is the smaller rate
            return other.udt_scale.cmp(&self.udt_scale);
        }
        if self.udt_scale == other.udt_scale {
            return self.ckb_scale.cmp(&other.ckb_scale);
        }

        let lhs = u128::from(self.ckb_scale) * u128::from(other.udt_scale);
        let rhs = u128::from(other.ckb_scale) * u128::from(self.udt_scale);
        lhs.cmp(&rhs)
    }
}

/// Price descriptor of an order. At least one direction is populated; a
/// dual-ratio pair must not extract value when round tripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Info {
    pub ckb_to_udt: Ratio,
    pub udt_to_ckb: Ratio,
    pub ckb_min_match_log: u8,
}

impl Info {
    pub fn new_ckb_to_udt(ratio: Ratio, ckb_min_match_log: u8) -> Self {
        Info {
            ckb_to_udt: ratio,
            udt_to_ckb: Ratio::EMPTY,
            ckb_min_match_log,
        }
    }

    pub fn new_udt_to_ckb(ratio: Ratio, ckb_min_match_log: u8) -> Self {
        Info {
            ckb_to_udt: Ratio::EMPTY,
            udt_to_ckb: ratio,
            ckb_min_match_log,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.ckb_min_match_log > MAX_CKB_MIN_MATCH_LOG {
            return Err(Error::CkbMinMatchLogTooLarge(self.ckb_min_match_log));
        }

        self.ckb_to_udt.validate()?;
        self.udt_to_ckb.validate()?;

        match (self.ckb_to_udt.is_populated(), self.udt_to_ckb.is_populated()) {
            (false, false) => Err(Error::RatioAllEmpty),
            (true, true) => {
                // Require ckb_to_udt >= udt_to_ckb in the cross product
                // domain, otherwise a ckb -> udt -> ckb round trip mints
                // value out of nothing.
                let forward = u128::from(self.ckb_to_udt.ckb_scale)
                    * u128::from(self.udt_to_ckb.udt_scale);
                let backward = u128::from(self.ckb_to_udt.udt_scale)
                    * u128::from(self.udt_to_ckb.ckb_scale);
                if forward < backward {
                    return Err(Error::ValueExtractingRatio);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn is_dual(&self) -> bool {
        self.ckb_to_udt.is_populated() && self.udt_to_ckb.is_populated()
    }

    /// Minimum CKB-equivalent size of any partial match.
    pub fn ckb_min_match(&self) -> u128 {
        1u128 << self.ckb_min_match_log
    }

    pub fn from_raw(data: &[u8]) -> Result<Info, Error> {
        if data.len() != INFO_DATA_LEN {
            return Err(Error::Encoding);
        }

        let info = Info {
            ckb_to_udt: Ratio {
                ckb_scale: decode_u64(&data[0..8])?,
                udt_scale: decode_u64(&data[8..16])?,
            },
            udt_to_ckb: Ratio {
                ckb_scale: decode_u64(&data[16..24])?,
                udt_scale: decode_u64(&data[24..32])?,
            },
            ckb_min_match_log: decode_u8(&data[32..33])?,
        };

        info.validate()?;
        Ok(info)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.ckb_to_udt.ckb_scale.to_le_bytes());
        buf.extend_from_slice(&self.ckb_to_udt.udt_scale.to_le_bytes());
        buf.extend_from_slice(&self.udt_to_ckb.ckb_scale.to_le_bytes());
        buf.extend_from_slice(&self.udt_to_ckb.udt_scale.to_le_bytes());
        buf.push(self.ckb_min_match_log);
    }
}
