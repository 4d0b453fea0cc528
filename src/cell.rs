use core::convert::TryFrom;

use ckb_types::bytes::Bytes;
use ckb_types::core::Capacity;
use ckb_types::packed::{Byte32, CellOutput, OutPoint, Script, ScriptOpt};
use ckb_types::prelude::*;
use num_bigint::BigUint;

use crate::error::Error;
use crate::ratio::{Info, INFO_DATA_LEN};
use crate::{decode_i32, decode_u128, decode_u32};

/// Packed order payload: amount, tagged master reference, info. Both master
/// variants are 36 bytes so the payload size never changes across matches.
pub const ORDER_DATA_LEN: usize = 16 + 1 + 36 + INFO_DATA_LEN;

const MASTER_TAG_RELATIVE: u8 = 0;
const MASTER_TAG_ABSOLUTE: u8 = 1;
const INFO_OFFSET: usize = 53;

/// Identity of the witness cell an order answers to.
///
/// A freshly minted order carries a relative reference that resolves against
/// the order's own out point; the canonical mint places the master cell at
/// the next output index, distance `+1`. Matching rewrites the reference to
/// the absolute out point so later descendants keep the same identity.
#[derive(Clone, Debug)]
pub enum Master {
    Relative { distance: i32 },
    Absolute(OutPoint),
}

impl Master {
    pub fn is_relative(&self) -> bool {
        matches!(self, Master::Relative { .. })
    }

    pub fn resolve(&self, current: &OutPoint) -> Result<OutPoint, Error> {
        match self {
            Master::Relative { distance } => {
                let index: u32 = current.index().unpack();
                let shifted = i64::from(index) + i64::from(*distance);
                let index = u32::try_from(shifted).map_err(|_| Error::IndexOutOfBound)?;
                Ok(OutPoint::new(current.tx_hash(), index))
            }
            Master::Absolute(out_point) => Ok(out_point.clone()),
        }
    }
}

impl PartialEq for Master {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Master::Relative { distance: a }, Master::Relative { distance: b }) => a == b,
            (Master::Absolute(a), Master::Absolute(b)) => a.as_slice() == b.as_slice(),
            _ => false,
        }
    }
}

impl Eq for Master {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderData {
    pub udt_amount: u128,
    pub master: Master,
    pub info: Info,
}

impl OrderData {
    pub fn from_raw(data: &[u8]) -> Result<OrderData, Error> {
        crate::check_data_len(ORDER_DATA_LEN, data.len())?;

        let udt_amount = decode_u128(&data[0..16])?;

        let master = match data[16] {
            MASTER_TAG_RELATIVE => {
                if data[17..49].iter().any(|byte| *byte != 0) {
                    return Err(Error::NonZeroPadding);
                }
                Master::Relative {
                    distance: decode_i32(&data[49..53])?,
                }
            }
            MASTER_TAG_ABSOLUTE => {
                let tx_hash =
                    Byte32::from_slice(&data[17..49]).map_err(|_| Error::Encoding)?;
                let index = decode_u32(&data[49..53])?;
                Master::Absolute(OutPoint::new(tx_hash, index))
            }
            tag => return Err(Error::WrongMasterTag(tag)),
        };

        let info = Info::from_raw(&data[INFO_OFFSET..])?;

        Ok(OrderData {
            udt_amount,
            master,
            info,
        })
    }

    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        self.info.validate()?;

        let mut buf = Vec::with_capacity(ORDER_DATA_LEN);
        buf.extend_from_slice(&self.udt_amount.to_le_bytes());
        match &self.master {
            Master::Relative { distance } => {
                buf.push(MASTER_TAG_RELATIVE);
                buf.extend_from_slice(&[0u8; 32]);
                buf.extend_from_slice(&distance.to_le_bytes());
            }
            Master::Absolute(out_point) => {
                buf.push(MASTER_TAG_ABSOLUTE);
                buf.extend_from_slice(out_point.tx_hash().as_slice());
                let index: u32 = out_point.index().unpack();
                buf.extend_from_slice(&index.to_le_bytes());
            }
        }
        self.info.encode_into(&mut buf);

        debug_assert_eq!(buf.len(), ORDER_DATA_LEN);
        Ok(Bytes::from(buf))
    }

    pub fn is_mint(&self) -> bool {
        self.master.is_relative()
    }
}

/// A cell as returned by the chain, out point identity included.
#[derive(Clone, Debug)]
pub struct CellSnapshot {
    pub out_point: OutPoint,
    pub lock: Script,
    pub type_: Option<Script>,
    pub capacity: u64,
    pub data: Bytes,
}

impl CellSnapshot {
    pub fn occupied_capacity(&self) -> Result<u64, Error> {
        occupied_capacity(&self.lock, self.type_.as_ref(), self.data.len())
    }
}

/// Minimum capacity a cell with the given scripts and data size needs to
/// exist on chain, in shannons.
pub fn occupied_capacity(
    lock: &Script,
    type_: Option<&Script>,
    data_len: usize,
) -> Result<u64, Error> {
    let output = CellOutput::new_builder()
        .lock(lock.clone())
        .type_(ScriptOpt::new_builder().set(type_.cloned()).build())
        .build();
    let data_capacity = Capacity::bytes(data_len).map_err(|_| Error::Overflow)?;
    let occupied = output
        .occupied_capacity(data_capacity)
        .map_err(|_| Error::Overflow)?;
    Ok(occupied.as_u64())
}

pub(crate) fn script_opt_eq(a: Option<&Script>, b: Option<&Script>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.as_slice() == b.as_slice(),
        _ => false,
    }
}

/// Decoded view of a live order cell with its derived value measures.
#[derive(Clone, Debug)]
pub struct OrderCell {
    pub cell: CellSnapshot,
    pub data: OrderData,
    pub ckb_occupied: u64,
    pub ckb_unoccupied: u128,
    ckb2udt_value: BigUint,
    udt2ckb_value: BigUint,
    abs_total: BigUint,
    abs_progress: BigUint,
}

impl TryFrom<CellSnapshot> for OrderCell {
    type Error = Error;

    fn try_from(cell: CellSnapshot) -> Result<OrderCell, Error> {
        let data = OrderData::from_raw(&cell.data)?;
        let ckb_occupied = cell.occupied_capacity()?;
        let ckb_unoccupied = u128::from(
            cell.capacity
                .checked_sub(ckb_occupied)
                .ok_or(Error::CapacityBelowOccupied)?,
        );

        let u = BigUint::from(data.udt_amount);
        let k = BigUint::from(ckb_unoccupied);
        let fwd = data.info.ckb_to_udt;
        let bwd = data.info.udt_to_ckb;

        let ckb2udt_value = if fwd.is_populated() {
            &k * fwd.ckb_scale + &u * fwd.udt_scale
        } else {
            BigUint::default()
        };
        let udt2ckb_value = if bwd.is_populated() {
            &k * bwd.ckb_scale + &u * bwd.udt_scale
        } else {
            BigUint::default()
        };

        let (abs_total, abs_progress) = match (fwd.is_populated(), bwd.is_populated()) {
            (true, false) => (ckb2udt_value.clone(), &u * fwd.udt_scale),
            (false, true) => (udt2ckb_value.clone(), &k * bwd.ckb_scale),
            (true, true) => {
                // Integer average of the two cross weighted measures; a
                // dual ratio order is always fully settled.
                let total: BigUint = (&ckb2udt_value * bwd.ckb_scale * bwd.udt_scale
                    + &udt2ckb_value * fwd.ckb_scale * fwd.udt_scale)
                    >> 1;
                (total.clone(), total)
            }
            (false, false) => return Err(Error::RatioAllEmpty),
        };

        Ok(OrderCell {
            cell,
            data,
            ckb_occupied,
            ckb_unoccupied,
            ckb2udt_value,
            udt2ckb_value,
            abs_total,
            abs_progress,
        })
    }
}

impl OrderCell {
    pub fn ckb2udt_value(&self) -> &BigUint {
        &self.ckb2udt_value
    }

    pub fn udt2ckb_value(&self) -> &BigUint {
        &self.udt2ckb_value
    }

    /// Value the order holds, in its own cross weighted measure.
    pub fn abs_total(&self) -> &BigUint {
        &self.abs_total
    }

    /// Portion of `abs_total` already converted to the receiving side.
    pub fn abs_progress(&self) -> &BigUint {
        &self.abs_progress
    }

    pub fn is_ckb2udt_matchable(&self) -> bool {
        self.data.info.ckb_to_udt.is_populated() && self.ckb_unoccupied > 0
    }

    pub fn is_udt2ckb_matchable(&self) -> bool {
        self.data.info.udt_to_ckb.is_populated() && self.data.udt_amount > 0
    }

    pub fn is_matchable(&self) -> bool {
        self.is_ckb2udt_matchable() || self.is_udt2ckb_matchable()
    }

    pub fn resolved_master(&self) -> Result<OutPoint, Error> {
        self.data.master.resolve(&self.cell.out_point)
    }

    /// Checks that `descendant` is a legal successor of this order. A cell
    /// sharing the master reference but failing any of these checks is a
    /// decoy trying to pass itself off as the live order.
    pub fn validate_descendant(&self, descendant: &OrderCell) -> Result<(), Error> {
        if self.cell.out_point.as_slice() == descendant.cell.out_point.as_slice() {
            return Ok(());
        }

        if self.cell.lock.as_slice() != descendant.cell.lock.as_slice() {
            return Err(Error::InvalidDescendant);
        }
        if !script_opt_eq(self.cell.type_.as_ref(), descendant.cell.type_.as_ref()) {
            return Err(Error::InvalidDescendant);
        }

        let own_master = self.resolved_master()?;
        let other_master = descendant.resolved_master()?;
        if own_master.as_slice() != other_master.as_slice() {
            return Err(Error::InvalidDescendant);
        }

        if self.data.info != descendant.data.info {
            return Err(Error::InvalidDescendant);
        }

        if self.abs_total > descendant.abs_total || self.abs_progress > descendant.abs_progress
        {
            return Err(Error::InvalidDescendant);
        }

        Ok(())
    }

    /// Picks the live descendant among `candidates`: the valid one with the
    /// largest progress, preferring a non-mint cell on ties.
    pub fn resolve_descendant(&self, candidates: &[OrderCell]) -> Option<OrderCell> {
        let mut best: Option<&OrderCell> = None;
        for candidate in candidates {
            if self.validate_descendant(candidate).is_err() {
                continue;
            }
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    if candidate.abs_progress > current.abs_progress
                        || (candidate.abs_progress == current.abs_progress
                            && current.data.is_mint()
                            && !candidate.data.is_mint())
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.cloned()
    }
}

/// A master witness cell together with the originally minted order and its
/// current live descendant.
#[derive(Clone, Debug)]
pub struct OrderGroup {
    pub master: CellSnapshot,
    pub order: OrderCell,
    pub origin: OrderCell,
}

impl OrderGroup {
    pub fn try_new(
        master: CellSnapshot,
        origin: OrderCell,
        candidates: &[OrderCell],
        order_script: &Script,
    ) -> Result<OrderGroup, Error> {
        if !script_opt_eq(master.type_.as_ref(), Some(order_script)) {
            return Err(Error::InvalidDescendant);
        }
        if origin.resolved_master()?.as_slice() != master.out_point.as_slice() {
            return Err(Error::InvalidDescendant);
        }

        let order = origin
            .resolve_descendant(candidates)
            .ok_or(Error::InvalidDescendant)?;

        Ok(OrderGroup {
            master,
            order,
            origin,
        })
    }

    /// A group is fulfilled once its live order has nothing left to give in
    /// either direction.
    pub fn is_fulfilled(&self) -> bool {
        !self.order.is_matchable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratio::Ratio;

    fn out_point(byte: u8, index: u32) -> OutPoint {
        OutPoint::new(Byte32::from_slice(&[byte; 32]).unwrap(), index)
    }

    fn sample_info() -> Info {
        Info::new_ckb_to_udt(Ratio::new(10, 1), 33)
    }

    #[test]
    fn order_data_round_trips_relative_master() {
        let data = OrderData {
            udt_amount: 1_000_000,
            master: Master::Relative { distance: 1 },
            info: sample_info(),
        };

        let bytes = data.to_bytes().unwrap();
        assert_eq!(bytes.len(), ORDER_DATA_LEN);
        assert_eq!(OrderData::from_raw(&bytes).unwrap(), data);
    }

    #[test]
    fn order_data_round_trips_absolute_master() {
        let data = OrderData {
            udt_amount: u128::MAX,
            master: Master::Absolute(out_point(7, 5)),
            info: Info {
                ckb_to_udt: Ratio::new(10, 1),
                udt_to_ckb: Ratio::new(9, 1),
                ckb_min_match_log: 0,
            },
        };

        let bytes = data.to_bytes().unwrap();
        assert_eq!(bytes.len(), ORDER_DATA_LEN);
        assert_eq!(OrderData::from_raw(&bytes).unwrap(), data);
    }

    #[test]
    fn order_data_rejects_malformed_payloads() {
        let data = OrderData {
            udt_amount: 1,
            master: Master::Relative { distance: 1 },
            info: sample_info(),
        };
        let bytes = data.to_bytes().unwrap().to_vec();

        assert_eq!(
            OrderData::from_raw(&bytes[..ORDER_DATA_LEN - 1]),
            Err(Error::WrongOrderDataSize(ORDER_DATA_LEN - 1))
        );

        let mut bad_tag = bytes.clone();
        bad_tag[16] = 2;
        assert_eq!(OrderData::from_raw(&bad_tag), Err(Error::WrongMasterTag(2)));

        let mut bad_padding = bytes.clone();
        bad_padding[20] = 1;
        assert_eq!(OrderData::from_raw(&bad_padding), Err(Error::NonZeroPadding));

        // Half populated forward ratio
        let mut bad_info = bytes;
        bad_info[INFO_OFFSET..INFO_OFFSET + 8].copy_from_slice(&0u64.to_le_bytes());
        assert_eq!(
            OrderData::from_raw(&bad_info),
            Err(Error::RatioHalfPopulated)
        );
    }

    #[test]
    fn encoding_rejects_invalid_info() {
        let data = OrderData {
            udt_amount: 1,
            master: Master::Relative { distance: 1 },
            info: Info::new_ckb_to_udt(Ratio::new(10, 0), 33),
        };
        assert_eq!(data.to_bytes(), Err(Error::RatioHalfPopulated));
    }

    #[test]
    fn master_resolution_shifts_by_distance() {
        let current = out_point(3, 4);

        let master = Master::Relative { distance: 1 };
        let resolved = master.resolve(&current).unwrap();
        assert_eq!(resolved.as_slice(), out_point(3, 5).as_slice());

        let master = Master::Relative { distance: -4 };
        let resolved = master.resolve(&current).unwrap();
        assert_eq!(resolved.as_slice(), out_point(3, 0).as_slice());

        let master = Master::Relative { distance: -5 };
        assert_eq!(master.resolve(&current), Err(Error::IndexOutOfBound));

        let target = out_point(9, 0);
        let master = Master::Absolute(target.clone());
        assert_eq!(
            master.resolve(&current).unwrap().as_slice(),
            target.as_slice()
        );
    }
}
