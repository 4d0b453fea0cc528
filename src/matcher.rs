use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;

use crate::cell::OrderCell;
use crate::error::Error;

/// Minimum `b_out` such that `a_scale * a_out + b_scale * b_out` does not
/// fall below `a_scale * a_in + b_scale * b_in`.
///
/// The `(b_in + 1) - 1` form is the exact integer ceiling and must match the
/// chain-side verifier bit for bit; do not simplify it. Partial fills call
/// this with the roles swapped, which makes the `a_in - a_out` term
/// negative, hence the signed intermediates.
pub fn non_decreasing(
    a_scale: u64,
    b_scale: u64,
    a_in: u128,
    b_in: u128,
    a_out: u128,
) -> Result<u128, Error> {
    if a_scale == 0 || b_scale == 0 {
        return Err(Error::ZeroScale);
    }

    let numerator: BigInt = BigInt::from(a_scale) * (BigInt::from(a_in) - BigInt::from(a_out))
        + BigInt::from(b_scale) * (BigInt::from(b_in) + 1)
        - 1;
    let b_out = numerator.div_floor(&BigInt::from(b_scale));

    u128::try_from(b_out).map_err(|_| Error::Overflow)
}

pub(crate) fn div_ceil_big(numerator: BigUint, denominator: u64) -> Result<u128, Error> {
    if denominator == 0 {
        return Err(Error::ZeroScale);
    }
    let denominator = BigUint::from(denominator);
    let out = (numerator + &denominator - 1u8) / denominator;
    u128::try_from(&out).map_err(|_| Error::Overflow)
}

/// One consumed order and the capacity and amount of its successor cell.
#[derive(Clone, Debug)]
pub struct Fill {
    pub order: OrderCell,
    pub ckb_out: u128,
    pub udt_out: u128,
}

/// Net outcome of a set of fills, seen from the matcher's side: a positive
/// delta is an amount the matcher receives.
#[derive(Clone, Debug, Default)]
pub struct Match {
    pub ckb_delta: BigInt,
    pub udt_delta: BigInt,
    pub fills: Vec<Fill>,
}

impl Match {
    pub fn empty() -> Match {
        Match::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }

    pub fn merge(&self, other: &Match) -> Match {
        let mut fills = Vec::with_capacity(self.fills.len() + other.fills.len());
        fills.extend_from_slice(&self.fills);
        fills.extend_from_slice(&other.fills);

        Match {
            ckb_delta: &self.ckb_delta + &other.ckb_delta,
            udt_delta: &self.udt_delta + &other.udt_delta,
            fills,
        }
    }
}

/// Binds one order to a matching direction and computes how far a given
/// counter-asset allowance can fill it.
///
/// Role naming: `a` is the side the order gives away, `b` the side it
/// receives. For ckb -> udt orders `a` is capacity and `b` the UDT amount;
/// the udt -> ckb direction swaps them.
#[derive(Clone, Debug)]
pub struct OrderMatcher {
    order: OrderCell,
    is_ckb2udt: bool,
    a_scale: u64,
    b_scale: u64,
    a_in: u128,
    b_in: u128,
    a_min: u128,
    b_min_match: u128,
    b_max_out: u128,
    b_max_match: u128,
    real_ratio: f64,
}

impl OrderMatcher {
    /// Returns nothing when the order cannot be matched in this direction
    /// or has nothing left to give beyond its storage floor and the mining
    /// fee.
    pub fn new(order: &OrderCell, is_ckb2udt: bool, ckb_mining_fee: u128) -> Option<OrderMatcher> {
        let matchable = if is_ckb2udt {
            order.is_ckb2udt_matchable()
        } else {
            order.is_udt2ckb_matchable()
        };
        if !matchable {
            return None;
        }

        let info = &order.data.info;
        let (ratio, a_in, b_in, a_min, a_mining_fee, b_mining_fee) = if is_ckb2udt {
            (
                info.ckb_to_udt,
                u128::from(order.cell.capacity),
                order.data.udt_amount,
                u128::from(order.ckb_occupied),
                ckb_mining_fee,
                0u128,
            )
        } else {
            (
                info.udt_to_ckb,
                order.data.udt_amount,
                u128::from(order.cell.capacity),
                0u128,
                0u128,
                ckb_mining_fee,
            )
        };
        let (a_scale, b_scale) = if is_ckb2udt {
            (ratio.ckb_scale, ratio.udt_scale)
        } else {
            (ratio.udt_scale, ratio.ckb_scale)
        };

        if a_scale == 0 || b_scale == 0 {
            return None;
        }
        if a_in <= a_min.checked_add(a_mining_fee)? {
            return None;
        }

        let b_max_out = non_decreasing(a_scale, b_scale, a_in, b_in, a_min).ok()?;
        let b_max_match = b_max_out.checked_sub(b_in)?;

        // Anti-dust floor on the receiving side, clamped so a nearly
        // exhausted order can still be taken whole.
        let ckb_min_match = info.ckb_min_match();
        let mut b_min_match = if is_ckb2udt {
            let converted = BigUint::from(ckb_min_match) * a_scale;
            div_ceil_big(converted, b_scale).ok()?
        } else {
            ckb_min_match
        };
        if b_min_match > b_max_match {
            b_min_match = b_max_match;
        }

        let real_ratio =
            (a_in - a_min - a_mining_fee) as f64 / (b_max_match.checked_add(b_mining_fee)?) as f64;
        if !(real_ratio > 0.0) {
            return None;
        }

        Some(OrderMatcher {
            order: order.clone(),
            is_ckb2udt,
            a_scale,
            b_scale,
            a_in,
            b_in,
            a_min,
            b_min_match,
            b_max_out,
            b_max_match,
            real_ratio,
        })
    }

    pub fn order(&self) -> &OrderCell {
        &self.order
    }

    pub fn is_ckb2udt(&self) -> bool {
        self.is_ckb2udt
    }

    /// Effective rate paid to the matcher, only meaningful for ranking.
    pub fn real_ratio(&self) -> f64 {
        self.real_ratio
    }

    pub fn b_min_match(&self) -> u128 {
        self.b_min_match
    }

    pub fn b_max_match(&self) -> u128 {
        self.b_max_match
    }

    /// Largest legal fill for `b_allowance` of the receiving asset. Below
    /// the minimum match size the result is empty; at or above
    /// `b_max_match` the order is taken whole.
    pub fn match_allowance(&self, b_allowance: u128) -> Result<Match, Error> {
        if b_allowance < self.b_min_match {
            return Ok(Match::empty());
        }

        let (a_out, b_out) = if b_allowance >= self.b_max_match {
            (self.a_min, self.b_max_out)
        } else {
            let b_out = self
                .b_in
                .checked_add(b_allowance)
                .ok_or(Error::Overflow)?;
            let a_out = non_decreasing(self.b_scale, self.a_scale, self.b_in, self.a_in, b_out)?;
            (a_out, b_out)
        };

        let a_gain = BigInt::from(self.a_in) - BigInt::from(a_out);
        let b_cost = BigInt::from(b_out) - BigInt::from(self.b_in);

        let (ckb_delta, udt_delta, ckb_out, udt_out) = if self.is_ckb2udt {
            (a_gain, -b_cost, a_out, b_out)
        } else {
            (-b_cost, a_gain, b_out, a_out)
        };

        Ok(Match {
            ckb_delta,
            udt_delta,
            fills: vec![Fill {
                order: self.order.clone(),
                ckb_out,
                udt_out,
            }],
        })
    }

    /// Whether `m` leaves the order with nothing more to give in this
    /// direction.
    pub fn is_full(&self, m: &Match) -> bool {
        m.fills.iter().any(|fill| {
            let a_out = if self.is_ckb2udt {
                fill.ckb_out
            } else {
                fill.udt_out
            };
            a_out == self.a_min
        })
    }
}

impl OrderCell {
    /// Fills this order with `udt_allowance` of UDT, raising when the order
    /// does not take that direction or the allowance is below the minimum
    /// match size.
    pub fn match_ckb2udt(&self, udt_allowance: u128, ckb_mining_fee: u128) -> Result<Match, Error> {
        let matcher =
            OrderMatcher::new(self, true, ckb_mining_fee).ok_or(Error::IncompatibleOrder)?;
        let m = matcher.match_allowance(udt_allowance)?;
        if m.is_empty() {
            return Err(Error::AllowanceBelowMinMatch);
        }
        Ok(m)
    }

    /// Symmetric to [`OrderCell::match_ckb2udt`] for udt -> ckb orders.
    pub fn match_udt2ckb(&self, ckb_allowance: u128, ckb_mining_fee: u128) -> Result<Match, Error> {
        let matcher =
            OrderMatcher::new(self, false, ckb_mining_fee).ok_or(Error::IncompatibleOrder)?;
        let m = matcher.match_allowance(ckb_allowance)?;
        if m.is_empty() {
            return Err(Error::AllowanceBelowMinMatch);
        }
        Ok(m)
    }
}

pub(crate) fn sign_is_negative(value: &BigInt) -> bool {
    value.sign() == Sign::Minus
}
