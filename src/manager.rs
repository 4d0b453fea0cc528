use std::collections::HashMap;

use ckb_types::bytes::Bytes;
use ckb_types::packed::{CellDep, CellOutput, OutPoint, Script, ScriptOpt};
use ckb_types::prelude::*;
use num_bigint::{BigInt, BigUint};

use crate::cell::{
    occupied_capacity, script_opt_eq, CellSnapshot, Master, OrderCell, OrderData, OrderGroup,
    ORDER_DATA_LEN,
};
use crate::client::{CellQuery, ChainClient, ScriptType};
use crate::constants::{
    CKB_UNIT, DEFAULT_CKB_ALLOWANCE_STEP, DEFAULT_CKB_MIN_MATCH_LOG, DEFAULT_FEE_BASE,
    DEFAULT_FEE_RATE, DEFAULT_FIND_CELLS_LIMIT, INPUT_SIZE,
};
use crate::error::Error;
use crate::matcher::{div_ceil_big, sign_is_negative, Fill, Match, OrderMatcher};
use crate::ratio::{Info, Ratio};
use crate::transaction::TransactionSkeleton;

#[derive(Clone, Copy, Debug)]
pub struct ConvertOptions {
    pub fee: u64,
    pub fee_base: u64,
    pub ckb_min_match_log: u8,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            fee: 0,
            fee_base: DEFAULT_FEE_BASE,
            ckb_min_match_log: DEFAULT_CKB_MIN_MATCH_LOG,
        }
    }
}

/// Preview of what an order at the adjusted rate converts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversion {
    pub converted: u128,
    pub ckb_fee: u128,
    pub info: Info,
}

#[derive(Clone, Copy, Debug)]
pub struct BestMatchOptions {
    /// Shannons per 1000 bytes.
    pub fee_rate: u64,
    pub ckb_allowance_step: u128,
}

impl Default for BestMatchOptions {
    fn default() -> Self {
        BestMatchOptions {
            fee_rate: DEFAULT_FEE_RATE,
            ckb_allowance_step: DEFAULT_CKB_ALLOWANCE_STEP,
        }
    }
}

/// Per-asset budgets the matcher may spend.
#[derive(Clone, Copy, Debug, Default)]
pub struct Allowance {
    pub ckb_value: u128,
    pub udt_value: u128,
}

/// Shapes mint, match and melt transactions for one order script / UDT
/// script pair, and discovers the script's open orders on chain.
#[derive(Clone, Debug)]
pub struct OrderManager {
    order_script: Script,
    udt_script: Script,
    order_cell_dep: CellDep,
    udt_cell_dep: CellDep,
}

impl OrderManager {
    pub fn new(
        order_script: Script,
        udt_script: Script,
        order_cell_dep: CellDep,
        udt_cell_dep: CellDep,
    ) -> Self {
        OrderManager {
            order_script,
            udt_script,
            order_cell_dep,
            udt_cell_dep,
        }
    }

    pub fn order_script(&self) -> &Script {
        &self.order_script
    }

    pub fn udt_script(&self) -> &Script {
        &self.udt_script
    }

    fn register(&self, tx: &mut TransactionSkeleton) {
        tx.add_cell_dep(self.order_cell_dep.clone());
        tx.add_cell_dep(self.udt_cell_dep.clone());
        tx.add_udt_handler(self.udt_script.clone());
    }

    /// Previews the conversion of one side at `midpoint`, degraded by
    /// `fee / fee_base` against the submitter. The returned info carries the
    /// adjusted ratio in the submitter's direction only.
    pub fn convert(
        is_ckb2udt: bool,
        midpoint: Ratio,
        ckb_value: u128,
        udt_value: u128,
        options: &ConvertOptions,
    ) -> Result<Conversion, Error> {
        if !midpoint.is_populated() {
            midpoint.validate()?;
            return Err(Error::RatioAllEmpty);
        }
        if options.fee_base == 0 || options.fee >= options.fee_base {
            return Err(Error::FeeOutOfRange);
        }
        let keep = options.fee_base - options.fee;

        let (converted, ckb_fee, info) = if is_ckb2udt {
            let adjusted = Ratio {
                ckb_scale: midpoint.ckb_scale.checked_mul(keep).ok_or(Error::Overflow)?,
                udt_scale: midpoint
                    .udt_scale
                    .checked_mul(options.fee_base)
                    .ok_or(Error::Overflow)?,
            };
            let converted = div_ceil_big(
                BigUint::from(ckb_value) * adjusted.ckb_scale,
                adjusted.udt_scale,
            )?;
            let ckb_fee = if options.fee == 0 || ckb_value == 0 {
                0
            } else {
                // Shortfall against the midpoint, priced back into CKB at
                // the midpoint itself.
                let at_midpoint = div_ceil_big(
                    BigUint::from(ckb_value) * midpoint.ckb_scale,
                    midpoint.udt_scale,
                )?;
                let shortfall = at_midpoint.saturating_sub(converted);
                div_ceil_big(
                    BigUint::from(shortfall) * midpoint.udt_scale,
                    midpoint.ckb_scale,
                )?
            };
            let info = Info::new_ckb_to_udt(adjusted, options.ckb_min_match_log);
            (converted, ckb_fee, info)
        } else {
            let adjusted = Ratio {
                ckb_scale: midpoint
                    .ckb_scale
                    .checked_mul(options.fee_base)
                    .ok_or(Error::Overflow)?,
                udt_scale: midpoint.udt_scale.checked_mul(keep).ok_or(Error::Overflow)?,
            };
            let converted = div_ceil_big(
                BigUint::from(udt_value) * adjusted.udt_scale,
                adjusted.ckb_scale,
            )?;
            let ckb_fee = if options.fee == 0 || udt_value == 0 {
                0
            } else {
                let at_midpoint = div_ceil_big(
                    BigUint::from(udt_value) * midpoint.udt_scale,
                    midpoint.ckb_scale,
                )?;
                at_midpoint.saturating_sub(converted)
            };
            let info = Info::new_udt_to_ckb(adjusted, options.ckb_min_match_log);
            (converted, ckb_fee, info)
        };

        info.validate()?;
        Ok(Conversion {
            converted,
            ckb_fee,
            info,
        })
    }

    /// Appends the order cell and its master witness cell as two
    /// consecutive outputs. Returns the order's output index; the master
    /// lands at the next one, which is what the order's relative master
    /// distance of `+1` resolves to.
    pub fn mint(
        &self,
        tx: &mut TransactionSkeleton,
        master_lock: Script,
        ckb_value: u128,
        udt_value: u128,
        info: Info,
    ) -> Result<usize, Error> {
        info.validate()?;
        self.register(tx);

        let data = OrderData {
            udt_amount: udt_value,
            master: Master::Relative { distance: 1 },
            info,
        };
        let bytes = data.to_bytes()?;

        let occupied = occupied_capacity(&self.order_script, Some(&self.udt_script), bytes.len())?;
        let capacity = u128::from(occupied)
            .checked_add(ckb_value)
            .ok_or(Error::Overflow)?;
        let capacity = u64::try_from(capacity).map_err(|_| Error::CapacityOverflow)?;

        let order_output = CellOutput::new_builder()
            .capacity(capacity.pack())
            .lock(self.order_script.clone())
            .type_(
                ScriptOpt::new_builder()
                    .set(Some(self.udt_script.clone()))
                    .build(),
            )
            .build();
        let order_index = tx.add_output(order_output, bytes);

        let master_capacity = occupied_capacity(&master_lock, Some(&self.order_script), 0)?;
        let master_output = CellOutput::new_builder()
            .capacity(master_capacity.pack())
            .lock(master_lock)
            .type_(
                ScriptOpt::new_builder()
                    .set(Some(self.order_script.clone()))
                    .build(),
            )
            .build();
        tx.add_output(master_output, Bytes::new());

        Ok(order_index)
    }

    /// Consumes each filled order and appends its successor cell. The
    /// master reference is rewritten from relative to absolute so every
    /// later descendant keeps pointing at the same witness.
    pub fn add_match(&self, tx: &mut TransactionSkeleton, fills: &[Fill]) -> Result<(), Error> {
        self.register(tx);

        for fill in fills {
            let master = fill.order.resolved_master()?;
            let data = OrderData {
                udt_amount: fill.udt_out,
                master: Master::Absolute(master),
                info: fill.order.data.info,
            };
            let bytes = data.to_bytes()?;
            let capacity = u64::try_from(fill.ckb_out).map_err(|_| Error::CapacityOverflow)?;

            tx.add_input(fill.order.cell.clone());
            let output = CellOutput::new_builder()
                .capacity(capacity.pack())
                .lock(fill.order.cell.lock.clone())
                .type_(
                    ScriptOpt::new_builder()
                        .set(fill.order.cell.type_.clone())
                        .build(),
                )
                .build();
            tx.add_output(output, bytes);
        }

        Ok(())
    }

    /// Consumes each group's order and master cells, returning their
    /// deposits to the master's owner.
    pub fn melt(&self, tx: &mut TransactionSkeleton, groups: &[OrderGroup], only_fulfilled: bool) {
        self.register(tx);

        for group in groups {
            if only_fulfilled && !group.is_fulfilled() {
                continue;
            }
            tx.add_input(group.order.cell.clone());
            tx.add_input(group.master.clone());
        }
    }

    /// Serialized size of a matched order cell in bytes, constant for a
    /// given script pair.
    fn order_size(&self) -> Result<u64, Error> {
        let occupied = occupied_capacity(&self.order_script, Some(&self.udt_script), ORDER_DATA_LEN)?;
        Ok(occupied / CKB_UNIT)
    }

    fn ckb_mining_fee(&self, fee_rate: u64) -> Result<u128, Error> {
        let weight = u128::from(INPUT_SIZE) + u128::from(self.order_size()?);
        let fee = weight
            .checked_mul(u128::from(fee_rate))
            .ok_or(Error::Overflow)?;
        Ok((fee + 999) / 1000)
    }

    /// Selects the most profitable feasible set of fills across both
    /// directions under the given budgets.
    ///
    /// Each direction's stream is already sorted best rate first, so its
    /// marginal gain only degrades; a 2-wide look-ahead per stream is
    /// enough to reconcile the two against the shared budgets without
    /// enumerating the whole product.
    pub fn best_match(
        &self,
        pool: &[OrderCell],
        allowance: Allowance,
        exchange_rate: Ratio,
        options: &BestMatchOptions,
    ) -> Result<Match, Error> {
        if !exchange_rate.is_populated() {
            exchange_rate.validate()?;
            return Err(Error::RatioAllEmpty);
        }

        let ckb_mining_fee = self.ckb_mining_fee(options.fee_rate)?;
        let ckb_step = options.ckb_allowance_step.max(1);
        let udt_step = div_ceil_big(
            BigUint::from(ckb_step) * exchange_rate.ckb_scale,
            exchange_rate.udt_scale,
        )?
        .max(1);

        let mut ckb2udt = Lookahead::new(sequential_matcher(pool, true, udt_step, ckb_mining_fee));
        let mut udt2ckb = Lookahead::new(sequential_matcher(pool, false, ckb_step, ckb_mining_fee));

        let ckb_budget = BigInt::from(allowance.ckb_value);
        let udt_budget = BigInt::from(allowance.udt_value);
        let fee = BigInt::from(ckb_mining_fee);

        let mut best: Option<(BigInt, Match)> = None;
        loop {
            let mut chosen: Option<(BigInt, usize, usize)> = None;
            for (i, fwd) in ckb2udt.window().iter().enumerate() {
                for (j, bwd) in udt2ckb.window().iter().enumerate() {
                    let ckb_delta = &fwd.ckb_delta + &bwd.ckb_delta;
                    let udt_delta = &fwd.udt_delta + &bwd.udt_delta;
                    let fills = fwd.fills.len() + bwd.fills.len();
                    let ckb_fee = &fee * (fills as u64);

                    if sign_is_negative(&(&ckb_budget + &ckb_delta - &ckb_fee)) {
                        continue;
                    }
                    if sign_is_negative(&(&udt_budget + &udt_delta)) {
                        continue;
                    }

                    let gain = &ckb_delta * exchange_rate.ckb_scale
                        + &udt_delta * exchange_rate.udt_scale;
                    let better = match &chosen {
                        None => true,
                        Some((top, _, _)) => gain > *top,
                    };
                    if better {
                        chosen = Some((gain, i, j));
                    }
                }
            }

            let Some((gain, i, j)) = chosen else {
                break;
            };
            let better_overall = match &best {
                None => true,
                Some((top, _)) => gain > *top,
            };
            if better_overall {
                let combined = ckb2udt.window()[i].merge(&udt2ckb.window()[j]);
                best = Some((gain, combined));
            }

            if i == 0 && j == 0 {
                break;
            }
            ckb2udt.advance(i);
            udt2ckb.advance(j);
        }

        Ok(best.map(|(_, m)| m).unwrap_or_else(Match::empty))
    }

    /// Discovers every open order group of this script pair. Malformed
    /// cells are skipped silently; yield order is unspecified.
    pub fn find_orders(&self, client: &dyn ChainClient) -> Result<Vec<OrderGroup>, Error> {
        let master_query = CellQuery {
            script: self.order_script.clone(),
            script_type: ScriptType::Type,
            filter_script: None,
            with_data: true,
            limit: DEFAULT_FIND_CELLS_LIMIT,
        };
        let mut masters: HashMap<Vec<u8>, CellSnapshot> = HashMap::new();
        for cell in client.find_cells(&master_query)? {
            if script_opt_eq(cell.type_.as_ref(), Some(&self.order_script)) {
                masters.insert(cell.out_point.as_slice().to_vec(), cell);
            }
        }

        let order_query = CellQuery {
            script: self.order_script.clone(),
            script_type: ScriptType::Lock,
            filter_script: Some(self.udt_script.clone()),
            with_data: true,
            limit: DEFAULT_FIND_CELLS_LIMIT,
        };
        let mut buckets: HashMap<Vec<u8>, Vec<OrderCell>> = HashMap::new();
        for cell in client.find_cells(&order_query)? {
            if cell.lock.as_slice() != self.order_script.as_slice() {
                continue;
            }
            if !script_opt_eq(cell.type_.as_ref(), Some(&self.udt_script)) {
                continue;
            }
            let Ok(order) = OrderCell::try_from(cell) else {
                continue;
            };
            let Ok(master) = order.resolved_master() else {
                continue;
            };
            buckets
                .entry(master.as_slice().to_vec())
                .or_default()
                .push(order);
        }

        let mut groups = Vec::new();
        for (key, candidates) in buckets {
            let Some(master) = masters.get(&key) else {
                continue;
            };
            let Some(origin) = self.find_origin(client, &master.out_point)? else {
                continue;
            };
            let Ok(group) =
                OrderGroup::try_new(master.clone(), origin, &candidates, &self.order_script)
            else {
                continue;
            };
            groups.push(group);
        }
        Ok(groups)
    }

    /// Seeks the originally minted order among the outputs of the master's
    /// own transaction: from the master's index backwards to 0, then
    /// forwards until a missing cell ends the scan.
    fn find_origin(
        &self,
        client: &dyn ChainClient,
        master: &OutPoint,
    ) -> Result<Option<OrderCell>, Error> {
        let tx_hash = master.tx_hash();
        let master_index: u32 = master.index().unpack();

        for index in (0..=master_index).rev() {
            let out_point = OutPoint::new(tx_hash.clone(), index);
            let Some(cell) = client.get_cell(&out_point)? else {
                continue;
            };
            if let Some(origin) = self.as_origin(cell, master) {
                return Ok(Some(origin));
            }
        }

        let mut index = master_index;
        loop {
            index = match index.checked_add(1) {
                Some(next) => next,
                None => return Ok(None),
            };
            let out_point = OutPoint::new(tx_hash.clone(), index);
            let Some(cell) = client.get_cell(&out_point)? else {
                return Ok(None);
            };
            if let Some(origin) = self.as_origin(cell, master) {
                return Ok(Some(origin));
            }
        }
    }

    fn as_origin(&self, cell: CellSnapshot, master: &OutPoint) -> Option<OrderCell> {
        if cell.lock.as_slice() != self.order_script.as_slice() {
            return None;
        }
        if !script_opt_eq(cell.type_.as_ref(), Some(&self.udt_script)) {
            return None;
        }
        let order = OrderCell::try_from(cell).ok()?;
        let resolved = order.resolved_master().ok()?;
        (resolved.as_slice() == master.as_slice()).then_some(order)
    }
}

/// Lazy stream of cumulative matches over `pool`, best rate first.
///
/// The first yield is always the empty match. Each matcher's reachable fill
/// is split into near-equal chunks no larger than `allowance_step`, and one
/// cumulative match is yielded per chunk; a matcher whose minimum match
/// size exceeds the walked allowance is dropped whole.
pub fn sequential_matcher(
    pool: &[OrderCell],
    is_ckb2udt: bool,
    allowance_step: u128,
    ckb_mining_fee: u128,
) -> SequentialMatcher {
    let mut matchers: Vec<OrderMatcher> = pool
        .iter()
        .filter_map(|order| OrderMatcher::new(order, is_ckb2udt, ckb_mining_fee))
        .collect();
    matchers.sort_by(|x, y| {
        y.real_ratio()
            .partial_cmp(&x.real_ratio())
            .unwrap_or(core::cmp::Ordering::Equal)
    });

    SequentialMatcher {
        matchers,
        next: 0,
        step: allowance_step.max(1),
        base: Match::empty(),
        current: None,
        yielded_initial: false,
    }
}

pub struct SequentialMatcher {
    matchers: Vec<OrderMatcher>,
    next: usize,
    step: u128,
    base: Match,
    current: Option<Partition>,
    yielded_initial: bool,
}

/// Near-equal split of one matcher's `b_max_match`: `chunks` is the largest
/// count whose chunks stay at least one step apart fair, sizes differ by at
/// most one.
struct Partition {
    chunks: u128,
    quotient: u128,
    remainder: u128,
    taken: u128,
    allowance: u128,
}

impl Partition {
    fn new(b_max_match: u128, step: u128) -> Partition {
        let chunks = b_max_match / step + u128::from(b_max_match % step != 0);
        Partition {
            chunks,
            quotient: b_max_match / chunks,
            remainder: b_max_match % chunks,
            taken: 0,
            allowance: 0,
        }
    }

    fn advance(&mut self) -> u128 {
        let chunk = if self.taken < self.remainder {
            self.quotient + 1
        } else {
            self.quotient
        };
        self.taken += 1;
        self.allowance += chunk;
        self.allowance
    }

    fn exhausted(&self) -> bool {
        self.taken == self.chunks
    }
}

impl Iterator for SequentialMatcher {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if !self.yielded_initial {
            self.yielded_initial = true;
            return Some(Match::empty());
        }

        while self.next < self.matchers.len() {
            let matcher = &self.matchers[self.next];
            if self.current.is_none() {
                if matcher.b_max_match() == 0 {
                    self.next += 1;
                    continue;
                }
                self.current = Some(Partition::new(matcher.b_max_match(), self.step));
            }
            let Some(partition) = self.current.as_mut() else {
                continue;
            };

            let allowance = partition.advance();
            let exhausted = partition.exhausted();

            let m = match matcher.match_allowance(allowance) {
                Ok(m) => m,
                Err(_) => {
                    self.current = None;
                    self.next += 1;
                    continue;
                }
            };
            if m.is_empty() {
                // Still below this order's minimum match size; its rate is
                // no better than what follows, drop it whole.
                self.current = None;
                self.next += 1;
                continue;
            }

            let cumulative = self.base.merge(&m);
            if exhausted {
                self.base = cumulative.clone();
                self.current = None;
                self.next += 1;
            }
            return Some(cumulative);
        }
        None
    }
}

/// Small buffered stream: up to two pending elements addressable by index,
/// advanced by consuming a prefix and refilling.
struct Lookahead<I: Iterator<Item = Match>> {
    iter: I,
    window: Vec<Match>,
}

const LOOKAHEAD_SIZE: usize = 2;

impl<I: Iterator<Item = Match>> Lookahead<I> {
    fn new(iter: I) -> Self {
        let mut lookahead = Lookahead {
            iter,
            window: Vec::with_capacity(LOOKAHEAD_SIZE),
        };
        lookahead.refill();
        lookahead
    }

    fn refill(&mut self) {
        while self.window.len() < LOOKAHEAD_SIZE {
            match self.iter.next() {
                Some(m) => self.window.push(m),
                None => break,
            }
        }
    }

    fn window(&self) -> &[Match] {
        &self.window
    }

    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            if self.window.is_empty() {
                break;
            }
            self.window.remove(0);
        }
        self.refill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_without_fee_is_the_midpoint() {
        let conversion = OrderManager::convert(
            true,
            Ratio::new(1, 1),
            100_000,
            0,
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(conversion.converted, 100_000);
        assert_eq!(conversion.ckb_fee, 0);
        assert_eq!(conversion.info.ckb_to_udt, Ratio::new(100_000, 100_000));
        assert!(conversion.info.udt_to_ckb.is_empty());
    }

    #[test]
    fn convert_degrades_the_rate_and_prices_the_fee_at_midpoint() {
        let options = ConvertOptions {
            fee: 300,
            ..ConvertOptions::default()
        };
        let conversion =
            OrderManager::convert(true, Ratio::new(1, 1), 100_000, 0, &options).unwrap();
        assert_eq!(conversion.converted, 99_700);
        assert_eq!(conversion.ckb_fee, 300);
        assert_eq!(conversion.info.ckb_to_udt, Ratio::new(99_700, 100_000));
    }

    #[test]
    fn convert_udt_to_ckb_side() {
        let options = ConvertOptions {
            fee: 50_000,
            ..ConvertOptions::default()
        };
        let conversion =
            OrderManager::convert(false, Ratio::new(2, 1), 0, 1_000, &options).unwrap();
        // Midpoint turns 1000 udt into 500 ckb, the halved rate into 250.
        assert_eq!(conversion.converted, 250);
        assert_eq!(conversion.ckb_fee, 250);
        assert!(conversion.info.ckb_to_udt.is_empty());
        assert_eq!(conversion.info.udt_to_ckb, Ratio::new(200_000, 50_000));
    }

    #[test]
    fn convert_of_nothing_costs_nothing() {
        let options = ConvertOptions {
            fee: 300,
            ..ConvertOptions::default()
        };
        let conversion = OrderManager::convert(true, Ratio::new(1, 1), 0, 0, &options).unwrap();
        assert_eq!(conversion.converted, 0);
        assert_eq!(conversion.ckb_fee, 0);
    }

    #[test]
    fn convert_rejects_a_consuming_fee() {
        let options = ConvertOptions {
            fee: DEFAULT_FEE_BASE,
            ..ConvertOptions::default()
        };
        assert_eq!(
            OrderManager::convert(true, Ratio::new(1, 1), 1, 0, &options),
            Err(Error::FeeOutOfRange)
        );
    }
}
