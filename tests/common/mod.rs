#![allow(dead_code)]

use std::collections::HashMap;

use ckb_types::bytes::Bytes;
use ckb_types::core::{DepType, ScriptHashType};
use ckb_types::packed::{Byte32, CellDep, OutPoint, Script};
use ckb_types::prelude::*;

use asset_order_matcher::cell::{occupied_capacity, CellSnapshot, Master, OrderCell, OrderData};
use asset_order_matcher::{CellQuery, ChainClient, Error, Info, OrderManager, Ratio, ScriptType};

pub fn script(byte: u8) -> Script {
    Script::new_builder()
        .code_hash(Byte32::from_slice(&[byte; 32]).unwrap())
        .hash_type(ScriptHashType::Type.into())
        .args(Bytes::from(vec![byte; 20]).pack())
        .build()
}

pub fn order_script() -> Script {
    script(0xaa)
}

pub fn udt_script() -> Script {
    script(0xbb)
}

pub fn user_lock() -> Script {
    script(0xcc)
}

pub fn out_point(byte: u8, index: u32) -> OutPoint {
    OutPoint::new(Byte32::from_slice(&[byte; 32]).unwrap(), index)
}

fn cell_dep(byte: u8) -> CellDep {
    CellDep::new_builder()
        .out_point(out_point(byte, 0))
        .dep_type(DepType::Code.into())
        .build()
}

pub fn manager() -> OrderManager {
    OrderManager::new(order_script(), udt_script(), cell_dep(0x01), cell_dep(0x02))
}

/// Occupied capacity of an order cell with the fixture scripts, shannons.
pub fn order_occupied() -> u64 {
    occupied_capacity(
        &order_script(),
        Some(&udt_script()),
        asset_order_matcher::cell::ORDER_DATA_LEN,
    )
    .unwrap()
}

pub struct OrderCellBuilder {
    out_point: OutPoint,
    ckb_unoccupied: u64,
    udt_amount: u128,
    ckb_to_udt: Ratio,
    udt_to_ckb: Ratio,
    ckb_min_match_log: u8,
    master: Master,
}

impl OrderCellBuilder {
    pub fn new() -> Self {
        OrderCellBuilder {
            out_point: out_point(0x10, 0),
            ckb_unoccupied: 0,
            udt_amount: 0,
            ckb_to_udt: Ratio::EMPTY,
            udt_to_ckb: Ratio::EMPTY,
            ckb_min_match_log: 0,
            master: Master::Relative { distance: 1 },
        }
    }

    pub fn at(mut self, out_point: OutPoint) -> Self {
        self.out_point = out_point;
        self
    }

    pub fn ckb_unoccupied(mut self, shannons: u64) -> Self {
        self.ckb_unoccupied = shannons;
        self
    }

    pub fn udt_amount(mut self, amount: u128) -> Self {
        self.udt_amount = amount;
        self
    }

    pub fn ckb_to_udt(mut self, ckb_scale: u64, udt_scale: u64) -> Self {
        self.ckb_to_udt = Ratio::new(ckb_scale, udt_scale);
        self
    }

    pub fn udt_to_ckb(mut self, ckb_scale: u64, udt_scale: u64) -> Self {
        self.udt_to_ckb = Ratio::new(ckb_scale, udt_scale);
        self
    }

    pub fn ckb_min_match_log(mut self, log: u8) -> Self {
        self.ckb_min_match_log = log;
        self
    }

    pub fn master(mut self, master: Master) -> Self {
        self.master = master;
        self
    }

    pub fn build_snapshot(self) -> CellSnapshot {
        let data = OrderData {
            udt_amount: self.udt_amount,
            master: self.master,
            info: Info {
                ckb_to_udt: self.ckb_to_udt,
                udt_to_ckb: self.udt_to_ckb,
                ckb_min_match_log: self.ckb_min_match_log,
            },
        };
        let bytes = data.to_bytes().unwrap();
        let capacity =
            occupied_capacity(&order_script(), Some(&udt_script()), bytes.len()).unwrap()
                + self.ckb_unoccupied;

        CellSnapshot {
            out_point: self.out_point,
            lock: order_script(),
            type_: Some(udt_script()),
            capacity,
            data: bytes,
        }
    }

    pub fn build(self) -> OrderCell {
        OrderCell::try_from(self.build_snapshot()).unwrap()
    }
}

pub fn master_snapshot(at: OutPoint) -> CellSnapshot {
    let capacity = occupied_capacity(&user_lock(), Some(&order_script()), 0).unwrap();
    CellSnapshot {
        out_point: at,
        lock: user_lock(),
        type_: Some(order_script()),
        capacity,
        data: Bytes::new(),
    }
}

/// In-memory chain: live cells answer searches, every known cell answers
/// out-point fetches whether spent or not.
#[derive(Default)]
pub struct MemoryChainClient {
    live: Vec<CellSnapshot>,
    history: HashMap<Vec<u8>, CellSnapshot>,
}

impl MemoryChainClient {
    pub fn new() -> Self {
        MemoryChainClient::default()
    }

    pub fn add_live(&mut self, cell: CellSnapshot) {
        self.history
            .insert(cell.out_point.as_slice().to_vec(), cell.clone());
        self.live.push(cell);
    }

    pub fn add_spent(&mut self, cell: CellSnapshot) {
        self.history
            .insert(cell.out_point.as_slice().to_vec(), cell);
    }
}

impl ChainClient for MemoryChainClient {
    fn find_cells(&self, query: &CellQuery) -> Result<Vec<CellSnapshot>, Error> {
        let matches = |cell: &CellSnapshot| {
            let (primary, secondary) = match query.script_type {
                ScriptType::Lock => (Some(&cell.lock), cell.type_.as_ref()),
                ScriptType::Type => (cell.type_.as_ref(), Some(&cell.lock)),
            };
            let Some(primary) = primary else {
                return false;
            };
            if primary.as_slice() != query.script.as_slice() {
                return false;
            }
            match &query.filter_script {
                None => true,
                Some(filter) => {
                    secondary.map(|s| s.as_slice() == filter.as_slice()) == Some(true)
                }
            }
        };

        Ok(self
            .live
            .iter()
            .filter(|cell| matches(cell))
            .take(query.limit)
            .cloned()
            .collect())
    }

    fn get_cell(&self, out_point: &OutPoint) -> Result<Option<CellSnapshot>, Error> {
        Ok(self.history.get(out_point.as_slice()).cloned())
    }
}
