// Asset order matching core
//
// An order is one on-chain cell: its lock is the order script, its type is
// the UDT script, and its 86 bytes of cell data carry the amount, a master
// reference and the limit-price info.
//
// The library covers three scenarios:
//
// 1. Placing an order mints two consecutive outputs, the order cell and a
// master witness cell. The order's master reference is relative and resolves
// to the master cell's own out point, so every later descendant of the order
// can be traced back to the same witness.
//
// 2. Matching consumes an order cell and produces a successor with the same
// scripts, updated amounts and the master rewritten to its absolute out
// point. The successor never holds less value than the order it replaces;
// the matcher keeps the difference.
//
// 3. Melting consumes an order cell together with its master cell, which
// returns both deposits to whoever controls the master's lock.

pub mod cell;
pub mod client;
pub mod constants;
pub mod error;
pub mod manager;
pub mod matcher;
pub mod ratio;
pub mod transaction;

pub use cell::{CellSnapshot, Master, OrderCell, OrderData, OrderGroup};
pub use client::{CellQuery, ChainClient, ScriptType};
pub use error::Error;
pub use manager::{
    sequential_matcher, Allowance, BestMatchOptions, Conversion, ConvertOptions, OrderManager,
    SequentialMatcher,
};
pub use matcher::{non_decreasing, Fill, Match, OrderMatcher};
pub use ratio::{Info, Ratio};
pub use transaction::TransactionSkeleton;

pub fn check_data_len(expected: usize, actual: usize) -> Result<(), Error> {
    if actual != expected {
        return Err(Error::WrongOrderDataSize(actual));
    }
    Ok(())
}

pub fn decode_u128(data: &[u8]) -> Result<u128, Error> {
    if data.len() != 16 {
        return Err(Error::Encoding);
    }

    let mut buf = [0u8; 16];
    buf.copy_from_slice(data);
    Ok(u128::from_le_bytes(buf))
}

pub fn decode_u64(data: &[u8]) -> Result<u64, Error> {
    if data.len() != 8 {
        return Err(Error::Encoding);
    }

    let mut buf = [0u8; 8];
    buf.copy_from_slice(data);
    Ok(u64::from_le_bytes(buf))
}

pub fn decode_u32(data: &[u8]) -> Result<u32, Error> {
    if data.len() != 4 {
        return Err(Error::Encoding);
    }

    let mut buf = [0u8; 4];
    buf.copy_from_slice(data);
    Ok(u32::from_le_bytes(buf))
}

pub fn decode_i32(data: &[u8]) -> Result<i32, Error> {
    if data.len() != 4 {
        return Err(Error::Encoding);
    }

    let mut buf = [0u8; 4];
    buf.copy_from_slice(data);
    Ok(i32::from_le_bytes(buf))
}

pub fn decode_u8(data: &[u8]) -> Result<u8, Error> {
    if data.len() != 1 {
        return Err(Error::Encoding);
    }

    let mut buf = [0u8; 1];
    buf.copy_from_slice(data);
    Ok(u8::from_le_bytes(buf))
}
