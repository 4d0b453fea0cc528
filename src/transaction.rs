use ckb_types::bytes::Bytes;
use ckb_types::packed::{CellDep, CellOutput, Script};
use ckb_types::prelude::*;

use crate::cell::CellSnapshot;
use crate::error::Error;

/// The transaction under construction. Exclusively owned by the calling
/// flow; mint, match and melt append to it in place, and a raised error
/// leaves it poisoned.
#[derive(Clone, Debug, Default)]
pub struct TransactionSkeleton {
    cell_deps: Vec<CellDep>,
    udt_handlers: Vec<Script>,
    inputs: Vec<CellSnapshot>,
    outputs: Vec<(CellOutput, Bytes)>,
}

impl TransactionSkeleton {
    pub fn new() -> Self {
        TransactionSkeleton::default()
    }

    pub fn add_cell_dep(&mut self, dep: CellDep) {
        if !self
            .cell_deps
            .iter()
            .any(|known| known.as_slice() == dep.as_slice())
        {
            self.cell_deps.push(dep);
        }
    }

    pub fn add_udt_handler(&mut self, udt_script: Script) {
        if !self
            .udt_handlers
            .iter()
            .any(|known| known.as_slice() == udt_script.as_slice())
        {
            self.udt_handlers.push(udt_script);
        }
    }

    pub fn add_input(&mut self, cell: CellSnapshot) -> usize {
        self.inputs.push(cell);
        self.inputs.len() - 1
    }

    pub fn add_output(&mut self, output: CellOutput, data: Bytes) -> usize {
        self.outputs.push((output, data));
        self.outputs.len() - 1
    }

    pub fn set_output_capacity(&mut self, index: usize, capacity: u64) -> Result<(), Error> {
        let (output, _) = self
            .outputs
            .get_mut(index)
            .ok_or(Error::IndexOutOfBound)?;
        *output = output
            .clone()
            .as_builder()
            .capacity(capacity.pack())
            .build();
        Ok(())
    }

    pub fn output_capacity(&self, index: usize) -> Option<u64> {
        self.outputs
            .get(index)
            .map(|(output, _)| output.capacity().unpack())
    }

    pub fn cell_deps(&self) -> &[CellDep] {
        &self.cell_deps
    }

    pub fn udt_handlers(&self) -> &[Script] {
        &self.udt_handlers
    }

    pub fn inputs(&self) -> &[CellSnapshot] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[(CellOutput, Bytes)] {
        &self.outputs
    }
}
