use ckb_types::packed::{OutPoint, Script};

use crate::cell::CellSnapshot;
use crate::error::Error;

/// Which of a cell's two scripts the primary search key matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptType {
    Lock,
    Type,
}

/// Exact-match cell search. `filter_script` narrows the result to cells
/// whose other script equals it.
#[derive(Clone, Debug)]
pub struct CellQuery {
    pub script: Script,
    pub script_type: ScriptType,
    pub filter_script: Option<Script>,
    pub with_data: bool,
    pub limit: usize,
}

/// The chain RPC surface the discovery pipeline consumes. Implementations
/// wrap an indexer-capable node; `get_cell` must serve any output of a
/// known transaction, spent or not, since origin lookups walk historical
/// mint transactions.
pub trait ChainClient {
    fn find_cells(&self, query: &CellQuery) -> Result<Vec<CellSnapshot>, Error>;

    fn get_cell(&self, out_point: &OutPoint) -> Result<Option<CellSnapshot>, Error>;
}
