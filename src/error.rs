use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Cell data decoding
    #[error("order data is {0} bytes, expected 86")]
    WrongOrderDataSize(usize),
    #[error("unknown master tag {0}")]
    WrongMasterTag(u8),
    #[error("relative master padding is not all zero")]
    NonZeroPadding,
    #[error("malformed field encoding")]
    Encoding,
    #[error("cell capacity is below its occupied capacity")]
    CapacityBelowOccupied,
    #[error("out point index out of bound")]
    IndexOutOfBound,

    // Entity validation
    #[error("ckb min match log {0} exceeds 64")]
    CkbMinMatchLogTooLarge(u8),
    #[error("ratio must be empty or have both scales positive")]
    RatioHalfPopulated,
    #[error("info must populate at least one ratio")]
    RatioAllEmpty,
    #[error("dual ratio pair extracts value on a round trip")]
    ValueExtractingRatio,
    #[error("fee must be below the fee base")]
    FeeOutOfRange,

    // Matching
    #[error("allowance is below the minimum match size")]
    AllowanceBelowMinMatch,
    #[error("order cannot be matched in the requested direction")]
    IncompatibleOrder,
    #[error("scale must be positive")]
    ZeroScale,
    #[error("arithmetic overflow")]
    Overflow,

    // Descendant resolution
    #[error("descendant does not derive from the origin order")]
    InvalidDescendant,

    // Transaction assembly
    #[error("output capacity does not fit the chain's capacity width")]
    CapacityOverflow,

    // Blockchain client
    #[error("rpc failure: {0}")]
    Rpc(String),
}
