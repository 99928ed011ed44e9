use thiserror::Error;

/**
    Errors from System Renewability Message parsing.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SrmError {
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    // ── Header ─────────────────────────────────────────────────────────
    #[error("SRM is {0} bytes, shorter than header and VRL framing")]
    TooShort(usize),
    #[error("SRM id is {0:#x}, expected {1:#x}")]
    SrmIdMismatch(u8, u8),

    // ── VRL framing ───────────────────────────────────────────────────
    #[error("VRL length {vrl_length} exceeds the {available} bytes after the header")]
    VrlLengthExceedsBlob { vrl_length: usize, available: usize },
    #[error("VRL length {0} is smaller than length field and signature")]
    VrlLengthTooSmall(usize),
    #[error("SRM carries no VRL segments")]
    NoVrls,

    // ── Segments ──────────────────────────────────────────────────────
    #[error("VRL segment at offset {offset} claims {count} KSVs, overrunning the payload")]
    SegmentOverrun { offset: usize, count: u8 },
    #[error("counted {counted} revoked KSVs but copied {copied}")]
    KsvCountMismatch { counted: usize, copied: usize },
}

/**
    Errors from KSV construction.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KsvError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("KSV must be 5 bytes, got {0}")]
    InvalidLength(usize),
}

/**
    Error returned by `FromStr` implementations on enum types.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}
