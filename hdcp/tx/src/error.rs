use thiserror::Error;

use hdcp_core::SrmError;

use crate::regs::Port;

/**
    Errors from the HDCP 1.x authentication engine.

    Register, polling and shim failures surface unmodified to the phase
    that issued them; only the session layer retries.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HdcpError {
    // ── Polling ───────────────────────────────────────────────────────
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    // ── Capability / policy ──────────────────────────────────────────
    #[error("receiver is not HDCP capable")]
    NotCapable,
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    // ── Protocol data ────────────────────────────────────────────────
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("repeater V' does not match the computed hash")]
    HashMismatch,

    // ── Device ────────────────────────────────────────────────────────
    #[error("no device: {0}")]
    NoDevice(String),
    #[error("cannot allocate topology for {0} downstream devices")]
    ResourceExhausted(usize),
    #[error("{0} has no HDCP hardware")]
    Unsupported(Port),

    // ── Transport ─────────────────────────────────────────────────────
    #[error("sideband transport failed: {0}")]
    Transport(String),

    // ── Scheduling ────────────────────────────────────────────────────
    #[error("HDCP task did not complete: {0}")]
    TaskFailed(String),

    // ── SRM (delegated to hdcp-core) ──────────────────────────────────
    #[error(transparent)]
    Srm(#[from] SrmError),
}

impl HdcpError {
    /**
        Whether a fresh handshake attempt could succeed after this error.
    */
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unsupported(_) | Self::Srm(_))
    }
}

/**
    Type alias for results that may return an [`HdcpError`].
*/
pub type HdcpResult<T> = std::result::Result<T, HdcpError>;
