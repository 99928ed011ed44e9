/*!
    HDCP 1.x transmitter engine: key loading, the two authentication
    phases, link-integrity checking and per-connector scheduling.

    Hardware is reached through two traits: [`Transmitter`] for the display
    engine's HDCP registers and [`Shim`] for the receiver on the other end of
    the link. The `sim` feature provides software implementations of both.
*/

mod auth;
mod config;
mod connector;
mod error;
mod keys;
mod link;
mod regs;
mod repeater;
mod revocation;
mod session;
mod sha;
mod shim;
mod transmitter;
mod wait;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use self::auth::authenticate;
pub use self::config::HdcpConfig;
pub use self::connector::{Connector, ConnectorState, SrmBlob};
pub use self::error::{HdcpError, HdcpResult};
pub use self::keys::{clear_keys, ensure_keys_loaded, load_keys};
pub use self::link::LinkCheck;
pub use self::regs::{Port, Register, ShaTextMode};
pub use self::repeater::authenticate_downstream;
pub use self::revocation::RevocationStore;
pub use self::session::Session;
pub use self::sha::{ShaOp, frame_sha_text, message_bits, write_sha_text};
pub use self::shim::Shim;
pub use self::transmitter::{KeyLoadMode, Transmitter};
pub use self::wait::{Backoff, poll_until, wait_for_bits, wait_for_register};

/// Register bit definitions.
pub mod bits {
    pub use crate::regs::{
        CONF_AUTH_AND_ENC, CONF_CAPTURE_AN, KEY_CONF_AKSV_SEND_TRIGGER,
        KEY_CONF_CLEAR_KEYS_TRIGGER, KEY_CONF_LOAD_TRIGGER, KEY_STATUS_CLEAR_ALL,
        KEY_STATUS_FUSE_DONE, KEY_STATUS_FUSE_ERROR, KEY_STATUS_FUSE_IN_PROGRESS,
        KEY_STATUS_LOAD_DONE, KEY_STATUS_LOAD_STATUS, REP_CTL_SHA1_BUSY, REP_CTL_SHA1_COMPLETE,
        REP_CTL_SHA1_COMPLETE_HASH, REP_CTL_SHA1_READY, REP_CTL_SHA1_V_MATCH, STATUS_AN_READY,
        STATUS_ENC, STATUS_R0_READY, STATUS_RI_MATCH,
    };
}
