use tracing::{debug, warn};

use crate::config::HdcpConfig;
use crate::error::{HdcpError, HdcpResult};
use crate::regs::{
    KEY_CONF_AKSV_SEND_TRIGGER, KEY_CONF_CLEAR_KEYS_TRIGGER, KEY_CONF_LOAD_TRIGGER,
    KEY_STATUS_CLEAR_ALL, KEY_STATUS_LOAD_DONE, KEY_STATUS_LOAD_STATUS, Register,
};
use crate::transmitter::{KeyLoadMode, Transmitter};
use crate::wait::poll_register_n;

const KEYS_LOADED: u32 = KEY_STATUS_LOAD_DONE | KEY_STATUS_LOAD_STATUS;

/**
    Make sure the transmitter's device keys are loaded, then forward Aksv
    to the port logic.

    Succeeds without touching the hardware when both the done and status
    bits are already set.
*/
pub fn ensure_keys_loaded(tx: &mut dyn Transmitter, config: &HdcpConfig) -> HdcpResult<()> {
    let status = tx.read(Register::KeyStatus);
    if status & KEYS_LOADED == KEYS_LOADED {
        return Ok(());
    }

    match tx.key_load_mode() {
        KeyLoadMode::AtReset if status & KEY_STATUS_LOAD_DONE == 0 => {
            return Err(HdcpError::NoDevice(
                "keys are loaded at reset but the load never completed".into(),
            ));
        }
        KeyLoadMode::ControlPlane => tx.control_plane_load_keys()?,
        KeyLoadMode::AtReset | KeyLoadMode::Register => {
            tx.write(Register::KeyConf, KEY_CONF_LOAD_TRIGGER)
        }
    }

    let status = poll_register_n(
        tx,
        Register::KeyStatus,
        KEY_STATUS_LOAD_DONE,
        config.key_load_polls,
        config.key_load_poll_interval,
        "HDCP key load",
    )?;
    if status & KEY_STATUS_LOAD_STATUS == 0 {
        return Err(HdcpError::NoDevice(format!(
            "key load finished with bad status {status:#010x}"
        )));
    }

    tx.write(Register::KeyConf, KEY_CONF_AKSV_SEND_TRIGGER);
    Ok(())
}

/**
    Drop whatever the key loader holds and clear its sticky status bits.
*/
pub fn clear_keys(tx: &mut dyn Transmitter) {
    tx.write(Register::KeyConf, KEY_CONF_CLEAR_KEYS_TRIGGER);
    tx.write(Register::KeyStatus, KEY_STATUS_CLEAR_ALL);
}

/**
    [`ensure_keys_loaded`] with up to `config.key_load_tries` attempts,
    clearing the key state after each failure.
*/
pub fn load_keys(tx: &mut dyn Transmitter, config: &HdcpConfig) -> HdcpResult<()> {
    if !tx.key_loadable() {
        return Err(HdcpError::NoDevice("key load is not possible".into()));
    }

    let mut last = HdcpError::NoDevice("no key load attempted".into());
    for attempt in 1..=config.key_load_tries.max(1) {
        match ensure_keys_loaded(tx, config) {
            Ok(()) => {
                debug!(port = %tx.port(), attempt, "HDCP keys loaded");
                return Ok(());
            }
            Err(err) => {
                debug!(port = %tx.port(), attempt, error = %err, "HDCP key load failed");
                clear_keys(tx);
                last = err;
            }
        }
    }
    warn!(port = %tx.port(), error = %last, "could not load HDCP keys");
    Err(last)
}
