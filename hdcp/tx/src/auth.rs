use std::thread;
use std::time::Instant;

use rand::RngCore;
use tracing::{debug, error};

use hdcp_core::{An, Ksv, RevocationList, TopologyInfo};

use crate::config::HdcpConfig;
use crate::error::{HdcpError, HdcpResult};
use crate::regs::{
    CONF_AUTH_AND_ENC, CONF_CAPTURE_AN, Register, STATUS_AN_READY, STATUS_ENC, STATUS_R0_READY,
    STATUS_RI_MATCH,
};
use crate::repeater::authenticate_downstream;
use crate::shim::Shim;
use crate::transmitter::Transmitter;
use crate::wait::{wait_for_bits, wait_for_register};

/**
    First part of HDCP 1.x authentication: exchange An/Aksv with the
    receiver, validate its BKSV and confirm R0′. Hands over to the repeater
    stage when the receiver is a repeater.

    Returns the receiver topology seen during this attempt. Keys must
    already be loaded.
*/
pub fn authenticate(
    tx: &mut dyn Transmitter,
    shim: &mut dyn Shim,
    revoked: &RevocationList,
    config: &HdcpConfig,
) -> HdcpResult<TopologyInfo> {
    let port = tx.port();

    // DisplayPort forbids writing An to a sink that is not HDCP capable.
    if shim.hdcp_capable()? == Some(false) {
        error!(%port, "receiver is not HDCP capable");
        return Err(HdcpError::NotCapable);
    }

    let mut rng = rand::rng();
    tx.write(Register::AnInit, rng.next_u32());
    tx.write(Register::AnInit, rng.next_u32());
    tx.write(Register::Conf, CONF_CAPTURE_AN);
    wait_for_bits(
        tx,
        Register::Status,
        STATUS_AN_READY,
        config.an_ready_timeout,
        "An ready",
    )?;

    let an = An::from_le_words(tx.read(Register::AnLo), tx.read(Register::AnHi));
    shim.write_an_aksv(an)?;
    let r0_start = Instant::now();

    let bksv = read_valid_bksv(shim, config.bksv_tries)?;
    if revoked.contains(&[bksv]) {
        error!(%port, %bksv, "BKSV is revoked");
        return Err(HdcpError::PermissionDenied(format!("BKSV {bksv} is revoked")));
    }

    let mut topology = TopologyInfo::new(bksv);
    let [lo, hi] = bksv.to_le_words();
    tx.write(Register::BksvLo, lo);
    tx.write(Register::BksvHi, hi);

    if shim.repeater_present()? {
        tx.write(Register::RepCtl, port.repeater_ctl());
        topology.is_repeater = true;
    }

    shim.toggle_signalling(true)?;
    tx.write(Register::Conf, CONF_AUTH_AND_ENC);

    wait_for_bits(
        tx,
        Register::Status,
        STATUS_R0_READY | STATUS_ENC,
        config.r0_ready_timeout,
        "R0 ready",
    )?;

    // Receivers may take longer than the 100 ms the protocol allows to
    // produce R0′, so the settle window is always waited out in full.
    let settle_until = r0_start + config.r0_settle;
    let now = Instant::now();
    if settle_until > now {
        thread::sleep(settle_until - now);
    }

    confirm_ri(tx, shim, config)?;

    wait_for_register(
        tx,
        Register::Status,
        STATUS_ENC,
        STATUS_ENC,
        config.enc_timeout,
        "encryption",
    )?;

    if topology.is_repeater {
        authenticate_downstream(tx, shim, revoked, config, &mut topology)?;
    } else {
        debug!(%port, "HDCP is enabled (no repeater present)");
    }
    Ok(topology)
}

/**
    Read the BKSV up to `tries` times until it has twenty set bits.
*/
fn read_valid_bksv(shim: &mut dyn Shim, tries: u32) -> HdcpResult<Ksv> {
    for _ in 0..tries.max(1) {
        let bksv = shim.read_bksv()?;
        if bksv.is_valid() {
            return Ok(bksv);
        }
        debug!(%bksv, ones = bksv.ones(), "invalid BKSV");
    }
    Err(HdcpError::NoDevice("BKSV is invalid".into()))
}

fn confirm_ri(
    tx: &mut dyn Transmitter,
    shim: &mut dyn Shim,
    config: &HdcpConfig,
) -> HdcpResult<()> {
    for attempt in 1..=config.ri_tries.max(1) {
        let ri = shim.read_ri_prime()?;
        tx.write(Register::RPrime, ri.to_le_word());
        match wait_for_bits(
            tx,
            Register::Status,
            STATUS_RI_MATCH | STATUS_ENC,
            config.ri_match_timeout,
            "Ri' match",
        ) {
            Ok(_) => return Ok(()),
            Err(HdcpError::Timeout(_)) => {
                debug!(port = %tx.port(), attempt, ri = ?ri, "Ri' mismatch");
            }
            Err(err) => return Err(err),
        }
    }
    error!(
        port = %tx.port(),
        status = format_args!("{:#010x}", tx.read(Register::Status)),
        "timed out waiting for Ri' match"
    );
    Err(HdcpError::Timeout("Ri' match"))
}
