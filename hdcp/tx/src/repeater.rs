use tracing::{debug, error};

use hdcp_core::{Ksv, RevocationList, TopologyInfo, V_PRIME_NUM_PARTS};

use crate::config::HdcpConfig;
use crate::error::{HdcpError, HdcpResult};
use crate::regs::{REP_CTL_SHA1_COMPLETE, REP_CTL_SHA1_COMPLETE_HASH, REP_CTL_SHA1_V_MATCH, Register};
use crate::sha::{frame_sha_text, write_sha_text};
use crate::shim::Shim;
use crate::transmitter::Transmitter;
use crate::wait::{Backoff, poll_until, wait_for_bits};

/**
    Second part of HDCP 1.x authentication: collect the repeater's
    downstream KSV list and have the transmitter verify the repeater's V′
    over it.

    Fills `topology` with the downstream device count, depth and KSVs
    once they pass the revocation check.
*/
pub fn authenticate_downstream(
    tx: &mut dyn Transmitter,
    shim: &mut dyn Shim,
    revoked: &RevocationList,
    config: &HdcpConfig,
    topology: &mut TopologyInfo,
) -> HdcpResult<()> {
    let port = tx.port();

    poll_until(
        config.ksv_fifo_timeout,
        Backoff {
            min: config.ksv_fifo_poll_min,
            max: config.ksv_fifo_poll_max,
        },
        "KSV list ready",
        || shim.read_ksv_ready(),
    )
    .inspect_err(|err| error!(%port, error = %err, "KSV list failed to become ready"))?;

    let bstatus = shim.read_bstatus()?;
    if bstatus.topology_exceeded() {
        error!(%port, ?bstatus, "max topology limit exceeded");
        return Err(HdcpError::PermissionDenied(
            "repeater topology exceeds device or cascade limits".into(),
        ));
    }

    // A repeater with nothing downstream has no use for encrypted content.
    let count = usize::from(bstatus.device_count());
    if count == 0 {
        return Err(HdcpError::InvalidArgument(
            "repeater reports zero downstream devices".into(),
        ));
    }

    let mut ksvs: Vec<Ksv> = Vec::new();
    ksvs.try_reserve_exact(count)
        .map_err(|_| HdcpError::ResourceExhausted(count))?;
    ksvs.resize(count, Ksv::default());
    shim.read_ksv_fifo(&mut ksvs)?;

    if let Some(ksv) = revoked.find_revoked(&ksvs) {
        error!(%port, %ksv, "revoked KSV in KSV FIFO");
        return Err(HdcpError::PermissionDenied(format!(
            "downstream KSV {ksv} is revoked"
        )));
    }

    for part in 0..V_PRIME_NUM_PARTS {
        let v_prime = shim.read_v_prime_part(part)?;
        tx.write(Register::ShaVPrime(part), v_prime);
    }

    let ops = frame_sha_text(&ksvs, bstatus);
    let rep_ctl = port.repeater_ctl();
    write_sha_text(tx, rep_ctl, &ops, config)?;

    tx.write(Register::RepCtl, rep_ctl | REP_CTL_SHA1_COMPLETE_HASH);
    wait_for_bits(
        tx,
        Register::RepCtl,
        REP_CTL_SHA1_COMPLETE,
        config.sha_complete_timeout,
        "SHA-1 complete",
    )?;
    if tx.read(Register::RepCtl) & REP_CTL_SHA1_V_MATCH == 0 {
        debug!(%port, "SHA-1 mismatch");
        return Err(HdcpError::HashMismatch);
    }

    topology.set_downstream(bstatus, ksvs);
    debug!(
        %port,
        devices = topology.device_count,
        depth = topology.depth,
        "HDCP repeater authenticated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authenticate;
    use crate::regs::Port;
    use crate::sim::{SimReceiver, SimShim, SimTransmitter, sim_link};
    use crate::regs::ShaTextMode;
    use crate::sha::ShaOp;
    use hdcp_core::Bstatus;

    fn run(rx: SimReceiver, revoked: &RevocationList) -> (HdcpResult<TopologyInfo>, SimTransmitter, SimShim) {
        let (mut tx, mut shim) = sim_link(Port::C, rx);
        tx.preload_keys();
        let res = authenticate(&mut tx, &mut shim, revoked, &HdcpConfig::fast());
        (res, tx, shim)
    }

    #[test]
    fn hash_matches_for_every_leftover_case() {
        for n in 1..=4 {
            let rx = SimReceiver::repeater(SimReceiver::downstream_ksvs(n));
            let (res, _, _) = run(rx, &RevocationList::default());
            let topology = res.unwrap_or_else(|e| panic!("{n} devices: {e}"));
            assert_eq!(usize::from(topology.device_count), n);
        }
    }

    #[test]
    fn hash_matches_across_block_boundaries() {
        // 50 devices split the tail across a boundary.
        for n in [13, 40, 50, 127] {
            let rx = SimReceiver::repeater(SimReceiver::downstream_ksvs(n));
            let (res, _, _) = run(rx, &RevocationList::default());
            res.unwrap_or_else(|e| panic!("{n} devices: {e}"));
        }
    }

    #[test]
    fn wrong_v_prime_is_mismatch() {
        let mut rx = SimReceiver::repeater(SimReceiver::downstream_ksvs(3));
        rx.corrupt_v_prime = true;
        let (res, _, _) = run(rx, &RevocationList::default());
        assert_eq!(res.unwrap_err(), HdcpError::HashMismatch);
    }

    #[test]
    fn zero_devices_is_invalid_and_skips_hashing() {
        let mut rx = SimReceiver::repeater(Vec::new());
        rx.bstatus = Some(Bstatus::new([0x00, 0x01]));
        let (res, tx, shim) = run(rx, &RevocationList::default());
        assert!(matches!(res.unwrap_err(), HdcpError::InvalidArgument(_)));
        assert_eq!(tx.writes_to(Register::ShaText), 0);
        assert_eq!(shim.fifo_reads(), 0);
    }

    #[test]
    fn revoked_downstream_ksv_is_denied_before_hashing() {
        let downstream = SimReceiver::downstream_ksvs(3);
        let revoked = RevocationList::new(vec![downstream[1]]);
        let rx = SimReceiver::repeater(downstream);
        let (res, tx, _) = run(rx, &revoked);
        assert!(matches!(res.unwrap_err(), HdcpError::PermissionDenied(_)));
        assert_eq!(tx.writes_to(Register::ShaText), 0);
        assert_eq!(tx.writes_to(Register::ShaVPrime(0)), 0);
    }

    #[test]
    fn topology_limits_are_denied() {
        for bstatus in [Bstatus::new([0x83, 0x01]), Bstatus::new([0x03, 0x09])] {
            let mut rx = SimReceiver::repeater(SimReceiver::downstream_ksvs(3));
            rx.bstatus = Some(bstatus);
            let (res, _, _) = run(rx, &RevocationList::default());
            assert!(matches!(res.unwrap_err(), HdcpError::PermissionDenied(_)));
        }
    }

    #[test]
    fn ksv_list_never_ready() {
        let mut rx = SimReceiver::repeater(SimReceiver::downstream_ksvs(2));
        rx.ksv_list_never_ready = true;
        let (res, _, _) = run(rx, &RevocationList::default());
        assert_eq!(res.unwrap_err(), HdcpError::Timeout("KSV list ready"));
    }

    #[test]
    fn sha_never_completes() {
        let rx = SimReceiver::repeater(SimReceiver::downstream_ksvs(2));
        let (mut tx, mut shim) = sim_link(Port::C, rx);
        tx.preload_keys();
        tx.script().sha_complete_stuck = true;
        let err = authenticate(&mut tx, &mut shim, &RevocationList::default(), &HdcpConfig::fast())
            .unwrap_err();
        assert_eq!(err, HdcpError::Timeout("SHA-1 complete"));
    }

    #[test]
    fn missing_block_restart_breaks_the_hash() {
        // 13 devices put a block boundary in the middle of a KSV.
        let downstream = SimReceiver::downstream_ksvs(13);
        let bstatus = Bstatus::new([13, 1]);
        let mut ops = frame_sha_text(&downstream, bstatus);
        let restart = ops[1..]
            .iter()
            .position(|op| *op == ShaOp::Mode(ShaTextMode::Text32))
            .map(|p| p + 1);
        let Some(restart) = restart else {
            panic!("no block restart in stream");
        };
        ops.remove(restart);

        let rx = SimReceiver::repeater(downstream);
        let (mut tx, _shim) = sim_link(Port::C, rx);
        write_sha_text(&mut tx, Port::C.repeater_ctl(), &ops, &HdcpConfig::fast()).unwrap();
        assert!(tx.sha_framing_error());
    }
}
