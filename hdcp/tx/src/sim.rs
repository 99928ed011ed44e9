/*!
    Software model of one HDCP link: a transmitter register block and the
    receiver (plain sink or repeater) on the far end of the sideband.

    Both halves share one state object, so the transmitter can check R0′
    and V′ against what the receiver actually computed. The cryptography is
    a stand-in: Ri, M0 and V′ are derived with SHA-1 from An and the BKSV,
    which is enough to catch any byte the engine moves to the wrong place.
*/

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use sha1::{Digest, Sha1};

use hdcp_core::{An, Bstatus, KSV_LEN, Ksv, Ri, V_PRIME_NUM_PARTS};

use crate::error::{HdcpError, HdcpResult};
use crate::regs::{
    CONF_AUTH_AND_ENC, CONF_CAPTURE_AN, KEY_CONF_CLEAR_KEYS_TRIGGER, KEY_CONF_LOAD_TRIGGER,
    KEY_STATUS_LOAD_DONE, KEY_STATUS_LOAD_STATUS, Port, REP_CTL_SHA1_BUSY, REP_CTL_SHA1_COMPLETE,
    REP_CTL_SHA1_COMPLETE_HASH, REP_CTL_SHA1_READY, REP_CTL_SHA1_V_MATCH, Register, STATUS_AN_READY,
    STATUS_ENC, STATUS_R0_READY, STATUS_RI_MATCH, ShaTextMode,
};
use crate::shim::Shim;
use crate::transmitter::{KeyLoadMode, Transmitter};

const REP_CTL_MODE_MASK: u32 = 7 << 1;
const REP_CTL_HW_BITS: u32 =
    REP_CTL_SHA1_BUSY | REP_CTL_SHA1_READY | REP_CTL_SHA1_COMPLETE | REP_CTL_SHA1_V_MATCH;

/// BKSV of the first HDCP 1.x test receiver.
const SINK_BKSV: [u8; KSV_LEN] = [0x51, 0x1e, 0xf2, 0x1a, 0xcd];

/**
    Receiver behavior. Counters such as `invalid_bksv_reads` are consumed
    as the engine hits them.
*/
#[derive(Debug, Clone)]
pub struct SimReceiver {
    bksv: Ksv,
    is_repeater: bool,
    downstream: Vec<Ksv>,
    /// Answer to the capability query; `None` for interfaces without one.
    pub capable: Option<bool>,
    /// Number of BKSV reads that return an all-zero KSV.
    pub invalid_bksv_reads: u32,
    /// Fail every BKSV read with a transport error.
    pub fail_bksv_read: bool,
    /// Number of Ri′ reads that return a wrong value.
    pub bad_ri_reads: u32,
    /// BSTATUS override; otherwise derived from the downstream list.
    pub bstatus: Option<Bstatus>,
    pub ksv_list_never_ready: bool,
    /// KSV-ready polls answered "not yet" before the list is ready.
    pub ksv_ready_after: u32,
    pub corrupt_v_prime: bool,
}

impl SimReceiver {
    /**
        A plain HDCP sink.
    */
    pub fn sink() -> Self {
        Self {
            bksv: Ksv::new(SINK_BKSV),
            is_repeater: false,
            downstream: Vec::new(),
            capable: None,
            invalid_bksv_reads: 0,
            fail_bksv_read: false,
            bad_ri_reads: 0,
            bstatus: None,
            ksv_list_never_ready: false,
            ksv_ready_after: 0,
            corrupt_v_prime: false,
        }
    }

    /**
        A repeater with `downstream` devices behind it at depth 1.
    */
    pub fn repeater(downstream: Vec<Ksv>) -> Self {
        Self {
            is_repeater: true,
            downstream,
            ..Self::sink()
        }
    }

    pub fn with_bksv(mut self, bksv: Ksv) -> Self {
        self.bksv = bksv;
        self
    }

    pub fn bksv(&self) -> Ksv {
        self.bksv
    }

    pub fn is_repeater(&self) -> bool {
        self.is_repeater
    }

    pub fn downstream(&self) -> &[Ksv] {
        &self.downstream
    }

    /**
        `n` distinct, structurally valid KSVs. Deterministic.
    */
    pub fn downstream_ksvs(n: usize) -> Vec<Ksv> {
        let mut out: Vec<Ksv> = Vec::with_capacity(n);
        let mut seed = 0x4844_4350_u64;
        while out.len() < n {
            seed = splitmix64(seed);
            let bytes = seed.to_le_bytes();
            let ksv = Ksv::new([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]);
            if ksv.is_valid() && ksv != Ksv::new(SINK_BKSV) && !out.contains(&ksv) {
                out.push(ksv);
            }
        }
        out
    }

    fn bstatus_value(&self) -> Bstatus {
        self.bstatus.unwrap_or_else(|| {
            let count = self.downstream.len().min(0x7f) as u8;
            Bstatus::new([count, 1])
        })
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/**
    Transmitter-side fault injection.
*/
#[derive(Debug, Clone)]
pub struct SimScript {
    pub key_loadable: bool,
    pub key_load_stuck: bool,
    pub key_load_bad_status: bool,
    /// Number of load triggers that are silently ignored.
    pub key_load_failures: u32,
    pub an_stuck: bool,
    pub r0_stuck: bool,
    pub sha_complete_stuck: bool,
    /// Status register ignores the disable write.
    pub status_stuck: bool,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            key_loadable: true,
            key_load_stuck: false,
            key_load_bad_status: false,
            key_load_failures: 0,
            an_stuck: false,
            r0_stuck: false,
            sha_complete_stuck: false,
            status_stuck: false,
        }
    }
}

#[derive(Debug)]
struct TxState {
    key_load_mode: KeyLoadMode,
    key_status: u32,
    key_conf_log: Vec<u32>,
    rep_ctl_log: Vec<u32>,
    writes: HashMap<Register, usize>,
    an_init: [u32; 2],
    an: [u32; 2],
    status: u32,
    bksv: [u32; 2],
    rep_ctl: u32,
    v_prime: [u32; V_PRIME_NUM_PARTS],
    sha_mode: ShaTextMode,
    sha_words: Vec<(ShaTextMode, u32)>,
    sha_restarted: bool,
    framing_error: bool,
}

#[derive(Debug)]
struct RxState {
    device: SimReceiver,
    an: Option<An>,
    signalling: bool,
    bksv_reads: u32,
    fifo_reads: u32,
    ksv_ready_polls: u32,
    link_checks: u32,
    fail_next_link_check: bool,
    fail_next_signalling_off: bool,
}

#[derive(Debug)]
struct LinkState {
    port: Port,
    tx: TxState,
    rx: RxState,
    script: SimScript,
}

/**
    Create a transmitter on `port` wired to `receiver`.
*/
pub fn sim_link(port: Port, receiver: SimReceiver) -> (SimTransmitter, SimShim) {
    let state = Arc::new(Mutex::new(LinkState {
        port,
        tx: TxState {
            key_load_mode: KeyLoadMode::Register,
            key_status: 0,
            key_conf_log: Vec::new(),
            rep_ctl_log: Vec::new(),
            writes: HashMap::new(),
            an_init: [0; 2],
            an: [0; 2],
            status: 0,
            bksv: [0; 2],
            rep_ctl: 0,
            v_prime: [0; V_PRIME_NUM_PARTS],
            sha_mode: ShaTextMode::Text32,
            sha_words: Vec::new(),
            sha_restarted: false,
            framing_error: false,
        },
        rx: RxState {
            device: receiver,
            an: None,
            signalling: false,
            bksv_reads: 0,
            fifo_reads: 0,
            ksv_ready_polls: 0,
            link_checks: 0,
            fail_next_link_check: false,
            fail_next_signalling_off: false,
        },
        script: SimScript::default(),
    }));
    (
        SimTransmitter {
            state: Arc::clone(&state),
        },
        SimShim { state },
    )
}

fn ri_for(an: An, bksv: Ksv) -> Ri {
    let digest = Sha1::new()
        .chain_update(an.to_bytes())
        .chain_update(bksv.as_bytes())
        .finalize();
    Ri::new([digest[0], digest[1]])
}

fn m0_for(an: An, bksv: Ksv) -> [u8; 8] {
    let digest = Sha1::new()
        .chain_update(b"M0")
        .chain_update(an.to_bytes())
        .chain_update(bksv.as_bytes())
        .finalize();
    let mut m0 = [0u8; 8];
    m0.copy_from_slice(&digest[..8]);
    m0
}

fn v_for(message: &[u8], m0: &[u8; 8]) -> [u32; V_PRIME_NUM_PARTS] {
    let digest = Sha1::new().chain_update(message).chain_update(m0).finalize();
    let mut v = [0u32; V_PRIME_NUM_PARTS];
    for (part, chunk) in v.iter_mut().zip(digest.chunks_exact(4)) {
        *part = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    v
}

fn ksv_from_words([lo, hi]: [u32; 2]) -> Ksv {
    let lo = lo.to_le_bytes();
    Ksv::new([lo[0], lo[1], lo[2], lo[3], hi as u8])
}

// ── Transmitter ───────────────────────────────────────────────────────

/**
    Register-level model of a transmitter. Clones share the same hardware.
*/
#[derive(Debug, Clone)]
pub struct SimTransmitter {
    state: Arc<Mutex<LinkState>>,
}

impl SimTransmitter {
    /**
        Transmitter wired to a plain sink.
    */
    pub fn new(port: Port) -> Self {
        sim_link(port, SimReceiver::sink()).0
    }

    pub fn script(&self) -> MappedMutexGuard<'_, SimScript> {
        MutexGuard::map(self.state.lock(), |s| &mut s.script)
    }

    pub fn set_key_load_mode(&self, mode: KeyLoadMode) {
        self.state.lock().tx.key_load_mode = mode;
    }

    /**
        Keys present as if loaded by an earlier enable.
    */
    pub fn preload_keys(&self) {
        self.state.lock().tx.key_status = KEY_STATUS_LOAD_DONE | KEY_STATUS_LOAD_STATUS;
    }

    pub fn encrypting(&self) -> bool {
        self.state.lock().tx.status & STATUS_ENC != 0
    }

    /**
        Encryption stops without software asking, as after a hot-unplug glitch.
    */
    pub fn drop_encryption(&self) {
        self.state.lock().tx.status &= !STATUS_ENC;
    }

    pub fn writes_to(&self, reg: Register) -> usize {
        self.state.lock().tx.writes.get(&reg).copied().unwrap_or(0)
    }

    pub fn key_conf_log(&self) -> Vec<u32> {
        self.state.lock().tx.key_conf_log.clone()
    }

    pub fn rep_ctl_log(&self) -> Vec<u32> {
        self.state.lock().tx.rep_ctl_log.clone()
    }

    /**
        A text word opened a 64-byte block without a control write first.
    */
    pub fn sha_framing_error(&self) -> bool {
        self.state.lock().tx.framing_error
    }
}

impl LinkState {
    fn trigger_key_load(&mut self) {
        if self.script.key_load_stuck {
            return;
        }
        if self.script.key_load_failures > 0 {
            self.script.key_load_failures -= 1;
            return;
        }
        self.tx.key_status |= KEY_STATUS_LOAD_DONE;
        if !self.script.key_load_bad_status {
            self.tx.key_status |= KEY_STATUS_LOAD_STATUS;
        }
    }

    fn keys_loaded(&self) -> bool {
        let loaded = KEY_STATUS_LOAD_DONE | KEY_STATUS_LOAD_STATUS;
        self.tx.key_status & loaded == loaded
    }

    fn tx_an(&self) -> An {
        An::from_le_words(self.tx.an[0], self.tx.an[1])
    }

    fn write_conf(&mut self, value: u32) {
        match value {
            0 => {
                if !self.script.status_stuck {
                    self.tx.status = 0;
                }
            }
            CONF_CAPTURE_AN => {
                self.tx.an = self.tx.an_init;
                self.tx.status &= !(STATUS_R0_READY | STATUS_RI_MATCH | STATUS_ENC);
                self.tx.sha_words.clear();
                self.tx.framing_error = false;
                if !self.script.an_stuck {
                    self.tx.status |= STATUS_AN_READY;
                }
            }
            CONF_AUTH_AND_ENC => {
                if self.keys_loaded() && !self.script.r0_stuck {
                    self.tx.status |= STATUS_R0_READY | STATUS_ENC;
                }
            }
            _ => {}
        }
    }

    fn write_r_prime(&mut self, value: u32) {
        let expected = ri_for(self.tx_an(), ksv_from_words(self.tx.bksv));
        if value == expected.to_le_word() {
            self.tx.status |= STATUS_RI_MATCH;
        } else {
            self.tx.status &= !STATUS_RI_MATCH;
        }
    }

    fn write_rep_ctl(&mut self, value: u32) {
        self.tx.rep_ctl_log.push(value);
        self.tx.rep_ctl = value & !REP_CTL_HW_BITS;
        if value & REP_CTL_MODE_MASK == REP_CTL_SHA1_COMPLETE_HASH {
            if !self.script.sha_complete_stuck {
                let matched = self.verify_v();
                self.tx.rep_ctl |= REP_CTL_SHA1_COMPLETE;
                if matched {
                    self.tx.rep_ctl |= REP_CTL_SHA1_V_MATCH;
                }
            }
            self.tx.sha_words.clear();
            return;
        }
        self.tx.sha_mode = ShaTextMode::from_rep_ctl(value).unwrap_or(ShaTextMode::Text32);
        self.tx.sha_restarted = true;
    }

    fn write_sha_text(&mut self, value: u32) {
        let bytes = self.tx.sha_words.len() * 4;
        if bytes > 0 && bytes % 64 == 0 && !self.tx.sha_restarted {
            self.tx.framing_error = true;
        }
        self.tx.sha_words.push((self.tx.sha_mode, value));
        if (bytes + 4) % 64 == 0 {
            self.tx.sha_restarted = false;
        }
    }

    /**
        Rebuild `KSV list || BSTATUS` from the text stream, append M0 and
        compare the digest with the V′ registers.
    */
    fn verify_v(&self) -> bool {
        if self.tx.framing_error || self.tx.sha_words.len() * 4 % 64 != 0 {
            return false;
        }
        let Some(&(_, bit_len)) = self.tx.sha_words.last() else {
            return false;
        };
        let total = bit_len as usize / 8;
        if bit_len % 8 != 0 || total < 10 || (total - 10) % KSV_LEN != 0 {
            return false;
        }

        let mut text = Vec::new();
        let mut m0_bits = 0;
        for &(mode, word) in &self.tx.sha_words[..self.tx.sha_words.len() - 1] {
            let n = mode.text_bytes();
            text.extend_from_slice(&word.to_be_bytes()[4 - n..]);
            m0_bits += (4 - n) * 8;
        }
        let message_len = total - 8;
        if m0_bits != 64 || text.len() < message_len {
            return false;
        }

        let m0 = m0_for(self.tx_an(), ksv_from_words(self.tx.bksv));
        v_for(&text[..message_len], &m0) == self.tx.v_prime
    }
}

impl Transmitter for SimTransmitter {
    fn port(&self) -> Port {
        self.state.lock().port
    }

    fn read(&self, reg: Register) -> u32 {
        let s = self.state.lock();
        match reg {
            Register::KeyStatus => s.tx.key_status,
            Register::Status => s.tx.status,
            Register::AnLo => s.tx.an[0],
            Register::AnHi => s.tx.an[1],
            Register::BksvLo => s.tx.bksv[0],
            Register::BksvHi => s.tx.bksv[1],
            Register::RepCtl => s.tx.rep_ctl | REP_CTL_SHA1_READY,
            Register::ShaVPrime(part) => s.tx.v_prime.get(part).copied().unwrap_or(0),
            _ => 0,
        }
    }

    fn write(&mut self, reg: Register, value: u32) {
        let mut s = self.state.lock();
        *s.tx.writes.entry(reg).or_default() += 1;
        match reg {
            Register::KeyConf => {
                s.tx.key_conf_log.push(value);
                if value & KEY_CONF_LOAD_TRIGGER != 0 {
                    s.trigger_key_load();
                }
                if value & KEY_CONF_CLEAR_KEYS_TRIGGER != 0 {
                    s.tx.key_status = 0;
                }
            }
            Register::KeyStatus => s.tx.key_status &= !value,
            Register::AnInit => {
                s.tx.an_init = [s.tx.an_init[1], value];
            }
            Register::Conf => s.write_conf(value),
            Register::BksvLo => s.tx.bksv[0] = value,
            Register::BksvHi => s.tx.bksv[1] = value,
            Register::RPrime => s.write_r_prime(value),
            Register::RepCtl => s.write_rep_ctl(value),
            Register::ShaText => s.write_sha_text(value),
            Register::ShaVPrime(part) => {
                if let Some(slot) = s.tx.v_prime.get_mut(part) {
                    *slot = value;
                }
            }
            Register::AnLo | Register::AnHi | Register::Status => {}
        }
    }

    fn key_load_mode(&self) -> KeyLoadMode {
        self.state.lock().tx.key_load_mode
    }

    fn key_loadable(&self) -> bool {
        self.state.lock().script.key_loadable
    }

    fn control_plane_load_keys(&mut self) -> HdcpResult<()> {
        self.state.lock().trigger_key_load();
        Ok(())
    }
}

// ── Receiver ──────────────────────────────────────────────────────────

/**
    Sideband view of the simulated receiver. Clones share the same link.
*/
#[derive(Debug, Clone)]
pub struct SimShim {
    state: Arc<Mutex<LinkState>>,
}

impl SimShim {
    pub fn receiver(&self) -> MappedMutexGuard<'_, SimReceiver> {
        MutexGuard::map(self.state.lock(), |s| &mut s.rx.device)
    }

    pub fn signalling(&self) -> bool {
        self.state.lock().rx.signalling
    }

    pub fn bksv_reads(&self) -> u32 {
        self.state.lock().rx.bksv_reads
    }

    pub fn fifo_reads(&self) -> u32 {
        self.state.lock().rx.fifo_reads
    }

    pub fn link_checks(&self) -> u32 {
        self.state.lock().rx.link_checks
    }

    pub fn fail_next_link_check(&self) {
        self.state.lock().rx.fail_next_link_check = true;
    }

    pub fn fail_next_signalling_off(&self) {
        self.state.lock().rx.fail_next_signalling_off = true;
    }

    fn session_an(state: &LinkState) -> HdcpResult<An> {
        state
            .rx
            .an
            .ok_or_else(|| HdcpError::Transport("receiver has not seen An".into()))
    }
}

impl Shim for SimShim {
    fn hdcp_capable(&mut self) -> HdcpResult<Option<bool>> {
        Ok(self.state.lock().rx.device.capable)
    }

    fn write_an_aksv(&mut self, an: An) -> HdcpResult<()> {
        self.state.lock().rx.an = Some(an);
        Ok(())
    }

    fn read_bksv(&mut self) -> HdcpResult<Ksv> {
        let mut s = self.state.lock();
        s.rx.bksv_reads += 1;
        let device = &mut s.rx.device;
        if device.fail_bksv_read {
            return Err(HdcpError::Transport("Bksv read NAKed".into()));
        }
        if device.invalid_bksv_reads > 0 {
            device.invalid_bksv_reads -= 1;
            return Ok(Ksv::default());
        }
        Ok(device.bksv)
    }

    fn read_bstatus(&mut self) -> HdcpResult<Bstatus> {
        Ok(self.state.lock().rx.device.bstatus_value())
    }

    fn repeater_present(&mut self) -> HdcpResult<bool> {
        Ok(self.state.lock().rx.device.is_repeater)
    }

    fn read_ri_prime(&mut self) -> HdcpResult<Ri> {
        let mut s = self.state.lock();
        let an = Self::session_an(&s)?;
        let device = &mut s.rx.device;
        let ri = ri_for(an, device.bksv);
        if device.bad_ri_reads > 0 {
            device.bad_ri_reads -= 1;
            let [a, b] = ri.to_bytes();
            return Ok(Ri::new([!a, b]));
        }
        Ok(ri)
    }

    fn read_ksv_ready(&mut self) -> HdcpResult<bool> {
        let mut s = self.state.lock();
        if s.rx.device.ksv_list_never_ready {
            return Ok(false);
        }
        s.rx.ksv_ready_polls += 1;
        Ok(s.rx.ksv_ready_polls > s.rx.device.ksv_ready_after)
    }

    fn read_ksv_fifo(&mut self, ksvs: &mut [Ksv]) -> HdcpResult<()> {
        let mut s = self.state.lock();
        s.rx.fifo_reads += 1;
        let downstream = &s.rx.device.downstream;
        if ksvs.len() > downstream.len() {
            return Err(HdcpError::Transport(format!(
                "KSV FIFO holds {} entries, {} requested",
                downstream.len(),
                ksvs.len()
            )));
        }
        ksvs.copy_from_slice(&downstream[..ksvs.len()]);
        Ok(())
    }

    fn read_v_prime_part(&mut self, index: usize) -> HdcpResult<u32> {
        let s = self.state.lock();
        let an = Self::session_an(&s)?;
        let device = &s.rx.device;
        let mut message: Vec<u8> = device.downstream.iter().flat_map(|k| k.to_bytes()).collect();
        message.extend_from_slice(&device.bstatus_value().to_bytes());
        let mut v = v_for(&message, &m0_for(an, device.bksv));
        if device.corrupt_v_prime {
            v[0] ^= 1;
        }
        v.get(index)
            .copied()
            .ok_or_else(|| HdcpError::InvalidArgument(format!("V' part {index}")))
    }

    fn toggle_signalling(&mut self, enable: bool) -> HdcpResult<()> {
        let mut s = self.state.lock();
        if !enable && s.rx.fail_next_signalling_off {
            s.rx.fail_next_signalling_off = false;
            return Err(HdcpError::Transport("signalling write NAKed".into()));
        }
        s.rx.signalling = enable;
        Ok(())
    }

    fn check_link(&mut self) -> bool {
        let mut s = self.state.lock();
        s.rx.link_checks += 1;
        if s.rx.fail_next_link_check {
            s.rx.fail_next_link_check = false;
            return false;
        }
        s.rx.signalling && s.rx.an.is_some()
    }
}
