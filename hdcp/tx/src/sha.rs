use core::fmt;

use hdcp_core::{Bstatus, KSV_LEN, Ksv};

use crate::config::HdcpConfig;
use crate::error::HdcpResult;
use crate::regs::{REP_CTL_SHA1_READY, Register, ShaTextMode};
use crate::transmitter::Transmitter;
use crate::wait::wait_for_bits;

const WORD_LEN: usize = 4;
const BLOCK_LEN: usize = 64;
/// Bytes of BSTATUS plus the 8-byte M0 the hardware injects.
const TAIL_LEN: usize = 10;

/**
    One write to the repeater SHA-1 engine.

    `Mode` programs the text width of following words in the repeater
    control register, which also restarts the engine's 64-byte block.
    `Text` writes one word to the SHA text register.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaOp {
    Mode(ShaTextMode),
    Text(u32),
}

impl fmt::Display for ShaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode(mode) => write!(f, "mode {mode}"),
            Self::Text(word) => write!(f, "text {word:08x}"),
        }
    }
}

struct Framer {
    ops: Vec<ShaOp>,
    idx: usize,
    mode: ShaTextMode,
    restarted: bool,
}

impl Framer {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            idx: 0,
            mode: ShaTextMode::Text32,
            restarted: false,
        }
    }

    fn mode(&mut self, mode: ShaTextMode) {
        self.ops.push(ShaOp::Mode(mode));
        self.mode = mode;
        self.restarted = true;
    }

    // The engine needs the control register rewritten at the start of
    // every 64-byte block after the first.
    fn text(&mut self, word: u32) {
        if self.idx > 0 && self.idx % BLOCK_LEN == 0 && !self.restarted {
            self.mode(self.mode);
        }
        self.ops.push(ShaOp::Text(word));
        self.idx += WORD_LEN;
        if self.idx % BLOCK_LEN == 0 {
            self.restarted = false;
        }
    }
}

/**
    Lay out `KSV list || BSTATUS || M0` as SHA-1 engine writes, including
    the engine-side padding and the final bit-length word. Text words that
    open a new 64-byte block are preceded by a mode write that restarts
    the block.

    Text is big-endian and right-aligned within each word: a `TEXT_24`
    word carries its three text bytes in bits 0..24. M0 never appears in
    the stream; it fills the bits a mode leaves free. The stream always
    ends on a 64-byte block boundary.

    Tail layout after the last KSV, by bytes left over from it (b0, b1 are
    the BSTATUS bytes, k the leftovers):

    | left | writes                                                   |
    |------|----------------------------------------------------------|
    | 0    | T16 `b0 b1`, T0 `0`, T16 `0`                              |
    | 1    | T24 `k b0 b1`, T0 `0`, T8 `0`                             |
    | 2    | T32 `k k b0 b1`, T0 `0`, `0`                              |
    | 3    | T32 `k k k b0`, T8 `b1`, T0 `0`, T24 `0`                  |
*/
pub fn frame_sha_text(ksvs: &[Ksv], bstatus: Bstatus) -> Vec<ShaOp> {
    let mut f = Framer::new();
    f.mode(ShaTextMode::Text32);

    let mut word = 0u32;
    let mut leftovers = 0usize;
    for ksv in ksvs {
        let bytes = ksv.as_bytes();
        let empty = WORD_LEN - leftovers;
        for (j, &b) in bytes[..empty].iter().enumerate() {
            word |= u32::from(b) << ((WORD_LEN - 1 - leftovers - j) * 8);
        }
        f.text(word);

        leftovers = KSV_LEN - empty;
        word = 0;
        for (j, &b) in bytes[empty..].iter().enumerate() {
            word |= u32::from(b) << ((WORD_LEN - 1 - j) * 8);
        }
        if leftovers == WORD_LEN {
            f.text(word);
            word = 0;
            leftovers = 0;
        }
    }

    let [b0, b1] = bstatus.to_bytes().map(u32::from);
    match leftovers {
        0 => {
            f.mode(ShaTextMode::Text16);
            f.text(b0 << 8 | b1);
            f.mode(ShaTextMode::Text0);
            f.text(0);
            f.mode(ShaTextMode::Text16);
            f.text(0);
        }
        1 => {
            f.mode(ShaTextMode::Text24);
            f.text((word | b0 << 16 | b1 << 8) >> 8);
            f.mode(ShaTextMode::Text0);
            f.text(0);
            f.mode(ShaTextMode::Text8);
            f.text(0);
        }
        2 => {
            f.mode(ShaTextMode::Text32);
            f.text(word | b0 << 8 | b1);
            f.mode(ShaTextMode::Text0);
            f.text(0);
            f.text(0);
        }
        _ => {
            f.mode(ShaTextMode::Text32);
            f.text(word | b0);
            f.mode(ShaTextMode::Text8);
            f.text(b1);
            f.mode(ShaTextMode::Text0);
            f.text(0);
            f.mode(ShaTextMode::Text24);
            f.text(0);
        }
    }

    f.mode(ShaTextMode::Text32);
    while f.idx % BLOCK_LEN < BLOCK_LEN - WORD_LEN {
        f.text(0);
    }
    f.text(message_bits(ksvs.len()));
    f.ops
}

/**
    Bit length of `KSV list || BSTATUS || M0` for `devices` KSVs.
*/
pub const fn message_bits(devices: usize) -> u32 {
    ((devices * KSV_LEN + TAIL_LEN) * 8) as u32
}

/**
    Push a framed stream into the transmitter, waiting for the engine to
    accept each text word. `rep_ctl` carries the port's repeater bits.
*/
pub fn write_sha_text(
    tx: &mut dyn Transmitter,
    rep_ctl: u32,
    ops: &[ShaOp],
    config: &HdcpConfig,
) -> HdcpResult<()> {
    for op in ops {
        match *op {
            ShaOp::Mode(mode) => tx.write(Register::RepCtl, rep_ctl | mode.bits()),
            ShaOp::Text(word) => {
                tx.write(Register::ShaText, word);
                wait_for_bits(
                    tx,
                    Register::RepCtl,
                    REP_CTL_SHA1_READY,
                    config.sha_ready_timeout,
                    "SHA-1 ready",
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    use ShaOp::{Mode, Text};
    use ShaTextMode::{Text0, Text8, Text16, Text24, Text32};

    const BSTATUS: Bstatus = Bstatus::new([0x07, 0x02]);

    fn ksvs(n: usize) -> Vec<Ksv> {
        let all = [
            Ksv::new(hex!("11 22 33 44 55")),
            Ksv::new(hex!("66 77 88 99 aa")),
            Ksv::new(hex!("bb cc dd ee ff")),
            Ksv::new(hex!("01 02 03 04 05")),
        ];
        all[..n].to_vec()
    }

    fn zeros(n: usize) -> Vec<ShaOp> {
        vec![Text(0); n]
    }

    #[test]
    fn one_leftover_byte() {
        let mut expected = vec![
            Mode(Text32),
            Text(0x1122_3344),
            Mode(Text24),
            Text(0x0055_0702),
            Mode(Text0),
            Text(0),
            Mode(Text8),
            Text(0),
            Mode(Text32),
        ];
        expected.extend(zeros(11));
        expected.push(Text(120));
        assert_eq!(frame_sha_text(&ksvs(1), BSTATUS), expected);
    }

    #[test]
    fn two_leftover_bytes() {
        let mut expected = vec![
            Mode(Text32),
            Text(0x1122_3344),
            Text(0x5566_7788),
            Mode(Text32),
            Text(0x99aa_0702),
            Mode(Text0),
            Text(0),
            Text(0),
            Mode(Text32),
        ];
        expected.extend(zeros(10));
        expected.push(Text(160));
        assert_eq!(frame_sha_text(&ksvs(2), BSTATUS), expected);
    }

    #[test]
    fn three_leftover_bytes() {
        let mut expected = vec![
            Mode(Text32),
            Text(0x1122_3344),
            Text(0x5566_7788),
            Text(0x99aa_bbcc),
            Mode(Text32),
            Text(0xddee_ff07),
            Mode(Text8),
            Text(0x02),
            Mode(Text0),
            Text(0),
            Mode(Text24),
            Text(0),
            Mode(Text32),
        ];
        expected.extend(zeros(8));
        expected.push(Text(200));
        assert_eq!(frame_sha_text(&ksvs(3), BSTATUS), expected);
    }

    #[test]
    fn no_leftover_bytes() {
        let mut expected = vec![
            Mode(Text32),
            Text(0x1122_3344),
            Text(0x5566_7788),
            Text(0x99aa_bbcc),
            Text(0xddee_ff01),
            Text(0x0203_0405),
            Mode(Text16),
            Text(0x0702),
            Mode(Text0),
            Text(0),
            Mode(Text16),
            Text(0),
            Mode(Text32),
        ];
        expected.extend(zeros(7));
        expected.push(Text(240));
        assert_eq!(frame_sha_text(&ksvs(4), BSTATUS), expected);
    }

    fn text_words(ops: &[ShaOp]) -> Vec<(ShaTextMode, u32)> {
        let mut mode = Text32;
        let mut out = Vec::new();
        for op in ops {
            match *op {
                Mode(m) => mode = m,
                Text(w) => out.push((mode, w)),
            }
        }
        out
    }

    #[test]
    fn block_restarts_every_64_bytes() {
        let list: Vec<Ksv> = (0..40u8).map(|i| Ksv::new([i; 5])).collect();
        let ops = frame_sha_text(&list, BSTATUS);
        let mut idx = 0;
        for pair in ops.windows(2) {
            if let Text(_) = pair[0] {
                idx += WORD_LEN;
                // the KSV region is 200 bytes, so three boundaries fall in it
                if idx % BLOCK_LEN == 0 && idx <= 40 * KSV_LEN {
                    assert_eq!(pair[1], Mode(Text32), "no restart at byte {idx}");
                }
            }
        }
    }

    #[test]
    fn every_device_count_fills_whole_blocks_and_carries_all_of_m0() {
        for n in 1..=127usize {
            let list: Vec<Ksv> = (0..n).map(|i| Ksv::new([i as u8, 1, 2, 3, 4])).collect();
            let words = text_words(&frame_sha_text(&list, BSTATUS));
            assert_eq!((words.len() * WORD_LEN) % BLOCK_LEN, 0, "n = {n}");

            let m0_bits: usize = words
                .iter()
                .map(|(mode, _)| (WORD_LEN - mode.text_bytes()) * 8)
                .sum();
            assert_eq!(m0_bits, 64, "n = {n}");

            let text: Vec<u8> = words
                .iter()
                .flat_map(|(mode, w)| w.to_be_bytes()[WORD_LEN - mode.text_bytes()..].to_vec())
                .collect();
            let mut message: Vec<u8> = list.iter().flat_map(|k| k.to_bytes()).collect();
            message.extend_from_slice(&BSTATUS.to_bytes());
            assert_eq!(&text[..message.len()], &message[..], "n = {n}");

            let last = words.last().map(|(_, w)| *w);
            assert_eq!(last, Some(message_bits(n)));
        }
    }

    #[test]
    fn every_block_opens_with_a_mode_write() {
        for n in 1..=127usize {
            let list: Vec<Ksv> = (0..n).map(|i| Ksv::new([i as u8; 5])).collect();
            let ops = frame_sha_text(&list, BSTATUS);
            let mut idx = 0;
            for (i, op) in ops.iter().enumerate() {
                if let Text(_) = op {
                    if idx > 0 && idx % BLOCK_LEN == 0 {
                        assert!(matches!(ops[i - 1], Mode(_)), "n = {n}, byte {idx}");
                    }
                    idx += WORD_LEN;
                }
            }
        }
    }

    #[test]
    fn message_bits_counts_tail() {
        assert_eq!(message_bits(1), 120);
        assert_eq!(message_bits(127), (127 * 5 + 10) * 8);
    }
}
