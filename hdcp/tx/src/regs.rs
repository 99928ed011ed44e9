use core::fmt;
use core::str::FromStr;

use hdcp_core::{ParseError, eq_ignore_ascii_case};

/**
    Transmitter registers touched by the authentication engine.

    Per-port registers (`AnInit` .. `RPrime`) address the port the
    transmitter handle was created for.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    KeyConf,
    KeyStatus,
    ShaText,
    RepCtl,
    ShaVPrime(usize),
    AnInit,
    AnLo,
    AnHi,
    Conf,
    Status,
    BksvLo,
    BksvHi,
    RPrime,
}

// ── HDCP_KEY_CONF ─────────────────────────────────────────────────────
pub const KEY_CONF_AKSV_SEND_TRIGGER: u32 = 1 << 31;
pub const KEY_CONF_CLEAR_KEYS_TRIGGER: u32 = 1 << 30;
pub const KEY_CONF_LOAD_TRIGGER: u32 = 1 << 8;

// ── HDCP_KEY_STATUS ───────────────────────────────────────────────────
pub const KEY_STATUS_FUSE_IN_PROGRESS: u32 = 1 << 7;
pub const KEY_STATUS_FUSE_ERROR: u32 = 1 << 6;
pub const KEY_STATUS_FUSE_DONE: u32 = 1 << 5;
pub const KEY_STATUS_LOAD_STATUS: u32 = 1 << 1;
pub const KEY_STATUS_LOAD_DONE: u32 = 1 << 0;

/// Every sticky key-status bit, written back to clear them.
pub const KEY_STATUS_CLEAR_ALL: u32 = KEY_STATUS_LOAD_DONE
    | KEY_STATUS_LOAD_STATUS
    | KEY_STATUS_FUSE_IN_PROGRESS
    | KEY_STATUS_FUSE_ERROR
    | KEY_STATUS_FUSE_DONE;

// ── HDCP_REP_CTL ──────────────────────────────────────────────────────
pub const REP_CTL_SHA1_BUSY: u32 = 1 << 16;
pub const REP_CTL_SHA1_READY: u32 = 1 << 17;
pub const REP_CTL_SHA1_COMPLETE: u32 = 1 << 18;
pub const REP_CTL_SHA1_V_MATCH: u32 = 1 << 19;
pub const REP_CTL_SHA1_COMPLETE_HASH: u32 = 2 << 1;
const REP_CTL_TEXT_MASK: u32 = 7 << 1;

// ── PORT_HDCP_CONF ────────────────────────────────────────────────────
pub const CONF_CAPTURE_AN: u32 = 1 << 0;
pub const CONF_AUTH_AND_ENC: u32 = (1 << 1) | (1 << 0);

// ── PORT_HDCP_STATUS ──────────────────────────────────────────────────
pub const STATUS_ENC: u32 = 1 << 20;
pub const STATUS_RI_MATCH: u32 = 1 << 19;
pub const STATUS_R0_READY: u32 = 1 << 18;
pub const STATUS_AN_READY: u32 = 1 << 17;

/**
    How many bits of a word written to `ShaText` are message text; the
    remaining bits are taken from the hardware-held secret M0.
    Text occupies the least significant bits.
*/
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaTextMode {
    Text32 = 0,
    Text24 = 4 << 1,
    Text16 = 5 << 1,
    Text8 = 6 << 1,
    Text0 = 7 << 1,
}

impl ShaTextMode {
    pub const fn from_rep_ctl(value: u32) -> Option<Self> {
        match value & REP_CTL_TEXT_MASK {
            0 => Some(Self::Text32),
            v if v == 4 << 1 => Some(Self::Text24),
            v if v == 5 << 1 => Some(Self::Text16),
            v if v == 6 << 1 => Some(Self::Text8),
            v if v == 7 << 1 => Some(Self::Text0),
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }

    /**
        Number of text bytes carried per word in this mode.
    */
    pub const fn text_bytes(self) -> usize {
        match self {
            Self::Text32 => 4,
            Self::Text24 => 3,
            Self::Text16 => 2,
            Self::Text8 => 1,
            Self::Text0 => 0,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Text32 => "TEXT_32",
            Self::Text24 => "TEXT_24",
            Self::Text16 => "TEXT_16",
            Self::Text8 => "TEXT_8",
            Self::Text0 => "TEXT_0",
        }
    }
}

impl fmt::Display for ShaTextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

/**
    Digital display interface port.
*/
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
}

impl Port {
    pub const fn from_u8(u: u8) -> Option<Self> {
        match u {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            3 => Some(Self::D),
            4 => Some(Self::E),
            5 => Some(Self::F),
            _ => None,
        }
    }

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_name(name: &[u8]) -> Option<Self> {
        let name = name.trim_ascii();
        if name.len() == 1 {
            return match name[0].to_ascii_uppercase() {
                b'A' => Some(Self::A),
                b'B' => Some(Self::B),
                b'C' => Some(Self::C),
                b'D' => Some(Self::D),
                b'E' => Some(Self::E),
                b'F' => Some(Self::F),
                _ => None,
            };
        }
        if name.len() == 6 && eq_ignore_ascii_case(name.split_at(5).0, b"port_") {
            return Self::from_name(name.split_at(5).1);
        }
        None
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        }
    }

    /**
        Port E has no HDCP block and port F is fused off.
    */
    pub const fn supports_hdcp(self) -> bool {
        (self as u8) < (Self::E as u8)
    }

    /**
        Repeater-present bit plus SHA-1 M0 select for this port's DDI.
        Port F has no HDCP block and no such field, so it gets 0.
    */
    pub const fn repeater_ctl(self) -> u32 {
        match self {
            Self::A => (1 << 29) | (2 << 20),
            Self::B => (1 << 30) | (1 << 20),
            Self::C => (1 << 28) | (3 << 20),
            Self::D => (1 << 27) | (4 << 20),
            Self::E => (1 << 25) | (6 << 20),
            Self::F => 0,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.to_name())
    }
}

impl FromStr for Port {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.as_bytes()).ok_or_else(|| ParseError {
            kind: "port",
            value: s.to_owned(),
        })
    }
}
