use core::fmt;
use core::str::FromStr;

use crate::bstatus::Bstatus;
use crate::error::ParseError;
use crate::ksv::Ksv;
use crate::utils::eq_ignore_ascii_case;

/**
    Tri-state content protection value published to the display configuration layer.

    Values match the connector property encoding: Undesired=0, Desired=1, Enabled=2.
*/
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ContentProtection {
    #[default]
    Undesired = 0,
    Desired = 1,
    Enabled = 2,
}

impl ContentProtection {
    pub const fn from_u8(u: u8) -> Option<Self> {
        match u {
            0 => Some(Self::Undesired),
            1 => Some(Self::Desired),
            2 => Some(Self::Enabled),
            _ => None,
        }
    }

    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_name(name: &[u8]) -> Option<Self> {
        let name = name.trim_ascii();
        match name.len() {
            7 if eq_ignore_ascii_case(name, b"desired") => Some(Self::Desired),
            7 if eq_ignore_ascii_case(name, b"enabled") => Some(Self::Enabled),
            9 if eq_ignore_ascii_case(name, b"undesired") => Some(Self::Undesired),
            _ => None,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Undesired => "Undesired",
            Self::Desired => "Desired",
            Self::Enabled => "Enabled",
        }
    }
}

impl fmt::Display for ContentProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

impl FromStr for ContentProtection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.as_bytes()).ok_or_else(|| ParseError {
            kind: "content protection",
            value: s.to_owned(),
        })
    }
}

/**
    Snapshot of the receiver and its downstream topology, rebuilt on every
    authentication attempt and published once authentication succeeds.
*/
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopologyInfo {
    /// The directly attached receiver's BKSV.
    pub bksv: Ksv,
    /// Receiver reported itself as a repeater.
    pub is_repeater: bool,
    /// Downstream device count from BSTATUS (1-127 when a repeater).
    pub device_count: u8,
    /// Cascade depth from BSTATUS.
    pub depth: u8,
    /// Downstream KSVs in KSV FIFO order.
    pub ksv_list: Vec<Ksv>,
}

impl TopologyInfo {
    pub fn new(bksv: Ksv) -> Self {
        Self {
            bksv,
            ..Self::default()
        }
    }

    /**
        Record the repeater's downstream view in one step.
    */
    pub fn set_downstream(&mut self, bstatus: Bstatus, ksv_list: Vec<Ksv>) {
        self.device_count = bstatus.device_count();
        self.depth = bstatus.depth();
        self.ksv_list = ksv_list;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_protection_names() {
        assert_eq!(
            "desired".parse::<ContentProtection>().unwrap(),
            ContentProtection::Desired
        );
        assert_eq!(
            " ENABLED ".parse::<ContentProtection>().unwrap(),
            ContentProtection::Enabled
        );
        assert_eq!(
            ContentProtection::from_name(b"Undesired"),
            Some(ContentProtection::Undesired)
        );
        let err = "maybe".parse::<ContentProtection>().unwrap_err();
        assert_eq!(err.kind, "content protection");
    }

    #[test]
    fn content_protection_u8_round_trip() {
        for v in 0..3 {
            let cp = ContentProtection::from_u8(v).unwrap();
            assert_eq!(cp.to_u8(), v);
        }
        assert_eq!(ContentProtection::from_u8(3), None);
    }

    #[test]
    fn topology_downstream() {
        let mut topology = TopologyInfo::new(Ksv::new([0xaa; 5]));
        topology.is_repeater = true;
        topology.set_downstream(Bstatus::new([0x02, 0x01]), vec![Ksv::new([0x55; 5]); 2]);
        assert_eq!(topology.device_count, 2);
        assert_eq!(topology.depth, 1);
        assert_eq!(topology.ksv_list.len(), 2);
    }
}
