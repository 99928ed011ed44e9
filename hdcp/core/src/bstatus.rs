use core::fmt;

use crate::constants::BSTATUS_LEN;

const DEVICE_COUNT_MASK: u8 = 0x7f;
const MAX_DEVS_EXCEEDED: u8 = 1 << 7;
const DEPTH_MASK: u8 = 0x07;
const MAX_CASCADE_EXCEEDED: u8 = 1 << 3;
const HDMI_MODE: u8 = 1 << 4;

/**
    Repeater topology status word (BSTATUS on HDMI, BINFO on DisplayPort).

    Layout, as read from the receiver:
      [0] bits 0..6  device count
      [0] bit 7      MAX_DEVS_EXCEEDED
      [1] bits 0..2  cascade depth
      [1] bit 3      MAX_CASCADE_EXCEEDED
      [1] bit 4      HDMI_MODE
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bstatus([u8; BSTATUS_LEN]);

impl Bstatus {
    pub const fn new(bytes: [u8; BSTATUS_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; BSTATUS_LEN] {
        self.0
    }

    pub const fn device_count(&self) -> u8 {
        self.0[0] & DEVICE_COUNT_MASK
    }

    pub const fn depth(&self) -> u8 {
        self.0[1] & DEPTH_MASK
    }

    pub const fn max_devices_exceeded(&self) -> bool {
        self.0[0] & MAX_DEVS_EXCEEDED != 0
    }

    pub const fn max_cascade_exceeded(&self) -> bool {
        self.0[1] & MAX_CASCADE_EXCEEDED != 0
    }

    /**
        Either topology limit flag is raised.
    */
    pub const fn topology_exceeded(&self) -> bool {
        self.max_devices_exceeded() || self.max_cascade_exceeded()
    }

    pub const fn hdmi_mode(&self) -> bool {
        self.0[1] & HDMI_MODE != 0
    }
}

impl From<[u8; BSTATUS_LEN]> for Bstatus {
    fn from(bytes: [u8; BSTATUS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Bstatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bstatus")
            .field("raw", &hex::encode(self.0))
            .field("device_count", &self.device_count())
            .field("depth", &self.depth())
            .field("max_devices_exceeded", &self.max_devices_exceeded())
            .field("max_cascade_exceeded", &self.max_cascade_exceeded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn decodes_count_and_depth() {
        let bstatus = Bstatus::new(hex!("0702"));
        assert_eq!(bstatus.device_count(), 7);
        assert_eq!(bstatus.depth(), 2);
        assert!(!bstatus.topology_exceeded());
        assert!(!bstatus.hdmi_mode());
    }

    #[test]
    fn limit_flags() {
        let bstatus = Bstatus::new(hex!("8000"));
        assert!(bstatus.max_devices_exceeded());
        assert_eq!(bstatus.device_count(), 0);
        assert!(bstatus.topology_exceeded());

        let bstatus = Bstatus::new(hex!("0318"));
        assert!(bstatus.max_cascade_exceeded());
        assert!(bstatus.hdmi_mode());
        assert_eq!(bstatus.depth(), 0);
        assert!(bstatus.topology_exceeded());
    }
}
