use core::fmt;
use core::str::FromStr;

use crate::constants::{AN_LEN, KSV_LEN, KSV_ONES, RI_LEN};
use crate::error::KsvError;

/**
    A 40-bit Key Selection Vector, the public half of an HDCP device key set.

    Byte 0 is the least significant byte, matching the order in which
    receivers expose BKSV and KSV FIFO entries over the sideband.
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ksv([u8; KSV_LEN]);

impl Ksv {
    pub const fn new(bytes: [u8; KSV_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; KSV_LEN] {
        self.0
    }

    pub const fn as_bytes(&self) -> &[u8; KSV_LEN] {
        &self.0
    }

    /**
        Number of set bits across all 40 bits.
    */
    pub const fn ones(&self) -> u32 {
        let mut ones = 0;
        let mut i = 0;
        while i < KSV_LEN {
            ones += self.0[i].count_ones();
            i += 1;
        }
        ones
    }

    /**
        Structural validity: exactly 20 of the 40 bits are set.

        This is the format invariant HDCP places on every KSV. It says
        nothing about whether the key is genuine or revoked.
    */
    pub const fn is_valid(&self) -> bool {
        self.ones() == KSV_ONES
    }

    /**
        Split into the two little-endian 32-bit words a transmitter's
        BKSV low/high registers expect. The high word carries only byte 4.
    */
    pub const fn to_le_words(self) -> [u32; 2] {
        let b = self.0;
        [
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            b[4] as u32,
        ]
    }

    /**
        Parse from a hex string, with optional `0x` prefix and `:`/`-`/space separators.
    */
    pub fn from_hex(s: &str) -> Result<Self, KsvError> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();
        let bytes = hex::decode(&digits).map_err(|e| KsvError::InvalidHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; KSV_LEN]> for Ksv {
    fn from(bytes: [u8; KSV_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Ksv {
    type Error = KsvError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; KSV_LEN] = bytes
            .try_into()
            .map_err(|_| KsvError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl FromStr for Ksv {
    type Err = KsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Ksv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Ksv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ksv({})", self.to_hex())
    }
}

/**
    Free-standing form of [`Ksv::is_valid`] for raw byte arrays.
*/
pub const fn is_ksv_valid(bytes: &[u8; KSV_LEN]) -> bool {
    Ksv::new(*bytes).is_valid()
}

/**
    Transmitter-generated 64-bit session nonce.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct An([u8; AN_LEN]);

impl An {
    pub const fn new(bytes: [u8; AN_LEN]) -> Self {
        Self(bytes)
    }

    /**
        Assemble from the transmitter's An low/high registers (little-endian).
    */
    pub const fn from_le_words(lo: u32, hi: u32) -> Self {
        let lo = lo.to_le_bytes();
        let hi = hi.to_le_bytes();
        Self([lo[0], lo[1], lo[2], lo[3], hi[0], hi[1], hi[2], hi[3]])
    }

    pub const fn to_bytes(self) -> [u8; AN_LEN] {
        self.0
    }
}

/**
    Receiver link-verification response (R0′ right after authentication, Ri′ afterwards).
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ri([u8; RI_LEN]);

impl Ri {
    pub const fn new(bytes: [u8; RI_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; RI_LEN] {
        self.0
    }

    /**
        Value for the transmitter's Ri′ comparison register (little-endian, zero-extended).
    */
    pub const fn to_le_word(self) -> u32 {
        u16::from_le_bytes(self.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    #[test]
    fn all_zero_is_invalid() {
        assert!(!Ksv::new([0; 5]).is_valid());
    }

    #[test]
    fn all_ones_is_invalid() {
        assert!(!Ksv::new([0xff; 5]).is_valid());
    }

    #[test]
    fn alternating_pattern_is_valid() {
        // 0xaa has four ones per byte, 5 bytes = 20
        assert!(Ksv::new([0xaa; 5]).is_valid());
        assert!(Ksv::new([0x55; 5]).is_valid());
    }

    #[test]
    fn off_by_one_bit_is_invalid() {
        let ksv = Ksv::new(hex!("aaaaaaaaab"));
        assert_eq!(ksv.ones(), 21);
        assert!(!ksv.is_valid());
        let ksv = Ksv::new(hex!("aaaaaaaaa8"));
        assert_eq!(ksv.ones(), 19);
        assert!(!ksv.is_valid());
    }

    #[test]
    fn mixed_bytes_with_twenty_ones_is_valid() {
        let ksv = Ksv::new(hex!("0f0ff0ff00"));
        assert_eq!(ksv.ones(), 20);
        assert!(ksv.is_valid());
    }

    #[test]
    fn le_words() {
        let ksv = Ksv::new(hex!("0102030405"));
        assert_eq!(ksv.to_le_words(), [0x0403_0201, 0x05]);
    }

    #[test]
    fn an_from_words() {
        let an = An::from_le_words(0x0403_0201, 0x0807_0605);
        assert_eq!(an.to_bytes(), hex!("0102030405060708"));
    }

    #[test]
    fn ri_word() {
        assert_eq!(Ri::new(hex!("3412")).to_le_word(), 0x1234);
    }

    #[test]
    fn from_hex_accepts_separators() {
        let a = Ksv::from_hex("0x14:f7:61:03:b8").unwrap();
        let b: Ksv = "14f76103b8".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "14f76103b8");
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Ksv::from_hex("14f76103").unwrap_err();
        assert_eq!(err, KsvError::InvalidLength(4));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        let err = Ksv::from_hex("zzf76103b8").unwrap_err();
        assert!(matches!(err, KsvError::InvalidHex(_)));
    }

    proptest! {
        #[test]
        fn validity_matches_popcount(value in 0u64..(1u64 << 40)) {
            let bytes = value.to_le_bytes();
            let ksv = Ksv::new([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]);
            prop_assert_eq!(ksv.is_valid(), value.count_ones() == 20);
        }

        #[test]
        fn exactly_twenty_bits_always_valid(positions in proptest::sample::subsequence((0..40u32).collect::<Vec<_>>(), 20)) {
            let value = positions.iter().fold(0u64, |acc, bit| acc | (1u64 << bit));
            let bytes = value.to_le_bytes();
            prop_assert!(is_ksv_valid(&[bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]));
        }
    }
}
