/**
    Length in bytes of a Key Selection Vector.
*/
pub const KSV_LEN: usize = 5;

/**
    Number of set bits every structurally valid KSV carries (20 ones, 20 zeros).
*/
pub const KSV_ONES: u32 = 20;

/**
    Length in bytes of the session nonce An.
*/
pub const AN_LEN: usize = 8;

/**
    Length in bytes of the receiver response Ri′ / R0′.
*/
pub const RI_LEN: usize = 2;

/**
    Length in bytes of the BSTATUS topology word.
*/
pub const BSTATUS_LEN: usize = 2;

/**
    Number of 32-bit parts that make up the repeater hash V′ (SHA-1, 160 bits).
*/
pub const V_PRIME_NUM_PARTS: usize = 5;

/**
    Upper bound on downstream devices a repeater may report (7-bit field).
*/
pub const MAX_DEVICE_COUNT: u8 = 127;

/**
    Upper bound on repeater cascade depth.
*/
pub const MAX_CASCADE_DEPTH: u8 = 7;

/**
    SRM identifier for HDCP 1.x, carried in the high nibble of the first header byte.
*/
pub const SRM_ID_1X: u8 = 0x8;

/**
    Size of the fixed SRM header:
    SRM id and reserved bits (2) + version (2) + generation (1).
*/
pub const SRM_HEADER_LEN: usize = 5;

/**
    Size of the big-endian combined VRL length field.
*/
pub const VRL_LENGTH_SIZE: usize = 3;

/**
    Size of the DCP LLC signature trailing the VRLs.
*/
pub const DCP_SIG_SIZE: usize = 40;
