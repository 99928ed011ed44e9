#![allow(clippy::doc_overindented_list_items)]

mod bstatus;
mod constants;
mod error;
mod ksv;
mod srm;
mod types;
mod utils;

pub use self::bstatus::Bstatus;
pub use self::constants::{
    AN_LEN, BSTATUS_LEN, DCP_SIG_SIZE, KSV_LEN, KSV_ONES, MAX_CASCADE_DEPTH, MAX_DEVICE_COUNT,
    RI_LEN, SRM_HEADER_LEN, SRM_ID_1X, V_PRIME_NUM_PARTS, VRL_LENGTH_SIZE,
};
pub use self::error::{KsvError, ParseError, SrmError};
pub use self::ksv::{An, Ksv, Ri, is_ksv_valid};
pub use self::srm::{RevocationList, Srm, SrmHeader};
pub use self::types::{ContentProtection, TopologyInfo};
pub use self::utils::eq_ignore_ascii_case;
