use crate::constants::{DCP_SIG_SIZE, KSV_LEN, SRM_HEADER_LEN, SRM_ID_1X, VRL_LENGTH_SIZE};
use crate::error::SrmError;
use crate::ksv::Ksv;

/**
    Fixed SRM header.

    Layout:
      [0]     bits 4..7 SRM id (0x8 for HDCP 1.x), bits 0..3 reserved
      [1]     reserved
      [2..4]  version: u16 big-endian
      [4]     generation number
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrmHeader {
    pub srm_id: u8,
    pub reserved: u16,
    pub version: u16,
    pub generation: u8,
}

impl SrmHeader {
    fn from_bytes(b: &[u8; SRM_HEADER_LEN]) -> Self {
        Self {
            srm_id: b[0] >> 4,
            reserved: u16::from_be_bytes([b[0] & 0x0f, b[1]]),
            version: u16::from_be_bytes([b[2], b[3]]),
            generation: b[4],
        }
    }

    /**
        Reserved bits should be zero; callers may choose to report it.
    */
    pub const fn reserved_bits_set(&self) -> bool {
        self.reserved != 0
    }
}

/**
    Parsed System Renewability Message (first generation only).

    After the header:
      [5..8]   VRL length: u24 big-endian, covering itself, all VRLs and the signature
      [8..]    VRLs: each a 1-byte KSV count followed by count * 5 KSV bytes
      [..+40]  DCP LLC signature (not verified here)
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srm {
    pub header: SrmHeader,
    /// Declared combined VRL length, including length field and signature.
    pub vrl_length: usize,
    /// Number of VRL segments walked.
    pub vrl_count: usize,
    pub revoked: RevocationList,
}

impl Srm {
    /**
        Parse a base64-encoded SRM blob.
    */
    pub fn from_base64(srm: &str) -> Result<Self, SrmError> {
        let bytes = data_encoding::BASE64
            .decode(srm.trim().as_bytes())
            .map_err(|e| SrmError::InvalidBase64(format!("SRM: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /**
        Parse an SRM blob from raw bytes.
    */
    pub fn from_bytes(input: &[u8]) -> Result<Self, SrmError> {
        if input.len() < SRM_HEADER_LEN + VRL_LENGTH_SIZE + DCP_SIG_SIZE {
            return Err(SrmError::TooShort(input.len()));
        }

        let mut header_bytes = [0u8; SRM_HEADER_LEN];
        header_bytes.copy_from_slice(&input[..SRM_HEADER_LEN]);
        let header = SrmHeader::from_bytes(&header_bytes);
        if header.srm_id != SRM_ID_1X {
            return Err(SrmError::SrmIdMismatch(header.srm_id, SRM_ID_1X));
        }

        let len_field = &input[SRM_HEADER_LEN..SRM_HEADER_LEN + VRL_LENGTH_SIZE];
        let vrl_length = u32::from_be_bytes([0, len_field[0], len_field[1], len_field[2]]) as usize;

        let available = input.len() - SRM_HEADER_LEN;
        if vrl_length > available {
            return Err(SrmError::VrlLengthExceedsBlob {
                vrl_length,
                available,
            });
        }
        if vrl_length < VRL_LENGTH_SIZE + DCP_SIG_SIZE {
            return Err(SrmError::VrlLengthTooSmall(vrl_length));
        }

        // Length of all VRLs combined
        let payload_len = vrl_length - (VRL_LENGTH_SIZE + DCP_SIG_SIZE);
        if payload_len == 0 {
            return Err(SrmError::NoVrls);
        }

        let start = SRM_HEADER_LEN + VRL_LENGTH_SIZE;
        let payload = &input[start..start + payload_len];

        // Two independent walks; both must agree before the list is trusted.
        let counted = count_revoked(payload)?;
        let (ksvs, vrl_count) = collect_revoked(payload)?;
        if ksvs.len() != counted {
            return Err(SrmError::KsvCountMismatch {
                counted,
                copied: ksvs.len(),
            });
        }

        Ok(Srm {
            header,
            vrl_length,
            vrl_count,
            revoked: RevocationList { ksvs },
        })
    }
}

/**
    Walk the VRL segments and sum their declared KSV counts.
*/
fn count_revoked(payload: &[u8]) -> Result<usize, SrmError> {
    let mut offset = 0;
    let mut count = 0;
    while offset < payload.len() {
        let n = payload[offset];
        check_segment(payload, offset, n)?;
        count += n as usize;
        offset += 1 + n as usize * KSV_LEN;
    }
    Ok(count)
}

/**
    Walk the VRL segments copying every KSV into a flat list.
    Returns the list and the number of segments seen.
*/
fn collect_revoked(payload: &[u8]) -> Result<(Vec<Ksv>, usize), SrmError> {
    let mut offset = 0;
    let mut segments = 0;
    let mut ksvs = Vec::new();
    while offset < payload.len() {
        let n = payload[offset];
        check_segment(payload, offset, n)?;
        offset += 1;
        for chunk in payload[offset..offset + n as usize * KSV_LEN].chunks_exact(KSV_LEN) {
            ksvs.push(Ksv::try_from(chunk).map_err(|_| SrmError::SegmentOverrun {
                offset,
                count: n,
            })?);
        }
        offset += n as usize * KSV_LEN;
        segments += 1;
    }
    Ok((ksvs, segments))
}

fn check_segment(payload: &[u8], offset: usize, count: u8) -> Result<(), SrmError> {
    if offset + 1 + count as usize * KSV_LEN > payload.len() {
        Err(SrmError::SegmentOverrun { offset, count })
    } else {
        Ok(())
    }
}

/**
    Flat, ordered list of revoked KSVs extracted from an SRM.
*/
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RevocationList {
    ksvs: Vec<Ksv>,
}

impl RevocationList {
    pub fn new(ksvs: Vec<Ksv>) -> Self {
        Self { ksvs }
    }

    /**
        Parse an SRM blob and keep only its revoked KSVs.
    */
    pub fn parse(blob: &[u8]) -> Result<Self, SrmError> {
        Srm::from_bytes(blob).map(|srm| srm.revoked)
    }

    pub fn ksvs(&self) -> &[Ksv] {
        &self.ksvs
    }

    pub fn len(&self) -> usize {
        self.ksvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ksvs.is_empty()
    }

    /**
        First candidate that byte-equals a revoked entry, if any.
    */
    pub fn find_revoked<'a>(&self, candidates: &'a [Ksv]) -> Option<&'a Ksv> {
        candidates
            .iter()
            .find(|candidate| self.ksvs.iter().any(|revoked| revoked == *candidate))
    }

    /**
        `true` if any candidate is on the list.
    */
    pub fn contains(&self, candidates: &[Ksv]) -> bool {
        self.find_revoked(candidates).is_some()
    }
}
