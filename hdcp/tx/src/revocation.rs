use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use hdcp_core::{RevocationList, Srm, SrmError};

/**
    The active revocation list, shared by every authentication attempt.

    Readers take a snapshot (`Arc`) and keep using it for the whole attempt;
    a replacement swaps the `Arc` so a reader never sees a partial list.
*/
#[derive(Debug, Default)]
pub struct RevocationStore {
    current: RwLock<Arc<RevocationList>>,
}

impl RevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(list: RevocationList) -> Self {
        Self {
            current: RwLock::new(Arc::new(list)),
        }
    }

    pub fn snapshot(&self) -> Arc<RevocationList> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, list: RevocationList) {
        *self.current.write() = Arc::new(list);
    }

    /**
        Parse an SRM blob and, if it is well formed, make its revoked KSVs
        the active list. A malformed blob leaves the current list in place.

        Returns the number of revoked KSVs now active.
    */
    pub fn apply_srm(&self, blob: &[u8]) -> Result<usize, SrmError> {
        let srm = Srm::from_bytes(blob).inspect_err(|err| warn!(error = %err, "invalid SRM"))?;
        if srm.header.reserved_bits_set() {
            warn!(reserved = srm.header.reserved, "SRM reserved bits are set");
        }
        let count = srm.revoked.len();
        self.replace(srm.revoked);
        info!(
            version = srm.header.version,
            generation = srm.header.generation,
            revoked = count,
            "SRM applied"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdcp_core::Ksv;
    use hex_literal::hex;

    fn srm(ksvs: &[[u8; 5]]) -> Vec<u8> {
        let mut vrls = vec![ksvs.len() as u8];
        for ksv in ksvs {
            vrls.extend_from_slice(ksv);
        }
        let vrl_length = 3 + vrls.len() + 40;
        let mut blob = hex!("80 00 0001 01").to_vec();
        blob.extend_from_slice(&(vrl_length as u32).to_be_bytes()[1..]);
        blob.extend_from_slice(&vrls);
        blob.extend_from_slice(&[0u8; 40]);
        blob
    }

    const A: [u8; 5] = hex!("0f0ff0ff00");
    const B: [u8; 5] = hex!("f0f00f00ff");

    #[test]
    fn applies_well_formed_srm() {
        let store = RevocationStore::new();
        assert_eq!(store.apply_srm(&srm(&[A, B])).unwrap(), 2);
        assert!(store.snapshot().contains(&[Ksv::new(B)]));
    }

    #[test]
    fn malformed_srm_keeps_previous_list() {
        let store = RevocationStore::with_list(RevocationList::new(vec![Ksv::new(A)]));
        let mut bad = srm(&[B]);
        bad[0] = 0x90;
        assert_eq!(
            store.apply_srm(&bad).unwrap_err(),
            SrmError::SrmIdMismatch(0x9, 0x8)
        );
        assert!(store.snapshot().contains(&[Ksv::new(A)]));
    }

    #[test]
    fn empty_srm_clears_the_list() {
        let store = RevocationStore::with_list(RevocationList::new(vec![Ksv::new(A)]));
        assert_eq!(store.apply_srm(&srm(&[])).unwrap(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn snapshot_outlives_replacement() {
        let store = RevocationStore::with_list(RevocationList::new(vec![Ksv::new(A)]));
        let before = store.snapshot();
        store.replace(RevocationList::new(vec![Ksv::new(B)]));
        assert!(before.contains(&[Ksv::new(A)]));
        assert!(!store.snapshot().contains(&[Ksv::new(A)]));
    }
}
