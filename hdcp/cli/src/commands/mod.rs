mod check_ksv;
mod inspect_srm;
mod sha_text;
mod simulate;

pub use self::check_ksv::CheckKsvCommand;
pub use self::inspect_srm::InspectSrmCommand;
pub use self::sha_text::ShaTextCommand;
pub use self::simulate::SimulateCommand;

use std::path::Path;

use anyhow::{Context, Result};
use hdcp_core::Srm;

/**
    Read an SRM file, accepting either the raw binary form or base64 text.

    A binary 1.x SRM opens with 0x8_, which is never valid UTF-8, so any
    file that decodes as text is treated as base64.
*/
pub(crate) fn read_srm(path: &Path) -> Result<Srm> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read SRM file {}", path.display()))?;
    let srm = match std::str::from_utf8(&bytes) {
        Ok(text) => Srm::from_base64(text),
        Err(_) => Srm::from_bytes(&bytes),
    };
    srm.context("failed to parse SRM")
}
