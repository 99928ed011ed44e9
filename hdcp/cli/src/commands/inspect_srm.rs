use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

/**
    Inspect a System Renewability Message.
*/
#[derive(Args)]
pub struct InspectSrmCommand {
    /// Path to the SRM file, binary or base64.
    pub path: PathBuf,
}

impl InspectSrmCommand {
    pub fn run(self) -> Result<()> {
        let srm = super::read_srm(&self.path)?;

        println!("SRM ID:      {:#x}", srm.header.srm_id);
        println!("Version:     {}", srm.header.version);
        println!("Generation:  {}", srm.header.generation);
        println!("VRL Length:  {} bytes", srm.vrl_length);
        println!("VRLs:        {}", srm.vrl_count);
        if srm.header.reserved_bits_set() {
            println!("Reserved:    {:#06x} (should be zero)", srm.header.reserved);
        }

        let revoked = srm.revoked.ksvs();
        println!();
        println!("Revoked KSVs ({}):", revoked.len());
        for ksv in revoked {
            println!("  {ksv}");
        }

        Ok(())
    }
}
