use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use hdcp_core::{Ksv, RevocationList};

/**
    Validate KSVs and check them against an SRM.
*/
#[derive(Args)]
pub struct CheckKsvCommand {
    /// KSVs as 10 hex digits each.
    #[arg(required = true)]
    pub ksvs: Vec<Ksv>,

    /// SRM file to check the KSVs against.
    #[arg(short, long)]
    pub srm: Option<PathBuf>,
}

impl CheckKsvCommand {
    pub fn run(self) -> Result<()> {
        let revoked = match &self.srm {
            Some(path) => super::read_srm(path)?.revoked,
            None => RevocationList::default(),
        };

        let mut rejected = 0;
        for ksv in &self.ksvs {
            let is_revoked = revoked.contains(std::slice::from_ref(ksv));
            let verdict = if !ksv.is_valid() {
                "invalid"
            } else if is_revoked {
                "revoked"
            } else {
                "ok"
            };
            if verdict != "ok" {
                rejected += 1;
            }
            println!("{ksv}  ones={:<2}  {verdict}", ksv.ones());
        }

        if rejected > 0 {
            bail!("{rejected} of {} KSVs rejected", self.ksvs.len());
        }
        Ok(())
    }
}
