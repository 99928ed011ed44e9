use anyhow::{Context, Result, bail};
use clap::Args;

use hdcp_core::{BSTATUS_LEN, Bstatus, Ksv, MAX_DEVICE_COUNT};
use hdcp_tx::{ShaOp, frame_sha_text, message_bits};

/**
    Show the SHA-1 text stream written for a repeater's KSV list.
*/
#[derive(Args)]
pub struct ShaTextCommand {
    /// Downstream KSVs in KSV FIFO order.
    #[arg(required = true)]
    pub ksvs: Vec<Ksv>,

    /// BSTATUS as 4 hex digits, defaults to the device count at depth 1.
    #[arg(short, long)]
    pub bstatus: Option<String>,
}

impl ShaTextCommand {
    pub fn run(self) -> Result<()> {
        if self.ksvs.len() > MAX_DEVICE_COUNT as usize {
            bail!(
                "{} KSVs exceed the {MAX_DEVICE_COUNT} device limit",
                self.ksvs.len()
            );
        }

        let bstatus = match &self.bstatus {
            Some(s) => parse_bstatus(s)?,
            None => Bstatus::new([self.ksvs.len() as u8, 1]),
        };

        let ops = frame_sha_text(&self.ksvs, bstatus);
        let words = ops.iter().filter(|op| matches!(op, ShaOp::Text(_))).count();

        println!("Devices:     {}", self.ksvs.len());
        println!("BSTATUS:     {}", hex::encode(bstatus.to_bytes()));
        println!("Message:     {} bits", message_bits(self.ksvs.len()));
        println!("Text words:  {words}");
        println!();
        for op in &ops {
            println!("  {op}");
        }

        Ok(())
    }
}

fn parse_bstatus(s: &str) -> Result<Bstatus> {
    let bytes = hex::decode(s.trim()).context("BSTATUS is not valid hex")?;
    let bytes: [u8; BSTATUS_LEN] = bytes
        .as_slice()
        .try_into()
        .with_context(|| format!("BSTATUS must be {BSTATUS_LEN} bytes, got {}", bytes.len()))?;
    Ok(Bstatus::new(bytes))
}
