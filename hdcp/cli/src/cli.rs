use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{CheckKsvCommand, InspectSrmCommand, ShaTextCommand, SimulateCommand};

/**
    HDCP 1.x command-line tool.
*/
#[derive(Parser)]
#[command(name = "hdcp")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect a System Renewability Message.
    InspectSrm(InspectSrmCommand),
    /// Validate KSVs and check them against an SRM.
    CheckKsv(CheckKsvCommand),
    /// Show the SHA-1 text stream written for a repeater's KSV list.
    ShaText(ShaTextCommand),
    /// Run a full authentication against simulated hardware.
    Simulate(SimulateCommand),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::InspectSrm(cmd) => cmd.run(),
            Command::CheckKsv(cmd) => cmd.run(),
            Command::ShaText(cmd) => cmd.run(),
            Command::Simulate(cmd) => cmd.run().await,
        }
    }
}
