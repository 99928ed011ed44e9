use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::runtime::Handle;

use hdcp_core::{MAX_DEVICE_COUNT, RevocationList};
use hdcp_tx::sim::{SimReceiver, sim_link};
use hdcp_tx::{Connector, HdcpConfig, Port, RevocationStore, Session};

/**
    Run a full authentication against simulated hardware.
*/
#[derive(Args)]
pub struct SimulateCommand {
    /// Downstream devices behind a repeater. Zero attaches a plain sink.
    #[arg(short, long, default_value_t = 0)]
    pub devices: u8,

    /// Revoke the downstream KSV at this index before authenticating.
    #[arg(short, long)]
    pub revoked_index: Option<usize>,

    /// Transmitter port.
    #[arg(short, long, default_value = "B")]
    pub port: Port,

    /// Link-integrity checks to observe before disabling.
    #[arg(short, long, default_value_t = 3)]
    pub checks: u32,
}

impl SimulateCommand {
    pub async fn run(self) -> Result<()> {
        let devices = self.devices.min(MAX_DEVICE_COUNT) as usize;
        let receiver = if devices == 0 {
            SimReceiver::sink()
        } else {
            SimReceiver::repeater(SimReceiver::downstream_ksvs(devices))
        };

        let revoked = match self.revoked_index {
            Some(index) => {
                let ksv = receiver
                    .downstream()
                    .get(index)
                    .with_context(|| format!("no downstream device at index {index}"))?;
                RevocationList::new(vec![*ksv])
            }
            None => RevocationList::default(),
        };

        let config = HdcpConfig::fast();
        let check_period = config.check_period;
        let (tx, shim) = sim_link(self.port, receiver);
        let session = Session::new(
            format!("sim-{}", self.port),
            Box::new(tx.clone()),
            Box::new(shim.clone()),
            Arc::new(RevocationStore::with_list(revoked)),
            config,
        )?;
        let connector = Connector::new(session, Handle::current());

        let mut property = connector.subscribe();
        let watcher = tokio::spawn(async move {
            println!("Property:    {}", *property.borrow_and_update());
            while property.changed().await.is_ok() {
                println!("Property:    {}", *property.borrow_and_update());
            }
        });

        let result = connector.authenticate().await;
        match &result {
            Ok(()) => println!("Handshake:   ok"),
            Err(err) => println!("Handshake:   failed ({err})"),
        }

        if let Some(topology) = connector.subscribe_downstream().borrow().as_ref() {
            println!("BKSV:        {}", topology.bksv);
            println!("Repeater:    {}", topology.is_repeater);
            if topology.is_repeater {
                println!("Depth:       {}", topology.depth);
                println!("Devices ({}):", topology.device_count);
                for ksv in &topology.ksv_list {
                    println!("  {ksv}");
                }
            }
        }

        if result.is_ok() {
            tokio::time::sleep(check_period * self.checks + check_period / 2).await;
            println!("Encrypting:  {}", tx.encrypting());
            println!("Link checks: {}", shim.link_checks());
        }

        connector.disable().await.context("failed to disable HDCP")?;
        drop(connector);
        let _ = tokio::time::timeout(Duration::from_millis(100), watcher).await;

        result.context("authentication failed")
    }
}
