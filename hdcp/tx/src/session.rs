use std::sync::Arc;

use tracing::{debug, error, info, warn};

use hdcp_core::{ContentProtection, TopologyInfo};

use crate::auth::authenticate;
use crate::config::HdcpConfig;
use crate::error::{HdcpError, HdcpResult};
use crate::keys::load_keys;
use crate::regs::{Port, Register, STATUS_ENC};
use crate::revocation::RevocationStore;
use crate::shim::Shim;
use crate::transmitter::Transmitter;
use crate::wait::wait_for_register;

/**
    Everything one connector owns for HDCP: the transmitter and receiver
    handles, its configuration, the authentication state and the topology
    of the last successful authentication.

    A `Session` is driven synchronously; [`crate::Connector`] puts it behind
    a mutex and schedules the work.

    State moves `Undesired → Enabled` on a successful [`enable`](Self::enable),
    `Enabled → Desired` when the link check gives up on the link, and back to
    `Undesired` on [`disable`](Self::disable).
*/
pub struct Session {
    name: String,
    config: HdcpConfig,
    tx: Box<dyn Transmitter>,
    shim: Box<dyn Shim>,
    revocation: Arc<RevocationStore>,
    value: ContentProtection,
    topology: TopologyInfo,
    srm_blob_id: Option<u32>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        tx: Box<dyn Transmitter>,
        shim: Box<dyn Shim>,
        revocation: Arc<RevocationStore>,
        config: HdcpConfig,
    ) -> HdcpResult<Self> {
        let port = tx.port();
        if !port.supports_hdcp() {
            return Err(HdcpError::Unsupported(port));
        }
        Ok(Self {
            name: name.into(),
            config,
            tx,
            shim,
            revocation,
            value: ContentProtection::Undesired,
            topology: TopologyInfo::default(),
            srm_blob_id: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> Port {
        self.tx.port()
    }

    pub fn config(&self) -> &HdcpConfig {
        &self.config
    }

    pub fn value(&self) -> ContentProtection {
        self.value
    }

    pub(crate) fn set_value(&mut self, value: ContentProtection) {
        self.value = value;
    }

    pub fn topology(&self) -> &TopologyInfo {
        &self.topology
    }

    /**
        Identifier of the last SRM blob applied through this session.
    */
    pub fn srm_blob_id(&self) -> Option<u32> {
        self.srm_blob_id
    }

    pub fn revocation(&self) -> &Arc<RevocationStore> {
        &self.revocation
    }

    pub(crate) fn read_register(&self, reg: Register) -> u32 {
        self.tx.read(reg)
    }

    pub(crate) fn is_encrypting(&self) -> bool {
        self.read_register(Register::Status) & STATUS_ENC != 0
    }

    pub(crate) fn shim_mut(&mut self) -> &mut dyn Shim {
        self.shim.as_mut()
    }

    /**
        Load keys and run the full handshake, retrying it up to
        `config.auth_tries` times with the hardware reset in between.

        On success the session is `Enabled` and holds the new topology. On
        failure the topology is cleared and the last error is returned. A
        session that was `Enabled` drops back to `Desired`, since the link is
        no longer encrypting; otherwise the state is left as it was.
    */
    pub fn enable(&mut self) -> HdcpResult<()> {
        debug!(connector = %self.name, port = %self.port(), "HDCP is being enabled");

        if let Err(err) = load_keys(self.tx.as_mut(), &self.config) {
            self.demote();
            return Err(err);
        }

        let revoked = self.revocation.snapshot();
        let mut last = HdcpError::NoDevice("no authentication attempted".into());
        for attempt in 1..=self.config.auth_tries.max(1) {
            match authenticate(self.tx.as_mut(), self.shim.as_mut(), &revoked, &self.config) {
                Ok(topology) => {
                    self.topology = topology;
                    self.value = ContentProtection::Enabled;
                    info!(
                        connector = %self.name,
                        repeater = self.topology.is_repeater,
                        devices = self.topology.device_count,
                        "HDCP enabled"
                    );
                    return Ok(());
                }
                Err(err) => {
                    debug!(connector = %self.name, attempt, error = %err, "HDCP auth failure");
                    // Leave encryption and signalling off before the next try.
                    if let Err(disable_err) = self.disable_hardware() {
                        warn!(connector = %self.name, error = %disable_err, "HDCP cleanup failed");
                    }
                    let retry = err.is_retryable();
                    last = err;
                    if !retry {
                        break;
                    }
                }
            }
        }

        self.topology = TopologyInfo::default();
        self.demote();
        error!(
            connector = %self.name,
            tries = self.config.auth_tries,
            error = %last,
            "HDCP authentication failed"
        );
        Err(last)
    }

    fn demote(&mut self) {
        if self.value == ContentProtection::Enabled {
            self.value = ContentProtection::Desired;
        }
    }

    /**
        Turn off encryption and signalling and forget the topology without
        touching the session state.
    */
    pub fn disable_hardware(&mut self) -> HdcpResult<()> {
        debug!(connector = %self.name, "HDCP is being disabled");

        self.tx.write(Register::Conf, 0);
        wait_for_register(
            &*self.tx,
            Register::Status,
            !0,
            0,
            self.config.disable_timeout,
            "HDCP status to clear",
        )
        .inspect_err(|err| error!(connector = %self.name, error = %err, "failed to disable HDCP"))?;

        self.shim
            .toggle_signalling(false)
            .inspect_err(|err| error!(connector = %self.name, error = %err, "failed to disable HDCP signalling"))?;

        self.topology = TopologyInfo::default();
        debug!(connector = %self.name, "HDCP is disabled");
        Ok(())
    }

    /**
        Move to `Undesired`, shutting the hardware down if HDCP was in use.
        Disabling an already disabled session does nothing.
    */
    pub fn disable(&mut self) -> HdcpResult<()> {
        if self.value == ContentProtection::Undesired {
            return Ok(());
        }
        self.value = ContentProtection::Undesired;
        self.disable_hardware()
    }

    /**
        Apply an SRM blob unless it is the one applied last. Failures are
        logged and leave both the revocation list and the recorded blob
        identifier untouched. Returns whether the blob was applied.
    */
    pub fn update_srm(&mut self, blob_id: u32, blob: &[u8]) -> bool {
        if self.srm_blob_id == Some(blob_id) {
            return false;
        }
        match self.revocation.apply_srm(blob) {
            Ok(_) => {
                self.srm_blob_id = Some(blob_id);
                true
            }
            Err(err) => {
                warn!(connector = %self.name, blob_id, error = %err, "SRM rejected");
                false
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("port", &self.port())
            .field("value", &self.value)
            .field("topology", &self.topology)
            .field("srm_blob_id", &self.srm_blob_id)
            .finish_non_exhaustive()
    }
}
