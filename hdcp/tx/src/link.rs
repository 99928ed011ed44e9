use tracing::{debug, error, warn};

use hdcp_core::ContentProtection;

use crate::error::HdcpError;
use crate::regs::Register;
use crate::session::Session;

/**
    Result of one link-integrity check.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCheck {
    /// HDCP is not in use on this session; nothing was checked.
    Idle,
    /// Link verified, session is `Enabled`.
    Healthy,
    /// Encryption stopped on its own; session demoted to `Desired`.
    NotEncrypting,
    /// Link failed and a fresh authentication succeeded. A failure of the
    /// disable step in between is reported but did not stop the retry.
    Reauthenticated { disable_error: Option<HdcpError> },
    /// Link failed and re-authentication did too; session demoted to `Desired`.
    Failed(HdcpError),
}

impl LinkCheck {
    /**
        Whether the periodic check should run again after this outcome.
    */
    pub fn keep_checking(&self) -> bool {
        matches!(self, Self::Healthy | Self::Reauthenticated { .. })
    }
}

impl Session {
    /**
        Verify the link of an authenticated session, re-authenticating
        once if the interface-level check fails.
    */
    pub fn check_link(&mut self) -> LinkCheck {
        if self.value() == ContentProtection::Undesired {
            return LinkCheck::Idle;
        }

        if !self.is_encrypting() {
            error!(
                connector = %self.name(),
                status = format_args!("{:#010x}", self.status()),
                "HDCP check failed: link is not encrypted"
            );
            self.set_value(ContentProtection::Desired);
            return LinkCheck::NotEncrypting;
        }

        if self.shim_mut().check_link() {
            self.set_value(ContentProtection::Enabled);
            return LinkCheck::Healthy;
        }

        debug!(connector = %self.name(), "HDCP link failed, retrying authentication");

        let disable_error = self.disable_hardware().err();
        if let Some(err) = &disable_error {
            warn!(connector = %self.name(), error = %err, "failed to disable HDCP before re-authentication");
        }

        match self.enable() {
            Ok(()) => LinkCheck::Reauthenticated { disable_error },
            Err(err) => {
                error!(connector = %self.name(), error = %err, "failed to re-enable HDCP");
                self.set_value(ContentProtection::Desired);
                LinkCheck::Failed(err)
            }
        }
    }

    fn status(&self) -> u32 {
        self.read_register(Register::Status)
    }
}
