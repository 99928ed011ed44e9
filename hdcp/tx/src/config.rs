use std::time::Duration;

/**
    Timing budgets and retry counts for one connector.

    `Default` reproduces the values the HDCP 1.x protocol and the
    transmitter programming guide call for.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdcpConfig {
    /// Full key-load attempts before giving up, keys cleared in between.
    pub key_load_tries: u32,
    /// Polls of the key-status register per load attempt.
    pub key_load_polls: u32,
    /// Delay between key-status polls.
    pub key_load_poll_interval: Duration,

    /// Budget for the hardware to capture An.
    pub an_ready_timeout: Duration,
    /// Attempts to read a structurally valid BKSV.
    pub bksv_tries: u32,
    /// Budget for "R0 ready and encrypting" after auth+enc is switched on.
    pub r0_ready_timeout: Duration,
    /// Minimum time from sending Aksv before R0′ is read.
    pub r0_settle: Duration,
    /// Attempts to obtain an Ri′ match.
    pub ri_tries: u32,
    /// Budget for the match bit after each Ri′ write.
    pub ri_match_timeout: Duration,
    /// Budget for the final encryption confirmation.
    pub enc_timeout: Duration,

    /// Budget for a repeater to assemble its KSV list.
    pub ksv_fifo_timeout: Duration,
    /// First and last interval of the KSV-ready backoff.
    pub ksv_fifo_poll_min: Duration,
    pub ksv_fifo_poll_max: Duration,
    /// Budget for the SHA-1 engine to accept one text word.
    pub sha_ready_timeout: Duration,
    /// Budget for the SHA-1 engine to finish the hash.
    pub sha_complete_timeout: Duration,

    /// Budget for the port status register to clear on disable.
    pub disable_timeout: Duration,
    /// Full handshake attempts per enable.
    pub auth_tries: u32,
    /// Interval of the link-integrity check.
    pub check_period: Duration,
}

impl Default for HdcpConfig {
    fn default() -> Self {
        Self {
            key_load_tries: 5,
            key_load_polls: 10,
            key_load_poll_interval: Duration::from_micros(50),

            an_ready_timeout: Duration::from_secs(2),
            bksv_tries: 2,
            r0_ready_timeout: Duration::from_millis(1),
            r0_settle: Duration::from_millis(300),
            ri_tries: 3,
            ri_match_timeout: Duration::from_millis(1),
            enc_timeout: Duration::from_secs(2),

            ksv_fifo_timeout: Duration::from_secs(5),
            ksv_fifo_poll_min: Duration::from_millis(1),
            ksv_fifo_poll_max: Duration::from_millis(100),
            sha_ready_timeout: Duration::from_millis(1),
            sha_complete_timeout: Duration::from_millis(1),

            disable_timeout: Duration::from_millis(20),
            auth_tries: 3,
            check_period: Duration::from_secs(2),
        }
    }
}

impl HdcpConfig {
    /**
        Same retry counts as [`Default`], every wait shrunk to a few
        milliseconds. Intended for simulated hardware.
    */
    pub fn fast() -> Self {
        Self {
            key_load_poll_interval: Duration::from_micros(1),
            an_ready_timeout: Duration::from_millis(5),
            r0_ready_timeout: Duration::from_millis(5),
            r0_settle: Duration::ZERO,
            ri_match_timeout: Duration::from_millis(2),
            enc_timeout: Duration::from_millis(5),
            ksv_fifo_timeout: Duration::from_millis(20),
            ksv_fifo_poll_min: Duration::from_micros(100),
            ksv_fifo_poll_max: Duration::from_millis(2),
            sha_ready_timeout: Duration::from_millis(5),
            sha_complete_timeout: Duration::from_millis(5),
            disable_timeout: Duration::from_millis(5),
            check_period: Duration::from_millis(20),
            ..Self::default()
        }
    }
}
