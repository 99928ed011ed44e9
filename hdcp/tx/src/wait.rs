use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HdcpError, HdcpResult};
use crate::regs::Register;
use crate::transmitter::Transmitter;

/**
    Interval bounds for a polling loop. The interval doubles after every
    unsuccessful check until it reaches `max`.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Register status bits settle within microseconds.
    pub const REGISTER: Self = Self {
        min: Duration::from_micros(10),
        max: Duration::from_millis(1),
    };

    pub const fn fixed(interval: Duration) -> Self {
        Self {
            min: interval,
            max: interval,
        }
    }
}

/**
    Poll `condition` until it returns `Ok(true)` or `timeout` elapses.

    The condition is always evaluated once more after the deadline so a
    thread descheduled past the deadline does not report a spurious timeout.
    An `Err` from the condition ends the wait immediately.
*/
pub fn poll_until<F>(
    timeout: Duration,
    backoff: Backoff,
    what: &'static str,
    mut condition: F,
) -> HdcpResult<()>
where
    F: FnMut() -> HdcpResult<bool>,
{
    let deadline = Instant::now() + timeout;
    let mut interval = backoff.min;
    loop {
        let expired = Instant::now() >= deadline;
        if condition()? {
            return Ok(());
        }
        if expired {
            return Err(HdcpError::Timeout(what));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        thread::sleep(interval.min(remaining));
        interval = (interval * 2).min(backoff.max);
    }
}

/**
    Wait until `reg & mask == value`. Returns the last value read.
*/
pub fn wait_for_register(
    tx: &dyn Transmitter,
    reg: Register,
    mask: u32,
    value: u32,
    timeout: Duration,
    what: &'static str,
) -> HdcpResult<u32> {
    let mut last = 0;
    poll_until(timeout, Backoff::REGISTER, what, || {
        last = tx.read(reg);
        Ok(last & mask == value)
    })?;
    Ok(last)
}

/**
    Wait until every bit of `bits` is set in `reg`.
*/
pub fn wait_for_bits(
    tx: &dyn Transmitter,
    reg: Register,
    bits: u32,
    timeout: Duration,
    what: &'static str,
) -> HdcpResult<u32> {
    wait_for_register(tx, reg, bits, bits, timeout, what)
}

/**
    Fixed number of polls spaced `interval` apart, for registers the
    programming guide bounds by count rather than time.
*/
pub fn poll_register_n(
    tx: &dyn Transmitter,
    reg: Register,
    bits: u32,
    polls: u32,
    interval: Duration,
    what: &'static str,
) -> HdcpResult<u32> {
    for attempt in 0..polls.max(1) {
        let value = tx.read(reg);
        if value & bits == bits {
            return Ok(value);
        }
        if attempt + 1 < polls {
            thread::sleep(interval);
        }
    }
    Err(HdcpError::Timeout(what))
}
