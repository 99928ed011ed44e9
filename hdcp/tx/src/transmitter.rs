use crate::error::HdcpResult;
use crate::regs::{Port, Register};

/**
    How a platform gets its HDCP device keys into the display engine.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLoadMode {
    /// Hardware loads the keys when the display comes out of reset.
    AtReset,
    /// Software asks the power controller firmware to load them.
    ControlPlane,
    /// Software writes the load trigger to the key configuration register.
    Register,
}

/**
    Register-level access to one port's HDCP transmitter block.

    Implementations talk to real hardware (MMIO) or a model of it. Reads and
    writes never fail; waiting on a bit is done by the engine with bounded
    polls (see [`crate::wait`]).
*/
pub trait Transmitter: Send {
    /**
        Port this handle addresses.
    */
    fn port(&self) -> Port;

    fn read(&self, reg: Register) -> u32;

    fn write(&mut self, reg: Register, value: u32);

    fn key_load_mode(&self) -> KeyLoadMode;

    /**
        Whether the power well feeding the key loader is up.
    */
    fn key_loadable(&self) -> bool;

    /**
        Ask platform firmware to load the keys. Only called in
        [`KeyLoadMode::ControlPlane`].
    */
    fn control_plane_load_keys(&mut self) -> HdcpResult<()>;
}
