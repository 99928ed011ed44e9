use hdcp_core::{An, Bstatus, Ksv, Ri};

use crate::error::HdcpResult;

/**
    Receiver-side I/O over the link's sideband channel (HDMI DDC, DisplayPort AUX).

    One implementation per physical interface, chosen when the connector is
    created. Errors are passed through by the engine unchanged.
*/
pub trait Shim: Send {
    /**
        DisplayPort exposes an HDCP capability bit that must be checked
        before An is written. `Ok(None)` means the interface has no such query.
    */
    fn hdcp_capable(&mut self) -> HdcpResult<Option<bool>> {
        Ok(None)
    }

    /**
        Send An to the receiver and have the transmitter's Aksv follow it.
    */
    fn write_an_aksv(&mut self, an: An) -> HdcpResult<()>;

    fn read_bksv(&mut self) -> HdcpResult<Ksv>;

    fn read_bstatus(&mut self) -> HdcpResult<Bstatus>;

    fn repeater_present(&mut self) -> HdcpResult<bool>;

    fn read_ri_prime(&mut self) -> HdcpResult<Ri>;

    fn read_ksv_ready(&mut self) -> HdcpResult<bool>;

    /**
        Fill `ksvs` from the repeater's KSV FIFO, in FIFO order.
    */
    fn read_ksv_fifo(&mut self, ksvs: &mut [Ksv]) -> HdcpResult<()>;

    /**
        One 32-bit part (0..5) of the repeater's V′ hash.
    */
    fn read_v_prime_part(&mut self, index: usize) -> HdcpResult<u32>;

    /**
        Turn HDCP signalling on the link on or off.
    */
    fn toggle_signalling(&mut self, enable: bool) -> HdcpResult<()>;

    /**
        Interface-specific link integrity check (Ri′ comparison on HDMI,
        link status on DisplayPort).
    */
    fn check_link(&mut self) -> bool;
}
