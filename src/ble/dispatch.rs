//! Write path used by device drivers.

use crate::ble::central::Central;
use crate::ble::link::LinkState;
use crate::ble::registry::DeviceHandle;
use crate::ble::BleHost;
use crate::error::WriteError;

impl<H: BleHost> Central<H> {
    /// Queue a write of `payload` to the resolved characteristic of `handle`.
    ///
    /// Exactly one host write is issued when the device is ready; nothing
    /// is sent otherwise.  Completion is only logged.
    pub fn write(&mut self, handle: DeviceHandle, payload: &[u8]) -> Result<(), WriteError> {
        let link = self
            .registry()
            .lookup(handle)
            .ok_or(WriteError::UnknownDevice)?
            .link();

        let (conn, chr) = match (link.state(), link.conn(), link.characteristic()) {
            (LinkState::Ready, Some(conn), Some(chr)) => (conn, chr),
            (state, _, _) => {
                warn!("Write to {} rejected: link is {}", handle, state);
                return Err(WriteError::NotConnected);
            }
        };

        trace!(
            "Writing {} bytes to conn_handle={} attr_handle={}",
            payload.len(),
            conn,
            chr.value_handle
        );
        self.host_mut()
            .write(conn, chr.value_handle, payload)
            .map_err(|e| {
                error!("Error writing characteristic; {}", e);
                WriteError::Host(e)
            })
    }
}
