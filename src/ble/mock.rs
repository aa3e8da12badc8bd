//! Recording host used by the unit tests.

use std::string::String;
use std::vec::Vec;

use crate::ble::{BleHost, ConnHandle, DeviceHandle, DiscoveryParams, PeerAddress, ServiceRange};
use crate::error::HostError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Init(String),
    EnsureAddress,
    StartDiscovery(DiscoveryParams),
    CancelDiscovery,
    Connect {
        device: DeviceHandle,
        peer: PeerAddress,
        timeout_ms: u32,
    },
    DiscoverService {
        device: DeviceHandle,
        conn: ConnHandle,
        uuid: u16,
    },
    DiscoverCharacteristic {
        device: DeviceHandle,
        conn: ConnHandle,
        range: ServiceRange,
        uuid: u16,
    },
    Write {
        conn: ConnHandle,
        value_handle: u16,
        payload: Vec<u8>,
    },
    Terminate(ConnHandle),
    ForgetPeer(ConnHandle),
}

/// Records every command; individual commands can be made to fail.
#[derive(Default)]
pub struct MockHost {
    pub commands: Vec<Command>,
    pub fail_cancel: Option<i32>,
    pub fail_connect: Option<i32>,
    pub fail_discovery: Option<i32>,
    pub fail_write: Option<i32>,
}

impl MockHost {
    pub fn take(&mut self) -> Vec<Command> {
        core::mem::take(&mut self.commands)
    }

    pub fn writes(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Write { .. }))
            .count()
    }
}

fn outcome(fail: Option<i32>) -> Result<(), HostError> {
    match fail {
        Some(rc) => Err(HostError(rc)),
        None => Ok(()),
    }
}

impl BleHost for MockHost {
    fn init(&mut self, device_name: &str) -> Result<(), HostError> {
        self.commands.push(Command::Init(device_name.into()));
        Ok(())
    }

    fn ensure_address(&mut self) -> Result<(), HostError> {
        self.commands.push(Command::EnsureAddress);
        Ok(())
    }

    fn start_discovery(&mut self, params: &DiscoveryParams) -> Result<(), HostError> {
        self.commands.push(Command::StartDiscovery(*params));
        outcome(self.fail_discovery)
    }

    fn cancel_discovery(&mut self) -> Result<(), HostError> {
        self.commands.push(Command::CancelDiscovery);
        outcome(self.fail_cancel)
    }

    fn connect(
        &mut self,
        device: DeviceHandle,
        peer: &PeerAddress,
        timeout_ms: u32,
    ) -> Result<(), HostError> {
        self.commands.push(Command::Connect {
            device,
            peer: *peer,
            timeout_ms,
        });
        outcome(self.fail_connect)
    }

    fn discover_service(
        &mut self,
        device: DeviceHandle,
        conn: ConnHandle,
        uuid: u16,
    ) -> Result<(), HostError> {
        self.commands
            .push(Command::DiscoverService { device, conn, uuid });
        Ok(())
    }

    fn discover_characteristic(
        &mut self,
        device: DeviceHandle,
        conn: ConnHandle,
        range: ServiceRange,
        uuid: u16,
    ) -> Result<(), HostError> {
        self.commands.push(Command::DiscoverCharacteristic {
            device,
            conn,
            range,
            uuid,
        });
        Ok(())
    }

    fn write(
        &mut self,
        conn: ConnHandle,
        value_handle: u16,
        payload: &[u8],
    ) -> Result<(), HostError> {
        self.commands.push(Command::Write {
            conn,
            value_handle,
            payload: payload.to_vec(),
        });
        outcome(self.fail_write)
    }

    fn terminate(&mut self, conn: ConnHandle) -> Result<(), HostError> {
        self.commands.push(Command::Terminate(conn));
        Ok(())
    }

    fn forget_peer(&mut self, conn: ConnHandle) -> Result<(), HostError> {
        self.commands.push(Command::ForgetPeer(conn));
        Ok(())
    }
}
