//! Unified error types for the gateway.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging, and `Display` for hosted logging.

use core::fmt;

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A device descriptor was rejected.
    Registration(RegistrationError),

    /// A write could not be issued.
    Write(WriteError),

    /// The protocol host refused a command (bring-up, scan, connect...).
    Host(HostError),
}

/// Raw status code returned by the protocol host when it refuses a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostError(pub i32);

/// Reasons a device descriptor cannot be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError {
    /// Every slot of the registry is taken.
    CapacityExhausted,
    /// The advertisement name prefix is empty.
    EmptyPrefix,
}

/// Errors returned synchronously by `Gateway::write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError {
    /// The device has no resolved, live link.
    NotConnected,
    /// The handle does not name a registered device.
    UnknownDevice,
    /// The host would not queue the write.
    Host(HostError),
}

/// Why a connection attempt (or an established link) ended.
///
/// These never reach a caller directly: they are logged and kept as the
/// device's `last_failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkFailure {
    /// The running scan could not be stopped, so no connect was issued.
    ScanCancelFailed(HostError),
    /// The link could not be established (host status).
    ConnectFailed(i32),
    /// Service or characteristic discovery ended with this GATT status.
    DiscoveryFailed(u16),
    /// The link dropped (host disconnect reason).
    LinkLost(i32),
    /// The host would not start the next step of the attempt.
    CommandRefused(HostError),
}

// Convenience conversions

impl From<RegistrationError> for Error {
    fn from(e: RegistrationError) -> Self {
        Error::Registration(e)
    }
}

impl From<WriteError> for Error {
    fn from(e: WriteError) -> Self {
        Error::Write(e)
    }
}

impl From<HostError> for Error {
    fn from(e: HostError) -> Self {
        Error::Host(e)
    }
}

impl From<HostError> for WriteError {
    fn from(e: HostError) -> Self {
        WriteError::Host(e)
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host rc={}", self.0)
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::CapacityExhausted => f.write_str("device registry is full"),
            RegistrationError::EmptyPrefix => f.write_str("advertisement name prefix is empty"),
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::NotConnected => f.write_str("device is not connected"),
            WriteError::UnknownDevice => f.write_str("unknown device handle"),
            WriteError::Host(e) => write!(f, "write refused ({})", e),
        }
    }
}

impl fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkFailure::ScanCancelFailed(e) => write!(f, "scan cancel failed ({})", e),
            LinkFailure::ConnectFailed(status) => write!(f, "connect failed; status={}", status),
            LinkFailure::DiscoveryFailed(status) => {
                write!(f, "discovery failed; status={}", status)
            }
            LinkFailure::LinkLost(reason) => write!(f, "link lost; reason={}", reason),
            LinkFailure::CommandRefused(e) => write!(f, "command refused ({})", e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Registration(e) => write!(f, "registration failed: {}", e),
            Error::Write(e) => write!(f, "write failed: {}", e),
            Error::Host(e) => write!(f, "host command failed: {}", e),
        }
    }
}
