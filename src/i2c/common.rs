// Licensed under the Apache-2.0 license

//! Common types and constants for the I2C session driver.
//!
//! This module provides the value types shared by configuration, transfer
//! dispatch and the bus abstraction: clock selection, behaviour flags,
//! bus status codes and device bring-up options.

use core::fmt;
use embedded_hal::i2c::ErrorKind;
use fugit::HertzU32;

/// Maximum size of the transmit and receive buffers of a session.
pub const BUFFER_SIZE_MAX: usize = 1024;

/// Largest accepted command sequence size (strictly below the buffer size).
pub const COMMAND_SEQUENCE_MAX: usize = BUFFER_SIZE_MAX - 1;

/// Bounded byte buffer owned by a session.
pub type TransferBuffer = heapless::Vec<u8, BUFFER_SIZE_MAX>;

/// Owned copy of a command sequence used as the write phase of a
/// write-then-read transfer.
pub type CommandSequence = heapless::Vec<u8, COMMAND_SEQUENCE_MAX>;

/// Clock dividers accepted by the BSC controller.
///
/// Divides the 250 MHz core clock; the discriminant is the raw divider.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClockDivider {
    /// 100 kHz
    Div2500 = 2500,
    /// 399.3610 kHz
    Div626 = 626,
    /// 1.666 MHz
    Div150 = 150,
    /// 1.689 MHz
    Div148 = 148,
}

impl ClockDivider {
    /// Divider programmed at bring-up and seeded into every new session.
    pub const DEFAULT: Self = Self::Div626;

    #[must_use]
    pub const fn raw(self) -> u16 {
        self as u16
    }
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i32> for ClockDivider {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            2500 => Ok(Self::Div2500),
            626 => Ok(Self::Div626),
            150 => Ok(Self::Div150),
            148 => Ok(Self::Div148),
            other => Err(other),
        }
    }
}

/// Bus clock selection.
///
/// Baudrate and divider are alternatives: holding exactly one of them makes
/// "both set" unrepresentable, and the last one written wins.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusSpeed {
    Divider(ClockDivider),
    Baudrate(HertzU32),
}

impl BusSpeed {
    #[must_use]
    pub const fn clock_divider(self) -> Option<ClockDivider> {
        match self {
            Self::Divider(divider) => Some(divider),
            Self::Baudrate(_) => None,
        }
    }

    #[must_use]
    pub const fn baudrate(self) -> Option<HertzU32> {
        match self {
            Self::Divider(_) => None,
            Self::Baudrate(rate) => Some(rate),
        }
    }
}

impl Default for BusSpeed {
    fn default() -> Self {
        Self::Divider(ClockDivider::DEFAULT)
    }
}

bitflags::bitflags! {
    /// Per-session behaviour switches.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TransferFlags: u8 {
        /// Reads use the register-addressed repeated-start variant.
        const READ_REPEATED_START = 1 << 0;
        /// Writes use the command-sequence write-then-read variant.
        const WRITE_REPEATED_START = 1 << 1;
        /// Trace configuration changes and transferred bytes.
        const DEBUG_TRACE = 1 << 2;
        /// Push address and clock to the bus before every transfer.
        const RECONFIGURE_EACH_TRANSFER = 1 << 3;
    }
}

impl TransferFlags {
    /// Flags seeded from the open-time flags of a device handle. Bits
    /// outside the four defined switches are ignored.
    #[must_use]
    pub fn from_open_flags(open_flags: u32) -> Self {
        Self::from_bits_truncate((open_flags & u32::from(Self::all().bits())) as u8)
    }
}

/// Transfer variants the bus abstraction is asked to perform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferKind {
    PlainRead,
    RegisterRead,
    PlainWrite,
    WriteRead,
}

/// Outcome reason code of a bus transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BusStatus {
    /// Transfer completed.
    Ok = 0x00,
    /// Slave did not acknowledge the address or a data byte.
    Nack = 0x01,
    /// Bus level fault, including clock stretch timeouts.
    BusFault = 0x02,
    /// Not all data was transferred (overrun, lost arbitration, other).
    Data = 0x04,
}

impl BusStatus {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Classify a bus abstraction error.
    #[must_use]
    pub fn from_error<E: embedded_hal::i2c::Error>(error: &E) -> Self {
        match error.kind() {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            ErrorKind::Bus => Self::BusFault,
            _ => Self::Data,
        }
    }

    #[must_use]
    pub fn from_result<E: embedded_hal::i2c::Error>(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(error) => Self::from_error(error),
        }
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.code())
    }
}

/// Device-level bring-up options.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Divider pushed to the bus at bring-up and seeded into new sessions.
    pub default_divider: ClockDivider,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptionsBuilder::new().build()
    }
}

pub struct DeviceOptionsBuilder {
    default_divider: ClockDivider,
}

impl Default for DeviceOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_divider: ClockDivider::DEFAULT,
        }
    }
    #[must_use]
    pub fn default_divider(mut self, divider: ClockDivider) -> Self {
        self.default_divider = divider;
        self
    }
    #[must_use]
    pub fn build(self) -> DeviceOptions {
        DeviceOptions {
            default_divider: self.default_divider,
        }
    }
}
