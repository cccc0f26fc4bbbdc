// Licensed under the Apache-2.0 license

//! # Collaborator Traits
//!
//! The session driver sits between a caller holding an open device handle
//! and a lower-level I2C bus controller. It reaches both through the traits
//! defined here:
//!
//! - [`I2cBusController`]: issues the actual I2C transactions (slave
//!   address, clock, plain and repeated-start transfers).
//! - [`CallerMemory`]: the host framework's fallible copy primitive between
//!   caller-owned memory and driver buffers.
//!
//! ```text
//! caller ──► SessionManager ──► Session ──► I2cBusController
//!                 ▲                 │
//!                 └── CallerMemory ◄┘
//! ```
//!
//! The bus is a single physical resource. The session manager owns the bus
//! value, so every transaction goes through one `&mut` borrow and access is
//! serialized by construction.

use crate::i2c::common::{ClockDivider, TransferKind};
use fugit::HertzU32;

/// Lower-level I2C bus controller.
///
/// All operations are synchronous and must complete in bounded time. The
/// slave address used by the transfer methods is the one last programmed
/// with [`set_slave_address`](Self::set_slave_address).
///
/// # Examples
///
/// ```rust,ignore
/// use i2c_session_ddk::i2c::I2cBusController;
///
/// fn read_id<B: I2cBusController>(bus: &mut B) -> Result<[u8; 2], B::Error> {
///     let mut id = [0u8; 2];
///     bus.set_slave_address(0x50)?;
///     bus.read_register_rs(0x0f, &mut id)?;
///     Ok(id)
/// }
/// ```
pub trait I2cBusController {
    /// Hardware-specific error type that implements embedded-hal error traits
    type Error: embedded_hal::i2c::Error + core::fmt::Debug;

    /// Claim the bus pins and enable the controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot be brought up.
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Release the bus pins.
    fn end(&mut self);

    /// Program the slave address used by subsequent transfers.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller rejects the address.
    fn set_slave_address(&mut self, address: u8) -> Result<(), Self::Error>;

    /// Select the bus clock by divider.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot apply the divider.
    fn set_clock_divider(&mut self, divider: ClockDivider) -> Result<(), Self::Error>;

    /// Select the bus clock by rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate cannot be derived from the core clock.
    fn set_baudrate(&mut self, rate: HertzU32) -> Result<(), Self::Error>;

    /// Plain read filling `buffer`.
    ///
    /// # Errors
    ///
    /// Returns an error on NACK, bus fault or short transfer.
    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `register`, then read into `buffer` after a repeated start.
    ///
    /// # Errors
    ///
    /// Returns an error on NACK, bus fault or short transfer in either phase.
    fn read_register_rs(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Plain write of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error on NACK, bus fault or short transfer.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Write `commands`, then read into `buffer` after a repeated start.
    ///
    /// # Errors
    ///
    /// Returns an error on NACK, bus fault or short transfer in either phase.
    fn write_read_rs(&mut self, commands: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Whether a transfer of `len` bytes completes within the guarantees of
    /// the real-time context.
    ///
    /// Returning `false` makes the session ask its caller to re-issue the
    /// request from the non-real-time context.
    fn bounded_time(&self, _kind: TransferKind, _len: usize) -> bool {
        true
    }
}

impl<B: I2cBusController + ?Sized> I2cBusController for &mut B {
    type Error = B::Error;

    fn begin(&mut self) -> Result<(), Self::Error> {
        (**self).begin()
    }

    fn end(&mut self) {
        (**self).end();
    }

    fn set_slave_address(&mut self, address: u8) -> Result<(), Self::Error> {
        (**self).set_slave_address(address)
    }

    fn set_clock_divider(&mut self, divider: ClockDivider) -> Result<(), Self::Error> {
        (**self).set_clock_divider(divider)
    }

    fn set_baudrate(&mut self, rate: HertzU32) -> Result<(), Self::Error> {
        (**self).set_baudrate(rate)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read(buffer)
    }

    fn read_register_rs(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read_register_rs(register, buffer)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write(bytes)
    }

    fn write_read_rs(&mut self, commands: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        (**self).write_read_rs(commands, buffer)
    }

    fn bounded_time(&self, kind: TransferKind, len: usize) -> bool {
        (**self).bounded_time(kind, len)
    }
}

/// A copy between caller memory and driver memory failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CopyFault;

/// Fallible access to memory owned by the caller of a device handle.
///
/// Mirrors the host framework's safe user-copy primitives: each call copies
/// the whole requested range or fails without a usable partial result.
pub trait CallerMemory {
    /// Fill `dest` from the start of the caller's memory.
    ///
    /// # Errors
    ///
    /// Returns [`CopyFault`] if the caller's memory cannot supply
    /// `dest.len()` bytes.
    fn copy_from_caller(&mut self, dest: &mut [u8]) -> Result<(), CopyFault>;

    /// Store `src` at the start of the caller's memory.
    ///
    /// # Errors
    ///
    /// Returns [`CopyFault`] if the caller's memory cannot take
    /// `src.len()` bytes or is not writable.
    fn copy_to_caller(&mut self, src: &[u8]) -> Result<(), CopyFault>;
}

impl<M: CallerMemory + ?Sized> CallerMemory for &mut M {
    fn copy_from_caller(&mut self, dest: &mut [u8]) -> Result<(), CopyFault> {
        (**self).copy_from_caller(dest)
    }

    fn copy_to_caller(&mut self, src: &[u8]) -> Result<(), CopyFault> {
        (**self).copy_to_caller(src)
    }
}

/// Writable caller buffer backed by a slice.
pub struct CallerBuffer<'a> {
    bytes: &'a mut [u8],
}

impl<'a> CallerBuffer<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }
}

impl CallerMemory for CallerBuffer<'_> {
    fn copy_from_caller(&mut self, dest: &mut [u8]) -> Result<(), CopyFault> {
        let src = self.bytes.get(..dest.len()).ok_or(CopyFault)?;
        dest.copy_from_slice(src);
        Ok(())
    }

    fn copy_to_caller(&mut self, src: &[u8]) -> Result<(), CopyFault> {
        let dest = self.bytes.get_mut(..src.len()).ok_or(CopyFault)?;
        dest.copy_from_slice(src);
        Ok(())
    }
}

/// Read-only caller buffer, typically a control request argument.
pub struct CallerBytes<'a> {
    bytes: &'a [u8],
}

impl<'a> CallerBytes<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl CallerMemory for CallerBytes<'_> {
    fn copy_from_caller(&mut self, dest: &mut [u8]) -> Result<(), CopyFault> {
        let src = self.bytes.get(..dest.len()).ok_or(CopyFault)?;
        dest.copy_from_slice(src);
        Ok(())
    }

    fn copy_to_caller(&mut self, _src: &[u8]) -> Result<(), CopyFault> {
        Err(CopyFault)
    }
}
