// Licensed under the Apache-2.0 license

//! Transfer dispatcher: the read and write paths of a session.
//!
//! The session configuration selects one of four transfer variants:
//!
//! | path  | flag clear  | flag set, configured        | flag set, unconfigured |
//! |-------|-------------|-----------------------------|------------------------|
//! | read  | plain read  | register repeated-start read | `InvalidState`        |
//! | write | plain write | command write-then-read      | `InvalidState`        |
//!
//! Entry points are callable from the real-time context. When the bus says
//! a transfer does not fit that context, the call returns
//! [`Completion::Redispatch`] before touching any buffer, the bus or caller
//! memory, and the caller re-issues it from the non-real-time context.

use crate::common::Logger;
use crate::i2c::common::{BusStatus, TransferFlags, TransferKind, BUFFER_SIZE_MAX};
use crate::i2c::error::SessionError;
use crate::i2c::session::Session;
use crate::i2c::traits::{CallerMemory, I2cBusController};

/// Context an operation is invoked from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Strictly bounded-time context.
    RealTime,
    /// Regular context, may take as long as the bus needs.
    NonRealTime,
}

impl ExecutionContext {
    #[must_use]
    pub const fn is_real_time(self) -> bool {
        matches!(self, Self::RealTime)
    }
}

/// Result of an operation that may have to move to the other context.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Completion<T> {
    /// The operation ran to completion.
    Done(T),
    /// Nothing was done; re-issue the call from the non-real-time context.
    Redispatch,
}

impl<T> Completion<T> {
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Redispatch => None,
        }
    }

    #[must_use]
    pub const fn is_redispatch(&self) -> bool {
        matches!(self, Self::Redispatch)
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Completion<U> {
        match self {
            Self::Done(value) => Completion::Done(f(value)),
            Self::Redispatch => Completion::Redispatch,
        }
    }
}

/// Whether the bus still holds a session's address and clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BusState {
    Current,
    /// Another session programmed the bus since; push everything again.
    Stale,
}

impl Session {
    /// Read up to `size` bytes into the caller's memory.
    ///
    /// Requests above [`BUFFER_SIZE_MAX`] are clamped silently. Returns the
    /// number of bytes delivered.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if repeated-start reads are enabled without a
    ///   register address
    /// - `Bus` if reconfiguration or the transfer fails
    /// - `IoCopyFailure` if the data cannot be delivered
    pub fn read<B, L, M>(
        &mut self,
        bus: &mut B,
        logger: &mut L,
        context: ExecutionContext,
        caller: &mut M,
        size: usize,
    ) -> Result<Completion<usize>, SessionError>
    where
        B: I2cBusController,
        L: Logger,
        M: CallerMemory,
    {
        self.read_on(bus, logger, context, caller, size, BusState::Current)
    }

    pub(crate) fn read_on<B, L, M>(
        &mut self,
        bus: &mut B,
        logger: &mut L,
        context: ExecutionContext,
        caller: &mut M,
        size: usize,
        state: BusState,
    ) -> Result<Completion<usize>, SessionError>
    where
        B: I2cBusController,
        L: Logger,
        M: CallerMemory,
    {
        let len = size.min(BUFFER_SIZE_MAX);
        let register = if self.config.flags().contains(TransferFlags::READ_REPEATED_START) {
            let Some(register) = self.config.register_address() else {
                logger.error(format_args!("repeated start read without register address"));
                return Err(SessionError::InvalidState);
            };
            Some(register)
        } else {
            None
        };
        let kind = match register {
            Some(_) => TransferKind::RegisterRead,
            None => TransferKind::PlainRead,
        };
        if context.is_real_time() && !bus.bounded_time(kind, len) {
            return Ok(Completion::Redispatch);
        }

        self.config.trace(logger, format_args!("READ_SIZE ({size})"));
        self.reconfigure(bus, logger, state)?;

        self.receive.clear();
        self.receive
            .resize(len, 0)
            .map_err(|()| SessionError::InvalidArgument)?;
        let result = match register {
            Some(register) => bus.read_register_rs(register, &mut self.receive),
            None => bus.read(&mut self.receive),
        };
        let status = BusStatus::from_result(&result);
        self.config
            .trace(logger, format_args!("READ_RETURN_CODE ({status})"));
        if !status.is_ok() {
            self.receive.clear();
            logger.error(format_args!("read failed ({status})"));
            return Err(SessionError::Bus(status));
        }
        if self.config.tracing() {
            for byte in &self.receive {
                logger.debug(format_args!("<<READ ({byte:#04x})"));
            }
        }

        caller.copy_to_caller(&self.receive).map_err(|e| {
            logger.error(format_args!("can't copy data from driver to caller"));
            SessionError::from(e)
        })?;
        Ok(Completion::Done(self.receive.len()))
    }

    /// Write `size` bytes taken from the caller's memory.
    ///
    /// With repeated-start writes enabled the stored command sequence is
    /// written instead and `size` bytes are read back into the caller's
    /// memory.
    ///
    /// Returns the bus status of the transaction; a NACK on a plain write is
    /// reported as a status, not as an error.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `size` exceeds [`BUFFER_SIZE_MAX`]
    /// - `InvalidState` if repeated-start writes are enabled without a
    ///   command sequence
    /// - `IoCopyFailure` if caller memory cannot be read or written
    /// - `Bus` if reconfiguration fails
    pub fn write<B, L, M>(
        &mut self,
        bus: &mut B,
        logger: &mut L,
        context: ExecutionContext,
        caller: &mut M,
        size: usize,
    ) -> Result<Completion<BusStatus>, SessionError>
    where
        B: I2cBusController,
        L: Logger,
        M: CallerMemory,
    {
        self.write_on(bus, logger, context, caller, size, BusState::Current)
    }

    pub(crate) fn write_on<B, L, M>(
        &mut self,
        bus: &mut B,
        logger: &mut L,
        context: ExecutionContext,
        caller: &mut M,
        size: usize,
        state: BusState,
    ) -> Result<Completion<BusStatus>, SessionError>
    where
        B: I2cBusController,
        L: Logger,
        M: CallerMemory,
    {
        if size > BUFFER_SIZE_MAX {
            logger.error(format_args!(
                "trying to transmit {size} bytes, larger than buffer size"
            ));
            return Err(SessionError::InvalidArgument);
        }
        let kind = if self.config.flags().contains(TransferFlags::WRITE_REPEATED_START) {
            if self.config.command_phase().is_none() {
                logger.error(format_args!("repeated start write without command sequence"));
                return Err(SessionError::InvalidState);
            }
            TransferKind::WriteRead
        } else {
            TransferKind::PlainWrite
        };
        if context.is_real_time() && !bus.bounded_time(kind, size) {
            return Ok(Completion::Redispatch);
        }

        self.config.trace(logger, format_args!("WRITE_SIZE ({size})"));
        self.transmit.clear();
        self.transmit
            .resize(size, 0)
            .map_err(|()| SessionError::InvalidArgument)?;
        if let Err(e) = caller.copy_from_caller(&mut self.transmit) {
            self.transmit.clear();
            logger.error(format_args!("can't copy data from caller to driver"));
            return Err(e.into());
        }
        self.reconfigure(bus, logger, state)?;
        if self.config.tracing() {
            for byte in &self.transmit {
                logger.debug(format_args!(">>WRITE ({byte:#04x})"));
            }
        }

        let status = match (kind, self.config.command_phase()) {
            (TransferKind::WriteRead, Some(commands)) => {
                let status =
                    BusStatus::from_result(&bus.write_read_rs(commands, &mut self.transmit));
                self.config
                    .trace(logger, format_args!("WRITE_RETURN_CODE ({status})"));
                if status.is_ok() {
                    caller.copy_to_caller(&self.transmit).map_err(|e| {
                        logger.error(format_args!("can't copy data from driver to caller"));
                        SessionError::from(e)
                    })?;
                }
                status
            }
            _ => {
                let status = BusStatus::from_result(&bus.write(&self.transmit));
                self.config
                    .trace(logger, format_args!("WRITE_RETURN_CODE ({status})"));
                status
            }
        };
        Ok(Completion::Done(status))
    }

    /// Push address and clock to the bus when the session asks for it or
    /// the bus holds another session's settings.
    fn reconfigure<B, L>(
        &self,
        bus: &mut B,
        logger: &mut L,
        state: BusState,
    ) -> Result<(), SessionError>
    where
        B: I2cBusController,
        L: Logger,
    {
        if state == BusState::Current
            && !self
                .config
                .flags()
                .contains(TransferFlags::RECONFIGURE_EACH_TRANSFER)
        {
            return Ok(());
        }
        let mut result = match self.config.slave_address() {
            Some(address) => bus.set_slave_address(address),
            None => Ok(()),
        };
        if result.is_ok() {
            result = match (self.config.clock_divider(), self.config.baudrate()) {
                (Some(divider), _) => bus.set_clock_divider(divider),
                (None, Some(rate)) => bus.set_baudrate(rate),
                (None, None) => Ok(()),
            };
        }
        result.map_err(|e| {
            let status = BusStatus::from_error(&e);
            logger.error(format_args!("reconfiguration failed ({status})"));
            SessionError::Bus(status)
        })
    }
}
