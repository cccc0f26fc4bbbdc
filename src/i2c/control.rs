// Licensed under the Apache-2.0 license

//! Control requests: the numbered configuration operations a caller issues
//! on an open handle, and their decoding from caller memory.
//!
//! Arguments are fetched through [`CallerMemory`] and decoded in native byte
//! order with `zerocopy`:
//!
//! | code | request | argument |
//! |------|---------|----------|
//! | 0 | set slave address | `u8` |
//! | 1 | set register address | `i8` |
//! | 2 | set baudrate | `i32` |
//! | 3 | set clock divider | `i32` |
//! | 4 | set command sequence | `command_sequence_size` bytes |
//! | 5 | set command sequence size | `u16` |
//! | 6 | set flags | `u8` |

use crate::common::Logger;
use crate::i2c::common::{CommandSequence, TransferFlags};
use crate::i2c::config::SessionConfig;
use crate::i2c::error::SessionError;
use crate::i2c::traits::{CallerMemory, I2cBusController};
use zerocopy::FromBytes;

/// Raw control request numbers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestCode {
    SetSlaveAddress = 0,
    SetRegisterAddress = 1,
    SetBaudrate = 2,
    SetClockDivider = 3,
    SetCommandSequence = 4,
    SetCommandSequenceSize = 5,
    SetFlags = 6,
}

impl RequestCode {
    /// Whether applying the request programs the bus.
    #[must_use]
    pub const fn touches_bus(self) -> bool {
        matches!(self, Self::SetSlaveAddress | Self::SetBaudrate | Self::SetClockDivider)
    }
}

impl TryFrom<u32> for RequestCode {
    type Error = SessionError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::SetSlaveAddress),
            1 => Ok(Self::SetRegisterAddress),
            2 => Ok(Self::SetBaudrate),
            3 => Ok(Self::SetClockDivider),
            4 => Ok(Self::SetCommandSequence),
            5 => Ok(Self::SetCommandSequenceSize),
            6 => Ok(Self::SetFlags),
            _ => Err(SessionError::UnsupportedRequest),
        }
    }
}

/// A decoded control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    SetSlaveAddress(u8),
    SetRegisterAddress(i8),
    SetBaudrate(i32),
    SetClockDivider(i32),
    SetCommandSequence(CommandSequence),
    SetCommandSequenceSize(u16),
    SetFlags(TransferFlags),
}

impl ControlRequest {
    #[must_use]
    pub fn code(&self) -> RequestCode {
        match self {
            Self::SetSlaveAddress(_) => RequestCode::SetSlaveAddress,
            Self::SetRegisterAddress(_) => RequestCode::SetRegisterAddress,
            Self::SetBaudrate(_) => RequestCode::SetBaudrate,
            Self::SetClockDivider(_) => RequestCode::SetClockDivider,
            Self::SetCommandSequence(_) => RequestCode::SetCommandSequence,
            Self::SetCommandSequenceSize(_) => RequestCode::SetCommandSequenceSize,
            Self::SetFlags(_) => RequestCode::SetFlags,
        }
    }

    /// Decode request `code`, pulling its argument from `arg`.
    ///
    /// The command sequence is copied in with the size declared in
    /// `config`; nothing is copied if no size was declared.
    ///
    /// # Errors
    ///
    /// - `UnsupportedRequest` for an unknown code (no copy attempted)
    /// - `IoCopyFailure` if the argument cannot be fetched
    /// - `InvalidArgument` for flag bits outside the defined switches, or a
    ///   command sequence without a declared size
    pub fn decode<M, L>(
        code: u32,
        arg: &mut M,
        config: &SessionConfig,
        logger: &mut L,
    ) -> Result<Self, SessionError>
    where
        M: CallerMemory,
        L: Logger,
    {
        let code = RequestCode::try_from(code).map_err(|e| {
            logger.error(format_args!("unexpected request: {code}"));
            e
        })?;

        let request = match code {
            RequestCode::SetSlaveAddress => {
                Self::SetSlaveAddress(fetch::<u8, 1, _, _>(arg, logger)?)
            }
            RequestCode::SetRegisterAddress => {
                Self::SetRegisterAddress(fetch::<i8, 1, _, _>(arg, logger)?)
            }
            RequestCode::SetBaudrate => Self::SetBaudrate(fetch::<i32, 4, _, _>(arg, logger)?),
            RequestCode::SetClockDivider => {
                Self::SetClockDivider(fetch::<i32, 4, _, _>(arg, logger)?)
            }
            RequestCode::SetCommandSequenceSize => {
                Self::SetCommandSequenceSize(fetch::<u16, 2, _, _>(arg, logger)?)
            }
            RequestCode::SetFlags => {
                let raw = fetch::<u8, 1, _, _>(arg, logger)?;
                let flags = TransferFlags::from_bits(raw).ok_or_else(|| {
                    logger.error(format_args!("unexpected flags: {raw}"));
                    SessionError::InvalidArgument
                })?;
                Self::SetFlags(flags)
            }
            RequestCode::SetCommandSequence => {
                let size = usize::from(config.command_sequence_size());
                if size == 0 {
                    logger.error(format_args!("set the command sequence size first"));
                    return Err(SessionError::InvalidArgument);
                }
                let mut sequence = CommandSequence::new();
                sequence
                    .resize(size, 0)
                    .map_err(|()| SessionError::InvalidArgument)?;
                arg.copy_from_caller(&mut sequence).map_err(|e| {
                    logger.error(format_args!("can't retrieve command sequence from caller"));
                    SessionError::from(e)
                })?;
                Self::SetCommandSequence(sequence)
            }
        };
        Ok(request)
    }

    /// Run the matching setter on `config`.
    ///
    /// # Errors
    ///
    /// Whatever the setter reports; `config` is unchanged on error.
    pub fn apply<B, L>(
        &self,
        config: &mut SessionConfig,
        bus: &mut B,
        logger: &mut L,
    ) -> Result<(), SessionError>
    where
        B: I2cBusController,
        L: Logger,
    {
        match self {
            Self::SetSlaveAddress(address) => config.set_slave_address(*address, bus, logger),
            Self::SetRegisterAddress(register) => config.set_register_address(*register, logger),
            Self::SetBaudrate(rate) => config.set_baudrate(*rate, bus, logger),
            Self::SetClockDivider(divider) => config.set_clock_divider(*divider, bus, logger),
            Self::SetCommandSequence(sequence) => config.set_command_sequence(sequence, logger),
            Self::SetCommandSequenceSize(size) => config.set_command_sequence_size(*size, logger),
            Self::SetFlags(flags) => config.set_flags(*flags, logger),
        }
    }
}

fn fetch<T, const N: usize, M, L>(arg: &mut M, logger: &mut L) -> Result<T, SessionError>
where
    T: FromBytes,
    M: CallerMemory,
    L: Logger,
{
    let mut raw = [0u8; N];
    arg.copy_from_caller(&mut raw).map_err(|e| {
        logger.error(format_args!("can't retrieve argument from caller"));
        SessionError::from(e)
    })?;
    T::read_from_bytes(&raw).map_err(|_| SessionError::InvalidArgument)
}
