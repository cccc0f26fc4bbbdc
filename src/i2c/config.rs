// Licensed under the Apache-2.0 license

//! Per-session configuration store and its validated setters.
//!
//! Every setter is atomic: the value is validated first and, for settings
//! the bus has to know about, pushed to the bus before it is stored. A
//! rejected value or a failed push leaves the configuration untouched.

use crate::common::Logger;
use crate::i2c::common::{
    BusSpeed, BusStatus, ClockDivider, CommandSequence, TransferFlags, COMMAND_SEQUENCE_MAX,
};
use crate::i2c::error::SessionError;
use crate::i2c::traits::I2cBusController;
use core::fmt;
use core::num::NonZeroU8;
use fugit::HertzU32;

/// Configuration of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    slave_address: Option<NonZeroU8>,
    register_address: Option<NonZeroU8>,
    command_sequence: Option<CommandSequence>,
    command_sequence_size: u16,
    speed: BusSpeed,
    flags: TransferFlags,
}

impl SessionConfig {
    /// Configuration of a freshly opened handle.
    #[must_use]
    pub fn new(default_divider: ClockDivider, flags: TransferFlags) -> Self {
        Self {
            slave_address: None,
            register_address: None,
            command_sequence: None,
            command_sequence_size: 0,
            speed: BusSpeed::Divider(default_divider),
            flags,
        }
    }

    /// Slave address, `None` until set.
    #[must_use]
    pub fn slave_address(&self) -> Option<u8> {
        self.slave_address.map(NonZeroU8::get)
    }

    /// Register address for repeated-start reads, `None` until set.
    #[must_use]
    pub fn register_address(&self) -> Option<u8> {
        self.register_address.map(NonZeroU8::get)
    }

    #[must_use]
    pub fn command_sequence(&self) -> Option<&[u8]> {
        self.command_sequence.as_deref()
    }

    /// Declared command sequence size, 0 while unset.
    #[must_use]
    pub const fn command_sequence_size(&self) -> u16 {
        self.command_sequence_size
    }

    #[must_use]
    pub const fn speed(&self) -> BusSpeed {
        self.speed
    }

    #[must_use]
    pub const fn baudrate(&self) -> Option<HertzU32> {
        self.speed.baudrate()
    }

    #[must_use]
    pub const fn clock_divider(&self) -> Option<ClockDivider> {
        self.speed.clock_divider()
    }

    #[must_use]
    pub const fn flags(&self) -> TransferFlags {
        self.flags
    }

    #[must_use]
    pub const fn tracing(&self) -> bool {
        self.flags.contains(TransferFlags::DEBUG_TRACE)
    }

    /// Write phase of a write-then-read transfer: the stored sequence cut
    /// to the declared size. `None` if either is missing.
    #[must_use]
    pub fn command_phase(&self) -> Option<&[u8]> {
        if self.command_sequence_size == 0 {
            return None;
        }
        let sequence = self.command_sequence.as_deref()?;
        let len = sequence.len().min(usize::from(self.command_sequence_size));
        sequence.get(..len)
    }

    pub(crate) fn trace<L: Logger>(&self, logger: &mut L, args: fmt::Arguments<'_>) {
        if self.tracing() {
            logger.debug(args);
        }
    }

    /// Store the slave address and program it on the bus.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for address 0, `Bus` if the push fails.
    pub fn set_slave_address<B, L>(
        &mut self,
        address: u8,
        bus: &mut B,
        logger: &mut L,
    ) -> Result<(), SessionError>
    where
        B: I2cBusController,
        L: Logger,
    {
        let Some(address) = NonZeroU8::new(address) else {
            return Err(rejected(logger, "slave address", 0));
        };
        bus.set_slave_address(address.get())
            .map_err(|e| push_failed(logger, "slave address", &e))?;
        self.trace(
            logger,
            format_args!("changing slave address to {:#x}", address.get()),
        );
        self.slave_address = Some(address);
        Ok(())
    }

    /// Store the register address used by repeated-start reads.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `register > 0`.
    pub fn set_register_address<L: Logger>(
        &mut self,
        register: i8,
        logger: &mut L,
    ) -> Result<(), SessionError> {
        let Some(register) = u8::try_from(register).ok().and_then(NonZeroU8::new) else {
            return Err(rejected(logger, "register address", register));
        };
        self.trace(
            logger,
            format_args!("changing slave register address to {:#x}", register.get()),
        );
        self.register_address = Some(register);
        Ok(())
    }

    /// Select the bus clock by rate; clears the divider.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `baudrate > 0`, `Bus` if the push fails.
    pub fn set_baudrate<B, L>(
        &mut self,
        baudrate: i32,
        bus: &mut B,
        logger: &mut L,
    ) -> Result<(), SessionError>
    where
        B: I2cBusController,
        L: Logger,
    {
        let rate = match u32::try_from(baudrate) {
            Ok(raw) if raw > 0 => HertzU32::from_raw(raw),
            _ => return Err(rejected(logger, "baudrate", baudrate)),
        };
        bus.set_baudrate(rate)
            .map_err(|e| push_failed(logger, "baudrate", &e))?;
        self.trace(logger, format_args!("changing baudrate to {}", rate.raw()));
        self.speed = BusSpeed::Baudrate(rate);
        Ok(())
    }

    /// Select the bus clock by divider; clears the baudrate.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless the value is one of 2500, 626, 150, 148;
    /// `Bus` if the push fails.
    pub fn set_clock_divider<B, L>(
        &mut self,
        divider: i32,
        bus: &mut B,
        logger: &mut L,
    ) -> Result<(), SessionError>
    where
        B: I2cBusController,
        L: Logger,
    {
        let divider = ClockDivider::try_from(divider)
            .map_err(|raw| rejected(logger, "clock divider", raw))?;
        bus.set_clock_divider(divider)
            .map_err(|e| push_failed(logger, "clock divider", &e))?;
        self.trace(
            logger,
            format_args!("changing clock divider to {}", divider.raw()),
        );
        self.speed = BusSpeed::Divider(divider);
        Ok(())
    }

    /// Declare the command sequence size. Must precede the content.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `1 <= size <= 1023`.
    pub fn set_command_sequence_size<L: Logger>(
        &mut self,
        size: u16,
        logger: &mut L,
    ) -> Result<(), SessionError> {
        if size == 0 || usize::from(size) > COMMAND_SEQUENCE_MAX {
            return Err(rejected(logger, "command sequence size", size));
        }
        self.trace(logger, format_args!("changing cmds size to {size}"));
        self.command_sequence_size = size;
        Ok(())
    }

    /// Take an owned copy of the command sequence.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the size was never declared, the sequence is
    /// empty, or it is longer than the declared size.
    pub fn set_command_sequence<L: Logger>(
        &mut self,
        sequence: &[u8],
        logger: &mut L,
    ) -> Result<(), SessionError> {
        if self.command_sequence_size == 0 {
            logger.error(format_args!("set the command sequence size first"));
            return Err(SessionError::InvalidArgument);
        }
        let Some(first) = sequence.first() else {
            logger.error(format_args!("empty command sequence"));
            return Err(SessionError::InvalidArgument);
        };
        if sequence.len() > usize::from(self.command_sequence_size) {
            return Err(rejected(logger, "command sequence length", sequence.len()));
        }
        let copy =
            CommandSequence::from_slice(sequence).map_err(|()| SessionError::InvalidArgument)?;
        self.trace(
            logger,
            format_args!("changing cmds to {first:#04x} (first cmds pos)"),
        );
        self.command_sequence = Some(copy);
        Ok(())
    }

    /// Replace the behaviour flags.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for the empty set.
    pub fn set_flags<L: Logger>(
        &mut self,
        flags: TransferFlags,
        logger: &mut L,
    ) -> Result<(), SessionError> {
        if flags.is_empty() {
            return Err(rejected(logger, "flags", flags.bits()));
        }
        self.trace(logger, format_args!("changing flags to {}", flags.bits()));
        self.flags = flags;
        Ok(())
    }
}

fn rejected<L: Logger, V: fmt::Display>(logger: &mut L, what: &str, value: V) -> SessionError {
    logger.error(format_args!("unexpected {what}: {value}"));
    SessionError::InvalidArgument
}

fn push_failed<L: Logger, E: embedded_hal::i2c::Error>(
    logger: &mut L,
    what: &str,
    error: &E,
) -> SessionError {
    let status = BusStatus::from_error(error);
    logger.error(format_args!("bus rejected {what} ({status})"));
    SessionError::Bus(status)
}


#[cfg(test)]
mod tests {
    use super::test_support::{BusCall, MockBus};
    use super::*;
    use crate::common::test_support::RecordingLogger;
    use crate::common::NoOpLogger;
    use proptest::prelude::*;

    fn fresh() -> SessionConfig {
        SessionConfig::new(ClockDivider::DEFAULT, TransferFlags::empty())
    }

    #[test]
    fn test_new_config_defaults() {
        let config = fresh();
        assert_eq!(config.slave_address(), None);
        assert_eq!(config.register_address(), None);
        assert_eq!(config.command_sequence(), None);
        assert_eq!(config.command_sequence_size(), 0);
        assert_eq!(config.clock_divider(), Some(ClockDivider::Div626));
        assert_eq!(config.baudrate(), None);
        assert!(config.flags().is_empty());
    }

    #[test]
    fn test_slave_address_zero_keeps_previous() {
        let mut config = fresh();
        let mut bus = MockBus::default();
        let mut logger = RecordingLogger::default();

        config.set_slave_address(0x50, &mut bus, &mut logger).unwrap();
        assert_eq!(
            config.set_slave_address(0, &mut bus, &mut logger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(config.slave_address(), Some(0x50));
        assert_eq!(bus.calls, vec![BusCall::SlaveAddress(0x50)]);
        assert_eq!(logger.errors.len(), 1);
    }

    #[test]
    fn test_slave_address_push_failure_is_atomic() {
        let mut config = fresh();
        let mut bus = MockBus::default();
        bus.nack_next();

        assert_eq!(
            config.set_slave_address(0x20, &mut bus, &mut NoOpLogger),
            Err(SessionError::Bus(BusStatus::Nack))
        );
        assert_eq!(config.slave_address(), None);
    }

    #[test]
    fn test_register_address_must_be_positive() {
        let mut config = fresh();
        for bad in [0i8, -1, i8::MIN] {
            assert_eq!(
                config.set_register_address(bad, &mut NoOpLogger),
                Err(SessionError::InvalidArgument)
            );
        }
        config.set_register_address(0x0f, &mut NoOpLogger).unwrap();
        assert_eq!(config.register_address(), Some(0x0f));
    }

    #[test]
    fn test_baudrate_and_divider_exclude_each_other() {
        let mut config = fresh();
        let mut bus = MockBus::default();

        config.set_baudrate(100_000, &mut bus, &mut NoOpLogger).unwrap();
        assert_eq!(config.baudrate(), Some(HertzU32::from_raw(100_000)));
        assert_eq!(config.clock_divider(), None);

        config.set_clock_divider(150, &mut bus, &mut NoOpLogger).unwrap();
        assert_eq!(config.clock_divider(), Some(ClockDivider::Div150));
        assert_eq!(config.baudrate(), None);

        assert_eq!(
            bus.calls,
            vec![
                BusCall::Baudrate(100_000),
                BusCall::ClockDivider(ClockDivider::Div150)
            ]
        );
    }

    #[test]
    fn test_invalid_clock_values_leave_speed() {
        let mut config = fresh();
        let mut bus = MockBus::default();

        assert_eq!(
            config.set_baudrate(0, &mut bus, &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(
            config.set_baudrate(-100, &mut bus, &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(
            config.set_clock_divider(627, &mut bus, &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(config.speed(), BusSpeed::Divider(ClockDivider::Div626));
        assert!(bus.calls.is_empty());
    }

    #[test]
    fn test_command_sequence_requires_size() {
        let mut config = fresh();
        assert_eq!(
            config.set_command_sequence(&[0xaa], &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );

        config.set_command_sequence_size(3, &mut NoOpLogger).unwrap();
        assert_eq!(
            config.set_command_sequence(&[], &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(
            config.set_command_sequence(&[1, 2, 3, 4], &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(config.command_sequence(), None);

        config
            .set_command_sequence(&[0xaa, 0xbb, 0xcc], &mut NoOpLogger)
            .unwrap();
        assert_eq!(config.command_sequence(), Some(&[0xaa, 0xbb, 0xcc][..]));
        assert_eq!(config.command_phase(), Some(&[0xaa, 0xbb, 0xcc][..]));
    }

    #[test]
    fn test_command_phase_follows_declared_size() {
        let mut config = fresh();
        config.set_command_sequence_size(3, &mut NoOpLogger).unwrap();
        config.set_command_sequence(&[1, 2, 3], &mut NoOpLogger).unwrap();

        config.set_command_sequence_size(2, &mut NoOpLogger).unwrap();
        assert_eq!(config.command_phase(), Some(&[1, 2][..]));

        config.set_command_sequence_size(10, &mut NoOpLogger).unwrap();
        assert_eq!(config.command_phase(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_sequence_is_owned_copy() {
        let mut config = fresh();
        let mut caller = [0x10u8, 0x20];
        config.set_command_sequence_size(2, &mut NoOpLogger).unwrap();
        config.set_command_sequence(&caller, &mut NoOpLogger).unwrap();
        caller[0] = 0x99;
        assert_eq!(config.command_sequence(), Some(&[0x10, 0x20][..]));
    }

    #[test]
    fn test_empty_flags_rejected() {
        let mut config = SessionConfig::new(ClockDivider::DEFAULT, TransferFlags::DEBUG_TRACE);
        assert_eq!(
            config.set_flags(TransferFlags::empty(), &mut NoOpLogger),
            Err(SessionError::InvalidArgument)
        );
        assert_eq!(config.flags(), TransferFlags::DEBUG_TRACE);
    }

    #[test]
    fn test_trace_only_when_debug_active() {
        let mut config = fresh();
        let mut logger = RecordingLogger::default();

        config.set_register_address(1, &mut logger).unwrap();
        assert!(logger.debug.is_empty());

        // Checked against the flags in force before the change.
        config.set_flags(TransferFlags::DEBUG_TRACE, &mut logger).unwrap();
        assert!(logger.debug.is_empty());

        config.set_register_address(2, &mut logger).unwrap();
        assert_eq!(logger.debug, vec!["changing slave register address to 0x2"]);
    }

    #[test]
    fn test_failed_push_is_not_traced() {
        let mut config = SessionConfig::new(ClockDivider::DEFAULT, TransferFlags::DEBUG_TRACE);
        let mut bus = MockBus::default();
        let mut logger = RecordingLogger::default();

        bus.nack_next();
        assert_eq!(
            config.set_slave_address(0x50, &mut bus, &mut logger),
            Err(SessionError::Bus(BusStatus::Nack))
        );
        bus.nack_next();
        assert_eq!(
            config.set_baudrate(100_000, &mut bus, &mut logger),
            Err(SessionError::Bus(BusStatus::Nack))
        );
        bus.nack_next();
        assert_eq!(
            config.set_clock_divider(148, &mut bus, &mut logger),
            Err(SessionError::Bus(BusStatus::Nack))
        );
        assert!(logger.debug.is_empty());
        assert_eq!(logger.errors.len(), 3);

        config.set_clock_divider(148, &mut bus, &mut logger).unwrap();
        assert_eq!(logger.debug, vec!["changing clock divider to 148"]);
    }

    proptest! {
        #[test]
        fn prop_every_nonzero_address_accepted(address in 1u8..=255) {
            let mut config = fresh();
            let mut bus = MockBus::default();
            prop_assert!(config.set_slave_address(address, &mut bus, &mut NoOpLogger).is_ok());
            prop_assert_eq!(config.slave_address(), Some(address));
        }

        #[test]
        fn prop_divider_accepted_iff_known(raw in any::<i32>()) {
            let mut config = fresh();
            let mut bus = MockBus::default();
            config.set_baudrate(400_000, &mut bus, &mut NoOpLogger).unwrap();
            let known = [2500, 626, 150, 148].contains(&raw);
            let result = config.set_clock_divider(raw, &mut bus, &mut NoOpLogger);
            prop_assert_eq!(result.is_ok(), known);
            prop_assert_eq!(config.baudrate().is_some(), !known);
            prop_assert!(config.baudrate().is_none() || config.clock_divider().is_none());
        }

        #[test]
        fn prop_sequence_size_range(size in any::<u16>()) {
            let mut config = fresh();
            let result = config.set_command_sequence_size(size, &mut NoOpLogger);
            prop_assert_eq!(result.is_ok(), (1..=1023).contains(&size));
        }

        #[test]
        fn prop_flags_accepted_iff_nonempty_subset(raw in any::<u8>()) {
            let mut config = fresh();
            let result = match TransferFlags::from_bits(raw) {
                Some(flags) => config.set_flags(flags, &mut NoOpLogger),
                None => Err(SessionError::InvalidArgument),
            };
            prop_assert_eq!(result.is_ok(), (1..16).contains(&raw));
        }
    }
}
