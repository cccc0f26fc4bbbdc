// Licensed under the Apache-2.0 license

//! Session management for the I2C master device.
//!
//! Each open device handle owns one [`Session`]: a [`SessionConfig`] plus a
//! transmit and a receive buffer. The [`SessionManager`] owns the bus and a
//! fixed table of session slots, and routes control, read and write calls
//! to the session named by a [`SessionHandle`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use i2c_session_ddk::common::NoOpLogger;
//! use i2c_session_ddk::i2c::{CallerBuffer, CallerBytes, DeviceOptions, ExecutionContext};
//! use i2c_session_ddk::i2c::SessionManager;
//!
//! let mut manager: SessionManager<_, _, 1> =
//!     SessionManager::new(bus, NoOpLogger, DeviceOptions::default())?;
//! let handle = manager.open(0)?;
//!
//! // Slave address 0x50, then read two bytes.
//! manager.control(&handle, ExecutionContext::NonRealTime, 0, &mut CallerBytes::new(&[0x50]))?;
//! let mut id = [0u8; 2];
//! manager.read(&handle, ExecutionContext::RealTime, &mut CallerBuffer::new(&mut id), 2)?;
//!
//! manager.close(handle)?;
//! let bus = manager.release();
//! ```

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{BusStatus, ClockDivider, DeviceOptions, TransferBuffer, TransferFlags};
use crate::i2c::config::SessionConfig;
use crate::i2c::control::{ControlRequest, RequestCode};
use crate::i2c::dispatch::{BusState, Completion, ExecutionContext};
use crate::i2c::error::SessionError;
use crate::i2c::traits::{CallerMemory, I2cBusController};

/// State of one open device handle.
#[derive(Clone, Debug)]
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) transmit: TransferBuffer,
    pub(crate) receive: TransferBuffer,
}

impl Session {
    /// Fresh session: nothing configured except the clock divider and the
    /// flags.
    #[must_use]
    pub fn new(default_divider: ClockDivider, flags: TransferFlags) -> Self {
        Self {
            config: SessionConfig::new(default_divider, flags),
            transmit: TransferBuffer::new(),
            receive: TransferBuffer::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Decode and apply control request `code`.
    ///
    /// Configuration changes are not real-time safe; from the real-time
    /// context this only asks for a redispatch.
    ///
    /// # Errors
    ///
    /// See [`ControlRequest::decode`] and [`ControlRequest::apply`].
    pub fn control<B, L, M>(
        &mut self,
        bus: &mut B,
        logger: &mut L,
        context: ExecutionContext,
        code: u32,
        arg: &mut M,
    ) -> Result<Completion<()>, SessionError>
    where
        B: I2cBusController,
        L: Logger,
        M: CallerMemory,
    {
        if context.is_real_time() {
            return Ok(Completion::Redispatch);
        }
        let request = ControlRequest::decode(code, arg, &self.config, logger)?;
        request.apply(&mut self.config, bus, logger)?;
        Ok(Completion::Done(()))
    }
}

/// Opaque handle to an open session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    slot: usize,
    id: u32,
}

#[derive(Debug)]
struct Slot {
    id: u32,
    session: Session,
}

/// Owner of the bus and of up to `N` open sessions.
///
/// Every operation takes `&mut self`, so bus transactions of different
/// sessions never interleave. The bus latches one slave address and one
/// clock; before a transfer runs for a session other than the one that last
/// programmed the bus, the manager pushes that session's settings again.
pub struct SessionManager<B, L = NoOpLogger, const N: usize = 1>
where
    B: I2cBusController,
    L: Logger,
{
    bus: B,
    logger: L,
    options: DeviceOptions,
    sessions: [Option<Slot>; N],
    next_id: u32,
    /// Slot whose address and clock the bus currently holds.
    owner: Option<usize>,
}

impl<B, L, const N: usize> SessionManager<B, L, N>
where
    B: I2cBusController,
    L: Logger,
{
    /// Bring the bus up and program the default clock divider.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `N` is 0
    /// - `Bus` if the controller cannot be brought up or rejects the
    ///   divider; the bus is released again in the latter case
    pub fn new(mut bus: B, mut logger: L, options: DeviceOptions) -> Result<Self, SessionError> {
        if N == 0 {
            logger.error(format_args!("session table needs at least one slot"));
            return Err(SessionError::InvalidArgument);
        }
        bus.begin().map_err(|e| {
            let status = BusStatus::from_error(&e);
            logger.error(format_args!("bus bring-up failed ({status})"));
            SessionError::Bus(status)
        })?;
        if let Err(e) = bus.set_clock_divider(options.default_divider) {
            let status = BusStatus::from_error(&e);
            logger.error(format_args!("default clock divider rejected ({status})"));
            bus.end();
            return Err(SessionError::Bus(status));
        }

        Ok(Self {
            bus,
            logger,
            options,
            sessions: [const { None }; N],
            next_id: 0,
            owner: None,
        })
    }

    /// Open a session, seeding its flags from the handle's open flags.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TooManySessions` if all slots are in use.
    pub fn open(&mut self, open_flags: u32) -> Result<SessionHandle, SessionError> {
        let Some(slot) = self.sessions.iter().position(Option::is_none) else {
            self.logger
                .error(format_args!("no free session slot ({N} in use)"));
            return Err(SessionError::TooManySessions);
        };

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let flags = TransferFlags::from_open_flags(open_flags);
        let session = Session::new(self.options.default_divider, flags);
        session
            .config
            .trace(&mut self.logger, format_args!("session {id} opened"));

        if let Some(entry) = self.sessions.get_mut(slot) {
            *entry = Some(Slot { id, session });
        }
        Ok(SessionHandle { slot, id })
    }

    /// Close a session and free its storage. The bus stays up.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSession` for a stale handle.
    pub fn close(&mut self, handle: SessionHandle) -> Result<(), SessionError> {
        lookup(&mut self.sessions, &handle, &mut self.logger)?;
        if let Some(entry) = self.sessions.get_mut(handle.slot) {
            *entry = None;
        }
        if self.owner == Some(handle.slot) {
            self.owner = None;
        }
        Ok(())
    }

    /// Issue control request `code` on a session.
    ///
    /// # Errors
    ///
    /// `InvalidSession` for a stale handle, otherwise see
    /// [`Session::control`].
    pub fn control<M: CallerMemory>(
        &mut self,
        handle: &SessionHandle,
        context: ExecutionContext,
        code: u32,
        arg: &mut M,
    ) -> Result<Completion<()>, SessionError> {
        let session = lookup(&mut self.sessions, handle, &mut self.logger)?;
        let result = session.control(&mut self.bus, &mut self.logger, context, code, arg);
        let touches_bus = RequestCode::try_from(code).is_ok_and(RequestCode::touches_bus);
        if touches_bus && !matches!(result, Ok(Completion::Redispatch)) {
            self.settings_pushed(handle.slot, result.is_ok());
        }
        result
    }

    /// Apply an already decoded request, for callers that do not go through
    /// raw request codes.
    ///
    /// # Errors
    ///
    /// `InvalidSession` for a stale handle, otherwise see
    /// [`ControlRequest::apply`].
    pub fn apply(
        &mut self,
        handle: &SessionHandle,
        request: &ControlRequest,
    ) -> Result<(), SessionError> {
        let session = lookup(&mut self.sessions, handle, &mut self.logger)?;
        let result = request.apply(&mut session.config, &mut self.bus, &mut self.logger);
        if request.code().touches_bus() {
            self.settings_pushed(handle.slot, result.is_ok());
        }
        result
    }

    /// Read from the bus into caller memory.
    ///
    /// # Errors
    ///
    /// `InvalidSession` for a stale handle, otherwise see [`Session::read`].
    pub fn read<M: CallerMemory>(
        &mut self,
        handle: &SessionHandle,
        context: ExecutionContext,
        caller: &mut M,
        size: usize,
    ) -> Result<Completion<usize>, SessionError> {
        let state = self.bus_state(handle.slot);
        let session = lookup(&mut self.sessions, handle, &mut self.logger)?;
        let result = session.read_on(&mut self.bus, &mut self.logger, context, caller, size, state);
        self.transfer_done(handle.slot, state, result.as_ref().ok());
        result
    }

    /// Write caller memory to the bus.
    ///
    /// # Errors
    ///
    /// `InvalidSession` for a stale handle, otherwise see [`Session::write`].
    pub fn write<M: CallerMemory>(
        &mut self,
        handle: &SessionHandle,
        context: ExecutionContext,
        caller: &mut M,
        size: usize,
    ) -> Result<Completion<BusStatus>, SessionError> {
        let state = self.bus_state(handle.slot);
        let session = lookup(&mut self.sessions, handle, &mut self.logger)?;
        let result =
            session.write_on(&mut self.bus, &mut self.logger, context, caller, size, state);
        self.transfer_done(handle.slot, state, result.as_ref().ok());
        result
    }

    /// Read-only view of an open session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSession` for a stale handle.
    pub fn session(&self, handle: &SessionHandle) -> Result<&Session, SessionError> {
        match self.sessions.get(handle.slot) {
            Some(Some(slot)) if slot.id == handle.id => Ok(&slot.session),
            _ => Err(SessionError::InvalidSession),
        }
    }

    #[must_use]
    pub fn is_valid(&self, handle: &SessionHandle) -> bool {
        self.session(handle).is_ok()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub const fn max_sessions(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn logger_mut(&mut self) -> &mut L {
        &mut self.logger
    }

    fn bus_state(&self, slot: usize) -> BusState {
        if self.owner == Some(slot) {
            BusState::Current
        } else {
            BusState::Stale
        }
    }

    /// A control request of `slot` programmed the bus. Only the owner's own
    /// successful push keeps the bus consistent with one session.
    fn settings_pushed(&mut self, slot: usize, ok: bool) {
        if !(ok && self.owner == Some(slot)) {
            self.owner = None;
        }
    }

    /// Track ownership after a transfer that may have resynced the bus.
    fn transfer_done<T>(&mut self, slot: usize, state: BusState, outcome: Option<&Completion<T>>) {
        match (state, outcome) {
            (_, Some(Completion::Redispatch)) | (BusState::Current, _) => {}
            (BusState::Stale, Some(Completion::Done(_))) => self.owner = Some(slot),
            (BusState::Stale, None) => self.owner = None,
        }
    }

    /// Drop all sessions, release the bus pins and hand the bus back.
    pub fn release(mut self) -> B {
        self.bus.end();
        self.bus
    }
}

fn lookup<'a, L: Logger>(
    sessions: &'a mut [Option<Slot>],
    handle: &SessionHandle,
    logger: &mut L,
) -> Result<&'a mut Session, SessionError> {
    match sessions.get_mut(handle.slot) {
        Some(Some(slot)) if slot.id == handle.id => Ok(&mut slot.session),
        _ => {
            logger.error(format_args!(
                "invalid session handle (slot {}, id {})",
                handle.slot, handle.id
            ));
            Err(SessionError::InvalidSession)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_support::RecordingLogger;
    use crate::i2c::common::DeviceOptionsBuilder;
    use crate::i2c::config::test_support::{BusCall, MockBus};
    use crate::i2c::traits::{CallerBuffer, CallerBytes};
    use hex_literal::hex;

    fn manager<const N: usize>() -> SessionManager<MockBus, RecordingLogger, N> {
        SessionManager::new(
            MockBus::default(),
            RecordingLogger::default(),
            DeviceOptions::default(),
        )
        .unwrap()
    }

    fn control<const N: usize>(
        manager: &mut SessionManager<MockBus, RecordingLogger, N>,
        handle: &SessionHandle,
        code: u32,
        arg: &[u8],
    ) -> Result<Completion<()>, SessionError> {
        manager.control(
            handle,
            ExecutionContext::NonRealTime,
            code,
            &mut CallerBytes::new(arg),
        )
    }

    #[test]
    fn test_new_brings_bus_up_with_default_divider() {
        let manager = manager::<1>();
        assert_eq!(
            manager.bus().calls,
            vec![BusCall::Begin, BusCall::ClockDivider(ClockDivider::Div626)]
        );
        assert_eq!(manager.max_sessions(), 1);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_new_rejects_empty_table() {
        let result = SessionManager::<MockBus, NoOpLogger, 0>::new(
            MockBus::default(),
            NoOpLogger,
            DeviceOptions::default(),
        );
        assert!(matches!(result, Err(SessionError::InvalidArgument)));
    }

    #[test]
    fn test_new_reports_bring_up_failure() {
        let mut bus = MockBus::default();
        bus.nack_next();
        let result = SessionManager::<MockBus, NoOpLogger, 1>::new(
            bus,
            NoOpLogger,
            DeviceOptions::default(),
        );
        assert!(matches!(result, Err(SessionError::Bus(BusStatus::Nack))));
    }

    #[test]
    fn test_custom_default_divider() {
        let options = DeviceOptionsBuilder::new()
            .default_divider(ClockDivider::Div2500)
            .build();
        let mut manager: SessionManager<MockBus, NoOpLogger, 1> =
            SessionManager::new(MockBus::default(), NoOpLogger, options).unwrap();
        let handle = manager.open(0).unwrap();
        assert_eq!(
            manager.session(&handle).unwrap().config().clock_divider(),
            Some(ClockDivider::Div2500)
        );
    }

    #[test]
    fn test_open_seeds_flags_and_divider() {
        let mut manager = manager::<1>();
        let handle = manager.open(0x0000_0105).unwrap();
        let config = manager.session(&handle).unwrap().config();
        assert_eq!(
            config.flags(),
            TransferFlags::READ_REPEATED_START | TransferFlags::DEBUG_TRACE
        );
        assert_eq!(config.clock_divider(), Some(ClockDivider::Div626));
        assert_eq!(config.slave_address(), None);
        assert_eq!(config.command_sequence_size(), 0);
    }

    #[test]
    fn test_slot_exhaustion_and_stale_handles() {
        let mut manager = manager::<2>();
        let first = manager.open(0).unwrap();
        let second = manager.open(0).unwrap();
        assert_eq!(manager.open(0), Err(SessionError::TooManySessions));
        assert_eq!(manager.active_count(), 2);

        manager.close(first).unwrap();
        assert!(!manager.is_valid(&first));
        assert_eq!(manager.close(first), Err(SessionError::InvalidSession));

        // The freed slot is reused under a new id.
        let third = manager.open(0).unwrap();
        assert!(manager.is_valid(&third));
        assert!(!manager.is_valid(&first));
        assert!(manager.is_valid(&second));
        let mut out = [0u8; 1];
        assert_eq!(
            manager.read(
                &first,
                ExecutionContext::RealTime,
                &mut CallerBuffer::new(&mut out),
                1
            ),
            Err(SessionError::InvalidSession)
        );
    }

    #[test]
    fn test_close_leaves_bus_up() {
        let mut manager = manager::<1>();
        let handle = manager.open(0).unwrap();
        manager.close(handle).unwrap();
        let bus = manager.release();
        assert_eq!(bus.calls.last(), Some(&BusCall::End));
        assert_eq!(
            bus.calls.iter().filter(|c| **c == BusCall::End).count(),
            1
        );
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut manager = manager::<2>();
        let a = manager.open(0).unwrap();
        let b = manager.open(0).unwrap();
        manager
            .apply(&a, &ControlRequest::SetRegisterAddress(0x10))
            .unwrap();
        assert_eq!(
            manager.session(&a).unwrap().config().register_address(),
            Some(0x10)
        );
        assert_eq!(manager.session(&b).unwrap().config().register_address(), None);
    }

    #[test]
    fn test_reconfigure_write_scenario() {
        let mut manager = manager::<1>();
        let handle = manager.open(0).unwrap();

        assert_eq!(

            control(&mut manager, &handle, 0, &[0x50]),

            Ok(Completion::Done(()))

        );
        assert_eq!(
            control(&mut manager, &handle, 6, &[0]),
            Err(SessionError::InvalidArgument)
        );
        assert!(manager.session(&handle).unwrap().config().flags().is_empty());
        assert_eq!(
            control(&mut manager, &handle, 6, &[0x08]),
            Ok(Completion::Done(()))
        );

        let status = manager
            .write(
                &handle,
                ExecutionContext::RealTime,
                &mut CallerBytes::new(&hex!("01 02")),
                2,
            )
            .unwrap();
        assert_eq!(status, Completion::Done(BusStatus::Ok));
        assert_eq!(
            manager.bus().calls,
            vec![
                BusCall::Begin,
                BusCall::ClockDivider(ClockDivider::Div626),
                BusCall::SlaveAddress(0x50),
                BusCall::SlaveAddress(0x50),
                BusCall::ClockDivider(ClockDivider::Div626),
                BusCall::Write(vec![0x01, 0x02]),
            ]
        );
    }

    #[test]
    fn test_command_sequence_scenario() {
        let mut manager = manager::<1>();
        let handle = manager.open(0).unwrap();

        assert_eq!(

            control(&mut manager, &handle, 0, &[0x50]),

            Ok(Completion::Done(()))

        );
        assert_eq!(
            control(&mut manager, &handle, 5, &3u16.to_ne_bytes()),
            Ok(Completion::Done(()))
        );
        assert_eq!(
            control(&mut manager, &handle, 4, &hex!("aa bb cc")),
            Ok(Completion::Done(()))
        );
        assert_eq!(
            control(&mut manager, &handle, 6, &[0x02]),
            Ok(Completion::Done(()))
        );

        let mut data = [0u8; 4];
        let status = manager
            .write(
                &handle,
                ExecutionContext::RealTime,
                &mut CallerBuffer::new(&mut data),
                4,
            )
            .unwrap();
        assert_eq!(status, Completion::Done(BusStatus::Ok));
        assert_eq!(data, [0xff; 4]);
        assert_eq!(
            manager.bus().calls.last(),
            Some(&BusCall::WriteRead(vec![0xaa, 0xbb, 0xcc], 4))
        );
    }

    #[test]
    fn test_sessions_do_not_share_latched_address() {
        let mut manager = manager::<2>();
        let a = manager.open(0).unwrap();
        let b = manager.open(0).unwrap();
        assert_eq!(control(&mut manager, &a, 0, &[0x50]), Ok(Completion::Done(())));
        assert_eq!(control(&mut manager, &b, 0, &[0x60]), Ok(Completion::Done(())));
        assert_eq!(
            control(&mut manager, &b, 2, &100_000i32.to_ne_bytes()),
            Ok(Completion::Done(()))
        );

        for (handle, byte) in [(a, 0x01), (a, 0x02), (b, 0x03), (a, 0x04)] {
            let status = manager
                .write(
                    &handle,
                    ExecutionContext::RealTime,
                    &mut CallerBytes::new(&[byte]),
                    1,
                )
                .unwrap();
            assert_eq!(status, Completion::Done(BusStatus::Ok));
        }
        assert_eq!(
            manager.bus().calls,
            vec![
                BusCall::Begin,
                BusCall::ClockDivider(ClockDivider::Div626),
                BusCall::SlaveAddress(0x50),
                BusCall::SlaveAddress(0x60),
                BusCall::Baudrate(100_000),
                BusCall::SlaveAddress(0x50),
                BusCall::ClockDivider(ClockDivider::Div626),
                BusCall::Write(vec![0x01]),
                BusCall::Write(vec![0x02]),
                BusCall::SlaveAddress(0x60),
                BusCall::Baudrate(100_000),
                BusCall::Write(vec![0x03]),
                BusCall::SlaveAddress(0x50),
                BusCall::ClockDivider(ClockDivider::Div626),
                BusCall::Write(vec![0x04]),
            ]
        );
    }

    #[test]
    fn test_bus_owner_keeps_own_changes() {
        let mut manager = manager::<2>();
        let a = manager.open(0).unwrap();
        let _b = manager.open(0).unwrap();
        assert_eq!(control(&mut manager, &a, 0, &[0x50]), Ok(Completion::Done(())));
        let mut out = [0u8; 1];
        let read = manager
            .read(&a, ExecutionContext::RealTime, &mut CallerBuffer::new(&mut out), 1)
            .unwrap();
        assert_eq!(read, Completion::Done(1));

        // A's own change keeps the bus in sync, no second resync.
        assert_eq!(control(&mut manager, &a, 0, &[0x51]), Ok(Completion::Done(())));
        let read = manager
            .read(&a, ExecutionContext::RealTime, &mut CallerBuffer::new(&mut out), 1)
            .unwrap();
        assert_eq!(read, Completion::Done(1));
        assert_eq!(
            &manager.bus().calls[2..],
            &[
                BusCall::SlaveAddress(0x50),
                BusCall::SlaveAddress(0x50),
                BusCall::ClockDivider(ClockDivider::Div626),
                BusCall::Read(1),
                BusCall::SlaveAddress(0x51),
                BusCall::Read(1),
            ]
        );
    }

    #[test]
    fn test_reopened_slot_resyncs_bus() {
        let mut manager = manager::<1>();
        let first = manager.open(0).unwrap();
        assert_eq!(control(&mut manager, &first, 0, &[0x50]), Ok(Completion::Done(())));
        assert_eq!(
            control(&mut manager, &first, 3, &150i32.to_ne_bytes()),
            Ok(Completion::Done(()))
        );
        let status = manager
            .write(&first, ExecutionContext::RealTime, &mut CallerBytes::new(&[0x01]), 1)
            .unwrap();
        assert_eq!(status, Completion::Done(BusStatus::Ok));
        manager.close(first).unwrap();

        let second = manager.open(0).unwrap();
        let status = manager
            .write(&second, ExecutionContext::RealTime, &mut CallerBytes::new(&[0x02]), 1)
            .unwrap();
        assert_eq!(status, Completion::Done(BusStatus::Ok));
        assert_eq!(
            manager.bus().calls.iter().rev().take(2).collect::<Vec<_>>(),
            vec![
                &BusCall::Write(vec![0x02]),
                &BusCall::ClockDivider(ClockDivider::Div626),
            ]
        );
    }

    #[test]
    fn test_control_from_realtime_is_redispatched() {
        let mut manager = manager::<1>();
        let handle = manager.open(0).unwrap();
        let result = manager
            .control(
                &handle,
                ExecutionContext::RealTime,
                0,
                &mut CallerBytes::new(&[0x50]),
            )
            .unwrap();
        assert!(result.is_redispatch());
        assert_eq!(manager.session(&handle).unwrap().config().slave_address(), None);
        assert_eq!(manager.bus().calls.len(), 2);
    }

    #[test]
    fn test_unknown_request_is_logged() {
        let mut manager = manager::<1>();
        let handle = manager.open(0).unwrap();
        assert_eq!(
            control(&mut manager, &handle, 42, &[]),
            Err(SessionError::UnsupportedRequest)
        );
        assert_eq!(manager.logger_mut().errors, vec!["unexpected request: 42"]);
    }
}
