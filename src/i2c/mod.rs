// Licensed under the Apache-2.0 license

//! I2C master session driver.
//!
//! Turns the generic open/read/write/control interface of a device handle
//! into a configurable transaction engine on top of an
//! [`I2cBusController`]: plain transfers, register-addressed repeated-start
//! reads, command-sequence write-then-read exchanges and optional
//! reconfiguration of the bus before every transfer.

pub mod common;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod i2c_controller;
pub mod session;
pub mod traits;

pub use common::{
    BusSpeed, BusStatus, ClockDivider, DeviceOptions, DeviceOptionsBuilder, TransferFlags,
    TransferKind, BUFFER_SIZE_MAX, COMMAND_SEQUENCE_MAX,
};
pub use config::SessionConfig;
pub use control::{ControlRequest, RequestCode};
pub use dispatch::{Completion, ExecutionContext};
pub use error::SessionError;
pub use i2c_controller::{BusControl, FixedClock, HalBusController};
pub use session::{Session, SessionHandle, SessionManager};
pub use traits::{CallerBuffer, CallerBytes, CallerMemory, CopyFault, I2cBusController};
