// Licensed under the Apache-2.0 license

//! Bus controller on top of any `embedded-hal` I2C master.
//!
//! [`HalBusController`] implements [`I2cBusController`] for a blocking
//! [`embedded_hal::i2c::I2c`] implementation. The slave address byte is
//! latched in the controller and handed to the master unchanged, like a
//! write to the BSC address register. Repeated-start transfers map onto
//! `write_read`, which the `embedded-hal` contract defines as write,
//! repeated start, read.
//!
//! Clock selection and pin ownership are platform specific and delegated to
//! a [`BusControl`] implementation.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{BusSpeed, ClockDivider, TransferKind};
use crate::i2c::traits::I2cBusController;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c, SevenBitAddress};
use fugit::HertzU32;

/// Platform hooks around the I2C peripheral.
pub trait BusControl {
    /// Claim pins, enable the peripheral clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the peripheral cannot be enabled.
    fn begin(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }

    /// Release pins.
    fn end(&mut self) {}

    /// Program the bus clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the speed cannot be produced.
    fn set_speed(&mut self, speed: BusSpeed) -> Result<(), ErrorKind>;
}

/// Clock fixed by board setup; speed requests are accepted and ignored.
#[derive(Copy, Clone, Debug, Default)]
pub struct FixedClock;

impl BusControl for FixedClock {
    fn set_speed(&mut self, _speed: BusSpeed) -> Result<(), ErrorKind> {
        Ok(())
    }
}

pub struct HalBusController<I: I2c, C: BusControl = FixedClock, L: Logger = NoOpLogger> {
    pub i2c: I,
    pub control: C,
    pub logger: L,
    address: Option<SevenBitAddress>,
    realtime_limit: Option<usize>,
}

impl<I: I2c> HalBusController<I> {
    #[must_use]
    pub fn new(i2c: I) -> Self {
        Self::with_parts(i2c, FixedClock, NoOpLogger)
    }
}

impl<I: I2c, C: BusControl, L: Logger> HalBusController<I, C, L> {
    #[must_use]
    pub fn with_parts(i2c: I, control: C, logger: L) -> Self {
        Self {
            i2c,
            control,
            logger,
            address: None,
            realtime_limit: None,
        }
    }

    /// Transfers longer than `len` bytes are reported as not real-time safe.
    #[must_use]
    pub fn with_realtime_limit(mut self, len: usize) -> Self {
        self.realtime_limit = Some(len);
        self
    }

    #[must_use]
    pub const fn address(&self) -> Option<SevenBitAddress> {
        self.address
    }

    fn target(&mut self) -> Result<SevenBitAddress, ErrorKind> {
        self.address.ok_or_else(|| {
            self.logger
                .error(format_args!("transfer without slave address"));
            ErrorKind::Other
        })
    }
}

impl<I: I2c, C: BusControl, L: Logger> I2cBusController for HalBusController<I, C, L> {
    type Error = ErrorKind;

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.control.begin()
    }

    fn end(&mut self) {
        self.address = None;
        self.control.end();
    }

    fn set_slave_address(&mut self, address: u8) -> Result<(), Self::Error> {
        // Latched as given; the peripheral decides what the upper bit means.
        self.address = Some(address);
        Ok(())
    }

    fn set_clock_divider(&mut self, divider: ClockDivider) -> Result<(), Self::Error> {
        self.control.set_speed(BusSpeed::Divider(divider))
    }

    fn set_baudrate(&mut self, rate: HertzU32) -> Result<(), Self::Error> {
        self.control.set_speed(BusSpeed::Baudrate(rate))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let address = self.target()?;
        self.i2c.read(address, buffer).map_err(|e| e.kind())
    }

    fn read_register_rs(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let address = self.target()?;
        self.i2c
            .write_read(address, &[register], buffer)
            .map_err(|e| e.kind())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let address = self.target()?;
        self.i2c.write(address, bytes).map_err(|e| e.kind())
    }

    fn write_read_rs(&mut self, commands: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        let address = self.target()?;
        self.i2c
            .write_read(address, commands, buffer)
            .map_err(|e| e.kind())
    }

    fn bounded_time(&self, _kind: TransferKind, len: usize) -> bool {
        self.realtime_limit.map_or(true, |limit| len <= limit)
    }
}
