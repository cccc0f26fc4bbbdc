// Licensed under the Apache-2.0 license

//! Crate-wide helpers shared by the driver modules.
//!
//! The only thing living here for now is logging. Drivers are generic over a
//! [`Logger`] so that firmware builds can route diagnostics to a UART while
//! tests and size-constrained images plug in [`NoOpLogger`].

use core::fmt;

/// Sink for driver diagnostics.
///
/// Implementations must not block for unbounded time: the transfer paths
/// call into the logger from the real-time context when tracing is enabled.
pub trait Logger {
    /// Verbose trace output, only requested when a session enables tracing.
    fn debug(&mut self, args: fmt::Arguments<'_>);

    /// Failure reports. Emitted for every rejected request.
    fn error(&mut self, args: fmt::Arguments<'_>);
}

impl<L: Logger + ?Sized> Logger for &mut L {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        (**self).debug(args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        (**self).error(args);
    }
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}

    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Logger writing one line per message into an `embedded-io` sink.
///
/// Typically wraps the debug UART. Write errors are dropped: a failing
/// console must never turn into a failing bus transfer.
pub struct WriterLogger<W: embedded_io::Write> {
    writer: W,
    debug_enabled: bool,
}

impl<W: embedded_io::Write> WriterLogger<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            debug_enabled: true,
        }
    }

    /// Suppress debug lines globally, independent of per-session tracing.
    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, level: &str, args: fmt::Arguments<'_>) {
        let _ = self.writer.write_fmt(format_args!("[{level}] {args}\r\n"));
    }
}

impl<W: embedded_io::Write> Logger for WriterLogger<W> {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        if self.debug_enabled {
            self.line("DEBUG", args);
        }
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.line("ERROR", args);
    }
}
