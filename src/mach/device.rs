use crate::lang::Error;

type Result<T> = std::result::Result<T, Error>;

/// Where a `PRINT` or `INPUT` is directed. String-builder variables are
/// handled inside the machine and never reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Console,
    File(i64),
    Log,
    Net(i64),
}

/// ## Host I/O
///
/// The machine never touches a terminal, file or socket itself. Reads
/// may block; they should return `Ok(false)` at end of input and keep
/// an eye on the break signal while they wait.

pub trait Device {
    fn write(&mut self, text: &str, target: Target) -> Result<()>;
    fn read(&mut self, buf: &mut String, target: Target) -> Result<bool>;
    /// Non-blocking check for a pending user break.
    fn poll_break(&mut self) -> bool {
        false
    }
}

/// Discards output and has nothing to read.
#[derive(Debug, Default)]
pub struct NullDevice;

impl Device for NullDevice {
    fn write(&mut self, _text: &str, _target: Target) -> Result<()> {
        Ok(())
    }
    fn read(&mut self, _buf: &mut String, _target: Target) -> Result<bool> {
        Ok(false)
    }
}
