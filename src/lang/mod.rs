/*!
# Rust Language Module

Error reporting shared by every part of the machine. Bytecode arrives
already compiled, so the only thing left of the language front end is
how failures are numbered and printed.

*/

#[macro_use]
mod error;

pub use error::Error;
pub use error::ErrorCode;

/// Source line an instruction was compiled from, if any.
pub type LineNumber = Option<u16>;
