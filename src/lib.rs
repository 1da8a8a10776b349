//! # BASIC Engine
//!
//! The execution core of a structured BASIC: a value model, a frame
//! stack with explicit slot-restore scoping, a control dispatcher, a
//! call/return protocol with by-value and by-reference parameters, and
//! a bridge to routines living in shared libraries.
//!
//! There is no parser here. A front end builds a [`mach::Program`] out
//! of [`mach::Opcode`]s, labels its jump targets, and hands it to a
//! [`mach::Runtime`]. The host then calls `execute` with a cycle budget
//! until it stops reporting `Event::Running`.
//!
//! ```text
//! 10 FOR I = 1 TO 3
//! 20 PRINT I;
//! 30 NEXT
//! ```
//!
//! assembles to `FOR(I, 1 TO 3, 3)`, `PRINT(I;)`, `NEXT` and prints
//! `123`.
//!
//! Terminal hosts can use [`term::Console`] as the machine's device and
//! [`term::BreakSignal`] to turn Ctrl-C into a BASIC break.

pub mod lang;
pub mod mach;
pub mod term;
