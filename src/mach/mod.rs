/*!
## Rust Machine Module

This Rust module is the virtual machine that executes compiled BASIC.
A [`Program`] is a linked vector of [`Opcode`]s. The [`Runtime`] runs
one or more programs as tasks, keeping a [`Frame`] stack and a slot
table per task, and reaches the outside world only through a
[`Device`] and the [`Plugins`] registry.

*/

pub type Address = usize;
pub type SlotId = usize;
pub type TaskId = usize;

mod array;
mod call;
mod collection;
mod control;
mod device;
mod eval;
mod expr;
mod ffi;
mod frame;
mod link;
mod map;
mod opcode;
mod operation;
mod options;
mod plugin;
mod program;
mod runtime;
mod stack;
mod statement;
mod val;
mod var;

use eval::assign;
use runtime::Task;

pub use array::Array;
pub use device::{Device, NullDevice, Target};
pub use expr::{Call, CallTarget, Expr, Op, Place, Selector};
pub use ffi::DynamicModule;
pub use frame::{Arg, CallFrame, ForFrame, ForIter, ForSource, Frame, LoopKind};
pub use link::Link;
pub use map::Map;
pub use opcode::{
    Dim, ExitKind, ForHead, InputFrom, Opcode, ParamDecl, PrintItem, PrintTo, Sep,
};
pub use operation::Operation;
pub use options::Options;
pub use plugin::{is_module, module_name, CallKind, Module, ModuleId, Plugins};
pub use program::Program;
pub use runtime::{Event, Runtime};
pub use stack::Stack;
pub use val::{follow, parse_number, Cell, FuncPtr, NativeFn, Text, Val, VarRef};
pub use var::Var;
