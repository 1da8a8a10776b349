use super::{assign, Address, SlotId, Val, VarRef};
use crate::lang::Error;

/// ## Execution stack frames
///
/// One frame per open construct or call. Each carries what is needed to
/// undo its effect when popped; dropping a frame releases anything it
/// owns, and `Runtime::release` restores the slots it shadowed.

#[derive(Debug)]
pub enum Frame {
    If { cond: bool },
    For(ForFrame),
    Loop { kind: LoopKind, exit_ip: Address },
    Gosub { ret_ip: Address },
    Select { subject: Val, matched: bool },
    Try { catch_ip: Address },
    Catch,
    Call(CallFrame),
    /// Slot shadowed by a created local or a by-value parameter.
    Local { slot: SlotId, saved: VarRef },
    /// Slot aliased to caller storage.
    ByRef { slot: SlotId, saved: VarRef },
    /// Argument pushed by the caller and not yet bound.
    Param(Arg),
    /// Function result waiting for the call site.
    Return(Val),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopKind {
    While,
    Repeat,
}

#[derive(Debug)]
pub struct ForFrame {
    pub var: VarRef,
    pub for_ip: Address,
    pub exit_ip: Address,
    pub iter: ForIter,
}

#[derive(Debug)]
pub enum ForIter {
    To { step_sign: i32 },
    In { source: ForSource, cursor: usize },
}

/// Collection walked by `FOR ... IN`. A variable is borrowed; the
/// result of any other expression belongs to the frame.
#[derive(Debug)]
pub enum ForSource {
    Borrowed(VarRef),
    Owned(Val),
}

impl ForSource {
    pub fn element(&self, cursor: usize) -> Option<Val> {
        match self {
            ForSource::Borrowed(cell) => element_of(&cell.borrow().val, cursor),
            ForSource::Owned(val) => element_of(val, cursor),
        }
    }
}

fn element_of(val: &Val, cursor: usize) -> Option<Val> {
    match val {
        Val::Array(array) => array.get(cursor).map(|cell| cell.borrow().val.clone()),
        Val::Map(map) => map.key_at(cursor).map(|key| Val::from(&*key)),
        Val::Str(s) => s.as_str().chars().nth(cursor).map(|c| Val::from(c.to_string())),
        _ => None,
    }
}

#[derive(Debug)]
pub struct CallFrame {
    pub argc: usize,
    pub ret_ip: Address,
    /// Function result slot and the content it held before the call.
    pub ret: Option<(SlotId, VarRef)>,
}

/// Call argument. Bare variables travel as a handle to their cell so
/// the callee may bind them by reference; anything else is a value.
#[derive(Debug)]
pub enum Arg {
    Flexible(VarRef),
    Value(Val),
}

impl Arg {
    /// Current value without disturbing the caller.
    pub fn value(&self) -> Val {
        match self {
            Arg::Flexible(cell) => cell.borrow().val.clone(),
            Arg::Value(val) => val.clone(),
        }
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, Arg::Flexible(_))
    }

    /// Store back into caller storage. Value-only arguments are the
    /// callee's own copy so writes to them are dropped with the table.
    pub fn store(&mut self, val: Val) -> Result<(), Error> {
        match self {
            Arg::Flexible(cell) => assign(cell, val),
            Arg::Value(v) => {
                *v = val;
                Ok(())
            }
        }
    }
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::If { .. } => "IF",
            Frame::For(_) => "FOR",
            Frame::Loop {
                kind: LoopKind::While,
                ..
            } => "WHILE",
            Frame::Loop {
                kind: LoopKind::Repeat,
                ..
            } => "REPEAT",
            Frame::Gosub { .. } => "GOSUB",
            Frame::Select { .. } => "SELECT",
            Frame::Try { .. } => "TRY",
            Frame::Catch => "CATCH",
            Frame::Call(_) => "CALL",
            Frame::Local { .. } => "LOCAL",
            Frame::ByRef { .. } => "BYREF",
            Frame::Param(_) => "PARAM",
            Frame::Return(_) => "RETURN",
        }
    }

    /// Frames that belong to a procedure activation.
    pub fn is_call_scope(&self) -> bool {
        matches!(
            self,
            Frame::Call(_) | Frame::Local { .. } | Frame::ByRef { .. } | Frame::Param(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach::{Array, Cell, Map};

    #[test]
    fn test_for_source_elements() {
        let arr = Val::Array(Array::from_vec(vec![Val::from(1), Val::from(2)]));
        let src = ForSource::Owned(arr);
        assert_eq!(src.element(1).unwrap().to_string(), "2");
        assert!(src.element(2).is_none());

        let mut map = Map::new();
        map.insert("k", Val::from(1));
        let src = ForSource::Borrowed(Cell::new(Val::Map(map)));
        assert_eq!(src.element(0).unwrap().to_string(), "k");

        let src = ForSource::Owned(Val::from("ab"));
        assert_eq!(src.element(1).unwrap().to_string(), "b");
        assert!(ForSource::Owned(Val::Array(Array::empty())).element(0).is_none());
    }
}
