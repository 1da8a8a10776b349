use super::val::follow;
use super::{
    Address, Arg, Call, CallFrame, CallKind, CallTarget, Cell, Expr, Frame, ModuleId, ParamDecl,
    Runtime, SlotId, Task, TaskId, Val, VarRef,
};
use crate::error;
use crate::lang::Error;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// ## Call/return protocol
///
/// The caller pushes one `Param` frame per argument and then a `Call`
/// frame. The callee's `Param` instruction converts the argument frames
/// in place into `Local` or `ByRef` bindings. `ProcReturn` pops them
/// again, restoring every slot, and leaves a `Return` frame holding the
/// result when the call was a function.

fn mismatch() -> Error {
    error!(InternalError; "STACK MISMATCH")
}

impl Runtime {
    fn make_arg(&mut self, expr: &Expr) -> Result<Arg> {
        match expr {
            Expr::Var(place) => Ok(Arg::Flexible(self.resolve(place, place.is_bare())?)),
            _ => Ok(Arg::Value(self.eval(expr)?)),
        }
    }

    fn make_args(&mut self, exprs: &[Expr]) -> Result<Vec<Arg>> {
        let mut args = Vec::with_capacity(exprs.len());
        for expr in exprs {
            args.push(self.make_arg(expr)?);
        }
        Ok(args)
    }

    fn push_args(&mut self, args: Vec<Arg>, base: usize) -> Result<()> {
        for arg in args {
            if let Err(error) = self.push(Frame::Param(arg)) {
                self.unwind(base);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Push the call frame. A function's result slot gets a fresh cell;
    /// the one it replaced comes back on return.
    fn push_call(&mut self, argc: usize, ret_slot: Option<SlotId>) -> Result<()> {
        let ret_ip = self.task().ip;
        let ret = match ret_slot {
            Some(slot) => {
                let saved = self.task_mut().var.replace(slot, Cell::new(Val::Nil))?;
                Some((slot, saved))
            }
            None => None,
        };
        let restore = ret.clone();
        let frame = Frame::Call(CallFrame { argc, ret_ip, ret });
        if let Err(error) = self.push(frame) {
            if let Some((slot, saved)) = restore {
                self.task_mut().var.replace(slot, saved)?;
            }
            return Err(error);
        }
        Ok(())
    }

    fn take_return(&mut self) -> Result<Val> {
        match self.task_mut().stack.pop() {
            Ok(Frame::Return(val)) => Ok(val),
            _ => Err(mismatch()),
        }
    }

    pub(super) fn call_statement(&mut self, call: &Call) -> Result<()> {
        match &call.target {
            CallTarget::Direct {
                addr,
                ret_slot: None,
            } => {
                let base = self.task().stack.len();
                let args = self.make_args(&call.args)?;
                let argc = args.len();
                self.push_args(args, base)?;
                if let Err(error) = self.push_call(argc, None) {
                    self.unwind(base);
                    return Err(error);
                }
                self.jump(*addr);
                Ok(())
            }
            _ => {
                self.call_function(call)?;
                Ok(())
            }
        }
    }

    pub(super) fn call_function(&mut self, call: &Call) -> Result<Val> {
        match &call.target {
            CallTarget::Direct { addr, ret_slot } => {
                self.call_udp(*addr, *ret_slot, &call.args, None)
            }
            CallTarget::Unit {
                task,
                addr,
                ret_slot,
            } => self.call_unit(*task, *addr, *ret_slot, &call.args),
            CallTarget::Indirect(place) => {
                let (cell, parent) = self.resolve_path(place, false)?;
                let cell = follow(cell)?;
                self.call_value(&cell, parent.as_ref(), &call.args)
            }
        }
    }

    /// Run a user routine to completion from inside an instruction.
    fn call_udp(
        &mut self,
        addr: Address,
        ret_slot: Option<SlotId>,
        exprs: &[Expr],
        this: Option<&VarRef>,
    ) -> Result<Val> {
        let base = self.task().stack.len();
        let args = self.make_args(exprs)?;
        let argc = args.len();
        self.push_args(args, base)?;
        if let Err(error) = self.push_call(argc, ret_slot) {
            self.unwind(base);
            return Err(error);
        }
        let resume = self.task().ip;
        self.jump(addr);
        let bound = match self.bind_self(this) {
            Ok(bound) => bound,
            Err(error) => {
                self.unwind(base);
                self.jump(resume);
                return Err(error);
            }
        };
        let result = self.run_nested(base, ret_slot.is_some());
        if let Some((slot, saved)) = bound {
            self.task_mut().var.replace(slot, saved)?;
        }
        match result {
            Ok(()) if ret_slot.is_some() => self.take_return(),
            Ok(()) => Ok(Val::Nil),
            Err(error) => {
                self.jump(resume);
                Err(error)
            }
        }
    }

    /// Point the program's `SELF` slot at the map a method was called
    /// through. Returns what to put back afterwards.
    fn bind_self(&mut self, this: Option<&VarRef>) -> Result<Option<(SlotId, VarRef)>> {
        let slot = match self.task().program.self_slot() {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let this = match this {
            Some(this) => Val::Ref(Rc::downgrade(this)),
            None => return Ok(None),
        };
        let saved = self.task_mut().var.replace(slot, Cell::new(this))?;
        Ok(Some((slot, saved)))
    }

    /// Call a routine exported by another task. Arguments are evaluated
    /// by the caller; the frames land on the callee's stack.
    fn call_unit(
        &mut self,
        task: TaskId,
        addr: Address,
        ret_slot: Option<SlotId>,
        exprs: &[Expr],
    ) -> Result<Val> {
        if task == self.active {
            return self.call_udp(addr, ret_slot, exprs, None);
        }
        if task >= self.tasks.len() {
            return Err(error!(IllegalFunctionCall; "NO SUCH TASK"));
        }
        let args = self.make_args(exprs)?;
        let caller = self.active;
        self.switch(task);
        let resume = self.task().ip;
        let result = self.enter_unit(args, addr, ret_slot);
        self.jump(resume);
        self.switch(caller);
        result
    }

    fn enter_unit(
        &mut self,
        args: Vec<Arg>,
        addr: Address,
        ret_slot: Option<SlotId>,
    ) -> Result<Val> {
        let base = self.task().stack.len();
        let argc = args.len();
        self.push_args(args, base)?;
        if let Err(error) = self.push_call(argc, ret_slot) {
            self.unwind(base);
            return Err(error);
        }
        self.jump(addr);
        self.run_nested(base, ret_slot.is_some())?;
        match ret_slot {
            Some(_) => self.take_return(),
            None => Ok(Val::Nil),
        }
    }

    /// Call whatever a cell holds: a function pointer or a host callback.
    pub(super) fn call_value(
        &mut self,
        target: &VarRef,
        this: Option<&VarRef>,
        exprs: &[Expr],
    ) -> Result<Val> {
        let val = target.borrow().val.clone();
        match val {
            Val::Ptr(ptr) => self.call_udp(ptr.addr, ptr.ret_slot, exprs, this),
            Val::Func(func) => {
                let mut args = self.make_args(exprs)?;
                let mut out = Val::Nil;
                if (func.0)(this, &mut args, &mut out) {
                    return Ok(out);
                }
                let message = match &out {
                    Val::Str(s) => s.as_str().to_string(),
                    _ => "Unspecified error calling FUNC".to_string(),
                };
                Err(error!(ModuleError; &message))
            }
            Val::Ref(weak) => match weak.upgrade() {
                Some(cell) => {
                    let cell = follow(cell)?;
                    self.call_value(&cell, this, exprs)
                }
                None => Err(error!(TypeMismatch; "NOT CALLABLE")),
            },
            _ => Err(error!(TypeMismatch; "NOT CALLABLE")),
        }
    }

    pub(super) fn call_plugin(
        &mut self,
        module: ModuleId,
        kind: CallKind,
        index: usize,
        exprs: &[Expr],
    ) -> Result<Val> {
        let mut args = self.make_args(exprs)?;
        let mut out = Val::Nil;
        self.plugins
            .invoke(module, kind, index, &mut args, &mut out)?;
        Ok(out)
    }

    /// Callee prologue: bind each pushed argument to its parameter slot.
    pub(super) fn param(&mut self, decls: &[ParamDecl]) -> Result<()> {
        let Task { stack, var, .. } = self.task_mut();
        let argc = match stack.last() {
            Some(Frame::Call(call)) => call.argc,
            _ => return Err(error!(InternalError; "PARAM WITHOUT CALL")),
        };
        if stack.len() <= argc {
            return Err(mismatch());
        }
        if argc != decls.len() {
            let message = format!("EXPECTED {}, GOT {}", decls.len(), argc);
            return Err(error!(ArgumentCount; &message));
        }
        let first = stack.len() - 1 - argc;
        for (i, decl) in decls.iter().enumerate() {
            match stack.get(first + i) {
                Some(Frame::Param(arg)) => {
                    if decl.by_ref && !arg.is_by_ref() {
                        let message = format!("PARAMETER {}", i + 1);
                        return Err(error!(ByRefRequired; &message));
                    }
                }
                _ => return Err(mismatch()),
            }
        }
        for (i, decl) in decls.iter().enumerate() {
            let frame = match stack.get_mut(first + i) {
                Some(frame) => frame,
                None => return Err(mismatch()),
            };
            let cell = match frame {
                Frame::Param(Arg::Flexible(cell)) if decl.by_ref => Rc::clone(cell),
                Frame::Param(Arg::Flexible(cell)) => {
                    let val = cell.borrow().val.clone();
                    Cell::new(val)
                }
                Frame::Param(Arg::Value(val)) => Cell::new(val.take()),
                _ => return Err(mismatch()),
            };
            let slot = decl.slot;
            let saved = var.replace(slot, cell)?;
            *frame = if decl.by_ref {
                Frame::ByRef { slot, saved }
            } else {
                Frame::Local { slot, saved }
            };
        }
        Ok(())
    }

    pub(super) fn local(&mut self, slots: &[SlotId]) -> Result<()> {
        for &slot in slots {
            let saved = self.task_mut().var.replace(slot, Cell::new(Val::Nil))?;
            let frame = Frame::Local {
                slot,
                saved: Rc::clone(&saved),
            };
            if let Err(error) = self.push(frame) {
                self.task_mut().var.replace(slot, saved)?;
                return Err(error);
            }
        }
        Ok(())
    }

    /// Early function exit: close whatever the body left open and go to
    /// the epilogue.
    pub(super) fn func_return(&mut self, addr: Address) -> Result<()> {
        loop {
            let scoped = match self.task().stack.last() {
                Some(frame) => frame.is_call_scope(),
                None => return Err(mismatch()),
            };
            if scoped {
                break;
            }
            let frame = self.task_mut().stack.pop()?;
            self.release(frame);
        }
        self.jump(addr);
        Ok(())
    }

    pub(super) fn proc_return(&mut self) -> Result<()> {
        let call = loop {
            match self.task_mut().stack.pop() {
                Ok(Frame::Call(call)) => break call,
                Ok(frame @ Frame::Local { .. }) | Ok(frame @ Frame::ByRef { .. }) => {
                    self.release(frame)
                }
                _ => return Err(mismatch()),
            }
        };
        for _ in 0..call.argc {
            match self.task_mut().stack.pop() {
                Ok(frame) if frame.is_call_scope() => self.release(frame),
                _ => return Err(mismatch()),
            }
        }
        if let Some((slot, saved)) = call.ret {
            let cell = self.task_mut().var.replace(slot, saved)?;
            let val = cell.borrow_mut().val.take();
            self.push(Frame::Return(val))?;
        }
        self.jump(call.ret_ip);
        Ok(())
    }
}
