use super::val::follow;
use super::{
    assign, Address, Expr, ExitKind, ForFrame, ForHead, ForIter, ForSource, Frame, LoopKind,
    Opcode, Operation, Place, Runtime, Val,
};
use crate::error;
use crate::lang::{Error, ErrorCode};
use std::cmp::Ordering;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

fn in_range(value: &Val, limit: &Val, step_sign: i32) -> Result<bool> {
    let ord = value.compare(limit)?;
    Ok(if step_sign < 0 {
        ord != Ordering::Less
    } else {
        ord != Ordering::Greater
    })
}

fn numeric(val: Val, what: &str) -> Result<Val> {
    if val.is_numeric() {
        Ok(val)
    } else {
        Err(error!(TypeMismatch; what))
    }
}

impl Runtime {
    /// Pop a frame opened inside the current routine. Reaching the
    /// routine's own frames means the closer has no opener.
    fn pop_scoped(&mut self, code: ErrorCode, what: &str) -> Result<Frame> {
        let frame = match self.task_mut().stack.pop() {
            Ok(frame) => frame,
            Err(_) => return Err(Error::new(code).message(what)),
        };
        if frame.is_call_scope() {
            self.push(frame)?;
            return Err(Error::new(code).message(what));
        }
        Ok(frame)
    }

    fn pop_if(&mut self, what: &str) -> Result<bool> {
        loop {
            match self.pop_scoped(ErrorCode::EndIfWithoutIf, what)? {
                Frame::If { cond } => return Ok(cond),
                frame => self.release(frame),
            }
        }
    }

    fn pop_loop(&mut self, kind: LoopKind, code: ErrorCode, what: &str) -> Result<()> {
        loop {
            match self.pop_scoped(code, what)? {
                Frame::Loop { kind: k, .. } if k == kind => return Ok(()),
                frame => self.release(frame),
            }
        }
    }

    pub(super) fn r#if(&mut self, cond: &Expr, false_ip: Address) -> Result<()> {
        let cond = self.eval(cond)?.is_true();
        self.push(Frame::If { cond })?;
        if !cond {
            self.jump(false_ip);
        }
        Ok(())
    }

    pub(super) fn elif(&mut self, cond: &Expr, false_ip: Address) -> Result<()> {
        if self.pop_if("ELIF")? {
            self.push(Frame::If { cond: true })?;
            self.jump(false_ip);
            return Ok(());
        }
        self.r#if(cond, false_ip)
    }

    pub(super) fn r#else(&mut self, end_ip: Address) -> Result<()> {
        let taken = self.pop_if("ELSE")?;
        self.push(Frame::If { cond: true })?;
        if taken {
            self.jump(end_ip);
        }
        Ok(())
    }

    pub(super) fn end_if(&mut self) -> Result<()> {
        self.pop_if("END IF")?;
        Ok(())
    }

    pub(super) fn r#for(&mut self, var: &Place, head: &ForHead, exit_ip: Address) -> Result<()> {
        let for_ip = self.task().ip - 1;
        match head {
            ForHead::To { from, to, step } => {
                let start = numeric(self.eval(from)?, "FOR START")?;
                let limit = numeric(self.eval(to)?, "FOR LIMIT")?;
                let step = match step {
                    Some(step) => numeric(self.eval(step)?, "FOR STEP")?,
                    None => Val::Int(1),
                };
                let step_sign = step.sign()?;
                if step_sign == 0 {
                    return Err(error!(IllegalFunctionCall; "FOR STEP ZERO"));
                }
                let cell = self.resolve(var, true)?;
                assign(&cell, start.clone())?;
                if in_range(&start, &limit, step_sign)? {
                    self.push(Frame::For(ForFrame {
                        var: cell,
                        for_ip,
                        exit_ip,
                        iter: ForIter::To { step_sign },
                    }))?;
                } else {
                    self.jump(exit_ip);
                }
            }
            ForHead::In(expr) => {
                let source = match expr {
                    Expr::Var(place) => {
                        let cell = follow(self.resolve(place, false)?)?;
                        let iterable = matches!(
                            cell.borrow().val,
                            Val::Array(_) | Val::Map(_) | Val::Str(_)
                        );
                        if !iterable {
                            return Err(error!(TypeMismatch; "FOR IN"));
                        }
                        ForSource::Borrowed(cell)
                    }
                    _ => match self.eval(expr)? {
                        val @ Val::Array(_) | val @ Val::Map(_) | val @ Val::Str(_) => {
                            ForSource::Owned(val)
                        }
                        _ => return Err(error!(TypeMismatch; "FOR IN")),
                    },
                };
                let cell = self.resolve(var, true)?;
                match source.element(0) {
                    Some(first) => {
                        assign(&cell, first)?;
                        self.push(Frame::For(ForFrame {
                            var: cell,
                            for_ip,
                            exit_ip,
                            iter: ForIter::In { source, cursor: 0 },
                        }))?;
                    }
                    None => self.jump(exit_ip),
                }
            }
        }
        Ok(())
    }

    /// Advance the innermost loop. Limit and step are evaluated again
    /// from the `For` instruction on every pass.
    pub(super) fn next(&mut self) -> Result<()> {
        let mut frame = loop {
            match self.pop_scoped(ErrorCode::NextWithoutFor, "NEXT")? {
                Frame::For(frame) => break frame,
                frame => self.release(frame),
            }
        };
        let again = match &mut frame.iter {
            ForIter::To { step_sign } => {
                let program = Rc::clone(&self.task().program);
                let (to, step) = match program.op(frame.for_ip) {
                    Some(Opcode::For {
                        head: ForHead::To { to, step, .. },
                        ..
                    }) => (to, step),
                    _ => return Err(error!(InternalError; "NEXT LOST ITS FOR")),
                };
                let limit = numeric(self.eval(to)?, "FOR LIMIT")?;
                let step = match step {
                    Some(step) => numeric(self.eval(step)?, "FOR STEP")?,
                    None => Val::Int(1),
                };
                let current = frame.var.borrow().val.clone();
                let value = Operation::sum(current, step)?;
                assign(&frame.var, value.clone())?;
                in_range(&value, &limit, *step_sign)?
            }
            ForIter::In { source, cursor } => {
                *cursor += 1;
                match source.element(*cursor) {
                    Some(val) => {
                        assign(&frame.var, val)?;
                        true
                    }
                    None => false,
                }
            }
        };
        if again {
            let body = frame.for_ip + 1;
            self.push(Frame::For(frame))?;
            self.jump(body);
        }
        Ok(())
    }

    pub(super) fn r#while(&mut self, cond: &Expr, exit_ip: Address) -> Result<()> {
        if self.eval(cond)?.is_true() {
            self.push(Frame::Loop {
                kind: LoopKind::While,
                exit_ip,
            })
        } else {
            self.jump(exit_ip);
            Ok(())
        }
    }

    pub(super) fn wend(&mut self, loop_ip: Address) -> Result<()> {
        self.pop_loop(LoopKind::While, ErrorCode::WendWithoutWhile, "WEND")?;
        self.jump(loop_ip);
        Ok(())
    }

    pub(super) fn repeat(&mut self, exit_ip: Address) -> Result<()> {
        self.push(Frame::Loop {
            kind: LoopKind::Repeat,
            exit_ip,
        })
    }

    pub(super) fn until(&mut self, cond: &Expr, loop_ip: Address) -> Result<()> {
        self.pop_loop(LoopKind::Repeat, ErrorCode::UntilWithoutRepeat, "UNTIL")?;
        if !self.eval(cond)?.is_true() {
            self.jump(loop_ip);
        }
        Ok(())
    }

    pub(super) fn gosub(&mut self, addr: Address) -> Result<()> {
        let ret_ip = self.task().ip;
        self.push(Frame::Gosub { ret_ip })?;
        self.jump(addr);
        Ok(())
    }

    pub(super) fn r#return(&mut self) -> Result<()> {
        loop {
            match self.pop_scoped(ErrorCode::ReturnWithoutGosub, "RETURN")? {
                Frame::Gosub { ret_ip } => {
                    self.jump(ret_ip);
                    return Ok(());
                }
                frame => self.release(frame),
            }
        }
    }

    pub(super) fn on(&mut self, selector: &Expr, targets: &[Address], gosub: bool) -> Result<()> {
        let index = self.eval(selector)?.to_int()?;
        if index < 0 {
            return Err(error!(IllegalFunctionCall; "ON INDEX"));
        }
        let addr = match targets.get((index as usize).wrapping_sub(1)) {
            Some(addr) if index > 0 => *addr,
            _ => return Ok(()),
        };
        if gosub {
            self.gosub(addr)
        } else {
            self.jump(addr);
            Ok(())
        }
    }

    pub(super) fn select(&mut self, subject: &Expr) -> Result<()> {
        let subject = self.eval(subject)?;
        self.push(Frame::Select {
            subject,
            matched: false,
        })
    }

    fn select_matched(&self) -> Result<bool> {
        match self.task().stack.last() {
            Some(Frame::Select { matched, .. }) => Ok(*matched),
            _ => Err(error!(CaseWithoutSelect)),
        }
    }

    pub(super) fn case(&mut self, candidates: &[Expr], false_ip: Address) -> Result<()> {
        if self.select_matched()? {
            self.jump(false_ip);
            return Ok(());
        }
        for candidate in candidates {
            let val = self.eval(candidate)?;
            let hit = match self.task_mut().stack.last_mut() {
                Some(Frame::Select { subject, matched }) => {
                    *matched = subject.compare(&val)? == Ordering::Equal;
                    *matched
                }
                _ => return Err(error!(CaseWithoutSelect)),
            };
            if hit {
                return Ok(());
            }
        }
        self.jump(false_ip);
        Ok(())
    }

    pub(super) fn case_else(&mut self, false_ip: Address) -> Result<()> {
        if self.select_matched()? {
            self.jump(false_ip);
        }
        Ok(())
    }

    pub(super) fn end_select(&mut self) -> Result<()> {
        loop {
            match self.pop_scoped(ErrorCode::CaseWithoutSelect, "END SELECT")? {
                Frame::Select { .. } => return Ok(()),
                frame => self.release(frame),
            }
        }
    }

    pub(super) fn r#try(&mut self, catch_ip: Address) -> Result<()> {
        self.push(Frame::Try { catch_ip })
    }

    /// Reached only by falling out of the try block.
    pub(super) fn catch(&mut self, end_ip: Address) -> Result<()> {
        loop {
            match self.pop_scoped(ErrorCode::CatchWithoutTry, "CATCH")? {
                Frame::Try { .. } => break,
                frame => self.release(frame),
            }
        }
        self.jump(end_ip);
        Ok(())
    }

    pub(super) fn end_try(&mut self) {
        if let Some(Frame::Catch) = self.task().stack.last() {
            let _ = self.task_mut().stack.pop();
        }
    }

    pub(super) fn throw(&mut self, expr: &Expr) -> Error {
        match self.eval(expr) {
            Ok(val) => error!(UserError; &val.to_string()),
            Err(error) => error,
        }
    }

    /// Leave the innermost construct of `kind`, cleaning up every frame
    /// on the way. Leaving a routine runs the normal return path.
    pub(super) fn exit(&mut self, kind: ExitKind) -> Result<()> {
        use ExitKind::*;
        loop {
            let frame = match self.task_mut().stack.pop() {
                Ok(frame) => frame,
                Err(_) => return Err(error!(ExitWithoutBlock)),
            };
            match frame {
                Frame::For(f) if kind == Any || kind == For => {
                    self.jump(f.exit_ip);
                    return Ok(());
                }
                Frame::Loop { exit_ip, .. } if kind == Any || kind == Loop => {
                    self.jump(exit_ip);
                    return Ok(());
                }
                Frame::Gosub { ret_ip } if kind == Any => {
                    self.jump(ret_ip);
                    return Ok(());
                }
                frame if frame.is_call_scope() => {
                    self.push(frame)?;
                    return match kind {
                        Any | Proc | Func => self.proc_return(),
                        For => Err(error!(ExitWithoutBlock; "EXIT FOR")),
                        Loop => Err(error!(ExitWithoutBlock; "EXIT LOOP")),
                    };
                }
                frame => self.release(frame),
            }
        }
    }
}
