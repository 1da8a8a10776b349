use super::{
    Address, CallKind, Device, Frame, NullDevice, Opcode, Options, Plugins, Program, SlotId,
    Stack, TaskId, Val, Var, VarRef,
};
use crate::error;
use crate::lang::{Error, ErrorCode};
use std::rc::Rc;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, Error>;

/// ## Execution context
///
/// Each task runs its own program with its own cursor, frame stack and
/// variables. Only one is active at a time.

pub struct Task {
    pub(super) program: Rc<Program>,
    pub(super) ip: Address,
    /// Next `READ` position.
    pub(super) data_pos: usize,
    pub(super) stack: Stack<Frame>,
    pub(super) var: Var,
}

impl Task {
    fn new(program: Program, options: &Options) -> Task {
        let var = Var::new(program.slots());
        Task {
            program: Rc::new(program),
            ip: 0,
            data_pos: 0,
            stack: Stack::with_limit("STACK OVERFLOW", options.stack_limit),
            var,
        }
    }
}

/// Returned by [`Runtime::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Stopped,
    Running,
    Error(Error),
    Break,
}

/// ## Virtual machine

pub struct Runtime {
    pub(super) tasks: Vec<Task>,
    pub(super) active: TaskId,
    pub(super) plugins: Plugins,
    pub(super) device: Box<dyn Device>,
    pub(super) options: Options,
    pub(super) depth: usize,
    stopped: bool,
    pending: Vec<Error>,
}

impl Runtime {
    pub fn new(program: Program) -> Runtime {
        Runtime::with_device(program, Box::new(NullDevice))
    }

    pub fn with_device(program: Program, device: Box<dyn Device>) -> Runtime {
        Runtime::with_options(program, device, Options::default())
    }

    /// Programs that fail to link report their errors from the first
    /// call to `execute` and never run. Modules on `options.module_path`
    /// are loaded before anything else registers.
    pub fn with_options(mut program: Program, device: Box<dyn Device>, options: Options) -> Runtime {
        let pending = match program.link() {
            Ok(()) => vec![],
            Err(errors) => errors,
        };
        let task = Task::new(program, &options);
        let mut plugins = Plugins::new();
        let loaded = plugins.scan(&options.module_path);
        if !loaded.is_empty() {
            info!(modules = loaded.len(), "modules loaded from search path");
        }
        Runtime {
            tasks: vec![task],
            active: 0,
            plugins,
            device,
            options,
            depth: 0,
            stopped: false,
            pending,
        }
    }

    /// Load another program as a unit whose routines other tasks call.
    pub fn add_task(&mut self, mut program: Program) -> std::result::Result<TaskId, Vec<Error>> {
        program.link()?;
        self.tasks.push(Task::new(program, &self.options));
        Ok(self.tasks.len() - 1)
    }

    pub fn plugins(&self) -> &Plugins {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut Plugins {
        &mut self.plugins
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Value held in a slot of the main task.
    pub fn fetch(&self, slot: SlotId) -> Result<Val> {
        self.fetch_in(0, slot)
    }

    pub fn fetch_in(&self, task: TaskId, slot: SlotId) -> Result<Val> {
        match self.tasks.get(task) {
            Some(task) => task.var.fetch(slot),
            None => Err(error!(IllegalFunctionCall; "NO SUCH TASK")),
        }
    }

    pub fn store(&mut self, slot: SlotId, val: Val) -> Result<()> {
        self.tasks[0].var.store(slot, val)
    }

    /// Cell currently bound to a slot of the main task.
    pub fn var_ref(&self, slot: SlotId) -> Result<VarRef> {
        self.tasks[0].var.get(slot)
    }

    /// Frames open on the active task.
    pub fn stack_len(&self) -> usize {
        self.task().stack.len()
    }

    pub fn execute(&mut self, cycles: usize) -> Event {
        if !self.pending.is_empty() {
            self.stopped = true;
            return Event::Error(self.pending.remove(0));
        }
        if self.stopped {
            return Event::Stopped;
        }
        for _ in 0..cycles {
            match self.step() {
                Ok(true) => {}
                Ok(false) => {
                    self.halt();
                    return Event::Stopped;
                }
                Err(error) => {
                    if let Err(error) = self.recover(error, 0) {
                        self.halt();
                        return Runtime::report(error);
                    }
                }
            }
        }
        Event::Running
    }

    fn report(error: Error) -> Event {
        if error.is(ErrorCode::Halt) {
            Event::Stopped
        } else if error.is(ErrorCode::Break) {
            info!("break");
            Event::Break
        } else {
            warn!(%error, "uncaught error");
            Event::Error(error)
        }
    }

    /// Unwind every task so all shadowed slots are restored.
    fn halt(&mut self) {
        self.stopped = true;
        for task in 0..self.tasks.len() {
            self.active = task;
            self.unwind(0);
        }
        self.active = 0;
        self.depth = 0;
    }

    pub(super) fn task(&self) -> &Task {
        &self.tasks[self.active]
    }

    pub(super) fn task_mut(&mut self) -> &mut Task {
        &mut self.tasks[self.active]
    }

    pub(super) fn switch(&mut self, task: TaskId) {
        debug!(from = self.active, to = task, "task switch");
        self.active = task;
    }

    pub(super) fn jump(&mut self, addr: Address) {
        self.task_mut().ip = addr;
    }

    pub(super) fn push(&mut self, frame: Frame) -> Result<()> {
        self.task_mut().stack.push(frame)
    }

    /// Undo what a frame did to the variable table. Everything else a
    /// frame owns is released when it drops.
    pub(super) fn release(&mut self, frame: Frame) {
        let var = &mut self.task_mut().var;
        let restored = match frame {
            Frame::Local { slot, saved } | Frame::ByRef { slot, saved } => var.replace(slot, saved),
            Frame::Call(call) => match call.ret {
                Some((slot, saved)) => var.replace(slot, saved),
                None => return,
            },
            _ => return,
        };
        if let Err(error) = restored {
            tracing::error!(%error, "slot restore failed");
        }
    }

    /// Pop frames with their compensations down to `len`.
    pub(super) fn unwind(&mut self, len: usize) {
        while self.task().stack.len() > len {
            match self.task_mut().stack.pop() {
                Ok(frame) => self.release(frame),
                Err(_) => break,
            }
        }
    }

    /// Run one instruction. `Ok(false)` means the program ended.
    pub(super) fn step(&mut self) -> Result<bool> {
        if self.device.poll_break() {
            return Err(error!(Break));
        }
        let program = Rc::clone(&self.task().program);
        let ip = self.task().ip;
        let op = match program.op(ip) {
            Some(op) => op,
            None => return Ok(false),
        };
        self.task_mut().ip = ip + 1;
        self.dispatch(op)
            .map_err(|e| e.in_line_number(program.line_number_for(ip)))
    }

    /// Route an error to the innermost Try frame above `base` or unwind
    /// to `base` and hand it back.
    pub(super) fn recover(&mut self, error: Error, base: usize) -> Result<()> {
        if error.is_fatal() {
            if !error.is(ErrorCode::Break) && !error.is(ErrorCode::Halt) {
                tracing::error!(%error, "fatal");
            }
            self.unwind(base);
            return Err(error);
        }
        let found = self
            .task()
            .stack
            .iter()
            .enumerate()
            .skip(base)
            .rev()
            .find_map(|(index, frame)| match frame {
                Frame::Try { catch_ip } => Some((index, *catch_ip)),
                _ => None,
            });
        let (index, catch_ip) = match found {
            Some(found) => found,
            None => {
                self.unwind(base);
                return Err(error);
            }
        };
        self.unwind(index);
        self.push(Frame::Catch)?;
        self.jump(catch_ip + 1);
        let program = Rc::clone(&self.task().program);
        if let Some(Opcode::Catch {
            var: Some(place), ..
        }) = program.op(catch_ip)
        {
            let text = if error.is(ErrorCode::UserError) {
                error.text().to_string()
            } else {
                error.to_string()
            };
            let cell = self.resolve(place, true)?;
            cell.borrow_mut().val = Val::from(text);
        }
        Ok(())
    }

    /// Run the active task until the call that starts at stack depth
    /// `base` has returned; with `value` its result frame is left on top.
    pub(super) fn run_nested(&mut self, base: usize, value: bool) -> Result<()> {
        if self.depth >= self.options.call_depth {
            self.unwind(base);
            return Err(error!(OutOfMemory; "CALL DEPTH"));
        }
        self.depth += 1;
        let result = loop {
            let len = self.task().stack.len();
            if len < base {
                break Err(error!(InternalError; "STACK MISMATCH"));
            }
            let done = if value {
                len == base + 1 && matches!(self.task().stack.last(), Some(Frame::Return(_)))
            } else {
                len == base
            };
            if done {
                break Ok(());
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => {
                    self.unwind(base);
                    break Err(error!(Halt));
                }
                Err(error) => {
                    if let Err(error) = self.recover(error, base) {
                        break Err(error);
                    }
                }
            }
        };
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, op: &Opcode) -> Result<bool> {
        use Opcode::*;
        match op {
            Let { place, expr } => self.r#let(place, expr, false)?,
            Const { place, expr } => self.r#let(place, expr, true)?,
            Dim {
                place,
                dims,
                preserve,
            } => self.dim(place, dims, *preserve)?,
            Append { place, items } => self.append(place, items)?,
            Insert {
                place,
                index,
                items,
            } => self.insert(place, index, items)?,
            Delete {
                place,
                index,
                count,
            } => self.delete(place, index, count.as_ref())?,
            Erase(places) => self.erase(places)?,
            Swap(a, b) => self.swap(a, b)?,
            Read(places) => self.read(places)?,
            Restore(pos) => self.task_mut().data_pos = *pos,
            Sort { place, using } => self.sort(place, using.as_ref())?,
            Search {
                place,
                key,
                result,
                using,
            } => self.search(place, key, result, using.as_ref())?,
            Split {
                text,
                delims,
                pairs,
                place,
                using,
            } => self.split(text, delims, pairs.as_ref(), place, using.as_ref())?,
            Join {
                place,
                delim,
                target,
            } => self.join(place, delim, target)?,

            Jump(addr) => self.jump(*addr),
            On {
                selector,
                targets,
                gosub,
            } => self.on(selector, targets, *gosub)?,
            If { cond, false_ip } => self.r#if(cond, *false_ip)?,
            Elif { cond, false_ip } => self.elif(cond, *false_ip)?,
            Else { end_ip } => self.r#else(*end_ip)?,
            EndIf => self.end_if()?,
            For { var, head, exit_ip } => self.r#for(var, head, *exit_ip)?,
            Next => self.next()?,
            While { cond, exit_ip } => self.r#while(cond, *exit_ip)?,
            Wend { loop_ip } => self.wend(*loop_ip)?,
            Repeat { exit_ip } => self.repeat(*exit_ip)?,
            Until { cond, loop_ip } => self.until(cond, *loop_ip)?,
            Gosub(addr) => self.gosub(*addr)?,
            Return => self.r#return()?,
            Select(expr) => self.select(expr)?,
            Case {
                candidates,
                false_ip,
            } => self.case(candidates, *false_ip)?,
            CaseElse { false_ip } => self.case_else(*false_ip)?,
            EndSelect => self.end_select()?,
            Try { catch_ip } => self.r#try(*catch_ip)?,
            Catch { end_ip, .. } => self.catch(*end_ip)?,
            EndTry => self.end_try(),
            Throw(expr) => return Err(self.throw(expr)),
            Exit(kind) => self.exit(*kind)?,
            End => return Ok(false),

            Call(call) => self.call_statement(call)?,
            Plugin {
                module,
                index,
                args,
            } => {
                self.call_plugin(*module, CallKind::Proc, *index, args)?;
            }
            Param(decls) => self.param(decls)?,
            Local(slots) => self.local(slots)?,
            FuncReturn(addr) => self.func_return(*addr)?,
            ProcReturn => self.proc_return()?,

            Print { target, items } => self.print(target, items)?,
            Input {
                source,
                prompt,
                places,
            } => self.input(source, prompt.as_ref(), places)?,
            Delay(expr) => self.delay(expr)?,
        }
        Ok(true)
    }
}
