#![allow(dead_code)]

use basic::lang::Error;
use basic::mach::*;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Device that records console output and replays canned input.
#[derive(Default)]
pub struct Capture {
    pub output: Rc<RefCell<String>>,
    pub log: Rc<RefCell<String>>,
    pub input: VecDeque<String>,
    pub break_after: Option<usize>,
    polls: usize,
}

impl Capture {
    pub fn new() -> Capture {
        Capture::default()
    }

    pub fn with_input(lines: &[&str]) -> Capture {
        let mut capture = Capture::default();
        capture.input = lines.iter().map(|s| s.to_string()).collect();
        capture
    }

    pub fn break_after(polls: usize) -> Capture {
        let mut capture = Capture::default();
        capture.break_after = Some(polls);
        capture
    }
}

impl Device for Capture {
    fn write(&mut self, text: &str, target: Target) -> Result<(), Error> {
        match target {
            Target::Console => self.output.borrow_mut().push_str(text),
            Target::Log => self.log.borrow_mut().push_str(text),
            _ => return Err(basic::error!(BadFileNumber)),
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut String, _target: Target) -> Result<bool, Error> {
        match self.input.pop_front() {
            Some(line) => {
                buf.push_str(&line);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn poll_break(&mut self) -> bool {
        self.polls += 1;
        match self.break_after {
            Some(limit) => self.polls >= limit,
            None => false,
        }
    }
}

pub fn runtime(program: Program) -> (Runtime, Rc<RefCell<String>>) {
    runtime_with(program, Capture::new())
}

pub fn runtime_with(program: Program, capture: Capture) -> (Runtime, Rc<RefCell<String>>) {
    let output = capture.output.clone();
    (Runtime::with_device(program, Box::new(capture)), output)
}

/// Run to completion. Uncaught errors and breaks are appended to the
/// output the way a console host would show them.
pub fn exec(runtime: &mut Runtime, output: &Rc<RefCell<String>>) -> String {
    for _ in 0..1000 {
        match runtime.execute(5000) {
            Event::Running => continue,
            Event::Stopped => break,
            Event::Error(error) => {
                output.borrow_mut().push_str(&format!("?{}\n", error));
                break;
            }
            Event::Break => {
                output.borrow_mut().push_str("BREAK\n");
                break;
            }
        }
    }
    let s = output.borrow().clone();
    s
}

pub fn run(ops: Vec<Opcode>, slots: usize) -> String {
    let (mut r, out) = runtime(Program::from_ops(ops, slots));
    exec(&mut r, &out)
}

// Instruction builders

pub fn int(n: i64) -> Expr {
    Expr::int(n)
}

pub fn var(slot: SlotId) -> Expr {
    Expr::var(slot)
}

pub fn bin(op: Op, lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(op, lhs, rhs)
}

pub fn set(slot: SlotId, expr: Expr) -> Opcode {
    Opcode::Let {
        place: Place::var(slot),
        expr,
    }
}

/// Print items back to back and end the line.
pub fn print(exprs: Vec<Expr>) -> Opcode {
    let len = exprs.len();
    let items = exprs
        .into_iter()
        .enumerate()
        .map(|(i, expr)| PrintItem {
            expr,
            sep: if i + 1 == len { Sep::None } else { Sep::Semicolon },
        })
        .collect();
    Opcode::Print {
        target: PrintTo::Console,
        items,
    }
}

/// Print one item without ending the line.
pub fn print_inline(expr: Expr) -> Opcode {
    Opcode::Print {
        target: PrintTo::Console,
        items: vec![PrintItem {
            expr,
            sep: Sep::Semicolon,
        }],
    }
}

pub fn for_to(slot: SlotId, from: Expr, to: Expr, step: Option<Expr>, exit_ip: Address) -> Opcode {
    Opcode::For {
        var: Place::var(slot),
        head: ForHead::To { from, to, step },
        exit_ip,
    }
}

pub fn call(addr: Address, args: Vec<Expr>) -> Opcode {
    Opcode::Call(Call {
        target: CallTarget::Direct {
            addr,
            ret_slot: None,
        },
        args,
    })
}

pub fn params(decls: &[(SlotId, bool)]) -> Opcode {
    Opcode::Param(
        decls
            .iter()
            .map(|&(slot, by_ref)| ParamDecl { slot, by_ref })
            .collect(),
    )
}
