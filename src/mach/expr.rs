use super::{Address, ModuleId, SlotId, TaskId, Val};
use std::rc::Rc;

/// ## Expressions
///
/// Instructions carry small expression trees instead of pushing
/// operands on a value stack. Addresses inside them are labels until
/// the program is linked.

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Val),
    /// Value of a variable, element or field.
    Var(Place),
    /// Non-owning reference to a variable.
    Ref(Place),
    Unary(Op, Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Map(Vec<(Rc<str>, Expr)>),
    FuncPtr {
        target: Address,
        ret_slot: Option<SlotId>,
    },
    Call(Call),
    Plugin {
        module: ModuleId,
        index: usize,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Neg,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    DivInt,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub target: CallTarget,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum CallTarget {
    /// User routine in the current task. Functions name the slot their
    /// result is assigned to.
    Direct {
        addr: Address,
        ret_slot: Option<SlotId>,
    },
    /// User routine exported by another task.
    Unit {
        task: TaskId,
        addr: Address,
        ret_slot: Option<SlotId>,
    },
    /// Whatever function pointer or native callback a variable holds.
    Indirect(Place),
}

/// L-value path: a slot followed by subscripts and field names.
#[derive(Debug, Clone)]
pub struct Place {
    pub slot: SlotId,
    pub path: Vec<Selector>,
}

#[derive(Debug, Clone)]
pub enum Selector {
    /// Array subscripts, map key, or call arguments when the value is
    /// callable.
    Index(Vec<Expr>),
    Field(Rc<str>),
}

impl Place {
    pub fn var(slot: SlotId) -> Place {
        Place { slot, path: vec![] }
    }
    pub fn index(mut self, indices: Vec<Expr>) -> Place {
        self.path.push(Selector::Index(indices));
        self
    }
    pub fn field(mut self, name: &str) -> Place {
        self.path.push(Selector::Field(name.into()));
        self
    }
    pub fn is_bare(&self) -> bool {
        self.path.is_empty()
    }

    pub(super) fn targets_mut(&mut self, f: &mut dyn FnMut(&mut Address)) {
        for selector in self.path.iter_mut() {
            if let Selector::Index(exprs) = selector {
                for expr in exprs.iter_mut() {
                    expr.targets_mut(f);
                }
            }
        }
    }
}

impl Expr {
    pub fn int(n: i64) -> Expr {
        Expr::Literal(Val::Int(n))
    }
    pub fn real(n: f64) -> Expr {
        Expr::Literal(Val::Real(n))
    }
    pub fn str(s: &str) -> Expr {
        Expr::Literal(Val::literal(s))
    }
    pub fn var(slot: SlotId) -> Expr {
        Expr::Var(Place::var(slot))
    }
    pub fn unary(op: Op, expr: Expr) -> Expr {
        Expr::Unary(op, Box::new(expr))
    }
    pub fn binary(op: Op, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }
    pub fn call(addr: Address, ret_slot: SlotId, args: Vec<Expr>) -> Expr {
        Expr::Call(Call {
            target: CallTarget::Direct {
                addr,
                ret_slot: Some(ret_slot),
            },
            args,
        })
    }

    pub(super) fn targets_mut(&mut self, f: &mut dyn FnMut(&mut Address)) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(place) | Expr::Ref(place) => place.targets_mut(f),
            Expr::Unary(_, expr) => expr.targets_mut(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.targets_mut(f);
                rhs.targets_mut(f);
            }
            Expr::Array(items) | Expr::Plugin { args: items, .. } => {
                for item in items.iter_mut() {
                    item.targets_mut(f);
                }
            }
            Expr::Map(pairs) => {
                for (_, item) in pairs.iter_mut() {
                    item.targets_mut(f);
                }
            }
            Expr::FuncPtr { target, .. } => f(target),
            Expr::Call(call) => call.targets_mut(f),
        }
    }
}

impl Call {
    pub(super) fn targets_mut(&mut self, f: &mut dyn FnMut(&mut Address)) {
        match &mut self.target {
            CallTarget::Direct { addr, .. } => f(addr),
            // Another task's addresses are linked with that task.
            CallTarget::Unit { .. } => {}
            CallTarget::Indirect(place) => place.targets_mut(f),
        }
        for arg in self.args.iter_mut() {
            arg.targets_mut(f);
        }
    }
}
