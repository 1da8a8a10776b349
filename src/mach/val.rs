use super::{Address, Arg, Array, Map, SlotId};
use crate::error;
use crate::lang::Error;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

type Result<T> = std::result::Result<T, Error>;

/// Every variable, array element and map field lives in its own cell.
pub type VarRef = Rc<RefCell<Cell>>;

#[derive(Debug, Default)]
pub struct Cell {
    pub val: Val,
    pub constant: bool,
}

impl Cell {
    pub fn new(val: Val) -> VarRef {
        Rc::new(RefCell::new(Cell {
            val,
            constant: false,
        }))
    }
}

/// ## Runtime values
///
/// Strings distinguish an owned buffer from a shared literal. Cloning an
/// owned string copies it; cloning a shared one only bumps a count and
/// the first write makes a private copy. Arrays and maps always own
/// their cells and clone deeply. A `Ref` never owns its target.

#[derive(Clone)]
pub enum Val {
    Nil,
    Int(i64),
    Real(f64),
    Str(Text),
    Array(Array),
    Map(Map),
    Ref(Weak<RefCell<Cell>>),
    Ptr(FuncPtr),
    Func(NativeFn),
}

#[derive(Clone, Debug)]
pub enum Text {
    Owned(String),
    Shared(Rc<str>),
}

impl Text {
    pub fn as_str(&self) -> &str {
        match self {
            Text::Owned(s) => s,
            Text::Shared(s) => s,
        }
    }
    pub fn to_mut(&mut self) -> &mut String {
        if let Text::Shared(s) = self {
            *self = Text::Owned(s.to_string());
        }
        match self {
            Text::Owned(s) => s,
            Text::Shared(_) => unreachable!(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuncPtr {
    pub addr: Address,
    pub ret_slot: Option<SlotId>,
}

/// Host callback reachable through an indirect call. Receives the map
/// it was called through, the argument table and the output value.
#[derive(Clone)]
pub struct NativeFn(pub Rc<dyn Fn(Option<&VarRef>, &mut [Arg], &mut Val) -> bool>);

impl NativeFn {
    pub fn new<F>(f: F) -> NativeFn
    where
        F: Fn(Option<&VarRef>, &mut [Arg], &mut Val) -> bool + 'static,
    {
        NativeFn(Rc::new(f))
    }
}

impl Default for Val {
    fn default() -> Val {
        Val::Nil
    }
}

impl From<i64> for Val {
    fn from(n: i64) -> Val {
        Val::Int(n)
    }
}

impl From<f64> for Val {
    fn from(n: f64) -> Val {
        Val::Real(n)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Val {
        Val::Str(Text::Owned(s.to_string()))
    }
}

impl From<String> for Val {
    fn from(s: String) -> Val {
        Val::Str(Text::Owned(s))
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Val {
        Val::Int(if b { 1 } else { 0 })
    }
}

impl Val {
    /// String literal embedded in a program; shares storage until written.
    pub fn literal(s: &str) -> Val {
        Val::Str(Text::Shared(s.into()))
    }

    /// Release owned storage. Safe to call twice.
    pub fn free(&mut self) {
        *self = Val::Nil;
    }

    /// Transfer ownership out, leaving Nil behind.
    pub fn take(&mut self) -> Val {
        std::mem::take(self)
    }

    /// Assignment: the destination takes the source's type and a deep
    /// copy of its contents.
    pub fn set(&mut self, src: &Val) {
        *self = src.clone();
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Real(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Val::Ptr(_) | Val::Func(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Nil => "NIL",
            Val::Int(_) => "INTEGER",
            Val::Real(_) => "REAL",
            Val::Str(_) => "STRING",
            Val::Array(_) => "ARRAY",
            Val::Map(_) => "MAP",
            Val::Ref(_) => "REF",
            Val::Ptr(_) => "FUNCPTR",
            Val::Func(_) => "FUNC",
        }
    }

    /// Follow a reference to the value it names. A reference whose
    /// target is gone reads as Nil.
    pub fn deref(&self) -> Result<Val> {
        match self {
            Val::Ref(weak) => match weak.upgrade() {
                Some(cell) => {
                    let target = follow(cell)?;
                    let val = target.borrow().val.clone();
                    Ok(val)
                }
                None => Ok(Val::Nil),
            },
            _ => Ok(self.clone()),
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Val::Nil => false,
            Val::Int(n) => *n != 0,
            Val::Real(n) => *n != 0.0,
            Val::Str(s) => !s.as_str().is_empty(),
            Val::Array(a) => !a.is_empty(),
            Val::Map(m) => !m.is_empty(),
            Val::Ref(w) => w.upgrade().map_or(false, |c| c.borrow().val.is_true()),
            Val::Ptr(_) | Val::Func(_) => true,
        }
    }

    /// Numeric view of a value. Strings that do not parse are zero.
    pub fn to_number(&self) -> Result<Val> {
        match self {
            Val::Nil => Ok(Val::Int(0)),
            Val::Int(_) | Val::Real(_) => Ok(self.clone()),
            Val::Str(s) => Ok(parse_number(s.as_str()).unwrap_or(Val::Int(0))),
            Val::Ref(_) => self.deref()?.to_number(),
            Val::Ptr(p) => Ok(Val::Int(p.addr as i64)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn to_int(&self) -> Result<i64> {
        match self.to_number()? {
            Val::Int(n) => Ok(n),
            Val::Real(n) => {
                if n.is_finite() && n >= i64::min_value() as f64 && n <= i64::max_value() as f64 {
                    Ok(n.trunc() as i64)
                } else {
                    Err(error!(Overflow))
                }
            }
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn to_real(&self) -> Result<f64> {
        match self.to_number()? {
            Val::Int(n) => Ok(n as f64),
            Val::Real(n) => Ok(n),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// -1, 0 or 1 for numbers.
    pub fn sign(&self) -> Result<i32> {
        match self {
            Val::Int(n) => Ok(n.signum() as i32),
            Val::Real(n) if *n > 0.0 => Ok(1),
            Val::Real(n) if *n < 0.0 => Ok(-1),
            Val::Real(_) => Ok(0),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// Ordering between two values. Numbers compare numerically and
    /// strings lexically. Arrays and maps compare element by element;
    /// when every shared element is equal the longer one is greater.
    pub fn compare(&self, other: &Val) -> Result<Ordering> {
        use Val::*;
        match (self, other) {
            (Ref(_), _) => self.deref()?.compare(other),
            (_, Ref(_)) => self.compare(&other.deref()?),
            (Nil, Nil) => Ok(Ordering::Equal),
            (Int(l), Int(r)) => Ok(l.cmp(r)),
            (Int(l), Real(r)) => Ok(compare_real(*l as f64, *r)),
            (Real(l), Int(r)) => Ok(compare_real(*l, *r as f64)),
            (Real(l), Real(r)) => Ok(compare_real(*l, *r)),
            (Str(l), Str(r)) => Ok(l.as_str().cmp(r.as_str())),
            (Array(l), Array(r)) => {
                for (lc, rc) in l.iter().zip(r.iter()) {
                    let ord = lc.borrow().val.compare(&rc.borrow().val)?;
                    if ord != Ordering::Equal {
                        return Ok(ord);
                    }
                }
                Ok(l.len().cmp(&r.len()))
            }
            (Map(l), Map(r)) => {
                for ((lk, lc), (rk, rc)) in l.iter().zip(r.iter()) {
                    let ord = lk.cmp(rk);
                    if ord != Ordering::Equal {
                        return Ok(ord);
                    }
                    let ord = lc.borrow().val.compare(&rc.borrow().val)?;
                    if ord != Ordering::Equal {
                        return Ok(ord);
                    }
                }
                Ok(l.len().cmp(&r.len()))
            }
            (Ptr(l), Ptr(r)) => Ok(l.addr.cmp(&r.addr)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    fn write_nested(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Val::Str(s) => write!(f, "\"{}\"", s.as_str()),
            _ => write!(f, "{}", self),
        }
    }
}

/// Walk a chain of references starting at `cell` and return the first
/// cell that holds something other than a live reference.
pub fn follow(cell: VarRef) -> Result<VarRef> {
    let mut seen: Vec<VarRef> = vec![];
    let mut cell = cell;
    loop {
        let next = match &cell.borrow().val {
            Val::Ref(weak) => weak.upgrade(),
            _ => None,
        };
        match next {
            Some(next) => {
                if Rc::ptr_eq(&next, &cell) || seen.iter().any(|c| Rc::ptr_eq(c, &next)) {
                    return Err(error!(CircularReference));
                }
                seen.push(std::mem::replace(&mut cell, next));
            }
            None => return Ok(cell),
        }
    }
}

fn compare_real(l: f64, r: f64) -> Ordering {
    l.partial_cmp(&r).unwrap_or(Ordering::Equal)
}

/// Parse a complete string as a number, integer first.
pub fn parse_number(s: &str) -> Option<Val> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Val::Int(n));
    }
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(Val::Real(n)),
        _ => None,
    }
}

impl std::fmt::Debug for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Nil => write!(f, "Nil"),
            Val::Int(n) => write!(f, "Int({})", n),
            Val::Real(n) => write!(f, "Real({})", n),
            Val::Str(s) => write!(f, "Str({:?})", s.as_str()),
            Val::Array(a) => write!(f, "Array({})", Val::Array(a.clone())),
            Val::Map(m) => write!(f, "Map({})", Val::Map(m.clone())),
            Val::Ref(w) => write!(f, "Ref(live={})", w.upgrade().is_some()),
            Val::Ptr(p) => write!(f, "Ptr({})", p.addr),
            Val::Func(_) => write!(f, "Func"),
        }
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Val::Nil => Ok(()),
            Val::Int(n) => write!(f, "{}", n),
            Val::Real(n) => write!(f, "{}", n),
            Val::Str(s) => write!(f, "{}", s.as_str()),
            Val::Array(a) => {
                write!(f, "[")?;
                for (i, cell) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    cell.borrow().val.write_nested(f)?;
                }
                write!(f, "]")
            }
            Val::Map(m) => {
                write!(f, "{{")?;
                for (i, (key, cell)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{}\":", key)?;
                    cell.borrow().val.write_nested(f)?;
                }
                write!(f, "}}")
            }
            Val::Ref(w) => match w.upgrade() {
                Some(cell) => match follow(cell) {
                    Ok(cell) => write!(f, "{}", cell.borrow().val),
                    Err(_) => Ok(()),
                },
                None => Ok(()),
            },
            Val::Ptr(p) => write!(f, "{}", p.addr),
            Val::Func(_) => write!(f, "FUNC"),
        }
    }
}
