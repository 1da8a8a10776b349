use super::val::follow;
use super::{
    Array, CallKind, Cell, Expr, FuncPtr, Map, Op, Operation, Place, Runtime, Selector, Val,
    VarRef,
};
use crate::error;
use crate::lang::Error;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// Store into a cell unless it is constant.
pub(super) fn assign(cell: &VarRef, val: Val) -> Result<()> {
    let mut cell = cell.borrow_mut();
    if cell.constant {
        return Err(error!(ConstantAssignment));
    }
    cell.val = val;
    Ok(())
}

fn binary(op: Op, lhs: Val, rhs: Val) -> Result<Val> {
    match op {
        Op::Add => Operation::sum(lhs, rhs),
        Op::Sub => Operation::subtract(lhs, rhs),
        Op::Mul => Operation::multiply(lhs, rhs),
        Op::Div => Operation::divide(lhs, rhs),
        Op::DivInt => Operation::divide_int(lhs, rhs),
        Op::Mod => Operation::modulus(lhs, rhs),
        Op::Pow => Operation::power(lhs, rhs),
        Op::Eq => Operation::equal(lhs, rhs),
        Op::NotEq => Operation::not_equal(lhs, rhs),
        Op::Lt => Operation::less(lhs, rhs),
        Op::LtEq => Operation::less_equal(lhs, rhs),
        Op::Gt => Operation::greater(lhs, rhs),
        Op::GtEq => Operation::greater_equal(lhs, rhs),
        Op::And => Operation::and(lhs, rhs),
        Op::Or => Operation::or(lhs, rhs),
        Op::Xor => Operation::xor(lhs, rhs),
        Op::Neg | Op::Not => Err(error!(InternalError; "NOT A BINARY OPERATOR")),
    }
}

fn field(cell: &VarRef, name: &str, create: bool) -> Result<VarRef> {
    let mut cell = cell.borrow_mut();
    if cell.val.is_nil() {
        if !create {
            return Ok(Cell::new(Val::Nil));
        }
        cell.val = Val::Map(Map::new());
    }
    match &mut cell.val {
        Val::Map(map) => Ok(if create {
            map.entry(name)
        } else {
            map.get(name).unwrap_or_else(|| Cell::new(Val::Nil))
        }),
        _ => Err(error!(TypeMismatch; "NOT A MAP")),
    }
}

fn element(cell: &VarRef, indices: &[Val], create: bool) -> Result<VarRef> {
    let mut cell = cell.borrow_mut();
    if cell.val.is_nil() && create {
        if let [key @ Val::Str(_)] = indices {
            let mut map = Map::new();
            let entry = map.entry(&key.to_string());
            cell.val = Val::Map(map);
            return Ok(entry);
        }
    }
    match &mut cell.val {
        Val::Array(array) => {
            let mut subscripts = Vec::with_capacity(indices.len());
            for index in indices {
                subscripts.push(index.to_int()?);
            }
            array.elem(&subscripts)
        }
        Val::Map(map) => {
            let key = match indices {
                [key] => key.to_string(),
                _ => return Err(error!(SubscriptOutOfRange; "ONE KEY EXPECTED")),
            };
            Ok(if create {
                map.entry(&key)
            } else {
                map.get(&key).unwrap_or_else(|| Cell::new(Val::Nil))
            })
        }
        _ => Err(error!(TypeMismatch; "NOT AN ARRAY")),
    }
}

impl Runtime {
    pub(super) fn eval(&mut self, expr: &Expr) -> Result<Val> {
        match expr {
            Expr::Literal(val) => Ok(val.clone()),
            Expr::Var(place) => {
                let cell = self.resolve(place, false)?;
                let val = cell.borrow().val.clone();
                val.deref()
            }
            Expr::Ref(place) => {
                let cell = self.resolve(place, true)?;
                Ok(Val::Ref(Rc::downgrade(&cell)))
            }
            Expr::Unary(op, expr) => {
                let val = self.eval(expr)?;
                match op {
                    Op::Neg => Operation::negate(val),
                    Op::Not => Operation::not(val),
                    _ => Err(error!(InternalError; "NOT A UNARY OPERATOR")),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::Array(items) => {
                let mut vals = Vec::with_capacity(items.len());
                for item in items {
                    vals.push(self.eval(item)?);
                }
                Ok(Val::Array(Array::from_vec(vals)))
            }
            Expr::Map(pairs) => {
                let mut map = Map::new();
                for (key, item) in pairs {
                    let val = self.eval(item)?;
                    map.insert(key, val);
                }
                Ok(Val::Map(map))
            }
            Expr::FuncPtr { target, ret_slot } => Ok(Val::Ptr(FuncPtr {
                addr: *target,
                ret_slot: *ret_slot,
            })),
            Expr::Call(call) => self.call_function(call),
            Expr::Plugin {
                module,
                index,
                args,
            } => self.call_plugin(*module, CallKind::Func, *index, args),
        }
    }

    pub(super) fn resolve(&mut self, place: &Place, create: bool) -> Result<VarRef> {
        Ok(self.resolve_path(place, create)?.0)
    }

    /// Cell a place names, plus the container it was reached through.
    /// Subscripts applied to a callable value call it; the result is
    /// staged in the owning map's temporary slot so the path can go on.
    pub(super) fn resolve_path(
        &mut self,
        place: &Place,
        create: bool,
    ) -> Result<(VarRef, Option<VarRef>)> {
        let mut cell = self.task().var.get(place.slot)?;
        let mut parent: Option<VarRef> = None;
        for selector in &place.path {
            let target = follow(cell)?;
            cell = match selector {
                Selector::Field(name) => {
                    let next = field(&target, name, create)?;
                    parent = Some(target);
                    next
                }
                Selector::Index(exprs) => {
                    let callable = target.borrow().val.is_callable();
                    if callable {
                        let result = self.call_value(&target, parent.as_ref(), exprs)?;
                        let staged = match &parent {
                            Some(owner) => match &mut owner.borrow_mut().val {
                                Val::Map(map) => map.tmp(),
                                _ => Cell::new(Val::Nil),
                            },
                            None => Cell::new(Val::Nil),
                        };
                        staged.borrow_mut().val = result;
                        staged
                    } else {
                        let mut indices = Vec::with_capacity(exprs.len());
                        for expr in exprs {
                            indices.push(self.eval(expr)?);
                        }
                        let next = element(&target, &indices, create)?;
                        parent = Some(target);
                        next
                    }
                }
            };
        }
        Ok((cell, parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_auto_map() {
        let cell = Cell::new(Val::Nil);
        assert!(field(&cell, "x", false).unwrap().borrow().val.is_nil());
        assert!(cell.borrow().val.is_nil());
        field(&cell, "x", true).unwrap().borrow_mut().val = Val::from(1);
        assert_eq!(cell.borrow().val.to_string(), "{\"x\":1}");
        let scalar = Cell::new(Val::from(1));
        assert!(field(&scalar, "x", true).is_err());
    }

    #[test]
    fn test_element() {
        let cell = Cell::new(Val::Array(Array::from_vec(vec![Val::from(1), Val::from(2)])));
        let e = element(&cell, &[Val::from(1)], false).unwrap();
        assert_eq!(e.borrow().val.to_int().unwrap(), 2);
        assert!(element(&cell, &[Val::from(2)], false).is_err());
        let nil = Cell::new(Val::Nil);
        assert!(element(&nil, &[Val::from(0)], true).is_err());
        element(&nil, &[Val::from("k")], true).unwrap().borrow_mut().val = Val::from(3);
        assert_eq!(nil.borrow().val.to_string(), "{\"k\":3}");
    }
}
