use super::Val;
use crate::error;
use crate::lang::Error;
use std::cmp::Ordering;

type Result<T> = std::result::Result<T, Error>;

/// ## Unary and binary operators
///
/// Integers stay integers until an operation overflows, then the
/// result is promoted to a real. Strings are coerced to numbers except
/// for `+`, which concatenates when either side is a string.

pub struct Operation {}

enum Num {
    Int(i64),
    Real(f64),
}

fn num(val: &Val) -> Result<Num> {
    match val.to_number()? {
        Val::Int(n) => Ok(Num::Int(n)),
        Val::Real(n) => Ok(Num::Real(n)),
        _ => Err(error!(TypeMismatch)),
    }
}

fn real(val: &Val) -> Result<f64> {
    match num(val)? {
        Num::Int(n) => Ok(n as f64),
        Num::Real(n) => Ok(n),
    }
}

fn int(val: &Val) -> Result<i64> {
    val.to_int()
}

fn scalar(val: Val) -> Result<Val> {
    match val {
        Val::Ref(_) => val.deref(),
        Val::Array(_) | Val::Map(_) | Val::Func(_) => Err(error!(TypeMismatch)),
        _ => Ok(val),
    }
}

/// Integer op with promotion to real on overflow.
fn arith(
    lhs: Val,
    rhs: Val,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Val> {
    let lhs = scalar(lhs)?;
    let rhs = scalar(rhs)?;
    match (num(&lhs)?, num(&rhs)?) {
        (Num::Int(l), Num::Int(r)) => match checked(l, r) {
            Some(n) => Ok(Val::Int(n)),
            None => Ok(Val::Real(float(l as f64, r as f64))),
        },
        (l, r) => {
            let l = match l {
                Num::Int(n) => n as f64,
                Num::Real(n) => n,
            };
            let r = match r {
                Num::Int(n) => n as f64,
                Num::Real(n) => n,
            };
            Ok(Val::Real(float(l, r)))
        }
    }
}

fn compare(lhs: Val, rhs: Val, test: fn(Ordering) -> bool) -> Result<Val> {
    let ord = lhs.compare(&rhs)?;
    Ok(Val::from(test(ord)))
}

impl Operation {
    pub fn negate(val: Val) -> Result<Val> {
        match scalar(val)? {
            Val::Int(n) => match n.checked_neg() {
                Some(n) => Ok(Val::Int(n)),
                None => Ok(Val::Real(-(n as f64))),
            },
            Val::Real(n) => Ok(Val::Real(-n)),
            other => match num(&other)? {
                Num::Int(n) => Operation::negate(Val::Int(n)),
                Num::Real(n) => Ok(Val::Real(-n)),
            },
        }
    }

    pub fn not(val: Val) -> Result<Val> {
        let val = scalar(val)?;
        Ok(Val::from(!val.is_true()))
    }

    pub fn sum(lhs: Val, rhs: Val) -> Result<Val> {
        let lhs = scalar(lhs)?;
        let rhs = scalar(rhs)?;
        match (&lhs, &rhs) {
            (Val::Str(_), _) | (_, Val::Str(_)) => {
                let mut s = lhs.to_string();
                s.push_str(&rhs.to_string());
                Ok(Val::from(s))
            }
            _ => arith(lhs, rhs, i64::checked_add, |l, r| l + r),
        }
    }

    pub fn subtract(lhs: Val, rhs: Val) -> Result<Val> {
        arith(lhs, rhs, i64::checked_sub, |l, r| l - r)
    }

    pub fn multiply(lhs: Val, rhs: Val) -> Result<Val> {
        arith(lhs, rhs, i64::checked_mul, |l, r| l * r)
    }

    /// Real division, kept integral when the quotient is exact.
    pub fn divide(lhs: Val, rhs: Val) -> Result<Val> {
        let lhs = scalar(lhs)?;
        let rhs = scalar(rhs)?;
        match (num(&lhs)?, num(&rhs)?) {
            (_, Num::Int(0)) => Err(error!(DivisionByZero)),
            (_, Num::Real(r)) if r == 0.0 => Err(error!(DivisionByZero)),
            (Num::Int(l), Num::Int(r)) if l.checked_rem(r) == Some(0) => match l.checked_div(r) {
                Some(n) => Ok(Val::Int(n)),
                None => Ok(Val::Real(l as f64 / r as f64)),
            },
            _ => Ok(Val::Real(real(&lhs)? / real(&rhs)?)),
        }
    }

    pub fn divide_int(lhs: Val, rhs: Val) -> Result<Val> {
        let l = int(&scalar(lhs)?)?;
        let r = int(&scalar(rhs)?)?;
        if r == 0 {
            return Err(error!(DivisionByZero));
        }
        match l.checked_div(r) {
            Some(n) => Ok(Val::Int(n)),
            None => Err(error!(Overflow)),
        }
    }

    pub fn modulus(lhs: Val, rhs: Val) -> Result<Val> {
        let lhs = scalar(lhs)?;
        let rhs = scalar(rhs)?;
        match (num(&lhs)?, num(&rhs)?) {
            (Num::Int(_), Num::Int(0)) => Err(error!(DivisionByZero)),
            (Num::Int(l), Num::Int(r)) => Ok(Val::Int(l.checked_rem(r).unwrap_or(0))),
            (l, r) => {
                let l = match l {
                    Num::Int(n) => n as f64,
                    Num::Real(n) => n,
                };
                let r = match r {
                    Num::Int(n) => n as f64,
                    Num::Real(n) => n,
                };
                if r == 0.0 {
                    return Err(error!(DivisionByZero));
                }
                Ok(Val::Real(l % r))
            }
        }
    }

    pub fn power(lhs: Val, rhs: Val) -> Result<Val> {
        let lhs = scalar(lhs)?;
        let rhs = scalar(rhs)?;
        if let (Num::Int(l), Num::Int(r)) = (num(&lhs)?, num(&rhs)?) {
            if r >= 0 && r <= u32::max_value() as i64 {
                if let Some(n) = l.checked_pow(r as u32) {
                    return Ok(Val::Int(n));
                }
            }
        }
        Ok(Val::Real(real(&lhs)?.powf(real(&rhs)?)))
    }

    pub fn equal(lhs: Val, rhs: Val) -> Result<Val> {
        compare(lhs, rhs, |o| o == Ordering::Equal)
    }

    pub fn not_equal(lhs: Val, rhs: Val) -> Result<Val> {
        compare(lhs, rhs, |o| o != Ordering::Equal)
    }

    pub fn less(lhs: Val, rhs: Val) -> Result<Val> {
        compare(lhs, rhs, |o| o == Ordering::Less)
    }

    pub fn less_equal(lhs: Val, rhs: Val) -> Result<Val> {
        compare(lhs, rhs, |o| o != Ordering::Greater)
    }

    pub fn greater(lhs: Val, rhs: Val) -> Result<Val> {
        compare(lhs, rhs, |o| o == Ordering::Greater)
    }

    pub fn greater_equal(lhs: Val, rhs: Val) -> Result<Val> {
        compare(lhs, rhs, |o| o != Ordering::Less)
    }

    pub fn and(lhs: Val, rhs: Val) -> Result<Val> {
        Ok(Val::from(scalar(lhs)?.is_true() && scalar(rhs)?.is_true()))
    }

    pub fn or(lhs: Val, rhs: Val) -> Result<Val> {
        Ok(Val::from(scalar(lhs)?.is_true() || scalar(rhs)?.is_true()))
    }

    pub fn xor(lhs: Val, rhs: Val) -> Result<Val> {
        Ok(Val::from(scalar(lhs)?.is_true() != scalar(rhs)?.is_true()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_promotes() {
        let v = Operation::sum(Val::Int(i64::max_value()), Val::Int(1)).unwrap();
        assert!(matches!(v, Val::Real(_)));
        let v = Operation::multiply(Val::Int(6), Val::Int(7)).unwrap();
        assert!(matches!(v, Val::Int(42)));
    }

    #[test]
    fn test_division() {
        assert!(matches!(Operation::divide(Val::Int(6), Val::Int(3)), Ok(Val::Int(2))));
        assert_eq!(Operation::divide(Val::Int(7), Val::Int(2)).unwrap().to_string(), "3.5");
        assert!(Operation::divide_int(Val::Int(1), Val::Int(0)).is_err());
        assert!(Operation::modulus(Val::Int(1), Val::Int(0)).is_err());
        assert!(matches!(Operation::modulus(Val::Int(7), Val::Int(3)), Ok(Val::Int(1))));
    }

    #[test]
    fn test_concat() {
        let v = Operation::sum(Val::from("n="), Val::Int(3)).unwrap();
        assert_eq!(v.to_string(), "n=3");
        let v = Operation::multiply(Val::from("3"), Val::Int(2)).unwrap();
        assert!(matches!(v, Val::Int(6)));
    }

    #[test]
    fn test_comparison_yields_int_bool() {
        assert!(matches!(Operation::less(Val::Int(1), Val::Real(1.5)), Ok(Val::Int(1))));
        assert!(matches!(Operation::equal(Val::from("a"), Val::from("b")), Ok(Val::Int(0))));
        assert!(Operation::less(Val::Int(1), Val::from("a")).is_err());
    }
}
