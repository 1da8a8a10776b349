use super::val::follow;
use super::{assign, Array, Cell, Expr, Place, Runtime, Val, VarRef};
use crate::error;
use crate::lang::Error;
use std::cmp::Ordering;

type Result<T> = std::result::Result<T, Error>;

/// ## Whole-array statements
///
/// `SORT`, `SEARCH`, `SPLIT` and `JOIN`. The first three accept an
/// optional callable that replaces the built-in comparison or maps each
/// piece. It may run arbitrary code, so element values are copied out
/// before it is called and written back afterwards.

/// Stable merge sort. The comparison may fail or be inconsistent; the
/// first failure ends the sort.
fn merge_sort(
    mut vals: Vec<Val>,
    cmp: &mut dyn FnMut(&Val, &Val) -> Result<Ordering>,
) -> Result<Vec<Val>> {
    if vals.len() <= 1 {
        return Ok(vals);
    }
    let right = vals.split_off(vals.len() / 2);
    let left = merge_sort(vals, cmp)?;
    let right = merge_sort(right, cmp)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => cmp(l, r)? != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        merged.extend(if take_left { left.next() } else { right.next() });
    }
    Ok(merged)
}

/// Pieces of `text` between delimiter characters. Inside a span opened
/// by an even position of `pairs` delimiters are ordinary characters
/// until the following character of `pairs` closes it.
fn split_text(text: &str, delims: &str, pairs: &str) -> Vec<String> {
    let pairs: Vec<char> = pairs.chars().collect();
    let mut pieces = vec![];
    let mut piece = String::new();
    let mut closer: Option<char> = None;
    for ch in text.chars() {
        match closer {
            Some(close) => {
                if ch == close {
                    closer = None;
                }
                piece.push(ch);
            }
            None => match pairs.iter().position(|&p| p == ch) {
                Some(pos) => {
                    if pos % 2 == 0 {
                        closer = pairs.get(pos + 1).copied();
                    }
                    piece.push(ch);
                }
                None if delims.contains(ch) => pieces.push(std::mem::take(&mut piece)),
                None => piece.push(ch),
            },
        }
    }
    pieces.push(piece);
    pieces
}

fn elements(cell: &VarRef) -> Option<(i64, Vec<Val>)> {
    match &cell.borrow().val {
        Val::Array(array) => Some((
            array.lbound(),
            array.iter().map(|c| c.borrow().val.clone()).collect(),
        )),
        _ => None,
    }
}

impl Runtime {
    fn callback(&mut self, using: Option<&Expr>) -> Result<Option<VarRef>> {
        let expr = match using {
            Some(expr) => expr,
            None => return Ok(None),
        };
        let val = self.eval(expr)?;
        if !val.is_callable() {
            return Err(error!(TypeMismatch; "USE NEEDS A FUNCTION"));
        }
        Ok(Some(Cell::new(val)))
    }

    fn call_with(&mut self, func: &VarRef, vals: Vec<Val>) -> Result<Val> {
        let exprs: Vec<Expr> = vals.into_iter().map(Expr::Literal).collect();
        self.call_value(func, None, &exprs)
    }

    fn order(&mut self, using: Option<&VarRef>, a: &Val, b: &Val) -> Result<Ordering> {
        match using {
            Some(func) => {
                let result = self.call_with(func, vec![a.clone(), b.clone()])?;
                Ok(result.to_int()?.cmp(&0))
            }
            None => a.compare(b),
        }
    }

    /// Anything but an array is left alone.
    pub(super) fn sort(&mut self, place: &Place, using: Option<&Expr>) -> Result<()> {
        let using = self.callback(using)?;
        let cell = follow(self.resolve(place, false)?)?;
        if cell.borrow().constant {
            return Err(error!(ConstantAssignment));
        }
        let vals = match elements(&cell) {
            Some((_, vals)) => vals,
            None => return Ok(()),
        };
        let sorted = merge_sort(vals, &mut |a: &Val, b: &Val| {
            self.order(using.as_ref(), a, b)
        })?;
        if let Val::Array(array) = &mut cell.borrow_mut().val {
            array.fill(sorted);
        }
        Ok(())
    }

    /// Searching something that is not an array finds nothing at -1.
    pub(super) fn search(
        &mut self,
        place: &Place,
        key: &Expr,
        result: &Place,
        using: Option<&Expr>,
    ) -> Result<()> {
        let using = self.callback(using)?;
        let key = self.eval(key)?;
        let cell = follow(self.resolve(place, false)?)?;
        let found = match elements(&cell) {
            Some((lower, vals)) => {
                let mut found = lower.saturating_sub(1);
                for (i, val) in vals.iter().enumerate() {
                    if self.order(using.as_ref(), val, &key)? == Ordering::Equal {
                        found = lower.saturating_add(i as i64);
                        break;
                    }
                }
                found
            }
            None => -1,
        };
        let target = self.resolve(result, true)?;
        assign(&target, Val::Int(found))
    }

    pub(super) fn split(
        &mut self,
        text: &Expr,
        delims: &Expr,
        pairs: Option<&Expr>,
        place: &Place,
        using: Option<&Expr>,
    ) -> Result<()> {
        let text = self.eval(text)?.to_string();
        let delims = self.eval(delims)?.to_string();
        let pairs = match pairs {
            Some(pairs) => self.eval(pairs)?.to_string(),
            None => String::new(),
        };
        let using = self.callback(using)?;
        let mut vals = vec![];
        for piece in split_text(&text, &delims, &pairs) {
            let val = Val::from(piece);
            vals.push(match &using {
                Some(func) => self.call_with(func, vec![val])?,
                None => val,
            });
        }
        let cell = self.resolve(place, true)?;
        assign(&cell, Val::Array(Array::from_vec(vals)))
    }

    pub(super) fn join(&mut self, place: &Place, delim: &Expr, target: &Place) -> Result<()> {
        let delim = self.eval(delim)?.to_string();
        let cell = follow(self.resolve(place, false)?)?;
        let text = match &cell.borrow().val {
            Val::Array(array) => array
                .iter()
                .map(|c| c.borrow().val.to_string())
                .collect::<Vec<_>>()
                .join(&delim),
            val => {
                let message = format!("JOIN NEEDS AN ARRAY, NOT {}", val.type_name());
                return Err(error!(TypeMismatch; &message));
            }
        };
        let target = self.resolve(target, true)?;
        assign(&target, Val::from(text))
    }
}
