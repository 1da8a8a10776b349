use super::{Cell, Val, VarRef};
use crate::error;
use crate::lang::Error;

type Result<T> = std::result::Result<T, Error>;

/// ## Dimensioned arrays
///
/// Elements are stored flat in row-major order. Each dimension keeps its
/// own inclusive `(lower, upper)` bounds so any integer base works.

pub struct Array {
    bounds: Vec<(i64, i64)>,
    data: Vec<VarRef>,
}

impl Clone for Array {
    fn clone(&self) -> Array {
        Array {
            bounds: self.bounds.clone(),
            data: self
                .data
                .iter()
                .map(|cell| {
                    let cell = cell.borrow();
                    let copy = Cell::new(cell.val.clone());
                    copy.borrow_mut().constant = cell.constant;
                    copy
                })
                .collect(),
        }
    }
}

fn too_large() -> Error {
    error!(OutOfMemory; "ARRAY TOO LARGE")
}

fn dim_len(lower: i64, upper: i64) -> Result<usize> {
    if upper < lower {
        return Ok(0);
    }
    let len = upper as i128 - lower as i128 + 1;
    if len > u32::max_value() as i128 {
        return Err(too_large());
    }
    Ok(len as usize)
}

fn total_len(bounds: &[(i64, i64)]) -> Result<usize> {
    let mut size: usize = 1;
    for (lower, upper) in bounds {
        size = match size.checked_mul(dim_len(*lower, *upper)?) {
            Some(size) if size <= u32::max_value() as usize => size,
            _ => return Err(too_large()),
        };
    }
    Ok(size)
}

/// Bounds of a single dimension holding `len` elements from `lower`.
fn span(lower: i64, len: usize) -> Result<(i64, i64)> {
    if len == 0 {
        return Ok((lower, lower.saturating_sub(1)));
    }
    match lower.checked_add(len as i64 - 1) {
        Some(upper) => Ok((lower, upper)),
        None => Err(error!(SubscriptOutOfRange; "ARRAY BOUNDS")),
    }
}

impl Array {
    /// One dimension holding no elements.
    pub fn empty() -> Array {
        Array {
            bounds: vec![(0, -1)],
            data: vec![],
        }
    }

    pub fn new(bounds: Vec<(i64, i64)>) -> Result<Array> {
        if bounds.is_empty() {
            return Ok(Array::empty());
        }
        let size = total_len(&bounds)?;
        Ok(Array {
            bounds,
            data: (0..size).map(|_| Cell::new(Val::Nil)).collect(),
        })
    }

    pub fn from_vec(vals: Vec<Val>) -> Array {
        let upper = vals.len() as i64 - 1;
        Array {
            bounds: vec![(0, upper)],
            data: vals.into_iter().map(Cell::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bounds(&self) -> &[(i64, i64)] {
        &self.bounds
    }

    pub fn lbound(&self) -> i64 {
        self.bounds.first().map_or(0, |b| b.0)
    }

    pub fn get(&self, index: usize) -> Option<&VarRef> {
        self.data.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VarRef> {
        self.data.iter()
    }

    fn offset(&self, indices: &[i64]) -> Result<usize> {
        if indices.len() != self.bounds.len() {
            return Err(error!(SubscriptOutOfRange; "WRONG NUMBER OF SUBSCRIPTS"));
        }
        let mut offset = 0;
        for (index, (lower, upper)) in indices.iter().zip(self.bounds.iter()) {
            if index < lower || index > upper {
                return Err(error!(SubscriptOutOfRange));
            }
            let step = (*index as i128 - *lower as i128) as usize;
            offset = offset * dim_len(*lower, *upper)? + step;
        }
        Ok(offset)
    }

    /// Cell at the given subscripts.
    pub fn elem(&self, indices: &[i64]) -> Result<VarRef> {
        let offset = self.offset(indices)?;
        match self.data.get(offset) {
            Some(cell) => Ok(cell.clone()),
            None => Err(error!(SubscriptOutOfRange)),
        }
    }

    /// Change the shape. With `preserve` the flat contents are kept as
    /// far as they fit, which only makes sense for the same number of
    /// dimensions.
    pub fn redim(&mut self, bounds: Vec<(i64, i64)>, preserve: bool) -> Result<()> {
        if !preserve {
            *self = Array::new(bounds)?;
            return Ok(());
        }
        if bounds.len() != self.bounds.len() {
            return Err(error!(RedimensionedArray));
        }
        let size = total_len(&bounds)?;
        self.data.truncate(size);
        while self.data.len() < size {
            self.data.push(Cell::new(Val::Nil));
        }
        self.bounds = bounds;
        Ok(())
    }

    /// Arrays grown or shrunk element-wise collapse to one dimension
    /// keeping the first lower bound.
    fn reshape(&mut self, len: usize) -> Result<()> {
        self.bounds = vec![span(self.lbound(), len)?];
        Ok(())
    }

    pub fn push(&mut self, val: Val) -> Result<()> {
        self.reshape(self.data.len() + 1)?;
        self.data.push(Cell::new(val));
        Ok(())
    }

    /// Insert before the zero-based position, clamped to the ends.
    pub fn insert(&mut self, index: i64, val: Val) -> Result<()> {
        self.reshape(self.data.len() + 1)?;
        let index = index.max(0).min(self.data.len() as i64) as usize;
        self.data.insert(index, Cell::new(val));
        Ok(())
    }

    /// Remove `count` elements starting at the zero-based position.
    pub fn remove(&mut self, index: i64, count: i64) -> Result<()> {
        if count <= 0 {
            return Err(error!(IllegalFunctionCall; "DELETE COUNT"));
        }
        if index < 0 || index >= self.data.len() as i64 {
            return Err(error!(SubscriptOutOfRange));
        }
        match index.checked_add(count) {
            Some(end) if end <= self.data.len() as i64 => {
                self.reshape(self.data.len() - count as usize)?;
                self.data.drain(index as usize..end as usize);
                Ok(())
            }
            _ => Err(error!(SubscriptOutOfRange; "DELETE COUNT")),
        }
    }

    /// Overwrite the elements in storage order.
    pub fn fill(&mut self, vals: Vec<Val>) {
        for (cell, val) in self.data.iter().zip(vals) {
            cell.borrow_mut().val = val;
        }
    }
}
