use super::val::parse_number;
use super::{
    assign, Array, Dim, Expr, InputFrom, Place, PrintItem, PrintTo, Runtime, Sep, Target, Val,
};
use crate::error;
use crate::lang::Error;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Result<T> = std::result::Result<T, Error>;

fn writable(cell: &super::Cell) -> Result<()> {
    if cell.constant {
        Err(error!(ConstantAssignment))
    } else {
        Ok(())
    }
}

/// Split an input line on commas outside double quotes.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = vec![];
    let mut quoted = false;
    let mut start = 0;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn field_value(field: &str) -> Val {
    let field = field.trim();
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        return Val::from(&field[1..field.len() - 1]);
    }
    parse_number(field).unwrap_or_else(|| Val::from(field))
}

impl Runtime {
    pub(super) fn r#let(&mut self, place: &Place, expr: &Expr, constant: bool) -> Result<()> {
        let val = self.eval(expr)?;
        let cell = self.resolve(place, true)?;
        assign(&cell, val)?;
        if constant {
            cell.borrow_mut().constant = true;
        }
        Ok(())
    }

    pub(super) fn dim(&mut self, place: &Place, dims: &[Dim], preserve: bool) -> Result<()> {
        let mut bounds = Vec::with_capacity(dims.len());
        for dim in dims {
            let lower = match &dim.lower {
                Some(lower) => self.eval(lower)?.to_int()?,
                None => self.options.base,
            };
            let upper = self.eval(&dim.upper)?.to_int()?;
            bounds.push((lower, upper));
        }
        let cell = self.resolve(place, true)?;
        let mut cell = cell.borrow_mut();
        writable(&cell)?;
        match &mut cell.val {
            Val::Array(array) if preserve && !bounds.is_empty() => array.redim(bounds, true),
            val => {
                *val = Val::Array(Array::new(bounds)?);
                Ok(())
            }
        }
    }

    /// Make sure the place holds an array and hand back its cell.
    fn array_cell(&mut self, place: &Place) -> Result<super::VarRef> {
        let cell = self.resolve(place, true)?;
        {
            let mut cell = cell.borrow_mut();
            writable(&cell)?;
            if !matches!(cell.val, Val::Array(_)) {
                let val = cell.val.take();
                cell.val = Val::Array(if val.is_nil() {
                    Array::empty()
                } else {
                    Array::from_vec(vec![val])
                });
            }
        }
        Ok(cell)
    }

    pub(super) fn append(&mut self, place: &Place, items: &[Expr]) -> Result<()> {
        let mut vals = Vec::with_capacity(items.len());
        for item in items {
            vals.push(self.eval(item)?);
        }
        let cell = self.array_cell(place)?;
        if let Val::Array(array) = &mut cell.borrow_mut().val {
            for val in vals {
                array.push(val)?;
            }
        }
        Ok(())
    }

    pub(super) fn insert(&mut self, place: &Place, index: &Expr, items: &[Expr]) -> Result<()> {
        let index = self.eval(index)?.to_int()?;
        let mut vals = Vec::with_capacity(items.len());
        for item in items {
            vals.push(self.eval(item)?);
        }
        let cell = self.array_cell(place)?;
        if let Val::Array(array) = &mut cell.borrow_mut().val {
            let pos = index
                .saturating_sub(array.lbound())
                .max(0)
                .min(array.len() as i64);
            for (i, val) in vals.into_iter().enumerate() {
                array.insert(pos + i as i64, val)?;
            }
        }
        Ok(())
    }

    pub(super) fn delete(&mut self, place: &Place, index: &Expr, count: Option<&Expr>) -> Result<()> {
        let index = self.eval(index)?.to_int()?;
        let count = match count {
            Some(count) => self.eval(count)?.to_int()?,
            None => 1,
        };
        let cell = self.resolve(place, false)?;
        let mut cell = cell.borrow_mut();
        writable(&cell)?;
        match &mut cell.val {
            Val::Array(array) => match index.checked_sub(array.lbound()) {
                Some(pos) => array.remove(pos, count),
                None => Err(error!(SubscriptOutOfRange)),
            },
            _ => Err(error!(IllegalFunctionCall; "DELETE NEEDS AN ARRAY")),
        }
    }

    pub(super) fn read(&mut self, places: &[Place]) -> Result<()> {
        let program = Rc::clone(&self.task().program);
        for place in places {
            let pos = self.task().data_pos;
            let item = match program.datum(pos) {
                Some(item) => item,
                None => return Err(error!(OutOfData)),
            };
            let cell = self.resolve(place, true)?;
            let mut cell = cell.borrow_mut();
            writable(&cell)?;
            cell.val.set(item);
            self.task_mut().data_pos = pos + 1;
        }
        Ok(())
    }

    pub(super) fn erase(&mut self, places: &[Place]) -> Result<()> {
        for place in places {
            let cell = self.resolve(place, false)?;
            let mut cell = cell.borrow_mut();
            cell.constant = false;
            cell.val = match cell.val {
                Val::Array(_) => Val::Array(Array::empty()),
                _ => Val::Nil,
            };
        }
        Ok(())
    }

    pub(super) fn swap(&mut self, a: &Place, b: &Place) -> Result<()> {
        let a = self.resolve(a, true)?;
        let b = self.resolve(b, true)?;
        if Rc::ptr_eq(&a, &b) {
            return Ok(());
        }
        let mut a = a.borrow_mut();
        let mut b = b.borrow_mut();
        writable(&a)?;
        writable(&b)?;
        std::mem::swap(&mut a.val, &mut b.val);
        Ok(())
    }

    pub(super) fn print(&mut self, target: &PrintTo, items: &[PrintItem]) -> Result<()> {
        let target = match target {
            PrintTo::Console => Target::Console,
            PrintTo::Log => Target::Log,
            PrintTo::File(handle) => Target::File(self.eval(handle)?.to_int()?),
            PrintTo::Net(handle) => Target::Net(self.eval(handle)?.to_int()?),
            PrintTo::Str(place) => {
                let cell = self.resolve(place, true)?;
                let text = self.print_text(items)?;
                let mut cell = cell.borrow_mut();
                writable(&cell)?;
                match &mut cell.val {
                    Val::Str(s) => s.to_mut().push_str(&text),
                    val => {
                        let mut s = val.to_string();
                        s.push_str(&text);
                        *val = Val::from(s);
                    }
                }
                return Ok(());
            }
        };
        let text = self.print_text(items)?;
        self.device.write(&text, target)
    }

    fn print_text(&mut self, items: &[PrintItem]) -> Result<String> {
        let mut text = String::new();
        for item in items {
            let val = self.eval(&item.expr)?;
            text.push_str(&val.to_string());
            if item.sep == Sep::Comma {
                text.push('\t');
            }
        }
        if items.last().map_or(true, |item| item.sep == Sep::None) {
            text.push('\n');
        }
        Ok(text)
    }

    fn read_line(&mut self, target: Target) -> Result<String> {
        let mut line = String::new();
        self.device.read(&mut line, target)?;
        if self.device.poll_break() {
            return Err(error!(Break));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    pub(super) fn input(
        &mut self,
        source: &InputFrom,
        prompt: Option<&Expr>,
        places: &[Place],
    ) -> Result<()> {
        let line = match source {
            InputFrom::Console => {
                let prompt = match prompt {
                    Some(prompt) => self.eval(prompt)?.to_string(),
                    None => "? ".to_string(),
                };
                self.device.write(&prompt, Target::Console)?;
                self.read_line(Target::Console)?
            }
            InputFrom::File(handle) => {
                let handle = self.eval(handle)?.to_int()?;
                self.read_line(Target::File(handle))?
            }
            InputFrom::Str(place) => {
                let cell = self.resolve(place, false)?;
                let val = cell.borrow().val.deref()?;
                val.to_string()
            }
        };
        let vals: Vec<Val> = if places.len() == 1 {
            vec![field_value(&line)]
        } else {
            split_fields(&line).into_iter().map(field_value).collect()
        };
        let mut vals = vals.into_iter();
        for place in places {
            let val = vals.next().unwrap_or_else(|| Val::from(""));
            let cell = self.resolve(place, true)?;
            assign(&cell, val)?;
        }
        Ok(())
    }

    /// Wait in slices so a break is noticed while sleeping.
    pub(super) fn delay(&mut self, expr: &Expr) -> Result<()> {
        let ms = self.eval(expr)?.to_int()?;
        if ms < 0 {
            return Err(error!(IllegalFunctionCall; "DELAY"));
        }
        let start = Instant::now();
        let wait = Duration::from_millis(ms as u64);
        loop {
            if self.device.poll_break() {
                return Err(error!(Break));
            }
            let elapsed = start.elapsed();
            if elapsed >= wait {
                return Ok(());
            }
            std::thread::sleep((wait - elapsed).min(self.options.poll_interval));
        }
    }
}
