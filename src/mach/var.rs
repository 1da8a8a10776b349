use super::{Cell, SlotId, Val, VarRef};
use crate::error;
use crate::lang::Error;

type Result<T> = std::result::Result<T, Error>;

/// ## Variable memory
///
/// A fixed table of cells addressed by the slot ids baked into the
/// bytecode. Scoping never renames anything: a local swaps a new cell
/// into the slot and puts the old one back when its frame is popped.

#[derive(Debug, Default)]
pub struct Var {
    slots: Vec<VarRef>,
}

impl Var {
    pub fn new(len: usize) -> Var {
        Var {
            slots: (0..len).map(|_| Cell::new(Val::Nil)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn undefined(slot: SlotId) -> Error {
        error!(InternalError; &format!("UNDEFINED SLOT {}", slot))
    }

    pub fn get(&self, slot: SlotId) -> Result<VarRef> {
        match self.slots.get(slot) {
            Some(cell) => Ok(cell.clone()),
            None => Err(Var::undefined(slot)),
        }
    }

    pub fn fetch(&self, slot: SlotId) -> Result<Val> {
        let cell = self.get(slot)?;
        let val = cell.borrow().val.clone();
        Ok(val)
    }

    pub fn store(&mut self, slot: SlotId, val: Val) -> Result<()> {
        let cell = self.get(slot)?;
        let mut cell = cell.borrow_mut();
        if cell.constant {
            return Err(error!(ConstantAssignment));
        }
        cell.val = val;
        Ok(())
    }

    /// Install `cell` in the slot and hand back what was there.
    pub fn replace(&mut self, slot: SlotId, cell: VarRef) -> Result<VarRef> {
        match self.slots.get_mut(slot) {
            Some(current) => Ok(std::mem::replace(current, cell)),
            None => Err(Var::undefined(slot)),
        }
    }
}
