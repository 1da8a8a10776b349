use super::{Cell, Val, VarRef};
use std::rc::Rc;

/// ## Associative maps
///
/// Fields keep insertion order. The temporary slot stages the result of
/// a method call made through the map so a chained access can continue
/// from it; it is never part of the map's contents.

#[derive(Default)]
pub struct Map {
    fields: Vec<(Rc<str>, VarRef)>,
    tmp: Option<VarRef>,
}

impl Clone for Map {
    fn clone(&self) -> Map {
        Map {
            fields: self
                .fields
                .iter()
                .map(|(key, cell)| (key.clone(), Cell::new(cell.borrow().val.clone())))
                .collect(),
            tmp: None,
        }
    }
}

impl Map {
    pub fn new() -> Map {
        Map::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<VarRef> {
        self.fields
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, cell)| cell.clone())
    }

    /// Cell for `key`, adding a Nil field when missing.
    pub fn entry(&mut self, key: &str) -> VarRef {
        if let Some(cell) = self.get(key) {
            return cell;
        }
        let cell = Cell::new(Val::Nil);
        self.fields.push((key.into(), cell.clone()));
        cell
    }

    pub fn insert(&mut self, key: &str, val: Val) {
        self.entry(key).borrow_mut().val = val;
    }

    pub fn remove(&mut self, key: &str) -> Option<Val> {
        let pos = self.fields.iter().position(|(k, _)| &**k == key)?;
        let (_, cell) = self.fields.remove(pos);
        let val = cell.borrow_mut().val.take();
        Some(val)
    }

    pub fn key_at(&self, index: usize) -> Option<Rc<str>> {
        self.fields.get(index).map(|(key, _)| key.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &VarRef)> {
        self.fields.iter().map(|(key, cell)| (key, cell))
    }

    pub fn tmp(&mut self) -> VarRef {
        self.tmp.get_or_insert_with(|| Cell::new(Val::Nil)).clone()
    }
}
