use super::{Address, Link, Opcode, SlotId, Val};
use crate::lang::{Error, LineNumber};

type Result<T> = std::result::Result<T, Error>;

/// ## Program assembly
///
/// Bytecode producers emit instructions against labels, bind each label
/// where it lands, then `link` once. Programs built from instructions
/// whose addresses are already resolved skip linking.

#[derive(Debug)]
pub struct Program {
    ops: Vec<Opcode>,
    data: Vec<Val>,
    link: Link,
    slots: usize,
    self_slot: Option<SlotId>,
    linked: bool,
}

impl Program {
    pub fn new(slots: usize) -> Program {
        Program {
            ops: vec![],
            data: vec![],
            link: Link::new(),
            slots,
            self_slot: None,
            linked: false,
        }
    }

    pub fn from_ops(ops: Vec<Opcode>, slots: usize) -> Program {
        Program {
            ops,
            data: vec![],
            link: Link::new(),
            slots,
            self_slot: None,
            linked: true,
        }
    }

    /// Constants handed out by `READ`, in order.
    pub fn with_data(mut self, data: Vec<Val>) -> Program {
        self.data = data;
        self
    }

    /// Append to the `READ` pool. The position returned is what
    /// `RESTORE` takes to read from here again.
    pub fn data(&mut self, val: Val) -> usize {
        self.data.push(val);
        self.data.len() - 1
    }

    pub fn datum(&self, pos: usize) -> Option<&Val> {
        self.data.get(pos)
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Slot that holds the map a method was called through.
    pub fn set_self_slot(&mut self, slot: SlotId) {
        self.self_slot = Some(slot);
    }

    pub fn self_slot(&self) -> Option<SlotId> {
        self.self_slot
    }

    pub fn label(&mut self) -> Address {
        self.link.label()
    }

    /// Bind `label` to the next instruction pushed.
    pub fn bind(&mut self, label: Address) -> Result<()> {
        self.link.bind(label, self.ops.len())
    }

    pub fn push(&mut self, op: Opcode) -> Address {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Instructions pushed from here on belong to source line `number`.
    pub fn line(&mut self, number: u16) {
        self.link.set_line(self.ops.len(), number);
    }

    pub fn link(&mut self) -> std::result::Result<(), Vec<Error>> {
        if self.linked {
            return Ok(());
        }
        let errors = self.link.link(&mut self.ops);
        self.linked = true;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn op(&self, addr: Address) -> Option<&Opcode> {
        self.ops.get(addr)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn line_number_for(&self, addr: Address) -> LineNumber {
        self.link.line_number_for(addr)
    }
}
