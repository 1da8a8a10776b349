use super::{Address, Opcode};
use crate::error;
use crate::lang::{Error, LineNumber};
use std::collections::BTreeMap;

type Result<T> = std::result::Result<T, Error>;

/// ## Label resolution
///
/// Code is emitted against symbolic labels which `link` replaces with
/// instruction addresses. The line table survives linking so runtime
/// errors can name the source line.

#[derive(Debug, Default)]
pub struct Link {
    labels: Vec<Option<Address>>,
    lines: BTreeMap<Address, u16>,
}

impl Link {
    pub fn new() -> Link {
        Link::default()
    }

    pub fn label(&mut self) -> Address {
        self.labels.push(None);
        self.labels.len() - 1
    }

    pub fn bind(&mut self, label: Address, addr: Address) -> Result<()> {
        match self.labels.get_mut(label) {
            Some(slot @ None) => {
                *slot = Some(addr);
                Ok(())
            }
            Some(Some(_)) => Err(error!(InternalError; "LABEL REDEFINED")),
            None => Err(error!(InternalError; "NO SUCH LABEL")),
        }
    }

    pub fn set_line(&mut self, addr: Address, line: u16) {
        self.lines.insert(addr, line);
    }

    pub fn line_number_for(&self, op_addr: Address) -> LineNumber {
        self.lines
            .range(..=op_addr)
            .next_back()
            .map(|(_, line)| *line)
    }

    pub fn link(&mut self, ops: &mut [Opcode]) -> Vec<Error> {
        let mut errors: Vec<Error> = vec![];
        let labels = &self.labels;
        let lines = &self.lines;
        for (op_addr, op) in ops.iter_mut().enumerate() {
            op.targets_mut(&mut |target: &mut Address| match labels.get(*target) {
                Some(Some(dest)) => *target = *dest,
                _ => {
                    let line_number = lines.range(..=op_addr).next_back().map(|(_, l)| *l);
                    let message = format!("LABEL {}", target);
                    errors.push(error!(UndefinedLine, line_number; &message));
                }
            });
        }
        self.labels.clear();
        errors
    }
}
