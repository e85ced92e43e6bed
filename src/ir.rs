//! Pseudo-opcode markers attached to bytecode addresses, and the
//! symbolic-value model used once code leaves the verifier.
use std::cmp::Ordering;

/// A translator-internal marker attached to a bytecode address,
/// carrying a back-pointer to whatever produced it (an exception
/// handler index, a branch target address, or a source line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoOpcode {
    /// End of the range protected by exception-table entry `index`.
    TryEnd { index: usize },
    /// Start of the range protected by exception-table entry `index`.
    Try { index: usize },
    /// A branch target, i.e. an address some instruction jumps to.
    Target,
    /// Entry point of the handler for exception-table entry `index`.
    Catch { index: usize },
    /// A source line boundary.
    Position { line: u16 },
}

impl PseudoOpcode {
    /// Rank used to sort multiple pseudo-opcodes recorded at the same
    /// address: `TRYEND < TRY < TARGET < CATCH < POSITION`.
    const fn rank(self) -> u8 {
        match self {
            Self::TryEnd { .. } => 0,
            Self::Try { .. } => 1,
            Self::Target => 2,
            Self::Catch { .. } => 3,
            Self::Position { .. } => 4,
        }
    }
}

/// One pseudo-opcode recorded at a bytecode address, with the
/// original exception-table index preserved for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoOpcodeEntry {
    pub address: u32,
    pub opcode: PseudoOpcode,
}

/// Sorts pseudo-opcodes recorded at a common address per the ordering
/// in spec §3: `TRYEND, TRY, TARGET, CATCH, POSITION`, with multiple
/// `TRY`s sorted by *descending* original index and multiple
/// `TRYEND`s by *ascending* original index, so the original
/// exception-table nesting is recoverable from the sequence.
pub fn sort_pseudo_opcodes(entries: &mut [PseudoOpcodeEntry]) {
    entries.sort_by(|a, b| {
        a.address.cmp(&b.address).then_with(|| {
            let rank = a.opcode.rank().cmp(&b.opcode.rank());
            if rank != Ordering::Equal {
                return rank;
            }
            match (a.opcode, b.opcode) {
                (PseudoOpcode::Try { index: ia }, PseudoOpcode::Try { index: ib }) => ib.cmp(&ia),
                (PseudoOpcode::TryEnd { index: ia }, PseudoOpcode::TryEnd { index: ib }) => ia.cmp(&ib),
                _ => Ordering::Equal,
            }
        })
    });
}

/// Stable small integer used by [`SymbolicValue::type_of`] to report
/// the value's coarse category without pulling in the verifier's
/// richer [`crate::frame::VerificationCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicValueType {
    Word,
    DoubleWord,
    Address,
}

/// A re-architected, flat replacement for the source's class hierarchy
/// of symbolic-value descriptors (register / literal / local / label /
/// fixup subclasses). `type()`, `size()` and `print()` are match
/// statements instead of virtual dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolicValue {
    /// A physical or virtual register, identified by its IR index.
    Register(u32),
    /// An inline 32-bit literal (int or float bits).
    Literal32(u32),
    /// An inline 64-bit literal (long or double bits), occupying two
    /// slots wherever it is held in a [`crate::frame::Frame`].
    Literal64(u64),
    /// A reference to local variable slot `index`.
    Local(u32),
    /// A forward or backward branch target, identified by bytecode
    /// address.
    Label(u32),
    /// An as-yet-unresolved symbol (e.g. a relocation against a
    /// not-yet-encoded method), carrying its name for later fixup.
    FixupSymbol(String),
    /// Anything not covered above (e.g. a raw constant-pool index
    /// carried through unresolved).
    Other,
}

impl SymbolicValue {
    #[must_use]
    pub const fn type_of(&self) -> SymbolicValueType {
        match self {
            Self::Literal64(_) => SymbolicValueType::DoubleWord,
            Self::Label(_) | Self::FixupSymbol(_) => SymbolicValueType::Address,
            Self::Register(_) | Self::Literal32(_) | Self::Local(_) | Self::Other => SymbolicValueType::Word,
        }
    }

    /// Slot width in 32-bit words.
    #[must_use]
    pub const fn size(&self) -> u8 {
        match self.type_of() {
            SymbolicValueType::DoubleWord => 2,
            SymbolicValueType::Word | SymbolicValueType::Address => 1,
        }
    }

    #[must_use]
    pub fn print(&self) -> String {
        match self {
            Self::Register(r) => format!("r{r}"),
            Self::Literal32(v) => format!("#{v}"),
            Self::Literal64(v) => format!("#{v}L"),
            Self::Local(i) => format!("local[{i}]"),
            Self::Label(a) => format!("L{a:04x}"),
            Self::FixupSymbol(name) => format!("&{name}"),
            Self::Other => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_opcodes_at_one_address_follow_the_spec_order() {
        let mut entries = vec![
            PseudoOpcodeEntry { address: 10, opcode: PseudoOpcode::Position { line: 7 } },
            PseudoOpcodeEntry { address: 10, opcode: PseudoOpcode::Catch { index: 0 } },
            PseudoOpcodeEntry { address: 10, opcode: PseudoOpcode::Target },
            PseudoOpcodeEntry { address: 10, opcode: PseudoOpcode::Try { index: 0 } },
            PseudoOpcodeEntry { address: 10, opcode: PseudoOpcode::TryEnd { index: 0 } },
        ];
        sort_pseudo_opcodes(&mut entries);
        let order: Vec<_> = entries.iter().map(|e| e.opcode.rank()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn multiple_trys_sort_by_descending_index_and_tryends_by_ascending() {
        let mut entries = vec![
            PseudoOpcodeEntry { address: 5, opcode: PseudoOpcode::Try { index: 0 } },
            PseudoOpcodeEntry { address: 5, opcode: PseudoOpcode::Try { index: 2 } },
            PseudoOpcodeEntry { address: 5, opcode: PseudoOpcode::Try { index: 1 } },
            PseudoOpcodeEntry { address: 5, opcode: PseudoOpcode::TryEnd { index: 2 } },
            PseudoOpcodeEntry { address: 5, opcode: PseudoOpcode::TryEnd { index: 0 } },
            PseudoOpcodeEntry { address: 5, opcode: PseudoOpcode::TryEnd { index: 1 } },
        ];
        sort_pseudo_opcodes(&mut entries);
        let trys: Vec<usize> = entries
            .iter()
            .filter_map(|e| match e.opcode {
                PseudoOpcode::Try { index } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(trys, vec![2, 1, 0]);
        let tryends: Vec<usize> = entries
            .iter()
            .filter_map(|e| match e.opcode {
                PseudoOpcode::TryEnd { index } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(tryends, vec![0, 1, 2]);
    }

    #[test]
    fn literal64_is_double_word_everything_else_is_single_word() {
        assert_eq!(SymbolicValue::Literal64(0).size(), 2);
        assert_eq!(SymbolicValue::Register(1).size(), 1);
        assert_eq!(SymbolicValue::Local(2).size(), 1);
    }

    #[test]
    fn print_forms_are_distinguishable_per_variant() {
        assert_eq!(SymbolicValue::Register(3).print(), "r3");
        assert_eq!(SymbolicValue::Label(16).print(), "L0010");
        assert_eq!(SymbolicValue::FixupSymbol("foo".into()).print(), "&foo");
    }
}
