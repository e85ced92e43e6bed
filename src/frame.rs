//! Verifier state: `Frame`, `Local`, `Target`, and the stack-map
//! frame shape the code parser consumes.
use std::collections::HashMap;

use crate::error::{ErrorContext, Result, TranslationError};

/// Verification category of a stack slot or local. Sub-word integer
/// types collapse into `Int`; every reference type widens to
/// `Reference` for the purposes of a local-slot key, but individual
/// stack/local entries still carry the concrete class name so
/// assignability can be checked precisely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationCategory {
    Top,
    Int,
    Long,
    /// Sentinel occupying the second slot of a `Long`. Popping the
    /// first slot of a `Long` must pop this sentinel first.
    Long2,
    Float,
    Double,
    /// Sentinel occupying the second slot of a `Double`.
    Double2,
    Reference(Option<String>),
    Null,
    UninitializedThis,
    /// `new` pushed this; `offset` is the bytecode address of the
    /// `new` instruction that produced it, used to key the promotion
    /// sweep on a chained-constructor call.
    Uninitialized(u32),
    /// A word-sized raw memory address. Never aliases with a
    /// reference or any other category in the same slot.
    Address,
    /// A word-sized unsigned value.
    UWord,
    /// A word-sized signed offset.
    Offset,
}

impl VerificationCategory {
    /// `getLocalTypeFor`: collapses primitive sub-word types to
    /// `Int`, keeps wide/Squawk-primitive types as themselves, and
    /// widens every reference-shaped type to the single `Reference`
    /// category used as a local-slot key.
    #[must_use]
    pub fn local_key(&self) -> LocalKeyCategory {
        match self {
            Self::Int | Self::Top => LocalKeyCategory::Int,
            Self::Long => LocalKeyCategory::Long,
            Self::Long2 => LocalKeyCategory::Long2,
            Self::Float => LocalKeyCategory::Float,
            Self::Double => LocalKeyCategory::Double,
            Self::Double2 => LocalKeyCategory::Double2,
            Self::Reference(_) | Self::Null | Self::UninitializedThis | Self::Uninitialized(_) => {
                LocalKeyCategory::Reference
            }
            Self::Address => LocalKeyCategory::Address,
            Self::UWord => LocalKeyCategory::UWord,
            Self::Offset => LocalKeyCategory::Offset,
        }
    }

    #[must_use]
    pub const fn is_squawk_primitive(&self) -> bool {
        matches!(self, Self::Address | Self::UWord | Self::Offset)
    }

    #[must_use]
    pub const fn slot_width(&self) -> u8 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// Whether `self` is assignable to `target` for the purposes of a
    /// forward stack-map merge. Interfaces widen to `Object` during
    /// the comparison (the JVM verifier shortcut noted in §4.D).
    #[must_use]
    pub fn assignable_to(&self, target: &Self) -> bool {
        match (self, target) {
            (a, b) if a == b => true,
            (Self::Null, Self::Reference(_)) => true,
            (Self::Reference(_), Self::Reference(None)) => true,
            // Without a supertype oracle here we only verify the
            // shallow widen-to-Object shortcut; a full implementation
            // would consult the Klass hierarchy via the registry.
            (Self::Reference(Some(_)), Self::Reference(Some(other))) if other == "java/lang/Object" => true,
            _ => false,
        }
    }
}

/// The deduplication key for a local slot: `(category, javac_index)`
/// with sub-word integer categories collapsed into `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKeyCategory {
    Int,
    Long,
    Long2,
    Float,
    Double,
    Double2,
    Reference,
    Address,
    UWord,
    Offset,
}

/// A handle to an allocated local slot. Spill locals (produced by
/// [`Frame::spill`]) get negative indices, disjoint from any index a
/// `javac`-numbered local can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local {
    pub index: i32,
    pub category: LocalKeyCategory,
}

/// A merge point: a branch target, exception-handler entry, or the
/// fallthrough address after an unconditional branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub address: u32,
    pub recorded_locals: Vec<VerificationCategory>,
    pub recorded_stack: Vec<VerificationCategory>,
    /// `None` marks an unreachable target (per spec §3, treated as a
    /// backward-branch target with no live producer).
    pub derived_stack: Option<Vec<VerificationCategory>>,
}

impl Target {
    #[must_use]
    pub fn new(address: u32, recorded_locals: Vec<VerificationCategory>, recorded_stack: Vec<VerificationCategory>) -> Self {
        Self { address, recorded_locals, recorded_stack, derived_stack: None }
    }

    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        self.derived_stack.is_none()
    }

    /// Whether this target's current derived stack is idempotent with
    /// `incoming`: merging it again produces the same state.
    #[must_use]
    pub fn merge_is_idempotent(&self, incoming: &[VerificationCategory]) -> bool {
        self.derived_stack.as_deref() == Some(incoming)
    }

    /// Replaces the derived state outright -- used at backward-branch
    /// targets and exception-handler entries, where the recorded
    /// state from the stack map is authoritative.
    pub fn replace_with_recorded(&mut self) {
        self.derived_stack = Some(self.recorded_stack.clone());
    }

    /// Merges `incoming` into a forward target: every incoming entry
    /// must be assignable to the corresponding recorded entry.
    pub fn merge_forward(&mut self, incoming: &[VerificationCategory]) -> Result<()> {
        if incoming.len() != self.recorded_stack.len() {
            return Err(TranslationError::verify(
                format!(
                    "stack depth mismatch at target {}: recorded {} got {}",
                    self.address,
                    self.recorded_stack.len(),
                    incoming.len()
                ),
                ErrorContext::new().with_offset(self.address as usize),
            ));
        }
        for (got, recorded) in incoming.iter().zip(self.recorded_stack.iter()) {
            if !got.assignable_to(recorded) {
                return Err(TranslationError::verify(
                    format!("incompatible stack type at target {}: {got:?} not assignable to {recorded:?}", self.address),
                    ErrorContext::new().with_offset(self.address as usize),
                ));
            }
        }
        self.derived_stack = Some(incoming.to_vec());
        Ok(())
    }
}

/// The CLDC-preverifier stack-map shape the code parser consumes: a
/// bytecode address plus full (non-delta) locals and stack vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct StackMapFrame {
    pub address: u32,
    pub locals: Vec<VerificationCategory>,
    pub stack: Vec<VerificationCategory>,
}

/// Per-method mutable verifier state: the operand stack, the local
/// array, and the set of allocated spill locals.
pub struct Frame {
    max_stack: usize,
    max_locals: usize,
    stack: Vec<VerificationCategory>,
    locals: Vec<VerificationCategory>,
    allocated_locals: HashMap<(LocalKeyCategory, i32), Local>,
    next_spill_index: i32,
    /// Bytecode-address keyed pending local-variable-table entries,
    /// used by the Squawk-primitive aliasing diagnostic.
    lvt_by_slot: HashMap<u16, Vec<crate::method::LocalVariableEntry>>,
}

impl Frame {
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            max_stack: max_stack as usize,
            max_locals: max_locals as usize,
            stack: Vec::new(),
            locals: vec![VerificationCategory::Top; max_locals as usize],
            allocated_locals: HashMap::new(),
            next_spill_index: -1,
            lvt_by_slot: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_local_variable_table(mut self, lvt: &[crate::method::LocalVariableEntry]) -> Self {
        for entry in lvt {
            self.lvt_by_slot.entry(entry.index).or_default().push(entry.clone());
        }
        self
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, category: VerificationCategory) -> Result<()> {
        let width = category.slot_width();
        if self.stack.len() + width as usize > self.max_stack {
            return Err(TranslationError::verify(
                format!("operand stack overflow: max_stack={}", self.max_stack),
                ErrorContext::new(),
            ));
        }
        if width == 2 {
            let sentinel = match &category {
                VerificationCategory::Long => VerificationCategory::Long2,
                VerificationCategory::Double => VerificationCategory::Double2,
                _ => unreachable!("only Long/Double are two slots wide"),
            };
            self.stack.push(category);
            self.stack.push(sentinel);
        } else {
            self.stack.push(category);
        }
        Ok(())
    }

    /// Pops one verifier-visible value, popping and checking its
    /// second-word sentinel first when the top of stack is wide.
    pub fn pop(&mut self) -> Result<VerificationCategory> {
        match self.stack.pop() {
            Some(VerificationCategory::Long2) => match self.stack.pop() {
                Some(VerificationCategory::Long) => Ok(VerificationCategory::Long),
                _ => Err(TranslationError::verify("expected Long beneath Long2 sentinel", ErrorContext::new())),
            },
            Some(VerificationCategory::Double2) => match self.stack.pop() {
                Some(VerificationCategory::Double) => Ok(VerificationCategory::Double),
                _ => Err(TranslationError::verify("expected Double beneath Double2 sentinel", ErrorContext::new())),
            },
            Some(other) => Ok(other),
            None => Err(TranslationError::verify("operand stack underflow", ErrorContext::new())),
        }
    }

    #[must_use]
    pub fn peek(&self) -> Option<&VerificationCategory> {
        self.stack.last()
    }

    #[must_use]
    pub fn stack_snapshot(&self) -> Vec<VerificationCategory> {
        self.stack.clone()
    }

    pub fn set_local(&mut self, javac_index: u16, category: VerificationCategory) -> Result<()> {
        self.check_squawk_primitive_alias(javac_index, &category)?;
        let width = category.slot_width() as usize;
        if javac_index as usize + width > self.locals.len() {
            return Err(TranslationError::verify(
                format!("local index {javac_index} out of bounds for max_locals={}", self.max_locals),
                ErrorContext::new(),
            ));
        }
        self.locals[javac_index as usize] = category.clone();
        if width == 2 {
            let sentinel = match &category {
                VerificationCategory::Long => VerificationCategory::Long2,
                VerificationCategory::Double => VerificationCategory::Double2,
                _ => unreachable!(),
            };
            self.locals[javac_index as usize + 1] = sentinel;
        }
        self.allocate_local(javac_index, category.local_key());
        Ok(())
    }

    #[must_use]
    pub fn get_local(&self, javac_index: u16) -> Option<&VerificationCategory> {
        self.locals.get(javac_index as usize)
    }

    fn allocate_local(&mut self, javac_index: u16, key: LocalKeyCategory) -> Local {
        *self
            .allocated_locals
            .entry((key, i32::from(javac_index)))
            .or_insert(Local { index: i32::from(javac_index), category: key })
    }

    /// Allocates an implementation-internal spill local, disjoint from
    /// any `javac` local, to hold a duplicated producer's result. The
    /// emitter may grow `max_stack` to accommodate these.
    pub fn spill(&mut self, category: LocalKeyCategory) -> Local {
        let index = self.next_spill_index;
        self.next_spill_index -= 1;
        let local = Local { index, category };
        self.allocated_locals.insert((category, index), local);
        local
    }

    /// Promotes every `UninitializedThis`/`Uninitialized(offset)`
    /// slot matching `new_site` in both stack and locals to
    /// `Reference(Some(class_name))`, in one sweep, as required after
    /// a chained constructor invocation. Pass `new_site = None` to
    /// promote `UninitializedThis` (the implicit constructor receiver).
    pub fn promote_uninitialized(&mut self, new_site: Option<u32>, class_name: &str) {
        let matches = |c: &VerificationCategory| match (c, new_site) {
            (VerificationCategory::UninitializedThis, None) => true,
            (VerificationCategory::Uninitialized(site), Some(target)) => *site == target,
            _ => false,
        };
        for slot in self.stack.iter_mut().chain(self.locals.iter_mut()) {
            if matches(slot) {
                *slot = VerificationCategory::Reference(Some(class_name.to_string()));
            }
        }
    }

    /// Replaces the entire stack and local-array contents outright,
    /// used by the code parser when a backward branch or exception
    /// handler target is reached and the recorded stack-map frame
    /// becomes authoritative.
    pub fn replace_state(&mut self, locals: Vec<VerificationCategory>, stack: Vec<VerificationCategory>) {
        self.locals = locals;
        self.stack = stack;
    }

    #[must_use]
    pub fn has_uninitialized_this(&self) -> bool {
        self.stack.iter().chain(self.locals.iter()).any(|c| *c == VerificationCategory::UninitializedThis)
    }

    /// Reports a `Verify` error if `javac_index` is about to be
    /// assigned a category that conflicts with a Squawk-primitive
    /// category already resident there, or vice versa, listing every
    /// LVT entry that overlaps the slot (spec §4.D's diagnostic
    /// requirement).
    fn check_squawk_primitive_alias(&self, javac_index: u16, incoming: &VerificationCategory) -> Result<()> {
        let Some(existing) = self.locals.get(javac_index as usize) else { return Ok(()) };
        let existing_is_primitive = existing.is_squawk_primitive();
        let incoming_is_primitive = incoming.is_squawk_primitive();
        let conflicts = (existing_is_primitive && !incoming_is_primitive && *existing != VerificationCategory::Top)
            || (incoming_is_primitive && !existing_is_primitive && *existing != VerificationCategory::Top);
        if !conflicts {
            return Ok(());
        }
        let overlapping = self.lvt_by_slot.get(&javac_index).cloned().unwrap_or_default();
        let names: Vec<&str> = overlapping.iter().map(|e| e.name.as_str()).collect();
        Err(TranslationError::verify(
            format!(
                "local slot {javac_index} aliases a Squawk primitive with a non-primitive category; overlapping LVT entries: {names:?}"
            ),
            ErrorContext::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_occupies_two_slots_and_pops_sentinel_first() {
        let mut frame = Frame::new(4, 0);
        frame.push(VerificationCategory::Long).unwrap();
        assert_eq!(frame.stack_depth(), 2);
        assert_eq!(frame.pop().unwrap(), VerificationCategory::Long);
        assert_eq!(frame.stack_depth(), 0);
    }

    #[test]
    fn stack_overflow_is_a_verify_error() {
        let mut frame = Frame::new(1, 0);
        frame.push(VerificationCategory::Int).unwrap();
        let err = frame.push(VerificationCategory::Int).unwrap_err();
        assert!(matches!(err, TranslationError::Verify { .. }));
    }

    #[test]
    fn promotion_sweeps_stack_and_locals_together() {
        let mut frame = Frame::new(4, 2);
        frame.push(VerificationCategory::UninitializedThis).unwrap();
        frame.set_local(0, VerificationCategory::UninitializedThis).unwrap();
        assert!(frame.has_uninitialized_this());
        frame.promote_uninitialized(None, "Main");
        assert!(!frame.has_uninitialized_this());
        assert_eq!(frame.get_local(0), Some(&VerificationCategory::Reference(Some("Main".to_string()))));
    }

    #[test]
    fn squawk_primitive_cannot_alias_a_reference_in_the_same_slot() {
        let lvt = vec![crate::method::LocalVariableEntry {
            start_pc: 0,
            length: 10,
            name: "addr".to_string(),
            descriptor: "Lcom/sun/squawk/Address;".to_string(),
            index: 3,
        }];
        let mut frame = Frame::new(4, 4).with_local_variable_table(&lvt);
        frame.set_local(3, VerificationCategory::Address).unwrap();
        let err = frame.set_local(3, VerificationCategory::Reference(Some("java/lang/Object".to_string()))).unwrap_err();
        match err {
            TranslationError::Verify { message, .. } => assert!(message.contains("addr")),
            other => panic!("expected Verify error, got {other:?}"),
        }
    }

    #[test]
    fn spill_locals_are_disjoint_from_javac_locals() {
        let mut frame = Frame::new(4, 2);
        let a = frame.spill(LocalKeyCategory::Int);
        let b = frame.spill(LocalKeyCategory::Int);
        assert!(a.index < 0 && b.index < 0);
        assert_ne!(a.index, b.index);
    }

    #[test]
    fn interface_widens_to_object_for_forward_merge() {
        let mut target = Target::new(10, vec![], vec![VerificationCategory::Reference(Some("java/lang/Object".to_string()))]);
        target.replace_with_recorded();
        let incoming = vec![VerificationCategory::Reference(Some("java/util/List".to_string()))];
        assert!(target.merge_forward(&incoming).is_ok());
    }
}
