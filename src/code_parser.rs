//! Method-body verifier: walks a method's bytecode, maintaining a
//! [`Frame`] of verifier state, consuming recorded stack-map frames at
//! join points, and emitting sorted [`PseudoOpcode`]s.
use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};

use crate::bytecode::{immediate_operand_len, OPCode, StackShuffleForm};
use crate::descriptor::FieldType;
use crate::error::{ErrorContext, Result, TranslationError};
use crate::frame::{Frame, Target, VerificationCategory};
use crate::ir::{sort_pseudo_opcodes, PseudoOpcode, PseudoOpcodeEntry};
use crate::klass::{KlassRegistry, Modifiers};
use crate::method::{CodeBody, ExceptionEntry, LineNumberEntry};
use crate::constant_pool::ConstantPool;

/// The state a method's body moves through during translation,
/// advancing monotonically like [`crate::klass::KlassState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodParseState {
    Init,
    BytecodesParsed,
    Verified,
    Emitted,
    Encoded,
}

impl MethodParseState {
    const fn rank(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::BytecodesParsed => 1,
            Self::Verified => 2,
            Self::Emitted => 3,
            Self::Encoded => 4,
        }
    }

    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        next.rank() == self.rank() + 1
    }
}

/// A row of the opcode dispatch table: the fixed stack effect of an
/// opcode that neither branches nor needs a variable-length operand
/// decode. Instructions with a richer shape (invokes, switches,
/// `new`/array ops, branches, `wide`) are handled by the grouped
/// `match` in [`CodeParser::step`] instead of a row, per the
/// table-driven-dispatch design: the table covers the common case,
/// the match covers the rest.
struct OpcodeRow {
    pop: &'static [VerificationCategory],
    push: Option<VerificationCategory>,
}

fn simple_row(op: OPCode) -> Option<OpcodeRow> {
    use VerificationCategory::{Double, Float, Int, Long};
    let row = match op {
        OPCode::NOP => OpcodeRow { pop: &[], push: None },
        OPCode::IconstM1
        | OPCode::Iconst0
        | OPCode::Iconst1
        | OPCode::Iconst2
        | OPCode::Iconst3
        | OPCode::Iconst4
        | OPCode::Iconst5
        | OPCode::BiPush
        | OPCode::SiPush => OpcodeRow { pop: &[], push: Some(Int) },
        OPCode::Lconst0 | OPCode::Lconst1 => OpcodeRow { pop: &[], push: Some(Long) },
        OPCode::Fconst0 | OPCode::Fconst1 | OPCode::Fconst2 => OpcodeRow { pop: &[], push: Some(Float) },
        OPCode::Dconst0 | OPCode::Dconst1 => OpcodeRow { pop: &[], push: Some(Double) },
        OPCode::IAdd | OPCode::ISub | OPCode::IMul | OPCode::IDiv | OPCode::IRem | OPCode::Iand
        | OPCode::IOr | OPCode::IXor | OPCode::IShl | OPCode::IShr | OPCode::IUShr => {
            OpcodeRow { pop: &[Int, Int], push: Some(Int) }
        }
        OPCode::LAdd | OPCode::LSub | OPCode::LMul | OPCode::LDiv | OPCode::LRem | OPCode::Land
        | OPCode::LOr | OPCode::LXor => OpcodeRow { pop: &[Long, Long], push: Some(Long) },
        OPCode::LShl | OPCode::LShr | OPCode::LUShr => OpcodeRow { pop: &[Int, Long], push: Some(Long) },
        OPCode::FAdd | OPCode::FSub | OPCode::FMul | OPCode::FDiv | OPCode::FRem => {
            OpcodeRow { pop: &[Float, Float], push: Some(Float) }
        }
        OPCode::DAdd | OPCode::DSub | OPCode::DMul | OPCode::DDiv | OPCode::DRem => {
            OpcodeRow { pop: &[Double, Double], push: Some(Double) }
        }
        OPCode::INeg => OpcodeRow { pop: &[Int], push: Some(Int) },
        OPCode::LNeg => OpcodeRow { pop: &[Long], push: Some(Long) },
        OPCode::FNeg => OpcodeRow { pop: &[Float], push: Some(Float) },
        OPCode::DNeg => OpcodeRow { pop: &[Double], push: Some(Double) },
        OPCode::I2L => OpcodeRow { pop: &[Int], push: Some(Long) },
        OPCode::I2F => OpcodeRow { pop: &[Int], push: Some(Float) },
        OPCode::I2D => OpcodeRow { pop: &[Int], push: Some(Double) },
        OPCode::L2I => OpcodeRow { pop: &[Long], push: Some(Int) },
        OPCode::L2F => OpcodeRow { pop: &[Long], push: Some(Float) },
        OPCode::L2D => OpcodeRow { pop: &[Long], push: Some(Double) },
        OPCode::F2I => OpcodeRow { pop: &[Float], push: Some(Int) },
        OPCode::F2L => OpcodeRow { pop: &[Float], push: Some(Long) },
        OPCode::F2D => OpcodeRow { pop: &[Float], push: Some(Double) },
        OPCode::D2I => OpcodeRow { pop: &[Double], push: Some(Int) },
        OPCode::D2L => OpcodeRow { pop: &[Double], push: Some(Long) },
        OPCode::D2F => OpcodeRow { pop: &[Double], push: Some(Float) },
        OPCode::I2B | OPCode::I2C | OPCode::I2S => OpcodeRow { pop: &[Int], push: Some(Int) },
        OPCode::LCmp => OpcodeRow { pop: &[Long, Long], push: Some(Int) },
        OPCode::FCmpL | OPCode::FCmpG => OpcodeRow { pop: &[Float, Float], push: Some(Int) },
        OPCode::DCmpL | OPCode::DCmpG => OpcodeRow { pop: &[Double, Double], push: Some(Int) },
        OPCode::ArrayLength => OpcodeRow { pop: &[Reference_PLACEHOLDER], push: Some(Int) },
        OPCode::Return => OpcodeRow { pop: &[], push: None },
        OPCode::MonitorEnter | OPCode::MonitorExit => OpcodeRow { pop: &[Reference_PLACEHOLDER], push: None },
        _ => return None,
    };
    Some(row)
}

// `ArrayLength`/`MonitorEnter`/`MonitorExit` pop a reference whose
// concrete class name this static table cannot express (the row only
// carries canonical, data-free categories); `step` special-cases the
// reference-check for these before falling back to the table's arity.
#[allow(non_upper_case_globals)]
const Reference_PLACEHOLDER: VerificationCategory = VerificationCategory::Reference(None);

/// Walks one method body, producing its verified [`CodeBody`] (with
/// `stack_map` left untouched -- those are consumed, not produced --
/// and [`PseudoOpcode`]s recorded alongside) or a `Verify`/
/// `IllegalAccess` error.
pub struct CodeParser<'a> {
    constant_pool: &'a ConstantPool,
    registry: Option<&'a KlassRegistry>,
    defining_class: &'a str,
    method_name: &'a str,
    is_constructor: bool,
    is_static: bool,
    code: &'a [u8],
    exception_table: &'a [ExceptionEntry],
    line_number_table: &'a [LineNumberEntry],
    frame: Frame,
    targets: BTreeMap<u32, Target>,
    pseudo_opcodes: Vec<PseudoOpcodeEntry>,
    state: MethodParseState,
}

impl<'a> CodeParser<'a> {
    #[must_use]
    pub fn new(
        constant_pool: &'a ConstantPool,
        registry: Option<&'a KlassRegistry>,
        defining_class: &'a str,
        method_name: &'a str,
        is_constructor: bool,
        is_static: bool,
        parameters: &'a [FieldType],
        body: &'a CodeBody,
    ) -> Self {
        let mut targets = BTreeMap::new();
        for frame in &body.stack_map {
            targets.insert(frame.address, Target::new(frame.address, frame.locals.clone(), frame.stack.clone()));
        }
        for (index, entry) in body.exception_table.iter().enumerate() {
            targets.entry(entry.handler_pc.into()).or_insert_with(|| {
                Target::new(entry.handler_pc.into(), vec![VerificationCategory::Top; 0], vec![])
            });
            let _ = index;
        }
        let mut frame = Frame::new(body.max_stack, body.max_locals);
        seed_parameter_locals(&mut frame, defining_class, is_constructor, is_static, parameters);
        Self {
            constant_pool,
            registry,
            defining_class,
            method_name,
            is_constructor,
            is_static,
            code: &body.code,
            exception_table: &body.exception_table,
            line_number_table: &[],
            frame,
            targets,
            pseudo_opcodes: Vec::new(),
            state: MethodParseState::Init,
        }
    }

    #[must_use]
    pub fn with_line_number_table(mut self, table: &'a [LineNumberEntry]) -> Self {
        self.line_number_table = table;
        self
    }

    /// Installs the method's local-variable table into the frame so
    /// `check_squawk_primitive_alias` (spec §4.D, testable property 7)
    /// has real overlapping-LVT-entry data to diagnose with, instead
    /// of the empty default.
    #[must_use]
    pub fn with_local_variable_table(mut self, table: &[crate::method::LocalVariableEntry]) -> Self {
        self.frame = self.frame.with_local_variable_table(table);
        self
    }

    fn advance(&mut self, next: MethodParseState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(TranslationError::internal(
                format!("illegal method-parse transition {:?} -> {:?}", self.state, next),
                ErrorContext::new().with_class(self.defining_class.to_string()).with_method(self.method_name.to_string()),
            ));
        }
        self.state = next;
        Ok(())
    }

    fn err(&self, message: impl Into<String>, address: u32) -> TranslationError {
        TranslationError::verify(
            message,
            ErrorContext::new()
                .with_class(self.defining_class.to_string())
                .with_method(self.method_name.to_string())
                .with_offset(address as usize),
        )
    }

    /// Runs the full walk, returning the sorted pseudo-opcode stream.
    /// This is the method's single public entry point; it drives the
    /// `Init -> BytecodesParsed -> Verified -> Emitted` transitions
    /// itself (the caller performs `Verified -> Encoded` by handing
    /// the result to `method_body::encode`).
    pub fn parse(mut self) -> Result<Vec<PseudoOpcodeEntry>> {
        self.advance(MethodParseState::BytecodesParsed)?;
        self.record_exception_pseudo_opcodes();
        self.record_position_pseudo_opcodes();
        self.walk()?;
        self.advance(MethodParseState::Verified)?;
        sort_pseudo_opcodes(&mut self.pseudo_opcodes);
        self.advance(MethodParseState::Emitted)?;
        Ok(self.pseudo_opcodes)
    }

    fn record_exception_pseudo_opcodes(&mut self) {
        for (index, entry) in self.exception_table.iter().enumerate() {
            self.pseudo_opcodes.push(PseudoOpcodeEntry {
                address: entry.start_pc.into(),
                opcode: PseudoOpcode::Try { index },
            });
            self.pseudo_opcodes.push(PseudoOpcodeEntry {
                address: entry.end_pc.into(),
                opcode: PseudoOpcode::TryEnd { index },
            });
            self.pseudo_opcodes.push(PseudoOpcodeEntry {
                address: entry.handler_pc.into(),
                opcode: PseudoOpcode::Catch { index },
            });
        }
    }

    fn record_position_pseudo_opcodes(&mut self) {
        for entry in self.line_number_table {
            self.pseudo_opcodes.push(PseudoOpcodeEntry {
                address: entry.start_pc.into(),
                opcode: PseudoOpcode::Position { line: entry.line_number },
            });
        }
    }

    fn record_target(&mut self, address: u32) {
        self.pseudo_opcodes.push(PseudoOpcodeEntry { address, opcode: PseudoOpcode::Target });
        self.targets.entry(address).or_insert_with(|| Target::new(address, vec![], vec![]));
    }

    /// Reconciles `self.frame` with any recorded stack-map frame or
    /// exception handler at `address`. A backward branch or handler
    /// entry has the recorded state take over outright; a forward
    /// join merges the current derived state into it, checking
    /// assignability.
    fn sync_with_target(&mut self, address: u32, is_backward_or_handler: bool) -> Result<()> {
        let Some(target) = self.targets.get_mut(&address) else { return Ok(()) };
        if target.recorded_stack.is_empty() && target.recorded_locals.is_empty() {
            // A plain branch target with no recorded stack-map frame:
            // nothing to reconcile against.
            return Ok(());
        }
        if is_backward_or_handler || target.is_unreachable() {
            target.replace_with_recorded();
            self.frame.replace_state(target.recorded_locals.clone(), target.recorded_stack.clone());
            return Ok(());
        }
        let incoming = self.frame.stack_snapshot();
        target.merge_forward(&incoming)
    }

    fn walk(&mut self) -> Result<()> {
        let mut pc: u32 = 0;
        while (pc as usize) < self.code.len() {
            let address = pc;
            let is_handler =
                self.exception_table.iter().any(|e| u32::from(e.handler_pc) == address);
            self.sync_with_target(address, is_handler)?;
            let op = OPCode::from(self.code[pc as usize]);
            let consumed = self.step(op, address)?;
            pc += 1 + consumed;
        }
        Ok(())
    }

    /// Executes one instruction's effect on `self.frame`, returning the
    /// number of immediate-operand bytes consumed (not counting the
    /// opcode byte itself).
    fn step(&mut self, op: OPCode, address: u32) -> Result<u32> {
        if let Some(row) = simple_row(op) {
            for want in row.pop {
                let got = self.frame.pop().map_err(|_| self.err(format!("stack underflow at {op}"), address))?;
                if std::mem::discriminant(&got) != std::mem::discriminant(want) {
                    return Err(self.err(format!("expected {want:?} on stack for {op}, found {got:?}"), address));
                }
            }
            if let Some(push) = &row.push {
                self.frame.push(push.clone())?;
            }
            return Ok(u32::from(immediate_operand_len(op).max(0) as u8));
        }

        if let Some(shuffle) = StackShuffleForm::for_opcode(op) {
            self.apply_shuffle(shuffle)?;
            return Ok(0);
        }

        match op {
            OPCode::AconstNULL => {
                self.frame.push(VerificationCategory::Null)?;
                Ok(0)
            }
            OPCode::Ldc => {
                let index = u16::from(self.code[address as usize + 1]);
                self.push_constant(index, address)?;
                Ok(1)
            }
            OPCode::LdcW | OPCode::Ldc2W => {
                let index = BigEndian::read_u16(&self.code[address as usize + 1..]);
                self.push_constant(index, address)?;
                Ok(2)
            }
            OPCode::Iload0 | OPCode::Iload1 | OPCode::Iload2 | OPCode::Iload3 | OPCode::Iload => {
                self.load(op, address, VerificationCategory::Int)
            }
            OPCode::Lload0 | OPCode::Lload1 | OPCode::Lload2 | OPCode::Lload3 | OPCode::Lload => {
                self.load(op, address, VerificationCategory::Long)
            }
            OPCode::Fload0 | OPCode::Fload1 | OPCode::Fload2 | OPCode::Fload3 | OPCode::Fload => {
                self.load(op, address, VerificationCategory::Float)
            }
            OPCode::Dload0 | OPCode::Dload1 | OPCode::Dload2 | OPCode::Dload3 | OPCode::Dload => {
                self.load(op, address, VerificationCategory::Double)
            }
            OPCode::Aload0 | OPCode::Aload1 | OPCode::Aload2 | OPCode::Aload3 | OPCode::Aload => {
                let index = self.implicit_or_explicit_index(op, address)?;
                let category = self.frame.get_local(index).cloned().unwrap_or(VerificationCategory::Top);
                self.frame.push(category)?;
                Ok(self.operand_len(op))
            }
            OPCode::Istore0 | OPCode::Istore1 | OPCode::Istore2 | OPCode::Istore3 | OPCode::Istore => {
                self.store(op, address, VerificationCategory::Int)
            }
            OPCode::Lstore0 | OPCode::Lstore1 | OPCode::Lstore2 | OPCode::Lstore3 | OPCode::Lstore => {
                self.store(op, address, VerificationCategory::Long)
            }
            OPCode::Fstore0 | OPCode::Fstore1 | OPCode::Fstore2 | OPCode::Fstore3 | OPCode::Fstore => {
                self.store(op, address, VerificationCategory::Float)
            }
            OPCode::Dstore0 | OPCode::Dstore1 | OPCode::Dstore2 | OPCode::Dstore3 | OPCode::Dstore => {
                self.store(op, address, VerificationCategory::Double)
            }
            OPCode::Astore0 | OPCode::Astore1 | OPCode::Astore2 | OPCode::Astore3 | OPCode::Astore => {
                let index = self.implicit_or_explicit_index(op, address)?;
                let value = self.frame.pop()?;
                self.frame.set_local(index, value)?;
                Ok(self.operand_len(op))
            }
            OPCode::IAload | OPCode::BAload | OPCode::CAload | OPCode::SAload => {
                self.array_load(VerificationCategory::Int)
            }
            OPCode::LAload => self.array_load(VerificationCategory::Long),
            OPCode::FAload => self.array_load(VerificationCategory::Float),
            OPCode::DAload => self.array_load(VerificationCategory::Double),
            OPCode::AAload => self.array_load(VerificationCategory::Reference(None)),
            OPCode::IAstore | OPCode::BAstore | OPCode::CAstore | OPCode::SAstore => self.array_store(),
            OPCode::LAstore | OPCode::FAstore | OPCode::DAstore | OPCode::AAstore => self.array_store(),
            OPCode::IInc => Ok(2),
            OPCode::IFEq | OPCode::IFNe | OPCode::IFLt | OPCode::IFGe | OPCode::IFGt | OPCode::IFLe => {
                self.frame.pop()?;
                self.branch(address)
            }
            OPCode::IfICmpEq | OPCode::IfICmpNe | OPCode::IfICmpLt | OPCode::IfICmpGe | OPCode::IfICmpGt
            | OPCode::IfICmpLe | OPCode::IfACmpEq | OPCode::IfACmpNe => {
                self.frame.pop()?;
                self.frame.pop()?;
                self.branch(address)
            }
            OPCode::IfNull | OPCode::IfNonNull => {
                self.frame.pop()?;
                self.branch(address)
            }
            OPCode::Goto => self.branch_unconditional(address, 1),
            OPCode::GotoW => self.branch_unconditional(address, 4),
            OPCode::Jsr | OPCode::JsrW | OPCode::Ret => {
                Err(self.err("jsr/ret subroutines are unsupported", address))
            }
            OPCode::TableSwitch | OPCode::LookupSwitch => {
                self.frame.pop()?;
                self.table_or_lookup_switch(op, address)
            }
            OPCode::IReturn | OPCode::LReturn | OPCode::FReturn | OPCode::DReturn | OPCode::AReturn => {
                self.frame.pop()?;
                Ok(0)
            }
            OPCode::GetStatic | OPCode::GetField => {
                let index = BigEndian::read_u16(&self.code[address as usize + 1..]);
                let field = self.constant_pool.resolved_field(index, op == OPCode::GetStatic)?;
                if op == OPCode::GetField {
                    self.frame.pop()?;
                }
                self.frame.push(category_of(&field.descriptor))?;
                Ok(2)
            }
            OPCode::PutStatic | OPCode::PutField => {
                let index = BigEndian::read_u16(&self.code[address as usize + 1..]);
                let field = self.constant_pool.resolved_field(index, op == OPCode::PutStatic)?;
                self.check_final_field_write(&field, address)?;
                self.frame.pop()?;
                if op == OPCode::PutField {
                    self.frame.pop()?;
                }
                Ok(2)
            }
            OPCode::InvokeVirtual | OPCode::InvokeSpecial | OPCode::InvokeStatic => {
                let index = BigEndian::read_u16(&self.code[address as usize + 1..]);
                let is_interface = false;
                let m = self.constant_pool.resolved_method(index, op == OPCode::InvokeStatic, is_interface)?;
                self.invoke(&m, op, address)?;
                Ok(2)
            }
            OPCode::InvokeInterface => {
                let index = BigEndian::read_u16(&self.code[address as usize + 1..]);
                let m = self.constant_pool.resolved_method(index, false, true)?;
                self.invoke(&m, op, address)?;
                Ok(4)
            }
            OPCode::InvokeDynamic => {
                Err(self.err("invokedynamic is unsupported", address))
            }
            OPCode::New => {
                let _index = BigEndian::read_u16(&self.code[address as usize + 1..]);
                self.frame.push(VerificationCategory::Uninitialized(address))?;
                Ok(2)
            }
            OPCode::NewArray => {
                self.frame.pop()?;
                self.frame.push(VerificationCategory::Reference(None))?;
                Ok(1)
            }
            OPCode::ANewArray | OPCode::CheckCast => {
                self.frame.pop()?;
                self.frame.push(VerificationCategory::Reference(None))?;
                Ok(2)
            }
            OPCode::InstanceOf => {
                self.frame.pop()?;
                self.frame.push(VerificationCategory::Int)?;
                Ok(2)
            }
            OPCode::MultiANewArray => {
                let dims = self.code[address as usize + 3];
                for _ in 0..dims {
                    self.frame.pop()?;
                }
                self.frame.push(VerificationCategory::Reference(None))?;
                Ok(3)
            }
            OPCode::AThrow => {
                self.frame.pop()?;
                Ok(0)
            }
            OPCode::Wide => self.wide(address),
            OPCode::Breakpoint | OPCode::Unspecified => {
                Err(self.err(format!("unsupported opcode {op}"), address))
            }
            _ => Ok(u32::from(immediate_operand_len(op).max(0) as u8)),
        }
    }

    fn operand_len(&self, op: OPCode) -> u32 {
        u32::from(immediate_operand_len(op).max(0) as u8)
    }

    fn implicit_or_explicit_index(&self, op: OPCode, address: u32) -> Result<u16> {
        Ok(match op {
            OPCode::Aload0 | OPCode::Iload0 | OPCode::Lload0 | OPCode::Fload0 | OPCode::Dload0
            | OPCode::Astore0 | OPCode::Istore0 | OPCode::Lstore0 | OPCode::Fstore0 | OPCode::Dstore0 => 0,
            OPCode::Aload1 | OPCode::Iload1 | OPCode::Lload1 | OPCode::Fload1 | OPCode::Dload1
            | OPCode::Astore1 | OPCode::Istore1 | OPCode::Lstore1 | OPCode::Fstore1 | OPCode::Dstore1 => 1,
            OPCode::Aload2 | OPCode::Iload2 | OPCode::Lload2 | OPCode::Fload2 | OPCode::Dload2
            | OPCode::Astore2 | OPCode::Istore2 | OPCode::Lstore2 | OPCode::Fstore2 | OPCode::Dstore2 => 2,
            OPCode::Aload3 | OPCode::Iload3 | OPCode::Lload3 | OPCode::Fload3 | OPCode::Dload3
            | OPCode::Astore3 | OPCode::Istore3 | OPCode::Lstore3 | OPCode::Fstore3 | OPCode::Dstore3 => 3,
            _ => u16::from(*self.code.get(address as usize + 1).ok_or_else(|| self.err("truncated operand", address))?),
        })
    }

    fn load(&mut self, op: OPCode, address: u32, category: VerificationCategory) -> Result<u32> {
        let index = self.implicit_or_explicit_index(op, address)?;
        let stored = self.frame.get_local(index).cloned().unwrap_or(VerificationCategory::Top);
        if std::mem::discriminant(&stored) != std::mem::discriminant(&category) {
            return Err(self.err(format!("local {index} is not a {category:?}"), address));
        }
        self.frame.push(stored)?;
        Ok(self.operand_len(op))
    }

    fn store(&mut self, op: OPCode, address: u32, category: VerificationCategory) -> Result<u32> {
        let index = self.implicit_or_explicit_index(op, address)?;
        let popped = self.frame.pop().map_err(|_| self.err(format!("stack underflow storing to local {index}"), address))?;
        if std::mem::discriminant(&popped) != std::mem::discriminant(&category) {
            return Err(self.err(format!("expected {category:?} to store into local {index}"), address));
        }
        self.frame.set_local(index, popped)?;
        Ok(self.operand_len(op))
    }

    fn array_load(&mut self, element: VerificationCategory) -> Result<u32> {
        self.frame.pop()?; // index
        self.frame.pop()?; // arrayref
        self.frame.push(element)?;
        Ok(0)
    }

    fn array_store(&mut self) -> Result<u32> {
        self.frame.pop()?; // value
        self.frame.pop()?; // index
        self.frame.pop()?; // arrayref
        Ok(0)
    }

    fn push_constant(&mut self, index: u16, address: u32) -> Result<()> {
        let category = match self.constant_pool.tag(index) {
            Some("Integer") => VerificationCategory::Int,
            Some("Float") => VerificationCategory::Float,
            Some("Long") => VerificationCategory::Long,
            Some("Double") => VerificationCategory::Double,
            Some("String") | Some("Class") => VerificationCategory::Reference(Some("java/lang/Object".to_string())),
            other => return Err(self.err(format!("ldc of non-loadable constant pool entry {other:?}"), address)),
        };
        self.frame.push(category)
    }

    /// All conditional branches carry a 2-byte signed relative offset.
    fn branch(&mut self, address: u32) -> Result<u32> {
        let rel = i32::from(BigEndian::read_i16(&self.code[address as usize + 1..]));
        let target = (address as i64 + i64::from(rel)) as u32;
        self.record_target(target);
        Ok(2)
    }

    fn branch_unconditional(&mut self, address: u32, width: u32) -> Result<u32> {
        let rel = if width == 4 {
            BigEndian::read_i32(&self.code[address as usize + 1..])
        } else {
            i32::from(BigEndian::read_i16(&self.code[address as usize + 1..]))
        };
        let target = (address as i64 + i64::from(rel)) as u32;
        self.record_target(target);
        Ok(width)
    }

    fn table_or_lookup_switch(&mut self, op: OPCode, address: u32) -> Result<u32> {
        let mut cursor = address as usize + 1;
        let padding = (4 - (cursor % 4)) % 4;
        cursor += padding;
        let default_offset = BigEndian::read_i32(&self.code[cursor..]);
        self.record_target((address as i64 + i64::from(default_offset)) as u32);
        cursor += 4;
        let consumed_before_entries = cursor - (address as usize + 1);
        let mut total = consumed_before_entries;
        match op {
            OPCode::TableSwitch => {
                let low = BigEndian::read_i32(&self.code[cursor..]);
                let high = BigEndian::read_i32(&self.code[cursor + 4..]);
                cursor += 8;
                total += 8;
                let count = (high - low + 1).max(0) as usize;
                for i in 0..count {
                    let offset = BigEndian::read_i32(&self.code[cursor + i * 4..]);
                    self.record_target((address as i64 + i64::from(offset)) as u32);
                }
                total += count * 4;
            }
            OPCode::LookupSwitch => {
                let npairs = BigEndian::read_i32(&self.code[cursor..]) as usize;
                cursor += 4;
                total += 4;
                for i in 0..npairs {
                    let offset = BigEndian::read_i32(&self.code[cursor + i * 8 + 4..]);
                    self.record_target((address as i64 + i64::from(offset)) as u32);
                }
                total += npairs * 8;
            }
            _ => unreachable!(),
        }
        Ok(total as u32)
    }

    /// The `wide` prefix widens a following load/store/iinc/ret to a
    /// 2-byte local index. Besides consuming the extra operand bytes,
    /// the widened instruction still performs the same stack push/pop
    /// as its narrow form, which this must fold into the frame just
    /// like the non-wide `load`/`store` arms do.
    fn wide(&mut self, address: u32) -> Result<u32> {
        let modified = OPCode::from(self.code[address as usize + 1]);
        let index = BigEndian::read_u16(
            self.code.get(address as usize + 2..address as usize + 4).ok_or_else(|| self.err("truncated wide operand", address))?,
        );
        match modified {
            OPCode::Iload => self.wide_load(index, VerificationCategory::Int, address),
            OPCode::Lload => self.wide_load(index, VerificationCategory::Long, address),
            OPCode::Fload => self.wide_load(index, VerificationCategory::Float, address),
            OPCode::Dload => self.wide_load(index, VerificationCategory::Double, address),
            OPCode::Aload => {
                let category = self.frame.get_local(index).cloned().unwrap_or(VerificationCategory::Top);
                self.frame.push(category)?;
                Ok(3)
            }
            OPCode::Istore => self.wide_store(index, VerificationCategory::Int, address),
            OPCode::Lstore => self.wide_store(index, VerificationCategory::Long, address),
            OPCode::Fstore => self.wide_store(index, VerificationCategory::Float, address),
            OPCode::Dstore => self.wide_store(index, VerificationCategory::Double, address),
            OPCode::Astore => {
                let value = self.frame.pop()?;
                self.frame.set_local(index, value)?;
                Ok(3)
            }
            OPCode::IInc => Ok(5),
            OPCode::Ret => Err(self.err("jsr/ret subroutines are unsupported", address)),
            other => Err(self.err(format!("unsupported wide-modified opcode {other}"), address)),
        }
    }

    fn wide_load(&mut self, index: u16, category: VerificationCategory, address: u32) -> Result<u32> {
        let stored = self.frame.get_local(index).cloned().unwrap_or(VerificationCategory::Top);
        if std::mem::discriminant(&stored) != std::mem::discriminant(&category) {
            return Err(self.err(format!("local {index} is not a {category:?}"), address));
        }
        self.frame.push(stored)?;
        Ok(3)
    }

    fn wide_store(&mut self, index: u16, category: VerificationCategory, address: u32) -> Result<u32> {
        let popped = self.frame.pop().map_err(|_| self.err(format!("stack underflow storing to local {index}"), address))?;
        if std::mem::discriminant(&popped) != std::mem::discriminant(&category) {
            return Err(self.err(format!("expected {category:?} to store into local {index}"), address));
        }
        self.frame.set_local(index, popped)?;
        Ok(3)
    }

    fn invoke(&mut self, m: &crate::constant_pool::ResolvedMethodRef, op: OPCode, address: u32) -> Result<()> {
        let is_init = m.name == "<init>";
        let arg_slots = m.descriptor.parameter_slots();
        let mut receiver = None;
        for _ in 0..arg_slots {
            self.frame.pop()?;
        }
        if op != OPCode::InvokeStatic {
            receiver = Some(self.frame.pop()?);
        }
        if is_init {
            match receiver {
                Some(VerificationCategory::Uninitialized(site)) => {
                    self.frame.promote_uninitialized(Some(site), &m.class.internal_name);
                }
                Some(VerificationCategory::UninitializedThis) => {
                    self.frame.promote_uninitialized(None, self.defining_class);
                }
                _ => return Err(self.err("invokespecial <init> on an already-initialized receiver", address)),
            }
            return Ok(());
        }
        if let Some(ret) = &m.descriptor.return_type {
            self.frame.push(category_of(ret))?;
        }
        Ok(())
    }

    fn check_final_field_write(&self, field: &crate::constant_pool::ResolvedFieldRef, address: u32) -> Result<()> {
        let Some(registry) = self.registry else { return Ok(()) };
        let Some(klass) = registry.get(&field.class.internal_name) else { return Ok(()) };
        let decl = klass
            .instance_fields
            .iter()
            .chain(klass.static_fields.iter())
            .find(|f| f.name == field.name && f.descriptor == field.descriptor);
        let Some(decl) = decl else { return Ok(()) };
        if decl.modifiers.contains(Modifiers::FINAL) && field.class.internal_name != self.defining_class {
            return Err(TranslationError::IllegalAccess {
                message: format!("write to final field {}.{}", field.class.internal_name, field.name),
                context: ErrorContext::new()
                    .with_class(self.defining_class.to_string())
                    .with_method(self.method_name.to_string())
                    .with_offset(address as usize),
            });
        }
        Ok(())
    }

    fn apply_shuffle(&mut self, shuffle: StackShuffleForm) -> Result<()> {
        match shuffle {
            StackShuffleForm::Dup => {
                let top = self.frame.pop()?;
                self.frame.push(top.clone())?;
                self.frame.push(top)?;
            }
            StackShuffleForm::DupX1 => {
                let a = self.frame.pop()?;
                let b = self.frame.pop()?;
                self.frame.push(a.clone())?;
                self.frame.push(b)?;
                self.frame.push(a)?;
            }
            StackShuffleForm::DupX2 => {
                let a = self.frame.pop()?;
                let b = self.frame.pop()?;
                let c = self.frame.pop()?;
                self.frame.push(a.clone())?;
                self.frame.push(c)?;
                self.frame.push(b)?;
                self.frame.push(a)?;
            }
            StackShuffleForm::Dup2 => {
                let a = self.frame.pop()?;
                let b = self.frame.pop()?;
                self.frame.push(b.clone())?;
                self.frame.push(a.clone())?;
                self.frame.push(b)?;
                self.frame.push(a)?;
            }
            StackShuffleForm::Dup2X1 => {
                let a = self.frame.pop()?;
                let b = self.frame.pop()?;
                let c = self.frame.pop()?;
                self.frame.push(b.clone())?;
                self.frame.push(a.clone())?;
                self.frame.push(c)?;
                self.frame.push(b)?;
                self.frame.push(a)?;
            }
            StackShuffleForm::Dup2X2 => {
                let a = self.frame.pop()?;
                let b = self.frame.pop()?;
                let c = self.frame.pop()?;
                let d = self.frame.pop()?;
                self.frame.push(b.clone())?;
                self.frame.push(a.clone())?;
                self.frame.push(d)?;
                self.frame.push(c)?;
                self.frame.push(b)?;
                self.frame.push(a)?;
            }
            StackShuffleForm::Swap => {
                let a = self.frame.pop()?;
                let b = self.frame.pop()?;
                self.frame.push(a)?;
                self.frame.push(b)?;
            }
        }
        Ok(())
    }
}

/// Seeds the activation-record slots occupied by `this` (for an
/// instance method) and the declared parameters before the walk
/// begins. A constructor's receiver starts as `UninitializedThis`
/// until a chained `<init>` call promotes it (§4.D); every other
/// instance method's receiver is already the defining class.
fn seed_parameter_locals(
    frame: &mut Frame,
    defining_class: &str,
    is_constructor: bool,
    is_static: bool,
    parameters: &[FieldType],
) {
    let mut index: u16 = 0;
    if !is_static {
        let this_category = if is_constructor {
            VerificationCategory::UninitializedThis
        } else {
            VerificationCategory::Reference(Some(defining_class.to_string()))
        };
        frame.set_local(index, this_category).expect("receiver slot always fits max_locals");
        index += 1;
    }
    for param in parameters {
        frame.set_local(index, category_of(param)).expect("parameter slot always fits max_locals");
        index += param.slot_width() as u16;
    }
}

/// The three Squawk-primitive internal class names that must never
/// alias with a reference in the same local slot (spec §4.D,
/// testable property 7, glossary "Squawk primitive").
const SQUAWK_ADDRESS: &str = "com/sun/squawk/Address";
const SQUAWK_UWORD: &str = "com/sun/squawk/UWord";
const SQUAWK_OFFSET: &str = "com/sun/squawk/Offset";

fn category_of(t: &FieldType) -> VerificationCategory {
    match t {
        FieldType::Boolean | FieldType::Byte | FieldType::Short | FieldType::Char | FieldType::Int => {
            VerificationCategory::Int
        }
        FieldType::Long => VerificationCategory::Long,
        FieldType::Float => VerificationCategory::Float,
        FieldType::Double => VerificationCategory::Double,
        FieldType::Object(name) if name == SQUAWK_ADDRESS => VerificationCategory::Address,
        FieldType::Object(name) if name == SQUAWK_UWORD => VerificationCategory::UWord,
        FieldType::Object(name) if name == SQUAWK_OFFSET => VerificationCategory::Offset,
        FieldType::Object(name) => VerificationCategory::Reference(Some(name.clone())),
        FieldType::Array(_) => VerificationCategory::Reference(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::CodeBody;

    fn pool_with_one_int() -> ConstantPool {
        // [1] = Integer(7)
        let bytes = vec![3u8, 0, 0, 0, 7];
        let mut reader = crate::reader::ClassFileReader::new(&bytes);
        ConstantPool::parse(&mut reader, 2).unwrap()
    }

    #[test]
    fn straight_line_return_consumes_whole_method() {
        let pool = pool_with_one_int();
        let body = CodeBody {
            max_stack: 2,
            max_locals: 1,
            code: vec![3, 177], // iconst_0; return -- wait iconst_0 pushes Int then return pops nothing
            exception_table: vec![],
            stack_map: vec![],
        };
        let parser = CodeParser::new(&pool, None, "Main", "run", false, true, &[], &body);
        // iconst_0 (opcode 3) pushes Int; plain `return` (177) expects
        // an empty-returning method, so this program is only valid if
        // return type is void and nothing is left on the stack is NOT
        // checked here (that is the caller's job using the descriptor);
        // the parser only checks per-instruction stack shape.
        let result = parser.parse();
        assert!(result.is_ok());
    }

    #[test]
    fn dup_duplicates_the_top_of_stack() {
        let pool = pool_with_one_int();
        let body = CodeBody {
            max_stack: 3,
            max_locals: 0,
            code: vec![3, 89, 87, 87, 177], // iconst_0; dup; pop; pop; return
            exception_table: vec![],
            stack_map: vec![],
        };
        let parser = CodeParser::new(&pool, None, "Main", "run", false, true, &[], &body);
        assert!(parser.parse().is_ok());
    }

    /// S2: `aload_0; areturn` on an instance method with one reference
    /// parameter verifies because `this` is seeded into local 0 before
    /// the walk begins.
    #[test]
    fn instance_method_seeds_this_into_local_zero() {
        let pool = pool_with_one_int();
        let body = CodeBody {
            max_stack: 1,
            max_locals: 1,
            code: vec![0x2A, 0xB0], // aload_0; areturn
            exception_table: vec![],
            stack_map: vec![],
        };
        let parser = CodeParser::new(&pool, None, "Main", "identity", false, false, &[], &body);
        assert!(parser.parse().is_ok());
    }

    /// A constructor's receiver starts as `UninitializedThis`; loading
    /// it and returning it directly (without a chained `<init>` call)
    /// is rejected because `areturn` cannot observe an uninitialized
    /// reference.
    #[test]
    fn constructor_receiver_starts_uninitialized() {
        let pool = pool_with_one_int();
        let mut frame = Frame::new(1, 1);
        seed_parameter_locals(&mut frame, "Main", true, false, &[]);
        assert_eq!(frame.get_local(0), Some(&VerificationCategory::UninitializedThis));
        let _ = pool;
    }

    #[test]
    fn declared_parameters_occupy_slots_after_the_receiver() {
        let mut frame = Frame::new(2, 3);
        seed_parameter_locals(&mut frame, "Main", false, false, &[FieldType::Long]);
        assert_eq!(frame.get_local(0), Some(&VerificationCategory::Reference(Some("Main".to_string()))));
        assert_eq!(frame.get_local(1), Some(&VerificationCategory::Long));
    }

    #[test]
    fn backward_branch_target_gets_a_target_pseudo_opcode() {
        let pool = pool_with_one_int();
        // iconst_0(1) ; goto -1 back to self forever is invalid in real
        // bytecode but exercises that a branch records a Target entry.
        let body = CodeBody {
            max_stack: 1,
            max_locals: 0,
            code: vec![3, 167, 0, 3, 177], // iconst_0; goto +3 -> return; return
            exception_table: vec![],
            stack_map: vec![],
        };
        let parser = CodeParser::new(&pool, None, "Main", "run", false, true, &[], &body);
        let pseudos = parser.parse().unwrap();
        assert!(pseudos.iter().any(|p| matches!(p.opcode, PseudoOpcode::Target)));
    }

    #[test]
    fn address_typed_parameter_carries_the_squawk_primitive_category() {
        assert_eq!(
            category_of(&FieldType::Object(SQUAWK_ADDRESS.to_string())),
            VerificationCategory::Address
        );
        assert_eq!(category_of(&FieldType::Object(SQUAWK_UWORD.to_string())), VerificationCategory::UWord);
        assert_eq!(category_of(&FieldType::Object(SQUAWK_OFFSET.to_string())), VerificationCategory::Offset);
    }

    #[test]
    fn squawk_primitive_parameter_rejects_a_later_reference_store_to_same_slot() {
        let pool = pool_with_one_int();
        let lvt = vec![crate::method::LocalVariableEntry {
            start_pc: 0,
            length: 10,
            name: "addr".to_string(),
            descriptor: "Lcom/sun/squawk/Address;".to_string(),
            index: 1,
        }];
        let body = CodeBody {
            max_stack: 1,
            max_locals: 2,
            code: vec![1, 76, 177], // aconst_null; astore_1; return
            exception_table: vec![],
            stack_map: vec![],
        };
        let parser = CodeParser::new(
            &pool,
            None,
            "Main",
            "run",
            false,
            false,
            &[FieldType::Object(SQUAWK_ADDRESS.to_string())],
            &body,
        )
        .with_local_variable_table(&lvt);
        let err = parser.parse().unwrap_err();
        match err {
            TranslationError::Verify { message, .. } => assert!(message.contains("addr")),
            other => panic!("expected Verify error, got {other:?}"),
        }
    }

    #[test]
    fn wide_iload_applies_the_narrow_forms_stack_effect() {
        let pool = pool_with_one_int();
        let body = CodeBody {
            max_stack: 1,
            max_locals: 5,
            code: vec![196, 21, 0, 4, 172], // wide iload 4; ireturn
            exception_table: vec![],
            stack_map: vec![],
        };
        let mut parser = CodeParser::new(&pool, None, "Main", "run", false, true, &[], &body);
        parser.frame.set_local(4, VerificationCategory::Int).unwrap();
        assert!(parser.parse().is_ok());
    }

    #[test]
    fn wide_istore_rejects_a_mismatched_category() {
        let pool = pool_with_one_int();
        let body = CodeBody {
            max_stack: 2,
            max_locals: 5,
            code: vec![9, 196, 54, 0, 4, 177], // lconst_0; wide istore 4; return
            exception_table: vec![],
            stack_map: vec![],
        };
        let parser = CodeParser::new(&pool, None, "Main", "run", false, true, &[], &body);
        let err = parser.parse().unwrap_err();
        assert!(matches!(err, TranslationError::Verify { .. }));
    }

    #[test]
    fn try_catch_emits_try_tryend_catch_in_sorted_order() {
        let pool = pool_with_one_int();
        let body = CodeBody {
            max_stack: 1,
            max_locals: 1,
            code: vec![3, 87, 177, 87, 177], // iconst_0; pop; return; (handler) pop; return
            exception_table: vec![ExceptionEntry { start_pc: 0, end_pc: 3, handler_pc: 3, catch_type: 0 }],
            stack_map: vec![],
        };
        let parser = CodeParser::new(&pool, None, "Main", "run", false, true, &[], &body);
        let pseudos = parser.parse().unwrap();
        let at_3: Vec<_> = pseudos.iter().filter(|p| p.address == 3).map(|p| p.opcode).collect();
        assert!(matches!(at_3[0], PseudoOpcode::TryEnd { .. }));
        assert!(at_3.iter().any(|o| matches!(o, PseudoOpcode::Catch { .. })));
    }
}
