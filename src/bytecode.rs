//! JVM bytecode definitions and the opcode dispatch table used by the
//! code parser.
use std::fmt;

use byteorder::{BigEndian, ByteOrder};

/// OPCodes supported by the JVM as documented in the spec document.
/// ref: <https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-7.html>
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum OPCode {
    NOP,
    AconstNULL,
    IconstM1,
    Iconst0,
    Iconst1,
    Iconst2,
    Iconst3,
    Iconst4,
    Iconst5,
    Lconst0,
    Lconst1,
    Fconst0,
    Fconst1,
    Fconst2,
    Dconst0,
    Dconst1,
    BiPush,
    SiPush,
    Ldc,
    LdcW,
    Ldc2W,
    Iload,
    Lload,
    Fload,
    Dload,
    Aload,
    Iload0,
    Iload1,
    Iload2,
    Iload3,
    Lload0,
    Lload1,
    Lload2,
    Lload3,
    Fload0,
    Fload1,
    Fload2,
    Fload3,
    Dload0,
    Dload1,
    Dload2,
    Dload3,
    Aload0,
    Aload1,
    Aload2,
    Aload3,
    IAload,
    LAload,
    FAload,
    DAload,
    AAload,
    BAload,
    CAload,
    SAload,
    Istore,
    Lstore,
    Fstore,
    Dstore,
    Astore,
    Istore0,
    Istore1,
    Istore2,
    Istore3,
    Lstore0,
    Lstore1,
    Lstore2,
    Lstore3,
    Fstore0,
    Fstore1,
    Fstore2,
    Fstore3,
    Dstore0,
    Dstore1,
    Dstore2,
    Dstore3,
    Astore0,
    Astore1,
    Astore2,
    Astore3,
    IAstore,
    LAstore,
    FAstore,
    DAstore,
    AAstore,
    BAstore,
    CAstore,
    SAstore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    IShl,
    LShl,
    IShr,
    LShr,
    IUShr,
    LUShr,
    Iand,
    Land,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc,
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
    IFEq,
    IFNe,
    IFLt,
    IFGe,
    IFGt,
    IFLe,
    IfICmpEq,
    IfICmpNe,
    IfICmpLt,
    IfICmpGe,
    IfICmpGt,
    IfICmpLe,
    IfACmpEq,
    IfACmpNe,
    Goto,
    Jsr,
    Ret,
    TableSwitch,
    LookupSwitch,
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    GetStatic,
    PutStatic,
    GetField,
    PutField,
    InvokeVirtual,
    InvokeSpecial,
    InvokeStatic,
    InvokeInterface,
    InvokeDynamic,
    New,
    NewArray,
    ANewArray,
    ArrayLength,
    AThrow,
    CheckCast,
    InstanceOf,
    MonitorEnter,
    MonitorExit,
    Wide,
    MultiANewArray,
    IfNull,
    IfNonNull,
    GotoW,
    JsrW,
    Breakpoint,
    /// Proxy value to signal unknown opcode values.
    Unspecified,
}

impl fmt::Display for OPCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// Since bytecode is initially loaded as `Vec<u8>` we need a way to
// convert it to the `OPCode` enum.
impl From<u8> for OPCode {
    fn from(byte: u8) -> Self {
        match byte {
            0 => Self::NOP,
            1 => Self::AconstNULL,
            2 => Self::IconstM1,
            3 => Self::Iconst0,
            4 => Self::Iconst1,
            5 => Self::Iconst2,
            6 => Self::Iconst3,
            7 => Self::Iconst4,
            8 => Self::Iconst5,
            9 => Self::Lconst0,
            10 => Self::Lconst1,
            11 => Self::Fconst0,
            12 => Self::Fconst1,
            13 => Self::Fconst2,
            14 => Self::Dconst0,
            15 => Self::Dconst1,
            16 => Self::BiPush,
            17 => Self::SiPush,
            18 => Self::Ldc,
            19 => Self::LdcW,
            20 => Self::Ldc2W,
            21 => Self::Iload,
            22 => Self::Lload,
            23 => Self::Fload,
            24 => Self::Dload,
            25 => Self::Aload,
            26 => Self::Iload0,
            27 => Self::Iload1,
            28 => Self::Iload2,
            29 => Self::Iload3,
            30 => Self::Lload0,
            31 => Self::Lload1,
            32 => Self::Lload2,
            33 => Self::Lload3,
            34 => Self::Fload0,
            35 => Self::Fload1,
            36 => Self::Fload2,
            37 => Self::Fload3,
            38 => Self::Dload0,
            39 => Self::Dload1,
            40 => Self::Dload2,
            41 => Self::Dload3,
            42 => Self::Aload0,
            43 => Self::Aload1,
            44 => Self::Aload2,
            45 => Self::Aload3,
            46 => Self::IAload,
            47 => Self::LAload,
            48 => Self::FAload,
            49 => Self::DAload,
            50 => Self::AAload,
            51 => Self::BAload,
            52 => Self::CAload,
            53 => Self::SAload,
            54 => Self::Istore,
            55 => Self::Lstore,
            56 => Self::Fstore,
            57 => Self::Dstore,
            58 => Self::Astore,
            59 => Self::Istore0,
            60 => Self::Istore1,
            61 => Self::Istore2,
            62 => Self::Istore3,
            63 => Self::Lstore0,
            64 => Self::Lstore1,
            65 => Self::Lstore2,
            66 => Self::Lstore3,
            67 => Self::Fstore0,
            68 => Self::Fstore1,
            69 => Self::Fstore2,
            70 => Self::Fstore3,
            71 => Self::Dstore0,
            72 => Self::Dstore1,
            73 => Self::Dstore2,
            74 => Self::Dstore3,
            75 => Self::Astore0,
            76 => Self::Astore1,
            77 => Self::Astore2,
            78 => Self::Astore3,
            79 => Self::IAstore,
            80 => Self::LAstore,
            81 => Self::FAstore,
            82 => Self::DAstore,
            83 => Self::AAstore,
            84 => Self::BAstore,
            85 => Self::CAstore,
            86 => Self::SAstore,
            87 => Self::Pop,
            88 => Self::Pop2,
            89 => Self::Dup,
            90 => Self::DupX1,
            91 => Self::DupX2,
            92 => Self::Dup2,
            93 => Self::Dup2X1,
            94 => Self::Dup2X2,
            95 => Self::Swap,
            96 => Self::IAdd,
            97 => Self::LAdd,
            98 => Self::FAdd,
            99 => Self::DAdd,
            100 => Self::ISub,
            101 => Self::LSub,
            102 => Self::FSub,
            103 => Self::DSub,
            104 => Self::IMul,
            105 => Self::LMul,
            106 => Self::FMul,
            107 => Self::DMul,
            108 => Self::IDiv,
            109 => Self::LDiv,
            110 => Self::FDiv,
            111 => Self::DDiv,
            112 => Self::IRem,
            113 => Self::LRem,
            114 => Self::FRem,
            115 => Self::DRem,
            116 => Self::INeg,
            117 => Self::LNeg,
            118 => Self::FNeg,
            119 => Self::DNeg,
            120 => Self::IShl,
            121 => Self::LShl,
            122 => Self::IShr,
            123 => Self::LShr,
            124 => Self::IUShr,
            125 => Self::LUShr,
            126 => Self::Iand,
            127 => Self::Land,
            128 => Self::IOr,
            129 => Self::LOr,
            130 => Self::IXor,
            131 => Self::LXor,
            132 => Self::IInc,
            133 => Self::I2L,
            134 => Self::I2F,
            135 => Self::I2D,
            136 => Self::L2I,
            137 => Self::L2F,
            138 => Self::L2D,
            139 => Self::F2I,
            140 => Self::F2L,
            141 => Self::F2D,
            142 => Self::D2I,
            143 => Self::D2L,
            144 => Self::D2F,
            145 => Self::I2B,
            146 => Self::I2C,
            147 => Self::I2S,
            148 => Self::LCmp,
            149 => Self::FCmpL,
            150 => Self::FCmpG,
            151 => Self::DCmpL,
            152 => Self::DCmpG,
            153 => Self::IFEq,
            154 => Self::IFNe,
            155 => Self::IFLt,
            156 => Self::IFGe,
            157 => Self::IFGt,
            158 => Self::IFLe,
            159 => Self::IfICmpEq,
            160 => Self::IfICmpNe,
            161 => Self::IfICmpLt,
            162 => Self::IfICmpGe,
            163 => Self::IfICmpGt,
            164 => Self::IfICmpLe,
            165 => Self::IfACmpEq,
            166 => Self::IfACmpNe,
            167 => Self::Goto,
            168 => Self::Jsr,
            169 => Self::Ret,
            170 => Self::TableSwitch,
            171 => Self::LookupSwitch,
            172 => Self::IReturn,
            173 => Self::LReturn,
            174 => Self::FReturn,
            175 => Self::DReturn,
            176 => Self::AReturn,
            177 => Self::Return,
            178 => Self::GetStatic,
            179 => Self::PutStatic,
            180 => Self::GetField,
            181 => Self::PutField,
            182 => Self::InvokeVirtual,
            183 => Self::InvokeSpecial,
            184 => Self::InvokeStatic,
            185 => Self::InvokeInterface,
            186 => Self::InvokeDynamic,
            187 => Self::New,
            188 => Self::NewArray,
            189 => Self::ANewArray,
            190 => Self::ArrayLength,
            191 => Self::AThrow,
            192 => Self::CheckCast,
            193 => Self::InstanceOf,
            194 => Self::MonitorEnter,
            195 => Self::MonitorExit,
            196 => Self::Wide,
            197 => Self::MultiANewArray,
            198 => Self::IfNull,
            199 => Self::IfNonNull,
            200 => Self::GotoW,
            201 => Self::JsrW,
            202 => Self::Breakpoint,
            203..=u8::MAX => Self::Unspecified,
        }
    }
}

/// One of the eight `dup`/`swap` forms, distinguished by whether the
/// top (and, for the `x1`/`x2` forms, the item below it) is single-
/// or double-word (JVM spec §6.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StackShuffleForm {
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

impl StackShuffleForm {
    #[must_use]
    pub const fn for_opcode(op: OPCode) -> Option<Self> {
        match op {
            OPCode::Dup => Some(Self::Dup),
            OPCode::DupX1 => Some(Self::DupX1),
            OPCode::DupX2 => Some(Self::DupX2),
            OPCode::Dup2 => Some(Self::Dup2),
            OPCode::Dup2X1 => Some(Self::Dup2X1),
            OPCode::Dup2X2 => Some(Self::Dup2X2),
            OPCode::Swap => Some(Self::Swap),
            _ => None,
        }
    }
}

/// The number of immediate operand bytes following an opcode byte
/// that takes a fixed-size operand (`-1` marks variable-length
/// instructions -- `tableswitch`/`lookupswitch` -- whose length the
/// code parser computes from the bytecode stream itself).
#[must_use]
pub const fn immediate_operand_len(op: OPCode) -> i8 {
    match op {
        OPCode::BiPush
        | OPCode::Ldc
        | OPCode::Iload
        | OPCode::Lload
        | OPCode::Fload
        | OPCode::Dload
        | OPCode::Aload
        | OPCode::Istore
        | OPCode::Lstore
        | OPCode::Fstore
        | OPCode::Dstore
        | OPCode::Astore
        | OPCode::Ret
        | OPCode::NewArray => 1,
        OPCode::SiPush
        | OPCode::LdcW
        | OPCode::Ldc2W
        | OPCode::IFEq
        | OPCode::IFNe
        | OPCode::IFLt
        | OPCode::IFGe
        | OPCode::IFGt
        | OPCode::IFLe
        | OPCode::IfICmpEq
        | OPCode::IfICmpNe
        | OPCode::IfICmpLt
        | OPCode::IfICmpGe
        | OPCode::IfICmpGt
        | OPCode::IfICmpLe
        | OPCode::IfACmpEq
        | OPCode::IfACmpNe
        | OPCode::Goto
        | OPCode::Jsr
        | OPCode::GetStatic
        | OPCode::PutStatic
        | OPCode::GetField
        | OPCode::PutField
        | OPCode::InvokeVirtual
        | OPCode::InvokeSpecial
        | OPCode::InvokeStatic
        | OPCode::New
        | OPCode::ANewArray
        | OPCode::CheckCast
        | OPCode::InstanceOf
        | OPCode::IfNull
        | OPCode::IfNonNull
        | OPCode::IInc => 2,
        OPCode::InvokeInterface | OPCode::InvokeDynamic => 4,
        OPCode::MultiANewArray => 3,
        OPCode::GotoW | OPCode::JsrW => 4,
        OPCode::TableSwitch | OPCode::LookupSwitch => -1,
        _ => 0,
    }
}

/// A category-specialized Squawk output opcode. The JVM bytecode
/// already encodes the value's category in the opcode itself (an
/// `iload` can never be used where an `aload` is required), so
/// translating to Squawk's own naming is a direct rename, not a
/// category inference -- matching spec §6's `typeMap` being derived
/// from the instruction alone, with no separate verifier lookup
/// needed at this stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum SquawkOpcode {
    Nop,
    ConstNull,
    ConstInt(i8),
    LoadLocal { index: u16, category: SquawkCategory },
    StoreLocal { index: u16, category: SquawkCategory },
    Return { category: Option<SquawkCategory> },
    /// Any instruction not given a specialized Squawk rename in this
    /// representative subset; carries the original JVM opcode through
    /// unchanged. A full translator would replace every JVM opcode
    /// with its Squawk equivalent and apply escape/wide prefixes for
    /// the extended opcode space -- out of scope here (see DESIGN.md).
    Passthrough(OPCode),
}

/// The value category a Squawk load/store/return opcode is
/// specialized for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SquawkCategory {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

/// Translates one JVM opcode to its Squawk rename, per the illustrative
/// mapping in spec §8 (`aload_0 -> load_0_reference`, `areturn ->
/// return_reference`). Operand bytes are copied through unchanged by
/// the caller; only the opcode byte itself is renamed here.
#[must_use]
pub fn translate_opcode(op: OPCode) -> SquawkOpcode {
    use SquawkCategory::{Double, Float, Int, Long, Reference};
    match op {
        OPCode::NOP => SquawkOpcode::Nop,
        OPCode::AconstNULL => SquawkOpcode::ConstNull,
        OPCode::IconstM1 => SquawkOpcode::ConstInt(-1),
        OPCode::Iconst0 => SquawkOpcode::ConstInt(0),
        OPCode::Iconst1 => SquawkOpcode::ConstInt(1),
        OPCode::Iconst2 => SquawkOpcode::ConstInt(2),
        OPCode::Iconst3 => SquawkOpcode::ConstInt(3),
        OPCode::Iconst4 => SquawkOpcode::ConstInt(4),
        OPCode::Iconst5 => SquawkOpcode::ConstInt(5),
        OPCode::Iload0 => SquawkOpcode::LoadLocal { index: 0, category: Int },
        OPCode::Iload1 => SquawkOpcode::LoadLocal { index: 1, category: Int },
        OPCode::Iload2 => SquawkOpcode::LoadLocal { index: 2, category: Int },
        OPCode::Iload3 => SquawkOpcode::LoadLocal { index: 3, category: Int },
        OPCode::Lload0 => SquawkOpcode::LoadLocal { index: 0, category: Long },
        OPCode::Lload1 => SquawkOpcode::LoadLocal { index: 1, category: Long },
        OPCode::Lload2 => SquawkOpcode::LoadLocal { index: 2, category: Long },
        OPCode::Lload3 => SquawkOpcode::LoadLocal { index: 3, category: Long },
        OPCode::Fload0 => SquawkOpcode::LoadLocal { index: 0, category: Float },
        OPCode::Fload1 => SquawkOpcode::LoadLocal { index: 1, category: Float },
        OPCode::Fload2 => SquawkOpcode::LoadLocal { index: 2, category: Float },
        OPCode::Fload3 => SquawkOpcode::LoadLocal { index: 3, category: Float },
        OPCode::Dload0 => SquawkOpcode::LoadLocal { index: 0, category: Double },
        OPCode::Dload1 => SquawkOpcode::LoadLocal { index: 1, category: Double },
        OPCode::Dload2 => SquawkOpcode::LoadLocal { index: 2, category: Double },
        OPCode::Dload3 => SquawkOpcode::LoadLocal { index: 3, category: Double },
        OPCode::Aload0 => SquawkOpcode::LoadLocal { index: 0, category: Reference },
        OPCode::Aload1 => SquawkOpcode::LoadLocal { index: 1, category: Reference },
        OPCode::Aload2 => SquawkOpcode::LoadLocal { index: 2, category: Reference },
        OPCode::Aload3 => SquawkOpcode::LoadLocal { index: 3, category: Reference },
        OPCode::Istore0 => SquawkOpcode::StoreLocal { index: 0, category: Int },
        OPCode::Istore1 => SquawkOpcode::StoreLocal { index: 1, category: Int },
        OPCode::Istore2 => SquawkOpcode::StoreLocal { index: 2, category: Int },
        OPCode::Istore3 => SquawkOpcode::StoreLocal { index: 3, category: Int },
        OPCode::Lstore0 => SquawkOpcode::StoreLocal { index: 0, category: Long },
        OPCode::Lstore1 => SquawkOpcode::StoreLocal { index: 1, category: Long },
        OPCode::Lstore2 => SquawkOpcode::StoreLocal { index: 2, category: Long },
        OPCode::Lstore3 => SquawkOpcode::StoreLocal { index: 3, category: Long },
        OPCode::Fstore0 => SquawkOpcode::StoreLocal { index: 0, category: Float },
        OPCode::Fstore1 => SquawkOpcode::StoreLocal { index: 1, category: Float },
        OPCode::Fstore2 => SquawkOpcode::StoreLocal { index: 2, category: Float },
        OPCode::Fstore3 => SquawkOpcode::StoreLocal { index: 3, category: Float },
        OPCode::Dstore0 => SquawkOpcode::StoreLocal { index: 0, category: Double },
        OPCode::Dstore1 => SquawkOpcode::StoreLocal { index: 1, category: Double },
        OPCode::Dstore2 => SquawkOpcode::StoreLocal { index: 2, category: Double },
        OPCode::Dstore3 => SquawkOpcode::StoreLocal { index: 3, category: Double },
        OPCode::Astore0 => SquawkOpcode::StoreLocal { index: 0, category: Reference },
        OPCode::Astore1 => SquawkOpcode::StoreLocal { index: 1, category: Reference },
        OPCode::Astore2 => SquawkOpcode::StoreLocal { index: 2, category: Reference },
        OPCode::Astore3 => SquawkOpcode::StoreLocal { index: 3, category: Reference },
        OPCode::IReturn => SquawkOpcode::Return { category: Some(Int) },
        OPCode::LReturn => SquawkOpcode::Return { category: Some(Long) },
        OPCode::FReturn => SquawkOpcode::Return { category: Some(Float) },
        OPCode::DReturn => SquawkOpcode::Return { category: Some(Double) },
        OPCode::AReturn => SquawkOpcode::Return { category: Some(Reference) },
        OPCode::Return => SquawkOpcode::Return { category: None },
        other => SquawkOpcode::Passthrough(other),
    }
}

const SQ_NOP: u8 = 0x00;
const SQ_CONST_NULL: u8 = 0x01;
/// `ConstInt` covers `iconst_m1`..`iconst_5`, i.e. `-1..=5`; offset so
/// the whole range packs into consecutive bytes after `SQ_CONST_NULL`.
const SQ_CONST_INT_BASE: u8 = 0x02;
const SQ_LOAD_LOCAL_BASE: u8 = 0x10;
const SQ_STORE_LOCAL_BASE: u8 = 0x30;
const SQ_RETURN_BASE: u8 = 0x50;

impl SquawkCategory {
    const fn ordinal(self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Long => 1,
            Self::Float => 2,
            Self::Double => 3,
            Self::Reference => 4,
        }
    }
}

impl SquawkOpcode {
    /// Serializes this opcode to its output bytes. `original` is the
    /// full instruction (opcode byte plus any operand bytes) this
    /// value was translated from; `Passthrough` copies it verbatim,
    /// every specialized rename is exactly one byte since none of the
    /// JVM instructions renamed here (the `_N`-suffixed const/load/
    /// store/return family) carry operands of their own.
    #[must_use]
    pub fn encode(&self, original: &[u8]) -> Vec<u8> {
        match self {
            Self::Nop => vec![SQ_NOP],
            Self::ConstNull => vec![SQ_CONST_NULL],
            Self::ConstInt(n) => vec![(i16::from(SQ_CONST_INT_BASE) + i16::from(*n) + 1) as u8],
            Self::LoadLocal { index, category } => {
                vec![SQ_LOAD_LOCAL_BASE + category.ordinal() * 4 + *index as u8]
            }
            Self::StoreLocal { index, category } => {
                vec![SQ_STORE_LOCAL_BASE + category.ordinal() * 4 + *index as u8]
            }
            Self::Return { category } => vec![SQ_RETURN_BASE + category.map_or(5, SquawkCategory::ordinal)],
            Self::Passthrough(_) => original.to_vec(),
        }
    }
}

/// Translates a whole method body's bytecode into the Squawk output
/// stream (spec §6): each instruction is renamed via [`translate_opcode`]
/// and re-encoded, with any instruction this representative subset
/// doesn't specialize copied through byte-for-byte (opcode and operands
/// alike), matching S1/S2's end-to-end expectations.
#[must_use]
pub fn translate_bytecode(code: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(code.len());
    let mut pc = 0usize;
    while pc < code.len() {
        let op = OPCode::from(code[pc]);
        let len = instruction_byte_len(code, pc, op);
        let end = (pc + len).min(code.len());
        out.extend(translate_opcode(op).encode(&code[pc..end]));
        pc += len;
    }
    out
}

/// Total byte length (opcode plus operands) of the instruction at
/// `pc`, mirroring the length accounting the code parser's `walk`
/// performs per-instruction, but without any verifier side effects.
fn instruction_byte_len(code: &[u8], pc: usize, op: OPCode) -> usize {
    match op {
        OPCode::TableSwitch => {
            let mut cursor = pc + 1;
            cursor += (4 - (cursor % 4)) % 4;
            cursor += 4; // default_offset
            let low = BigEndian::read_i32(&code[cursor..]);
            let high = BigEndian::read_i32(&code[cursor + 4..]);
            cursor += 8;
            let count = (high - low + 1).max(0) as usize;
            cursor += count * 4;
            cursor - pc
        }
        OPCode::LookupSwitch => {
            let mut cursor = pc + 1;
            cursor += (4 - (cursor % 4)) % 4;
            cursor += 4; // default_offset
            let npairs = BigEndian::read_i32(&code[cursor..]) as usize;
            cursor += 4;
            cursor += npairs * 8;
            cursor - pc
        }
        OPCode::Wide => {
            let modified = OPCode::from(code[pc + 1]);
            match modified {
                OPCode::IInc => 6,
                _ => 4,
            }
        }
        _ => 1 + immediate_operand_len(op).max(0) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_to_opcode_round_trips_for_known_values() {
        assert_eq!(OPCode::from(42), OPCode::Aload0);
        assert_eq!(OPCode::from(177), OPCode::Return);
        assert_eq!(OPCode::from(203), OPCode::Unspecified);
    }

    #[test]
    fn all_eight_stack_shuffle_forms_are_recognized() {
        for op in [
            OPCode::Dup,
            OPCode::DupX1,
            OPCode::DupX2,
            OPCode::Dup2,
            OPCode::Dup2X1,
            OPCode::Dup2X2,
            OPCode::Swap,
        ] {
            assert!(StackShuffleForm::for_opcode(op).is_some());
        }
        assert!(StackShuffleForm::for_opcode(OPCode::NOP).is_none());
    }

    #[test]
    fn immediate_operand_lengths_match_the_jvm_spec() {
        assert_eq!(immediate_operand_len(OPCode::BiPush), 1);
        assert_eq!(immediate_operand_len(OPCode::SiPush), 2);
        assert_eq!(immediate_operand_len(OPCode::InvokeInterface), 4);
        assert_eq!(immediate_operand_len(OPCode::TableSwitch), -1);
        assert_eq!(immediate_operand_len(OPCode::Return), 0);
    }

    #[test]
    fn translate_opcode_renames_s2_forms() {
        assert_eq!(
            translate_opcode(OPCode::Aload0),
            SquawkOpcode::LoadLocal { index: 0, category: SquawkCategory::Reference }
        );
        assert_eq!(translate_opcode(OPCode::AReturn), SquawkOpcode::Return { category: Some(SquawkCategory::Reference) });
    }

    #[test]
    fn translate_bytecode_maps_s2_end_to_end() {
        // aload_0 (42); areturn (176)
        let translated = translate_bytecode(&[42, 176]);
        assert_eq!(translated.len(), 2);
        assert_eq!(
            translated[0],
            SQ_LOAD_LOCAL_BASE + SquawkCategory::Reference.ordinal() * 4
        );
        assert_eq!(translated[1], SQ_RETURN_BASE + SquawkCategory::Reference.ordinal());
    }

    #[test]
    fn translate_bytecode_copies_unrenamed_instructions_through() {
        // sipush 1000 (17, 0x03, 0xE8); pop (87)
        let code = vec![17, 0x03, 0xE8, 87];
        assert_eq!(translate_bytecode(&code), code);
    }
}
