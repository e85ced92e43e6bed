//! Constant pool: an indexed, sparse table of entries tagged by kind.
//!
//! Indexes 0, and the second slot of any 64-bit constant, are invalid.
//! The pool owns raw encoded values until first resolution; resolved
//! entries are memoised so a resolved index always yields an entry of
//! the same kind on every later read.
use std::cell::RefCell;

use crate::descriptor::{self, FieldType, MethodDescriptor};
use crate::error::{ErrorContext, Result, TranslationError};
use crate::reader::ClassFileReader;

/// Raw constant-pool entries, exactly as they appear on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum CPInfo {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    /// Extension tag 13: a public key embedded in a Trusted attribute's
    /// secondary pool. See `trusted.rs`.
    PublicKey(Vec<u8>),
    /// Extension tag 14: a digital signature embedded in a Trusted
    /// attribute's secondary pool.
    DigitalSignature(Vec<u8>),
    /// Placeholder for the second slot of a `Long`/`Double` entry, and
    /// for index 0. Reading it is always a `ClassFormat` error.
    Invalid,
}

impl CPInfo {
    #[must_use]
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::Utf8(_) => "Utf8",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Long(_) => "Long",
            Self::Double(_) => "Double",
            Self::Class { .. } => "Class",
            Self::String { .. } => "String",
            Self::FieldRef { .. } => "FieldRef",
            Self::MethodRef { .. } => "MethodRef",
            Self::InterfaceMethodRef { .. } => "InterfaceMethodRef",
            Self::NameAndType { .. } => "NameAndType",
            Self::MethodHandle { .. } => "MethodHandle",
            Self::MethodType { .. } => "MethodType",
            Self::InvokeDynamic { .. } => "InvokeDynamic",
            Self::PublicKey(_) => "PublicKey",
            Self::DigitalSignature(_) => "DigitalSignature",
            Self::Invalid => "Invalid",
        }
    }
}

/// A resolved class reference: just the interned internal name for
/// now -- the registry (`klass.rs`) turns this into a `Klass` handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClass {
    pub internal_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNameAndType {
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFieldRef {
    pub class: ResolvedClass,
    pub name: String,
    pub descriptor: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethodRef {
    pub class: ResolvedClass,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}

/// The constant pool of one class file.
///
/// `entries[0]` is always `CPInfo::Invalid`; so is the slot
/// immediately following any `Long`/`Double` entry, matching the JVM
/// class-file format's "unusable" second slot.
pub struct ConstantPool {
    entries: Vec<CPInfo>,
    resolved_classes: RefCell<Vec<Option<ResolvedClass>>>,
    resolved_fields: RefCell<Vec<Option<ResolvedFieldRef>>>,
    resolved_methods: RefCell<Vec<Option<ResolvedMethodRef>>>,
}

impl ConstantPool {
    /// Parses `constant_pool_count - 1` entries from `reader`.
    pub fn parse(reader: &mut ClassFileReader, count: u16) -> Result<Self> {
        let mut entries = vec![CPInfo::Invalid; count as usize];
        let mut i: usize = 1;
        while i < count as usize {
            let tag = reader.read_u1()?;
            let (entry, wide) = parse_one(reader, tag)?;
            entries[i] = entry;
            i += if wide { 2 } else { 1 };
        }
        Ok(Self {
            entries,
            resolved_classes: RefCell::new(vec![None; count as usize]),
            resolved_fields: RefCell::new(vec![None; count as usize]),
            resolved_methods: RefCell::new(vec![None; count as usize]),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: u16) -> Result<&CPInfo> {
        self.entries.get(index as usize).filter(|e| !matches!(e, CPInfo::Invalid)).ok_or_else(|| {
            TranslationError::class_format(
                format!("invalid constant pool index {index}"),
                ErrorContext::new(),
            )
        })
    }

    #[must_use]
    pub fn tag(&self, index: u16) -> Option<&'static str> {
        self.entries.get(index as usize).map(CPInfo::tag_name)
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            CPInfo::Utf8(s) => Ok(s.as_str()),
            other => Err(mismatch("Utf8", other)),
        }
    }

    pub fn int(&self, index: u16) -> Result<i32> {
        match self.get(index)? {
            CPInfo::Integer(v) => Ok(*v),
            other => Err(mismatch("Integer", other)),
        }
    }

    pub fn long(&self, index: u16) -> Result<i64> {
        match self.get(index)? {
            CPInfo::Long(v) => Ok(*v),
            other => Err(mismatch("Long", other)),
        }
    }

    pub fn float(&self, index: u16) -> Result<f32> {
        match self.get(index)? {
            CPInfo::Float(v) => Ok(*v),
            other => Err(mismatch("Float", other)),
        }
    }

    pub fn double(&self, index: u16) -> Result<f64> {
        match self.get(index)? {
            CPInfo::Double(v) => Ok(*v),
            other => Err(mismatch("Double", other)),
        }
    }

    pub fn string(&self, index: u16) -> Result<&str> {
        let string_index = match self.get(index)? {
            CPInfo::String { string_index } => *string_index,
            other => return Err(mismatch("String", other)),
        };
        self.utf8(string_index)
    }

    pub fn klass(&self, index: u16) -> Result<&str> {
        let name_index = match self.get(index)? {
            CPInfo::Class { name_index } => *name_index,
            other => return Err(mismatch("Class", other)),
        };
        self.utf8(name_index)
    }

    pub fn name_and_type(&self, index: u16) -> Result<ResolvedNameAndType> {
        match self.get(index)? {
            CPInfo::NameAndType { name_index, descriptor_index } => Ok(ResolvedNameAndType {
                name: self.utf8(*name_index)?.to_string(),
                descriptor: self.utf8(*descriptor_index)?.to_string(),
            }),
            other => Err(mismatch("NameAndType", other)),
        }
    }

    /// Resolves a `Class` entry. Resolution in the full translator
    /// additionally triggers recursive class loading through the
    /// registry (see `klass.rs::KlassRegistry::resolve`); here we only
    /// produce the interned name, which is as far as the constant pool
    /// itself can go without a registry handle.
    pub fn resolved_class(&self, index: u16) -> Result<ResolvedClass> {
        if let Some(cached) = self.resolved_classes.borrow().get(index as usize).and_then(Clone::clone) {
            return Ok(cached);
        }
        let name = self.klass(index)?.to_string();
        let resolved = ResolvedClass { internal_name: name };
        self.resolved_classes.borrow_mut()[index as usize] = Some(resolved.clone());
        Ok(resolved)
    }

    pub fn resolved_field(&self, index: u16, _is_static: bool) -> Result<ResolvedFieldRef> {
        if let Some(cached) = self.resolved_fields.borrow().get(index as usize).and_then(Clone::clone) {
            return Ok(cached);
        }
        let (class_index, nat_index) = match self.get(index)? {
            CPInfo::FieldRef { class_index, name_and_type_index } => (*class_index, *name_and_type_index),
            other => return Err(mismatch("FieldRef", other)),
        };
        let class = self.resolved_class(class_index)?;
        let nat = self.name_and_type(nat_index)?;
        let descriptor = descriptor::parse_field_descriptor(&nat.descriptor)
            .map_err(|e| TranslationError::class_format(e.0, ErrorContext::new()))?;
        let resolved = ResolvedFieldRef { class, name: nat.name, descriptor };
        self.resolved_fields.borrow_mut()[index as usize] = Some(resolved.clone());
        Ok(resolved)
    }

    pub fn resolved_method(&self, index: u16, _is_static: bool, is_interface: bool) -> Result<ResolvedMethodRef> {
        if let Some(cached) = self.resolved_methods.borrow().get(index as usize).and_then(Clone::clone) {
            return Ok(cached);
        }
        let (class_index, nat_index) = match self.get(index)? {
            CPInfo::MethodRef { class_index, name_and_type_index } => (*class_index, *name_and_type_index),
            CPInfo::InterfaceMethodRef { class_index, name_and_type_index } => {
                (*class_index, *name_and_type_index)
            }
            other => return Err(mismatch("MethodRef or InterfaceMethodRef", other)),
        };
        let class = self.resolved_class(class_index)?;
        let nat = self.name_and_type(nat_index)?;
        let descriptor = descriptor::parse_method_descriptor(&nat.descriptor)
            .map_err(|e| TranslationError::class_format(e.0, ErrorContext::new()))?;
        let resolved = ResolvedMethodRef { class, name: nat.name, descriptor, is_interface };
        self.resolved_methods.borrow_mut()[index as usize] = Some(resolved.clone());
        Ok(resolved)
    }

    /// Compares two `Float`/`Double` pool entries by their canonical
    /// bit pattern rather than by value, so `NaN` and `-0.0` compare
    /// correctly (the source's `.rej` file records this as a known
    /// bug in the float/double lookup it replaced).
    #[must_use]
    pub fn float_bits_eq(a: f32, b: f32) -> bool {
        a.to_bits() == b.to_bits()
    }

    #[must_use]
    pub fn double_bits_eq(a: f64, b: f64) -> bool {
        a.to_bits() == b.to_bits()
    }
}

fn mismatch(expected: &str, found: &CPInfo) -> TranslationError {
    TranslationError::class_format(
        format!("expected constant pool entry of kind {expected}, found {}", found.tag_name()),
        ErrorContext::new(),
    )
}

/// Parses one constant-pool entry given its tag byte. Returns the
/// entry and whether it occupies two pool slots (`Long`/`Double`).
fn parse_one(reader: &mut ClassFileReader, tag: u8) -> Result<(CPInfo, bool)> {
    match tag {
        1 => Ok((CPInfo::Utf8(reader.read_utf_modified()?), false)),
        3 => Ok((CPInfo::Integer(reader.read_i4()?), false)),
        4 => {
            let bits = reader.read_u4()?;
            Ok((CPInfo::Float(f32::from_bits(bits)), false))
        }
        5 => Ok((CPInfo::Long(reader.read_i8()?), true)),
        6 => {
            let hi = u64::from(reader.read_u4()?);
            let lo = u64::from(reader.read_u4()?);
            Ok((CPInfo::Double(f64::from_bits((hi << 32) | lo)), true))
        }
        7 => Ok((CPInfo::Class { name_index: reader.read_u2()? }, false)),
        8 => Ok((CPInfo::String { string_index: reader.read_u2()? }, false)),
        9 => Ok((
            CPInfo::FieldRef { class_index: reader.read_u2()?, name_and_type_index: reader.read_u2()? },
            false,
        )),
        10 => Ok((
            CPInfo::MethodRef { class_index: reader.read_u2()?, name_and_type_index: reader.read_u2()? },
            false,
        )),
        11 => Ok((
            CPInfo::InterfaceMethodRef {
                class_index: reader.read_u2()?,
                name_and_type_index: reader.read_u2()?,
            },
            false,
        )),
        12 => Ok((
            CPInfo::NameAndType { name_index: reader.read_u2()?, descriptor_index: reader.read_u2()? },
            false,
        )),
        13 => {
            let length = reader.read_u2()? as usize;
            Ok((CPInfo::PublicKey(reader.read_fully(length)?), false))
        }
        14 => {
            let length = reader.read_u2()? as usize;
            Ok((CPInfo::DigitalSignature(reader.read_fully(length)?), false))
        }
        15 => Ok((
            CPInfo::MethodHandle { reference_kind: reader.read_u1()?, reference_index: reader.read_u2()? },
            false,
        )),
        16 => Ok((CPInfo::MethodType { descriptor_index: reader.read_u2()? }, false)),
        18 => Ok((
            CPInfo::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_u2()?,
                name_and_type_index: reader.read_u2()?,
            },
            false,
        )),
        other => Err(TranslationError::class_format(
            format!("unexpected constant pool tag {other}"),
            ErrorContext::new().with_offset(reader.current_offset()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_pool(entries_bytes: &[u8], count: u16) -> ConstantPool {
        let mut reader = ClassFileReader::new(entries_bytes);
        ConstantPool::parse(&mut reader, count).unwrap()
    }

    #[test]
    fn index_zero_and_second_slot_of_wide_entries_are_invalid() {
        // Pool: [0]=invalid, [1]=Double (wide), [2]=invalid (second slot), [3]=Utf8("x")
        let mut bytes = vec![6u8, 0, 0, 0, 0, 0, 0, 0, 0]; // Double tag + 8 zero bytes
        bytes.extend_from_slice(&[1, 0, 1, b'x']); // Utf8 "x"
        let pool = build_pool(&bytes, 4);
        assert_eq!(pool.tag(0), Some("Invalid"));
        assert_eq!(pool.tag(1), Some("Double"));
        assert_eq!(pool.tag(2), Some("Invalid"));
        assert!(pool.double(2).is_err());
        assert_eq!(pool.utf8(3).unwrap(), "x");
    }

    #[test]
    fn resolves_class_entry_to_its_interned_name() {
        // [1] = Utf8 "java/lang/Object", [2] = Class -> name_index 1
        let mut bytes = vec![1u8, 0, 16];
        bytes.extend_from_slice(b"java/lang/Object");
        bytes.extend_from_slice(&[7, 0, 1]);
        let pool = build_pool(&bytes, 3);
        let resolved = pool.resolved_class(2).unwrap();
        assert_eq!(resolved.internal_name, "java/lang/Object");
        // A second resolution must yield the same kind/value (pool invariant).
        assert_eq!(pool.resolved_class(2).unwrap(), resolved);
    }

    #[test]
    fn float_bit_pattern_equality_distinguishes_negative_zero_and_nan() {
        assert!(!ConstantPool::float_bits_eq(0.0, -0.0));
        assert!(ConstantPool::float_bits_eq(f32::NAN, f32::NAN));
    }

    #[test]
    fn resolves_method_ref_with_parsed_descriptor() {
        // Build: [1]=Utf8 "Main" [2]=Class(1) [3]=Utf8 "add" [4]=Utf8 "(II)I"
        // [5]=NameAndType(3,4) [6]=MethodRef(2,5)
        let mut bytes = vec![1u8, 0, 4];
        bytes.extend_from_slice(b"Main");
        bytes.extend_from_slice(&[7, 0, 1]);
        bytes.extend_from_slice(&[1, 0, 3]);
        bytes.extend_from_slice(b"add");
        bytes.extend_from_slice(&[1, 0, 5]);
        bytes.extend_from_slice(b"(II)I");
        bytes.extend_from_slice(&[12, 0, 3, 0, 4]);
        bytes.extend_from_slice(&[10, 0, 2, 0, 5]);
        let pool = build_pool(&bytes, 7);
        let m = pool.resolved_method(6, true, false).unwrap();
        assert_eq!(m.name, "add");
        assert_eq!(m.class.internal_name, "Main");
        assert_eq!(m.descriptor.parameters, vec![FieldType::Int, FieldType::Int]);
        assert_eq!(m.descriptor.return_type, Some(FieldType::Int));
    }
}
