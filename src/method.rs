//! Method and field data model.
use crate::descriptor::{FieldType, MethodDescriptor};
use crate::klass::Modifiers;

/// A declared field: name, descriptor, modifiers, and (for a static
/// final field carrying a `ConstantValue` attribute) its inline
/// constant.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub descriptor: FieldType,
    pub modifiers: Modifiers,
    pub constant_value: Option<ConstantValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// One entry of a method's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant-pool index of the catch type, or 0 for `finally`
    /// (catches everything).
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

/// A method's parsed `Code` attribute, prior to verification.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub stack_map: Vec<crate::frame::StackMapFrame>,
}

/// A method of a class. Constructors (`<init>`) are rewritten by the
/// loader to static methods whose return type is the defining class
/// and which carry `Modifiers::CONSTRUCTOR` (§4.C, §9).
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub defining_class: String,
    pub modifiers: Modifiers,
    pub code: Option<CodeBody>,
    pub line_number_table: Vec<LineNumberEntry>,
    pub local_variable_table: Vec<LocalVariableEntry>,
}

impl Method {
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.modifiers.contains(Modifiers::CONSTRUCTOR)
    }

    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.modifiers.contains(Modifiers::CLASSINITIALIZER)
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(Modifiers::ABSTRACT)
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.modifiers.contains(Modifiers::NATIVE)
    }

    /// A method's "shape" used for duplicate-method detection:
    /// (name, parameter types, return type) -- not the raw descriptor
    /// string, so two byte-identical-but-differently-pooled
    /// descriptors still compare equal when semantically identical.
    #[must_use]
    pub fn shape(&self) -> (String, Vec<FieldType>, Option<FieldType>) {
        (self.name.clone(), self.descriptor.parameters.clone(), self.descriptor.return_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, modifiers: Modifiers) -> Method {
        Method {
            name: name.to_string(),
            descriptor: MethodDescriptor { parameters: vec![], return_type: None },
            defining_class: "A".to_string(),
            modifiers,
            code: None,
            line_number_table: vec![],
            local_variable_table: vec![],
        }
    }

    #[test]
    fn constructor_flag_roundtrips() {
        let m = method("<init>", Modifiers::STATIC | Modifiers::CONSTRUCTOR);
        assert!(m.is_constructor());
        assert!(m.is_static());
    }

    #[test]
    fn shape_ignores_defining_class_and_modifiers() {
        let a = method("foo", Modifiers::PUBLIC);
        let b = method("foo", Modifiers::PRIVATE);
        assert_eq!(a.shape(), b.shape());
    }
}
