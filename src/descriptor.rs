//! Descriptor grammar: field descriptors, method descriptors, and the
//! name-validity checks the class-file loader applies to fields and
//! methods.
//!
//! A field descriptor is a single primitive letter (`Z B S C I J F D`),
//! a class descriptor `L<name>;`, or an array prefix `[`. A method
//! descriptor is `(<fields>)<field>|V`.
use std::fmt;

/// A parsed field (value) type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Number of 32-bit stack/local slots this type occupies.
    #[must_use]
    pub const fn slot_width(&self) -> u8 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// True in-memory size in bytes, used to order instance fields for
    /// packing (spec: "sort instance fields by type size descending").
    /// Unlike `slot_width`, this distinguishes `byte`/`short`/`char`
    /// from `int`/reference rather than collapsing them all to one
    /// verifier-stack word.
    #[must_use]
    pub const fn byte_size(&self) -> u8 {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Short | Self::Char => 2,
            Self::Long | Self::Double => 8,
            Self::Int | Self::Float | Self::Object(_) | Self::Array(_) => 4,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "Z"),
            Self::Byte => write!(f, "B"),
            Self::Short => write!(f, "S"),
            Self::Char => write!(f, "C"),
            Self::Int => write!(f, "I"),
            Self::Long => write!(f, "J"),
            Self::Float => write!(f, "F"),
            Self::Double => write!(f, "D"),
            Self::Object(name) => write!(f, "L{name};"),
            Self::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

/// A parsed method descriptor: parameter types plus a return type
/// (`None` for `void`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Total parameter slot count (longs/doubles count as two).
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(|t| t.slot_width() as usize).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError(pub String);

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a field descriptor, consuming the whole string.
pub fn parse_field_descriptor(s: &str) -> Result<FieldType, DescriptorError> {
    let mut chars = s.chars().peekable();
    let parsed = parse_field_type(&mut chars)?;
    if chars.next().is_some() {
        return Err(DescriptorError(format!("trailing characters in field descriptor {s:?}")));
    }
    Ok(parsed)
}

fn parse_field_type(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<FieldType, DescriptorError> {
    match chars.next() {
        Some('Z') => Ok(FieldType::Boolean),
        Some('B') => Ok(FieldType::Byte),
        Some('S') => Ok(FieldType::Short),
        Some('C') => Ok(FieldType::Char),
        Some('I') => Ok(FieldType::Int),
        Some('J') => Ok(FieldType::Long),
        Some('F') => Ok(FieldType::Float),
        Some('D') => Ok(FieldType::Double),
        Some('[') => Ok(FieldType::Array(Box::new(parse_field_type(chars)?))),
        Some('L') => {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(';') => break,
                    Some(c) => name.push(c),
                    None => return Err(DescriptorError("unterminated class descriptor".to_string())),
                }
            }
            if name.is_empty() {
                return Err(DescriptorError("empty class name in descriptor".to_string()));
            }
            Ok(FieldType::Object(name))
        }
        Some(other) => Err(DescriptorError(format!("unexpected descriptor character {other:?}"))),
        None => Err(DescriptorError("empty field descriptor".to_string())),
    }
}

/// Parses a method descriptor of the form `(<fields>)<field>|V`.
pub fn parse_method_descriptor(s: &str) -> Result<MethodDescriptor, DescriptorError> {
    let mut chars = s.chars().peekable();
    if chars.next() != Some('(') {
        return Err(DescriptorError(format!("method descriptor {s:?} must start with '('")));
    }
    let mut parameters = Vec::new();
    loop {
        match chars.peek() {
            Some(')') => {
                chars.next();
                break;
            }
            Some(_) => parameters.push(parse_field_type(&mut chars)?),
            None => return Err(DescriptorError("unterminated parameter list".to_string())),
        }
    }
    let return_type = match chars.peek() {
        Some('V') => {
            chars.next();
            None
        }
        Some(_) => Some(parse_field_type(&mut chars)?),
        None => return Err(DescriptorError("missing return type".to_string())),
    };
    if chars.next().is_some() {
        return Err(DescriptorError(format!("trailing characters in method descriptor {s:?}")));
    }
    Ok(MethodDescriptor { parameters, return_type })
}

/// A field/method name is valid if it consists of letters, digits,
/// `$` or `_`, and does not start with a digit. `<init>` and
/// `<clinit>` are the only names permitted to contain `<`/`>`.
#[must_use]
pub fn is_valid_member_name(name: &str) -> bool {
    if name == "<init>" || name == "<clinit>" {
        return true;
    }
    if name.is_empty() {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if first.is_ascii_digit() {
        return false;
    }
    name.chars().all(|c| c.is_alphanumeric() || c == '$' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_field_descriptors() {
        assert_eq!(parse_field_descriptor("I").unwrap(), FieldType::Int);
        assert_eq!(parse_field_descriptor("J").unwrap(), FieldType::Long);
        assert_eq!(parse_field_descriptor("Z").unwrap(), FieldType::Boolean);
    }

    #[test]
    fn parses_object_and_array_descriptors() {
        assert_eq!(
            parse_field_descriptor("Ljava/lang/String;").unwrap(),
            FieldType::Object("java/lang/String".to_string())
        );
        assert_eq!(
            parse_field_descriptor("[I").unwrap(),
            FieldType::Array(Box::new(FieldType::Int))
        );
        assert_eq!(
            parse_field_descriptor("[[Ljava/lang/Object;").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Object(
                "java/lang/Object".to_string()
            )))))
        );
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(parse_field_descriptor("").is_err());
        assert!(parse_field_descriptor("Ljava/lang/String").is_err());
        assert!(parse_field_descriptor("Iextra").is_err());
        assert!(parse_field_descriptor("Q").is_err());
    }

    #[test]
    fn parses_method_descriptor_with_void_return() {
        let d = parse_method_descriptor("(II)V").unwrap();
        assert_eq!(d.parameters, vec![FieldType::Int, FieldType::Int]);
        assert_eq!(d.return_type, None);
        assert_eq!(d.parameter_slots(), 2);
    }

    #[test]
    fn parses_method_descriptor_with_reference_return_and_wide_params() {
        let d = parse_method_descriptor("(JD[Ljava/lang/String;)Ljava/lang/Object;").unwrap();
        assert_eq!(d.parameters.len(), 3);
        assert_eq!(d.parameter_slots(), 4);
        assert_eq!(d.return_type, Some(FieldType::Object("java/lang/Object".to_string())));
    }

    #[test]
    fn validates_member_names() {
        assert!(is_valid_member_name("foo"));
        assert!(is_valid_member_name("foo_bar$1"));
        assert!(is_valid_member_name("<init>"));
        assert!(is_valid_member_name("<clinit>"));
        assert!(!is_valid_member_name("1foo"));
        assert!(!is_valid_member_name(""));
        assert!(!is_valid_member_name("foo bar"));
        assert!(!is_valid_member_name("<foo>"));
    }
}
