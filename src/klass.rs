//! `Klass`: a named, internable class descriptor, and the registry
//! that interns classes by name and tracks their load state.
use std::collections::HashMap;

use bitflags::bitflags;

use crate::descriptor::FieldType;
use crate::error::{ErrorContext, Result, TranslationError};
use crate::method::Method;

bitflags! {
    /// Class, field and method access-flag bits, shared across the
    /// three member kinds (the JVM spec reuses the same bit
    /// positions with kind-specific meaning for a few of them).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u16 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const PROTECTED    = 0x0004;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        const SUPER        = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE     = 0x0040;
        const BRIDGE       = 0x0040;
        const TRANSIENT    = 0x0080;
        const VARARGS      = 0x0080;
        const NATIVE       = 0x0100;
        const INTERFACE    = 0x0200;
        const ABSTRACT     = 0x0400;
        const STRICT       = 0x0800;
        const SYNTHETIC    = 0x1000;
        const ANNOTATION   = 0x2000;
        const ENUM         = 0x4000;
        /// Not a JVM bit: set by the loader when an `<init>` method is
        /// rewritten to a static, class-returning constructor (§4.C).
        const CONSTRUCTOR     = 0x0001_0000;
        /// Not a JVM bit: set on `<clinit>`.
        const CLASSINITIALIZER = 0x0002_0000;
        /// Not a JVM bit: set on a static final field carrying a
        /// `ConstantValue` attribute.
        const CONSTANT         = 0x0004_0000;
    }
}

/// Stable small integer identifying a primitive type or well-known
/// class, used by the Minfo type table and oopmap encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClassId {
    Boolean = 0,
    Byte = 1,
    Short = 2,
    Char = 3,
    Int = 4,
    Long = 5,
    Float = 6,
    Double = 7,
    Void = 8,
    Object = 9,
    String = 10,
    /// A word-sized raw memory address. Forbidden to alias with any
    /// reference category in the same local slot.
    Address = 11,
    /// A word-sized unsigned offset/length. Same aliasing rule as
    /// `Address`.
    UWord = 12,
    /// A word-sized signed offset. Same aliasing rule as `Address`.
    Offset = 13,
    /// Any class not covered by a lower, stable id.
    Other = 255,
}

impl ClassId {
    #[must_use]
    pub const fn is_squawk_primitive(self) -> bool {
        matches!(self, Self::Address | Self::UWord | Self::Offset)
    }

    #[must_use]
    pub fn for_internal_name(name: &str) -> Self {
        match name {
            "java/lang/Object" => Self::Object,
            "java/lang/String" => Self::String,
            "com/sun/squawk/Address" => Self::Address,
            "com/sun/squawk/UWord" => Self::UWord,
            "com/sun/squawk/Offset" => Self::Offset,
            _ => Self::Other,
        }
    }
}

/// The linear load-state machine a [`Klass`] advances through.
/// `state` advances monotonically and may only transition backwards
/// into `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlassState {
    Defined,
    Loading,
    Loaded,
    Verified,
    Error,
}

impl KlassState {
    const fn rank(self) -> u8 {
        match self {
            Self::Defined => 0,
            Self::Loading => 1,
            Self::Loaded => 2,
            Self::Verified => 3,
            Self::Error => 4,
        }
    }

    /// Whether advancing from `self` to `next` is a legal transition:
    /// monotonic, or a transition into `Error` from anywhere.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(next, Self::Error) || next.rank() > self.rank()
    }
}

/// A named, internable class descriptor.
#[derive(Debug, Clone)]
pub struct Klass {
    pub name: String,
    pub modifiers: Modifiers,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub instance_fields: Vec<crate::method::FieldDecl>,
    pub static_fields: Vec<crate::method::FieldDecl>,
    pub virtual_methods: Vec<Method>,
    pub static_methods: Vec<Method>,
    pub state: KlassState,
    pub class_id: ClassId,
    pub is_array: bool,
    pub component_type: Option<FieldType>,
    pub source_file: Option<String>,
}

impl Klass {
    /// `java.lang.Object` has no super; every other concrete class
    /// has one.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.name == "java/lang/Object"
    }

    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.modifiers.contains(Modifiers::INTERFACE)
    }

    /// Transitions `self.state` forward, rejecting illegal (backward,
    /// non-`Error`) transitions.
    pub fn advance_state(&mut self, next: KlassState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(TranslationError::internal(
                format!("illegal class state transition {:?} -> {:?}", self.state, next),
                ErrorContext::new().with_class(self.name.clone()),
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Synthesizes an array class for `component`. Array classes are
    /// never loaded from a file; their internal name is the
    /// descriptor-grammar array prefix over the component's name.
    #[must_use]
    pub fn synthesize_array(component: &FieldType, component_name: &str) -> Self {
        let name = format!("[{}", array_component_descriptor(component, component_name));
        Self {
            name,
            modifiers: Modifiers::PUBLIC | Modifiers::FINAL,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            instance_fields: Vec::new(),
            static_fields: Vec::new(),
            virtual_methods: Vec::new(),
            static_methods: Vec::new(),
            state: KlassState::Loaded,
            class_id: ClassId::Other,
            is_array: true,
            component_type: Some(component.clone()),
            source_file: None,
        }
    }
}

fn array_component_descriptor(component: &FieldType, component_name: &str) -> String {
    match component {
        FieldType::Object(_) => format!("L{component_name};"),
        FieldType::Array(inner) => format!("[{}", array_component_descriptor(inner, component_name)),
        other => other.to_string(),
    }
}

/// Name -> class registry with single-writer mutation, implementing
/// the `DEFINED -> LOADING -> LOADED -> VERIFIED -> ERROR` state
/// machine described in spec §2/§3.
#[derive(Debug, Default)]
pub struct KlassRegistry {
    classes: HashMap<String, Klass>,
}

impl KlassRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { classes: HashMap::new() }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Klass> {
        self.classes.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Begins loading `name`: inserts a `Defined`-state placeholder if
    /// absent, or reports `ClassCircularity` if `name` is already
    /// `Loading` (a cycle through transitive resolution).
    pub fn begin_loading(&mut self, name: &str) -> Result<()> {
        if let Some(existing) = self.classes.get(name) {
            if existing.state == KlassState::Loading {
                log::debug!("circularity loading {name}");
                return Err(TranslationError::ClassCircularity {
                    class_name: name.to_string(),
                    context: ErrorContext::new(),
                });
            }
            return Ok(());
        }
        self.classes.insert(
            name.to_string(),
            Klass {
                name: name.to_string(),
                modifiers: Modifiers::empty(),
                super_name: None,
                interfaces: Vec::new(),
                instance_fields: Vec::new(),
                static_fields: Vec::new(),
                virtual_methods: Vec::new(),
                static_methods: Vec::new(),
                state: KlassState::Loading,
                class_id: ClassId::for_internal_name(name),
                is_array: false,
                component_type: None,
                source_file: None,
            },
        );
        Ok(())
    }

    /// Installs a fully-populated `Klass`, replacing its placeholder.
    /// Disagreement with a previously installed class of the same
    /// name is a `Linkage`-flavored `ClassFormat` error (modeled as
    /// `ClassFormat` since this crate does not separately model a
    /// `Linkage` variant beyond §7's seven kinds).
    pub fn install(&mut self, klass: Klass) -> Result<()> {
        if let Some(existing) = self.classes.get(&klass.name) {
            if existing.state == KlassState::Loaded || existing.state == KlassState::Verified {
                return Err(TranslationError::class_format(
                    format!("class {} already loaded and disagrees with new definition", klass.name),
                    ErrorContext::new().with_class(klass.name.clone()),
                ));
            }
        }
        self.classes.insert(klass.name.clone(), klass);
        Ok(())
    }

    /// Pins `name` permanently in the `Error` state.
    pub fn mark_error(&mut self, name: &str) {
        if let Some(k) = self.classes.get_mut(name) {
            k.state = KlassState::Error;
        } else {
            self.classes.insert(
                name.to_string(),
                Klass {
                    name: name.to_string(),
                    modifiers: Modifiers::empty(),
                    super_name: None,
                    interfaces: Vec::new(),
                    instance_fields: Vec::new(),
                    static_fields: Vec::new(),
                    virtual_methods: Vec::new(),
                    static_methods: Vec::new(),
                    state: KlassState::Error,
                    class_id: ClassId::Other,
                    is_array: false,
                    component_type: None,
                    source_file: None,
                },
            );
        }
    }

    /// Interns a synthesized array class, creating it if absent.
    pub fn intern_array(&mut self, component: &FieldType, component_name: &str) -> &Klass {
        let klass = Klass::synthesize_array(component, component_name);
        self.classes.entry(klass.name.clone()).or_insert(klass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_is_monotonic_except_into_error() {
        assert!(KlassState::Defined.can_advance_to(KlassState::Loading));
        assert!(KlassState::Loading.can_advance_to(KlassState::Loaded));
        assert!(!KlassState::Loaded.can_advance_to(KlassState::Loading));
        assert!(KlassState::Loaded.can_advance_to(KlassState::Error));
        assert!(KlassState::Verified.can_advance_to(KlassState::Error));
    }

    #[test]
    fn begin_loading_twice_without_finishing_is_circularity() {
        let mut reg = KlassRegistry::new();
        reg.begin_loading("A").unwrap();
        let err = reg.begin_loading("A").unwrap_err();
        assert!(matches!(err, TranslationError::ClassCircularity { .. }));
    }

    #[test]
    fn array_classes_are_synthesized_never_loaded() {
        let mut reg = KlassRegistry::new();
        let arr = reg.intern_array(&FieldType::Int, "");
        assert!(arr.is_array);
        assert_eq!(arr.name, "[I");
        assert_eq!(arr.state, KlassState::Loaded);
    }

    #[test]
    fn reinstalling_a_loaded_class_is_rejected() {
        let mut reg = KlassRegistry::new();
        reg.begin_loading("A").unwrap();
        let klass = Klass {
            name: "A".to_string(),
            modifiers: Modifiers::empty(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: vec![],
            instance_fields: vec![],
            static_fields: vec![],
            virtual_methods: vec![],
            static_methods: vec![],
            state: KlassState::Loaded,
            class_id: ClassId::Other,
            is_array: false,
            component_type: None,
            source_file: None,
        };
        reg.install(klass.clone()).unwrap();
        assert!(reg.install(klass).is_err());
    }
}
