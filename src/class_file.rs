//! `ClassFileLoader`: orchestrates the eight-step load algorithm over
//! a raw class file, producing a populated [`Klass`] installed into a
//! [`KlassRegistry`].
use std::ops::Range;

use crate::constant_pool::ConstantPool;
use crate::descriptor::{self, FieldType, MethodDescriptor};
use crate::error::{ErrorContext, Result, TranslationError};
use crate::frame::{StackMapFrame, VerificationCategory};
use crate::klass::{ClassId, Klass, KlassRegistry, KlassState, Modifiers};
use crate::method::{CodeBody, ConstantValue, ExceptionEntry, FieldDecl, LineNumberEntry, LocalVariableEntry, Method};
use crate::reader::ClassFileReader;
use crate::trusted::{AccessKey, DigestLayout, DomainEntry, TrustedAttribute, VisibilityDelta};

const MIN_SUPPORTED_VERSION: u16 = 45;
const MAX_SUPPORTED_VERSION: u16 = 48;

/// External collaborator that turns an internal class name into the
/// bytes of its class file. Out of scope: caching, search-path
/// semantics, jar/zip handling -- all of that lives on the caller's
/// implementation.
pub trait ClasspathResolver {
    fn open(&self, internal_name: &str) -> std::io::Result<Vec<u8>>;
}

/// Everything discovered in a class's trailing attribute list that
/// does not belong to a field or method.
struct ClassAttrs {
    source_file: Option<String>,
    trusted: Option<(TrustedAttribute, DigestLayout)>,
}

/// Everything discovered in one method's attribute list.
struct MethodAttrs {
    code: Option<CodeBody>,
    line_number_table: Vec<LineNumberEntry>,
    local_variable_table: Vec<LocalVariableEntry>,
}

/// Orchestrates class loading against a shared [`KlassRegistry`],
/// resolving superclasses and interfaces (recursively, through an
/// optional [`ClasspathResolver`]) as it goes.
pub struct ClassFileLoader<'a> {
    registry: &'a mut KlassRegistry,
    resolver: Option<&'a dyn ClasspathResolver>,
}

impl<'a> ClassFileLoader<'a> {
    #[must_use]
    pub fn new(registry: &'a mut KlassRegistry, resolver: Option<&'a dyn ClasspathResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Loads a class from raw bytes, installing it into the registry
    /// and returning its internal name. `expected_name` is `Some` for
    /// a recursive load triggered by resolving a superclass or
    /// interface reference, where the caller already knows which name
    /// it asked the classpath resolver to open.
    pub fn load(&mut self, class_file_bytes: &[u8], expected_name: Option<&str>) -> Result<String> {
        let mut reader = ClassFileReader::new(class_file_bytes);

        let magic = reader.read_u4()?;
        if magic != 0xCAFE_BABE {
            return Err(TranslationError::class_format(
                format!("bad magic 0x{magic:08X}"),
                ErrorContext::new(),
            ));
        }
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&major_version) {
            return Err(TranslationError::class_format(
                format!("unsupported class file version {major_version}.{minor_version}"),
                ErrorContext::new(),
            ));
        }

        let constant_pool_count_offset = reader.current_offset();
        let constant_pool_count = reader.read_u2()?;
        let pool_start = reader.current_offset();
        let pool = ConstantPool::parse(&mut reader, constant_pool_count)?;
        let pool_ranges = scan_constant_pool_raw(class_file_bytes, pool_start, constant_pool_count);

        let access_flags = reader.read_u2()?;
        let modifiers = Modifiers::from_bits_truncate(access_flags);
        verify_class_modifiers(&modifiers)?;

        let this_class_index = reader.read_u2()?;
        let this_name = pool.klass(this_class_index)?.to_string();

        if let Some(expected) = expected_name {
            if expected != this_name {
                return Err(TranslationError::class_format(
                    format!("expected to load {expected}, found {this_name}"),
                    ErrorContext::new().with_class(this_name),
                ));
            }
        }
        self.registry.begin_loading(&this_name)?;

        let super_class_index = reader.read_u2()?;
        let super_name = self.resolve_super(&this_name, &modifiers, super_class_index, &pool)?;

        let interfaces_count = reader.read_u2()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            let index = reader.read_u2()?;
            let name = pool.klass(index)?.to_string();
            self.ensure_class_loaded(&name, &this_name)?;
            let iface = self.registry.get(&name).expect("just loaded");
            if !iface.is_interface() {
                self.registry.mark_error(&this_name);
                return Err(TranslationError::IncompatibleClassChange {
                    message: format!("{name} is not an interface"),
                    context: ErrorContext::new().with_class(this_name),
                });
            }
            interfaces.push(name);
        }

        let (instance_fields, static_fields) = match self.parse_fields(&mut reader, &pool) {
            Ok(fields) => fields,
            Err(e) => {
                self.registry.mark_error(&this_name);
                return Err(e);
            }
        };

        let (virtual_methods, static_methods) =
            match self.parse_methods(&mut reader, &pool, &this_name, &modifiers) {
                Ok(methods) => methods,
                Err(e) => {
                    self.registry.mark_error(&this_name);
                    return Err(e);
                }
            };

        let class_attrs = match parse_class_attributes(&mut reader, &pool, class_file_bytes, &pool_ranges) {
            Ok(attrs) => attrs,
            Err(e) => {
                self.registry.mark_error(&this_name);
                return Err(e);
            }
        };
        let _ = class_attrs.trusted; // digest layout/trusted attribute are consumed by callers that verify signatures, not by the loader itself.
        let _ = constant_pool_count_offset;

        let field_count = instance_fields.len() + static_fields.len();
        let method_count = virtual_methods.len() + static_methods.len();
        let mut klass = Klass {
            name: this_name.clone(),
            modifiers,
            super_name,
            interfaces,
            instance_fields,
            static_fields,
            virtual_methods,
            static_methods,
            state: KlassState::Loading,
            class_id: ClassId::for_internal_name(&this_name),
            is_array: false,
            component_type: None,
            source_file: class_attrs.source_file,
        };
        klass.advance_state(KlassState::Loaded)?;
        self.registry.install(klass)?;
        log::debug!("loaded {this_name} ({field_count} fields, {method_count} methods)");
        Ok(this_name)
    }

    /// Resolves `super_class_index` into a validated super-class name,
    /// enforcing §4.C step 3's rejection rules. Returns `None` only
    /// for `java.lang.Object` itself.
    fn resolve_super(
        &mut self,
        this_name: &str,
        modifiers: &Modifiers,
        super_class_index: u16,
        pool: &ConstantPool,
    ) -> Result<Option<String>> {
        if this_name == "java/lang/Object" {
            if super_class_index != 0 {
                return Err(TranslationError::class_format(
                    "java.lang.Object must not declare a superclass".to_string(),
                    ErrorContext::new().with_class(this_name.to_string()),
                ));
            }
            return Ok(None);
        }
        if super_class_index == 0 {
            return Err(TranslationError::class_format(
                "only java.lang.Object may omit a superclass".to_string(),
                ErrorContext::new().with_class(this_name.to_string()),
            ));
        }
        let super_name = pool.klass(super_class_index)?.to_string();
        if modifiers.contains(Modifiers::INTERFACE) && super_name != "java/lang/Object" {
            return Err(TranslationError::class_format(
                "an interface's superclass must be java.lang.Object".to_string(),
                ErrorContext::new().with_class(this_name.to_string()),
            ));
        }
        self.ensure_class_loaded(&super_name, this_name)?;
        let super_klass = self.registry.get(&super_name).expect("just loaded");
        if super_klass.is_interface() {
            return Err(TranslationError::IncompatibleClassChange {
                message: format!("{super_name} is an interface and cannot be a superclass"),
                context: ErrorContext::new().with_class(this_name.to_string()),
            });
        }
        if super_klass.is_array {
            return Err(TranslationError::IncompatibleClassChange {
                message: format!("{super_name} is an array class and cannot be a superclass"),
                context: ErrorContext::new().with_class(this_name.to_string()),
            });
        }
        if super_klass.modifiers.contains(Modifiers::FINAL) {
            return Err(TranslationError::IncompatibleClassChange {
                message: format!("{super_name} is final and cannot be a superclass"),
                context: ErrorContext::new().with_class(this_name.to_string()),
            });
        }
        Ok(Some(super_name))
    }

    /// Ensures `name` is present in the registry in at least `Loaded`
    /// state, recursively loading it through the classpath resolver
    /// when absent.
    fn ensure_class_loaded(&mut self, name: &str, requesting_class: &str) -> Result<()> {
        if self.registry.contains(name) {
            return Ok(());
        }
        let Some(resolver) = self.resolver else {
            return Err(TranslationError::NoClassDef {
                class_name: name.to_string(),
                context: ErrorContext::new().with_class(requesting_class.to_string()),
            });
        };
        let bytes = resolver.open(name).map_err(|e| TranslationError::NoClassDef {
            class_name: format!("{name}: {e}"),
            context: ErrorContext::new().with_class(requesting_class.to_string()),
        })?;
        self.load(&bytes, Some(name))?;
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn parse_fields(
        &mut self,
        reader: &mut ClassFileReader,
        pool: &ConstantPool,
    ) -> Result<(Vec<FieldDecl>, Vec<FieldDecl>)> {
        let count = reader.read_u2()?;
        let mut seen: Vec<(String, FieldType)> = Vec::new();
        let mut instance_fields = Vec::new();
        let mut static_fields = Vec::new();

        for _ in 0..count {
            let access_flags = reader.read_u2()?;
            let modifiers = Modifiers::from_bits_truncate(access_flags);
            verify_field_modifiers(&modifiers)?;
            let name_index = reader.read_u2()?;
            let name = pool.utf8(name_index)?.to_string();
            if !descriptor::is_valid_member_name(&name) || name.starts_with('<') {
                return Err(TranslationError::class_format(
                    format!("invalid field name {name:?}"),
                    ErrorContext::new(),
                ));
            }
            let descriptor_index = reader.read_u2()?;
            let descriptor_string = pool.utf8(descriptor_index)?.to_string();
            let field_type = descriptor::parse_field_descriptor(&descriptor_string)
                .map_err(|e| TranslationError::class_format(e.0, ErrorContext::new()))?;

            if seen.iter().any(|(n, t)| *n == name && *t == field_type) {
                return Err(TranslationError::class_format(
                    format!("duplicate field {name} {descriptor_string}"),
                    ErrorContext::new(),
                ));
            }

            let is_static_final = modifiers.contains(Modifiers::STATIC | Modifiers::FINAL);
            let (constant_value, mut modifiers) = self.parse_field_attributes(reader, pool, &field_type, modifiers, is_static_final)?;
            if constant_value.is_some() {
                modifiers |= Modifiers::CONSTANT;
            }

            seen.push((name.clone(), field_type.clone()));
            let field = FieldDecl { name, descriptor: field_type, modifiers, constant_value };
            if modifiers.contains(Modifiers::STATIC) {
                static_fields.push(field);
            } else {
                instance_fields.push(field);
            }
        }

        instance_fields.sort_by(|a, b| b.descriptor.byte_size().cmp(&a.descriptor.byte_size()));
        Ok((instance_fields, static_fields))
    }

    fn parse_field_attributes(
        &self,
        reader: &mut ClassFileReader,
        pool: &ConstantPool,
        field_type: &FieldType,
        modifiers: Modifiers,
        is_static_final: bool,
    ) -> Result<(Option<ConstantValue>, Modifiers)> {
        let attribute_count = reader.read_u2()?;
        let mut constant_value = None;
        for _ in 0..attribute_count {
            let name_index = reader.read_u2()?;
            let attribute_name = pool.utf8(name_index)?.to_string();
            let length = reader.read_u4()?;
            if attribute_name == "ConstantValue" && is_static_final {
                let value_index = reader.read_u2()?;
                constant_value = Some(constant_value_for(pool, field_type, value_index)?);
            } else {
                reader.skip(length as usize)?;
            }
        }
        Ok((constant_value, modifiers))
    }

    #[allow(clippy::type_complexity)]
    fn parse_methods(
        &mut self,
        reader: &mut ClassFileReader,
        pool: &ConstantPool,
        this_name: &str,
        class_modifiers: &Modifiers,
    ) -> Result<(Vec<Method>, Vec<Method>)> {
        let count = reader.read_u2()?;
        let mut seen: Vec<(String, Vec<FieldType>, Option<FieldType>)> = Vec::new();
        let mut virtual_methods = Vec::new();
        let mut static_methods = Vec::new();
        let mut has_constructor = false;

        for _ in 0..count {
            let access_flags = reader.read_u2()?;
            let mut modifiers = Modifiers::from_bits_truncate(access_flags);
            let name_index = reader.read_u2()?;
            let name = pool.utf8(name_index)?.to_string();
            let descriptor_index = reader.read_u2()?;
            let descriptor_string = pool.utf8(descriptor_index)?.to_string();
            let mut descriptor = descriptor::parse_method_descriptor(&descriptor_string)
                .map_err(|e| TranslationError::class_format(e.0, ErrorContext::new()))?;

            let is_init = name == "<init>";
            let is_clinit = name == "<clinit>";
            if is_init {
                if modifiers.intersects(
                    Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNCHRONIZED | Modifiers::NATIVE | Modifiers::ABSTRACT,
                ) {
                    return Err(TranslationError::class_format(
                        "<init> must not be static, final, synchronized, native or abstract".to_string(),
                        ErrorContext::new().with_class(this_name.to_string()).with_method(name),
                    ));
                }
                modifiers = (modifiers & (Modifiers::PUBLIC | Modifiers::PRIVATE | Modifiers::PROTECTED))
                    | Modifiers::STATIC
                    | Modifiers::CONSTRUCTOR;
                descriptor.return_type = Some(FieldType::Object(this_name.to_string()));
                has_constructor = true;
            } else if is_clinit {
                modifiers = Modifiers::STATIC | Modifiers::STRICT | Modifiers::CLASSINITIALIZER;
            }

            let attrs = self.parse_method_attributes(reader, pool)?;
            let is_native_or_abstract = modifiers.intersects(Modifiers::NATIVE | Modifiers::ABSTRACT);
            if is_native_or_abstract && attrs.code.is_some() {
                return Err(TranslationError::class_format(
                    format!("native/abstract method {name} must not carry a Code attribute"),
                    ErrorContext::new().with_class(this_name.to_string()).with_method(name),
                ));
            }
            if !is_native_or_abstract && attrs.code.is_none() {
                return Err(TranslationError::class_format(
                    format!("method {name} must carry a Code attribute"),
                    ErrorContext::new().with_class(this_name.to_string()).with_method(name),
                ));
            }

            let method = Method {
                name: name.clone(),
                descriptor,
                defining_class: this_name.to_string(),
                modifiers,
                code: attrs.code,
                line_number_table: attrs.line_number_table,
                local_variable_table: attrs.local_variable_table,
            };
            let shape = method.shape();
            if seen.contains(&shape) {
                return Err(TranslationError::class_format(
                    format!("duplicate method {name} {descriptor_string}"),
                    ErrorContext::new().with_class(this_name.to_string()),
                ));
            }
            seen.push(shape);

            if modifiers.contains(Modifiers::STATIC) {
                static_methods.push(method);
            } else {
                virtual_methods.push(method);
            }
        }

        let is_concrete = !class_modifiers.intersects(Modifiers::ABSTRACT | Modifiers::INTERFACE);
        if is_concrete && !has_constructor {
            static_methods.push(synthesize_default_constructor(this_name));
        }

        Ok((virtual_methods, static_methods))
    }

    fn parse_method_attributes(&self, reader: &mut ClassFileReader, pool: &ConstantPool) -> Result<MethodAttrs> {
        let attribute_count = reader.read_u2()?;
        let mut code = None;
        let mut line_number_table = Vec::new();
        let mut local_variable_table = Vec::new();
        for _ in 0..attribute_count {
            let name_index = reader.read_u2()?;
            let attribute_name = pool.utf8(name_index)?.to_string();
            let length = reader.read_u4()?;
            if attribute_name == "Code" {
                let (body, lnt, lvt) = parse_code_attribute(reader, pool)?;
                code = Some(body);
                line_number_table = lnt;
                local_variable_table = lvt;
            } else {
                reader.skip(length as usize)?;
            }
        }
        Ok(MethodAttrs { code, line_number_table, local_variable_table })
    }
}

fn verify_class_modifiers(modifiers: &Modifiers) -> Result<()> {
    if modifiers.contains(Modifiers::FINAL | Modifiers::ABSTRACT) {
        return Err(TranslationError::class_format(
            "a class may not be both final and abstract".to_string(),
            ErrorContext::new(),
        ));
    }
    if modifiers.contains(Modifiers::INTERFACE) {
        if !modifiers.contains(Modifiers::ABSTRACT) {
            return Err(TranslationError::class_format(
                "an interface must be abstract".to_string(),
                ErrorContext::new(),
            ));
        }
        if modifiers.intersects(Modifiers::FINAL | Modifiers::SUPER) {
            return Err(TranslationError::class_format(
                "an interface may not be final or declare ACC_SUPER".to_string(),
                ErrorContext::new(),
            ));
        }
    }
    Ok(())
}

fn verify_field_modifiers(modifiers: &Modifiers) -> Result<()> {
    let visibility = Modifiers::PUBLIC | Modifiers::PRIVATE | Modifiers::PROTECTED;
    if (*modifiers & visibility).bits().count_ones() > 1 {
        return Err(TranslationError::class_format(
            "a field may carry at most one of public/private/protected".to_string(),
            ErrorContext::new(),
        ));
    }
    Ok(())
}

fn constant_value_for(pool: &ConstantPool, field_type: &FieldType, index: u16) -> Result<ConstantValue> {
    match field_type {
        FieldType::Long => Ok(ConstantValue::Long(pool.long(index)?)),
        FieldType::Float => Ok(ConstantValue::Float(pool.float(index)?)),
        FieldType::Double => Ok(ConstantValue::Double(pool.double(index)?)),
        FieldType::Object(name) if name == "java/lang/String" => Ok(ConstantValue::String(pool.string(index)?.to_string())),
        _ => Ok(ConstantValue::Int(pool.int(index)?)),
    }
}

fn synthesize_default_constructor(this_name: &str) -> Method {
    Method {
        name: "<init>".to_string(),
        descriptor: MethodDescriptor { parameters: vec![], return_type: Some(FieldType::Object(this_name.to_string())) },
        defining_class: this_name.to_string(),
        modifiers: Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::CONSTRUCTOR,
        code: Some(CodeBody {
            max_stack: 0,
            max_locals: 1,
            code: vec![0xB1], // return
            exception_table: vec![],
            stack_map: vec![],
        }),
        line_number_table: vec![],
        local_variable_table: vec![],
    }
}

/// Parses a `Code` attribute's body, including its nested
/// `LineNumberTable`/`LocalVariableTable`/`StackMap` attributes.
fn parse_code_attribute(
    reader: &mut ClassFileReader,
    pool: &ConstantPool,
) -> Result<(CodeBody, Vec<LineNumberEntry>, Vec<LocalVariableEntry>)> {
    let max_stack = reader.read_u2()?;
    let max_locals = reader.read_u2()?;
    let code_length = reader.read_u4()?;
    let code = reader.read_fully(code_length as usize)?;

    let exception_table_length = reader.read_u2()?;
    let mut exception_table = Vec::with_capacity(exception_table_length as usize);
    for _ in 0..exception_table_length {
        exception_table.push(ExceptionEntry {
            start_pc: reader.read_u2()?,
            end_pc: reader.read_u2()?,
            handler_pc: reader.read_u2()?,
            catch_type: reader.read_u2()?,
        });
    }

    let mut stack_map = Vec::new();
    let mut line_number_table = Vec::new();
    let mut local_variable_table = Vec::new();

    let nested_attribute_count = reader.read_u2()?;
    for _ in 0..nested_attribute_count {
        let name_index = reader.read_u2()?;
        let attribute_name = pool.utf8(name_index)?.to_string();
        let length = reader.read_u4()?;
        match attribute_name.as_str() {
            "StackMap" => stack_map = parse_stack_map_attribute(reader, pool, max_locals)?,
            "LineNumberTable" => {
                let entry_count = reader.read_u2()?;
                for _ in 0..entry_count {
                    line_number_table.push(LineNumberEntry { start_pc: reader.read_u2()?, line_number: reader.read_u2()? });
                }
            }
            "LocalVariableTable" => {
                let entry_count = reader.read_u2()?;
                for _ in 0..entry_count {
                    let start_pc = reader.read_u2()?;
                    let length = reader.read_u2()?;
                    let name_index = reader.read_u2()?;
                    let descriptor_index = reader.read_u2()?;
                    let index = reader.read_u2()?;
                    local_variable_table.push(LocalVariableEntry {
                        start_pc,
                        length,
                        name: pool.utf8(name_index)?.to_string(),
                        descriptor: pool.utf8(descriptor_index)?.to_string(),
                        index,
                    });
                }
            }
            _ => reader.skip(length as usize)?,
        }
    }

    Ok((CodeBody { max_stack, max_locals, code, exception_table, stack_map }, line_number_table, local_variable_table))
}

/// Parses the CLDC-style `StackMap` attribute: a sequence of full
/// (non-delta) frames, each an address plus complete locals and stack
/// arrays, as consumed directly by [`crate::code_parser::CodeParser`].
fn parse_stack_map_attribute(reader: &mut ClassFileReader, pool: &ConstantPool, max_locals: u16) -> Result<Vec<StackMapFrame>> {
    let entry_count = reader.read_u2()?;
    let mut frames = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let address = u32::from(reader.read_u2()?);
        let locals_count = reader.read_u2()?;
        let mut locals = Vec::new();
        for _ in 0..locals_count {
            push_verification_type(reader, pool, &mut locals)?;
        }
        while locals.len() < max_locals as usize {
            locals.push(VerificationCategory::Top);
        }
        let stack_count = reader.read_u2()?;
        let mut stack = Vec::new();
        for _ in 0..stack_count {
            push_verification_type(reader, pool, &mut stack)?;
        }
        frames.push(StackMapFrame { address, locals, stack });
    }
    Ok(frames)
}

/// Reads one `verification_type_info` entry and appends it (widening
/// `Long`/`Double` into their two-slot physical representation, to
/// match [`crate::frame::Frame`]'s stack/locals convention).
fn push_verification_type(reader: &mut ClassFileReader, pool: &ConstantPool, out: &mut Vec<VerificationCategory>) -> Result<()> {
    let tag = reader.read_u1()?;
    match tag {
        0 => out.push(VerificationCategory::Top),
        1 => out.push(VerificationCategory::Int),
        2 => out.push(VerificationCategory::Float),
        3 => {
            out.push(VerificationCategory::Double);
            out.push(VerificationCategory::Double2);
        }
        4 => {
            out.push(VerificationCategory::Long);
            out.push(VerificationCategory::Long2);
        }
        5 => out.push(VerificationCategory::Null),
        6 => out.push(VerificationCategory::UninitializedThis),
        7 => {
            let index = reader.read_u2()?;
            out.push(VerificationCategory::Reference(Some(pool.klass(index)?.to_string())));
        }
        8 => {
            let offset = u32::from(reader.read_u2()?);
            out.push(VerificationCategory::Uninitialized(offset));
        }
        other => {
            return Err(TranslationError::class_format(
                format!("unexpected verification_type_info tag {other}"),
                ErrorContext::new(),
            ))
        }
    }
    Ok(())
}

fn parse_class_attributes(
    reader: &mut ClassFileReader,
    pool: &ConstantPool,
    class_file_bytes: &[u8],
    pool_ranges: &[Range<usize>],
) -> Result<ClassAttrs> {
    let attribute_count = reader.read_u2()?;
    let mut source_file = None;
    let mut trusted = None;
    for i in 0..attribute_count {
        let attribute_start = reader.current_offset();
        let name_index = reader.read_u2()?;
        let attribute_name = pool.utf8(name_index)?.to_string();
        let length = reader.read_u4()?;
        match attribute_name.as_str() {
            "SourceFile" => {
                let index = reader.read_u2()?;
                source_file = Some(pool.utf8(index)?.to_string());
            }
            "Trusted" => {
                if i + 1 != attribute_count {
                    return Err(TranslationError::class_format(
                        "Trusted attribute must be the last class attribute".to_string(),
                        ErrorContext::new(),
                    ));
                }
                let attr = parse_trusted_attribute(reader)?;
                let attribute_end = reader.current_offset();
                let layout = DigestLayout {
                    constant_pool_count_offset: 8,
                    attributes_count_offset: attribute_start - 2,
                    trusted_utf8_range: pool_ranges.get(name_index as usize).cloned().unwrap_or(0..0),
                    trusted_attribute_range: attribute_start..attribute_end,
                };
                trusted = Some((attr, layout));
            }
            _ => reader.skip(length as usize)?,
        }
    }
    let _ = class_file_bytes;
    Ok(ClassAttrs { source_file, trusted })
}

/// Wire format for the Trusted attribute's body. Not specified
/// byte-for-byte upstream beyond "a secondary constant pool, access
/// control data and a signed domain table" (see DESIGN.md): this is a
/// straightforward count-prefixed encoding of exactly the fields
/// `TrustedAttribute` declares, in declaration order.
fn parse_trusted_attribute(reader: &mut ClassFileReader) -> Result<TrustedAttribute> {
    let secondary_pool_count = reader.read_u2()?;
    let pool = ConstantPool::parse(reader, secondary_pool_count)?;
    let access_flags = reader.read_u2()?;
    let subclass_access_key: AccessKey = reader.read_u4()?;
    let class_resource_access_key: AccessKey = reader.read_u4()?;
    let default_field_visibility = reader.read_u1()? != 0;
    let default_method_visibility = reader.read_u1()? != 0;
    let field_visibility_deltas = read_visibility_deltas(reader)?;
    let method_visibility_deltas = read_visibility_deltas(reader)?;
    let subclass_permits = read_access_keys(reader)?;
    let class_resource_access_permits = read_access_keys(reader)?;
    let reflective_class_resource_access_permits = read_access_keys(reader)?;
    let domain_table = read_domain_table(reader)?;

    Ok(TrustedAttribute {
        pool,
        access_flags,
        subclass_access_key,
        class_resource_access_key,
        default_field_visibility,
        default_method_visibility,
        field_visibility_deltas,
        method_visibility_deltas,
        subclass_permits,
        class_resource_access_permits,
        reflective_class_resource_access_permits,
        domain_table,
    })
}

fn read_visibility_deltas(reader: &mut ClassFileReader) -> Result<Vec<VisibilityDelta>> {
    let count = reader.read_u2()?;
    let mut deltas = Vec::with_capacity(count as usize);
    for _ in 0..count {
        deltas.push(VisibilityDelta { member_index: reader.read_u2()?, visible: reader.read_u1()? != 0 });
    }
    deltas.sort_by_key(|d| d.member_index);
    Ok(deltas)
}

fn read_access_keys(reader: &mut ClassFileReader) -> Result<Vec<AccessKey>> {
    let count = reader.read_u2()?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        keys.push(reader.read_u4()?);
    }
    keys.sort_unstable();
    Ok(keys)
}

fn read_domain_table(reader: &mut ClassFileReader) -> Result<Vec<DomainEntry>> {
    let count = reader.read_u2()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = reader.read_u4()?;
        let signature_length = reader.read_u2()? as usize;
        let signature = reader.read_fully(signature_length)?;
        entries.push(DomainEntry { key, signature });
    }
    Ok(entries)
}

/// Walks the raw bytes of a constant pool purely to recover each
/// entry's byte range, without decoding values -- used only to locate
/// the `"Trusted"` UTF8 entry for [`DigestLayout`], since by the time
/// `ConstantPool` has parsed the pool the original byte offsets are
/// gone.
fn scan_constant_pool_raw(bytes: &[u8], start: usize, count: u16) -> Vec<Range<usize>> {
    let mut ranges = vec![start..start];
    let mut offset = start;
    let mut i = 1usize;
    while i < count as usize && offset < bytes.len() {
        let entry_start = offset;
        let tag = bytes[offset];
        offset += 1;
        let body_len = match tag {
            1 => {
                let len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
                2 + len
            }
            3 | 4 => 4,
            5 | 6 => 8,
            7 | 8 | 16 => 2,
            9 | 10 | 11 | 12 | 18 => 4,
            13 | 14 => {
                let len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
                2 + len
            }
            15 => 3,
            _ => 0,
        };
        offset += body_len;
        ranges.push(entry_start..offset);
        if tag == 5 || tag == 6 {
            ranges.push(offset..offset);
            i += 2;
        } else {
            i += 1;
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_entry(s: &str) -> Vec<u8> {
        let mut out = vec![1u8];
        out.extend_from_slice(&(s.len() as u16).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
        out
    }

    /// Builds the smallest legal class file: `java.lang.Object` itself
    /// has no superclass, no fields, no methods, and a single
    /// `SourceFile` attribute.
    fn minimal_object_class_file() -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        // Constant pool: [1] Utf8 "java/lang/Object", [2] Class(1), [3] Utf8 "Object.java"
        bytes.extend_from_slice(&[0x00, 0x04]); // constant_pool_count = 4
        bytes.extend(utf8_entry("java/lang/Object"));
        bytes.extend_from_slice(&[7, 0, 1]);
        bytes.extend(utf8_entry("Object.java"));
        bytes.extend_from_slice(&[0x00, 0x21]); // access_flags: PUBLIC|SUPER
        bytes.extend_from_slice(&[0x00, 0x02]); // this_class
        bytes.extend_from_slice(&[0x00, 0x00]); // super_class = 0
        bytes.extend_from_slice(&[0x00, 0x00]); // interfaces_count
        bytes.extend_from_slice(&[0x00, 0x00]); // fields_count
        bytes.extend_from_slice(&[0x00, 0x00]); // methods_count
        bytes.extend_from_slice(&[0x00, 0x00]); // attributes_count
        bytes
    }

    #[test]
    fn loads_java_lang_object_with_no_superclass() {
        let bytes = minimal_object_class_file();
        let mut registry = KlassRegistry::new();
        let mut loader = ClassFileLoader::new(&mut registry, None);
        let name = loader.load(&bytes, None).unwrap();
        assert_eq!(name, "java/lang/Object");
        let klass = registry.get("java/lang/Object").unwrap();
        assert_eq!(klass.state, KlassState::Loaded);
        assert!(klass.super_name.is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_object_class_file();
        bytes[0] = 0x00;
        let mut registry = KlassRegistry::new();
        let mut loader = ClassFileLoader::new(&mut registry, None);
        assert!(matches!(loader.load(&bytes, None), Err(TranslationError::ClassFormat { .. })));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = minimal_object_class_file();
        bytes[7] = 200;
        let mut registry = KlassRegistry::new();
        let mut loader = ClassFileLoader::new(&mut registry, None);
        assert!(matches!(loader.load(&bytes, None), Err(TranslationError::ClassFormat { .. })));
    }

    #[test]
    fn synthesizes_default_constructor_for_concrete_class_without_init() {
        let bytes = minimal_object_class_file();
        let mut registry = KlassRegistry::new();
        let mut loader = ClassFileLoader::new(&mut registry, None);
        loader.load(&bytes, None).unwrap();
        let klass = registry.get("java/lang/Object").unwrap();
        assert!(klass.static_methods.iter().any(Method::is_constructor));
    }

    struct FixedResolver(Vec<u8>);
    impl ClasspathResolver for FixedResolver {
        fn open(&self, _internal_name: &str) -> std::io::Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    /// A subclass whose super is missing from the registry resolves it
    /// through the classpath resolver before installing itself.
    #[test]
    fn resolves_superclass_through_classpath_resolver() {
        let object_bytes = minimal_object_class_file();

        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        bytes.extend_from_slice(&[0x00, 0x05]); // count = 5
        bytes.extend(utf8_entry("Sub")); // [1]
        bytes.extend_from_slice(&[7, 0, 1]); // [2] Class(1) = Sub
        bytes.extend(utf8_entry("java/lang/Object")); // [3]
        bytes.extend_from_slice(&[7, 0, 3]); // [4] Class(3) = java/lang/Object
        bytes.extend_from_slice(&[0x00, 0x21]); // access_flags
        bytes.extend_from_slice(&[0x00, 0x02]); // this_class = Sub
        bytes.extend_from_slice(&[0x00, 0x04]); // super_class = java/lang/Object
        bytes.extend_from_slice(&[0x00, 0x00]); // interfaces
        bytes.extend_from_slice(&[0x00, 0x00]); // fields
        bytes.extend_from_slice(&[0x00, 0x00]); // methods
        bytes.extend_from_slice(&[0x00, 0x00]); // attributes

        let resolver = FixedResolver(object_bytes);
        let mut registry = KlassRegistry::new();
        let mut loader = ClassFileLoader::new(&mut registry, Some(&resolver));
        let name = loader.load(&bytes, None).unwrap();
        assert_eq!(name, "Sub");
        assert_eq!(registry.get("java/lang/Object").unwrap().state, KlassState::Loaded);
        assert_eq!(registry.get("Sub").unwrap().super_name.as_deref(), Some("java/lang/Object"));
    }

    /// Instance fields are packed by descending byte size, not by
    /// verifier slot width -- a `byte` and an `int` share a slot width
    /// of 1 but must not share a packing tier.
    #[test]
    fn instance_fields_sort_by_true_byte_size_not_slot_width() {
        let object_bytes = minimal_object_class_file();

        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        bytes.extend_from_slice(&[0x00, 0x0B]); // count = 11
        bytes.extend(utf8_entry("Fields")); // [1]
        bytes.extend_from_slice(&[7, 0, 1]); // [2] Class(1) = Fields
        bytes.extend(utf8_entry("java/lang/Object")); // [3]
        bytes.extend_from_slice(&[7, 0, 3]); // [4] Class(3) = java/lang/Object
        bytes.extend(utf8_entry("b")); // [5]
        bytes.extend(utf8_entry("B")); // [6]
        bytes.extend(utf8_entry("i")); // [7]
        bytes.extend(utf8_entry("I")); // [8]
        bytes.extend(utf8_entry("l")); // [9]
        bytes.extend(utf8_entry("J")); // [10]
        bytes.extend_from_slice(&[0x00, 0x21]); // access_flags
        bytes.extend_from_slice(&[0x00, 0x02]); // this_class = Fields
        bytes.extend_from_slice(&[0x00, 0x04]); // super_class = java/lang/Object
        bytes.extend_from_slice(&[0x00, 0x00]); // interfaces
        bytes.extend_from_slice(&[0x00, 0x03]); // fields_count = 3
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x05, 0x00, 0x06, 0x00, 0x00]); // byte b
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x07, 0x00, 0x08, 0x00, 0x00]); // int i
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x09, 0x00, 0x0A, 0x00, 0x00]); // long l
        bytes.extend_from_slice(&[0x00, 0x00]); // methods
        bytes.extend_from_slice(&[0x00, 0x00]); // attributes

        let resolver = FixedResolver(object_bytes);
        let mut registry = KlassRegistry::new();
        let mut loader = ClassFileLoader::new(&mut registry, Some(&resolver));
        loader.load(&bytes, None).unwrap();
        let klass = registry.get("Fields").unwrap();
        let order: Vec<&FieldType> = klass.instance_fields.iter().map(|f| &f.descriptor).collect();
        assert_eq!(order, vec![&FieldType::Long, &FieldType::Int, &FieldType::Byte]);
    }
}
