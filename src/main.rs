//! Thin CLI driver: loads one class file, verifies each method with a
//! `Code` attribute, and prints its encoded method body.
//!
//! 1. Reads a class file from the path given as the first argument.
//! 2. Runs it through the loader to build a `Klass`.
//! 3. Re-parses the constant pool (the loader consumes its own copy
//!    internally but doesn't hand it back) and hands each method's
//!    bytecode to the verifier.
//! 4. Encodes the verified body and prints it.
use std::env;
use std::fs;
use std::process::ExitCode;

use squawk_translator::bytecode::translate_bytecode;
use squawk_translator::class_file::ClassFileLoader;
use squawk_translator::code_parser::CodeParser;
use squawk_translator::constant_pool::ConstantPool;
use squawk_translator::klass::KlassRegistry;
use squawk_translator::method_body::{MethodBody, TypeTableEntry};
use squawk_translator::reader::ClassFileReader;

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: squawk-translator <path-to-class-file>");
        return ExitCode::FAILURE;
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;

    let mut registry = KlassRegistry::new();
    let class_name = {
        let mut loader = ClassFileLoader::new(&mut registry, None);
        loader.load(&bytes, None)?
    };
    log::info!("loaded {class_name} from {path}");

    let pool = reread_constant_pool(&bytes)?;
    let klass = registry.get(&class_name).expect("just installed");

    for method in klass.static_methods.iter().chain(klass.virtual_methods.iter()) {
        let Some(code) = &method.code else { continue };

        let pseudo_opcodes = CodeParser::new(
            &pool,
            Some(&registry),
            &class_name,
            &method.name,
            method.is_constructor(),
            method.is_static(),
            &method.descriptor.parameters,
            code,
        )
        .with_line_number_table(&method.line_number_table)
        .with_local_variable_table(&method.local_variable_table)
        .parse()?;
        log::debug!("{class_name}.{} verified, {} pseudo-opcodes emitted", method.name, pseudo_opcodes.len());

        // `max_locals` already counts the receiver/parameter slots, so
        // the Minfo `locals` field is only the declared-local
        // remainder, and the oopmap is one entry per slot in
        // `locals + parameters` (method_body.rs's `oopmap_byte_len`).
        let receiver_slots = u16::from(!method.is_static());
        let parameters = method.descriptor.parameter_slots() as u16 + receiver_slots;
        let locals = code.max_locals.saturating_sub(parameters);
        let body = MethodBody {
            parameters,
            locals,
            max_stack: code.max_stack,
            oopmap: vec![false; (locals + parameters) as usize],
            exception_table: code.exception_table.clone(),
            type_table: Vec::<TypeTableEntry>::new(),
            relocation_table: Vec::new(),
            bytecode: translate_bytecode(&code.code),
        };
        let encoded = body.encode();
        println!(
            "{class_name}.{}({}): {} bytes -> {}",
            method.name,
            method.descriptor.parameters.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            code.code.len(),
            hex(&encoded)
        );
    }

    Ok(())
}

/// Re-derives the constant pool from the raw bytes. Parsing is pure
/// given the same byte slice, so this reproduces exactly the pool the
/// loader resolved internally.
fn reread_constant_pool(bytes: &[u8]) -> squawk_translator::error::Result<ConstantPool> {
    let mut reader = ClassFileReader::new(bytes);
    reader.read_u4()?; // magic
    reader.read_u2()?; // minor
    reader.read_u2()?; // major
    let count = reader.read_u2()?;
    ConstantPool::parse(&mut reader, count)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
