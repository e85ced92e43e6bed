//! A translator from JVM class files to a compact, pre-linked bytecode
//! form: constant-pool resolution, class loading, an abstract-
//! interpretation verifier, and the "Minfo" method-header codec.
pub mod bytecode;
pub mod class_file;
pub mod code_parser;
pub mod constant_pool;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod ir;
pub mod klass;
pub mod method;
pub mod method_body;
pub mod reader;
pub mod tracer;
pub mod trusted;
