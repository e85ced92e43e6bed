//! Error taxonomy for the class-file translator.
//!
//! Every failure in the pipeline is one of the seven kinds below. Each
//! variant carries whatever context was available at the point of
//! failure: the class and method being processed, a source line when
//! known, and a bytecode offset for verifier failures.
use std::fmt;

/// Context attached to a [`TranslationError`]. All fields are optional
/// because not every stage knows every piece of context: the reader
/// only knows an offset, the loader only knows a class name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub class: Option<String>,
    pub method: Option<String>,
    pub line: Option<u32>,
    pub offset: Option<usize>,
}

impl ErrorContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub const fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(class) = &self.class {
            write!(f, "class={class}")?;
            wrote = true;
        }
        if let Some(method) = &self.method {
            write!(f, "{}method={method}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if let Some(line) = self.line {
            write!(f, "{}line={line}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if let Some(offset) = self.offset {
            write!(f, "{}offset={offset}", if wrote { ", " } else { "" })?;
        }
        Ok(())
    }
}

/// The seven error kinds a conforming translator can surface, per the
/// class-format/verification error taxonomy.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// Malformed bytes, bad magic, invalid constant-pool index,
    /// duplicated member.
    #[error("class format error: {message} ({context})")]
    ClassFormat { message: String, context: ErrorContext },

    /// A referenced class is missing from the classpath.
    #[error("no class def found: {class_name} ({context})")]
    NoClassDef { class_name: String, context: ErrorContext },

    /// A class currently `LOADING` was referenced transitively during
    /// its own load.
    #[error("class circularity involving {class_name} ({context})")]
    ClassCircularity { class_name: String, context: ErrorContext },

    /// e.g. a non-interface used where an interface was declared.
    #[error("incompatible class change: {message} ({context})")]
    IncompatibleClassChange { message: String, context: ErrorContext },

    /// A final-field write from outside, or private access from
    /// another class.
    #[error("illegal access: {message} ({context})")]
    IllegalAccess { message: String, context: ErrorContext },

    /// Any failure of the abstract-interpretation checks performed by
    /// the code parser.
    #[error("verify error: {message} ({context})")]
    Verify { message: String, context: ErrorContext },

    /// The external signature provider rejected a permit or domain.
    #[error("signature rejected: {message} ({context})")]
    Signature { message: String, context: ErrorContext },

    /// Assertion failure in the translator itself.
    #[error("internal error: {message} ({context})")]
    Internal { message: String, context: ErrorContext },
}

impl TranslationError {
    #[must_use]
    pub fn class_format(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::ClassFormat { message: message.into(), context }
    }

    #[must_use]
    pub fn verify(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Verify { message: message.into(), context }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Internal { message: message.into(), context }
    }

    /// Whether this error kind is retryable after the classpath
    /// changes. Only a [`TranslationError::NoClassDef`] on a
    /// transitively referenced class may be retried; every other kind
    /// is terminal for the class under load.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NoClassDef { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TranslationError>;
