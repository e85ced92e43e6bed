//! Process-wide tracing configuration.
//!
//! The teacher's `Recorder`/`Profiler` pair tracks live execution state
//! (a trace buffer, a hotness counter) because they exist to drive a
//! JIT. This crate never executes bytecode, so there is nothing to
//! record; what survives is the idea of a small, named set of feature
//! flags consulted while parsing, verifying and encoding, plus a sink
//! for whatever a caller wants to observe about that walk. A `Tracer`
//! is built once and never mutated again -- the only "configuration"
//! surface this crate has.
use std::fmt;

/// A named point in the translation pipeline a [`Tracer`] can be asked
/// about or can receive an event for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceFlag {
    ClassLoading,
    Verification,
    MethodBodyEncoding,
}

impl fmt::Display for TraceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClassLoading => "class-loading",
            Self::Verification => "verification",
            Self::MethodBodyEncoding => "method-body-encoding",
        };
        f.write_str(s)
    }
}

/// Feature-flag lookup plus a sink, read-only after construction.
///
/// Implementors are expected to be cheap to consult on every opcode of
/// every method, so `enabled` is not permitted to do anything more
/// expensive than a flag lookup.
pub trait Tracer {
    fn enabled(&self, flag: TraceFlag) -> bool;

    /// Records `message` for `flag`. Implementations that return
    /// `false` from `enabled` for a flag are still free to no-op here;
    /// callers are expected to check `enabled` first to avoid building
    /// `message` needlessly.
    fn emit(&self, flag: TraceFlag, message: &str);
}

/// Default tracer: each flag is fixed at construction, events are
/// forwarded to the `log` crate at `trace` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer {
    class_loading: bool,
    verification: bool,
    method_body_encoding: bool,
}

impl LogTracer {
    #[must_use]
    pub fn new(class_loading: bool, verification: bool, method_body_encoding: bool) -> Self {
        Self { class_loading, verification, method_body_encoding }
    }

    /// All flags on; useful for `-v`-style CLI wiring.
    #[must_use]
    pub fn all() -> Self {
        Self::new(true, true, true)
    }

    /// All flags off; equivalent in behaviour to [`NullTracer`] but
    /// sharing `LogTracer`'s type for callers that want a single type.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    const fn flag(&self, flag: TraceFlag) -> bool {
        match flag {
            TraceFlag::ClassLoading => self.class_loading,
            TraceFlag::Verification => self.verification,
            TraceFlag::MethodBodyEncoding => self.method_body_encoding,
        }
    }
}

impl Tracer for LogTracer {
    fn enabled(&self, flag: TraceFlag) -> bool {
        self.flag(flag)
    }

    fn emit(&self, flag: TraceFlag, message: &str) {
        if self.flag(flag) {
            log::trace!("[{flag}] {message}");
        }
    }
}

/// A tracer that never reports a flag enabled and never emits. The
/// default for library callers that have no interest in diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn enabled(&self, _flag: TraceFlag) -> bool {
        false
    }

    fn emit(&self, _flag: TraceFlag, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_tracer_reports_nothing_enabled() {
        let tracer = NullTracer;
        assert!(!tracer.enabled(TraceFlag::ClassLoading));
        assert!(!tracer.enabled(TraceFlag::Verification));
        assert!(!tracer.enabled(TraceFlag::MethodBodyEncoding));
    }

    #[test]
    fn log_tracer_respects_individual_flags() {
        let tracer = LogTracer::new(true, false, false);
        assert!(tracer.enabled(TraceFlag::ClassLoading));
        assert!(!tracer.enabled(TraceFlag::Verification));
        assert!(!tracer.enabled(TraceFlag::MethodBodyEncoding));
    }

    #[test]
    fn all_and_none_are_opposite() {
        assert!(LogTracer::all().enabled(TraceFlag::Verification));
        assert!(!LogTracer::none().enabled(TraceFlag::Verification));
    }
}
