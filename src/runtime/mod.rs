use crate::cell::VmError;

pub mod elem;
pub mod incdec;
pub mod isset;
pub mod key;
pub mod lval;
pub mod prop;
pub mod setop;

/// The exact wording of every diagnostic the member core can raise. These
/// strings are a compatibility contract; do not edit them.
pub mod diag {
    pub const UNDEFINED_INDEX: &str = "Undefined index";
    pub const UNDEFINED_PROPERTY: &str = "Undefined property";
    pub const CANNOT_USE_SCALAR_AS_ARRAY: &str = "Cannot use a scalar value as an array";
    pub const NON_OBJECT_PROPERTY: &str = "Cannot access property on non-object";
    pub const CREATING_DEFAULT_OBJECT: &str = "Creating default object from empty value";
    pub const ILLEGAL_OFFSET_TYPE: &str = "Illegal offset type";
    pub const ILLEGAL_STRING_OFFSET: &str = "Illegal string offset";
    pub const OUT_OF_BOUNDS: &str = "Out of bounds";
    pub const STRING_OFFSET_CAST: &str = "String offset cast occurred";
    pub const OP_NOT_SUPPORTED_STRING: &str = "Operator not supported for strings";
    pub const NEWELEM_NOT_SUPPORTED_STRING: &str = "[] operator not supported for strings";
    pub const SETOP_NOT_SUPPORTED_STRING: &str =
        "Cannot use assign-op operators with overloaded objects nor string offsets";
    pub const INCDEC_NOT_SUPPORTED: &str =
        "Cannot increment/decrement overloaded objects nor string offsets";
    pub const CANT_UNSET_STRING: &str = "Cannot unset string offsets";
    pub const ASSIGN_PROP_NON_OBJECT: &str = "Attempt to assign property of non-object";
    pub const INCDEC_PROP_NON_OBJECT: &str =
        "Attempt to increment/decrement property of non-object";
    pub const COLLECTION_BYREF: &str = "Collection elements cannot be taken by reference";
    pub const NEWELEM_LVAL_READ: &str = "Cannot use [] for reading";
    pub const DIVISION_BY_ZERO: &str = "Division by zero";
    pub const UNSUPPORTED_OPERAND: &str = "Unsupported operand types";
    pub const VECTOR_INT_KEYS: &str = "Only integer keys may be used with Vectors";
    pub const MAP_KEY_TYPES: &str = "Only integer and string keys may be used with Maps";
    pub const VECTOR_UNSET: &str = "Cannot unset an element of a Vector";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Notice,
    Warning,
}

/// A non-fatal diagnostic recorded on the [`Vm`] sink. Fatal errors travel
/// as [`VmError`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagLevel,
    pub message: String,
}

/// The per-thread VM context the member core threads through every entry
/// point: the diagnostic sink and the runtime flags.
pub struct Vm {
    diagnostics: Vec<Diagnostic>,
    warn_output: String,
    warn_suppression_depth: usize,
    strict_syntax: bool,
    more_warnings: bool,
}

impl Vm {
    pub fn new() -> Vm {
        Vm::with_flags(false, false)
    }

    /// `strict_syntax` turns on the stricter dialect's extra warnings
    /// (scalar-as-array on plain reads, out-of-bounds string reads,
    /// default-object creation on bare property vivification).
    /// `more_warnings` mirrors the more-warnings build: extra undefined
    /// index notices on the compound-assignment paths.
    pub fn with_flags(strict_syntax: bool, more_warnings: bool) -> Vm {
        Vm {
            diagnostics: Vec::new(),
            warn_output: String::new(),
            warn_suppression_depth: 0,
            strict_syntax,
            more_warnings,
        }
    }

    pub fn strict_syntax(&self) -> bool {
        self.strict_syntax
    }

    pub fn more_warnings(&self) -> bool {
        self.more_warnings
    }

    pub fn raise_notice(&mut self, message: impl Into<String>) {
        self.record(DiagLevel::Notice, message.into());
    }

    pub fn raise_warning(&mut self, message: impl Into<String>) {
        self.record(DiagLevel::Warning, message.into());
    }

    /// Build the fatal error for `message`, recording it in the warn
    /// stream on the way out. The caller returns the error.
    pub fn raise_error(&mut self, message: impl Into<String>) -> VmError {
        let message = message.into();
        self.warn_output.push_str(&message);
        self.warn_output.push('\n');
        VmError::new(message)
    }

    fn record(&mut self, level: DiagLevel, message: String) {
        if self.warning_suppressed() {
            return;
        }
        self.warn_output.push_str(&message);
        self.warn_output.push('\n');
        self.diagnostics.push(Diagnostic { level, message });
    }

    pub fn push_warn_suppression(&mut self) {
        self.warn_suppression_depth += 1;
    }

    pub fn pop_warn_suppression(&mut self) {
        self.warn_suppression_depth = self.warn_suppression_depth.saturating_sub(1);
    }

    pub fn warning_suppressed(&self) -> bool {
        self.warn_suppression_depth > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the recorded diagnostics, leaving the sink empty.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// The accumulated warn stream, newline-separated.
    pub fn warn_output(&self) -> &str {
        &self.warn_output
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}
