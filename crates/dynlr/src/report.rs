//! Diagnostics emitted while building tables.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Error(String),
    Warning(String),
    Deprecated(String),
}

impl Diagnostic {
    pub fn message(&self) -> &str {
        match self {
            Self::Error(msg) | Self::Warning(msg) | Self::Deprecated(msg) => msg,
        }
    }
}

/// The receiver of the diagnostics produced by the table builder.
pub trait Reporter {
    fn report_error(&mut self, msg: String);
    fn report_warning(&mut self, msg: String);
    fn report_deprecated(&mut self, msg: String);
}

/// A `Reporter` that keeps every diagnostic and counts them by kind.
#[derive(Debug, Clone, Default)]
pub struct Log {
    messages: Vec<Diagnostic>,
    num_errors: usize,
    num_warnings: usize,
    num_deprecations: usize,
    print: bool,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print every diagnostic through `tracing` as it is reported.
    pub fn printing(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    pub fn set_print(&mut self, print: bool) {
        self.print = print;
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.num_errors = 0;
        self.num_warnings = 0;
        self.num_deprecations = 0;
    }

    pub fn messages(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(|m| match m {
            Diagnostic::Error(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(|m| match m {
            Diagnostic::Warning(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn deprecations(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(|m| match m {
            Diagnostic::Deprecated(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn tally_errors(&self) -> usize {
        self.num_errors
    }

    pub fn tally_warnings(&self) -> usize {
        self.num_warnings
    }

    pub fn tally_deprecations(&self) -> usize {
        self.num_deprecations
    }

    /// e.g. `"1 error, 2 warnings"`
    pub fn summary(&self) -> String {
        fn plural(n: usize, what: &str) -> String {
            if n == 1 {
                format!("{} {}", n, what)
            } else {
                format!("{} {}s", n, what)
            }
        }
        let mut parts = vec![
            plural(self.num_errors, "error"),
            plural(self.num_warnings, "warning"),
        ];
        if self.num_deprecations > 0 {
            parts.push(plural(self.num_deprecations, "deprecation"));
        }
        parts.join(", ")
    }
}

impl Reporter for Log {
    fn report_error(&mut self, msg: String) {
        if self.print {
            tracing::error!("{}", msg);
        }
        self.messages.push(Diagnostic::Error(msg));
        self.num_errors += 1;
    }

    fn report_warning(&mut self, msg: String) {
        if self.print {
            tracing::warn!("{}", msg);
        }
        self.messages.push(Diagnostic::Warning(msg));
        self.num_warnings += 1;
    }

    fn report_deprecated(&mut self, msg: String) {
        if self.print {
            tracing::warn!("deprecated: {}", msg);
        }
        self.messages.push(Diagnostic::Deprecated(msg));
        self.num_deprecations += 1;
    }
}
