//! Collection of diagnostics while a pass runs to completion.
use cleave_utils::Error;

/// A pass that reports problems through a [DiagnosticContext] instead of
/// failing on the first one.
pub trait DiagnosticPass {
    /// The diagnostics gathered by this pass.
    fn diagnostics(&self) -> &DiagnosticContext;
}

/// How serious a recorded diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Warning,
    Error,
}

/// An ordered log of the problems a pass found. Warnings and errors share
/// one list so reports come back in discovery order.
#[derive(Default, Debug)]
pub struct DiagnosticContext {
    reports: Vec<(Severity, Error)>,
}

impl DiagnosticContext {
    /// Record an error.
    pub fn err(&mut self, error: Error) {
        self.reports.push((Severity::Error, error));
    }

    /// Record a warning.
    pub fn warning(&mut self, warning: Error) {
        self.reports.push((Severity::Warning, warning));
    }

    /// True iff any error was recorded.
    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(|(s, _)| *s == Severity::Error)
    }

    /// The recorded errors, in discovery order.
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.reports
            .iter()
            .filter_map(|(s, e)| (*s == Severity::Error).then_some(e))
    }

    /// The recorded warnings, in discovery order.
    pub fn warnings(&self) -> impl Iterator<Item = &Error> {
        self.reports
            .iter()
            .filter_map(|(s, e)| (*s == Severity::Warning).then_some(e))
    }
}
