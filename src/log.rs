use std::fmt::{self, Display, Formatter};

use crate::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Message,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Message => write!(f, "message"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic points: a script position or a byte in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    None,
    Source(Pos),
    Offset(u32),
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Location::None => Ok(()),
            Location::Source(pos) => write!(f, "{pos}"),
            Location::Offset(offset) => write!(f, "${offset:08X}"),
        }
    }
}

impl From<Pos> for Location {
    fn from(pos: Pos) -> Self {
        Location::Source(pos)
    }
}

impl From<&Pos> for Location {
    fn from(pos: &Pos) -> Self {
        Location::Source(pos.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Location::None = self.location {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{}: {}: {}", self.location, self.severity, self.message)
        }
    }
}

/// Append-only list of diagnostics shared by every stage of a job.
#[derive(Debug, Default, Clone)]
pub struct Log {
    diagnostics: Vec<Diagnostic>,
    pub warnings_are_errors: bool,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warnings_as_errors(warnings_are_errors: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            warnings_are_errors,
        }
    }

    pub fn push(&mut self, severity: Severity, location: impl Into<Location>, message: impl Display) {
        let diagnostic = Diagnostic {
            severity,
            location: location.into(),
            message: message.to_string(),
        };
        tracing::trace!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn message(&mut self, location: impl Into<Location>, message: impl Display) {
        self.push(Severity::Message, location, message);
    }

    pub fn warning(&mut self, location: impl Into<Location>, message: impl Display) {
        self.push(Severity::Warning, location, message);
    }

    pub fn error(&mut self, location: impl Into<Location>, message: impl Display) {
        self.push(Severity::Error, location, message);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| self.is_failure(d.severity))
            .count()
    }

    /// True once anything that fails the job was recorded. Warnings count
    /// when `warnings_are_errors` is set.
    pub fn has_errors(&self) -> bool {
        self.error_count() != 0
    }

    fn is_failure(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error => true,
            Severity::Warning => self.warnings_are_errors,
            Severity::Message => false,
        }
    }

    pub fn extend(&mut self, other: Log) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Forwards every diagnostic to `tracing` at the matching level.
    pub fn emit(&self) {
        for diagnostic in &self.diagnostics {
            match diagnostic.severity {
                Severity::Error => tracing::error!("{diagnostic}"),
                Severity::Warning => tracing::warn!("{diagnostic}"),
                Severity::Message => tracing::info!("{diagnostic}"),
            }
        }
    }
}

impl Display for Log {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}
