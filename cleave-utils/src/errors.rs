//! Error types used across the compiler.
use crate::Id;
use itertools::Itertools;

/// Convenience alias to reduce boilerplate.
pub type CleaveResult<T> = std::result::Result<T, Error>;

/// Errors generated by the compiler.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    /// Post-hoc note attached to the error.
    post_msg: Option<String>,
}

/// The different kinds of errors.
#[derive(Clone)]
enum ErrorKind {
    /// The IR is malformed in a way that the current operation cannot
    /// handle.
    MalformedStructure(String),
    /// A pass precondition or assumption was violated.
    PassAssumption(Id, String),
    /// The input is technically valid but the requested configuration
    /// cannot be carried out.
    Papercut(String),
    /// Miscellaneous error message.
    Misc(String),
}

impl Error {
    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::MalformedStructure(msg.to_string())),
            post_msg: None,
        }
    }

    pub fn pass_assumption<P: Into<Id>, S: ToString>(pass: P, msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::PassAssumption(
                pass.into(),
                msg.to_string(),
            )),
            post_msg: None,
        }
    }

    pub fn papercut<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Papercut(msg.to_string())),
            post_msg: None,
        }
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Misc(msg.to_string())),
            post_msg: None,
        }
    }

    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    /// The kind of this error, for pattern-matching in tests.
    pub fn message(&self) -> String {
        format!("{self}")
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.kind {
            ErrorKind::MalformedStructure(msg) => {
                write!(f, "malformed structure: {msg}")?
            }
            ErrorKind::PassAssumption(pass, msg) => {
                write!(f, "assumption of pass `{pass}' violated: {msg}")?
            }
            ErrorKind::Papercut(msg) => write!(f, "papercut: {msg}")?,
            ErrorKind::Misc(msg) => write!(f, "{msg}")?,
        }
        if let Some(post) = &self.post_msg {
            write!(f, "\n{post}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::misc(format!("io error: {err}"))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Error::misc(format!("format error: {err}"))
    }
}

/// An error type that can accumulate multiple [Error]s.
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.errors.iter().map(|e| e.to_string()).join("\n"))
    }
}

impl std::fmt::Debug for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for MultiError {}

impl From<Error> for MultiError {
    fn from(error: Error) -> Self {
        MultiError {
            errors: vec![error],
        }
    }
}

impl From<Vec<Error>> for MultiError {
    fn from(errors: Vec<Error>) -> Self {
        MultiError { errors }
    }
}

impl From<std::io::Error> for MultiError {
    fn from(err: std::io::Error) -> Self {
        Error::from(err).into()
    }
}
