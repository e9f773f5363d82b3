use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a model or driving it over rasters.
///
/// Everything here is fatal. Pixels without a defined output are not errors,
/// they come back as `None` from the inference step.
#[derive(Debug, Error)]
pub enum Error {
    #[error("rule {rule}, position {position}: {message}")]
    Syntax {
        rule: usize,
        position: usize,
        message: String,
    },

    #[error("rule {rule}, position {position}: unknown map `{name}`")]
    UnknownMap { rule: usize, position: usize, name: String },

    #[error("rule {rule}, position {position}: map `{map}` has no set `{name}`")]
    UnknownSet {
        rule: usize,
        position: usize,
        map: String,
        name: String,
    },

    #[error("{0}")]
    Parse(String),

    #[error("{}:{line}: {source}", path.display())]
    Located {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid shape `{0}`")]
    InvalidShape(String),

    #[error("invalid fuzzy set `{name}`: {reason}")]
    InvalidSet { name: String, reason: String },

    #[error("membership {0} is outside [0, 1]")]
    OutOfRangeMembership(f64),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("output universe [{min}, {max}] is empty")]
    DegenerateUniverse { min: f64, max: f64 },

    #[error("rule {rule}: operand stack underflow")]
    StackUnderflow { rule: usize },

    #[error("rule {rule} is malformed: {reason}")]
    MalformedRule { rule: usize, reason: String },

    #[error("raster: {0}")]
    Raster(String),

    #[error("raster `{name}` is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    DimensionMismatch {
        name: String,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn syntax(rule: usize, position: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            rule,
            position,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(rule: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRule {
            rule,
            reason: reason.into(),
        }
    }

    /// Attaches a file and 1-based line to a load error.
    pub(crate) fn at(self, path: impl Into<PathBuf>, line: usize) -> Self {
        Error::Located {
            path: path.into(),
            line,
            source: Box::new(self),
        }
    }
}

#[test]
fn test_located_display() {
    let err = Error::InvalidShape("zigzag".into()).at("maps.txt", 7);

    assert_eq!(err.to_string(), "maps.txt:7: invalid shape `zigzag`");
}
