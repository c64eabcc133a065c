use std::fmt;
use std::num::ParseIntError;

/// Errors produced while parsing a single `name:Type` token.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamParseError {
    /// A name or type was empty.
    Empty,
    /// The token was a `{X:Type}` generic declaration rather than a parameter.
    TypeDef {
        /// The declared generic name (`X`).
        name: String,
    },
    /// A generic or flag was used before being declared.
    UnknownDef,
    /// A `flags.N?Type` expression was malformed.
    InvalidFlag,
    /// A `<...>` generic argument was left open.
    InvalidGeneric,
    /// The token had no `:type` part.
    MissingType,
}

impl fmt::Display for ParamParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty parameter name or type"),
            Self::TypeDef { name } => write!(f, "generic declaration {{{name}:Type}}"),
            Self::UnknownDef => write!(f, "use of undeclared generic or flags field"),
            Self::InvalidFlag => write!(f, "malformed flag expression"),
            Self::InvalidGeneric => write!(f, "unterminated generic argument"),
            Self::MissingType => write!(f, "parameter has no type"),
        }
    }
}

impl std::error::Error for ParamParseError {}

/// Errors produced while parsing a complete declaration.
#[derive(Debug, PartialEq)]
pub enum ParseError {
    /// The declaration was blank.
    Empty,
    /// No `= Type` part.
    MissingType,
    /// Missing name or an empty namespace component.
    MissingName,
    /// The `#id` was not valid hexadecimal.
    InvalidId(ParseIntError),
    /// One of the parameters was invalid.
    InvalidParam(ParamParseError),
    /// Syntax outside the supported subset (e.g. `?` conditional types).
    Unsupported,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty declaration"),
            Self::MissingType => write!(f, "declaration has no `= Type`"),
            Self::MissingName => write!(f, "declaration has no valid name"),
            Self::InvalidId(e) => write!(f, "bad constructor id: {e}"),
            Self::InvalidParam(e) => write!(f, "bad parameter: {e}"),
            Self::Unsupported => write!(f, "unsupported TL syntax"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidId(e) => Some(e),
            Self::InvalidParam(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParamParseError> for ParseError {
    fn from(e: ParamParseError) -> Self {
        Self::InvalidParam(e)
    }
}
