use std::fmt;
use std::str::FromStr;

use crate::errors::ParamParseError;
use crate::tl::{Flag, Type};

/// One `name:Type` field of a declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// Field name as written in the schema.
    pub name: String,
    /// What the field holds.
    pub ty: ParameterType,
}

/// The right-hand side of a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// A `#` bitmask; its value is computed from the conditional fields.
    Flags,
    /// A value, present only when `flag` is set (if any).
    Normal {
        /// Type of the value.
        ty: Type,
        /// Guarding bit.
        flag: Option<Flag>,
    },
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flags => f.write_str("#"),
            Self::Normal { ty, flag: Some(flag) } => write!(f, "{}.{}?{ty}", flag.name, flag.index),
            Self::Normal { ty, flag: None } => write!(f, "{ty}"),
        }
    }
}

impl FromStr for Parameter {
    type Err = ParamParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if let Some(decl) = token.strip_prefix('{') {
            let name = decl.strip_suffix(":Type}").ok_or(ParamParseError::UnknownDef)?;
            return Err(ParamParseError::TypeDef { name: name.to_owned() });
        }

        let (name, ty) = token.split_once(':').ok_or(ParamParseError::MissingType)?;
        if name.is_empty() || ty.is_empty() {
            return Err(ParamParseError::Empty);
        }
        Ok(Self { name: name.to_owned(), ty: ty.parse()? })
    }
}

impl FromStr for ParameterType {
    type Err = ParamParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == "#" {
            return Ok(Self::Flags);
        }

        let Some((cond, ty)) = raw.split_once('?') else {
            return Ok(Self::Normal { ty: raw.parse()?, flag: None });
        };

        let (name, index) = cond.split_once('.').ok_or(ParamParseError::InvalidFlag)?;
        if name.is_empty() || ty.contains('?') {
            return Err(ParamParseError::InvalidFlag);
        }
        let index = index.parse().map_err(|_| ParamParseError::InvalidFlag)?;
        Ok(Self::Normal {
            ty: ty.parse()?,
            flag: Some(Flag { name: name.to_owned(), index }),
        })
    }
}
