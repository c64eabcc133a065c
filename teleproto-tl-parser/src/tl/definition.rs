use std::fmt;
use std::str::FromStr;

use crate::errors::{ParamParseError, ParseError};
use crate::tl::{Category, Parameter, ParameterType, Type};
use crate::utils::tl_id;

/// A constructor or function declaration.
///
/// `pong#347773c5 msg_id:long ping_id:long = Pong` has name `pong`, id
/// `0x347773c5`, two parameters and type `Pong`.
#[derive(Clone, Debug, PartialEq)]
pub struct Definition {
    /// Namespace components, empty for the global namespace.
    pub namespace: Vec<String>,
    /// Name without namespace.
    pub name: String,
    /// Constructor id, explicit or CRC32-derived.
    pub id: u32,
    /// Parameters in wire order.
    pub params: Vec<Parameter>,
    /// Boxed type for constructors, return type for functions.
    pub ty: Type,
    /// Section the declaration was found in.
    pub category: Category,
}

impl Definition {
    /// `namespace.name`, dotted.
    pub fn full_name(&self) -> String {
        let mut out = self.namespace.join(".");
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(&self.name);
        out
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:08x}", self.full_name(), self.id)?;

        let mut generics = Vec::new();
        for param in &self.params {
            if let ParameterType::Normal { ty, .. } = &param.ty {
                ty.collect_generic_refs(&mut generics);
            }
        }
        generics.sort_unstable();
        generics.dedup();
        for name in generics {
            write!(f, " {{{name}:Type}}")?;
        }

        for param in &self.params {
            write!(f, " {param}")?;
        }
        if self.ty.generic_ref {
            write!(f, " = {}", self.ty.name)
        } else {
            write!(f, " = {}", self.ty)
        }
    }
}

impl FromStr for Definition {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim().trim_end_matches(';').trim_end();
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let (lhs, rhs) = raw.split_once('=').ok_or(ParseError::MissingType)?;
        let rhs = rhs.trim();
        if rhs.is_empty() {
            return Err(ParseError::MissingType);
        }
        // `Vector t` style applications are not part of the supported subset.
        if rhs.contains(char::is_whitespace) {
            return Err(ParseError::Unsupported);
        }
        let mut ty: Type = rhs.parse().map_err(|_| ParseError::MissingType)?;

        let mut tokens = lhs.split_whitespace();
        let head = tokens.next().ok_or(ParseError::MissingName)?;
        let (path, id) = match head.split_once('#') {
            Some((path, hex)) => (
                path,
                Some(u32::from_str_radix(hex, 16).map_err(ParseError::InvalidId)?),
            ),
            None => (head, None),
        };

        let mut namespace: Vec<String> = path.split('.').map(str::to_owned).collect();
        let name = namespace.pop().unwrap_or_default();
        if name.is_empty() || namespace.iter().any(String::is_empty) {
            return Err(ParseError::MissingName);
        }

        let mut generics = Vec::new();
        let mut flag_fields: Vec<&str> = Vec::new();
        let mut params = Vec::new();
        for token in tokens {
            if token == "?" || token.starts_with('[') {
                return Err(ParseError::Unsupported);
            }
            let param = match token.parse::<Parameter>() {
                Ok(param) => param,
                Err(ParamParseError::TypeDef { name }) => {
                    generics.push(name);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match &param.ty {
                ParameterType::Flags => flag_fields.push(token.split(':').next().unwrap_or_default()),
                ParameterType::Normal { ty, flag } => {
                    if ty.generic_ref && !generics.contains(&ty.name) {
                        return Err(ParamParseError::UnknownDef.into());
                    }
                    if let Some(flag) = flag {
                        if !flag_fields.contains(&flag.name.as_str()) {
                            return Err(ParamParseError::UnknownDef.into());
                        }
                    }
                }
            }
            params.push(param);
        }

        if generics.contains(&ty.name) {
            ty.generic_ref = true;
        }

        Ok(Self {
            namespace,
            name,
            id: id.unwrap_or_else(|| tl_id(raw)),
            params,
            ty,
            category: Category::Types,
        })
    }
}
