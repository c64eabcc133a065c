use std::fmt;
use std::str::FromStr;

use crate::errors::ParamParseError;

/// A type reference such as `int`, `Vector<long>`, `storage.FileType` or `!X`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    /// Namespace components (`["storage"]` for `storage.FileType`).
    pub namespace: Vec<String>,
    /// Name without namespace or generic argument.
    pub name: String,
    /// Bare types start with a lowercase letter and carry no constructor id.
    pub bare: bool,
    /// Set for `!X` references to a declared generic.
    pub generic_ref: bool,
    /// The `T` of `Vector<T>`.
    pub generic_arg: Option<Box<Type>>,
}

impl Type {
    pub(crate) fn collect_generic_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.generic_ref {
            out.push(&self.name);
        }
        if let Some(arg) = self.generic_arg.as_deref() {
            arg.collect_generic_refs(out);
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generic_ref {
            f.write_str("!")?;
        }
        for ns in &self.namespace {
            write!(f, "{ns}.")?;
        }
        f.write_str(&self.name)?;
        match &self.generic_arg {
            Some(arg) => write!(f, "<{arg}>"),
            None => Ok(()),
        }
    }
}

impl FromStr for Type {
    type Err = ParamParseError;

    /// ```
    /// use teleproto_tl_parser::tl::Type;
    ///
    /// let ty: Type = "Vector<storage.FileType>".parse().unwrap();
    /// assert_eq!(ty.name, "Vector");
    /// assert_eq!(ty.generic_arg.unwrap().namespace, vec!["storage"]);
    /// ```
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let generic_ref = raw.starts_with('!');
        let raw = raw.trim_start_matches('!');

        let (path, generic_arg) = match raw.find('<') {
            None => (raw, None),
            Some(open) => {
                let inner = raw[open + 1..]
                    .strip_suffix('>')
                    .ok_or(ParamParseError::InvalidGeneric)?;
                (&raw[..open], Some(Box::new(inner.parse()?)))
            }
        };

        let mut parts: Vec<&str> = path.split('.').collect();
        let name = parts.pop().unwrap_or_default();
        if name.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return Err(ParamParseError::Empty);
        }

        Ok(Self {
            namespace: parts.into_iter().map(str::to_owned).collect(),
            name: name.to_owned(),
            bare: name.starts_with(|c: char| c.is_ascii_lowercase()),
            generic_ref,
            generic_arg,
        })
    }
}
