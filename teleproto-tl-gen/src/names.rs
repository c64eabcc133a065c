//! TL identifiers to Rust identifiers and paths.

use teleproto_tl_parser::tl::{Definition, Parameter, ParameterType, Type};

/// Rust spelling of TL primitives.
pub(crate) fn builtin_type(name: &str) -> Option<&'static str> {
    let rust = match name {
        "Bool" | "true" => "bool",
        "int" => "i32",
        "long" => "i64",
        "double" => "f64",
        "string" => "String",
        "bytes" => "Vec<u8>",
        "int128" => "[u8; 16]",
        "int256" => "[u8; 32]",
        "Vector" => "Vec",
        "vector" => "crate::RawVec",
        _ => return None,
    };
    Some(rust)
}

/// Boxed types that map onto Rust primitives and never get an enum.
pub(crate) fn is_primitive_type(ty: &Type) -> bool {
    ty.namespace.is_empty() && matches!(ty.name.as_str(), "Bool" | "True" | "Vector")
}

/// Splits `server_DH_params_ok` / `inputPeerSelf` / `resPQ` into words.
fn words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut out = Vec::new();
    let mut word = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '.' {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            continue;
        }
        let boundary = match (i.checked_sub(1).map(|p| chars[p]), chars.get(i + 1)) {
            (Some(prev), _) if c.is_ascii_uppercase() && !prev.is_ascii_uppercase() => true,
            // Last capital of a run that starts a new camel word: `DHConfig`.
            (Some(prev), Some(next))
                if c.is_ascii_uppercase() && prev.is_ascii_uppercase() && next.is_ascii_lowercase() =>
            {
                true
            }
            _ => false,
        };
        if boundary && !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
        word.push(c);
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

/// `some_OK_name` → `SomeOkName`; a namespace prefix is dropped.
pub(crate) fn to_pascal(name: &str) -> String {
    let name = name.rsplit('.').next().unwrap_or(name);
    words(name)
        .into_iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect()
}

pub(crate) fn def_type_name(def: &Definition) -> String {
    to_pascal(&def.name)
}

fn module_path(root: &str, namespace: &[String], name: String) -> String {
    let mut path = format!("crate::{root}::");
    for ns in namespace {
        path.push_str(ns);
        path.push_str("::");
    }
    path + &name
}

/// `crate::types::ns::Name` for a constructor.
pub(crate) fn def_qual_name(def: &Definition) -> String {
    module_path("types", &def.namespace, def_type_name(def))
}

/// Variant name inside the boxed type's enum: the constructor name with the
/// type name stripped off the front (`inputUserSelf` in `InputUser` → `UserSelf`).
pub(crate) fn def_variant_name(def: &Definition) -> String {
    let full = def_type_name(def);
    let ty = type_name(&def.ty);
    let rest = full.strip_prefix(ty.as_str()).unwrap_or_default();

    if rest == "Self" {
        // `Self` cannot name a variant; take the last word of the type too.
        let start = ty.rfind(|c: char| c.is_ascii_uppercase()).unwrap_or(0);
        return full[start..].to_owned();
    }
    if rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_digit()) {
        return full.clone();
    }
    rest.to_owned()
}

pub(crate) fn type_name(ty: &Type) -> String {
    to_pascal(&ty.name)
}

/// Type position path, e.g. `Vec<crate::enums::User>`.
pub(crate) fn type_qual_name(ty: &Type) -> String {
    type_path(ty, false)
}

/// Expression position path, e.g. `Vec::<crate::enums::User>` or `<[u8; 16]>`.
pub(crate) fn type_item_path(ty: &Type) -> String {
    type_path(ty, true)
}

fn type_path(ty: &Type, expr: bool) -> String {
    if ty.generic_ref {
        return ty.name.clone();
    }

    let mut path = match builtin_type(&ty.name) {
        Some(rust) if expr && rust.starts_with('[') => format!("<{rust}>"),
        Some(rust) if expr => rust.replacen('<', "::<", 1),
        Some(rust) => rust.to_owned(),
        None if ty.bare => module_path("types", &ty.namespace, type_name(ty)),
        None => module_path("enums", &ty.namespace, type_name(ty)),
    };

    if let Some(arg) = &ty.generic_arg {
        if expr {
            path.push_str("::");
        }
        path.push('<');
        path.push_str(&type_qual_name(arg));
        path.push('>');
    }
    path
}

/// Field name, escaping Rust keywords.
pub(crate) fn param_attr_name(param: &Parameter) -> String {
    match param.name.as_str() {
        "self" => "is_self".to_owned(),
        kw @ ("type" | "final" | "loop" | "static" | "match" | "mod" | "move" | "ref") => format!("r#{kw}"),
        other => other.to_ascii_lowercase(),
    }
}

/// Field type, wrapping conditional fields in `Option`.
pub(crate) fn param_qual_name(param: &Parameter) -> String {
    match &param.ty {
        ParameterType::Flags => "u32".to_owned(),
        ParameterType::Normal { ty, flag: Some(_) } if ty.name == "true" => "bool".to_owned(),
        ParameterType::Normal { ty, flag: Some(_) } => format!("Option<{}>", type_qual_name(ty)),
        ParameterType::Normal { ty, flag: None } => type_qual_name(ty),
    }
}
