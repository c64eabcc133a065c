//! Facts about the whole schema that single definitions cannot answer.

use std::collections::{BTreeMap, HashMap, HashSet};

use teleproto_tl_parser::tl::{Category, Definition, Parameter, ParameterType, Type};

use crate::names;

// `ns.Name` of a boxed type.
fn key(ty: &Type) -> String {
    let mut key = ty.namespace.join(".");
    if !key.is_empty() {
        key.push('.');
    }
    key + &ty.name
}

pub(crate) struct Metadata<'a> {
    constructors: HashMap<String, Vec<&'a Definition>>,
    recursive: HashSet<u32>,
}

impl<'a> Metadata<'a> {
    pub(crate) fn build(defs: &'a [Definition]) -> Self {
        let mut constructors: HashMap<String, Vec<&'a Definition>> = HashMap::new();
        for def in defs.iter().filter(|d| d.category == Category::Types) {
            constructors.entry(key(&def.ty)).or_default().push(def);
        }
        for list in constructors.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let mut meta = Self { constructors, recursive: HashSet::new() };
        let recursive = defs
            .iter()
            .filter(|d| d.category == Category::Types)
            .filter(|d| meta.reaches(&d.ty, d, &mut HashSet::new()))
            .map(|d| d.id)
            .collect();
        meta.recursive = recursive;
        meta
    }

    /// Whether `current`'s fields lead back to `target` (needs boxing).
    fn reaches(&self, target: &Type, current: &Definition, seen: &mut HashSet<u32>) -> bool {
        if !seen.insert(current.id) {
            return false;
        }
        current.params.iter().any(|param| match &param.ty {
            // Vec<T> is already indirect.
            ParameterType::Normal { ty, .. } if ty.generic_arg.is_none() => {
                key(ty) == key(target)
                    || self
                        .constructors_of(ty)
                        .iter()
                        .any(|sub| self.reaches(target, sub, seen))
            }
            _ => false,
        })
    }

    pub(crate) fn is_recursive(&self, def: &Definition) -> bool {
        self.recursive.contains(&def.id)
    }

    pub(crate) fn constructors_of(&self, ty: &Type) -> &[&'a Definition] {
        self.constructors.get(&key(ty)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A `#` field no conditional parameter refers to.
    pub(crate) fn is_unused_flag(def: &Definition, flags: &Parameter) -> bool {
        !def.params.iter().any(|p| {
            matches!(&p.ty, ParameterType::Normal { flag: Some(f), .. } if f.name == flags.name)
        })
    }
}

/// Definitions of one category keyed by namespace (`""` for global), sorted.
pub(crate) fn group_by_namespace(
    defs: &[Definition],
    category: Category,
) -> BTreeMap<String, Vec<&Definition>> {
    let mut groups: BTreeMap<String, Vec<&Definition>> = BTreeMap::new();
    for def in defs.iter().filter(|d| d.category == category) {
        if category == Category::Types && names::is_primitive_type(&def.ty) {
            continue;
        }
        groups.entry(def.namespace.join(".")).or_default().push(def);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups
}

/// Distinct boxed types keyed by namespace.
pub(crate) fn boxed_types_by_namespace(defs: &[Definition]) -> BTreeMap<String, Vec<&Type>> {
    let mut groups: BTreeMap<String, Vec<&Type>> = BTreeMap::new();
    for def in defs.iter().filter(|d| d.category == Category::Types) {
        if def.ty.generic_ref || names::is_primitive_type(&def.ty) {
            continue;
        }
        groups.entry(def.ty.namespace.join(".")).or_default().push(&def.ty);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
        group.dedup_by(|a, b| a.name == b.name);
    }
    groups
}
