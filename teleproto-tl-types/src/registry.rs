//! Constructor id to schema name lookup.
//!
//! A [`SchemaRegistry`] is built once from schema text and handed to
//! whatever needs to name ids (logging of unclaimed requests, diagnostics).
//! Tests can build one from a fixture schema instead of the bundled one.

use std::collections::HashMap;
use std::fmt;

use teleproto_tl_parser::errors::ParseError;
use teleproto_tl_parser::parse_layer;
use teleproto_tl_parser::parse_tl_file_with_lines;
use teleproto_tl_parser::tl::Category;

const MTPROTO_SCHEMA: &str = include_str!("../tl/mtproto.tl");
const API_SCHEMA: &str = include_str!("../tl/api.tl");
const ENVELOPE_SCHEMA: &str = include_str!("../tl/envelope.tl");

/// One known constructor or function.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaEntry {
    /// Constructor id.
    pub id: u32,
    /// Dotted name, e.g. `auth.sendCode`.
    pub name: String,
    /// Boxed type or return type, e.g. `auth.SentCode`.
    pub ty: String,
    /// Constructor or function.
    pub category: Category,
}

/// Failure to build a registry.
#[derive(Debug, PartialEq)]
pub enum RegistryError {
    /// A declaration did not parse.
    Parse {
        /// 1-based line of the declaration.
        line: usize,
        /// What went wrong.
        error: ParseError,
    },
    /// Two different declarations share an id.
    DuplicateId {
        /// The contested id.
        id: u32,
        /// Name registered first.
        existing: String,
        /// Name that collided with it.
        duplicate: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { line, error } => write!(f, "schema line {line}: {error}"),
            Self::DuplicateId { id, existing, duplicate } => {
                write!(f, "id {id:#010x} declared by both {existing} and {duplicate}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Id-indexed view of one or more schemas.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    entries: HashMap<u32, SchemaEntry>,
    layer: Option<i32>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry over a single schema text.
    pub fn from_schema(schema: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.extend_from_schema(schema)?;
        Ok(registry)
    }

    /// The schemas bundled with this crate (service, API, envelopes) plus
    /// the builtin `vector` constructor.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.insert(SchemaEntry {
            id: crate::VECTOR_ID,
            name: "vector".to_owned(),
            ty: "Vector".to_owned(),
            category: Category::Types,
        })?;
        for schema in [MTPROTO_SCHEMA, API_SCHEMA, ENVELOPE_SCHEMA] {
            registry.extend_from_schema(schema)?;
        }
        Ok(registry)
    }

    /// Adds every declaration of `schema`.
    ///
    /// Re-adding an identical declaration is allowed; a different name under
    /// an existing id is not. The highest `// LAYER` marker seen wins.
    pub fn extend_from_schema(&mut self, schema: &str) -> Result<(), RegistryError> {
        for (line, parsed) in parse_tl_file_with_lines(schema) {
            let def = parsed.map_err(|error| RegistryError::Parse { line, error })?;
            let ty = if def.ty.generic_ref { def.ty.name.clone() } else { def.ty.to_string() };
            self.insert(SchemaEntry { id: def.id, name: def.full_name(), ty, category: def.category })?;
        }
        if let Some(layer) = parse_layer(schema) {
            self.layer = Some(self.layer.map_or(layer, |old| old.max(layer)));
        }
        Ok(())
    }

    fn insert(&mut self, entry: SchemaEntry) -> Result<(), RegistryError> {
        if let Some(existing) = self.entries.get(&entry.id) {
            if existing.name != entry.name {
                return Err(RegistryError::DuplicateId {
                    id: entry.id,
                    existing: existing.name.clone(),
                    duplicate: entry.name,
                });
            }
        }
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Full entry for `id`.
    pub fn entry(&self, id: u32) -> Option<&SchemaEntry> {
        self.entries.get(&id)
    }

    /// Dotted name for `id`.
    pub fn name_for_id(&self, id: u32) -> Option<&str> {
        self.entries.get(&id).map(|e| e.name.as_str())
    }

    /// `name#id` for logging, `unknown#id` when not registered.
    pub fn describe(&self, id: u32) -> String {
        format!("{}#{id:08x}", self.name_for_id(id).unwrap_or("unknown"))
    }

    /// Highest `// LAYER` marker among the loaded schemas.
    pub fn layer(&self) -> Option<i32> {
        self.layer
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_schemas_load() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert_eq!(registry.name_for_id(0x1cb5c415), Some("vector"));
        assert_eq!(registry.name_for_id(0xf35c6d01), Some("rpc_result"));
        assert_eq!(registry.name_for_id(0x86aef0ec), Some("auth.sendCode"));
        assert_eq!(registry.layer(), Some(crate::LAYER));
        let ping = registry.entry(0x7abe77ec).unwrap();
        assert_eq!(ping.category, Category::Functions);
        assert_eq!(ping.ty, "Pong");
    }

    #[test]
    fn fixture_schema() {
        let registry = SchemaRegistry::from_schema("// LAYER 3\nfoo#00000001 = Foo;\n---functions---\nbar#00000002 x:int = Foo;").unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.describe(2), "bar#00000002");
        assert_eq!(registry.describe(3), "unknown#00000003");
        assert_eq!(registry.layer(), Some(3));
    }

    #[test]
    fn conflicting_ids_are_rejected() {
        let err = SchemaRegistry::from_schema("foo#1 = Foo;\nbar#1 = Bar;").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId { id: 1, .. }));

        let err = SchemaRegistry::from_schema("foo#1 = Foo;\nbroken#zz = Foo;").unwrap_err();
        assert!(matches!(err, RegistryError::Parse { line: 2, .. }));
    }
}
