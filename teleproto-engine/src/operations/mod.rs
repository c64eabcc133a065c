//! Built-in API operations, one factory per namespace.

mod account;
mod auth;
mod contacts;
mod help;
mod upload;
mod users;

use std::sync::Arc;

use teleproto_tl_types::{Deserializable, Identifiable, deserialize};

use crate::server::dispatch::{Operation, OperationFactory, decode_operation};

type Decoder = fn(&[u8]) -> Result<Box<dyn Operation>, deserialize::Error>;

/// A factory backed by a constructor id → decoder table.
pub struct TableFactory {
    name: &'static str,
    entries: Vec<(u32, Decoder)>,
}

impl TableFactory {
    pub fn new(name: &'static str) -> Self {
        Self { name, entries: Vec::new() }
    }

    /// Claims `O::CONSTRUCTOR_ID` and decodes it as `O`.
    pub fn with<O>(mut self) -> Self
    where
        O: Operation + Deserializable + Identifiable + 'static,
    {
        self.entries.push((O::CONSTRUCTOR_ID, decode_operation::<O>));
        self
    }
}

impl OperationFactory for TableFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn claims(&self, constructor_id: u32) -> bool {
        self.entries.iter().any(|(id, _)| *id == constructor_id)
    }

    fn create(&self, constructor_id: u32, body: &[u8]) -> Result<Box<dyn Operation>, deserialize::Error> {
        match self.entries.iter().find(|(id, _)| *id == constructor_id) {
            Some((_, decode)) => decode(body),
            None => Err(deserialize::Error::UnexpectedConstructor { id: constructor_id }),
        }
    }
}

/// Factories every [`crate::Server`] starts with.
pub fn builtin_factories() -> Vec<Arc<dyn OperationFactory>> {
    vec![
        Arc::new(auth::factory()),
        Arc::new(account::factory()),
        Arc::new(users::factory()),
        Arc::new(contacts::factory()),
        Arc::new(help::factory()),
        Arc::new(upload::factory()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleproto_tl_types::functions;

    #[test]
    fn builtin_ids_are_claimed_once() {
        let factories = builtin_factories();
        for id in [
            functions::auth::SendCode::CONSTRUCTOR_ID,
            functions::auth::SignIn::CONSTRUCTOR_ID,
            functions::users::GetUsers::CONSTRUCTOR_ID,
            functions::help::GetConfig::CONSTRUCTOR_ID,
            functions::upload::GetFile::CONSTRUCTOR_ID,
        ] {
            assert_eq!(factories.iter().filter(|f| f.claims(id)).count(), 1, "{id:#010x}");
        }
        assert!(!factories.iter().any(|f| f.claims(functions::Ping::CONSTRUCTOR_ID)));
    }
}
