//! `contacts.*`.

use teleproto_tl_types::{enums, functions, types};

use super::TableFactory;
use crate::server::dispatch::{Context, Operation, Reply};

pub(super) fn factory() -> TableFactory {
    TableFactory::new("contacts").with::<functions::contacts::GetContacts>()
}

/// There is no contact book; the list is always empty.
impl Operation for functions::contacts::GetContacts {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        if let Err(e) = ctx.require_user() {
            return e.into();
        }
        Reply::not_implemented(&enums::contacts::Contacts::Contacts(types::contacts::Contacts {
            contacts: Vec::new(),
            saved_count: 0,
            users: Vec::new(),
        }))
    }
}
