//! `users.*`.

use teleproto_tl_types::{enums, functions, types};

use super::TableFactory;
use crate::server::dispatch::{Context, Operation, Reply};

pub(super) fn factory() -> TableFactory {
    TableFactory::new("users").with::<functions::users::GetUsers>()
}

impl Operation for functions::users::GetUsers {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let me = match ctx.require_user() {
            Ok(id) => id,
            Err(e) => return e.into(),
        };
        let users: Vec<enums::User> = self
            .id
            .iter()
            .filter_map(|input| {
                let (id, access_hash) = match input {
                    enums::InputUser::Empty => return None,
                    enums::InputUser::UserSelf => (me, None),
                    enums::InputUser::InputUser(u) => (u.user_id, Some(u.access_hash)),
                };
                let found = ctx.registry.user(id).filter(|u| id == me || access_hash == Some(u.access_hash));
                Some(match found {
                    Some(user) => user.to_tl(Some(me), ctx.now),
                    None => enums::User::Empty(types::UserEmpty { id }),
                })
            })
            .collect();
        Reply::ok(&users)
    }
}
