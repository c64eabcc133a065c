//! `account.*`.

use teleproto_tl_types::functions;

use super::TableFactory;
use crate::server::dispatch::{Context, Operation, Reply};

pub(super) fn factory() -> TableFactory {
    TableFactory::new("account").with::<functions::account::UpdateStatus>().with::<functions::account::CheckUsername>()
}

impl Operation for functions::account::UpdateStatus {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let user_id = match ctx.require_user() {
            Ok(id) => id,
            Err(e) => return e.into(),
        };
        let until = (!self.offline).then(|| ctx.now + ctx.config.online_period.as_secs());
        ctx.registry.set_status(user_id, until, ctx.now);
        Reply::ok(&true)
    }
}

/// Usernames are not stored; every name reads as taken.
impl Operation for functions::account::CheckUsername {
    fn run(self: Box<Self>, _ctx: &mut Context<'_>) -> Reply {
        Reply::not_implemented(&false)
    }
}
