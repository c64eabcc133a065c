//! `auth.*`: phone login.

use teleproto_tl_types::{enums, functions, types};
use tracing::info;

use super::TableFactory;
use crate::errors::RpcError;
use crate::server::dispatch::{Context, Operation, Reply};
use crate::server::registry::UserRecord;

pub(super) fn factory() -> TableFactory {
    TableFactory::new("auth")
        .with::<functions::auth::SendCode>()
        .with::<functions::auth::SignIn>()
        .with::<functions::auth::SignUp>()
        .with::<functions::auth::LogOut>()
}

/// Digits only, with an optional leading `+`.
fn normalize_phone(phone: &str) -> Result<String, RpcError> {
    let digits = phone.trim().trim_start_matches('+');
    if digits.is_empty() || digits.len() > 15 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RpcError::bad_request("PHONE_NUMBER_INVALID"));
    }
    Ok(digits.to_string())
}

fn authorization(ctx: &mut Context<'_>, user: &UserRecord) -> Reply {
    ctx.sign_in(user.id);
    ctx.registry.set_status(user.id, Some(ctx.now + ctx.config.online_period.as_secs()), ctx.now);
    info!("[teleproto] user {} signed in", user.id);
    let user = ctx.registry.user(user.id).unwrap_or_else(|| user.clone());
    Reply::ok(&enums::auth::Authorization::Authorization(types::auth::Authorization {
        tmp_sessions: None,
        user: user.to_tl(Some(user.id), ctx.now),
    }))
}

impl Operation for functions::auth::SendCode {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let phone = match normalize_phone(&self.phone_number) {
            Ok(phone) => phone,
            Err(e) => return e.into(),
        };
        let config = ctx.config;
        let login = ctx.registry.issue_code(&phone, config.login_code_length, config.login_code_ttl.as_secs(), ctx.now);
        Reply::ok(&enums::auth::SentCode::SentCode(types::auth::SentCode {
            phone_registered: ctx.registry.user_by_phone(&phone).is_some(),
            r#type: enums::auth::SentCodeType::Sms(types::auth::SentCodeTypeSms { length: login.code.len() as i32 }),
            phone_code_hash: login.phone_code_hash,
            next_type: None,
            timeout: Some(config.login_code_ttl.as_secs() as i32),
        }))
    }
}

impl Operation for functions::auth::SignIn {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let result = normalize_phone(&self.phone_number).and_then(|phone| {
            let user = ctx.registry.user_by_phone(&phone);
            // An unregistered phone keeps its code for auth.signUp.
            ctx.registry.check_code(&phone, &self.phone_code_hash, self.phone_code.trim(), ctx.now, user.is_some())?;
            user.ok_or_else(|| RpcError::bad_request("PHONE_NUMBER_UNOCCUPIED"))
        });
        match result {
            Ok(user) => authorization(ctx, &user),
            Err(e) => e.into(),
        }
    }
}

impl Operation for functions::auth::SignUp {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let result = normalize_phone(&self.phone_number).and_then(|phone| {
            let first_name = self.first_name.trim();
            if first_name.is_empty() || first_name.chars().count() > 64 {
                return Err(RpcError::bad_request("FIRSTNAME_INVALID"));
            }
            if self.last_name.trim().chars().count() > 64 {
                return Err(RpcError::bad_request("LASTNAME_INVALID"));
            }
            if ctx.registry.user_by_phone(&phone).is_some() {
                return Err(RpcError::bad_request("PHONE_NUMBER_OCCUPIED"));
            }
            ctx.registry.check_code(&phone, &self.phone_code_hash, self.phone_code.trim(), ctx.now, true)?;
            Ok(ctx.registry.add_user(&phone, first_name, self.last_name.trim()))
        });
        match result {
            Ok(user) => authorization(ctx, &user),
            Err(e) => e.into(),
        }
    }
}

impl Operation for functions::auth::LogOut {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        match ctx.registry.unbind(ctx.auth_key_id) {
            Some(user_id) => {
                ctx.registry.set_status(user_id, None, ctx.now);
                info!("[teleproto] user {user_id} logged out");
                Reply::ok(&true)
            }
            None => RpcError::unauthorized().into(),
        }
    }
}
