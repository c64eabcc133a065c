//! `help.*`.

use teleproto_tl_types::{enums, functions, types};

use super::TableFactory;
use crate::server::dispatch::{Context, Operation, Reply};

pub(super) fn factory() -> TableFactory {
    TableFactory::new("help").with::<functions::help::GetConfig>().with::<functions::help::GetNearestDc>()
}

/// How long a client may cache the config.
const CONFIG_TTL: u64 = 3600;

impl Operation for functions::help::GetConfig {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let config = ctx.config;
        let dc_options = config
            .dc_options
            .iter()
            .map(|dc| {
                enums::DcOption::DcOption(types::DcOption {
                    ipv6: dc.ip.contains(':'),
                    media_only: false,
                    tcpo_only: false,
                    cdn: false,
                    r#static: false,
                    id: dc.id,
                    ip_address: dc.ip.clone(),
                    port: dc.port,
                })
            })
            .collect();
        Reply::ok(&enums::Config::Config(types::Config {
            date: ctx.now as i32,
            expires: (ctx.now + CONFIG_TTL) as i32,
            test_mode: false,
            this_dc: config.dc_id,
            dc_options,
            chat_size_max: 200,
            megagroup_size_max: 10_000,
            forwarded_count_max: 100,
            online_update_period_ms: 210_000,
            offline_blur_timeout_ms: 5_000,
            edit_time_limit: 172_800,
            tmp_sessions: None,
            me_url_prefix: "https://t.me/".to_string(),
            suggested_lang_code: None,
            lang_pack_version: None,
        }))
    }
}

impl Operation for functions::help::GetNearestDc {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        Reply::ok(&enums::NearestDc::NearestDc(types::NearestDc {
            country: ctx.config.country.clone(),
            this_dc: ctx.config.dc_id,
            nearest_dc: ctx.config.dc_id,
        }))
    }
}
