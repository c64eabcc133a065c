//! `upload.*`: chunked upload and download.

use teleproto_tl_types::{enums, functions, types};

use super::TableFactory;
use crate::errors::RpcError;
use crate::file_transfer::MAX_CHUNK_SIZE;
use crate::server::dispatch::{Context, Operation, Reply};

pub(super) fn factory() -> TableFactory {
    TableFactory::new("upload")
        .with::<functions::upload::SaveFilePart>()
        .with::<functions::upload::SaveBigFilePart>()
        .with::<functions::upload::GetFile>()
}

impl Operation for functions::upload::SaveFilePart {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let Self { file_id, file_part, bytes } = *self;
        let result = ctx.require_user().and_then(|_| ctx.registry.save_part(ctx.auth_key_id, file_id, file_part, bytes, None, ctx.now));
        match result {
            Ok(()) => Reply::ok(&true),
            Err(e) => e.into(),
        }
    }
}

impl Operation for functions::upload::SaveBigFilePart {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        let Self { file_id, file_part, file_total_parts, bytes } = *self;
        let result = ctx
            .require_user()
            .and_then(|_| ctx.registry.save_part(ctx.auth_key_id, file_id, file_part, bytes, Some(file_total_parts), ctx.now));
        match result {
            Ok(()) => Reply::ok(&true),
            Err(e) => e.into(),
        }
    }
}

impl Operation for functions::upload::GetFile {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply {
        if let Err(e) = ctx.require_user() {
            return e.into();
        }
        if self.limit <= 0 || self.limit % 1024 != 0 || self.limit as usize > MAX_CHUNK_SIZE {
            return RpcError::bad_request("LIMIT_INVALID").into();
        }
        if self.offset < 0 || self.offset % 1024 != 0 {
            return RpcError::bad_request("OFFSET_INVALID").into();
        }
        let enums::InputFileLocation::InputFileLocation(location) = &self.location else {
            return RpcError::bad_request("LOCATION_INVALID").into();
        };
        let chunk = ctx.registry.file_chunk(
            location.volume_id,
            location.local_id,
            location.secret,
            self.offset as usize,
            self.limit as usize,
        );
        match chunk {
            Ok((bytes, size, mtime)) => {
                let r#type = if self.offset as usize + bytes.len() < size {
                    enums::storage::FileType::FilePartial
                } else {
                    enums::storage::FileType::FileUnknown
                };
                Reply::ok(&enums::upload::File::File(types::upload::File { r#type, mtime: mtime as i32, bytes }))
            }
            Err(e) => e.into(),
        }
    }
}
