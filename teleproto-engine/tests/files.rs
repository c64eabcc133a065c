mod common;

use common::{Pair, server};
use teleproto_engine::{FileTransfer, InvocationError, UploadPart};
use teleproto_mtproto::unix_time;
use teleproto_tl_types::{enums, functions, types};

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

fn upload(pair: &mut Pair, file_id: i64, data: &[u8], chunk_size: usize) -> enums::InputFile {
    let mut transfer = FileTransfer::upload(1, file_id, "sample.bin", data.len() as u64).with_chunk_size(chunk_size).unwrap();
    while !transfer.is_finished() {
        let start = transfer.offset() as usize;
        let chunk = &data[start..start + transfer.expected_chunk_len()];
        assert!(pair.call(&transfer.upload_request(chunk.to_vec()).unwrap()).unwrap());
        transfer.bump_part(chunk).unwrap();
    }
    transfer.input_file().unwrap()
}

#[test]
fn upload_publish_download() {
    let server = server();
    let mut pair = Pair::connect(&server);
    pair.sign_up(&server, "000040", "Fay");

    let data = sample(10_000);
    let file = upload(&mut pair, 77, &data, 4096);
    let enums::InputFile::InputFile(small) = &file else { panic!("expected a small file") };
    assert_eq!(small.parts, 3);

    let key_id = pair.conn.auth_key_id().unwrap();
    let published = server.registry().publish_upload(key_id, &file, unix_time()).unwrap();
    assert_eq!(published.size, data.len() as u64);

    let mut transfer = FileTransfer::download(1, published.location, published.size).with_chunk_size(4096).unwrap();
    let mut out = Vec::new();
    let mut last_type = None;
    while !transfer.is_finished() {
        let enums::upload::File::File(file) = pair.call(&transfer.download_request().unwrap()).unwrap();
        transfer.bump_part(&file.bytes).unwrap();
        out.extend_from_slice(&file.bytes);
        last_type = Some(file.r#type);
    }
    assert_eq!(out, data);
    assert_eq!(last_type, Some(enums::storage::FileType::FileUnknown));
}

#[test]
fn corrupted_checksum_is_not_published() {
    let server = server();
    let mut pair = Pair::connect(&server);
    pair.sign_up(&server, "000041", "Gus");

    let data = sample(3000);
    let enums::InputFile::InputFile(mut file) = upload(&mut pair, 78, &data, 1024) else { panic!("expected a small file") };
    file.md5_checksum = "00".repeat(16);
    let key_id = pair.conn.auth_key_id().unwrap();
    let err = server.registry().publish_upload(key_id, &enums::InputFile::InputFile(file), unix_time()).unwrap_err();
    assert!(err.is("MD5_CHECKSUM_INVALID"));
}

#[test]
fn missing_parts_are_not_published() {
    let server = server();
    let mut pair = Pair::connect(&server);
    pair.sign_up(&server, "000042", "Hal");
    let part = UploadPart::Small(functions::upload::SaveFilePart { file_id: 79, file_part: 1, bytes: vec![1; 1024] });
    assert!(pair.call(&part).unwrap());

    let file = enums::InputFile::InputFile(types::InputFile { id: 79, parts: 2, name: "x".into(), md5_checksum: String::new() });
    let err = server.registry().publish_upload(pair.conn.auth_key_id().unwrap(), &file, unix_time()).unwrap_err();
    assert!(err.is("FILE_PARTS_INVALID"));
}

#[test]
fn get_file_validates_its_arguments() {
    let server = server();
    let mut pair = Pair::connect(&server);

    let bogus = enums::InputFileLocation::InputFileLocation(types::InputFileLocation { volume_id: 1, local_id: 1, secret: 1 });
    let unauthorized = pair.call(&functions::upload::GetFile { location: bogus.clone(), offset: 0, limit: 1024 });
    assert!(matches!(unauthorized, Err(InvocationError::Rpc(e)) if e.code == 401));

    pair.sign_up(&server, "000043", "Ida");
    let cases = [(0, 1000, "LIMIT_INVALID"), (-1024, 1024, "OFFSET_INVALID"), (0, 1024, "LOCATION_INVALID")];
    for (offset, limit, reason) in cases {
        match pair.call(&functions::upload::GetFile { location: bogus.clone(), offset, limit }) {
            Err(InvocationError::Rpc(e)) => assert!(e.is(reason), "{reason}: got {e}"),
            other => panic!("{reason}: unexpected {other:?}"),
        }
    }
}

#[test]
fn uploads_need_a_signed_in_key() {
    let server = server();
    let mut pair = Pair::connect(&server);
    let part = UploadPart::Small(functions::upload::SaveFilePart { file_id: 80, file_part: 0, bytes: vec![0; 16] });
    assert!(matches!(pair.call(&part), Err(InvocationError::Rpc(e)) if e.code == 401));
}
