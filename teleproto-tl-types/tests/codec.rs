use teleproto_tl_types::deserialize::Error;
use teleproto_tl_types::{Blob, Cursor, Deserializable, RawVec, Serializable, enums, functions, types};

#[test]
fn integers_are_little_endian() {
    assert_eq!(0x01020304i32.to_bytes(), [4, 3, 2, 1]);
    assert_eq!(i64::from_bytes(&(-2i64).to_bytes()).unwrap(), -2);
    assert_eq!(u64::from_bytes(&u64::MAX.to_bytes()).unwrap(), u64::MAX);
    let n128 = [9u8; 16];
    assert_eq!(<[u8; 16]>::from_bytes(&n128.to_bytes()).unwrap(), n128);
    let n256: [u8; 32] = std::array::from_fn(|i| i as u8);
    assert_eq!(n256.to_bytes(), n256);
}

#[test]
fn bool_is_a_magic_constant() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
    assert_eq!(bool::from_bytes(&1u32.to_le_bytes()), Err(Error::UnexpectedConstructor { id: 1 }));
}

#[test]
fn string_boundary_lengths() {
    for len in [0usize, 1, 2, 3, 4, 253, 254, 255, 256, 1000] {
        let value = vec![0xabu8; len];
        let bytes = value.to_bytes();
        assert_eq!(bytes.len() % 4, 0, "len {len}");
        let header = if len < 254 { 1 } else { 4 };
        assert!(bytes.len() - header - len <= 3, "len {len} over-padded");
        let (decoded, used) = Vec::<u8>::from_bytes_prefix(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(used, bytes.len());
    }
}

#[test]
fn long_string_header() {
    let bytes = "x".repeat(255).to_bytes();
    assert_eq!(&bytes[..4], &[0xfe, 0xff, 0x00, 0x00]);
    assert_eq!(bytes.len(), 260);
}

#[test]
fn vectors() {
    let empty: Vec<i64> = Vec::new();
    assert_eq!(empty.to_bytes(), [0x15, 0xc4, 0xb5, 0x1c, 0, 0, 0, 0]);
    assert_eq!(Vec::<i64>::from_bytes(&empty.to_bytes()).unwrap(), empty);

    let single = vec!["one".to_owned()];
    assert_eq!(Vec::<String>::from_bytes(&single.to_bytes()).unwrap(), single);

    let raw = RawVec(vec![1i32, 2]);
    assert_eq!(raw.to_bytes().len(), 12);
    assert_eq!(RawVec::<i32>::from_bytes(&raw.to_bytes()).unwrap(), raw);
}

#[test]
fn vector_with_wrong_constructor_is_invalid() {
    let mut bytes = vec![1i32, 2].to_bytes();
    bytes[0] ^= 0xff;
    let mut cursor = Cursor::from_slice(&bytes);
    assert!(matches!(Vec::<i32>::deserialize(&mut cursor), Err(Error::UnexpectedConstructor { .. })));
    assert!(cursor.has_error());
}

#[test]
fn truncated_string_sets_the_error_flag() {
    let bytes = "hello world".to_bytes();
    let mut cursor = Cursor::from_slice(&bytes[..6]);
    assert_eq!(String::deserialize(&mut cursor), Err(Error::UnexpectedEof));
    assert_eq!(cursor.error(), Some(&Error::UnexpectedEof));
    assert_eq!(i32::deserialize(&mut cursor), Err(Error::UnexpectedEof));
}

#[test]
fn truncated_vector_is_contained() {
    let bytes = vec![1i64, 2, 3].to_bytes();
    let mut cursor = Cursor::from_slice(&bytes[..bytes.len() - 3]);
    assert!(Vec::<i64>::deserialize(&mut cursor).is_err());
    assert!(cursor.has_error());

    // A length claiming more items than bytes left is rejected up front.
    let mut lying = 0x1cb5c415u32.to_bytes();
    lying.extend(1_000_000i32.to_bytes());
    assert_eq!(Vec::<i32>::from_bytes(&lying), Err(Error::InvalidLength { len: 1_000_000 }));
}

#[test]
fn sibling_values_survive_a_later_failure() {
    let mut bytes = 7i32.to_bytes();
    bytes.extend("ok".to_bytes());
    bytes.extend([0xfe, 0x10]);
    let mut cursor = Cursor::from_slice(&bytes);
    let a = i32::deserialize(&mut cursor).unwrap();
    let b = String::deserialize(&mut cursor).unwrap();
    assert!(String::deserialize(&mut cursor).is_err());
    assert_eq!((a, b.as_str()), (7, "ok"));
}

#[test]
fn invalid_utf8() {
    let bytes = vec![0xffu8, 0xfe].to_bytes();
    assert_eq!(String::from_bytes(&bytes), Err(Error::InvalidUtf8));
}

#[test]
fn flags_round_trip() {
    let user = enums::User::User(types::User {
        is_self: true,
        contact: false,
        mutual_contact: false,
        deleted: false,
        bot: false,
        bot_chat_history: false,
        bot_nochats: false,
        verified: false,
        restricted: false,
        min: false,
        bot_inline_geo: false,
        id: 42,
        access_hash: Some(99),
        first_name: Some("Ada".into()),
        last_name: None,
        username: None,
        phone: Some("000001".into()),
        photo: None,
        status: Some(enums::UserStatus::Online(types::UserStatusOnline { expires: 10 })),
        bot_info_version: None,
        restriction_reason: None,
        bot_inline_placeholder: None,
        lang_code: None,
    });
    let bytes = user.to_bytes();
    assert_eq!(&bytes[..4], &0x2e13f4c3u32.to_le_bytes());
    let flags = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert_eq!(flags, 1 << 10 | 1 << 0 | 1 << 1 | 1 << 4 | 1 << 6);
    assert_eq!(enums::User::from_bytes(&bytes).unwrap(), user);
}

#[test]
fn unit_variants_and_namespaces() {
    let ty = enums::storage::FileType::FilePng;
    assert_eq!(ty.to_bytes(), 0x0a4f63c0u32.to_le_bytes());
    assert_eq!(enums::storage::FileType::from_bytes(&ty.to_bytes()).unwrap(), ty);

    let sent = enums::auth::SentCode::SentCode(types::auth::SentCode {
        phone_registered: false,
        r#type: enums::auth::SentCodeType::Sms(types::auth::SentCodeTypeSms { length: 5 }),
        phone_code_hash: "abc".into(),
        next_type: None,
        timeout: Some(120),
    });
    assert_eq!(enums::auth::SentCode::from_bytes(&sent.to_bytes()).unwrap(), sent);
}

#[test]
fn unknown_variant_is_rejected() {
    let mut cursor = Cursor::from_slice(&[1, 2, 3, 4, 0, 0, 0, 0]);
    let err = enums::Pong::deserialize(&mut cursor).unwrap_err();
    assert_eq!(err, Error::UnexpectedConstructor { id: 0x04030201 });
    assert!(cursor.has_error());
}

#[test]
fn functions_carry_their_id() {
    let call = functions::auth::SendCode {
        allow_flashcall: false,
        phone_number: "000001".into(),
        current_number: None,
        api_id: 1,
        api_hash: "hash".into(),
    };
    let bytes = call.to_bytes();
    assert_eq!(&bytes[..4], &0x86aef0ecu32.to_le_bytes());
}

#[test]
fn generic_wrappers_pass_blobs_through() {
    let inner = functions::help::GetNearestDc {}.to_bytes();
    let call = functions::InvokeWithLayer { layer: teleproto_tl_types::LAYER, query: Blob(inner.clone()) };
    let bytes = call.to_bytes();
    assert_eq!(&bytes[8..], inner.as_slice());
}

#[test]
fn service_types() {
    let salts = types::FutureSalts {
        req_msg_id: 5,
        now: 100,
        salts: RawVec(vec![types::FutureSalt { valid_since: 100, valid_until: 200, salt: 3 }]),
    };
    let bytes = enums::FutureSalts::FutureSalts(salts.clone()).to_bytes();
    assert_eq!(bytes.len(), 4 + 8 + 4 + 4 + 16);
    assert_eq!(enums::FutureSalts::from_bytes(&bytes).unwrap(), enums::FutureSalts::FutureSalts(salts));
}
