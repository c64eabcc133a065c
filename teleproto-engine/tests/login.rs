mod common;

use common::{Pair, send_code, server};
use teleproto_engine::{InvocationError, Status};
use teleproto_tl_types::{enums, functions, types};

fn rpc_error<T: std::fmt::Debug>(result: Result<T, InvocationError>) -> teleproto_engine::RpcError {
    match result {
        Err(InvocationError::Rpc(e)) => e,
        other => panic!("expected an RPC error, got {other:?}"),
    }
}

#[test]
fn sign_up_then_sign_in_on_another_key() {
    let server = server();
    let mut first = Pair::connect(&server);
    let user_id = first.sign_up(&server, "+000001", "Ada");
    assert_eq!(first.client.user_id(), Some(user_id));
    assert_eq!(first.conn.status().status(), Status::Signed);

    let mut second = Pair::connect(&server);
    let enums::auth::SentCode::SentCode(sent) = second.call(&send_code("000001")).unwrap();
    assert!(sent.phone_registered);
    assert_eq!(sent.r#type, enums::auth::SentCodeType::Sms(types::auth::SentCodeTypeSms { length: 5 }));
    let code = server.registry().pending_code("000001").unwrap();

    let enums::auth::Authorization::Authorization(auth) = second
        .call(&functions::auth::SignIn { phone_number: "+000001".into(), phone_code_hash: sent.phone_code_hash, phone_code: code })
        .unwrap();
    let enums::User::User(user) = auth.user else { panic!("empty user") };
    assert_eq!(user.id, user_id);
    assert!(user.is_self);
    assert_eq!(user.phone.as_deref(), Some("000001"));
    assert_eq!(second.client.status(), Status::Signed);
}

#[test]
fn first_request_carries_client_info() {
    let server = server();
    let mut pair = Pair::connect(&server);
    pair.call(&send_code("000001")).unwrap();
    let info = pair.conn.client_info();
    assert_eq!(info.api_id, Some(17));
    assert_eq!(info.layer, Some(teleproto_tl_types::LAYER));
    assert_eq!(info.device_model, "Linux");
}

#[test]
fn wrong_code_is_rejected() {
    let server = server();
    let mut pair = Pair::connect(&server);
    let enums::auth::SentCode::SentCode(sent) = pair.call(&send_code("000002")).unwrap();
    let code = server.registry().pending_code("000002").unwrap();
    let wrong = if code == "00000" { "11111" } else { "00000" };

    let err = rpc_error(pair.call(&functions::auth::SignUp {
        phone_number: "000002".into(),
        phone_code_hash: sent.phone_code_hash.clone(),
        phone_code: wrong.into(),
        first_name: "Bob".into(),
        last_name: String::new(),
    }));
    assert_eq!(err.code, 400);
    assert!(err.is("PHONE_CODE_INVALID"));

    let err = rpc_error(pair.call(&functions::auth::SignUp {
        phone_number: "000002".into(),
        phone_code_hash: "nope".into(),
        phone_code: code,
        first_name: "Bob".into(),
        last_name: String::new(),
    }));
    assert!(err.is("PHONE_CODE_HASH_INVALID"));
    assert_eq!(pair.client.status(), Status::HasDhKey);
}

#[test]
fn sign_in_on_unregistered_phone_keeps_the_code() {
    let server = server();
    let mut pair = Pair::connect(&server);
    let enums::auth::SentCode::SentCode(sent) = pair.call(&send_code("000003")).unwrap();
    let code = server.registry().pending_code("000003").unwrap();

    let err = rpc_error(pair.call(&functions::auth::SignIn {
        phone_number: "000003".into(),
        phone_code_hash: sent.phone_code_hash.clone(),
        phone_code: code.clone(),
    }));
    assert!(err.is("PHONE_NUMBER_UNOCCUPIED"));

    let enums::auth::Authorization::Authorization(_) = pair
        .call(&functions::auth::SignUp {
            phone_number: "000003".into(),
            phone_code_hash: sent.phone_code_hash,
            phone_code: code,
            first_name: "Cy".into(),
            last_name: String::new(),
        })
        .unwrap();
    assert_eq!(pair.client.status(), Status::Signed);
    assert_eq!(server.registry().pending_code("000003"), None);
}

#[test]
fn invalid_phone_numbers() {
    let server = server();
    let mut pair = Pair::connect(&server);
    let err = rpc_error(pair.call(&send_code("12ab")));
    assert!(err.is("PHONE_NUMBER_INVALID"));
}

#[test]
fn user_calls_need_a_signed_in_key() {
    let server = server();
    let mut pair = Pair::connect(&server);
    let err = rpc_error(pair.call(&functions::users::GetUsers { id: vec![enums::InputUser::UserSelf] }));
    assert_eq!(err.code, 401);
    assert!(err.is("AUTH_KEY_UNREGISTERED"));

    let err = rpc_error(pair.call(&functions::auth::LogOut {}));
    assert_eq!(err.code, 401);
}

#[test]
fn get_users_checks_access_hashes() {
    let server = server();
    let mut alice = Pair::connect(&server);
    let alice_id = alice.sign_up(&server, "000010", "Alice");
    let mut bob = Pair::connect(&server);
    let bob_id = bob.sign_up(&server, "000011", "Bob");
    let bob_hash = server.registry().user(bob_id).unwrap().access_hash;

    let users = alice
        .call(&functions::users::GetUsers {
            id: vec![
                enums::InputUser::UserSelf,
                enums::InputUser::InputUser(types::InputUser { user_id: bob_id, access_hash: bob_hash }),
                enums::InputUser::InputUser(types::InputUser { user_id: bob_id, access_hash: bob_hash ^ 1 }),
                enums::InputUser::Empty,
            ],
        })
        .unwrap();
    assert_eq!(users.len(), 3);
    let enums::User::User(me) = &users[0] else { panic!("empty self") };
    assert_eq!(me.id, alice_id);
    assert!(me.is_self);
    let enums::User::User(other) = &users[1] else { panic!("empty bob") };
    assert_eq!(other.id, bob_id);
    assert!(!other.is_self);
    assert_eq!(other.phone, None);
    assert!(matches!(other.status, Some(enums::UserStatus::Online(_))));
    assert_eq!(users[2], enums::User::Empty(types::UserEmpty { id: bob_id }));
}

#[test]
fn update_status_and_log_out() {
    let server = server();
    let mut pair = Pair::connect(&server);
    let user_id = pair.sign_up(&server, "000020", "Dee");

    assert!(pair.call(&functions::account::UpdateStatus { offline: true }).unwrap());
    let user = server.registry().user(user_id).unwrap();
    assert_eq!(user.online_until, 0);
    assert!(user.was_online > 0);

    assert!(pair.call(&functions::auth::LogOut {}).unwrap());
    assert_eq!(pair.client.user_id(), None);
    assert_eq!(server.registry().bound_user(pair.conn.auth_key_id().unwrap()), None);
    // Status never moves backwards.
    assert_eq!(pair.client.status(), Status::Signed);

    let err = rpc_error(pair.call(&functions::users::GetUsers { id: vec![enums::InputUser::UserSelf] }));
    assert_eq!(err.code, 401);
}

#[test]
fn send_code_then_sign_in_binds_the_session() {
    let server = server();
    let registered = server.registry().add_user("000001", "Ada", "Lovelace");
    let mut pair = Pair::connect(&server);

    let enums::auth::SentCode::SentCode(sent) = pair.call(&send_code("000001")).unwrap();
    assert!(matches!(sent.r#type, enums::auth::SentCodeType::Sms(_)));
    let code = server.registry().pending_code("000001").unwrap();
    let enums::auth::Authorization::Authorization(auth) = pair
        .call(&functions::auth::SignIn { phone_number: "000001".into(), phone_code_hash: sent.phone_code_hash, phone_code: code })
        .unwrap();

    let enums::User::User(user) = auth.user else { panic!("empty user") };
    assert_eq!(user.id, registered.id);
    assert_eq!(server.registry().bound_user(pair.conn.auth_key_id().unwrap()), Some(registered.id));
    assert_eq!(pair.conn.status().status(), Status::Signed);
    assert_eq!(pair.client.status(), Status::Signed);
}
