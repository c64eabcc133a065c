use std::net::SocketAddr;
use std::time::Duration;

use teleproto_crypto::dev;
use teleproto_engine::{ClientConfig, ConnectionError, InvocationError, Server, ServerConfig, Status, TcpClient, serve};
use teleproto_mtproto::authentication::RsaKeyTable;
use teleproto_mtproto::unix_time;
use teleproto_tl_types::{enums, functions};
use tokio::net::TcpListener;

async fn start() -> (Server, SocketAddr) {
    let server = Server::new(ServerConfig::with_keys(vec![dev::private_key()]));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, server.clone()));
    (server, addr)
}

fn config() -> ClientConfig {
    ClientConfig { rsa_keys: RsaKeyTable::from_keys([dev::public_key()]), ..ClientConfig::default() }
}

async fn sign_up(client: &TcpClient, server: &Server, phone: &str) -> i32 {
    let send_code = functions::auth::SendCode {
        allow_flashcall: false,
        phone_number: phone.to_string(),
        current_number: None,
        api_id: 1,
        api_hash: "hash".to_string(),
    };
    let enums::auth::SentCode::SentCode(sent) = client.invoke(&send_code).await.unwrap();
    let code = server.registry().pending_code(phone).unwrap();
    let enums::auth::Authorization::Authorization(auth) = client
        .invoke(&functions::auth::SignUp {
            phone_number: phone.to_string(),
            phone_code_hash: sent.phone_code_hash,
            phone_code: code,
            first_name: "Tcp".to_string(),
            last_name: String::new(),
        })
        .await
        .unwrap();
    let enums::User::User(user) = auth.user else { panic!("empty user") };
    user.id
}

#[tokio::test]
async fn login_and_file_round_trip_over_tcp() {
    let (server, addr) = start().await;
    let client = TcpClient::connect(addr, config()).await.unwrap();
    assert_eq!(client.status(), Status::HasDhKey);

    let enums::Pong::Pong(pong) = client.ping(7).await.unwrap();
    assert_eq!(pong.ping_id, 7);

    let user_id = sign_up(&client, &server, "000050").await;
    assert_eq!(client.status(), Status::Signed);

    let data: Vec<u8> = (0..700_000u32).map(|i| (i % 253) as u8).collect();
    let file = client.upload(99, "big.bin", &data).await.unwrap();
    let creds = client.export_credentials().await.unwrap();
    assert_eq!(creds.user_id, Some(user_id));
    let published = server.registry().publish_upload(creds.auth_key.id(), &file, unix_time()).unwrap();
    let downloaded = client.download(published.location, published.size).await.unwrap();
    assert_eq!(downloaded, data);
}

#[tokio::test]
async fn resume_over_tcp() {
    let (server, addr) = start().await;
    let client = TcpClient::connect(addr, config()).await.unwrap();
    let user_id = sign_up(&client, &server, "000051").await;
    let creds = client.export_credentials().await.unwrap();
    drop(client);

    let resumed = TcpClient::resume(addr, config(), creds).await.unwrap();
    assert_eq!(resumed.status(), Status::Signed);
    let users = resumed.invoke(&functions::users::GetUsers { id: vec![enums::InputUser::UserSelf] }).await.unwrap();
    let enums::User::User(me) = &users[0] else { panic!("empty self") };
    assert_eq!(me.id, user_id);
}

#[tokio::test]
async fn unknown_key_over_tcp_fails_pending_calls() {
    let (_other, other_addr) = start().await;
    let creds = TcpClient::connect(other_addr, config()).await.unwrap().export_credentials().await.unwrap();

    let (_server, addr) = start().await;
    let client = TcpClient::resume(addr, config(), creds).await.unwrap();
    let mut status = client.subscribe();
    match client.invoke(&functions::help::GetNearestDc {}).await {
        Err(InvocationError::Transport(code)) => assert_eq!(code.code(), -404),
        other => panic!("unexpected {other:?}"),
    }
    status.wait_for(|c| c.status == Status::Failed).await.unwrap();
}

#[tokio::test]
async fn handshake_times_out_without_a_server_reply() {
    // Accepts but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let config = ClientConfig { handshake_timeout: Duration::from_millis(200), ..config() };
    assert!(matches!(TcpClient::connect(addr, config).await, Err(ConnectionError::Timeout)));
}
