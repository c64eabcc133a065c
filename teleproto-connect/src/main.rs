//! Loopback demo: an MTProto server and a client in one process.
//!
//! # What this does
//!
//! 1. Start a server on `127.0.0.1` with the development RSA key
//! 2. Connect a client and run the DH key exchange
//! 3. `help.getConfig`, then sign up with the login code the server issued
//! 4. Upload a file, publish it and download it again
//! 5. Save the credentials and reconnect without a key exchange
//!
//! # Run
//! ```text
//! RUST_LOG=info cargo run -p teleproto-connect
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use teleproto::crypto::dev;
use teleproto::engine::{CredentialStore, MemoryStore};
use teleproto::mtproto::unix_time;
use teleproto::tl::{enums, functions};
use teleproto::{ClientConfig, RsaKeyTable, Server, ServerConfig, TcpClient};
use tokio::net::TcpListener;

const PHONE: &str = "0001234567";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run().await {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // ── Server ─────────────────────────────────────────────────────────────
    let server = Server::new(ServerConfig::with_keys(vec![dev::private_key()]));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(teleproto::serve(listener, server.clone()));
    println!("server listening on {addr}");

    // ── Key exchange ───────────────────────────────────────────────────────
    let config = ClientConfig { rsa_keys: RsaKeyTable::from_keys([dev::public_key()]), ..ClientConfig::default() };
    let client = TcpClient::connect(addr, config.clone()).await?;
    println!("auth key ready ({:?})", client.status());

    let enums::Config::Config(dc) = client.invoke(&functions::help::GetConfig {}).await?;
    for option in &dc.dc_options {
        let enums::DcOption::DcOption(option) = option;
        println!("  DC{} → {}:{}", option.id, option.ip_address, option.port);
    }

    // ── Login ──────────────────────────────────────────────────────────────
    let enums::auth::SentCode::SentCode(sent) = client
        .invoke(&functions::auth::SendCode {
            allow_flashcall: false,
            phone_number: PHONE.to_string(),
            current_number: None,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
        })
        .await?;
    let code = server.registry().pending_code(PHONE).ok_or("no login code issued")?;
    println!("login code {code} sent to {PHONE}");

    let request = functions::auth::SignUp {
        phone_number: PHONE.to_string(),
        phone_code_hash: sent.phone_code_hash,
        phone_code: code,
        first_name: "Demo".to_string(),
        last_name: "User".to_string(),
    };
    let enums::auth::Authorization::Authorization(auth) = client.invoke(&request).await?;
    if let enums::User::User(user) = auth.user {
        println!("signed up as user {} ({:?})", user.id, client.status());
    }

    // ── Files ──────────────────────────────────────────────────────────────
    let data: Vec<u8> = (0..600_000u32).map(|i| (i % 251) as u8).collect();
    let file = client.upload(random_id(), "demo.bin", &data).await?;
    let credentials = client.export_credentials().await.ok_or("no credentials")?;
    let published = server.registry().publish_upload(credentials.auth_key.id(), &file, unix_time())?;
    let downloaded = client.download(published.location, published.size).await?;
    println!("file round trip: {} bytes, intact: {}", downloaded.len(), downloaded == data);

    // ── Resume ─────────────────────────────────────────────────────────────
    let store = MemoryStore::new();
    store.save(&credentials)?;
    drop(client);

    let saved = store.load()?.ok_or("credentials missing")?;
    let resumed = TcpClient::resume(addr, config, saved).await?;
    let enums::Pong::Pong(pong) = resumed.ping(random_id()).await?;
    println!("resumed session ({:?}), pong {}", resumed.status(), pong.ping_id);
    Ok(())
}

fn random_id() -> i64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or_default();
    i64::from(nanos) << 16 | 0x5eed
}
