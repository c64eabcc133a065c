#![allow(dead_code)]

use teleproto_crypto::dev;
use teleproto_engine::{ClientConfig, ClientConnection, InvocationError, MemoryTransport, Server, ServerConfig, ServerConnection, SessionCredentials, Status};
use teleproto_mtproto::authentication::RsaKeyTable;
use teleproto_tl_types::{RemoteCall, enums, functions};

pub fn server() -> Server {
    Server::new(ServerConfig::with_keys(vec![dev::private_key()]))
}

pub fn client_config() -> ClientConfig {
    ClientConfig { api_id: 17, rsa_keys: RsaKeyTable::from_keys([dev::public_key()]), ..ClientConfig::default() }
}

/// A client and a server connection wired back to back.
pub struct Pair {
    pub client: ClientConnection<MemoryTransport>,
    pub conn: ServerConnection<MemoryTransport>,
}

impl Pair {
    /// Connects and runs the key exchange.
    pub fn connect(server: &Server) -> Self {
        Self::start(server, ClientConnection::new(client_config(), MemoryTransport::new()))
    }

    /// Connects with saved credentials.
    pub fn resume(server: &Server, credentials: SessionCredentials) -> Self {
        Self::start(server, ClientConnection::with_credentials(client_config(), MemoryTransport::new(), credentials))
    }

    fn start(server: &Server, mut client: ClientConnection<MemoryTransport>) -> Self {
        client.connect().unwrap();
        let mut pair = Self { client, conn: server.connection(MemoryTransport::new()) };
        pair.pump();
        assert!(pair.client.status().has_key(), "client is {:?}", pair.client.status());
        pair
    }

    /// Moves packets both ways until neither side has anything to send.
    pub fn pump(&mut self) {
        loop {
            let up = self.client.transport_mut().drain();
            for packet in &up {
                self.conn.process_incoming(packet).unwrap();
            }
            let down = self.conn.transport_mut().drain();
            for packet in &down {
                self.client.process_incoming(packet).unwrap();
            }
            if up.is_empty() && down.is_empty() {
                return;
            }
        }
    }

    /// Sends `request` and returns its reply.
    pub fn call<R: RemoteCall>(&mut self, request: &R) -> Result<R::Return, InvocationError> {
        let mut pending = self.client.invoke(request)?;
        self.pump();
        pending.try_take().expect("no reply")
    }

    /// Runs `auth.sendCode` then `auth.signUp` for a new phone number.
    pub fn sign_up(&mut self, server: &Server, phone: &str, first_name: &str) -> i32 {
        let enums::auth::SentCode::SentCode(sent) = self.call(&send_code(phone)).unwrap();
        assert!(!sent.phone_registered);
        let code = server.registry().pending_code(phone.trim_start_matches('+')).unwrap();
        let enums::auth::Authorization::Authorization(auth) = self
            .call(&functions::auth::SignUp {
                phone_number: phone.to_string(),
                phone_code_hash: sent.phone_code_hash,
                phone_code: code,
                first_name: first_name.to_string(),
                last_name: String::new(),
            })
            .unwrap();
        let enums::User::User(user) = auth.user else { panic!("empty user") };
        assert_eq!(self.client.status(), Status::Signed);
        user.id
    }
}

pub fn send_code(phone: &str) -> functions::auth::SendCode {
    functions::auth::SendCode {
        allow_flashcall: false,
        phone_number: phone.to_string(),
        current_number: None,
        api_id: 17,
        api_hash: "0123456789abcdef".to_string(),
    }
}
