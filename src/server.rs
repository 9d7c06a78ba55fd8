//! ChatServer actor implementation
//!
//! The central actor that owns all shared state: the connection registry,
//! the Session & Room Directory, the runtime options and the transcript.
//! Handlers and login workers communicate with it exclusively through
//! mpsc commands, so this task is the single writer of the Directory.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{Client, ConnState, Outbound};
use crate::config::ServerConfig;
use crate::directory::Directory;
use crate::dispatch::{Effect, Engine};
use crate::login::{self, Credentials, LoginDecision};
use crate::files::{self, FileRegistry, SaveOutcome};
use crate::message::{kind, Envelope, Inbound, SERVER_NAME};
use crate::session::Session;
use crate::store::AccountStore;
use crate::transcript::Transcript;
use crate::types::{ConnId, SessionId};

/// Commands sent from handlers and login workers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted
    Connect {
        conn_id: ConnId,
        addr: SocketAddr,
        sender: mpsc::Sender<Outbound>,
    },
    /// Connection reached end-of-stream or its handler finished
    Disconnect { conn_id: ConnId },
    /// One classified frame from a connection, in receipt order
    Frame { conn_id: ConnId, message: Inbound },
    /// The framing layer gave up on this connection
    FrameFault { conn_id: ConnId, detail: String },
    /// A login worker finished its credential check
    LoginResolved {
        conn_id: ConnId,
        decision: LoginDecision,
    },
    /// A registration worker finished
    RegisterResolved {
        conn_id: ConnId,
        result: Result<(), String>,
    },
}

/// The main ChatServer actor
///
/// Owns all mutable state and processes commands from connection handlers
/// and login workers; no locks, all access goes through message passing.
pub struct ChatServer {
    /// All open connections: ConnId -> Client
    clients: HashMap<ConnId, Client>,
    /// Active sessions and rooms
    directory: Directory,
    /// Runtime-toggleable options
    options: crate::config::ServerOptions,
    /// Account store, shared with blocking login workers
    store: Arc<AccountStore>,
    /// Default-room transcript
    transcript: Transcript,
    /// Reserved paths for the file-transfer side channel
    files: FileRegistry,
    /// Next numeric session id
    next_session_id: u64,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Own sender, cloned into login workers for the result handoff
    handle: mpsc::Sender<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer actor from the startup configuration.
    pub fn new(
        config: &ServerConfig,
        store: Arc<AccountStore>,
        receiver: mpsc::Receiver<ServerCommand>,
        handle: mpsc::Sender<ServerCommand>,
    ) -> Self {
        Self {
            clients: HashMap::new(),
            directory: Directory::new(config.default_room.clone()),
            options: config.options.clone(),
            store,
            transcript: Transcript::new(config.transcript_path.clone()),
            files: FileRegistry::new(config.files_dir.clone()),
            next_session_id: 0,
            receiver,
            handle,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("ChatServer shutting down");
    }

    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                conn_id,
                addr,
                sender,
            } => {
                info!("Connection established: {addr}");
                self.clients.insert(conn_id, Client::new(conn_id, addr, sender));
            }
            ServerCommand::Disconnect { conn_id } => {
                self.teardown(conn_id).await;
            }
            ServerCommand::Frame { conn_id, message } => {
                self.handle_frame(conn_id, message).await;
            }
            ServerCommand::FrameFault { conn_id, detail } => {
                warn!("Framing fault on {conn_id}: {detail}");
                self.teardown(conn_id).await;
            }
            ServerCommand::LoginResolved { conn_id, decision } => {
                self.commit_login(conn_id, decision).await;
            }
            ServerCommand::RegisterResolved { conn_id, result } => {
                self.finish_register(conn_id, result).await;
            }
        }
    }

    async fn handle_frame(&mut self, conn_id: ConnId, message: Inbound) {
        match message {
            Inbound::Text { to, time, body, .. } => {
                self.deliver(conn_id, kind::TEXT_MESSAGE, to, time, body).await;
            }
            Inbound::Color { to, time, body, .. } => {
                self.deliver(conn_id, kind::COLOR_MESSAGE, to, time, body).await;
            }
            Inbound::UserName { payload } => {
                self.start_login(conn_id, payload);
            }
            Inbound::Register { payload } => {
                self.start_register(conn_id, payload);
            }
            Inbound::Command { line, .. } => {
                self.handle_command_line(conn_id, line).await;
            }
            Inbound::SendFile { name } => {
                self.handle_file_offer(conn_id, name).await;
            }
            Inbound::Unknown { tag } => {
                debug!("Unknown message type {tag} from {conn_id}");
                self.send_to_conn(
                    conn_id,
                    Envelope::server_text(format!("{tag} is not a valid message type.")),
                )
                .await;
            }
            Inbound::Malformed => {
                // Dropped with a diagnostic; never forwarded to other sessions
                warn!("Malformed frame from {conn_id} dropped");
            }
        }
    }

    /// Broadcast/private delivery for chat messages.
    async fn deliver(&mut self, conn_id: ConnId, kind: &str, to: String, time: f64, body: String) {
        // The session owned by the issuing connection is the authoritative
        // sender; the wire `by` field is not trusted.
        let Some(by) = self.active_session_name(conn_id) else {
            self.reply_not_logged_in(conn_id).await;
            return;
        };
        let envelope = Envelope {
            by: by.clone(),
            to: to.clone(),
            kind: kind.to_string(),
            time,
            message: body,
            file: None,
        };

        if to == self.directory.default_room() {
            if self.options.recordable {
                self.transcript.record(&envelope);
            }
            let conns: Vec<ConnId> = self.directory.sessions().map(|s| s.conn).collect();
            for conn in conns {
                self.send_to_conn(conn, envelope.clone()).await;
            }
        } else if self.directory.room_exists(&to) {
            let conns: Vec<ConnId> = self
                .directory
                .sessions()
                .filter(|s| s.in_room(&to))
                .map(|s| s.conn)
                .collect();
            for conn in conns {
                self.send_to_conn(conn, envelope.clone()).await;
            }
        } else if let Some(target) = self.directory.lookup(&to) {
            // Private message: recipient and sender both see it
            let target_conn = target.conn;
            self.send_to_conn(target_conn, envelope.clone()).await;
            self.send_to_conn(conn_id, envelope).await;
        } else {
            self.send_to_conn(
                conn_id,
                Envelope::server_text("Private chat target does not exist."),
            )
            .await;
        }
    }

    /// Reserve a save path for an offered file and answer with the side
    /// channel's handshake word. The byte copy itself runs outside the
    /// actor; only the path reservation lives here.
    async fn handle_file_offer(&mut self, conn_id: ConnId, name: String) {
        let Some(by) = self.active_session_name(conn_id) else {
            self.reply_not_logged_in(conn_id).await;
            return;
        };
        let word = match self.files.offer(&name, &name) {
            SaveOutcome::Accepted(path) => {
                info!("{by} offered file {name}, saving to {}", path.display());
                files::reply::RECEIVING
            }
            SaveOutcome::AlreadyExists => files::reply::EXISTS,
        };
        self.send_to_conn(conn_id, Envelope::server(word, kind::SEND_FILE))
            .await;
    }

    async fn reply_not_logged_in(&mut self, conn_id: ConnId) {
        self.send_to_conn(conn_id, Envelope::server_text("Please log in first."))
            .await;
    }

    /// Command dispatch: authorize by the issuing connection's session and
    /// apply the effects the engine produces.
    async fn handle_command_line(&mut self, conn_id: ConnId, line: String) {
        let Some(sender) = self.active_session_name(conn_id) else {
            self.reply_not_logged_in(conn_id).await;
            return;
        };
        let effects = Engine {
            directory: &mut self.directory,
            options: &mut self.options,
            store: &self.store,
        }
        .execute(&sender, &line);
        self.apply_effects(conn_id, effects).await;
    }

    async fn apply_effects(&mut self, issuer: ConnId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Reply(envelope) => {
                    self.send_to_conn(issuer, envelope).await;
                }
                Effect::DirectTo(name, envelope) => {
                    if let Some(conn) = self.directory.lookup(&name).map(|s| s.conn) {
                        self.send_to_conn(conn, envelope).await;
                    }
                }
                Effect::Broadcast(envelope) => {
                    let conns: Vec<ConnId> = self.directory.sessions().map(|s| s.conn).collect();
                    for conn in conns {
                        self.send_to_conn(conn, envelope.clone()).await;
                    }
                }
                Effect::Kick { target, notice } => {
                    if let Some(conn) = self.directory.lookup(&target).map(|s| s.conn) {
                        self.send_to_conn(conn, notice).await;
                        self.teardown(conn).await;
                    }
                }
            }
        }
    }

    /// Spawn the blocking credential check for a `USER_NAME` frame.
    fn start_login(&mut self, conn_id: ConnId, payload: String) {
        let Some(client) = self.clients.get(&conn_id) else {
            return;
        };
        if client.state != ConnState::Authenticating {
            debug!("Login frame on already-active {conn_id} ignored");
            return;
        }
        let credentials = Credentials::parse(&payload);
        let store = Arc::clone(&self.store);
        let options = self.options.clone();
        let addr = client.addr;
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let decision =
                tokio::task::spawn_blocking(move || login::verify(&store, &options, &credentials, addr))
                    .await
                    .unwrap_or_else(|e| LoginDecision::Reject {
                        reason: format!("Login task failed: {e}"),
                    });
            // If the actor is gone the whole server is shutting down
            let _ = handle
                .send(ServerCommand::LoginResolved { conn_id, decision })
                .await;
        });
    }

    /// Commit (or reject) a resolved login on the actor task.
    async fn commit_login(&mut self, conn_id: ConnId, decision: LoginDecision) {
        let Some(client) = self.clients.get(&conn_id) else {
            // Connection closed while the check ran; drop the handoff
            debug!("Discarding login result for closed connection {conn_id}");
            return;
        };
        if client.state != ConnState::Authenticating {
            return;
        }
        let port = client.addr.port();

        let (name, permission) = match decision {
            LoginDecision::Reject { reason } => {
                self.refuse_login(conn_id, reason).await;
                return;
            }
            LoginDecision::Account { name, permission } => {
                if self.directory.name_taken(&name) {
                    self.refuse_login(
                        conn_id,
                        "This account is already logged in elsewhere.".to_string(),
                    )
                    .await;
                    return;
                }
                (name, permission)
            }
            LoginDecision::Guest { name } => {
                let resolved = login::resolve_name(&name, port, |candidate| {
                    self.directory.name_taken(candidate) || self.directory.room_exists(candidate)
                });
                (resolved, crate::types::Permission::User)
            }
        };

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        let session = Session::new(
            name.clone(),
            id,
            permission,
            conn_id,
            self.directory.default_room(),
        );
        if !self.directory.register_session(session) {
            // Truncation can reintroduce a collision; refuse rather than evict
            self.refuse_login(conn_id, "That name is already in use.".to_string())
                .await;
            return;
        }
        if let Some(client) = self.clients.get_mut(&conn_id) {
            client.state = ConnState::Active;
            client.session_name = Some(name.clone());
        }

        self.send_to_conn(
            conn_id,
            Envelope::server(self.directory.default_room().to_string(), kind::DEFAULT_ROOM),
        )
        .await;
        self.broadcast_user_manifest().await;
        info!("{name} logged in (session {id})");
    }

    async fn refuse_login(&mut self, conn_id: ConnId, reason: String) {
        info!("Login on {conn_id} refused: {reason}");
        self.send_to_conn(conn_id, Envelope::server(reason, kind::KICK_NOTICE))
            .await;
        self.teardown(conn_id).await;
    }

    /// Spawn the blocking account insert for a `REGISTER` frame.
    fn start_register(&mut self, conn_id: ConnId, payload: String) {
        let Some(client) = self.clients.get(&conn_id) else {
            return;
        };
        if client.state != ConnState::Authenticating {
            return;
        }
        let credentials = Credentials::parse(&payload);
        // Registering a name currently in use by an active session would
        // let the next login shadow it
        if self.directory.name_taken(&credentials.user) {
            let handle = self.handle.clone();
            tokio::spawn(async move {
                let _ = handle
                    .send(ServerCommand::RegisterResolved {
                        conn_id,
                        result: Err("That name is currently online.".to_string()),
                    })
                    .await;
            });
            return;
        }
        let store = Arc::clone(&self.store);
        let options = self.options.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || login::register(&store, &options, &credentials))
                    .await
                    .unwrap_or_else(|e| Err(format!("Registration task failed: {e}")));
            let _ = handle
                .send(ServerCommand::RegisterResolved { conn_id, result })
                .await;
        });
    }

    /// Registration always answers and then closes the connection; the
    /// client reconnects to log in.
    async fn finish_register(&mut self, conn_id: ConnId, result: Result<(), String>) {
        if !self.clients.contains_key(&conn_id) {
            return;
        }
        let message = match &result {
            Ok(()) => "successful".to_string(),
            Err(reason) => format!("failed: {reason}"),
        };
        info!("Registration on {conn_id}: {message}");
        self.send_to_conn(conn_id, Envelope::server(message, kind::REGISTER_RESULT))
            .await;
        self.teardown(conn_id).await;
    }

    /// Tear down one connection: forget the client, drop its session,
    /// tell everyone else, release the transport. Idempotent - error
    /// paths and normal disconnect both land here.
    async fn teardown(&mut self, conn_id: ConnId) {
        let Some(mut client) = self.clients.remove(&conn_id) else {
            return;
        };
        client.state = ConnState::Closing;
        let removed = self.directory.remove_by_conn(conn_id);
        client.close().await;
        client.state = ConnState::Closed;
        if let Some(session) = removed {
            info!("Connection closed: {} ({})", client.addr, session.name);
            self.broadcast_user_manifest().await;
        } else {
            info!("Connection closed: {}", client.addr);
        }
    }

    /// Send the current user manifest to every active session.
    async fn broadcast_user_manifest(&mut self) {
        let users = self.directory.list_usernames();
        let body = serde_json::to_string(&users).unwrap_or_else(|_| "[]".to_string());
        let envelope = Envelope::new(
            body,
            SERVER_NAME,
            self.directory.default_room(),
            kind::USER_MANIFEST,
        );
        let conns: Vec<ConnId> = self.directory.sessions().map(|s| s.conn).collect();
        for conn in conns {
            self.send_to_conn(conn, envelope.clone()).await;
        }
    }

    fn active_session_name(&self, conn_id: ConnId) -> Option<String> {
        let client = self.clients.get(&conn_id)?;
        if client.state != ConnState::Active {
            return None;
        }
        client.session_name.clone()
    }

    async fn send_to_conn(&self, conn_id: ConnId, envelope: Envelope) {
        if let Some(client) = self.clients.get(&conn_id) {
            if client.send(envelope).await.is_err() {
                // Writer task gone; the Disconnect command is on its way
                debug!("Send to {conn_id} failed, writer closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::store::hash_password;

    struct Harness {
        cmd_tx: mpsc::Sender<ServerCommand>,
        store: Arc<AccountStore>,
        _dir: tempfile::TempDir,
    }

    struct TestConn {
        id: ConnId,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Harness {
        fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = ServerConfig {
                default_room: "Lobby".to_string(),
                transcript_path: dir.path().join("record.txt"),
                files_dir: dir.path().join("files"),
                ..ServerConfig::default()
            };
            let store = Arc::new(AccountStore::open_in_memory().unwrap());
            let (cmd_tx, cmd_rx) = mpsc::channel(256);
            let server = ChatServer::new(&config, Arc::clone(&store), cmd_rx, cmd_tx.clone());
            tokio::spawn(server.run());
            Self {
                cmd_tx,
                store,
                _dir: dir,
            }
        }

        async fn connect(&self, port: u16) -> TestConn {
            let conn_id = ConnId::new();
            let (tx, rx) = mpsc::channel(64);
            self.cmd_tx
                .send(ServerCommand::Connect {
                    conn_id,
                    addr: format!("127.0.0.1:{port}").parse().unwrap(),
                    sender: tx,
                })
                .await
                .unwrap();
            TestConn { id: conn_id, rx }
        }

        async fn frame(&self, conn: &TestConn, message: Inbound) {
            self.cmd_tx
                .send(ServerCommand::Frame {
                    conn_id: conn.id,
                    message,
                })
                .await
                .unwrap();
        }

        /// Guest login and drain the DEFAULT_ROOM + own USER_MANIFEST frames.
        async fn login_guest(&self, conn: &mut TestConn, name: &str) {
            self.frame(
                conn,
                Inbound::UserName {
                    payload: name.to_string(),
                },
            )
            .await;
            let default_room = recv_envelope(conn).await;
            assert_eq!(default_room.kind, kind::DEFAULT_ROOM);
            let manifest = recv_envelope(conn).await;
            assert_eq!(manifest.kind, kind::USER_MANIFEST);
        }
    }

    async fn recv_outbound(conn: &mut TestConn) -> Outbound {
        timeout(Duration::from_secs(2), conn.rx.recv())
            .await
            .expect("timed out waiting for outbound")
            .expect("connection channel closed")
    }

    async fn recv_envelope(conn: &mut TestConn) -> Envelope {
        match recv_outbound(conn).await {
            Outbound::Frame(envelope) => envelope,
            Outbound::Close => panic!("unexpected close"),
        }
    }

    fn manifest_names(envelope: &Envelope) -> Vec<String> {
        serde_json::from_str(&envelope.message).unwrap()
    }

    #[tokio::test]
    async fn test_two_logins_share_manifest_in_join_order() {
        let harness = Harness::start();
        let mut alice = harness.connect(40001).await;
        let mut bob = harness.connect(40002).await;

        harness.login_guest(&mut alice, "alice").await;
        harness.login_guest(&mut bob, "bob").await;

        // alice sees the refreshed manifest from bob's login
        let update = recv_envelope(&mut alice).await;
        assert_eq!(update.kind, kind::USER_MANIFEST);
        assert_eq!(update.by, SERVER_NAME);
        assert_eq!(manifest_names(&update), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_room_create_denied_for_user_through_actor() {
        let harness = Harness::start();
        let mut alice = harness.connect(40003).await;
        harness.login_guest(&mut alice, "alice").await;

        harness
            .frame(
                &alice,
                Inbound::Command {
                    sender: "alice".to_string(),
                    line: "room create VIP".to_string(),
                },
            )
            .await;
        let denial = recv_envelope(&mut alice).await;
        assert!(denial.message.contains("permission"));
        // Repeating the join proves the room never appeared
        harness
            .frame(
                &alice,
                Inbound::Command {
                    sender: "alice".to_string(),
                    line: "room join VIP".to_string(),
                },
            )
            .await;
        let missing = recv_envelope(&mut alice).await;
        assert!(missing.message.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_ban_closes_session_and_blocks_relogin() {
        let harness = Harness::start();
        harness
            .store
            .create_account("alice", &hash_password("pw"), crate::types::Permission::User)
            .unwrap();

        let mut root = harness.connect(40004).await;
        let mut alice = harness.connect(40005).await;
        harness
            .frame(
                &root,
                Inbound::UserName {
                    payload: format!("root\r\n{}", hash_password("12345678")),
                },
            )
            .await;
        assert_eq!(recv_envelope(&mut root).await.kind, kind::DEFAULT_ROOM);
        assert_eq!(recv_envelope(&mut root).await.kind, kind::USER_MANIFEST);

        harness
            .frame(
                &alice,
                Inbound::UserName {
                    payload: format!("alice\r\n{}", hash_password("pw")),
                },
            )
            .await;
        assert_eq!(recv_envelope(&mut alice).await.kind, kind::DEFAULT_ROOM);
        assert_eq!(recv_envelope(&mut alice).await.kind, kind::USER_MANIFEST);
        // root sees alice join
        assert_eq!(recv_envelope(&mut root).await.kind, kind::USER_MANIFEST);

        harness
            .frame(
                &root,
                Inbound::Command {
                    sender: "root".to_string(),
                    line: "user ban alice".to_string(),
                },
            )
            .await;
        let notice = recv_envelope(&mut alice).await;
        assert_eq!(notice.kind, kind::KICK_NOTICE);
        assert!(matches!(recv_outbound(&mut alice).await, Outbound::Close));

        // A fresh connection with the original credentials is refused
        let mut again = harness.connect(40006).await;
        harness
            .frame(
                &again,
                Inbound::UserName {
                    payload: format!("alice\r\n{}", hash_password("pw")),
                },
            )
            .await;
        let refused = recv_envelope(&mut again).await;
        assert_eq!(refused.kind, kind::KICK_NOTICE);
        assert!(refused.message.contains("banned"));
        assert!(matches!(recv_outbound(&mut again).await, Outbound::Close));
    }

    #[tokio::test]
    async fn test_private_message_to_unknown_user_single_reply() {
        let harness = Harness::start();
        let mut bob = harness.connect(40007).await;
        harness.login_guest(&mut bob, "bob").await;

        harness
            .frame(
                &bob,
                Inbound::Text {
                    to: "nonexistent_user".to_string(),
                    by: "bob".to_string(),
                    time: crate::message::now(),
                    body: "hello?".to_string(),
                },
            )
            .await;
        let reply = recv_envelope(&mut bob).await;
        assert!(reply.message.contains("does not exist"));
        // Exactly one frame: nothing else queued
        assert!(timeout(Duration::from_millis(200), bob.rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_default_room_broadcast_reaches_everyone() {
        let harness = Harness::start();
        let mut alice = harness.connect(40008).await;
        let mut bob = harness.connect(40009).await;
        harness.login_guest(&mut alice, "alice").await;
        harness.login_guest(&mut bob, "bob").await;
        let _ = recv_envelope(&mut alice).await; // bob's manifest refresh

        harness
            .frame(
                &alice,
                Inbound::Text {
                    to: "Lobby".to_string(),
                    by: "alice".to_string(),
                    time: crate::message::now(),
                    body: "hi all".to_string(),
                },
            )
            .await;
        let at_bob = recv_envelope(&mut bob).await;
        assert_eq!(at_bob.message, "hi all");
        assert_eq!(at_bob.by, "alice");
        let at_alice = recv_envelope(&mut alice).await;
        assert_eq!(at_alice.message, "hi all");
    }

    #[tokio::test]
    async fn test_room_message_reaches_members_only() {
        let harness = Harness::start();
        let mut root = harness.connect(40010).await;
        let mut alice = harness.connect(40011).await;
        let mut bob = harness.connect(40012).await;
        harness
            .frame(
                &root,
                Inbound::UserName {
                    payload: format!("root\r\n{}", hash_password("12345678")),
                },
            )
            .await;
        assert_eq!(recv_envelope(&mut root).await.kind, kind::DEFAULT_ROOM);
        assert_eq!(recv_envelope(&mut root).await.kind, kind::USER_MANIFEST);
        harness.login_guest(&mut alice, "alice").await;
        let _ = recv_envelope(&mut root).await;
        harness.login_guest(&mut bob, "bob").await;
        let _ = recv_envelope(&mut root).await;
        let _ = recv_envelope(&mut alice).await;

        harness
            .frame(
                &root,
                Inbound::Command {
                    sender: "root".to_string(),
                    line: "room create VIP".to_string(),
                },
            )
            .await;
        let _ = recv_envelope(&mut root).await; // confirmation
        let _ = recv_envelope(&mut root).await; // room manifest
        harness
            .frame(
                &alice,
                Inbound::Command {
                    sender: "alice".to_string(),
                    line: "room join VIP".to_string(),
                },
            )
            .await;
        let _ = recv_envelope(&mut alice).await;
        let _ = recv_envelope(&mut alice).await;

        harness
            .frame(
                &alice,
                Inbound::Text {
                    to: "VIP".to_string(),
                    by: "alice".to_string(),
                    time: crate::message::now(),
                    body: "members only".to_string(),
                },
            )
            .await;
        let at_root = recv_envelope(&mut root).await;
        assert_eq!(at_root.message, "members only");
        assert_eq!(at_root.to, "VIP");
        let at_alice = recv_envelope(&mut alice).await;
        assert_eq!(at_alice.message, "members only");
        // bob never joined VIP and must see nothing
        assert!(timeout(Duration::from_millis(200), bob.rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_file_offer_reserves_once() {
        let harness = Harness::start();
        let mut alice = harness.connect(40013).await;
        harness.login_guest(&mut alice, "alice").await;

        harness
            .frame(
                &alice,
                Inbound::SendFile {
                    name: "cat.png".to_string(),
                },
            )
            .await;
        let accepted = recv_envelope(&mut alice).await;
        assert_eq!(accepted.kind, kind::SEND_FILE);
        assert_eq!(accepted.message, files::reply::RECEIVING);

        // A second offer of the same name must be refused
        harness
            .frame(
                &alice,
                Inbound::SendFile {
                    name: "cat.png".to_string(),
                },
            )
            .await;
        let refused = recv_envelope(&mut alice).await;
        assert_eq!(refused.message, files::reply::EXISTS);
    }

    #[tokio::test]
    async fn test_unauthenticated_frames_get_a_reply() {
        let harness = Harness::start();
        let mut stranger = harness.connect(40014).await;

        harness
            .frame(
                &stranger,
                Inbound::Text {
                    to: "Lobby".to_string(),
                    by: "stranger".to_string(),
                    time: crate::message::now(),
                    body: "hello".to_string(),
                },
            )
            .await;
        let reply = recv_envelope(&mut stranger).await;
        assert!(reply.message.contains("log in"));

        harness
            .frame(
                &stranger,
                Inbound::Command {
                    sender: "stranger".to_string(),
                    line: "room list".to_string(),
                },
            )
            .await;
        let reply = recv_envelope(&mut stranger).await;
        assert!(reply.message.contains("log in"));
        // The connection stays open for a later login
        harness.login_guest(&mut stranger, "late").await;
    }

    #[tokio::test]
    async fn test_duplicate_guest_name_gets_port_suffix() {
        let harness = Harness::start();
        let mut first = harness.connect(41000).await;
        let mut second = harness.connect(41001).await;
        harness.login_guest(&mut first, "dup").await;

        harness
            .frame(
                &second,
                Inbound::UserName {
                    payload: "dup".to_string(),
                },
            )
            .await;
        assert_eq!(recv_envelope(&mut second).await.kind, kind::DEFAULT_ROOM);
        let manifest = recv_envelope(&mut second).await;
        assert_eq!(manifest_names(&manifest), vec!["dup", "dup41001"]);
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_manifest_and_is_idempotent() {
        let harness = Harness::start();
        let mut alice = harness.connect(41002).await;
        let mut bob = harness.connect(41003).await;
        harness.login_guest(&mut alice, "alice").await;
        harness.login_guest(&mut bob, "bob").await;
        let _ = recv_envelope(&mut alice).await;

        harness
            .cmd_tx
            .send(ServerCommand::Disconnect { conn_id: bob.id })
            .await
            .unwrap();
        // Double disconnect must not disturb the remaining session
        harness
            .cmd_tx
            .send(ServerCommand::Disconnect { conn_id: bob.id })
            .await
            .unwrap();

        let manifest = recv_envelope(&mut alice).await;
        assert_eq!(manifest.kind, kind::USER_MANIFEST);
        assert_eq!(manifest_names(&manifest), vec!["alice"]);
        assert!(timeout(Duration::from_millis(200), alice.rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_login_result_for_closed_connection_discarded() {
        let harness = Harness::start();
        let alice = harness.connect(41004).await;
        let mut bob = harness.connect(41005).await;
        harness.login_guest(&mut bob, "bob").await;

        // The connection disappears before the login worker reports back
        harness
            .cmd_tx
            .send(ServerCommand::Disconnect { conn_id: alice.id })
            .await
            .unwrap();
        harness
            .cmd_tx
            .send(ServerCommand::LoginResolved {
                conn_id: alice.id,
                decision: LoginDecision::Guest {
                    name: "ghost".to_string(),
                },
            })
            .await
            .unwrap();

        // No manifest refresh: the ghost session was never registered
        assert!(timeout(Duration::from_millis(200), bob.rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_registration_replies_and_closes() {
        let harness = Harness::start();
        let mut carol = harness.connect(41006).await;
        harness
            .frame(
                &carol,
                Inbound::Register {
                    payload: format!("carol\r\n{}", hash_password("pw")),
                },
            )
            .await;
        let result = recv_envelope(&mut carol).await;
        assert_eq!(result.kind, kind::REGISTER_RESULT);
        assert_eq!(result.message, "successful");
        assert!(matches!(recv_outbound(&mut carol).await, Outbound::Close));

        // Poll until the blocking insert is visible
        timeout(Duration::from_secs(2), async {
            loop {
                if harness.store.get_account("carol").unwrap().is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
