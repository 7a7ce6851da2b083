use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::future::join_all;
use log::trace;
use tokio::sync::{
    RwLock,
    broadcast,
    mpsc::UnboundedSender,
};

use crate::{
    core::{
        close::CloseReason,
        hash::{
            HashMap,
            HashSet,
        },
        id::{
            Id,
            IdAllocator,
            SequentialIdAllocator,
        },
        roles::PeerRole,
        uri::Uri,
    },
    message::{
        common::goodbye_with_close_reason,
        message::Message,
    },
    router::{
        procedure::ProcedureManager,
        topic::TopicManager,
    },
};

/// How long realm shutdown waits for sessions to finish their GOODBYE
/// handshakes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for a [`Realm`].
#[derive(Debug, Clone)]
pub struct RealmConfig {
    /// Human-readable name of the realm.
    pub name: String,
    /// The URI sessions join the realm under.
    pub uri: Uri,
    /// Topics that exist for the lifetime of the realm, even with no
    /// subscribers.
    pub persistent_topics: Vec<Uri>,
}

impl RealmConfig {
    pub fn new<N>(name: N, uri: Uri) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            uri,
            persistent_topics: Vec::default(),
        }
    }
}

/// A session as seen from inside a realm.
///
/// This is a set of back references, not ownership: the session itself is
/// owned by its connection task. Messages sent here are enqueued on the
/// session's outbound channel and delivered in FIFO order.
pub struct RealmSession {
    id: Id,
    roles: HashSet<PeerRole>,
    message_tx: UnboundedSender<Message>,
    closed_session_tx: broadcast::Sender<()>,
    invocation_ids: SequentialIdAllocator,
}

impl RealmSession {
    /// The session ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Did the session advertise the role when it joined?
    pub fn has_role(&self, role: PeerRole) -> bool {
        self.roles.contains(&role)
    }

    /// Enqueues a message for the session.
    ///
    /// The message is dropped if the session is already gone; routing to a
    /// dead session is not an error for the sender.
    pub fn send_message(&self, message: Message) {
        if self.message_tx.send(message).is_err() {
            trace!("Dropped message for session {}: channel closed", self.id);
        }
    }

    /// Allocates an invocation ID, unique within this session.
    pub async fn next_invocation_id(&self) -> Id {
        self.invocation_ids.generate_id().await
    }

    fn closed_rx(&self) -> broadcast::Receiver<()> {
        self.closed_session_tx.subscribe()
    }
}

/// An isolated routing namespace.
///
/// Subscriptions, registrations, and pending calls never cross realms.
pub struct Realm {
    config: RealmConfig,
    pub(crate) sessions: RwLock<HashMap<Id, Arc<RealmSession>>>,
    pub(crate) topic_manager: TopicManager,
    pub(crate) procedure_manager: ProcedureManager,
    resource_ids: SequentialIdAllocator,
}

impl Realm {
    pub fn new(config: RealmConfig) -> Self {
        let topic_manager = TopicManager::new(&config.persistent_topics);
        Self {
            config,
            sessions: RwLock::new(HashMap::default()),
            topic_manager,
            procedure_manager: ProcedureManager::default(),
            resource_ids: SequentialIdAllocator::default(),
        }
    }

    /// The URI sessions join the realm under.
    pub fn uri(&self) -> &Uri {
        &self.config.uri
    }

    /// The topic manager owning all live topics in the realm.
    pub fn topics(&self) -> &TopicManager {
        &self.topic_manager
    }

    /// Allocates an ID for a subscription or registration, unique within the
    /// realm.
    pub(crate) async fn next_resource_id(&self) -> Id {
        self.resource_ids.generate_id().await
    }

    /// Adds a session to the realm, drawing a session ID that does not
    /// collide with any active one.
    pub(crate) async fn add_session(
        &self,
        id_allocator: &dyn IdAllocator,
        roles: HashSet<PeerRole>,
        message_tx: UnboundedSender<Message>,
        closed_session_tx: broadcast::Sender<()>,
    ) -> Arc<RealmSession> {
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let id = id_allocator.generate_id().await;
            if !sessions.contains_key(&id) {
                break id;
            }
        };
        let session = Arc::new(RealmSession {
            id,
            roles,
            message_tx,
            closed_session_tx,
            invocation_ids: SequentialIdAllocator::default(),
        });
        sessions.insert(id, session.clone());
        session
    }

    /// Removes a session from the realm's session table.
    pub(crate) async fn remove_session(&self, id: Id) -> Option<Arc<RealmSession>> {
        self.sessions.write().await.remove(&id)
    }

    /// Shuts the realm down, asking every session to leave and waiting for
    /// the GOODBYE handshakes to finish.
    pub async fn shut_down(&self, close_reason: CloseReason) -> Result<()> {
        let sessions = self
            .sessions
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        let mut closed_rxs = Vec::default();
        for session in &sessions {
            closed_rxs.push(session.closed_rx());
            session.send_message(goodbye_with_close_reason(close_reason));
        }

        tokio::select! {
            _ = join_all(closed_rxs.iter_mut().map(|rx| rx.recv())) => {},
            _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
                return Err(Error::msg("timed out waiting for sessions to close cleanly"));
            }
        }

        Ok(())
    }
}

/// A manager for all realms owned by a router.
#[derive(Default)]
pub struct RealmManager {
    realms: HashMap<Uri, Arc<Realm>>,
}

impl RealmManager {
    pub fn get(&self, uri: &Uri) -> Option<Arc<Realm>> {
        self.realms.get(uri).cloned()
    }

    pub fn insert(&mut self, realm: Realm) {
        let uri = realm.uri().clone();
        self.realms.insert(uri, Arc::new(realm));
    }

    pub fn uris(&self) -> impl Iterator<Item = &Uri> {
        self.realms.keys()
    }
}
