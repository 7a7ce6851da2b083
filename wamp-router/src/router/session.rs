use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use log::{
    debug,
    info,
    trace,
    warn,
};
use tokio::sync::{
    broadcast,
    mpsc::UnboundedSender,
};
use uuid::Uuid;

use crate::{
    core::{
        error::{
            BasicError,
            InteractionError,
            error_is_fatal,
        },
        hash::HashSet,
        id::Id,
        options::{
            CallOptions,
            CancelOptions,
            PublishOptions,
            RegisterOptions,
            SubscribeOptions,
        },
        roles::PeerRole,
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
    message::{
        common::{
            abort_message_for_error,
            error_for_request,
            goodbye_and_out,
        },
        message::{
            CallMessage,
            CancelMessage,
            ErrorMessage,
            HelloMessage,
            Message,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
            YieldMessage,
            tags,
        },
    },
    router::{
        context::{
            RealmContext,
            RouterContext,
        },
        procedure::ProcedureManager,
        realm::RealmSession,
        topic::TopicManager,
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Waiting for HELLO; nothing else is accepted.
    #[default]
    Opening,
    /// In a realm, routing messages.
    Established,
    /// GOODBYE sent or received; waiting for the closing handshake to
    /// finish.
    Closing,
    /// Terminal. No message is delivered on a closed session.
    Closed,
}

impl SessionState {
    fn allowed_state_transition(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Opening, Self::Established)
                | (Self::Opening, Self::Closed)
                | (Self::Established, Self::Closing)
                | (Self::Established, Self::Closed)
                | (Self::Closing, Self::Closed)
        )
    }
}

/// One session hosted by a connection.
///
/// Inbound messages are handled sequentially by the connection task, which
/// is what keeps the state machine simple. Outbound messages flow through
/// the service's channel in FIFO order.
pub struct Session {
    connection: Uuid,
    id: Option<Id>,
    realm: Option<Uri>,
    realm_session: Option<Arc<RealmSession>>,
    message_tx: UnboundedSender<Message>,
    service_message_tx: UnboundedSender<Message>,
    state: SessionState,

    closed_session_tx: broadcast::Sender<()>,
}

impl Session {
    pub fn new(
        connection: Uuid,
        message_tx: UnboundedSender<Message>,
        service_message_tx: UnboundedSender<Message>,
    ) -> Self {
        let (closed_session_tx, _) = broadcast::channel(16);
        Self {
            connection,
            id: None,
            realm: None,
            realm_session: None,
            message_tx,
            service_message_tx,
            state: SessionState::default(),
            closed_session_tx,
        }
    }

    pub fn closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    fn realm_session(&self) -> Result<Arc<RealmSession>> {
        self.realm_session
            .clone()
            .ok_or_else(|| BasicError::Internal("session is not in a realm".to_owned()).into())
    }

    fn realm_context<'c, S>(
        &self,
        context: &'c RouterContext<S>,
    ) -> Result<RealmContext<'c, S>> {
        let realm = self
            .realm
            .as_ref()
            .ok_or_else(|| BasicError::Internal("session is not in a realm".to_owned()))?;
        context.realm_context(realm)
    }

    /// Enqueues a message for the peer, driving the state machine for the
    /// session-ending messages.
    pub fn send_message(&mut self, message: Message) -> Result<()> {
        if self.closed() {
            return Err(Error::msg("session is closed"));
        }
        self.transition_state_from_sending_message(&message)?;
        self.service_message_tx.send(message).map_err(Error::new)
    }

    fn transition_state_from_sending_message(&mut self, message: &Message) -> Result<()> {
        let next_state = match message {
            Message::Abort(_) => SessionState::Closed,
            Message::Goodbye(_) => match self.state {
                SessionState::Closing => SessionState::Closed,
                _ => SessionState::Closing,
            },
            _ => return Ok(()),
        };
        self.transition_state(next_state)
    }

    pub async fn handle_message<S>(
        &mut self,
        context: &RouterContext<S>,
        message: Message,
    ) -> Result<()>
    where
        S: Send + 'static,
    {
        trace!(
            "Received {} message on connection {}: {message:?}",
            message.message_name(),
            self.connection
        );
        let result = match self.state {
            SessionState::Opening => self.handle_opening(context, &message).await,
            SessionState::Established => self.handle_established(context, &message).await,
            SessionState::Closing => self.handle_closing(context, &message).await,
            SessionState::Closed => Err(InteractionError::ProtocolViolation(format!(
                "received {} message on a closed session",
                message.message_name()
            ))
            .into()),
        };
        match result {
            Ok(()) => Ok(()),
            // Anything going wrong before the session is established, and
            // every protocol violation after, is fatal to the session.
            // Never to the router.
            Err(err) if self.state == SessionState::Opening || error_is_fatal(&err) => {
                self.send_message(abort_message_for_error(&err)).ok();
                Err(err)
            }
            Err(err) if Self::request_expects_response(&message) => {
                debug!(
                    "{} request on connection {} failed: {err:#}",
                    message.message_name(),
                    self.connection
                );
                self.send_message(error_for_request(&message, &err))
            }
            Err(err) => {
                // An application error with no request to answer, like a bad
                // unacknowledged PUBLISH. Dropped.
                debug!(
                    "Dropped failed {} message on connection {}: {err:#}",
                    message.message_name(),
                    self.connection
                );
                Ok(())
            }
        }
    }

    // Does the message warrant an ERROR frame when its handling fails?
    // PUBLISH is only answered when the publisher asked for an
    // acknowledgement.
    fn request_expects_response(message: &Message) -> bool {
        match message {
            Message::Subscribe(_)
            | Message::Unsubscribe(_)
            | Message::Register(_)
            | Message::Unregister(_)
            | Message::Call(_)
            | Message::Cancel(_) => true,
            Message::Publish(message) => matches!(
                message.options.get("acknowledge"),
                Some(Value::Bool(true))
            ),
            _ => false,
        }
    }

    async fn handle_opening<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &Message,
    ) -> Result<()> {
        match message {
            Message::Hello(message) => self.handle_hello(context, message).await,
            Message::Abort(_) => {
                warn!(
                    "Session on connection {} aborted by peer while opening",
                    self.connection
                );
                self.transition_state(SessionState::Closed)
            }
            _ => Err(InteractionError::ProtocolViolation(format!(
                "received {} message on an opening session",
                message.message_name()
            ))
            .into()),
        }
    }

    async fn handle_hello<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &HelloMessage,
    ) -> Result<()> {
        let realm_context = context.realm_context(&message.realm)?;
        let roles = Self::parse_roles(&message.details)?;
        context
            .router()
            .session_policies
            .authenticate(&realm_context, &message.details)
            .await?;

        let session = realm_context
            .realm()
            .add_session(
                context.router().id_allocator.as_ref(),
                roles,
                self.message_tx.clone(),
                self.closed_session_tx.clone(),
            )
            .await;
        let id = session.id();
        self.id = Some(id);
        self.realm = Some(message.realm.clone());
        self.realm_session = Some(session);
        info!("Session {} joined realm {}", id, message.realm);

        let mut details = Dictionary::default();
        details.insert(
            "agent".to_owned(),
            Value::String(context.router().config.agent.clone()),
        );
        details.insert(
            "roles".to_owned(),
            Value::Dictionary(
                context
                    .router()
                    .config
                    .roles
                    .iter()
                    .map(|role| {
                        (
                            role.key_for_details().to_owned(),
                            Value::Dictionary(Dictionary::default()),
                        )
                    })
                    .collect(),
            ),
        );

        self.send_message(Message::Welcome(WelcomeMessage {
            session: id,
            details,
        }))?;
        self.transition_state(SessionState::Established)
    }

    fn parse_roles(details: &Dictionary) -> Result<HashSet<PeerRole>> {
        match details.get("roles") {
            // Sessions that advertise nothing get every role; minimal
            // clients stay usable.
            None => Ok(HashSet::from_iter(PeerRole::ALL)),
            Some(Value::Dictionary(roles)) if roles.is_empty() => {
                Ok(HashSet::from_iter(PeerRole::ALL))
            }
            Some(Value::Dictionary(roles)) => roles
                .keys()
                .map(|key| {
                    PeerRole::from_key(key).ok_or_else(|| Error::from(InteractionError::NoSuchRole))
                })
                .collect(),
            Some(_) => Err(InteractionError::ProtocolViolation(
                "roles must be a dictionary".to_owned(),
            )
            .into()),
        }
    }

    async fn handle_established<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &Message,
    ) -> Result<()>
    where
        S: Send + 'static,
    {
        match message {
            Message::Abort(_) => {
                warn!(
                    "Session {:?} aborted by peer: {message:?}",
                    self.id
                );
                self.transition_state(SessionState::Closed)
            }
            Message::Goodbye(_) => {
                self.transition_state(SessionState::Closing)?;
                self.send_message(goodbye_and_out())
            }
            Message::Subscribe(message) => self.handle_subscribe(context, message).await,
            Message::Unsubscribe(message) => self.handle_unsubscribe(context, message).await,
            Message::Publish(message) => self.handle_publish(context, message).await,
            Message::Register(message) => self.handle_register(context, message).await,
            Message::Unregister(message) => self.handle_unregister(context, message).await,
            Message::Call(message) => self.handle_call(context, message).await,
            Message::Cancel(message) => self.handle_cancel(context, message).await,
            Message::Yield(message) => self.handle_yield(context, message).await,
            Message::Error(message) => self.handle_error(context, message).await,
            _ => Err(InteractionError::ProtocolViolation(format!(
                "received {} message on an established session",
                message.message_name()
            ))
            .into()),
        }
    }

    async fn handle_subscribe<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &SubscribeMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        if !session.has_role(PeerRole::Subscriber) {
            return Err(BasicError::NotAllowed("session is not a subscriber".to_owned()).into());
        }
        let options = SubscribeOptions::try_from(&message.options)?;
        let subscription =
            TopicManager::subscribe(&realm_context, &session, &message.topic, &options).await?;
        self.send_message(Message::Subscribed(SubscribedMessage {
            subscribe_request: message.request,
            subscription,
        }))
    }

    async fn handle_unsubscribe<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &UnsubscribeMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        TopicManager::unsubscribe(
            &realm_context,
            session.id(),
            message.subscribed_subscription,
        )
        .await?;
        self.send_message(Message::Unsubscribed(UnsubscribedMessage {
            unsubscribe_request: message.request,
        }))
    }

    async fn handle_publish<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &PublishMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        if !session.has_role(PeerRole::Publisher) {
            return Err(BasicError::NotAllowed("session is not a publisher".to_owned()).into());
        }
        let options = PublishOptions::try_from(&message.options)?;
        let publication = context.router().id_allocator.generate_id().await;
        let matched =
            TopicManager::publish(&realm_context, &session, publication, message, &options)
                .await?;
        debug!(
            "Publication {publication} on {} {}",
            message.topic,
            if matched { "matched" } else { "matched no topic" },
        );
        if options.acknowledge {
            self.send_message(Message::Published(PublishedMessage {
                publish_request: message.request,
                publication,
            }))?;
        }
        Ok(())
    }

    async fn handle_register<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &RegisterMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        if !session.has_role(PeerRole::Callee) {
            return Err(BasicError::NotAllowed("session is not a callee".to_owned()).into());
        }
        let options = RegisterOptions::try_from(&message.options)?;
        let registration =
            ProcedureManager::register(&realm_context, &session, &message.procedure, &options)
                .await?;
        self.send_message(Message::Registered(RegisteredMessage {
            register_request: message.request,
            registration,
        }))
    }

    async fn handle_unregister<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &UnregisterMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        ProcedureManager::unregister(
            &realm_context,
            session.id(),
            message.registered_registration,
        )
        .await?;
        self.send_message(Message::Unregistered(UnregisteredMessage {
            unregister_request: message.request,
        }))
    }

    async fn handle_call<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &CallMessage,
    ) -> Result<()>
    where
        S: Send + 'static,
    {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        if !session.has_role(PeerRole::Caller) {
            return Err(BasicError::NotAllowed("session is not a caller".to_owned()).into());
        }
        let options = CallOptions::try_from(&message.options)?;
        ProcedureManager::call(&realm_context, &session, message, &options).await
    }

    async fn handle_cancel<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &CancelMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        let options = CancelOptions::try_from(&message.options)?;
        ProcedureManager::cancel(&realm_context, session.id(), message, &options).await
    }

    async fn handle_yield<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &YieldMessage,
    ) -> Result<()> {
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        ProcedureManager::yield_result(&realm_context, session.id(), message).await
    }

    async fn handle_error<S>(
        &mut self,
        context: &RouterContext<S>,
        message: &ErrorMessage,
    ) -> Result<()> {
        if message.request_type != tags::INVOCATION {
            return Err(InteractionError::ProtocolViolation(format!(
                "received ERROR for unexpected request type {}",
                message.request_type
            ))
            .into());
        }
        let realm_context = self.realm_context(context)?;
        let session = self.realm_session()?;
        ProcedureManager::error_invocation(&realm_context, session.id(), message).await
    }

    async fn handle_closing<S>(
        &mut self,
        _: &RouterContext<S>,
        message: &Message,
    ) -> Result<()> {
        match message {
            Message::Goodbye(_) => self.transition_state(SessionState::Closed),
            // Anything else racing the closing handshake is dropped.
            _ => Ok(()),
        }
    }

    fn transition_state(&mut self, state: SessionState) -> Result<()> {
        if state == self.state {
            return Ok(());
        }

        if !self.state.allowed_state_transition(&state) {
            return Err(BasicError::Internal(format!(
                "invalid state transition from {:?} to {state:?}",
                self.state
            ))
            .into());
        }

        trace!(
            "Session on connection {} transitioned from {:?} to {state:?}",
            self.connection, self.state
        );
        self.state = state;

        if self.state == SessionState::Closed {
            // Nobody may be waiting; that's fine.
            self.closed_session_tx.send(()).ok();
        }

        Ok(())
    }

    /// Tears the session's router state down: the session leaves the realm
    /// table first, then its subscriptions, registrations, and pending
    /// calls are revoked under the respective manager locks.
    pub async fn clean_up<S>(&mut self, context: &RouterContext<S>) {
        let (id, realm) = match (self.id.take(), self.realm.take()) {
            (Some(id), Some(realm)) => (id, realm),
            _ => return,
        };
        self.realm_session = None;
        if let Ok(realm_context) = context.realm_context(&realm) {
            realm_context.realm().remove_session(id).await;
            TopicManager::remove_session(&realm_context, id).await;
            ProcedureManager::remove_session(&realm_context, id).await;
            info!("Session {id} left realm {realm}");
        }
        // Wake anything waiting on the session to close, even when the
        // transport died without a handshake.
        self.closed_session_tx.send(()).ok();
    }
}
