use anyhow::{
    Error,
    Result,
};
use log::{
    error,
    info,
    trace,
};
use tokio::sync::{
    broadcast::{
        self,
        error::RecvError,
    },
    mpsc::{
        UnboundedReceiver,
        UnboundedSender,
        unbounded_channel,
    },
};
use uuid::Uuid;

use crate::{
    core::service::Service,
    message::message::Message,
    router::{
        context::RouterContext,
        session::Session,
    },
};

/// A connection from a router to a client.
///
/// On its own, a connection is not very meaningful. When started, it uses a WAMP [`Service`] to
/// send and receive messages on an underlying transport. Messages are used to set up and manage a
/// [`Session`], which handles all interactions with the router. When a session closes cleanly,
/// the connection survives and a fresh session may be established over it.
pub struct Connection {
    uuid: Uuid,
}

impl Connection {
    /// Creates a new connection.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
        }
    }

    /// The unique identifier of the connection.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    // Starts the connection on the runtime.
    pub fn start<S>(self, context: RouterContext<S>, service: Service)
    where
        S: Send + 'static,
    {
        tokio::spawn(self.run(context, service));
    }

    async fn run<S>(self, context: RouterContext<S>, service: Service)
    where
        S: Send + 'static,
    {
        let message_rx = service.message_rx();
        let end_rx = service.end_rx();

        let service_handle = service.start();
        loop {
            match self
                .run_session(
                    &context,
                    service_handle.message_tx(),
                    message_rx.resubscribe(),
                    end_rx.resubscribe(),
                )
                .await
            {
                Ok(done) => {
                    if !done {
                        continue;
                    }
                }
                Err(err) => {
                    error!("Failed to run session for connection {}: {err:#}", self.uuid);
                }
            }

            info!("Connection {} will have no more sessions", self.uuid);
            break;
        }

        // The service may already be gone if the transport closed first.
        service_handle.cancel().ok();

        if let Err(err) = service_handle.join().await {
            error!("Failed to join service for connection {}: {err}", self.uuid);
        }
    }

    async fn run_session<S>(
        &self,
        context: &RouterContext<S>,
        service_message_tx: UnboundedSender<Message>,
        service_message_rx: broadcast::Receiver<Message>,
        end_rx: broadcast::Receiver<()>,
    ) -> Result<bool>
    where
        S: Send + 'static,
    {
        let (message_tx, message_rx) = unbounded_channel();
        let mut session = Session::new(self.uuid, message_tx, service_message_tx);

        info!("Starting session for connection {}", self.uuid);

        let done = self
            .session_loop(
                context,
                &mut session,
                message_rx,
                service_message_rx,
                end_rx,
            )
            .await;
        session.clean_up(context).await;
        done
    }

    async fn session_loop<S>(
        &self,
        context: &RouterContext<S>,
        session: &mut Session,
        mut message_rx: UnboundedReceiver<Message>,
        mut service_message_rx: broadcast::Receiver<Message>,
        mut end_rx: broadcast::Receiver<()>,
    ) -> Result<bool>
    where
        S: Send + 'static,
    {
        let mut router_end_rx = context.router().end_rx();
        loop {
            tokio::select! {
                // Received a message from some part of the router.
                message = message_rx.recv() => {
                    let message = match message {
                        Some(message) => message,
                        None => return Err(Error::msg("failed to receive message from connection channel")),
                    };
                    if session.closed() {
                        // No message is delivered on a closed session.
                        trace!("Dropped {} message for closed session on connection {}", message.message_name(), self.uuid);
                        continue;
                    }
                    let message_name = message.message_name();
                    if let Err(err) = session.send_message(message) {
                        return Err(err.context(format!("failed to send {message_name} message")));
                    }
                }
                // Received a message from the peer, through the service.
                message = service_message_rx.recv() => {
                    let message = match message {
                        Ok(message) => message,
                        Err(RecvError::Closed) => return Ok(true),
                        Err(err) => return Err(Error::new(err).context("failed to receive message")),
                    };
                    let message_name = message.message_name();
                    if let Err(err) = session.handle_message(context, message).await {
                        return Err(err.context(format!("failed to handle {message_name} message")));
                    }
                }
                // Service ended, which is unexpected.
                //
                // The service is intended to wrap the session's entire lifecycle.
                _ = end_rx.recv() => return Err(Error::msg("service ended abruptly")),
                // Router ended, which is unexpected.
                //
                // The router should shut down realms and sessions, which sends GOODBYE to
                // downstream clients, and sessions would exit cleanly before this fires.
                _ = router_end_rx.recv() => return Err(Error::msg("router ended abruptly")),
            }

            if session.closed() {
                // This session is over; the connection may host another.
                return Ok(false);
            }
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
