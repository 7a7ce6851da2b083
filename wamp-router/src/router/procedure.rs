use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use log::trace;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
};

use crate::{
    core::{
        cancel::CallCancelMode,
        error::{
            BasicError,
            InteractionError,
        },
        hash::HashMap,
        id::Id,
        invocation_policy::InvocationPolicy,
        match_style::MatchStyle,
        options::{
            CallOptions,
            CancelOptions,
            RegisterOptions,
            YieldOptions,
        },
        roles::RouterRole,
        types::{
            Dictionary,
            Value,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::{
        CallMessage,
        CancelMessage,
        ErrorMessage,
        InterruptMessage,
        InvocationMessage,
        Message,
        ResultMessage,
        YieldMessage,
        tags,
    },
    router::{
        context::RealmContext,
        pattern::{
            UriTrie,
            parse_pattern,
            wildcard_matches,
            wildcard_patterns_overlap,
        },
        realm::RealmSession,
    },
};

/// The identity of a registration: the pattern it was created under, plus
/// the match style that interprets the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcedureKey {
    pub style: Option<MatchStyle>,
    pub uri: WildcardUri,
}

/// A procedure that can be invoked by peers to perform some operation on the
/// callee.
pub struct Procedure {
    registration: Id,
    key: ProcedureKey,
    callee: Arc<RealmSession>,
}

#[derive(Clone)]
struct RegistrationRecord {
    callee: Id,
    key: ProcedureKey,
}

// Pending calls are keyed by (callee session, invocation id), the pair the
// callee echoes back in YIELD and ERROR.
type InvocationKey = (Id, Id);

// One outstanding call, correlating the caller's request with the callee's
// invocation. Exactly one terminal RESULT or ERROR reaches the caller;
// whichever settlement path gets there first removes the entry, and every
// later signal finds nothing and is dropped.
struct PendingCall {
    caller: Arc<RealmSession>,
    caller_request: Id,
    callee: Arc<RealmSession>,
    receive_progress: bool,
    // A kill-mode INTERRUPT went out; the caller is waiting on the callee.
    interrupted: bool,
    timeout: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ProcedureTables {
    exact: HashMap<WildcardUri, Arc<Procedure>>,
    prefix: UriTrie<Arc<Procedure>>,
    wildcard: HashMap<WildcardUri, Arc<Procedure>>,
    registrations: HashMap<Id, RegistrationRecord>,
    pending: HashMap<InvocationKey, PendingCall>,
    calls: HashMap<(Id, Id), InvocationKey>,
}

impl ProcedureTables {
    fn insert_procedure(&mut self, procedure: Arc<Procedure>) {
        let uri = procedure.key.uri.clone();
        match procedure.key.style {
            None => {
                self.exact.insert(uri, procedure);
            }
            Some(MatchStyle::Prefix) => {
                self.prefix.insert(&uri, procedure);
            }
            Some(MatchStyle::Wildcard) => {
                self.wildcard.insert(uri, procedure);
            }
        }
    }

    fn remove_procedure(&mut self, key: &ProcedureKey) {
        match key.style {
            None => {
                self.exact.remove(&key.uri);
            }
            Some(MatchStyle::Prefix) => {
                self.prefix.remove(&key.uri);
            }
            Some(MatchStyle::Wildcard) => {
                self.wildcard.remove(&key.uri);
            }
        }
    }

    // Picks the one registration a call resolves to: exact beats prefix
    // beats wildcard, and ties within a policy go to the lowest
    // registration ID.
    fn resolve(&self, uri: &Uri) -> Option<Arc<Procedure>> {
        if let Some(procedure) = self.exact.get(&WildcardUri::from(uri.clone())) {
            return Some(procedure.clone());
        }
        if let Some(procedure) = self
            .prefix
            .matches(uri)
            .into_iter()
            .min_by_key(|procedure| procedure.registration)
        {
            return Some(procedure.clone());
        }
        self.wildcard
            .iter()
            .filter(|(pattern, _)| wildcard_matches(pattern, uri))
            .map(|(_, procedure)| procedure)
            .min_by_key(|procedure| procedure.registration)
            .cloned()
    }

    // Does the pattern overlap a live registration of the same match style?
    // Overlap across styles (and with exact registrations) is allowed;
    // resolution precedence picks the winner per call.
    fn pattern_conflicts(&self, style: MatchStyle, uri: &WildcardUri) -> bool {
        match style {
            MatchStyle::Prefix => self.prefix.overlaps(uri),
            MatchStyle::Wildcard => self
                .wildcard
                .keys()
                .any(|wildcard| wildcard_patterns_overlap(uri, wildcard)),
        }
    }

    // Settles a pending call: exactly one settlement wins, later signals
    // find nothing. Disarms the call's timeout.
    fn settle(&mut self, key: InvocationKey) -> Option<PendingCall> {
        let pending = self.pending.remove(&key)?;
        self.calls
            .remove(&(pending.caller.id(), pending.caller_request));
        if let Some(timeout) = &pending.timeout {
            timeout.abort();
        }
        Some(pending)
    }
}

fn interrupt_message(invocation: Id, mode: CallCancelMode) -> Message {
    Message::Interrupt(InterruptMessage {
        invocation_request: invocation,
        options: Dictionary::from_iter([("mode".to_owned(), Value::from(String::from(mode)))]),
    })
}

fn call_error(request: Id, error: InteractionError, details: Dictionary) -> Message {
    Message::Error(ErrorMessage {
        request_type: tags::CALL,
        request,
        details,
        error: Uri::from_known(format!("wamp.error.{}", error.uri_component())),
        ..Default::default()
    })
}

/// A manager for all registrations and pending calls owned by a realm.
#[derive(Default)]
pub struct ProcedureManager {
    tables: Mutex<ProcedureTables>,
}

impl ProcedureManager {
    fn require_dealer<S>(context: &RealmContext<'_, S>) -> Result<()> {
        if !context.router().config.roles.contains(&RouterRole::Dealer) {
            return Err(BasicError::NotAllowed("router is not a dealer".to_owned()).into());
        }
        Ok(())
    }

    /// Registers a procedure for the session.
    ///
    /// At most one registration may exist per exact procedure URI, and a
    /// patterned registration may not overlap another patterned one.
    pub async fn register<S>(
        context: &RealmContext<'_, S>,
        session: &Arc<RealmSession>,
        procedure: &str,
        options: &RegisterOptions,
    ) -> Result<Id> {
        Self::require_dealer(context)?;
        if options.invoke != InvocationPolicy::Single {
            return Err(BasicError::InvalidArgument(format!(
                "invocation policy {} is not routed",
                <&str>::from(options.invoke)
            ))
            .into());
        }
        let style = options.match_style;
        let uri = parse_pattern(procedure, style)?;
        context
            .router()
            .rpc_policies
            .validate_registration(context, session.id(), &uri)
            .await?;

        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let conflict = match style {
            None => tables.exact.contains_key(&uri),
            Some(style) => tables.pattern_conflicts(style, &uri),
        };
        if conflict {
            return Err(InteractionError::ProcedureAlreadyExists.into());
        }

        let registration = context.realm().next_resource_id().await;
        let key = ProcedureKey { style, uri };
        tables.insert_procedure(Arc::new(Procedure {
            registration,
            key: key.clone(),
            callee: session.clone(),
        }));
        tables.registrations.insert(
            registration,
            RegistrationRecord {
                callee: session.id(),
                key,
            },
        );
        Ok(registration)
    }

    /// Releases a registration owned by the session.
    ///
    /// In-flight invocations continue; no new calls are routed to the
    /// registration.
    pub async fn unregister<S>(
        context: &RealmContext<'_, S>,
        session: Id,
        registration: Id,
    ) -> Result<()> {
        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let record = match tables.registrations.get(&registration) {
            Some(record) if record.callee == session => record.clone(),
            _ => return Err(InteractionError::NoSuchRegistration.into()),
        };
        tables.registrations.remove(&registration);
        tables.remove_procedure(&record.key);
        Ok(())
    }

    /// Routes a call to the matching registration's callee as a fresh
    /// invocation.
    pub async fn call<S>(
        context: &RealmContext<'_, S>,
        caller: &Arc<RealmSession>,
        message: &CallMessage,
        options: &CallOptions,
    ) -> Result<()>
    where
        S: Send + 'static,
    {
        Self::require_dealer(context)?;
        let uri = Uri::try_from(message.procedure.as_str()).map_err(Error::new)?;
        context
            .router()
            .rpc_policies
            .validate_call(context, caller.id(), &uri)
            .await?;

        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let procedure = tables
            .resolve(&uri)
            .ok_or(InteractionError::NoSuchProcedure)?;

        let call_key = (caller.id(), message.request);
        if tables.calls.contains_key(&call_key) {
            return Err(InteractionError::ProtocolViolation(format!(
                "request id {} is already in flight",
                message.request
            ))
            .into());
        }

        let invocation = procedure.callee.next_invocation_id().await;
        let invocation_key = (procedure.callee.id(), invocation);

        let mut details = Dictionary::default();
        if procedure.key.style.is_some() {
            // Patterned callees learn the concrete procedure.
            details.insert("procedure".to_owned(), Value::String(uri.to_string()));
        }
        if options.receive_progress {
            details.insert("receive_progress".to_owned(), Value::Bool(true));
        }
        if options.disclose_me {
            details.insert("caller".to_owned(), Value::Integer(caller.id().into()));
        }

        tables.pending.insert(
            invocation_key,
            PendingCall {
                caller: caller.clone(),
                caller_request: message.request,
                callee: procedure.callee.clone(),
                receive_progress: options.receive_progress,
                interrupted: false,
                timeout: None,
            },
        );
        tables.calls.insert(call_key, invocation_key);

        procedure.callee.send_message(Message::Invocation(InvocationMessage {
            request: invocation,
            registered_registration: procedure.registration,
            details,
            call_arguments: message.arguments.clone(),
            call_arguments_keyword: message.arguments_keyword.clone(),
        }));

        if let Some(timeout) = options.timeout {
            let router_context = context.router_context();
            let realm_uri = context.realm().uri().clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Ok(realm_context) = router_context.realm_context(&realm_uri) {
                    Self::timeout_call(&realm_context, invocation_key).await;
                }
            });
            if let Some(pending) = tables.pending.get_mut(&invocation_key) {
                pending.timeout = Some(handle);
            }
        }
        Ok(())
    }

    /// Forwards a YIELD from the callee to the caller as RESULT.
    ///
    /// A YIELD for an invocation that has already settled is dropped; that
    /// is the normal aftermath of skip-mode cancellation and timeouts.
    pub async fn yield_result<S>(
        context: &RealmContext<'_, S>,
        callee: Id,
        message: &YieldMessage,
    ) -> Result<()> {
        let options = YieldOptions::try_from(&message.options)?;
        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let key = (callee, message.invocation_request);

        if options.progress {
            let pending = match tables.pending.get(&key) {
                Some(pending) => pending,
                None => return Ok(()),
            };
            // Progressive frames toward a caller that did not ask for them
            // are dropped; the call stays open either way.
            if pending.receive_progress {
                pending.caller.send_message(Message::Result(ResultMessage {
                    call_request: pending.caller_request,
                    details: Dictionary::from_iter([("progress".to_owned(), Value::Bool(true))]),
                    yield_arguments: message.arguments.clone(),
                    yield_arguments_keyword: message.arguments_keyword.clone(),
                }));
            }
            return Ok(());
        }

        let pending = match tables.settle(key) {
            Some(pending) => pending,
            None => {
                trace!("Dropped YIELD for settled invocation {}", key.1);
                return Ok(());
            }
        };
        pending.caller.send_message(Message::Result(ResultMessage {
            call_request: pending.caller_request,
            details: Dictionary::default(),
            yield_arguments: message.arguments.clone(),
            yield_arguments_keyword: message.arguments_keyword.clone(),
        }));
        Ok(())
    }

    /// Forwards an invocation ERROR from the callee to the caller under the
    /// original request ID.
    pub async fn error_invocation<S>(
        context: &RealmContext<'_, S>,
        callee: Id,
        message: &ErrorMessage,
    ) -> Result<()> {
        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let key = (callee, message.request);
        let pending = match tables.settle(key) {
            Some(pending) => pending,
            None => {
                trace!("Dropped ERROR for settled invocation {}", key.1);
                return Ok(());
            }
        };
        pending.caller.send_message(Message::Error(ErrorMessage {
            request_type: tags::CALL,
            request: pending.caller_request,
            details: message.details.clone(),
            error: message.error.clone(),
            arguments: message.arguments.clone(),
            arguments_keyword: message.arguments_keyword.clone(),
        }));
        Ok(())
    }

    /// Cancels a pending call issued by the caller.
    ///
    /// A CANCEL for an unknown or already-settled call is dropped; the
    /// caller either already has its terminal response or never made the
    /// call.
    pub async fn cancel<S>(
        context: &RealmContext<'_, S>,
        caller: Id,
        message: &CancelMessage,
        options: &CancelOptions,
    ) -> Result<()> {
        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let key = match tables.calls.get(&(caller, message.call_request)) {
            Some(key) => *key,
            None => return Ok(()),
        };
        match options.mode {
            CallCancelMode::Skip => {
                if let Some(pending) = tables.settle(key) {
                    pending.caller.send_message(call_error(
                        pending.caller_request,
                        InteractionError::Canceled,
                        Dictionary::default(),
                    ));
                }
            }
            CallCancelMode::Kill => {
                if let Some(pending) = tables.pending.get_mut(&key) {
                    if !pending.interrupted {
                        pending.interrupted = true;
                        pending
                            .callee
                            .send_message(interrupt_message(key.1, CallCancelMode::Kill));
                    }
                }
            }
            CallCancelMode::KillNoWait => {
                if let Some(pending) = tables.settle(key) {
                    pending
                        .callee
                        .send_message(interrupt_message(key.1, CallCancelMode::KillNoWait));
                    pending.caller.send_message(call_error(
                        pending.caller_request,
                        InteractionError::Canceled,
                        Dictionary::default(),
                    ));
                }
            }
        }
        Ok(())
    }

    // Fires when a call's deadline passes: the callee is interrupted and
    // the caller gets its terminal error immediately, without waiting for
    // the callee to acknowledge.
    async fn timeout_call<S>(context: &RealmContext<'_, S>, key: InvocationKey) {
        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;
        let pending = match tables.settle(key) {
            Some(pending) => pending,
            None => return,
        };
        pending
            .callee
            .send_message(interrupt_message(key.1, CallCancelMode::KillNoWait));
        pending.caller.send_message(call_error(
            pending.caller_request,
            InteractionError::Timeout,
            Dictionary::default(),
        ));
    }

    /// Revokes the session's registrations and settles its pending calls,
    /// in both directions.
    pub async fn remove_session<S>(context: &RealmContext<'_, S>, session: Id) {
        let manager = &context.realm().procedure_manager;
        let mut tables = manager.tables.lock().await;

        let registrations = tables
            .registrations
            .iter()
            .filter(|(_, record)| record.callee == session)
            .map(|(registration, record)| (*registration, record.key.clone()))
            .collect::<Vec<_>>();
        for (registration, key) in registrations {
            tables.registrations.remove(&registration);
            tables.remove_procedure(&key);
        }

        let as_callee = tables
            .pending
            .iter()
            .filter(|((callee, _), _)| *callee == session)
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        for key in as_callee {
            if let Some(pending) = tables.settle(key) {
                if pending.caller.id() != session {
                    pending.caller.send_message(call_error(
                        pending.caller_request,
                        InteractionError::Canceled,
                        Dictionary::from_iter([(
                            "reason".to_owned(),
                            Value::from("callee_disconnect"),
                        )]),
                    ));
                }
            }
        }

        let as_caller = tables
            .pending
            .iter()
            .filter(|(_, pending)| pending.caller.id() == session)
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        for key in as_caller {
            if let Some(pending) = tables.settle(key) {
                pending
                    .callee
                    .send_message(interrupt_message(key.1, CallCancelMode::KillNoWait));
            }
        }
    }
}
