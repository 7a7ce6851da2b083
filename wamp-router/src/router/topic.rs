use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use indexmap::IndexMap;
use log::{
    debug,
    trace,
};
use tokio::sync::{
    Mutex,
    broadcast,
};

use crate::{
    core::{
        error::InteractionError,
        hash::HashMap,
        id::Id,
        match_style::MatchStyle,
        options::{
            PublishOptions,
            SubscribeOptions,
        },
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
        EventMessage,
        Message,
        PublishMessage,
    },
    router::{
        context::RealmContext,
        pattern::{
            UriTrie,
            parse_pattern,
            wildcard_matches,
        },
        realm::RealmSession,
    },
};

/// The identity of a topic entry: the pattern it was created under, plus the
/// match style that interprets the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    pub style: Option<MatchStyle>,
    pub uri: WildcardUri,
}

/// An observable change to the set of live topic entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicEvent {
    /// A topic entry was created. Fires exactly once per entry.
    Created(TopicKey),
    /// A topic entry was destroyed after its last subscriber left.
    Removed(TopicKey),
}

struct TopicSubscriber {
    subscription: Id,
    session: Arc<RealmSession>,
}

#[derive(Default)]
struct TopicState {
    // Insertion order is delivery order, so this stays an IndexMap.
    subscribers: IndexMap<Id, TopicSubscriber>,
    publications: u64,
}

/// A single subscribable URI or pattern with its subscriber list.
pub struct Topic {
    key: TopicKey,
    persistent: bool,
    state: Mutex<TopicState>,
}

impl Topic {
    fn new(key: TopicKey, persistent: bool) -> Arc<Self> {
        Arc::new(Self {
            key,
            persistent,
            state: Mutex::new(TopicState::default()),
        })
    }
}

#[derive(Clone)]
struct SubscriptionRecord {
    session: Id,
    key: TopicKey,
}

#[derive(Default)]
struct TopicTables {
    exact: HashMap<WildcardUri, Arc<Topic>>,
    prefix: UriTrie<Arc<Topic>>,
    wildcard: HashMap<WildcardUri, Arc<Topic>>,
    subscriptions: HashMap<Id, SubscriptionRecord>,
}

impl TopicTables {
    fn get(&self, key: &TopicKey) -> Option<Arc<Topic>> {
        match key.style {
            None => self.exact.get(&key.uri).cloned(),
            Some(MatchStyle::Prefix) => self.prefix.get(&key.uri).cloned(),
            Some(MatchStyle::Wildcard) => self.wildcard.get(&key.uri).cloned(),
        }
    }

    fn get_or_create(&mut self, key: &TopicKey, persistent: bool) -> (Arc<Topic>, bool) {
        if let Some(topic) = self.get(key) {
            return (topic, false);
        }
        let topic = Topic::new(key.clone(), persistent);
        match key.style {
            None => {
                self.exact.insert(key.uri.clone(), topic.clone());
            }
            Some(MatchStyle::Prefix) => {
                self.prefix.insert(&key.uri, topic.clone());
            }
            Some(MatchStyle::Wildcard) => {
                self.wildcard.insert(key.uri.clone(), topic.clone());
            }
        }
        (topic, true)
    }

    // Removes the entry for the key, but only if it is still the same entry
    // that was passed in. Protects against tearing down an entry that was
    // concurrently recycled under the same URI.
    fn remove_if_same(&mut self, key: &TopicKey, topic: &Arc<Topic>) -> bool {
        let same = self
            .get(key)
            .map(|registered| Arc::ptr_eq(&registered, topic))
            .unwrap_or(false);
        if !same {
            return false;
        }
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
        true
    }
}

/// A manager for all topic entries owned by a realm.
///
/// One structural lock guards the three policy tables; each topic entry
/// carries its own lock for its subscriber list. Neither lock is held while
/// events are handed to session channels.
///
/// Reachable from outside the router through [`crate::router::RouterHandle`],
/// which exposes the topic event stream.
pub struct TopicManager {
    tables: Mutex<TopicTables>,
    event_tx: broadcast::Sender<TopicEvent>,
}

impl TopicManager {
    pub fn new(persistent_topics: &[Uri]) -> Self {
        let mut tables = TopicTables::default();
        for uri in persistent_topics {
            let key = TopicKey {
                style: None,
                uri: uri.clone().into(),
            };
            tables.get_or_create(&key, true);
        }
        let (event_tx, _) = broadcast::channel(16);
        Self {
            tables: Mutex::new(tables),
            event_tx,
        }
    }

    /// The stream of topic lifecycle events.
    pub fn topic_events(&self) -> broadcast::Receiver<TopicEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribes a session to a topic, creating the topic entry if this is
    /// its first subscriber.
    ///
    /// Subscribing again with the same topic and match style returns the
    /// existing subscription ID.
    pub async fn subscribe<S>(
        context: &RealmContext<'_, S>,
        session: &Arc<RealmSession>,
        topic: &str,
        options: &SubscribeOptions,
    ) -> Result<Id> {
        let style = options.match_style;
        let uri = parse_pattern(topic, style)?;
        context
            .router()
            .pub_sub_policies
            .validate_subscription(context, session.id(), &uri)
            .await?;

        let key = TopicKey { style, uri };
        let manager = &context.realm().topic_manager;
        let mut tables = manager.tables.lock().await;
        let (topic, created) = tables.get_or_create(&key, false);
        if created {
            debug!("Created topic {} in realm {}", key.uri, context.realm().uri());
            manager.event_tx.send(TopicEvent::Created(key.clone())).ok();
        }

        let mut state = topic.state.lock().await;
        if let Some(subscriber) = state.subscribers.get(&session.id()) {
            return Ok(subscriber.subscription);
        }
        let subscription = context.realm().next_resource_id().await;
        state.subscribers.insert(
            session.id(),
            TopicSubscriber {
                subscription,
                session: session.clone(),
            },
        );
        drop(state);

        tables.subscriptions.insert(
            subscription,
            SubscriptionRecord {
                session: session.id(),
                key,
            },
        );
        Ok(subscription)
    }

    /// Removes a subscription owned by the session.
    pub async fn unsubscribe<S>(
        context: &RealmContext<'_, S>,
        session: Id,
        subscription: Id,
    ) -> Result<()> {
        let manager = &context.realm().topic_manager;
        let mut tables = manager.tables.lock().await;
        let record = match tables.subscriptions.get(&subscription) {
            Some(record) if record.session == session => record.clone(),
            _ => return Err(InteractionError::NoSuchSubscription.into()),
        };
        tables.subscriptions.remove(&subscription);
        Self::remove_subscriber(manager, &mut tables, &record.key, session).await;
        Ok(())
    }

    async fn remove_subscriber(
        manager: &TopicManager,
        tables: &mut TopicTables,
        key: &TopicKey,
        session: Id,
    ) {
        let topic = match tables.get(key) {
            Some(topic) => topic,
            None => return,
        };
        let mut state = topic.state.lock().await;
        state.subscribers.shift_remove(&session);
        let empty = state.subscribers.is_empty();
        drop(state);

        if empty && !topic.persistent && tables.remove_if_same(key, &topic) {
            debug!("Removed empty topic {}", key.uri);
            manager.event_tx.send(TopicEvent::Removed(key.clone())).ok();
        }
    }

    /// Publishes an event to every subscriber of every matching topic entry.
    ///
    /// Returns true iff at least one topic entry matched. All receivers
    /// observe the same publication ID; within one entry, delivery follows
    /// subscription insertion order.
    pub async fn publish<S>(
        context: &RealmContext<'_, S>,
        publisher: &Arc<RealmSession>,
        publication: Id,
        message: &PublishMessage,
        options: &PublishOptions,
    ) -> Result<bool> {
        let uri = Uri::try_from(message.topic.as_str()).map_err(Error::new)?;
        context
            .router()
            .pub_sub_policies
            .validate_publication(context, publisher.id(), &uri)
            .await?;

        let manager = &context.realm().topic_manager;
        let tables = manager.tables.lock().await;
        let mut topics = Vec::new();
        if let Some(topic) = tables.exact.get(&WildcardUri::from(uri.clone())) {
            topics.push(topic.clone());
        }
        topics.extend(tables.prefix.matches(&uri).into_iter().cloned());
        topics.extend(
            tables
                .wildcard
                .iter()
                .filter(|(pattern, _)| wildcard_matches(pattern, &uri))
                .map(|(_, topic)| topic.clone()),
        );
        drop(tables);

        let matched = !topics.is_empty();
        for topic in topics {
            // Snapshot the subscriber list, then deliver without the lock.
            // Subscribers that arrive mid-publish catch the next publication.
            let mut state = topic.state.lock().await;
            state.publications += 1;
            trace!(
                "Topic {} routed its publication number {}",
                topic.key.uri, state.publications
            );
            let subscribers = state
                .subscribers
                .values()
                .map(|subscriber| (subscriber.subscription, subscriber.session.clone()))
                .collect::<Vec<_>>();
            drop(state);

            for (subscription, session) in subscribers {
                if options.exclude_me && session.id() == publisher.id() {
                    continue;
                }
                if let Some(exclude) = &options.exclude {
                    if exclude.contains(&session.id()) {
                        continue;
                    }
                }
                if let Some(eligible) = &options.eligible {
                    if !eligible.contains(&session.id()) {
                        continue;
                    }
                }
                let mut details = Dictionary::default();
                if topic.key.style.is_some() {
                    // Patterned subscribers learn the concrete topic.
                    details.insert("topic".to_owned(), Value::String(uri.to_string()));
                }
                if options.disclose_me {
                    details.insert("publisher".to_owned(), Value::Integer(publisher.id().into()));
                }
                session.send_message(Message::Event(EventMessage {
                    subscribed_subscription: subscription,
                    published_publication: publication,
                    details,
                    publish_arguments: message.arguments.clone(),
                    publish_arguments_keyword: message.arguments_keyword.clone(),
                }));
            }
        }
        Ok(matched)
    }

    /// Revokes every subscription owned by the session.
    ///
    /// Called during session teardown; holds the structural lock for the
    /// whole sweep so concurrent publishes see either all or none of the
    /// session's subscriptions.
    pub async fn remove_session<S>(context: &RealmContext<'_, S>, session: Id) {
        let manager = &context.realm().topic_manager;
        let mut tables = manager.tables.lock().await;
        let subscriptions = tables
            .subscriptions
            .iter()
            .filter(|(_, record)| record.session == session)
            .map(|(subscription, record)| (*subscription, record.key.clone()))
            .collect::<Vec<_>>();
        for (subscription, key) in subscriptions {
            tables.subscriptions.remove(&subscription);
            Self::remove_subscriber(manager, &mut tables, &key, session).await;
        }
    }
}
