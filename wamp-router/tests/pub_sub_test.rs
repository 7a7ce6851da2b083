use std::time::Duration;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    SinkExt,
    StreamExt,
};
use wamp_router::{
    core::{
        id::Id,
        stream::{
            MessageStream,
            StreamMessage,
        },
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::{
        HelloMessage,
        Message,
        PublishMessage,
        SubscribeMessage,
        UnsubscribeMessage,
    },
    router::{
        EmptyPubSubPolicies,
        EmptyRpcPolicies,
        EmptySessionPolicies,
        RealmConfig,
        RouterConfig,
        RouterHandle,
        TopicEvent,
        TopicKey,
        new_web_socket_router,
    },
};

const REALM: &str = "com.router.test";

async fn start_router_with_config(mut config: RouterConfig) -> Result<RouterHandle, Error> {
    config
        .realms
        .push(RealmConfig::new("test", Uri::try_from(REALM)?));
    let router = new_web_socket_router(
        config,
        Box::new(EmptyPubSubPolicies::default()),
        Box::new(EmptyRpcPolicies::default()),
        Box::new(EmptySessionPolicies::default()),
    )?;
    router.start().await
}

async fn start_router() -> Result<RouterHandle, Error> {
    start_router_with_config(RouterConfig::default()).await
}

struct TestPeer {
    stream: Box<dyn MessageStream>,
}

impl TestPeer {
    fn connect(router_handle: &RouterHandle) -> Self {
        Self {
            stream: router_handle.direct_connect().stream(),
        }
    }

    async fn send(&mut self, message: Message) {
        self.stream
            .send(StreamMessage::Message(message))
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Message {
        match tokio::time::timeout(Duration::from_secs(5), self.stream.next()).await {
            Ok(Some(Ok(StreamMessage::Message(message)))) => message,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    async fn expect_silence(&mut self) {
        assert_matches::assert_matches!(
            tokio::time::timeout(Duration::from_millis(100), self.stream.next()).await,
            Err(_)
        );
    }

    async fn join_realm(&mut self) -> Id {
        self.send(Message::Hello(HelloMessage {
            realm: Uri::try_from(REALM).unwrap(),
            details: Dictionary::default(),
        }))
        .await;
        match self.recv().await {
            Message::Welcome(message) => message.session,
            message => panic!("expected WELCOME, got {message:?}"),
        }
    }

    async fn subscribe(&mut self, request: u64, topic: &str, options: Dictionary) -> Id {
        self.send(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(request).unwrap(),
            options,
            topic: topic.to_owned(),
        }))
        .await;
        match self.recv().await {
            Message::Subscribed(message) => {
                assert_eq!(message.subscribe_request, Id::try_from(request).unwrap());
                message.subscription
            }
            message => panic!("expected SUBSCRIBED, got {message:?}"),
        }
    }

    async fn publish(
        &mut self,
        request: u64,
        topic: &str,
        options: Dictionary,
        arguments: List,
    ) {
        self.send(Message::Publish(PublishMessage {
            request: Id::try_from(request).unwrap(),
            options,
            topic: topic.to_owned(),
            arguments,
            arguments_keyword: Dictionary::default(),
        }))
        .await;
    }
}

fn acknowledge() -> Dictionary {
    Dictionary::from_iter([("acknowledge".to_owned(), Value::Bool(true))])
}

#[tokio::test]
async fn routes_publication_to_exact_subscriber() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    let mut bob = TestPeer::connect(&router_handle);
    alice.join_realm().await;
    bob.join_realm().await;

    let subscription = alice.subscribe(1, "com.x.greet", Dictionary::default()).await;

    bob.publish(
        2,
        "com.x.greet",
        acknowledge(),
        List::from_iter([Value::from("hi")]),
    )
    .await;
    let publication = match bob.recv().await {
        Message::Published(message) => {
            assert_eq!(message.publish_request, Id::try_from(2).unwrap());
            message.publication
        }
        message => panic!("expected PUBLISHED, got {message:?}"),
    };

    assert_matches::assert_matches!(alice.recv().await, Message::Event(message) => {
        assert_eq!(message.subscribed_subscription, subscription);
        assert_eq!(message.published_publication, publication);
        pretty_assertions::assert_eq!(message.publish_arguments, List::from_iter([Value::from("hi")]));
        // Exact matches do not disclose the topic.
        assert!(!message.details.contains_key("topic"));
    });
}

#[tokio::test]
async fn routes_publication_to_prefix_subscriber() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    let mut bob = TestPeer::connect(&router_handle);
    alice.join_realm().await;
    bob.join_realm().await;

    let subscription = alice
        .subscribe(
            1,
            "com.x",
            Dictionary::from_iter([("match".to_owned(), Value::from("prefix"))]),
        )
        .await;

    bob.publish(2, "com.x.y.z", acknowledge(), List::from_iter([Value::Integer(7)]))
        .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Published(_));

    assert_matches::assert_matches!(alice.recv().await, Message::Event(message) => {
        assert_eq!(message.subscribed_subscription, subscription);
        pretty_assertions::assert_eq!(message.publish_arguments, List::from_iter([Value::Integer(7)]));
        // Patterned subscribers learn the concrete topic.
        assert_matches::assert_matches!(message.details.get("topic"), Some(Value::String(topic)) => {
            assert_eq!(topic, "com.x.y.z");
        });
    });
}

#[tokio::test]
async fn routes_publication_to_wildcard_subscriber_on_equal_arity() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    let mut bob = TestPeer::connect(&router_handle);
    alice.join_realm().await;
    bob.join_realm().await;

    alice
        .subscribe(
            1,
            "com..created",
            Dictionary::from_iter([("match".to_owned(), Value::from("wildcard"))]),
        )
        .await;

    // Same arity, wildcard component filled in.
    bob.publish(2, "com.user.created", acknowledge(), List::default())
        .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Published(_));
    assert_matches::assert_matches!(alice.recv().await, Message::Event(_));

    // Arity mismatch never matches.
    bob.publish(3, "com.user.profile.created", acknowledge(), List::default())
        .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Published(_));
    alice.expect_silence().await;
}

#[tokio::test]
async fn excludes_publisher_from_its_own_event_by_default() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    alice.join_realm().await;

    alice.subscribe(1, "com.x.greet", Dictionary::default()).await;

    alice
        .publish(2, "com.x.greet", acknowledge(), List::default())
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Published(_));
    alice.expect_silence().await;

    // Opting out of exclude_me turns self-delivery back on.
    alice
        .publish(
            3,
            "com.x.greet",
            Dictionary::from_iter([
                ("acknowledge".to_owned(), Value::Bool(true)),
                ("exclude_me".to_owned(), Value::Bool(false)),
            ]),
            List::default(),
        )
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Published(_));
    assert_matches::assert_matches!(alice.recv().await, Message::Event(_));
}

#[tokio::test]
async fn filters_receivers_with_exclude_and_eligible() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    let mut bob = TestPeer::connect(&router_handle);
    let mut carol = TestPeer::connect(&router_handle);
    let mut dave = TestPeer::connect(&router_handle);
    let alice_session = alice.join_realm().await;
    let bob_session = bob.join_realm().await;
    carol.join_realm().await;
    dave.join_realm().await;

    alice.subscribe(1, "com.x.news", Dictionary::default()).await;
    bob.subscribe(1, "com.x.news", Dictionary::default()).await;
    carol.subscribe(1, "com.x.news", Dictionary::default()).await;

    // Only Alice is eligible.
    dave.publish(
        2,
        "com.x.news",
        Dictionary::from_iter([
            ("acknowledge".to_owned(), Value::Bool(true)),
            (
                "eligible".to_owned(),
                Value::List(List::from_iter([Value::Integer(alice_session.into())])),
            ),
        ]),
        List::default(),
    )
    .await;
    assert_matches::assert_matches!(dave.recv().await, Message::Published(_));
    assert_matches::assert_matches!(alice.recv().await, Message::Event(_));
    bob.expect_silence().await;
    carol.expect_silence().await;

    // Everyone but Bob.
    dave.publish(
        3,
        "com.x.news",
        Dictionary::from_iter([
            ("acknowledge".to_owned(), Value::Bool(true)),
            (
                "exclude".to_owned(),
                Value::List(List::from_iter([Value::Integer(bob_session.into())])),
            ),
        ]),
        List::default(),
    )
    .await;
    assert_matches::assert_matches!(dave.recv().await, Message::Published(_));
    assert_matches::assert_matches!(alice.recv().await, Message::Event(_));
    assert_matches::assert_matches!(carol.recv().await, Message::Event(_));
    bob.expect_silence().await;
}

#[tokio::test]
async fn discloses_publisher_on_request() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    let mut bob = TestPeer::connect(&router_handle);
    alice.join_realm().await;
    let bob_session = bob.join_realm().await;

    alice.subscribe(1, "com.x.greet", Dictionary::default()).await;

    bob.publish(
        2,
        "com.x.greet",
        Dictionary::from_iter([("disclose_me".to_owned(), Value::Bool(true))]),
        List::default(),
    )
    .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Event(message) => {
        assert_matches::assert_matches!(message.details.get("publisher"), Some(Value::Integer(publisher)) => {
            assert_eq!(*publisher, u64::from(bob_session));
        });
    });
}

#[tokio::test]
async fn rejects_malformed_topic_without_losing_the_session() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    alice.join_realm().await;

    alice
        .send(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(1).unwrap(),
            options: Dictionary::default(),
            topic: "com/x/greet".to_owned(),
        }))
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Error(message) => {
        assert_eq!(message.request, Id::try_from(1).unwrap());
        assert_eq!(message.error.as_ref(), "wamp.error.invalid_uri");
    });

    // Empty components are only valid under wildcard matching.
    alice
        .send(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(2).unwrap(),
            options: Dictionary::default(),
            topic: "com..greet".to_owned(),
        }))
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Error(message) => {
        assert_eq!(message.error.as_ref(), "wamp.error.invalid_uri");
    });

    // The session is still usable.
    alice.subscribe(3, "com.x.greet", Dictionary::default()).await;
}

#[tokio::test]
async fn subscribing_twice_returns_the_same_subscription() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    alice.join_realm().await;

    let first = alice.subscribe(1, "com.x.greet", Dictionary::default()).await;
    let second = alice.subscribe(2, "com.x.greet", Dictionary::default()).await;
    assert_eq!(first, second);

    // A different match style is a different subscription.
    let prefix = alice
        .subscribe(
            3,
            "com.x.greet",
            Dictionary::from_iter([("match".to_owned(), Value::from("prefix"))]),
        )
        .await;
    assert_ne!(first, prefix);
}

#[tokio::test]
async fn unsubscribes_and_rejects_foreign_subscription_ids() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    let mut bob = TestPeer::connect(&router_handle);
    alice.join_realm().await;
    bob.join_realm().await;

    let subscription = alice.subscribe(1, "com.x.greet", Dictionary::default()).await;

    // Bob cannot remove Alice's subscription.
    bob.send(Message::Unsubscribe(UnsubscribeMessage {
        request: Id::try_from(2).unwrap(),
        subscribed_subscription: subscription,
    }))
    .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Error(message) => {
        assert_eq!(message.error.as_ref(), "wamp.error.no_such_subscription");
    });

    alice
        .send(Message::Unsubscribe(UnsubscribeMessage {
            request: Id::try_from(3).unwrap(),
            subscribed_subscription: subscription,
        }))
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Unsubscribed(message) => {
        assert_eq!(message.unsubscribe_request, Id::try_from(3).unwrap());
    });

    // The subscription is gone.
    alice
        .send(Message::Unsubscribe(UnsubscribeMessage {
            request: Id::try_from(4).unwrap(),
            subscribed_subscription: subscription,
        }))
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Error(message) => {
        assert_eq!(message.error.as_ref(), "wamp.error.no_such_subscription");
    });

    // Publications no longer reach Alice.
    bob.publish(5, "com.x.greet", acknowledge(), List::default())
        .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Published(_));
    alice.expect_silence().await;
}

#[tokio::test]
async fn publish_without_acknowledge_is_silent() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut bob = TestPeer::connect(&router_handle);
    bob.join_realm().await;

    // No subscriber, no acknowledgement requested: nothing comes back, even
    // for a malformed topic.
    bob.publish(1, "com.x.greet", Dictionary::default(), List::default())
        .await;
    bob.publish(2, "not a uri", Dictionary::default(), List::default())
        .await;
    bob.expect_silence().await;

    // With acknowledgement, the malformed topic is an error.
    bob.publish(3, "not a uri", acknowledge(), List::default())
        .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Error(message) => {
        assert_eq!(message.request, Id::try_from(3).unwrap());
        assert_eq!(message.error.as_ref(), "wamp.error.invalid_uri");
    });
}

#[tokio::test]
async fn announces_topic_creation_and_removal() {
    test_utils::setup::setup_test_environment();

    let router_handle = start_router().await.unwrap();
    let mut events = router_handle
        .topic_events(&Uri::try_from(REALM).unwrap())
        .unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    alice.join_realm().await;

    let subscription = alice.subscribe(1, "com.x.greet", Dictionary::default()).await;
    assert_matches::assert_matches!(events.recv().await, Ok(TopicEvent::Created(TopicKey { style: None, uri })) => {
        assert_eq!(uri, WildcardUri::try_from("com.x.greet").unwrap());
    });

    // A second subscriber does not re-create the topic.
    let mut bob = TestPeer::connect(&router_handle);
    bob.join_realm().await;
    let bob_subscription = bob.subscribe(1, "com.x.greet", Dictionary::default()).await;

    // The entry lives until its last subscriber leaves.
    bob.send(Message::Unsubscribe(UnsubscribeMessage {
        request: Id::try_from(2).unwrap(),
        subscribed_subscription: bob_subscription,
    }))
    .await;
    assert_matches::assert_matches!(bob.recv().await, Message::Unsubscribed(_));

    alice
        .send(Message::Unsubscribe(UnsubscribeMessage {
            request: Id::try_from(2).unwrap(),
            subscribed_subscription: subscription,
        }))
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Unsubscribed(_));

    assert_matches::assert_matches!(events.recv().await, Ok(TopicEvent::Removed(TopicKey { style: None, uri })) => {
        assert_eq!(uri, WildcardUri::try_from("com.x.greet").unwrap());
    });
}

#[tokio::test]
async fn keeps_persistent_topics_alive_without_subscribers() {
    test_utils::setup::setup_test_environment();

    let mut config = RouterConfig::default();
    let router_handle = {
        let mut realm = RealmConfig::new("test", Uri::try_from(REALM).unwrap());
        realm.persistent_topics = vec![Uri::try_from("com.x.pinned").unwrap()];
        config.realms.push(realm);
        let router = new_web_socket_router(
            config,
            Box::new(EmptyPubSubPolicies::default()),
            Box::new(EmptyRpcPolicies::default()),
            Box::new(EmptySessionPolicies::default()),
        )
        .unwrap();
        router.start().await.unwrap()
    };
    let mut events = router_handle
        .topic_events(&Uri::try_from(REALM).unwrap())
        .unwrap();
    let mut alice = TestPeer::connect(&router_handle);
    alice.join_realm().await;

    // Subscribing to the pinned topic does not create it, and leaving does
    // not destroy it.
    let subscription = alice.subscribe(1, "com.x.pinned", Dictionary::default()).await;
    alice
        .send(Message::Unsubscribe(UnsubscribeMessage {
            request: Id::try_from(2).unwrap(),
            subscribed_subscription: subscription,
        }))
        .await;
    assert_matches::assert_matches!(alice.recv().await, Message::Unsubscribed(_));

    // The only events observed belong to an ordinary topic.
    alice.subscribe(3, "com.x.ordinary", Dictionary::default()).await;
    assert_matches::assert_matches!(events.recv().await, Ok(TopicEvent::Created(TopicKey { uri, .. })) => {
        assert_eq!(uri, WildcardUri::try_from("com.x.ordinary").unwrap());
    });
}
