use serde::{
    Deserialize,
    Serialize,
    de::SeqAccess,
};

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
    },
    uri::Uri,
};

/// Message type tags, as assigned by the WAMP basic and advanced profiles.
pub mod tags {
    use crate::core::types::Integer;

    pub const HELLO: Integer = 1;
    pub const WELCOME: Integer = 2;
    pub const ABORT: Integer = 3;
    pub const GOODBYE: Integer = 6;
    pub const ERROR: Integer = 8;
    pub const PUBLISH: Integer = 16;
    pub const PUBLISHED: Integer = 17;
    pub const SUBSCRIBE: Integer = 32;
    pub const SUBSCRIBED: Integer = 33;
    pub const UNSUBSCRIBE: Integer = 34;
    pub const UNSUBSCRIBED: Integer = 35;
    pub const EVENT: Integer = 36;
    pub const CALL: Integer = 48;
    pub const CANCEL: Integer = 49;
    pub const RESULT: Integer = 50;
    pub const REGISTER: Integer = 64;
    pub const REGISTERED: Integer = 65;
    pub const UNREGISTER: Integer = 66;
    pub const UNREGISTERED: Integer = 67;
    pub const INVOCATION: Integer = 68;
    pub const INTERRUPT: Integer = 69;
    pub const YIELD: Integer = 70;
}

/// A HELLO message for a peer to initiate a WAMP session in a realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HelloMessage {
    pub realm: Uri,
    pub details: Dictionary,
}

/// A WELCOME message for a router to confirm a peer's WAMP session in a realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub session: Id,
    pub details: Dictionary,
}

/// An ABORT message for quickly terminating a WAMP session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A GOODBYE message for ending a WAMP session with a two-way handshake.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// An ERROR message for communicating an error in response to a single request.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ErrorMessage {
    pub request_type: Integer,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A PUBLISH message for publishing an event to a topic.
///
/// The topic is kept as a raw string so that a malformed URI can be answered
/// with an ERROR frame instead of tearing the session down.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: String,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A PUBLISHED message for confirming an event was published.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishedMessage {
    pub publish_request: Id,
    pub publication: Id,
}

/// A SUBSCRIBE message for subscribing to a topic.
///
/// The topic is kept as a raw string; validation depends on the requested
/// match style and happens during routing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscribeMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: String,
}

/// A SUBSCRIBED message for confirming a peer has subscribed to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscribedMessage {
    pub subscribe_request: Id,
    pub subscription: Id,
}

/// An UNSUBSCRIBE message for unsubscribing from a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnsubscribeMessage {
    pub request: Id,
    pub subscribed_subscription: Id,
}

/// An UNSUBSCRIBED message for confirming a peer has unsubscribed from a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnsubscribedMessage {
    pub unsubscribe_request: Id,
}

/// An EVENT message for relaying a published event to subscribers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventMessage {
    pub subscribed_subscription: Id,
    pub published_publication: Id,
    pub details: Dictionary,
    pub publish_arguments: List,
    pub publish_arguments_keyword: Dictionary,
}

/// A CALL message for invoking a procedure.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: String,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A CANCEL message for canceling a previously-issued call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CancelMessage {
    pub call_request: Id,
    pub options: Dictionary,
}

/// A RESULT message for sending the result of a procedure invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    pub yield_arguments: List,
    pub yield_arguments_keyword: Dictionary,
}

/// A REGISTER message for registering a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: String,
}

/// A REGISTERED message for confirming a procedure has been registered.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// An UNREGISTER message for unregistering a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// An UNREGISTERED message for confirming a procedure has been unregistered.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// An INVOCATION message for invoking a procedure on its callee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    pub call_arguments: List,
    pub call_arguments_keyword: Dictionary,
}

/// An INTERRUPT message for asking a callee to abandon an invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InterruptMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
}

/// A YIELD message for yielding the result of an invocation from the callee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A WAMP message.
///
/// Serialized as a heterogeneous array whose first element is the message
/// type tag. Trailing empty argument lists and keyword dictionaries are
/// omitted; a non-empty keyword dictionary forces the argument list to be
/// present.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloMessage),
    Welcome(WelcomeMessage),
    Abort(AbortMessage),
    Goodbye(GoodbyeMessage),
    Error(ErrorMessage),
    Publish(PublishMessage),
    Published(PublishedMessage),
    Subscribe(SubscribeMessage),
    Subscribed(SubscribedMessage),
    Unsubscribe(UnsubscribeMessage),
    Unsubscribed(UnsubscribedMessage),
    Event(EventMessage),
    Call(CallMessage),
    Cancel(CancelMessage),
    Result(ResultMessage),
    Register(RegisterMessage),
    Registered(RegisteredMessage),
    Unregister(UnregisterMessage),
    Unregistered(UnregisteredMessage),
    Invocation(InvocationMessage),
    Interrupt(InterruptMessage),
    Yield(YieldMessage),
}

impl Message {
    /// The message type tag put on the wire.
    pub fn tag(&self) -> Integer {
        match self {
            Self::Hello(_) => tags::HELLO,
            Self::Welcome(_) => tags::WELCOME,
            Self::Abort(_) => tags::ABORT,
            Self::Goodbye(_) => tags::GOODBYE,
            Self::Error(_) => tags::ERROR,
            Self::Publish(_) => tags::PUBLISH,
            Self::Published(_) => tags::PUBLISHED,
            Self::Subscribe(_) => tags::SUBSCRIBE,
            Self::Subscribed(_) => tags::SUBSCRIBED,
            Self::Unsubscribe(_) => tags::UNSUBSCRIBE,
            Self::Unsubscribed(_) => tags::UNSUBSCRIBED,
            Self::Event(_) => tags::EVENT,
            Self::Call(_) => tags::CALL,
            Self::Cancel(_) => tags::CANCEL,
            Self::Result(_) => tags::RESULT,
            Self::Register(_) => tags::REGISTER,
            Self::Registered(_) => tags::REGISTERED,
            Self::Unregister(_) => tags::UNREGISTER,
            Self::Unregistered(_) => tags::UNREGISTERED,
            Self::Invocation(_) => tags::INVOCATION,
            Self::Interrupt(_) => tags::INTERRUPT,
            Self::Yield(_) => tags::YIELD,
        }
    }

    /// The message name, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Publish(_) => "PUBLISH",
            Self::Published(_) => "PUBLISHED",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Subscribed(_) => "SUBSCRIBED",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::Unsubscribed(_) => "UNSUBSCRIBED",
            Self::Event(_) => "EVENT",
            Self::Call(_) => "CALL",
            Self::Cancel(_) => "CANCEL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Interrupt(_) => "INTERRUPT",
            Self::Yield(_) => "YIELD",
        }
    }

    /// The request ID on the message.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Cancel(message) => Some(message.call_request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Interrupt(message) => Some(message.invocation_request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details dictionary on the message.
    pub fn details(&self) -> Option<&Dictionary> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Event(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The error reason on the message.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }
}

// Serializes the head of the message followed by the argument list and
// keyword dictionary, dropping the empty tail. A non-empty keyword
// dictionary forces the (possibly empty) argument list in.
macro_rules! serialize_with_payload {
    ($serializer:expr, $args:expr, $kwargs:expr, $($head:expr),+ $(,)?) => {
        if !$kwargs.is_empty() {
            ($($head,)+ $args, $kwargs).serialize($serializer)
        } else if !$args.is_empty() {
            ($($head,)+ $args).serialize($serializer)
        } else {
            ($($head,)+).serialize($serializer)
        }
    };
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Hello(message) => {
                if message.details.is_empty() {
                    (tags::HELLO, &message.realm).serialize(serializer)
                } else {
                    (tags::HELLO, &message.realm, &message.details).serialize(serializer)
                }
            }
            Self::Welcome(message) => {
                if message.details.is_empty() {
                    (tags::WELCOME, &message.session).serialize(serializer)
                } else {
                    (tags::WELCOME, &message.session, &message.details).serialize(serializer)
                }
            }
            Self::Abort(message) => serialize_with_payload!(
                serializer,
                &message.arguments,
                &message.arguments_keyword,
                tags::ABORT,
                &message.details,
                &message.reason,
            ),
            Self::Goodbye(message) => {
                (tags::GOODBYE, &message.details, &message.reason).serialize(serializer)
            }
            Self::Error(message) => serialize_with_payload!(
                serializer,
                &message.arguments,
                &message.arguments_keyword,
                tags::ERROR,
                &message.request_type,
                &message.request,
                &message.details,
                &message.error,
            ),
            Self::Publish(message) => serialize_with_payload!(
                serializer,
                &message.arguments,
                &message.arguments_keyword,
                tags::PUBLISH,
                &message.request,
                &message.options,
                &message.topic,
            ),
            Self::Published(message) => {
                (tags::PUBLISHED, &message.publish_request, &message.publication)
                    .serialize(serializer)
            }
            Self::Subscribe(message) => {
                (tags::SUBSCRIBE, &message.request, &message.options, &message.topic)
                    .serialize(serializer)
            }
            Self::Subscribed(message) => {
                (tags::SUBSCRIBED, &message.subscribe_request, &message.subscription)
                    .serialize(serializer)
            }
            Self::Unsubscribe(message) => {
                (tags::UNSUBSCRIBE, &message.request, &message.subscribed_subscription)
                    .serialize(serializer)
            }
            Self::Unsubscribed(message) => {
                (tags::UNSUBSCRIBED, &message.unsubscribe_request).serialize(serializer)
            }
            Self::Event(message) => serialize_with_payload!(
                serializer,
                &message.publish_arguments,
                &message.publish_arguments_keyword,
                tags::EVENT,
                &message.subscribed_subscription,
                &message.published_publication,
                &message.details,
            ),
            Self::Call(message) => serialize_with_payload!(
                serializer,
                &message.arguments,
                &message.arguments_keyword,
                tags::CALL,
                &message.request,
                &message.options,
                &message.procedure,
            ),
            Self::Cancel(message) => {
                (tags::CANCEL, &message.call_request, &message.options).serialize(serializer)
            }
            Self::Result(message) => serialize_with_payload!(
                serializer,
                &message.yield_arguments,
                &message.yield_arguments_keyword,
                tags::RESULT,
                &message.call_request,
                &message.details,
            ),
            Self::Register(message) => {
                (tags::REGISTER, &message.request, &message.options, &message.procedure)
                    .serialize(serializer)
            }
            Self::Registered(message) => {
                (tags::REGISTERED, &message.register_request, &message.registration)
                    .serialize(serializer)
            }
            Self::Unregister(message) => {
                (tags::UNREGISTER, &message.request, &message.registered_registration)
                    .serialize(serializer)
            }
            Self::Unregistered(message) => {
                (tags::UNREGISTERED, &message.unregister_request).serialize(serializer)
            }
            Self::Invocation(message) => serialize_with_payload!(
                serializer,
                &message.call_arguments,
                &message.call_arguments_keyword,
                tags::INVOCATION,
                &message.request,
                &message.registered_registration,
                &message.details,
            ),
            Self::Interrupt(message) => {
                (tags::INTERRUPT, &message.invocation_request, &message.options)
                    .serialize(serializer)
            }
            Self::Yield(message) => serialize_with_payload!(
                serializer,
                &message.arguments,
                &message.arguments_keyword,
                tags::YIELD,
                &message.invocation_request,
                &message.options,
            ),
        }
    }
}

// Reads the next element of the message array, erroring out if the message
// ended early.
macro_rules! required {
    ($seq:expr, $what:expr) => {
        match $seq.next_element()? {
            Some(value) => value,
            None => {
                return Err(serde::de::Error::custom(concat!(
                    "message ended before ",
                    $what
                )));
            }
        }
    };
}

struct MessageVisitor;

impl<'de> serde::de::Visitor<'de> for MessageVisitor {
    type Value = Message;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a WAMP message array")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let tag: Integer = required!(seq, "type tag");
        match tag {
            tags::HELLO => Ok(Message::Hello(HelloMessage {
                realm: required!(seq, "realm uri"),
                details: seq.next_element()?.unwrap_or_default(),
            })),
            tags::WELCOME => Ok(Message::Welcome(WelcomeMessage {
                session: required!(seq, "session id"),
                details: seq.next_element()?.unwrap_or_default(),
            })),
            tags::ABORT => Ok(Message::Abort(AbortMessage {
                details: required!(seq, "details dict"),
                reason: required!(seq, "reason uri"),
                arguments: seq.next_element()?.unwrap_or_default(),
                arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::GOODBYE => Ok(Message::Goodbye(GoodbyeMessage {
                details: required!(seq, "details dict"),
                reason: required!(seq, "reason uri"),
            })),
            tags::ERROR => Ok(Message::Error(ErrorMessage {
                request_type: required!(seq, "request type"),
                request: required!(seq, "request id"),
                details: required!(seq, "details dict"),
                error: required!(seq, "error uri"),
                arguments: seq.next_element()?.unwrap_or_default(),
                arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::PUBLISH => Ok(Message::Publish(PublishMessage {
                request: required!(seq, "request id"),
                options: required!(seq, "options dict"),
                topic: required!(seq, "topic uri"),
                arguments: seq.next_element()?.unwrap_or_default(),
                arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::PUBLISHED => Ok(Message::Published(PublishedMessage {
                publish_request: required!(seq, "request id"),
                publication: required!(seq, "publication id"),
            })),
            tags::SUBSCRIBE => Ok(Message::Subscribe(SubscribeMessage {
                request: required!(seq, "request id"),
                options: required!(seq, "options dict"),
                topic: required!(seq, "topic uri"),
            })),
            tags::SUBSCRIBED => Ok(Message::Subscribed(SubscribedMessage {
                subscribe_request: required!(seq, "request id"),
                subscription: required!(seq, "subscription id"),
            })),
            tags::UNSUBSCRIBE => Ok(Message::Unsubscribe(UnsubscribeMessage {
                request: required!(seq, "request id"),
                subscribed_subscription: required!(seq, "subscription id"),
            })),
            tags::UNSUBSCRIBED => Ok(Message::Unsubscribed(UnsubscribedMessage {
                unsubscribe_request: required!(seq, "request id"),
            })),
            tags::EVENT => Ok(Message::Event(EventMessage {
                subscribed_subscription: required!(seq, "subscription id"),
                published_publication: required!(seq, "publication id"),
                details: required!(seq, "details dict"),
                publish_arguments: seq.next_element()?.unwrap_or_default(),
                publish_arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::CALL => Ok(Message::Call(CallMessage {
                request: required!(seq, "request id"),
                options: required!(seq, "options dict"),
                procedure: required!(seq, "procedure uri"),
                arguments: seq.next_element()?.unwrap_or_default(),
                arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::CANCEL => Ok(Message::Cancel(CancelMessage {
                call_request: required!(seq, "request id"),
                options: required!(seq, "options dict"),
            })),
            tags::RESULT => Ok(Message::Result(ResultMessage {
                call_request: required!(seq, "request id"),
                details: required!(seq, "details dict"),
                yield_arguments: seq.next_element()?.unwrap_or_default(),
                yield_arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::REGISTER => Ok(Message::Register(RegisterMessage {
                request: required!(seq, "request id"),
                options: required!(seq, "options dict"),
                procedure: required!(seq, "procedure uri"),
            })),
            tags::REGISTERED => Ok(Message::Registered(RegisteredMessage {
                register_request: required!(seq, "request id"),
                registration: required!(seq, "registration id"),
            })),
            tags::UNREGISTER => Ok(Message::Unregister(UnregisterMessage {
                request: required!(seq, "request id"),
                registered_registration: required!(seq, "registration id"),
            })),
            tags::UNREGISTERED => Ok(Message::Unregistered(UnregisteredMessage {
                unregister_request: required!(seq, "request id"),
            })),
            tags::INVOCATION => Ok(Message::Invocation(InvocationMessage {
                request: required!(seq, "invocation id"),
                registered_registration: required!(seq, "registration id"),
                details: required!(seq, "details dict"),
                call_arguments: seq.next_element()?.unwrap_or_default(),
                call_arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tags::INTERRUPT => Ok(Message::Interrupt(InterruptMessage {
                invocation_request: required!(seq, "invocation id"),
                options: required!(seq, "options dict"),
            })),
            tags::YIELD => Ok(Message::Yield(YieldMessage {
                invocation_request: required!(seq, "invocation id"),
                options: required!(seq, "options dict"),
                arguments: seq.next_element()?.unwrap_or_default(),
                arguments_keyword: seq.next_element()?.unwrap_or_default(),
            })),
            tag => Err(serde::de::Error::custom(format!(
                "unknown message tag {tag}"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Message, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(MessageVisitor)
    }
}

#[cfg(test)]
mod message_test {
    use crate::{
        core::{
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::Uri,
        },
        message::message::{
            CallMessage,
            ErrorMessage,
            EventMessage,
            HelloMessage,
            InterruptMessage,
            Message,
            PublishMessage,
            YieldMessage,
        },
    };

    #[track_caller]
    fn assert_serialize_to_deserialize_equal(value: &Message) {
        let serialized = serde_json::to_string(value).unwrap();
        let deserialized = serde_json::from_str::<Message>(&serialized).unwrap();
        assert_eq!(value, &deserialized);

        let serialized = rmp_serde::to_vec(value).unwrap();
        let deserialized = rmp_serde::from_slice::<Message>(&serialized).unwrap();
        assert_eq!(value, &deserialized);
    }

    #[test]
    fn deserializes_message_from_tuple() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [1, "com.router"]
        "#), Ok(Message::Hello(message)) => {
            assert_eq!(message, HelloMessage {
                realm: Uri::try_from("com.router").unwrap(),
                details: Dictionary::default(),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [1, "com.router", { "key": true }]
        "#), Ok(Message::Hello(message)) => {
            assert_eq!(message, HelloMessage {
                realm: Uri::try_from("com.router").unwrap(),
                details: Dictionary::from_iter([("key".to_owned(), Value::Bool(true))]),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [48, 7814135, {}, "com.myapp.ping"]
        "#), Ok(Message::Call(message)) => {
            assert_eq!(message, CallMessage {
                request: Id::try_from(7814135).unwrap(),
                options: Dictionary::default(),
                procedure: "com.myapp.ping".to_owned(),
                arguments: List::default(),
                arguments_keyword: Dictionary::default(),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [48, 7814135, {}, "com.myapp.user.new", ["Johnny"], {
                "firstname": "John",
                "surname": "Doe"
            }]
        "#), Ok(Message::Call(message)) => {
            assert_eq!(message, CallMessage {
                request: Id::try_from(7814135).unwrap(),
                options: Dictionary::default(),
                procedure: "com.myapp.user.new".to_owned(),
                arguments: List::from_iter([
                    Value::String("Johnny".to_owned()),
                ]),
                arguments_keyword: Dictionary::from_iter([
                    ("firstname".to_owned(), Value::String("John".to_owned())),
                    ("surname".to_owned(), Value::String("Doe".to_owned())),
                ]),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [49, 7814135, { "mode": "kill" }]
        "#), Ok(Message::Cancel(message)) => {
            assert_eq!(message.call_request, Id::try_from(7814135).unwrap());
            assert_eq!(
                message.options,
                Dictionary::from_iter([("mode".to_owned(), Value::from("kill"))])
            );
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [70, 100, {}, [5]]
        "#), Ok(Message::Yield(message)) => {
            assert_eq!(message, YieldMessage {
                invocation_request: Id::try_from(100).unwrap(),
                options: Dictionary::default(),
                arguments: List::from_iter([Value::Integer(5)]),
                arguments_keyword: Dictionary::default(),
            })
        });
    }

    #[test]
    fn fails_deserialization_of_truncated_message() {
        assert_matches::assert_matches!(
            serde_json::from_str::<Message>(r#"[32, 1]"#),
            Err(err) => {
                assert!(err.to_string().contains("message ended before options dict"));
            }
        );
        assert_matches::assert_matches!(
            serde_json::from_str::<Message>(r#"[99, 1, {}]"#),
            Err(err) => {
                assert!(err.to_string().contains("unknown message tag 99"));
            }
        );
    }

    #[test]
    fn serializes_message_to_tuple() {
        assert_matches::assert_matches!(
            serde_json::to_string(&Message::Hello(HelloMessage {
                realm: Uri::try_from("com.router").unwrap(),
                details: Dictionary::default(),
            })),
            Ok(serialized) => {
                assert_eq!(serialized, r#"[1,"com.router"]"#);
            }
        );

        // An empty argument list is dropped from the tail.
        assert_matches::assert_matches!(
            serde_json::to_string(&Message::Event(EventMessage {
                subscribed_subscription: Id::try_from(10).unwrap(),
                published_publication: Id::try_from(20).unwrap(),
                details: Dictionary::default(),
                publish_arguments: List::default(),
                publish_arguments_keyword: Dictionary::default(),
            })),
            Ok(serialized) => {
                assert_eq!(serialized, r#"[36,10,20,{}]"#);
            }
        );

        // A non-empty keyword dictionary forces the empty argument list in.
        assert_matches::assert_matches!(
            serde_json::to_string(&Message::Event(EventMessage {
                subscribed_subscription: Id::try_from(10).unwrap(),
                published_publication: Id::try_from(20).unwrap(),
                details: Dictionary::default(),
                publish_arguments: List::default(),
                publish_arguments_keyword: Dictionary::from_iter([(
                    "key".to_owned(),
                    Value::Bool(true)
                )]),
            })),
            Ok(serialized) => {
                assert_eq!(serialized, r#"[36,10,20,{},[],{"key":true}]"#);
            }
        );
    }

    #[test]
    fn serializes_and_deserializes_equivalently() {
        assert_serialize_to_deserialize_equal(&Message::Hello(HelloMessage {
            realm: Uri::try_from("com.router").unwrap(),
            details: Dictionary::from_iter([
                ("a".to_owned(), Value::Integer(1)),
                ("b".to_owned(), Value::String("s".to_owned())),
                ("c".to_owned(), Value::Bool(false)),
                (
                    "d".to_owned(),
                    Value::Dictionary(Dictionary::from_iter([(
                        "e".to_owned(),
                        Value::String("f".to_owned()),
                    )])),
                ),
                (
                    "g".to_owned(),
                    Value::List(List::from_iter([
                        Value::Integer(0),
                        Value::Integer(1),
                        Value::List(List::default()),
                        Value::Dictionary(Dictionary::default()),
                    ])),
                ),
            ]),
        }));

        assert_serialize_to_deserialize_equal(&Message::Publish(PublishMessage {
            request: Id::try_from(239714735).unwrap(),
            options: Dictionary::default(),
            topic: "com.myapp.mytopic1".to_owned(),
            arguments: List::from_iter([Value::String("Hello, world!".to_owned())]),
            arguments_keyword: Dictionary::default(),
        }));

        assert_serialize_to_deserialize_equal(&Message::Call(CallMessage {
            request: Id::try_from(7814135).unwrap(),
            options: Dictionary::default(),
            procedure: "com.myapp.add2".to_owned(),
            arguments: List::from_iter([Value::Integer(23), Value::Integer(7)]),
            arguments_keyword: Dictionary::default(),
        }));

        assert_serialize_to_deserialize_equal(&Message::Error(ErrorMessage {
            request_type: 48,
            request: Id::try_from(7814135).unwrap(),
            details: Dictionary::default(),
            error: Uri::try_from("wamp.error.no_such_procedure").unwrap(),
            arguments: List::default(),
            arguments_keyword: Dictionary::default(),
        }));

        assert_serialize_to_deserialize_equal(&Message::Interrupt(InterruptMessage {
            invocation_request: Id::try_from(551).unwrap(),
            options: Dictionary::from_iter([("mode".to_owned(), Value::from("killnowait"))]),
        }));
    }
}
