use std::{
    fmt::Debug,
    sync::Arc,
};

use anyhow::{
    Error,
    Result,
};

use crate::{
    core::hash::HashMap,
    serializer::serializer::{
        Serializer,
        SerializerType,
        new_serializer,
    },
    transport::transport::FrameKind,
};

/// A pairing of a subprotocol name with a framing style and a serializer.
///
/// The transport reports the subprotocol selected for each new connection;
/// the binding registered under that name decides how the connection's frames
/// are interpreted.
#[derive(Clone)]
pub struct Binding {
    name: String,
    frame_kind: FrameKind,
    serializer: Arc<dyn Fn() -> Box<dyn Serializer> + Send + Sync>,
}

impl Binding {
    /// Creates a new binding.
    pub fn new<N, F>(name: N, frame_kind: FrameKind, serializer: F) -> Self
    where
        N: Into<String>,
        F: Fn() -> Box<dyn Serializer> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            frame_kind,
            serializer: Arc::new(serializer),
        }
    }

    /// The binding for one of the built-in serializers.
    pub fn for_serializer(serializer_type: SerializerType) -> Self {
        let frame_kind = match serializer_type {
            SerializerType::Json => FrameKind::Text,
            SerializerType::MessagePack => FrameKind::Binary,
        };
        Self::new(serializer_type.subprotocol(), frame_kind, move || {
            new_serializer(serializer_type)
        })
    }

    /// The subprotocol name the binding is negotiated under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How connections under this binding frame their messages.
    pub fn frame_kind(&self) -> FrameKind {
        self.frame_kind
    }

    /// Creates a serializer for one connection under this binding.
    pub fn new_serializer(&self) -> Box<dyn Serializer> {
        (self.serializer)()
    }
}

impl Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("frame_kind", &self.frame_kind)
            .finish()
    }
}

/// A registry of [`Binding`]s, keyed by subprotocol name.
///
/// Bindings are registered before the router starts; the registry is
/// immutable once connections are being accepted.
#[derive(Debug, Clone)]
pub struct BindingRegistry {
    bindings: HashMap<String, Binding>,
}

impl BindingRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::default(),
        }
    }

    /// Registers a binding.
    ///
    /// Fails if a binding with the same subprotocol name is already
    /// registered.
    pub fn register(&mut self, binding: Binding) -> Result<()> {
        if self.bindings.contains_key(binding.name()) {
            return Err(Error::msg(format!(
                "a binding is already registered for subprotocol {}",
                binding.name()
            )));
        }
        self.bindings.insert(binding.name().to_owned(), binding);
        Ok(())
    }

    /// Looks up the binding for a subprotocol name.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// The registered subprotocol names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|name| name.as_str())
    }
}

impl Default for BindingRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Binding::for_serializer(SerializerType::Json))
            .expect("empty registry accepts the json binding");
        registry
            .register(Binding::for_serializer(SerializerType::MessagePack))
            .expect("empty registry accepts the msgpack binding");
        registry
    }
}

#[cfg(test)]
mod binding_test {
    use crate::{
        router::binding::{
            Binding,
            BindingRegistry,
        },
        serializer::serializer::{
            SerializerType,
            new_serializer,
        },
        transport::transport::FrameKind,
    };

    #[test]
    fn default_registry_carries_both_standard_bindings() {
        let registry = BindingRegistry::default();
        assert_matches::assert_matches!(registry.get("wamp.2.json"), Some(binding) => {
            assert_eq!(binding.frame_kind(), FrameKind::Text);
        });
        assert_matches::assert_matches!(registry.get("wamp.2.msgpack"), Some(binding) => {
            assert_eq!(binding.frame_kind(), FrameKind::Binary);
        });
        assert_matches::assert_matches!(registry.get("wamp.2.cbor"), None);
    }

    #[test]
    fn rejects_duplicate_subprotocol_names() {
        let mut registry = BindingRegistry::default();
        assert_matches::assert_matches!(
            registry.register(Binding::for_serializer(SerializerType::Json)),
            Err(err) => {
                assert!(err.to_string().contains("already registered"));
            }
        );
        assert_matches::assert_matches!(
            registry.register(Binding::new("wamp.2.cbor", FrameKind::Binary, || {
                new_serializer(SerializerType::MessagePack)
            })),
            Ok(())
        );
    }
}
