use std::{
    fmt::Display,
    sync::LazyLock,
};

use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;

/// Error for a URI failing validation.
#[derive(Debug, Error)]
#[error("invalid URI")]
pub struct InvalidUri;

/// Validates a strict URI: non-empty, dot-separated components, each matching
/// `[0-9a-z_]+`.
pub fn validate_strict_uri<S>(uri: S) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([0-9a-z_]+\.)*([0-9a-z_]+)$").unwrap());
    if !RE.is_match(uri.as_ref()) {
        return Err(InvalidUri);
    }
    Ok(())
}

/// Validates a wildcard URI: like a strict URI, but components may be empty
/// to match any single component.
pub fn validate_wildcard_uri<S>(uri: S) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([0-9a-z_]*\.)*([0-9a-z_]*)$").unwrap());
    let uri = uri.as_ref();
    if uri.is_empty() || !RE.is_match(uri) {
        return Err(InvalidUri);
    }
    Ok(())
}

/// A strict URI, identifying a realm, topic, procedure, or error.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Constructs a URI from a string known to be valid.
    pub fn from_known<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Self(value.into())
    }

    /// The dot-separated components of the URI.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uri {
    type Error = InvalidUri;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_strict_uri(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for Uri {
    type Error = InvalidUri;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_strict_uri(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl From<Uri> for String {
    fn from(value: Uri) -> Self {
        value.0
    }
}

struct UriVisitor;

impl<'de> Visitor<'de> for UriVisitor {
    type Value = Uri;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a URI")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Uri::try_from(v.to_owned()).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(UriVisitor)
    }
}

/// A URI that may contain empty components, each matching any single
/// component of an incoming URI.
///
/// Every strict URI is also a valid wildcard URI, so this type is the common
/// currency for topic and procedure patterns regardless of match style.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct WildcardUri(String);

impl WildcardUri {
    /// Constructs a wildcard URI from a string known to be valid.
    pub fn from_known<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Self(value.into())
    }

    /// The dot-separated components of the pattern.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The number of components in the pattern.
    pub fn len(&self) -> usize {
        self.split().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for WildcardUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for WildcardUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Uri> for WildcardUri {
    fn from(value: Uri) -> Self {
        Self(value.0)
    }
}

impl TryFrom<String> for WildcardUri {
    type Error = InvalidUri;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_wildcard_uri(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for WildcardUri {
    type Error = InvalidUri;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_wildcard_uri(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl From<WildcardUri> for String {
    fn from(value: WildcardUri) -> Self {
        value.0
    }
}

#[cfg(test)]
mod uri_test {
    use crate::core::uri::{
        Uri,
        WildcardUri,
        validate_strict_uri,
        validate_wildcard_uri,
    };

    #[test]
    fn validates_strict_uris() {
        assert_matches::assert_matches!(validate_strict_uri("com"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com123"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com.router.topic"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri("com.router.TOPIC"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.router.topic_123-@!!"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.1"), Ok(()));
        assert_matches::assert_matches!(validate_strict_uri(""), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("."), Err(_));
        assert_matches::assert_matches!(validate_strict_uri(".."), Err(_));
        assert_matches::assert_matches!(validate_strict_uri(".com.router.topic1"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com.router#"), Err(_));
        assert_matches::assert_matches!(validate_strict_uri("com..topic"), Err(_));
    }

    #[test]
    fn validates_wildcard_uris() {
        assert_matches::assert_matches!(validate_wildcard_uri("com.router.topic"), Ok(()));
        assert_matches::assert_matches!(validate_wildcard_uri("com..topic"), Ok(()));
        assert_matches::assert_matches!(validate_wildcard_uri("..topic"), Ok(()));
        assert_matches::assert_matches!(validate_wildcard_uri("com.router."), Ok(()));
        assert_matches::assert_matches!(validate_wildcard_uri(".."), Ok(()));
        assert_matches::assert_matches!(validate_wildcard_uri(""), Err(_));
        assert_matches::assert_matches!(validate_wildcard_uri("com.ROUTER.topic"), Err(_));
        assert_matches::assert_matches!(validate_wildcard_uri("com router"), Err(_));
    }

    #[test]
    fn splits_into_components() {
        assert_eq!(
            Uri::try_from("com.router.topic").unwrap().split().collect::<Vec<_>>(),
            vec!["com", "router", "topic"]
        );
        assert_eq!(
            WildcardUri::try_from("com..topic").unwrap().split().collect::<Vec<_>>(),
            vec!["com", "", "topic"]
        );
        assert_eq!(WildcardUri::try_from("com..topic").unwrap().len(), 3);
    }

    #[test]
    fn fails_deserialization_invalid_uri() {
        assert_matches::assert_matches!(serde_json::from_str::<Uri>(r#""com.router.TOPIC""#), Err(err) => {
            assert!(err.to_string().contains("expected a URI"));
        });
    }
}
