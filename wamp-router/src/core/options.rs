use std::time::Duration;

use anyhow::{
    Error,
    Result,
};

use crate::core::{
    cancel::CallCancelMode,
    error::BasicError,
    hash::HashSet,
    id::Id,
    invocation_policy::InvocationPolicy,
    match_style::MatchStyle,
    types::{
        Dictionary,
        Value,
    },
};

fn bool_option(options: &Dictionary, key: &str) -> Result<Option<bool>> {
    match options.get(key) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(BasicError::InvalidArgument(format!("{key} must be a boolean")).into()),
    }
}

fn integer_option(options: &Dictionary, key: &str) -> Result<Option<u64>> {
    match options.get(key) {
        None => Ok(None),
        Some(Value::Integer(value)) => Ok(Some(*value)),
        Some(_) => Err(BasicError::InvalidArgument(format!("{key} must be an integer")).into()),
    }
}

fn string_option<'d>(options: &'d Dictionary, key: &str) -> Result<Option<&'d str>> {
    match options.get(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(BasicError::InvalidArgument(format!("{key} must be a string")).into()),
    }
}

fn id_set_option(options: &Dictionary, key: &str) -> Result<Option<HashSet<Id>>> {
    match options.get(key) {
        None => Ok(None),
        Some(Value::List(values)) => values
            .iter()
            .map(|value| {
                value
                    .integer()
                    .ok_or_else(|| {
                        Error::from(BasicError::InvalidArgument(format!(
                            "{key} must be a list of session ids"
                        )))
                    })
                    .and_then(|value| Id::try_from(value).map_err(Error::new))
            })
            .collect::<Result<HashSet<_>>>()
            .map(Some),
        Some(_) => {
            Err(BasicError::InvalidArgument(format!("{key} must be a list of session ids")).into())
        }
    }
}

fn match_style_option(options: &Dictionary) -> Result<Option<MatchStyle>> {
    match string_option(options, "match")? {
        None | Some("exact") => Ok(None),
        Some(style) => MatchStyle::try_from(style)
            .map(Some)
            .map_err(|err| BasicError::InvalidArgument(err.to_string()).into()),
    }
}

/// Options for a SUBSCRIBE request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// How the topic should be matched against publications. `None` is exact
    /// matching.
    pub match_style: Option<MatchStyle>,
}

impl TryFrom<&Dictionary> for SubscribeOptions {
    type Error = Error;
    fn try_from(options: &Dictionary) -> Result<Self> {
        Ok(Self {
            match_style: match_style_option(options)?,
        })
    }
}

/// Options for a REGISTER request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    /// How the procedure should be matched against calls. `None` is exact
    /// matching.
    pub match_style: Option<MatchStyle>,
    /// How callees should be selected for shared registrations.
    pub invoke: InvocationPolicy,
}

impl TryFrom<&Dictionary> for RegisterOptions {
    type Error = Error;
    fn try_from(options: &Dictionary) -> Result<Self> {
        let invoke = match string_option(options, "invoke")? {
            None => InvocationPolicy::default(),
            Some(policy) => InvocationPolicy::try_from(policy)
                .map_err(|err| Error::from(BasicError::InvalidArgument(err.to_string())))?,
        };
        Ok(Self {
            match_style: match_style_option(options)?,
            invoke,
        })
    }
}

/// Options for a PUBLISH request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Should the publisher be excluded from receiving the event?
    ///
    /// Defaults to true: a publisher does not hear its own events unless it
    /// explicitly opts in.
    pub exclude_me: bool,
    /// Session IDs that must not receive the event.
    pub exclude: Option<HashSet<Id>>,
    /// Session IDs that may receive the event; all others are filtered out.
    pub eligible: Option<HashSet<Id>>,
    /// Should the publisher's session ID be disclosed to receivers?
    pub disclose_me: bool,
    /// Should the publication be acknowledged with PUBLISHED?
    pub acknowledge: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            exclude_me: true,
            exclude: None,
            eligible: None,
            disclose_me: false,
            acknowledge: false,
        }
    }
}

impl TryFrom<&Dictionary> for PublishOptions {
    type Error = Error;
    fn try_from(options: &Dictionary) -> Result<Self> {
        Ok(Self {
            exclude_me: bool_option(options, "exclude_me")?.unwrap_or(true),
            exclude: id_set_option(options, "exclude")?,
            eligible: id_set_option(options, "eligible")?,
            disclose_me: bool_option(options, "disclose_me")?.unwrap_or(false),
            acknowledge: bool_option(options, "acknowledge")?.unwrap_or(false),
        })
    }
}

/// Options for a CALL request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Deadline for the call, measured from the moment the router accepts it.
    pub timeout: Option<Duration>,
    /// Should progressive results be forwarded to the caller?
    pub receive_progress: bool,
    /// Should the caller's session ID be disclosed to the callee?
    pub disclose_me: bool,
}

impl TryFrom<&Dictionary> for CallOptions {
    type Error = Error;
    fn try_from(options: &Dictionary) -> Result<Self> {
        let timeout = match integer_option(options, "timeout")? {
            None | Some(0) => None,
            Some(millis) => Some(Duration::from_millis(millis)),
        };
        Ok(Self {
            timeout,
            receive_progress: bool_option(options, "receive_progress")?.unwrap_or(false),
            disclose_me: bool_option(options, "disclose_me")?.unwrap_or(false),
        })
    }
}

/// Options for a CANCEL request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CancelOptions {
    pub mode: CallCancelMode,
}

impl TryFrom<&Dictionary> for CancelOptions {
    type Error = Error;
    fn try_from(options: &Dictionary) -> Result<Self> {
        let mode = match string_option(options, "mode")? {
            None => CallCancelMode::default(),
            Some(mode) => CallCancelMode::try_from(mode)
                .map_err(|err| Error::from(BasicError::InvalidArgument(err.to_string())))?,
        };
        Ok(Self { mode })
    }
}

/// Options for a YIELD message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct YieldOptions {
    /// Is this an intermediate result, with more to follow?
    pub progress: bool,
}

impl TryFrom<&Dictionary> for YieldOptions {
    type Error = Error;
    fn try_from(options: &Dictionary) -> Result<Self> {
        Ok(Self {
            progress: bool_option(options, "progress")?.unwrap_or(false),
        })
    }
}
