pub mod cancel;
pub mod close;
pub mod error;
pub mod hash;
pub mod id;
pub mod invocation_policy;
pub mod match_style;
pub mod options;
pub mod roles;
pub mod service;
pub mod stream;
pub mod types;
pub mod uri;
