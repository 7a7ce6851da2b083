mod acceptor;
mod app;
mod binding;
mod connection;
mod context;
mod pattern;
mod procedure;
mod realm;
mod router;
mod session;
mod topic;
mod web_socket_router;

pub use app::{
    pub_sub::{
        EmptyPubSubPolicies,
        PubSubPolicies,
    },
    rpc::{
        EmptyRpcPolicies,
        RpcPolicies,
    },
    session::{
        EmptySessionPolicies,
        SessionPolicies,
    },
};
pub use binding::{
    Binding,
    BindingRegistry,
};
pub use context::{
    RealmContext,
    RouterContext,
};
pub use realm::RealmConfig;
pub use router::{
    DirectConnection,
    Router,
    RouterConfig,
    RouterHandle,
};
pub use topic::{
    TopicEvent,
    TopicKey,
};
pub use web_socket_router::{
    WebSocketRouter,
    new_web_socket_router,
};
