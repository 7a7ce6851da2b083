/// A role a peer can advertise when joining a realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    // Calls procedures.
    Caller,
    // Registers procedures.
    Callee,
    // Publishes events to topics.
    Publisher,
    // Subscribes to events for topics.
    Subscriber,
}

impl PeerRole {
    /// All peer roles.
    ///
    /// Sessions that do not advertise any roles are assumed to hold all of them.
    pub const ALL: [PeerRole; 4] = [
        PeerRole::Caller,
        PeerRole::Callee,
        PeerRole::Publisher,
        PeerRole::Subscriber,
    ];

    pub fn key_for_details(&self) -> &str {
        match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "caller" => Some(Self::Caller),
            "callee" => Some(Self::Callee),
            "publisher" => Some(Self::Publisher),
            "subscriber" => Some(Self::Subscriber),
            _ => None,
        }
    }
}

/// A role a router can implement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterRole {
    // Routes calls between callers and callees.
    Dealer,
    // Routes events between publishers and subscribers.
    Broker,
}

impl RouterRole {
    pub fn key_for_details(&self) -> &str {
        match self {
            Self::Dealer => "dealer",
            Self::Broker => "broker",
        }
    }
}
