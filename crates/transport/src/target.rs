/// Counter bumped every time the active conversation is replaced.
///
/// Events produced for an older generation belong to a conversation the user
/// has already left and must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Identifier for one request/response exchange.
///
/// This must change on every submit so stale chunks can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StreamSessionId(pub u64);

impl StreamSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Stream routing key used for stale-chunk rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub generation: Generation,
    pub session_id: StreamSessionId,
}

impl StreamTarget {
    pub const fn new(generation: Generation, session_id: StreamSessionId) -> Self {
        Self {
            generation,
            session_id,
        }
    }
}
