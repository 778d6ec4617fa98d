/// Coarse progress of an exchange, for callers polling a long request.
/// Roughly net/base/load_states.h, reduced to what an engine can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    /// The response source is decided but the network has not been touched.
    WaitingForCache,
    /// Resolving, connecting, tunneling or handshaking.
    Connecting,
    /// The request is on the wire; no response head yet.
    WaitingForResponse,
    ReadingResponse,
}

impl LoadState {
    pub fn description(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::WaitingForCache => "waiting for cache",
            LoadState::Connecting => "connecting",
            LoadState::WaitingForResponse => "waiting for response",
            LoadState::ReadingResponse => "reading response",
        }
    }
}
