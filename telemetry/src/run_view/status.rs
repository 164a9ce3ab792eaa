//! Connection status machine for one run view.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Subscription requested, no frame decoded yet
    #[default]
    Connecting,
    Live,
    /// Transport dropped; it is reconnecting on its own
    Reconnecting,
    /// Terminal. Only an explicit stop gets here.
    Stopped,
    /// The last message failed to decode, or the server ended the stream
    /// for good
    Error,
}

/// Inputs to the status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    TransportOpen,
    TransportError,
    /// The transport gave up and will not reconnect
    TransportClosed,
    FrameApplied,
    FrameRejected,
    StopRequested,
}

impl ConnectionStatus {
    pub fn next(self, signal: StatusSignal) -> ConnectionStatus {
        use ConnectionStatus::*;
        use StatusSignal::*;

        match (self, signal) {
            (Stopped, _) => Stopped,
            (_, StopRequested) => Stopped,
            (_, FrameApplied) => Live,
            (_, FrameRejected) => Error,
            (_, TransportClosed) => Error,
            (_, TransportError) => Reconnecting,
            (Reconnecting, TransportOpen) => Connecting,
            (current, TransportOpen) => current,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Live => "live",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Stopped => "stopped",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
