//! RunViewActor message types.
//!
//! Push and poll inputs arrive as casts; readers use RPC calls.

use std::sync::Arc;

use ractor::RpcReplyPort;
use shared_types::{Frame, PageRow, RunRecord};
use tokio::sync::broadcast;

use crate::api::ApiError;
use crate::transport::TransportEvent;

use super::state::RunViewState;
use super::status::ConnectionStatus;

#[derive(Debug)]
pub enum RunViewMsg {
    /// Anything the event-stream transport observed
    Transport(TransportEvent),
    RunPolled(Result<RunRecord, ApiError>),
    PagesPolled(Result<Vec<PageRow>, ApiError>),
    MarkStopped {
        reply: RpcReplyPort<ConnectionStatus>,
    },
    GetStatus {
        reply: RpcReplyPort<ConnectionStatus>,
    },
    GetSnapshot {
        reply: RpcReplyPort<RunViewState>,
    },
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<RunViewEvent>>,
    },
}

/// Change notifications fanned out to subscribers
#[derive(Debug, Clone)]
pub enum RunViewEvent {
    /// A frame was decoded and merged
    Frame(Arc<Frame>),
    StatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    RunUpdated,
    PagesUpdated,
}

#[derive(Debug, thiserror::Error)]
pub enum RunViewError {
    #[error("Failed to spawn run view: {0}")]
    Spawn(String),

    #[error("Run view call failed: {0}")]
    Rpc(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Run view is closed")]
    Closed,
}
