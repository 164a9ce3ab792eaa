//! RunViewActor - single owner of one run view's state.
//!
//! One actor per open view. Transport events, poll results and user actions
//! all arrive as messages, so every mutation of [`RunViewState`] happens on
//! the actor's task in arrival order. [`RunViewHandle`] owns the actor, the
//! transport and the poller and releases all three on close or drop.

mod messages;
mod state;
mod status;

use std::sync::Arc;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::{RunId, FRAME_EVENT};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use messages::{RunViewError, RunViewEvent, RunViewMsg};
pub use state::RunViewState;
pub use status::{ConnectionStatus, StatusSignal};

use crate::api::{ApiClient, RunBackend};
use crate::config::TelemetryConfig;
use crate::decoder::decode_frame;
use crate::poller::SnapshotPoller;
use crate::transport::{EventStreamTransport, TransportEvent};

/// Owned copy of a view's state handed to readers
pub type RunViewSnapshot = RunViewState;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
pub struct RunViewActor;

#[derive(Debug, Clone)]
pub struct RunViewArguments {
    pub run_id: RunId,
    pub series_capacity: usize,
}

pub struct RunViewActorState {
    view: RunViewState,
    events: broadcast::Sender<RunViewEvent>,
}

#[async_trait]
impl Actor for RunViewActor {
    type Msg = RunViewMsg;
    type State = RunViewActorState;
    type Arguments = RunViewArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(
            actor_id = %myself.get_id(),
            run_id = %args.run_id,
            series_capacity = args.series_capacity,
            "RunViewActor starting"
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(RunViewActorState {
            view: RunViewState::new(args.run_id, args.series_capacity),
            events,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RunViewMsg::Transport(event) => Self::handle_transport(state, event),
            RunViewMsg::RunPolled(result) => {
                if state.view.apply_run_poll(result) {
                    let _ = state.events.send(RunViewEvent::RunUpdated);
                }
            }
            RunViewMsg::PagesPolled(result) => {
                if state.view.apply_pages_poll(result) {
                    let _ = state.events.send(RunViewEvent::PagesUpdated);
                }
            }
            RunViewMsg::MarkStopped { reply } => {
                Self::signal(state, StatusSignal::StopRequested);
                let _ = reply.send(state.view.status());
            }
            RunViewMsg::GetStatus { reply } => {
                let _ = reply.send(state.view.status());
            }
            RunViewMsg::GetSnapshot { reply } => {
                let _ = reply.send(state.view.clone());
            }
            RunViewMsg::Subscribe { reply } => {
                let _ = reply.send(state.events.subscribe());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(
            actor_id = %myself.get_id(),
            run_id = %state.view.run_id(),
            frames_applied = state.view.frames_applied(),
            frames_rejected = state.view.frames_rejected(),
            "RunViewActor stopped"
        );
        Ok(())
    }
}

impl RunViewActor {
    fn handle_transport(state: &mut RunViewActorState, event: TransportEvent) {
        match event {
            TransportEvent::Open => Self::signal(state, StatusSignal::TransportOpen),
            TransportEvent::Error(_) => Self::signal(state, StatusSignal::TransportError),
            TransportEvent::Closed(reason) => {
                tracing::warn!(
                    run_id = %state.view.run_id(),
                    reason = %reason,
                    "Event stream closed by server"
                );
                Self::signal(state, StatusSignal::TransportClosed);
            }
            TransportEvent::Message(message) => {
                if message.event != FRAME_EVENT {
                    tracing::debug!(
                        run_id = %state.view.run_id(),
                        event = %message.event,
                        "Ignoring non-frame event"
                    );
                    return;
                }
                match decode_frame(&message.data) {
                    Ok(frame) => {
                        state.view.apply_frame(&frame);
                        let _ = state.events.send(RunViewEvent::Frame(Arc::new(frame)));
                        Self::signal(state, StatusSignal::FrameApplied);
                    }
                    Err(e) => {
                        tracing::warn!(
                            run_id = %state.view.run_id(),
                            error = %e,
                            "Dropping undecodable frame"
                        );
                        state.view.record_rejected_frame();
                        Self::signal(state, StatusSignal::FrameRejected);
                    }
                }
            }
        }
    }

    fn signal(state: &mut RunViewActorState, signal: StatusSignal) {
        if let Some((from, to)) = state.view.signal(signal) {
            tracing::debug!(
                run_id = %state.view.run_id(),
                from = %from,
                to = %to,
                ?signal,
                "Run view status changed"
            );
            let _ = state.events.send(RunViewEvent::StatusChanged { from, to });
        }
    }
}

/// Entry points for opening run views
pub struct RunView;

impl RunView {
    /// Open a live view: event stream, snapshot poller and state actor.
    pub async fn open(config: &TelemetryConfig, run_id: RunId) -> Result<RunViewHandle, RunViewError> {
        let client = ApiClient::new(config)?;
        let stream_client = ApiClient::streaming_client(config.request_timeout)?;
        let events_url = client.events_url(&run_id)?;

        let mut handle = Self::spawn(config, run_id, Arc::new(client)).await?;

        let actor = handle.actor.clone();
        let transport = EventStreamTransport::new(
            stream_client,
            events_url,
            config.reconnect_delay,
            handle.cancel.child_token(),
        )
        .with_client_error_retries(config.stream_client_error_retries);
        handle
            .tasks
            .push(transport.spawn(move |event| actor.cast(RunViewMsg::Transport(event)).is_ok()));

        Ok(handle)
    }

    /// Open a view without an event stream. Transport events are fed in
    /// through [`RunViewHandle::deliver`].
    pub async fn spawn(
        config: &TelemetryConfig,
        run_id: RunId,
        backend: Arc<dyn RunBackend>,
    ) -> Result<RunViewHandle, RunViewError> {
        let (actor, actor_task) = Actor::spawn(
            None,
            RunViewActor,
            RunViewArguments {
                run_id: run_id.clone(),
                series_capacity: config.series_capacity,
            },
        )
        .await
        .map_err(|e| RunViewError::Spawn(e.to_string()))?;

        let cancel = CancellationToken::new();
        let poller = SnapshotPoller::new(
            backend.clone(),
            run_id.clone(),
            config.poll_interval,
            config.pages_limit,
            cancel.child_token(),
        );
        let tasks = vec![poller.spawn(actor.clone())];

        tracing::info!(run_id = %run_id, "Run view opened");

        Ok(RunViewHandle {
            run_id,
            actor,
            actor_task: Some(actor_task),
            cancel,
            tasks,
            backend,
            released: false,
        })
    }
}

/// Owner of one open run view
pub struct RunViewHandle {
    run_id: RunId,
    actor: ActorRef<RunViewMsg>,
    actor_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    backend: Arc<dyn RunBackend>,
    released: bool,
}

impl RunViewHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub async fn status(&self) -> Result<ConnectionStatus, RunViewError> {
        self.ensure_open()?;
        ractor::call!(self.actor, |reply| RunViewMsg::GetStatus { reply })
            .map_err(|e| RunViewError::Rpc(e.to_string()))
    }

    pub async fn snapshot(&self) -> Result<RunViewSnapshot, RunViewError> {
        self.ensure_open()?;
        ractor::call!(self.actor, |reply| RunViewMsg::GetSnapshot { reply })
            .map_err(|e| RunViewError::Rpc(e.to_string()))
    }

    /// Events emitted after this call. A lagging receiver loses the oldest
    /// events, never the state itself.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<RunViewEvent>, RunViewError> {
        self.ensure_open()?;
        ractor::call!(self.actor, |reply| RunViewMsg::Subscribe { reply })
            .map_err(|e| RunViewError::Rpc(e.to_string()))
    }

    /// Hand a transport event to the view as if the event stream produced it.
    pub fn deliver(&self, event: TransportEvent) -> Result<(), RunViewError> {
        self.ensure_open()?;
        self.actor
            .cast(RunViewMsg::Transport(event))
            .map_err(|e| RunViewError::Rpc(e.to_string()))
    }

    /// Enter `stopped` without touching the backend.
    pub async fn mark_stopped(&self) -> Result<ConnectionStatus, RunViewError> {
        self.ensure_open()?;
        ractor::call!(self.actor, |reply| RunViewMsg::MarkStopped { reply })
            .map_err(|e| RunViewError::Rpc(e.to_string()))
    }

    /// Ask the backend to stop the run, then enter `stopped`. A backend
    /// failure leaves the status untouched.
    pub async fn stop_run(&self) -> Result<ConnectionStatus, RunViewError> {
        self.ensure_open()?;
        self.backend.stop_run(&self.run_id).await?;
        self.mark_stopped().await
    }

    /// Release the event stream, the poller and the actor, and wait for the
    /// actor to finish.
    pub async fn close(mut self) {
        self.release();
        if let Some(task) = self.actor_task.take() {
            let _ = task.await;
        }
    }

    fn ensure_open(&self) -> Result<(), RunViewError> {
        if self.released {
            Err(RunViewError::Closed)
        } else {
            Ok(())
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.actor.stop(Some("run view closed".to_string()));
        tracing::info!(run_id = %self.run_id, "Run view closed");
    }
}

impl Drop for RunViewHandle {
    fn drop(&mut self) {
        self.release();
    }
}
