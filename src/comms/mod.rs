//! Comms layer — manages the front-end channels.
//!
//! # Architecture
//!
//! Each channel (PTY, HTTP) implements [`runtime::Component`] and is spawned
//! as an independent concurrent task by [`start`] via
//! [`runtime::spawn_components`]. Channels capture their shared
//! [`Arc<CommsState>`] at construction time; no state is passed through the
//! generic `Component::run` signature.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, query outcomes). This is drained in a
//! short-lived background task that dies naturally when all channel senders
//! are dropped.
//!
//! [`runtime::Component`]: crate::runtime::Component
//! [`runtime::spawn_components`]: crate::runtime::spawn_components

mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-axum")]
pub mod axum_channel;

pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::explorer::Explorer;
use crate::graph::svg::SvgArtifact;
use crate::runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn all configured channels and return a [`SubsystemHandle`].
///
/// Channels start immediately. If any channel exits with an error the shared
/// `shutdown` token is cancelled so siblings stop cooperatively. The handle
/// resolves when all channels have exited.
///
/// This function is synchronous; the caller decides when to await the handle.
pub fn start(config: &Config, explorer: Arc<Explorer>, shutdown: CancellationToken) -> SubsystemHandle {
    // Intra-subsystem event channel: channels → manager.
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(explorer, SvgArtifact::from_config(&config.graph), event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
    }

    #[cfg(feature = "channel-axum")]
    {
        if config.comms_axum_should_load() {
            info!(bind = %config.comms.axum_channel.bind, "loading axum channel");
            components.push(Box::new(axum_channel::AxumChannel::new(
                "axum0",
                config.comms.axum_channel.bind.clone(),
                state.clone(),
            )));
        }
    }
    // Config requests the axum channel but the feature was not compiled in.
    #[cfg(not(feature = "channel-axum"))]
    if config.comms_axum_should_load() {
        tracing::warn!(
            "config has [comms.axum_channel] enabled = true but this binary was compiled \
             without the `channel-axum` feature — channel will not start."
        );
    }

    if components.is_empty() {
        info!("no comms channels configured — waiting for shutdown");
    }

    // Drop our own sender so the drain ends once every channel has exited.
    drop(state);

    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::QueryAnswered { ref channel_id, concepts } => {
                    debug!(channel_id, concepts, "query answered");
                }
                CommsEvent::QueryFailed { ref channel_id } => {
                    debug!(channel_id, "query failed");
                }
            }
        }
    });

    spawn_components(components, shutdown)
}
