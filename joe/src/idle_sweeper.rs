//! The idle-sweep background task: the one periodic
//! maintenance job this engine runs, grounded in shape (not code) on
//! `mira-chat/src/main.rs`'s hourly artifact-maintenance `tokio::spawn`
//! loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::messenger::Messenger;
use crate::model::Message;
use crate::session_manager::SessionManager;
use crate::user_registry::UserRegistry;

/// Runs one sweep pass: stops any session whose `last_action_ts` is
/// older than its clone's `max_idle_minutes` *and* whose clone the lab
/// reports inactive (if the lab still reports it active, the engine
/// defers to the lab's own timers). Publishes one summary message per
/// channel that had at least one stopped user; a publish failure doesn't
/// roll back the stops already performed.
pub async fn sweep(registry: &UserRegistry, session_mgr: &SessionManager, messenger: &dyn Messenger) {
    let mut stopped_by_channel: HashMap<String, Vec<String>> = HashMap::new();

    for user_id in registry.snapshot_ids().await {
        let Some(user_lock) = registry.get(&user_id).await else {
            continue;
        };
        let mut user = user_lock.lock().await;

        let Some(handle) = &user.session.clone_handle else {
            continue;
        };

        let minutes_idle = user.session.last_action_ts.elapsed().as_secs() / 60;
        if minutes_idle < handle.clone.max_idle_minutes as u64 {
            continue;
        }

        let clone_id = handle.clone.id.clone();
        if session_mgr.is_active(&clone_id).await {
            continue;
        }

        let channel = user.session.channel_id.clone();
        session_mgr.stop(&mut user.session);

        if let Some(channel) = channel {
            stopped_by_channel
                .entry(channel)
                .or_default()
                .push(format!("<@{}>", user.user_info.id));
        }
    }

    for (channel, users) in stopped_by_channel {
        let mut summary = Message::for_channel(&channel);
        summary.append(&format!("Stopped idle sessions for: {}", users.join(", ")));
        if let Err(e) = messenger.publish(&mut summary).await {
            tracing::warn!("failed to publish idle-sweep summary to {channel}: {e}");
        }
    }
}

/// Spawns the sweep loop on a one-minute ticker.
/// Returns a handle the caller can abort on shutdown (the sweeper is
/// stopped first when the process is asked to exit).
pub fn spawn(
    registry: Arc<UserRegistry>,
    session_mgr: Arc<SessionManager>,
    messenger: Arc<dyn Messenger>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(joe_core::IDLE_SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            sweep(&registry, &session_mgr, messenger.as_ref()).await;
        }
    })
}
