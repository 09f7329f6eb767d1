//! Connection registry: live push channels grouped by session

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::state::ServerMessage;

/// Observer role of a push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Receives only its own session's updates
    Owner,
    /// Receives updates for every session
    Supervisor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => f.write_str("owner"),
            Role::Supervisor => f.write_str("supervisor"),
        }
    }
}

pub type ChannelId = u64;

/// Identity of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub id: ChannelId,
    pub session_id: Arc<str>,
    pub role: Role,
}

/// A registry entry: identity plus the outbound queue of its connection
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub key: ChannelKey,
    pub(crate) tx: mpsc::Sender<ServerMessage>,
}

impl ChannelHandle {
    pub fn id(&self) -> ChannelId {
        self.key.id
    }

    pub fn role(&self) -> Role {
        self.key.role
    }

    pub fn session_id(&self) -> &str {
        &self.key.session_id
    }
}

type SessionChannels = HashMap<ChannelId, ChannelHandle>;

/// Concurrency-safe mapping from session id to its live channels.
///
/// A session may hold any number of channels of either role; registering a
/// new one never displaces an existing one. The registry holds the only
/// sender of each channel's outbound queue, so unregistering closes the queue
/// and lets the connection's writer finish.
#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<Arc<str>, SessionChannels>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ConnectionRegistry {
    /// `buffer` bounds each channel's outbound queue
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Add a channel. The returned guard unregisters it when dropped; the
    /// receiver yields every message broadcast to it.
    pub fn register(
        self: &Arc<Self>,
        session_id: &str,
        role: Role,
    ) -> (ChannelGuard, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let key = ChannelKey {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            session_id: Arc::from(session_id),
            role,
        };
        let handle = ChannelHandle {
            key: key.clone(),
            tx,
        };

        {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            sessions
                .entry(Arc::clone(&key.session_id))
                .or_default()
                .insert(key.id, handle);
        }
        debug!(channel = key.id, session_id, %role, "Registered channel");

        let guard = ChannelGuard {
            registry: Arc::clone(self),
            key,
        };
        (guard, rx)
    }

    /// Remove a channel. Only the first of any number of racing calls for
    /// the same key removes it and returns `true`.
    pub fn unregister(&self, key: &ChannelKey) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(channels) = sessions.get_mut(&key.session_id) else {
            return false;
        };
        let removed = channels.remove(&key.id).is_some();
        if channels.is_empty() {
            sessions.remove(&key.session_id);
        }
        drop(sessions);

        if removed {
            debug!(channel = key.id, session_id = %key.session_id, role = %key.role, "Unregistered channel");
        }
        removed
    }

    /// Every channel registered under `session_id`, any role
    pub fn channels_for(&self, session_id: &str) -> Vec<ChannelHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every supervisor channel, whatever its session
    pub fn all_supervisors(&self) -> Vec<ChannelHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .values()
            .flat_map(|channels| channels.values())
            .filter(|handle| handle.role() == Role::Supervisor)
            .cloned()
            .collect()
    }

    /// Channels of `session_id` plus all supervisors, each at most once,
    /// copied under a single read lock
    pub fn session_and_supervisors(&self, session_id: &str) -> Vec<ChannelHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .iter()
            .flat_map(|(session, channels)| {
                let same_session = session.as_ref() == session_id;
                channels
                    .values()
                    .filter(move |handle| same_session || handle.role() == Role::Supervisor)
            })
            .cloned()
            .collect()
    }

    /// Owner channels of `session_id` plus all supervisors, each at most once
    pub fn owners_and_supervisors(&self, session_id: &str) -> Vec<ChannelHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .iter()
            .flat_map(|(session, channels)| {
                let same_session = session.as_ref() == session_id;
                channels.values().filter(move |handle| {
                    handle.role() == Role::Supervisor || (same_session && handle.role() == Role::Owner)
                })
            })
            .cloned()
            .collect()
    }

    /// Total number of live channels
    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unregisters its channel on drop, covering every exit path of a channel task
#[derive(Debug)]
pub struct ChannelGuard {
    registry: Arc<ConnectionRegistry>,
    key: ChannelKey,
}

impl ChannelGuard {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.key);
    }
}
