//! Per-session state and the duplicate-query guard

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome of the duplicate-query guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// First time this session asks for the postcode, resolve it
    Fresh,
    /// Same postcode as the last query in this session
    AlreadyProcessed,
}

/// State carried by one visitor session
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    last_processed: Option<String>,
}

impl SessionContext {
    pub fn last_processed(&self) -> Option<&str> {
        self.last_processed.as_deref()
    }

    /// Compare against the last processed postcode and record it when new
    pub fn check_and_record(&mut self, postcode: &str) -> GuardDecision {
        if self.last_processed.as_deref() == Some(postcode) {
            GuardDecision::AlreadyProcessed
        } else {
            self.last_processed = Some(postcode.to_string());
            GuardDecision::Fresh
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    context: SessionContext,
    last_seen: Instant,
}

/// Session resolved for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    /// A new session was started and its id must be handed to the client
    pub is_new: bool,
}

pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// In-memory session contexts keyed by an opaque id
pub struct SessionStore {
    ttl: Duration,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Upper bound on live sessions; at least one is always kept
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Continue the requested session if it is still live, otherwise start a
    /// new one. `restart` always starts a new session.
    pub async fn open(&self, requested: Option<&str>, restart: bool) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        self.prune(&mut sessions);

        if let Some(id) = requested {
            if restart {
                sessions.remove(id);
            } else if let Some(entry) = sessions.get_mut(id) {
                entry.last_seen = Instant::now();
                return SessionHandle { id: id.to_string(), is_new: false };
            }
        }

        let id = new_session_id();
        debug!("Starting session {}", id);
        self.insert(&mut sessions, id.clone());
        SessionHandle { id, is_new: true }
    }

    /// Run the duplicate-query guard for `postcode` in session `id`
    pub async fn check_and_record(&self, id: &str, postcode: &str) -> GuardDecision {
        let mut sessions = self.sessions.lock().await;
        self.prune(&mut sessions);
        if !sessions.contains_key(id) {
            self.insert(&mut sessions, id.to_string());
        }
        match sessions.get_mut(id) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                entry.context.check_and_record(postcode)
            }
            None => GuardDecision::Fresh,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    fn prune(&self, sessions: &mut HashMap<String, SessionEntry>) {
        let ttl = self.ttl;
        sessions.retain(|_, entry| entry.last_seen.elapsed() < ttl);
    }

    // Evicts the least recently seen sessions to stay under the cap
    fn insert(&self, sessions: &mut HashMap<String, SessionEntry>, id: String) {
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!("Session cap reached, dropping {}", oldest);
            sessions.remove(&oldest);
        }
        sessions.insert(
            id,
            SessionEntry { context: SessionContext::default(), last_seen: Instant::now() },
        );
    }
}

fn new_session_id() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}
