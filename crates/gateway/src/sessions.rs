//! In-memory conversation sessions.
//!
//! A session keeps the message history of one conversation, so clients may
//! send only their newest message, and owns the tool cache used when caching
//! is session-scoped. The store is bounded; the least recently used session
//! is evicted when a new one would exceed the limit.

use agentwire_agent::ToolCache;
use agentwire_core::message::{Message, Role};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

struct Session {
    history: Vec<Message>,
    cache: Arc<ToolCache>,
    last_used: Instant,
}

/// The conversation a run continues, split into prior turns and the new request.
#[derive(Debug, Clone)]
pub struct Turn {
    pub history: Vec<Message>,
    pub request: String,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
    cache_ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(max_sessions: usize, cache_ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            cache_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split `incoming` into history and request, merging with the session.
    ///
    /// The request is the last user message. Messages before it are the
    /// client's view of the history; when the client sends none, the
    /// session's stored history is used instead. The request itself is not
    /// stored until [`record_reply`](Self::record_reply) pairs it with an
    /// answer, so a failed run leaves the session as it was. Returns `None`
    /// when there is no non-empty user message.
    pub fn begin(&self, session_id: Option<&str>, mut incoming: Vec<Message>) -> Option<Turn> {
        let last_user = incoming.iter().rposition(|m| m.role == Role::User)?;
        incoming.truncate(last_user + 1);
        let user = incoming.pop()?;
        if user.content.trim().is_empty() {
            return None;
        }
        let request = user.content.clone();

        let Some(session_id) = session_id else {
            return Some(Turn {
                history: incoming,
                request,
            });
        };

        let mut sessions = self.lock();
        let session = self.entry(&mut sessions, session_id);
        if !incoming.is_empty() {
            session.history = incoming;
        }
        let history = session.history.clone();
        debug!(session_id, turns = history.len(), "Session turn started");
        Some(Turn { history, request })
    }

    /// Append a completed exchange to the session.
    pub fn record_reply(&self, session_id: &str, request: &str, reply: &str) {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get_mut(session_id) {
            session.history.push(Message::user(request));
            session.history.push(Message::assistant(reply));
            session.last_used = Instant::now();
        }
    }

    /// The session's tool cache, creating the session if needed.
    pub fn cache_for(&self, session_id: &str) -> Arc<ToolCache> {
        let mut sessions = self.lock();
        self.entry(&mut sessions, session_id).cache.clone()
    }

    pub fn history(&self, session_id: &str) -> Option<Vec<Message>> {
        self.lock().get(session_id).map(|s| s.history.clone())
    }

    fn entry<'a>(&self, sessions: &'a mut HashMap<String, Session>, session_id: &str) -> &'a mut Session {
        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(session_id = %oldest, "Evicting least recently used session");
                sessions.remove(&oldest);
            }
        }
        let ttl = self.cache_ttl;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| Session {
            history: Vec::new(),
            cache: Arc::new(ToolCache::with_ttl(ttl)),
            last_used: Instant::now(),
        });
        session.last_used = Instant::now();
        session
    }
}
