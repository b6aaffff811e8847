//! Session-scoped state: target database and causal bookmarks.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Opaque causal-consistency token.
///
/// Holds the bookmark strings the server reported for a transaction. A
/// call carrying these bookmarks observes at least the effects of that
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmarks(Vec<String>);

impl Bookmarks {
    pub fn new(bookmarks: Vec<String>) -> Self {
        Self(bookmarks)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<String> for Bookmarks {
    fn from(bookmark: String) -> Self {
        Self(vec![bookmark])
    }
}

impl From<&str> for Bookmarks {
    fn from(bookmark: &str) -> Self {
        Self(vec![bookmark.to_string()])
    }
}

/// Database and bookmarks a call was issued with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub database: Option<String>,
    pub bookmarks: Option<Bookmarks>,
}

#[derive(Debug, Default)]
struct SessionInner {
    database: Option<String>,
    bookmarks: Option<Bookmarks>,
    last_bookmarks: Option<Bookmarks>,
}

/// Mutable session state owned by one runner.
///
/// Every read and write takes the same lock, and the lock is never held
/// across an await point. Completions are recorded under the lock, so
/// `last_bookmarks` always belongs to the call that completed last.
#[derive(Debug, Default)]
pub struct SessionState {
    inner: Mutex<SessionInner>,
}

impl SessionState {
    pub fn new(database: Option<String>) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                database,
                ..SessionInner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // State is plain data, so a panic elsewhere cannot leave it half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn database(&self) -> Option<String> {
        self.lock().database.clone()
    }

    pub fn set_database(&self, database: Option<String>) {
        self.lock().database = database;
    }

    /// Bookmarks attached to the next outgoing call.
    pub fn bookmarks(&self) -> Option<Bookmarks> {
        self.lock().bookmarks.clone()
    }

    pub fn set_bookmarks(&self, bookmarks: Option<Bookmarks>) {
        self.lock().bookmarks = bookmarks;
    }

    /// Bookmarks produced by the most recently completed call.
    pub fn last_bookmarks(&self) -> Option<Bookmarks> {
        self.lock().last_bookmarks.clone()
    }

    /// Captures the state a call is issued with.
    ///
    /// A per-call database takes precedence over the session database.
    pub fn snapshot(&self, database: Option<&str>) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            database: database.map(str::to_string).or_else(|| inner.database.clone()),
            bookmarks: inner.bookmarks.clone(),
        }
    }

    /// Records the bookmarks a completed call produced.
    ///
    /// `last_bookmarks` always takes the produced value; the outgoing
    /// bookmarks only advance when the call produced any.
    pub fn record_completion(&self, produced: Option<Bookmarks>) {
        let mut inner = self.lock();
        if let Some(bookmarks) = &produced {
            inner.bookmarks = Some(bookmarks.clone());
        }
        inner.last_bookmarks = produced;
    }
}
