//! Thread store: conversation state keyed by thread identifier.
//!
//! Each thread's [`Conversation`] sits behind its own async mutex, so turns on
//! the same thread queue up in arrival order while different threads proceed
//! independently. The store can be bounded by capacity and idle time, and can
//! journal committed messages to SQLite so threads survive restarts.

mod journal;

pub use journal::ThreadJournal;

use crate::config::{Settings, ThreadSettings};
use crate::conversation::{Conversation, Message};
use crate::error::{Result, TolkError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

/// Summary of a thread held in memory.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub messages: usize,
    pub last_active: DateTime<Utc>,
}

struct ThreadEntry {
    state: Arc<AsyncMutex<Conversation>>,
    last_active: Mutex<DateTime<Utc>>,
    len: AtomicUsize,
    removed: AtomicBool,
}

impl ThreadEntry {
    fn new(conversation: Conversation) -> Self {
        Self {
            len: AtomicUsize::new(conversation.len()),
            state: Arc::new(AsyncMutex::new(conversation)),
            last_active: Mutex::new(Utc::now()),
            removed: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }

    fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-process store of conversation threads.
pub struct ThreadStore {
    threads: Mutex<HashMap<String, Arc<ThreadEntry>>>,
    journal: Option<Arc<ThreadJournal>>,
    max_threads: Option<usize>,
    idle_ttl: Option<Duration>,
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ThreadStore {
    /// Create an unbounded, memory-only store.
    pub fn in_memory() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            journal: None,
            max_threads: None,
            idle_ttl: None,
        }
    }

    /// Create a store configured from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let threads: &ThreadSettings = &settings.threads;
        let mut store = Self::in_memory();

        if threads.persist {
            store = store.with_journal(ThreadJournal::open(&settings.sqlite_path())?);
        }
        if let Some(max) = threads.max_threads {
            store = store.with_max_threads(max);
        }
        if let Some(ttl) = threads.idle_ttl_seconds {
            store = store.with_idle_ttl(Duration::from_secs(ttl));
        }

        Ok(store)
    }

    /// Journal committed messages and hydrate threads from it.
    pub fn with_journal(mut self, journal: ThreadJournal) -> Self {
        self.journal = Some(Arc::new(journal));
        self
    }

    /// Keep at most `max` threads in memory.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = Some(max.max(1));
        self
    }

    /// Evict threads idle for longer than `ttl`.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }

    fn threads(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<ThreadEntry>>>> {
        self.threads
            .lock()
            .map_err(|e| TolkError::ThreadStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Resolve a thread, creating it on first reference.
    #[instrument(skip(self))]
    pub fn get_or_create(&self, thread_id: &str) -> Result<ThreadHandle> {
        if thread_id.trim().is_empty() {
            return Err(TolkError::InvalidInput("thread id must not be empty".to_string()));
        }

        let mut threads = self.threads()?;

        if let Some(entry) = threads.get(thread_id) {
            entry.touch();
            return Ok(self.handle(thread_id, entry.clone()));
        }

        let conversation = match &self.journal {
            Some(journal) => journal.load(thread_id)?,
            None => Conversation::new(thread_id),
        };
        debug!(
            "Creating thread {} with {} stored messages",
            thread_id,
            conversation.len()
        );

        if let Some(max) = self.max_threads {
            while threads.len() >= max {
                if Self::evict_lru(&mut threads).is_none() {
                    warn!("Thread store over capacity ({}), all threads busy", max);
                    break;
                }
            }
        }

        let entry = Arc::new(ThreadEntry::new(conversation));
        threads.insert(thread_id.to_string(), entry.clone());
        Ok(self.handle(thread_id, entry))
    }

    fn handle(&self, thread_id: &str, entry: Arc<ThreadEntry>) -> ThreadHandle {
        ThreadHandle {
            thread_id: thread_id.to_string(),
            entry,
            journal: self.journal.clone(),
        }
    }

    /// Copy of a thread's history, waiting for any in-flight turn to finish.
    pub async fn snapshot(&self, thread_id: &str) -> Result<Option<Conversation>> {
        let entry = self.threads()?.get(thread_id).cloned();

        match entry {
            Some(entry) => Ok(Some(entry.state.lock().await.clone())),
            None => match &self.journal {
                Some(journal) => {
                    let conversation = journal.load(thread_id)?;
                    Ok((!conversation.is_empty()).then_some(conversation))
                }
                None => Ok(None),
            },
        }
    }

    /// Drop a thread and its journaled history.
    ///
    /// Waits for an in-flight turn on the thread; turns queued behind it fail.
    #[instrument(skip(self))]
    pub async fn reset(&self, thread_id: &str) -> Result<bool> {
        // Journal rows are deleted under the map lock, which is also held
        // while `get_or_create` hydrates, so no new entry can load them.
        let existed = loop {
            let entry = self.threads()?.get(thread_id).cloned();

            match entry {
                Some(entry) => {
                    let _guard = entry.state.lock().await;
                    entry.removed.store(true, Ordering::SeqCst);

                    let mut threads = self.threads()?;
                    let replaced = threads
                        .get(thread_id)
                        .map(|current| !Arc::ptr_eq(current, &entry));
                    match replaced {
                        // Evicted and hydrated again while we waited.
                        Some(true) => continue,
                        Some(false) => {
                            threads.remove(thread_id);
                        }
                        None => {}
                    }
                    self.delete_journaled(thread_id)?;
                    break true;
                }
                None => {
                    let threads = self.threads()?;
                    if threads.contains_key(thread_id) {
                        // Hydrated since we looked; reset the live entry instead.
                        continue;
                    }
                    break self.delete_journaled(thread_id)?;
                }
            }
        };

        if existed {
            info!("Reset thread {}", thread_id);
        }
        Ok(existed)
    }

    fn delete_journaled(&self, thread_id: &str) -> Result<bool> {
        match &self.journal {
            Some(journal) => Ok(journal.delete(thread_id)? > 0),
            None => Ok(false),
        }
    }

    /// Threads currently held in memory, most recently active first.
    pub fn list(&self) -> Result<Vec<ThreadSummary>> {
        let threads = self.threads()?;
        let mut summaries: Vec<ThreadSummary> = threads
            .iter()
            .map(|(id, entry)| ThreadSummary {
                thread_id: id.clone(),
                messages: entry.len.load(Ordering::SeqCst),
                last_active: entry.last_active(),
            })
            .collect();

        summaries.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(summaries)
    }

    /// Number of threads held in memory.
    pub fn len(&self) -> usize {
        self.threads().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the idle TTL and capacity bounds, returning how many threads were evicted.
    ///
    /// Threads with a live handle or an in-flight turn are never evicted.
    pub fn evict_idle(&self) -> Result<usize> {
        let mut threads = self.threads()?;
        let before = threads.len();

        if let Some(ttl) = self.idle_ttl {
            let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
            let cutoff = Utc::now() - ttl;
            threads.retain(|id, entry| {
                let keep = Self::is_busy(entry) || entry.last_active() > cutoff;
                if !keep {
                    debug!("Evicting idle thread {}", id);
                }
                keep
            });
        }

        if let Some(max) = self.max_threads {
            while threads.len() > max {
                if Self::evict_lru(&mut threads).is_none() {
                    break;
                }
            }
        }

        let evicted = before - threads.len();
        if evicted > 0 {
            info!("Evicted {} thread(s)", evicted);
        }
        Ok(evicted)
    }

    /// Only the map holds the entry: no handle, guard or queued turn exists.
    fn is_busy(entry: &Arc<ThreadEntry>) -> bool {
        Arc::strong_count(entry) > 1
    }

    fn evict_lru(threads: &mut HashMap<String, Arc<ThreadEntry>>) -> Option<String> {
        let victim = threads
            .iter()
            .filter(|(_, entry)| !Self::is_busy(entry))
            .min_by_key(|(_, entry)| entry.last_active())
            .map(|(id, _)| id.clone())?;

        threads.remove(&victim);
        debug!("Evicted least recently used thread {}", victim);
        Some(victim)
    }
}

/// Reference to one thread in the store.
pub struct ThreadHandle {
    thread_id: String,
    entry: Arc<ThreadEntry>,
    journal: Option<Arc<ThreadJournal>>,
}

impl ThreadHandle {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Wait for exclusive access to the thread's conversation.
    pub async fn lock(self) -> ThreadGuard {
        let guard = self.entry.state.clone().lock_owned().await;
        self.entry.touch();
        ThreadGuard {
            guard,
            entry: self.entry,
            journal: self.journal,
        }
    }
}

/// Exclusive access to a thread's conversation.
///
/// The conversation can be read through `Deref`; changes go through
/// [`ThreadGuard::append`] or [`ThreadGuard::commit`] so they are journaled.
pub struct ThreadGuard {
    guard: OwnedMutexGuard<Conversation>,
    entry: Arc<ThreadEntry>,
    journal: Option<Arc<ThreadJournal>>,
}

impl ThreadGuard {
    /// Append a single message.
    pub fn append(&mut self, message: Message) -> Result<()> {
        let mut next = self.guard.clone();
        next.append(message)?;
        self.commit(next).map(|_| ())
    }

    /// Replace the stored conversation with an append-only extension of it.
    ///
    /// Returns the number of messages added.
    pub fn commit(&mut self, next: Conversation) -> Result<usize> {
        if self.entry.removed.load(Ordering::SeqCst) {
            return Err(TolkError::ThreadStore(format!(
                "thread '{}' was reset",
                self.guard.thread_id()
            )));
        }

        let start = self.guard.len();
        let mut staged = self.guard.clone();
        let added = staged.commit(next)?;

        if let Some(journal) = &self.journal {
            journal.append(staged.thread_id(), start, staged.since(start))?;
        }

        *self.guard = staged;
        self.entry.len.store(self.guard.len(), Ordering::SeqCst);
        self.entry.touch();
        Ok(added)
    }
}

impl std::ops::Deref for ThreadGuard {
    type Target = Conversation;

    fn deref(&self) -> &Conversation {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn add_exchange(store: &ThreadStore, thread_id: &str, question: &str) {
        let mut guard = store.get_or_create(thread_id).unwrap().lock().await;
        let mut next = guard.clone();
        next.append(Message::user(question)).unwrap();
        next.append(Message::assistant("ok")).unwrap();
        guard.commit(next).unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_thread() {
        let store = ThreadStore::in_memory();
        add_exchange(&store, "t1", "hello").await;

        let guard = store.get_or_create("t1").unwrap().lock().await;
        assert_eq!(guard.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_thread_id_rejected() {
        let store = ThreadStore::in_memory();
        assert!(store.get_or_create("  ").is_err());
    }

    #[tokio::test]
    async fn test_commit_rejects_rewrite() {
        let store = ThreadStore::in_memory();
        add_exchange(&store, "t1", "hello").await;

        let mut guard = store.get_or_create("t1").unwrap().lock().await;
        let rewritten = Conversation::from_messages("t1", vec![Message::user("other")]).unwrap();
        assert!(guard.commit(rewritten).is_err());
        assert_eq!(guard.len(), 2);
    }

    #[tokio::test]
    async fn test_turns_on_same_thread_are_serialized() {
        let store = Arc::new(ThreadStore::in_memory());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut guard = store.get_or_create("shared").unwrap().lock().await;
                let mut next = guard.clone();
                next.append(Message::user(format!("q{}", i))).unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                next.append(Message::assistant(format!("a{}", i))).unwrap();
                guard.commit(next).unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let conv = store.snapshot("shared").await.unwrap().unwrap();
        assert_eq!(conv.len(), 16);
        // Every question is immediately followed by its own answer.
        for pair in conv.messages().chunks(2) {
            let q = pair[0].content().trim_start_matches('q');
            let a = pair[1].content().trim_start_matches('a');
            assert_eq!(q, a);
        }
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let store = ThreadStore::in_memory().with_max_threads(2);
        add_exchange(&store, "a", "1").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        add_exchange(&store, "b", "2").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        add_exchange(&store, "c", "3").await;

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.thread_id).collect();
        assert_eq!(ids, vec!["c".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_eviction_skips_busy_threads() {
        let store = ThreadStore::in_memory()
            .with_max_threads(1)
            .with_idle_ttl(Duration::ZERO);

        let busy = store.get_or_create("busy").unwrap().lock().await;
        add_exchange(&store, "idle", "x").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        store.evict_idle().unwrap();
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.thread_id).collect();
        assert_eq!(ids, vec!["busy".to_string()]);
        drop(busy);
    }

    #[tokio::test]
    async fn test_reset_drops_history() {
        let store = ThreadStore::in_memory();
        add_exchange(&store, "t1", "hello").await;

        assert!(store.reset("t1").await.unwrap());
        assert!(store.snapshot("t1").await.unwrap().is_none());
        assert!(!store.reset("t1").await.unwrap());

        let guard = store.get_or_create("t1").unwrap().lock().await;
        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn test_commit_after_reset_fails() {
        let store = Arc::new(ThreadStore::in_memory());
        let mut guard = store.get_or_create("t1").unwrap().lock().await;

        let resetter = {
            let store = store.clone();
            tokio::spawn(async move { store.reset("t1").await.unwrap() })
        };

        // Let the reset queue up behind our guard, then release it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut next = guard.clone();
        next.append(Message::user("q")).unwrap();
        guard.commit(next).unwrap();
        drop(guard);
        assert!(resetter.await.unwrap());

        assert!(store.snapshot("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_with_journal_leaves_no_stale_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.db");
        let store = Arc::new(
            ThreadStore::in_memory().with_journal(ThreadJournal::open(&path).unwrap()),
        );
        assert!(store.is_persistent());
        add_exchange(&store, "t1", "old").await;

        // A turn that resolved the thread before the reset must not write back.
        let queued = store.get_or_create("t1").unwrap();
        let busy = store.get_or_create("t1").unwrap().lock().await;
        let resetter = {
            let store = store.clone();
            tokio::spawn(async move { store.reset("t1").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(busy);
        assert!(resetter.await.unwrap());

        let mut stale = queued.lock().await;
        let mut next = stale.clone();
        next.append(Message::user("late")).unwrap();
        assert!(stale.commit(next).is_err());
        drop(stale);

        // A fresh reference starts empty and journals from the beginning.
        add_exchange(&store, "t1", "new").await;
        drop(store);

        let reopened = ThreadStore::in_memory().with_journal(ThreadJournal::open(&path).unwrap());
        let snapshot = reopened.snapshot("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.messages()[0].content(), "new");
    }

    #[tokio::test]
    async fn test_reset_evicted_thread_deletes_journal() {
        let store = ThreadStore::in_memory()
            .with_journal(ThreadJournal::in_memory().unwrap())
            .with_idle_ttl(Duration::ZERO);
        add_exchange(&store, "t1", "old").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.evict_idle().unwrap(), 1);

        assert!(store.reset("t1").await.unwrap());
        let guard = store.get_or_create("t1").unwrap().lock().await;
        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn test_journal_hydrates_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.db");

        {
            let store = ThreadStore::in_memory().with_journal(ThreadJournal::open(&path).unwrap());
            add_exchange(&store, "t1", "first").await;
            add_exchange(&store, "t1", "second").await;
        }

        let store = ThreadStore::in_memory().with_journal(ThreadJournal::open(&path).unwrap());
        assert!(store.is_empty());
        let snapshot = store.snapshot("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 4);

        let guard = store.get_or_create("t1").unwrap().lock().await;
        assert_eq!(guard.messages()[2].content(), "second");
    }
}
