//! TTL-bounded memoization of AI replies.
//!
//! Expiry is lazy: an entry past its TTL is treated as absent by [`ResponseCache::get_at`]
//! and dropped there, and [`ResponseCache::sweep_at`] reclaims whatever nobody asked
//! for again. Both paths go through [`is_fresh`].

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use sha2::{Digest, Sha256};

/// Kind of content a reply was produced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentTag {
    Text,
    Voice,
}

impl ContentTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentTag::Text => "text",
            ContentTag::Voice => "voice",
        }
    }
}

/// Cache key derived from a content tag and the content itself.
///
/// Text is keyed by the raw message body, voice by the transport's file id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(tag: ContentTag, content: &str) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("{}:{hex}", tag.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    reply: String,
    created_at: Instant,
}

/// The single validity predicate shared by reads and sweeps.
pub fn is_fresh(created_at: Instant, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(created_at) < ttl
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &Fingerprint, now: Instant) -> Option<String> {
        let mut entries = self.lock();
        let fresh = entries
            .get(key)
            .map(|e| is_fresh(e.created_at, now, self.ttl))?;
        if fresh {
            return entries.get(key).map(|e| e.reply.clone());
        }
        entries.remove(key);
        None
    }

    pub fn put(&self, key: Fingerprint, reply: String) {
        self.put_at(key, reply, Instant::now());
    }

    pub fn put_at(&self, key: Fingerprint, reply: String, now: Instant) {
        self.lock().insert(
            key,
            CacheEntry {
                reply,
                created_at: now,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| is_fresh(e.created_at, now, self.ttl));
        before - entries.len()
    }

    /// Physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        // Entries stay consistent even if a holder panicked; every mutation is a single call.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
