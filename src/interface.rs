//! Session interface for facade callers.
//!
//! This module provides the thin operations a network facade calls:
//! opening a session against a frozen graph, recording selections and
//! reading the current state back. Sessions live in a bounded store with
//! least-recently-used eviction, and session identifiers are opaque fresh
//! unique strings. The goal is to keep session concerns here without
//! invasive changes to the graph, which stays read-only and shared.
//!
//! Recording a selection only verifies that the named edge exists in the
//! graph; no constraint resolution happens here.

use std::collections::{HashMap, VecDeque};
use std::hash::Hasher;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use seahash::SeaHasher;
use serde::Serialize;

use crate::construct::{Construct, ConstructKind, OtherHasher};
use crate::error::{KunskapError, Result};
use crate::graph::KnowledgeGraph;

pub const DEFAULT_SESSION_CAPACITY: usize = 64;

// ------------- SessionIdGenerator -------------
/// Produces fresh unique opaque strings. Uniqueness within a process
/// lifetime is guaranteed by the counter; the hashed prefix keeps the ids
/// opaque across restarts.
#[derive(Debug)]
pub struct SessionIdGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        Self {
            seed: nanos as u64,
            counter: AtomicU64::new(0),
        }
    }
    pub fn fresh(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = SeaHasher::default();
        hasher.write_u64(self.seed);
        hasher.write_u64(n);
        format!("{:016x}-{:x}", hasher.finish(), n)
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Session -------------
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    purpose: String,
    variant: String,
}

impl Selection {
    pub fn purpose(&self) -> &str {
        &self.purpose
    }
    pub fn variant(&self) -> &str {
        &self.variant
    }
}

/// A snapshot of one session, marshalled as-is by the facade.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Default)]
struct Session {
    // purpose -> variant, in selection order
    selections: Vec<Selection>,
}

struct Inner {
    sessions: HashMap<String, Session, OtherHasher>,
    // front is coldest; touching a session moves it to the back
    recency: VecDeque<String>,
}

// ------------- SessionStore -------------
/// Bounded session registry with least-recently-used eviction.
pub struct SessionStore {
    graph: Arc<KnowledgeGraph>,
    capacity: usize,
    ids: SessionIdGenerator,
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new(graph: Arc<KnowledgeGraph>, capacity: usize) -> Self {
        Self {
            graph,
            capacity: capacity.max(1),
            ids: SessionIdGenerator::new(),
            inner: Mutex::new(Inner {
                sessions: HashMap::default(),
                recency: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|cause| KunskapError::Lock(cause.to_string()))
    }

    /// Opens a fresh session, evicting the coldest one at capacity.
    pub fn init(&self) -> Result<String> {
        let id = self.ids.fresh();
        let mut inner = self.lock()?;
        if inner.sessions.len() >= self.capacity {
            if let Some(coldest) = inner.recency.pop_front() {
                inner.sessions.remove(&coldest);
            }
        }
        inner.sessions.insert(id.clone(), Session::default());
        inner.recency.push_back(id.clone());
        Ok(id)
    }

    fn touch(inner: &mut Inner, id: &str) {
        if let Some(index) = inner.recency.iter().position(|known| known == id) {
            let _ = inner.recency.remove(index);
        }
        inner.recency.push_back(id.to_owned());
    }

    /// The current state of a session.
    pub fn current(&self, id: &str) -> Result<SessionView> {
        let mut inner = self.lock()?;
        let session = inner.sessions.get(id).ok_or_else(|| KunskapError::NotFound {
            kind: ConstructKind::Session,
            id: id.to_owned(),
        })?;
        let view = SessionView {
            id: id.to_owned(),
            selections: session.selections.clone(),
        };
        Self::touch(&mut inner, id);
        Ok(view)
    }

    /// Records that a variant was chosen for a purpose. The pair must be a
    /// fulfils edge of the graph; re-selecting a purpose replaces the
    /// earlier choice.
    pub fn select(&self, id: &str, purpose_id: &str, variant_id: &str) -> Result<()> {
        let fulfilling = self.graph.fulfilling_variants(purpose_id)?;
        if !fulfilling.iter().any(|variant| variant.id() == variant_id) {
            // distinguish an unknown variant from a known one on the wrong edge
            self.graph.variant(variant_id)?;
            return Err(KunskapError::DoesNotFulfil {
                purpose: purpose_id.to_owned(),
                variant: variant_id.to_owned(),
            });
        }
        let mut inner = self.lock()?;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| KunskapError::NotFound {
                kind: ConstructKind::Session,
                id: id.to_owned(),
            })?;
        session
            .selections
            .retain(|selection| selection.purpose() != purpose_id);
        session.selections.push(Selection {
            purpose: purpose_id.to_owned(),
            variant: variant_id.to_owned(),
        });
        Self::touch(&mut inner, id);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.sessions.contains_key(id))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.sessions.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.sessions.is_empty())
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }
}
