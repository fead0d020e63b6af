// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-session serialization: two runs against the same session id never
//! interleave their message history, but independent sessions run fully
//! concurrently. An empty session id bypasses locking entirely — ephemeral,
//! unscoped runs are never serialized against each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct SessionLockRegistry {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the serialization lock for `session_id`, holding it until the
    /// returned guard is dropped. Returns `None` for an empty id.
    pub async fn acquire(&self, session_id: &str) -> Option<OwnedMutexGuard<()>> {
        if session_id.is_empty() {
            return None;
        }
        let entry = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        Some(entry.lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_session_id_serializes_concurrent_holders() {
        let registry = Arc::new(SessionLockRegistry::new());
        let max_concurrent = Arc::new(AtomicU32::new(0));
        let current = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let registry = registry.clone();
            let max_concurrent = max_concurrent.clone();
            let current = current.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("sess-1").await;
                let n = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_session_ids_run_concurrently() {
        let registry = Arc::new(SessionLockRegistry::new());
        let current = Arc::new(AtomicU32::new(0));
        let max_concurrent = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let registry = registry.clone();
            let current = current.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(&format!("sess-{i}")).await;
                let n = current.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_concurrent.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn empty_session_id_bypasses_locking() {
        let registry = SessionLockRegistry::new();
        assert!(registry.acquire("").await.is_none());
    }
}
