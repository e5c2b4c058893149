use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use uuid::Uuid;

#[derive(Debug, Clone)]
struct RawPage {
    html: String,
    expires_at: Instant,
}

/// Short-lived copies of fetched shift pages, keyed by an unguessable token.
#[derive(Debug)]
pub struct RawPageStore {
    ttl: Duration,
    pages: Mutex<HashMap<Uuid, RawPage>>,
}

impl RawPageStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pages: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores a page and returns its token. Expired pages are purged first.
    pub fn put(&self, html: impl Into<String>) -> Uuid {
        let now = Instant::now();
        let token = Uuid::new_v4();
        let mut pages = self.lock();
        pages.retain(|_, page| page.expires_at > now);
        pages.insert(
            token,
            RawPage {
                html: html.into(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    pub fn get(&self, token: &Uuid) -> Option<String> {
        let now = Instant::now();
        let mut pages = self.lock();
        match pages.get(token) {
            Some(page) if page.expires_at > now => Some(page.html.clone()),
            Some(_) => {
                pages.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RawPage>> {
        self.pages.lock().expect("raw page store mutex poisoned")
    }
}
