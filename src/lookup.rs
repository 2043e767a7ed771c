use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::CardRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no card matches '{0}'")]
    NotFound(String),
    #[error("lookup deadline exceeded")]
    DeadlineExceeded,
    #[error("lookup service unavailable: {0}")]
    Unavailable(String),
    #[error("lookup client has been shut down")]
    Closed,
}

/// Fuzzy name lookup against a card reference.
pub trait CardLookup: Send + Sync {
    fn lookup_fuzzy(&self, name: &str) -> impl Future<Output = std::result::Result<CardRecord, LookupError>> + Send;
}

struct ClientInner<L> {
    backend: L,
    closed: AtomicBool,
}

/// Process-wide lookup handle shared by every card task.
///
/// Created once with [`LookupClient::init`], cloned into tasks, and closed
/// with [`LookupClient::shutdown`]. Calls after shutdown fail with
/// [`LookupError::Closed`].
pub struct LookupClient<L> {
    inner: Arc<ClientInner<L>>,
}

impl<L> Clone for LookupClient<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: CardLookup> LookupClient<L> {
    pub fn init(backend: L) -> Self {
        info!("lookup client initialized");
        Self {
            inner: Arc::new(ClientInner {
                backend,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            info!("lookup client shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> &L {
        &self.inner.backend
    }

    /// Runs the lookup, failing with `DeadlineExceeded` once `deadline` passes.
    pub async fn lookup_by_deadline(
        &self,
        name: &str,
        deadline: Instant,
    ) -> std::result::Result<CardRecord, LookupError> {
        if self.is_closed() {
            return Err(LookupError::Closed);
        }
        match tokio::time::timeout_at(deadline, self.inner.backend.lookup_fuzzy(name)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::DeadlineExceeded),
        }
    }
}

/// In-process card reference loaded from a JSON array of [`CardRecord`].
#[derive(Debug, Clone)]
pub struct CatalogLookup {
    cards: Vec<CardRecord>,
    keys: Vec<String>,
}

impl CatalogLookup {
    pub fn new(cards: Vec<CardRecord>) -> Self {
        let keys = cards.iter().map(|c| normalize(&c.name)).collect();
        Self { cards, keys }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let cards: Vec<CardRecord> = serde_json::from_str(text)?;
        Ok(Self::new(cards))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&text)?;
        info!(path = %path.as_ref().display(), cards = catalog.len(), "card catalog loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Exact match, then a unique prefix, then the closest name by edit distance.
    pub fn find(&self, query: &str) -> Option<&CardRecord> {
        let q = normalize(query);
        if q.is_empty() {
            return None;
        }

        if let Some(i) = self.keys.iter().position(|k| *k == q) {
            return Some(&self.cards[i]);
        }

        let mut prefixed = self.keys.iter().enumerate().filter(|(_, k)| k.starts_with(&q));
        if let (Some((i, _)), None) = (prefixed.next(), prefixed.next()) {
            return Some(&self.cards[i]);
        }

        let budget = (q.len() / 4).max(2);
        self.keys
            .iter()
            .enumerate()
            .map(|(i, k)| (levenshtein(&q, k), i))
            .filter(|(d, _)| *d <= budget)
            .min()
            .map(|(_, i)| &self.cards[i])
    }
}

impl CardLookup for CatalogLookup {
    async fn lookup_fuzzy(&self, name: &str) -> std::result::Result<CardRecord, LookupError> {
        match self.find(name) {
            Some(card) => {
                debug!(query = name, matched = %card.name, "catalog hit");
                Ok(card.clone())
            }
            None => Err(LookupError::NotFound(name.to_string())),
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn catalog() -> CatalogLookup {
        CatalogLookup::new(vec![
            CardRecord::named("Sol Ring"),
            CardRecord::named("Solemn Simulacrum"),
            CardRecord::named("Lightning Bolt"),
            CardRecord::named("Llanowar Elves"),
        ])
    }

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn exact_match_ignores_case_and_punctuation() {
        assert_eq!(catalog().find("  SOL RING\n").unwrap().name, "Sol Ring");
    }

    #[test]
    fn unique_prefix_matches() {
        assert_eq!(catalog().find("Lightning").unwrap().name, "Lightning Bolt");
        // prefixes two names and is too short to be near either
        assert!(catalog().find("Sol").is_none());
    }

    #[test]
    fn ocr_typos_are_tolerated() {
        assert_eq!(catalog().find("Sol Rnig").unwrap().name, "Sol Ring");
        assert_eq!(catalog().find("Llanowar Elvcs").unwrap().name, "Llanowar Elves");
    }

    #[test]
    fn unrelated_text_is_not_found() {
        assert!(catalog().find("Counterspell").is_none());
        assert!(catalog().find("").is_none());
    }

    #[test]
    fn catalog_parses_extra_fields() {
        let c = CatalogLookup::from_json(
            r#"[{"name": "Sol Ring", "set": "C21", "rarity": "uncommon"}]"#,
        )
        .unwrap();
        let card = c.find("sol ring").unwrap();
        assert_eq!(card.set.as_deref(), Some("C21"));
        assert_eq!(card.extra["rarity"], "uncommon");
    }

    struct Stalled;

    impl CardLookup for Stalled {
        async fn lookup_fuzzy(&self, _name: &str) -> std::result::Result<CardRecord, LookupError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(LookupError::Unavailable("never".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_off_slow_backend() {
        let client = LookupClient::init(Stalled);
        let deadline = Instant::now() + Duration::from_secs(2);
        let err = client.lookup_by_deadline("Sol Ring", deadline).await.unwrap_err();
        assert_eq!(err, LookupError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn shutdown_closes_every_clone() {
        let client = LookupClient::init(catalog());
        let handle = client.clone();
        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(handle.lookup_by_deadline("Sol Ring", deadline).await.is_ok());

        client.shutdown();
        assert!(handle.is_closed());
        assert_eq!(
            handle.lookup_by_deadline("Sol Ring", deadline).await,
            Err(LookupError::Closed)
        );
    }
}
