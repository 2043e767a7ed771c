use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::ResolverConfig;
use crate::detection::nameplate::NameplateExtractor;
use crate::detection::ocr::{RecognitionRequest, Recognizer};
use crate::lookup::{CardLookup, LookupClient, LookupError};
use crate::models::{CardLookupOutcome, ExtractedCard, FailureReason};

/// Recognizes and looks up every extracted card concurrently.
///
/// One task per card. All lookups of a call share a single deadline. A card
/// that fails yields a `Failure` outcome and never disturbs its siblings.
pub struct ConcurrentCardResolver<L, R> {
    lookup: LookupClient<L>,
    recognizer: Arc<R>,
    config: Arc<ResolverConfig>,
}

impl<L, R> ConcurrentCardResolver<L, R>
where
    L: CardLookup + 'static,
    R: Recognizer + 'static,
{
    pub fn new(lookup: LookupClient<L>, recognizer: Arc<R>, config: ResolverConfig) -> Self {
        Self {
            lookup,
            recognizer,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Returns exactly one outcome per card, in completion order.
    #[instrument(skip_all, fields(cards = cards.len()))]
    pub async fn resolve(
        &self,
        cards: Vec<ExtractedCard>,
        extractor: &NameplateExtractor,
    ) -> Vec<CardLookupOutcome> {
        let deadline = lookup_deadline(Instant::now(), self.config.lookup_budget);
        let mut expected = BTreeSet::new();
        let mut tasks = JoinSet::new();

        for card in cards {
            expected.insert(card.index);
            let task = CardTask {
                lookup: self.lookup.clone(),
                recognizer: Arc::clone(&self.recognizer),
                extractor: extractor.clone(),
                config: Arc::clone(&self.config),
                deadline,
            };
            tasks.spawn(task.run(card));
        }

        let mut outcomes = Vec::with_capacity(expected.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    expected.remove(&outcome.card_index());
                    outcomes.push(outcome);
                }
                Err(e) => warn!(error = %e, "card task did not complete"),
            }
        }

        // whatever is left belongs to tasks that panicked
        for card_index in expected {
            outcomes.push(CardLookupOutcome::Failure {
                card_index,
                reason: FailureReason::TaskPanicked,
                detected_text: None,
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(succeeded, failed = outcomes.len() - succeeded, "cards resolved");
        outcomes
    }
}

struct CardTask<L, R> {
    lookup: LookupClient<L>,
    recognizer: Arc<R>,
    extractor: NameplateExtractor,
    config: Arc<ResolverConfig>,
    deadline: Instant,
}

impl<L, R> CardTask<L, R>
where
    L: CardLookup + 'static,
    R: Recognizer + 'static,
{
    async fn run(self, card: ExtractedCard) -> CardLookupOutcome {
        let card_index = card.index;
        let fail = |reason: FailureReason, detected_text: Option<String>| CardLookupOutcome::Failure {
            card_index,
            reason,
            detected_text,
        };

        let png = match self.extractor.extract(&card).and_then(|plate| plate.encode_png()) {
            Ok(png) => png,
            Err(e) => return fail(FailureReason::Extraction(e.to_string()), None),
        };
        drop(card);

        let request = RecognitionRequest {
            image_png: png,
            language: self.config.language.clone(),
            allowed_chars: self.config.allowed_chars.clone(),
        };
        let recognizer = Arc::clone(&self.recognizer);
        let recognition = tokio::task::spawn_blocking(move || recognizer.recognize(&request));

        // a timed-out blocking call keeps running, it is only no longer awaited
        let raw = match tokio::time::timeout(self.config.recognition_timeout, recognition).await {
            Err(_) => return fail(FailureReason::RecognitionTimeout, None),
            Ok(Err(join)) => return fail(FailureReason::Recognition(join.to_string()), None),
            Ok(Ok(Err(e))) => return fail(FailureReason::Recognition(e.to_string()), None),
            Ok(Ok(Ok(text))) => text,
        };

        let name = normalize_text(&raw);
        if name.is_empty() {
            return fail(FailureReason::NoTextDetected, Some(name));
        }
        debug!(card_index, %name, "looking up card");

        match self.lookup.lookup_by_deadline(&name, self.deadline).await {
            Ok(data) => CardLookupOutcome::Success { card_index, data },
            Err(LookupError::NotFound(_)) => fail(
                FailureReason::NotFound { query: name.clone() },
                Some(name),
            ),
            Err(LookupError::DeadlineExceeded) => fail(FailureReason::LookupTimeout, Some(name)),
            Err(e) => fail(FailureReason::Lookup(e.to_string()), Some(name)),
        }
    }
}

// roughly 30 years, the same horizon tokio uses for "never"
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + budget`, saturating at a far-future instant instead of overflowing.
fn lookup_deadline(now: Instant, budget: Duration) -> Instant {
    now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Trims and collapses runs of whitespace to single spaces.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
