//! The dialogue state machine: one inbound message in, one assistant
//! message out.
//!
//! Routing is a typed match over the closed intent set. Handlers receive an
//! immutable snapshot of the turn's input and return a [`TurnDelta`]; the
//! delta is applied under the session lock only when the turn succeeds, so a
//! failed turn leaves the session exactly as it was and a retried delivery
//! cannot double-apply state.

use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::config::ReferenceConfig;
use crate::error::{AssistantError, Result};
use crate::explain::ProductExplainer;
use crate::extract::EntityExtractor;
use crate::intent::IntentClassifier;
use crate::ranking::{format_ranked, RelevanceRanker};
use crate::recommend::{format_product_summaries, Recommender};
use crate::reference::ReferenceResolver;
use crate::retrieval::{build_search_query, format_product_details, CandidateRetriever};
use crate::state::{ConversationState, SessionStore, TurnDelta};
use crate::types::Intent;

pub const GREETING: &str = "Welcome! You can ask me to help you find products, answer questions about a product, or explore related items. Just describe what you're looking for (e.g., I need a nutrient rich moisturizer), and I'll assist!";

const GOODBYE: &str = "Goodbye!";

const NO_MATCHES: &str = "I couldn't find any products matching your request. \
     Try describing what you're looking for in a different way.";

const UNCLEAR_REFERENCE: &str = "I'm not sure which product you mean. \
     Could you point me to one of the products I listed?";

const APOLOGY: &str = "I'm sorry, I ran into a problem while processing your request. \
     Please try again.";

pub struct DialogueOrchestrator {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    resolver: ReferenceResolver,
    retriever: Arc<CandidateRetriever>,
    recommender: Recommender,
    ranker: RelevanceRanker,
    explainer: ProductExplainer,
    store: Arc<dyn CatalogStore>,
    sessions: SessionStore,
    reference: ReferenceConfig,
}

impl DialogueOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: IntentClassifier,
        extractor: EntityExtractor,
        resolver: ReferenceResolver,
        retriever: Arc<CandidateRetriever>,
        recommender: Recommender,
        ranker: RelevanceRanker,
        explainer: ProductExplainer,
        store: Arc<dyn CatalogStore>,
        reference: ReferenceConfig,
    ) -> Self {
        Self {
            classifier,
            extractor,
            resolver,
            retriever,
            recommender,
            ranker,
            explainer,
            store,
            sessions: SessionStore::new(),
            reference,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Reset a session (caller-initiated "clear chat").
    pub fn clear_session(&self, session_id: &str) {
        self.sessions.clear(session_id);
    }

    /// Process one inbound message and return the assistant's reply. The
    /// user always gets a coherent message: capability format errors answer
    /// with the help reply, unresolvable references ask for clarification,
    /// and exhausted transport retries apologize while leaving the session
    /// state unchanged so the same request can be retried.
    pub async fn turn(&self, session_id: &str, user_text: &str) -> String {
        let session = self.sessions.session(session_id);
        let mut state = session.lock().await;
        let snapshot = state.snapshot_with(user_text);

        let delta = match self.run_turn(&snapshot, user_text).await {
            Ok(delta) => delta,
            Err(err) if err.is_format_error() => {
                tracing::warn!(error = %err, "capability format error, answering with help reply");
                TurnDelta::reply(GREETING)
            }
            Err(AssistantError::ReferenceNotFound) => TurnDelta::reply(UNCLEAR_REFERENCE),
            Err(err) => {
                tracing::warn!(error = %err, "turn failed, session state left unchanged");
                return APOLOGY.to_string();
            }
        };

        let reply = delta.assistant_text.clone();
        delta.apply(&mut state, user_text);
        reply
    }

    async fn run_turn(&self, snapshot: &ConversationState, user_text: &str) -> Result<TurnDelta> {
        let intent = match self.classifier.classify(user_text).await {
            Ok(intent) => intent,
            // Malformed wrapper output and out-of-taxonomy labels both route
            // to the help path, never to a user-visible error state.
            Err(err) if err.is_format_error() => {
                tracing::warn!(error = %err, "classification failed, routing to noclass");
                Intent::Noclass
            }
            Err(err) => return Err(err),
        };
        tracing::info!(intent = intent.as_label(), "routing turn");

        match intent {
            Intent::Greetings | Intent::Noclass => Ok(TurnDelta::reply(GREETING)),
            Intent::Bye => Ok(TurnDelta::reply(GOODBYE)),
            Intent::ProductSearch => self.handle_search(user_text).await,
            Intent::Recommendation => self.handle_recommendation(user_text).await,
            Intent::InformationRetrieval => self.handle_information(snapshot, user_text).await,
            Intent::Reviews => self.handle_reviews(snapshot, user_text).await,
            Intent::Comparison => self.handle_comparison(snapshot, user_text).await,
        }
    }

    async fn handle_search(&self, user_text: &str) -> Result<TurnDelta> {
        let entities = self.extractor.extract(user_text).await?;
        let ids = self.retriever.search_candidates(user_text, &entities).await?;
        let details = self.store.product_details(&ids).await?;
        let rankings = self
            .ranker
            .rank(&build_search_query(&entities), &format_product_details(&details))
            .await?;
        self.present(rankings, entities).await
    }

    async fn handle_recommendation(&self, user_text: &str) -> Result<TurnDelta> {
        let entities = self.extractor.extract(user_text).await?;
        let ids = self
            .recommender
            .recommend_candidates(user_text, &entities)
            .await?;
        let summaries = self.store.product_summaries(&ids).await?;
        let rankings = self
            .ranker
            .rank(user_text, &format_product_summaries(&summaries))
            .await?;
        self.present(rankings, entities).await
    }

    /// Shared terminal stage for search and recommendation: keep-filter,
    /// title join, display formatting, and the product-id state update. The
    /// committed `product_ids` is exactly the kept list, so later reference
    /// resolution indexes into what the user actually saw.
    async fn present(
        &self,
        rankings: crate::types::ProductRankingList,
        entities: crate::types::EntityFilter,
    ) -> Result<TurnDelta> {
        let kept: Vec<String> = rankings.kept().map(|r| r.product_id.clone()).collect();
        let titles = self.store.product_titles(&kept).await?;
        let body = format_ranked(&rankings, &titles);
        let assistant_text = if body.is_empty() {
            NO_MATCHES.to_string()
        } else {
            body
        };
        Ok(TurnDelta {
            assistant_text,
            product_ids: Some(kept),
            entities: Some(entities),
            ..Default::default()
        })
    }

    async fn handle_information(
        &self,
        snapshot: &ConversationState,
        user_text: &str,
    ) -> Result<TurnDelta> {
        let history = snapshot.history_window(self.reference.history_window);
        let index = self
            .resolver
            .resolve_single(history, user_text, snapshot.product_index)
            .await?;
        let product_id = product_at(snapshot, index)?;
        let answer = self.explainer.explain_product(user_text, &product_id).await?;
        Ok(TurnDelta {
            assistant_text: answer,
            product_index: Some(index),
            ..Default::default()
        })
    }

    async fn handle_reviews(
        &self,
        snapshot: &ConversationState,
        user_text: &str,
    ) -> Result<TurnDelta> {
        let history = snapshot.history_window(self.reference.history_window);
        let index = self
            .resolver
            .resolve_single(history, user_text, snapshot.product_index)
            .await?;
        let product_id = product_at(snapshot, index)?;
        let answer = self.explainer.explain_reviews(user_text, &product_id).await?;
        Ok(TurnDelta {
            assistant_text: answer,
            product_index: Some(index),
            ..Default::default()
        })
    }

    async fn handle_comparison(
        &self,
        snapshot: &ConversationState,
        user_text: &str,
    ) -> Result<TurnDelta> {
        let history = snapshot.history_window(self.reference.history_window);
        let indices = self
            .resolver
            .resolve_multiple(history, user_text, snapshot.product_indices.as_deref())
            .await?;
        let ids: Vec<String> = indices
            .iter()
            .map(|&index| product_at(snapshot, index))
            .collect::<Result<_>>()?;
        let answer = self.explainer.compare_products(user_text, &ids).await?;
        Ok(TurnDelta {
            assistant_text: answer,
            product_indices: Some(indices),
            ..Default::default()
        })
    }
}

/// Consumption-time bounds check for the stale-index policy: a carried-over
/// index that no longer fits the current product list is an unresolved
/// reference, never an out-of-bounds access.
fn product_at(snapshot: &ConversationState, index: usize) -> Result<String> {
    snapshot
        .product_ids
        .get(index)
        .cloned()
        .ok_or(AssistantError::ReferenceNotFound)
}
