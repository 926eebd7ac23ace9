use std::sync::Arc;

use shared::{
    domain::{Category, VocabularySet, WordEntry},
    protocol::{database_name_for_username, Revision, VOCAB_DOC_ID},
};
use storage::{DocumentStore, StoreError, StoreProvider};
use tracing::{error, info, warn};

use crate::{
    error::VocabError,
    form::WordForm,
    generator::{generate_phrase, Phrase, PhraseOptions},
};

struct BoundStore {
    username: String,
    store: Arc<dyn DocumentStore>,
}

/// One user's vocabulary document: the in-memory set, the store it lives in
/// and the last revision this session has seen.
pub struct VocabularySession {
    provider: Arc<dyn StoreProvider>,
    bound: Option<BoundStore>,
    vocab: VocabularySet,
    revision: Option<Revision>,
}

impl VocabularySession {
    pub fn new(provider: Arc<dyn StoreProvider>) -> Self {
        Self {
            provider,
            bound: None,
            vocab: VocabularySet::default(),
            revision: None,
        }
    }

    /// Binds the session to the store scoped to `username`.
    ///
    /// Re-opening the bound username is a no-op. Switching users drops the
    /// previous store and starts from an empty, unloaded vocabulary.
    pub async fn open(&mut self, username: &str) -> Result<(), VocabError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(VocabError::NoUsername);
        }
        if self
            .bound
            .as_ref()
            .is_some_and(|bound| bound.username == username)
        {
            return Ok(());
        }

        let store = self
            .provider
            .open_store(&database_name_for_username(username))
            .await?;
        info!(username, db = store.name(), "vocabulary store bound");
        self.bound = Some(BoundStore {
            username: username.to_string(),
            store,
        });
        self.vocab = VocabularySet::default();
        self.revision = None;
        Ok(())
    }

    pub fn username(&self) -> Option<&str> {
        self.bound.as_ref().map(|bound| bound.username.as_str())
    }

    pub fn store(&self) -> Option<Arc<dyn DocumentStore>> {
        self.bound.as_ref().map(|bound| Arc::clone(&bound.store))
    }

    pub fn vocabulary(&self) -> &VocabularySet {
        &self.vocab
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    fn bound_store(&self) -> Result<Arc<dyn DocumentStore>, VocabError> {
        self.store().ok_or(VocabError::NoUsername)
    }

    /// Replaces the in-memory set with the stored document, creating an empty
    /// document on first use. On failure the in-memory set is kept as is.
    pub async fn load(&mut self) -> Result<(), VocabError> {
        let store = self.bound_store()?;
        match store.get(VOCAB_DOC_ID).await {
            Ok(document) => {
                let vocab: VocabularySet = serde_json::from_value(document.payload)
                    .map_err(|err| {
                        error!(db = store.name(), %err, "stored vocabulary is malformed");
                        StoreError::from(err)
                    })?;
                self.vocab = vocab;
                self.revision = Some(document.rev);
                Ok(())
            }
            Err(err) if err.is_not_found() => self.create_empty(store.as_ref()).await,
            Err(err) => {
                error!(db = store.name(), %err, "failed to load vocabulary");
                Err(err.into())
            }
        }
    }

    async fn create_empty(&mut self, store: &dyn DocumentStore) -> Result<(), VocabError> {
        let empty = VocabularySet::default();
        let payload = serde_json::to_value(&empty).map_err(StoreError::from)?;
        match store.put(VOCAB_DOC_ID, &payload, None).await {
            Ok(rev) => {
                info!(db = store.name(), %rev, "created empty vocabulary document");
                self.vocab = empty;
                self.revision = Some(rev);
                Ok(())
            }
            Err(err) if err.is_conflict() => {
                // Someone else created it between our get and put; adopt theirs.
                let document = store.get(VOCAB_DOC_ID).await.map_err(|err| {
                    error!(db = store.name(), %err, "failed to load concurrently created vocabulary");
                    err
                })?;
                self.vocab = serde_json::from_value(document.payload).map_err(StoreError::from)?;
                self.revision = Some(document.rev);
                Ok(())
            }
            Err(err) => {
                error!(db = store.name(), %err, "failed to create vocabulary document");
                Err(err.into())
            }
        }
    }

    /// Writes the in-memory set back using the last seen revision.
    ///
    /// A missing document is recreated once without a revision. Any other
    /// failure leaves the in-memory set and revision untouched.
    pub async fn save(&mut self) -> Result<Revision, VocabError> {
        let store = self.bound_store()?;
        let payload = serde_json::to_value(&self.vocab).map_err(StoreError::from)?;

        let result = match store.put(VOCAB_DOC_ID, &payload, self.revision.as_ref()).await {
            Err(err) if err.is_not_found() => {
                warn!(db = store.name(), "vocabulary document missing on save; recreating");
                store.put(VOCAB_DOC_ID, &payload, None).await
            }
            other => other,
        };

        match result {
            Ok(rev) => {
                info!(db = store.name(), %rev, "vocabulary saved");
                self.revision = Some(rev.clone());
                Ok(rev)
            }
            Err(err) => {
                error!(
                    db = store.name(),
                    rev = ?self.revision,
                    %err,
                    "failed to save vocabulary; edit kept in memory"
                );
                Err(err.into())
            }
        }
    }

    /// Appends to the in-memory set only; call [`save`](Self::save) to persist.
    pub fn add(&mut self, category: Category, entry: WordEntry) -> Result<(), VocabError> {
        self.vocab.add(category, entry)?;
        Ok(())
    }

    /// Validates the form, appends the word and persists the set.
    pub async fn add_word(&mut self, form: &WordForm) -> Result<Revision, VocabError> {
        if self.bound.is_none() {
            return Err(VocabError::NoUsername);
        }
        let (category, entry) = form.to_entry()?;
        self.add(category, entry)?;
        self.save().await
    }

    pub fn generate(&self, options: PhraseOptions) -> Result<Phrase, VocabError> {
        generate_phrase(&self.vocab, options)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
