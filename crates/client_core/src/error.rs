use shared::{domain::Category, error::ValidationError};
use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("no username set: choose a username first")]
    NoUsername,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("add at least one {} before generating a phrase", join_categories(.missing))]
    InsufficientVocabulary { missing: Vec<Category> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VocabError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, VocabError::Store(err) if err.is_conflict())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VocabError::Store(err) if err.is_not_found())
    }
}

fn join_categories(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
