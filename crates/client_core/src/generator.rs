use std::fmt;

use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use shared::domain::{Category, Language, Number, Tense, VocabularySet};

use crate::error::VocabError;

const OPTIONAL_CATEGORIES: [Category; 3] =
    [Category::Adjective, Category::Adverb, Category::Preposition];
const OPTIONAL_INCLUDE_PROBABILITY: f64 = 0.5;

/// Generation choices; `None` picks uniformly at random per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhraseOptions {
    pub language: Option<Language>,
    pub tense: Option<Tense>,
    pub number: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhraseBlock {
    pub text: String,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phrase {
    pub language: Language,
    pub tense: Tense,
    pub number: Number,
    pub blocks: Vec<PhraseBlock>,
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<&str> = self.blocks.iter().map(|b| b.text.as_str()).collect();
        f.write_str(&words.join(" "))
    }
}

/// Emits one pronoun, verb and noun, then each optional category with
/// probability one half when it has entries.
pub fn generate<R: Rng + ?Sized>(
    vocab: &VocabularySet,
    options: PhraseOptions,
    rng: &mut R,
) -> Result<Phrase, VocabError> {
    let missing: Vec<Category> = [Category::Pronoun, Category::Verb, Category::Noun]
        .into_iter()
        .filter(|category| vocab.len(*category) == 0)
        .collect();
    if !missing.is_empty() {
        return Err(VocabError::InsufficientVocabulary { missing });
    }

    let language = options
        .language
        .unwrap_or_else(|| Language::ALL[rng.gen_range(0..Language::ALL.len())]);
    let tense = options
        .tense
        .unwrap_or_else(|| Tense::ALL[rng.gen_range(0..Tense::ALL.len())]);
    let number = options
        .number
        .unwrap_or_else(|| Number::ALL[rng.gen_range(0..Number::ALL.len())]);

    let insufficient = |category| VocabError::InsufficientVocabulary {
        missing: vec![category],
    };
    let pronoun = vocab
        .pronouns
        .choose(rng)
        .ok_or_else(|| insufficient(Category::Pronoun))?;
    let verb = vocab
        .verbs
        .choose(rng)
        .ok_or_else(|| insufficient(Category::Verb))?;
    let noun = vocab
        .nouns
        .choose(rng)
        .ok_or_else(|| insufficient(Category::Noun))?;

    let mut blocks = vec![
        PhraseBlock {
            text: pronoun.form(language, number).to_string(),
            category: Category::Pronoun,
        },
        PhraseBlock {
            text: verb.form(language, tense).to_string(),
            category: Category::Verb,
        },
        PhraseBlock {
            text: noun.form(language, number).to_string(),
            category: Category::Noun,
        },
    ];

    for category in OPTIONAL_CATEGORIES {
        let words = vocab.simple_words(category).unwrap_or_default();
        if words.is_empty() || !rng.gen_bool(OPTIONAL_INCLUDE_PROBABILITY) {
            continue;
        }
        if let Some(word) = words.choose(rng) {
            blocks.push(PhraseBlock {
                text: word.form(language).to_string(),
                category,
            });
        }
    }

    Ok(Phrase {
        language,
        tense,
        number,
        blocks,
    })
}

pub fn generate_phrase(vocab: &VocabularySet, options: PhraseOptions) -> Result<Phrase, VocabError> {
    generate(vocab, options, &mut rand::thread_rng())
}

#[cfg(test)]
#[path = "tests/generator_tests.rs"]
mod tests;
