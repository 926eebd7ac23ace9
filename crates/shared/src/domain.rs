use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! two_valued_option {
    ($name:ident { $first:ident => $first_str:literal, $second:ident => $second_str:literal }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $first,
            $second,
        }

        impl $name {
            pub const ALL: [$name; 2] = [$name::$first, $name::$second];

            pub fn as_str(self) -> &'static str {
                match self {
                    $name::$first => $first_str,
                    $name::$second => $second_str,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

two_valued_option!(Language { Source => "source", Target => "target" });
two_valued_option!(Tense { Present => "present", Past => "past" });
two_valued_option!(Number { Singular => "singular", Plural => "plural" });

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" | "stho" | "sesotho" => Ok(Language::Source),
            "target" | "en" | "english" => Ok(Language::Target),
            other => Err(ValidationError::UnknownOption {
                option: "language",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for Tense {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Tense::Present),
            "past" => Ok(Tense::Past),
            other => Err(ValidationError::UnknownOption {
                option: "tense",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for Number {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "singular" => Ok(Number::Singular),
            "plural" => Ok(Number::Plural),
            other => Err(ValidationError::UnknownOption {
                option: "number",
                value: other.to_string(),
            }),
        }
    }
}

/// The six fixed word categories a vocabulary set is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Noun,
    Verb,
    Pronoun,
    Adjective,
    Adverb,
    Preposition,
}

/// Optional input group a form shows for a category on top of source/target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraFields {
    None,
    Plural,
    Past,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Noun,
        Category::Verb,
        Category::Pronoun,
        Category::Adjective,
        Category::Adverb,
        Category::Preposition,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Noun => "noun",
            Category::Verb => "verb",
            Category::Pronoun => "pronoun",
            Category::Adjective => "adjective",
            Category::Adverb => "adverb",
            Category::Preposition => "preposition",
        }
    }

    /// Key of the collection holding this category in the persisted document.
    pub fn collection_key(self) -> &'static str {
        match self {
            Category::Noun => "nouns",
            Category::Verb => "verbs",
            Category::Pronoun => "pronouns",
            Category::Adjective => "adjectives",
            Category::Adverb => "adverbs",
            Category::Preposition => "prepositions",
        }
    }

    pub fn extra_fields(self) -> ExtraFields {
        match self {
            Category::Noun | Category::Pronoun => ExtraFields::Plural,
            Category::Verb => ExtraFields::Past,
            Category::Adjective | Category::Adverb | Category::Preposition => ExtraFields::None,
        }
    }

    fn expected_shape(self) -> &'static str {
        match self.extra_fields() {
            ExtraFields::Plural => NumberedWord::SHAPE,
            ExtraFields::Past => VerbWord::SHAPE,
            ExtraFields::None => SimpleWord::SHAPE,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::MissingCategory);
        }
        Category::ALL
            .into_iter()
            .find(|category| {
                category.as_str() == normalized || category.collection_key() == normalized
            })
            .ok_or(ValidationError::UnknownCategory(normalized))
    }
}

/// Noun or pronoun: singular and plural forms in both languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberedWord {
    #[serde(rename = "stho_singular")]
    pub source_singular: String,
    #[serde(rename = "stho_plural")]
    pub source_plural: String,
    #[serde(rename = "en_singular")]
    pub target_singular: String,
    #[serde(rename = "en_plural")]
    pub target_plural: String,
}

impl NumberedWord {
    const SHAPE: &'static str = "singular/plural";

    pub fn form(&self, language: Language, number: Number) -> &str {
        match (language, number) {
            (Language::Source, Number::Singular) => &self.source_singular,
            (Language::Source, Number::Plural) => &self.source_plural,
            (Language::Target, Number::Singular) => &self.target_singular,
            (Language::Target, Number::Plural) => &self.target_plural,
        }
    }
}

/// Verb: present and past forms in both languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbWord {
    #[serde(rename = "stho_present")]
    pub source_present: String,
    #[serde(rename = "stho_past")]
    pub source_past: String,
    #[serde(rename = "en_present")]
    pub target_present: String,
    #[serde(rename = "en_past")]
    pub target_past: String,
}

impl VerbWord {
    const SHAPE: &'static str = "present/past";

    pub fn form(&self, language: Language, tense: Tense) -> &str {
        match (language, tense) {
            (Language::Source, Tense::Present) => &self.source_present,
            (Language::Source, Tense::Past) => &self.source_past,
            (Language::Target, Tense::Present) => &self.target_present,
            (Language::Target, Tense::Past) => &self.target_past,
        }
    }
}

/// Adjective, adverb or preposition: one form per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleWord {
    #[serde(rename = "stho")]
    pub source: String,
    #[serde(rename = "en")]
    pub target: String,
}

impl SimpleWord {
    const SHAPE: &'static str = "source/target";

    pub fn form(&self, language: Language) -> &str {
        match language {
            Language::Source => &self.source,
            Language::Target => &self.target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordEntry {
    Numbered(NumberedWord),
    Verb(VerbWord),
    Simple(SimpleWord),
}

impl WordEntry {
    pub fn shape(&self) -> &'static str {
        match self {
            WordEntry::Numbered(_) => NumberedWord::SHAPE,
            WordEntry::Verb(_) => VerbWord::SHAPE,
            WordEntry::Simple(_) => SimpleWord::SHAPE,
        }
    }

    fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            WordEntry::Numbered(word) => vec![
                ("source_singular", word.source_singular.as_str()),
                ("source_plural", word.source_plural.as_str()),
                ("target_singular", word.target_singular.as_str()),
                ("target_plural", word.target_plural.as_str()),
            ],
            WordEntry::Verb(word) => vec![
                ("source_present", word.source_present.as_str()),
                ("source_past", word.source_past.as_str()),
                ("target_present", word.target_present.as_str()),
                ("target_past", word.target_past.as_str()),
            ],
            WordEntry::Simple(word) => vec![
                ("source", word.source.as_str()),
                ("target", word.target.as_str()),
            ],
        }
    }

    /// One-line rendering used by listings: `source = target`.
    pub fn summary(&self) -> String {
        match self {
            WordEntry::Numbered(word) => format!(
                "{} / {} = {} / {}",
                word.source_singular, word.source_plural, word.target_singular, word.target_plural
            ),
            WordEntry::Verb(word) => format!(
                "{} / {} = {} / {}",
                word.source_present, word.source_past, word.target_present, word.target_past
            ),
            WordEntry::Simple(word) => format!("{} = {}", word.source, word.target),
        }
    }
}

/// Six ordered word collections. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySet {
    #[serde(default)]
    pub nouns: Vec<NumberedWord>,
    #[serde(default)]
    pub verbs: Vec<VerbWord>,
    #[serde(default)]
    pub pronouns: Vec<NumberedWord>,
    #[serde(default)]
    pub adjectives: Vec<SimpleWord>,
    #[serde(default)]
    pub adverbs: Vec<SimpleWord>,
    #[serde(default)]
    pub prepositions: Vec<SimpleWord>,
}

impl VocabularySet {
    /// Appends `entry` to the collection for `category`.
    ///
    /// The entry must have the category's shape and every field must be
    /// non-blank; on failure the set is left untouched.
    pub fn add(&mut self, category: Category, entry: WordEntry) -> Result<(), ValidationError> {
        if entry.shape() != category.expected_shape() {
            return Err(ValidationError::ShapeMismatch {
                category,
                expected: category.expected_shape(),
                found: entry.shape(),
            });
        }
        if let Some((field, _)) = entry
            .fields()
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
        {
            return Err(ValidationError::MissingField { category, field });
        }

        match (category, entry) {
            (Category::Noun, WordEntry::Numbered(word)) => self.nouns.push(word),
            (Category::Pronoun, WordEntry::Numbered(word)) => self.pronouns.push(word),
            (Category::Verb, WordEntry::Verb(word)) => self.verbs.push(word),
            (Category::Adjective, WordEntry::Simple(word)) => self.adjectives.push(word),
            (Category::Adverb, WordEntry::Simple(word)) => self.adverbs.push(word),
            (Category::Preposition, WordEntry::Simple(word)) => self.prepositions.push(word),
            (category, entry) => {
                return Err(ValidationError::ShapeMismatch {
                    category,
                    expected: category.expected_shape(),
                    found: entry.shape(),
                })
            }
        }
        Ok(())
    }

    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Noun => self.nouns.len(),
            Category::Verb => self.verbs.len(),
            Category::Pronoun => self.pronouns.len(),
            Category::Adjective => self.adjectives.len(),
            Category::Adverb => self.adverbs.len(),
            Category::Preposition => self.prepositions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|category| self.len(*category) == 0)
    }

    /// Single-form collection for adjectives, adverbs and prepositions.
    pub fn simple_words(&self, category: Category) -> Option<&[SimpleWord]> {
        match category {
            Category::Adjective => Some(&self.adjectives),
            Category::Adverb => Some(&self.adverbs),
            Category::Preposition => Some(&self.prepositions),
            Category::Noun | Category::Verb | Category::Pronoun => None,
        }
    }

    pub fn entries(&self, category: Category) -> Vec<WordEntry> {
        match category {
            Category::Noun => self.nouns.iter().cloned().map(WordEntry::Numbered).collect(),
            Category::Pronoun => self
                .pronouns
                .iter()
                .cloned()
                .map(WordEntry::Numbered)
                .collect(),
            Category::Verb => self.verbs.iter().cloned().map(WordEntry::Verb).collect(),
            Category::Adjective | Category::Adverb | Category::Preposition => self
                .simple_words(category)
                .unwrap_or_default()
                .iter()
                .cloned()
                .map(WordEntry::Simple)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noun(s: &str, sp: &str, t: &str, tp: &str) -> WordEntry {
        WordEntry::Numbered(NumberedWord {
            source_singular: s.into(),
            source_plural: sp.into(),
            target_singular: t.into(),
            target_plural: tp.into(),
        })
    }

    fn simple(s: &str, t: &str) -> WordEntry {
        WordEntry::Simple(SimpleWord {
            source: s.into(),
            target: t.into(),
        })
    }

    #[test]
    fn add_appends_in_insertion_order() {
        let mut set = VocabularySet::default();
        set.add(Category::Noun, noun("ntja", "dintja", "dog", "dogs"))
            .expect("first noun");
        set.add(Category::Noun, noun("katse", "dikatse", "cat", "cats"))
            .expect("second noun");

        assert_eq!(set.nouns.len(), 2);
        assert_eq!(set.nouns[0].source_singular, "ntja");
        assert_eq!(set.nouns[1].source_singular, "katse");
        assert!(set.pronouns.is_empty());
    }

    #[test]
    fn add_routes_simple_words_to_their_category() {
        let mut set = VocabularySet::default();
        set.add(Category::Adverb, simple("kapele", "quickly"))
            .expect("adverb");
        set.add(Category::Preposition, simple("ho", "to"))
            .expect("preposition");

        assert_eq!(set.len(Category::Adverb), 1);
        assert_eq!(set.len(Category::Preposition), 1);
        assert_eq!(set.len(Category::Adjective), 0);
    }

    #[test]
    fn add_rejects_blank_field_and_leaves_set_unchanged() {
        let mut set = VocabularySet::default();
        set.add(Category::Pronoun, noun("ke", "re", "I", "we"))
            .expect("pronoun");
        let before = set.clone();

        let err = set
            .add(Category::Pronoun, noun("o", "", "you", "you"))
            .expect_err("blank plural");
        assert_eq!(
            err,
            ValidationError::MissingField {
                category: Category::Pronoun,
                field: "source_plural"
            }
        );
        assert_eq!(set, before);
    }

    #[test]
    fn add_rejects_entry_of_wrong_shape() {
        let mut set = VocabularySet::default();
        let err = set
            .add(Category::Verb, simple("tsamaya", "walk"))
            .expect_err("verb needs tenses");
        assert!(matches!(
            err,
            ValidationError::ShapeMismatch {
                category: Category::Verb,
                ..
            }
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn category_parses_singular_and_collection_names() {
        assert_eq!("noun".parse::<Category>(), Ok(Category::Noun));
        assert_eq!(" Adverbs ".parse::<Category>(), Ok(Category::Adverb));
        assert_eq!("".parse::<Category>(), Err(ValidationError::MissingCategory));
        assert!(matches!(
            "article".parse::<Category>(),
            Err(ValidationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn persisted_field_names_are_stable() {
        let mut set = VocabularySet::default();
        set.add(Category::Adjective, simple("motle", "beautiful"))
            .expect("adjective");
        let json = serde_json::to_value(&set).expect("json");
        assert_eq!(json["adjectives"][0]["stho"], "motle");
        assert_eq!(json["adjectives"][0]["en"], "beautiful");

        let restored: VocabularySet =
            serde_json::from_value(serde_json::json!({ "verbs": [] })).expect("partial doc");
        assert!(restored.is_empty());
    }
}
