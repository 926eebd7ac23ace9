use shared::{
    domain::{Category, ExtraFields, NumberedWord, SimpleWord, VerbWord, WordEntry},
    error::ValidationError,
};

/// Raw "add word" input as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordForm {
    pub kind: String,
    pub source: String,
    pub target: String,
    pub source_plural: String,
    pub target_plural: String,
    pub source_past: String,
    pub target_past: String,
}

impl WordForm {
    pub fn new(kind: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_plural(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_plural = source.into();
        self.target_plural = target.into();
        self
    }

    pub fn with_past(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_past = source.into();
        self.target_past = target.into();
        self
    }

    /// Which optional input group to show for the currently selected kind.
    pub fn extra_fields(&self) -> ExtraFields {
        self.kind
            .parse::<Category>()
            .map(Category::extra_fields)
            .unwrap_or(ExtraFields::None)
    }

    /// Trims every input and builds the entry for the selected kind.
    ///
    /// Kind, source and target are checked first; plural forms are then
    /// required for nouns and pronouns, past forms for verbs.
    pub fn to_entry(&self) -> Result<(Category, WordEntry), ValidationError> {
        let category: Category = self.kind.parse()?;
        let source = required(category, "source", &self.source)?;
        let target = required(category, "target", &self.target)?;

        let entry = match category.extra_fields() {
            ExtraFields::Plural => WordEntry::Numbered(NumberedWord {
                source_singular: source,
                source_plural: required(category, "source_plural", &self.source_plural)?,
                target_singular: target,
                target_plural: required(category, "target_plural", &self.target_plural)?,
            }),
            ExtraFields::Past => WordEntry::Verb(VerbWord {
                source_present: source,
                source_past: required(category, "source_past", &self.source_past)?,
                target_present: target,
                target_past: required(category, "target_past", &self.target_past)?,
            }),
            ExtraFields::None => WordEntry::Simple(SimpleWord { source, target }),
        };
        Ok((category, entry))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn required(
    category: Category,
    field: &'static str,
    value: &str,
) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField { category, field });
    }
    Ok(value.to_string())
}
