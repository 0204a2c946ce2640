//! Player Utterances
//!
//! The upstream chat layer hands the engine a [`Sentence`]: the raw text plus
//! a normalized form that trigger phrases are matched against. No language
//! understanding happens here, only case folding and punctuation cleanup.

/// A pre-parsed player utterance
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sentence {
    original: String,
    normalized: String,
}

impl Sentence {
    pub fn parse(raw: &str) -> Self {
        Self {
            original: raw.to_string(),
            normalized: normalize(raw),
        }
    }

    /// Sentence used when conditions are evaluated outside a conversation
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Lowercased text with punctuation stripped and spaces collapsed
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Check a normalized phrase against this sentence.
    ///
    /// A phrase matches when it is the whole utterance or its leading words,
    /// so "hi" matches "hi carmen" but not "hive".
    pub fn starts_with_phrase(&self, phrase: &str) -> bool {
        self.rest_after(phrase).is_some()
    }

    /// Words following `phrase`, if the sentence starts with it
    pub fn rest_after(&self, phrase: &str) -> Option<&str> {
        if phrase.is_empty() {
            return None;
        }
        if self.normalized == phrase {
            return Some("");
        }
        self.normalized
            .strip_prefix(phrase)
            .and_then(|rest| rest.strip_prefix(' '))
    }
}

/// Normalize text the same way for utterances and trigger phrases
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '"' | '#'))
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Standard phrase sets shared by NPC behaviours and quest content
pub mod phrases {
    pub const GREETING: &[&str] = &["hi", "hello", "hallo", "greetings", "hey", "hola"];
    pub const GOODBYE: &[&str] = &["bye", "goodbye", "farewell", "cya", "adios"];
    pub const YES: &[&str] = &["yes", "ok", "okay", "yep", "sure", "alright"];
    pub const NO: &[&str] = &["no", "nope", "nothing", "none"];
    pub const QUEST: &[&str] = &["task", "quest", "favor", "favour"];
    pub const FINISH: &[&str] = &["done", "complete", "finish"];
    pub const ABORT: &[&str] = &["another", "abort"];
    pub const JOB: &[&str] = &["job", "work", "occupation"];
    pub const HELP: &[&str] = &["help", "ayuda"];
    pub const OFFER: &[&str] = &["offer", "deal", "trade"];

    /// Expand an `@name` shorthand into its phrase set
    pub fn shorthand(name: &str) -> Option<&'static [&'static str]> {
        match name {
            "@greeting" => Some(GREETING),
            "@goodbye" => Some(GOODBYE),
            "@yes" => Some(YES),
            "@no" => Some(NO),
            "@quest" => Some(QUEST),
            "@finish" => Some(FINISH),
            "@abort" => Some(ABORT),
            "@job" => Some(JOB),
            "@help" => Some(HELP),
            "@offer" => Some(OFFER),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hi,   Carmen! "), "hi carmen");
        assert_eq!(normalize("#Quest?"), "quest");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn test_phrase_prefix() {
        let s = Sentence::parse("Hi Carmen");
        assert!(s.starts_with_phrase("hi"));
        assert_eq!(s.rest_after("hi"), Some("carmen"));
        assert!(!Sentence::parse("hive").starts_with_phrase("hi"));
        assert!(Sentence::parse("button mushroom").starts_with_phrase("button mushroom"));
        assert!(!Sentence::empty().starts_with_phrase(""));
    }

    #[test]
    fn test_shorthand() {
        assert_eq!(phrases::shorthand("@yes"), Some(phrases::YES));
        assert!(phrases::shorthand("@nope").is_none());
    }
}
