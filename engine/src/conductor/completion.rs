//! Finish detection
//!
//! The Planner signals completion in free text. Models drift in how they say
//! "finished", so the accepted phrasings are an explicit, ordered set. Matching
//! runs on the trimmed, lowercased text and the first rule that applies wins:
//!
//! 1. `Exact`: the text is `finished`
//! 2. `Punctuated`: `finished` followed only by `.`, `!` or whitespace
//! 3. `Dashed`: `finished` then a dash (`-` or `–`) that ends the text or is
//!    followed by whitespace
//! 4. `Short`: at most [`SHORT_RESPONSE_LIMIT`] characters and contains the
//!    word `finished`
//!
//! Anything else is a continuation. A false positive ends the run early; a
//! false negative is caught by the step budget.

use serde::Serialize;

const FINISH_WORD: &str = "finished";

/// Longest response still eligible for the `Short` rule, in characters
pub const SHORT_RESPONSE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishMatch {
    Exact,
    Punctuated,
    Dashed,
    Short,
}

/// Classify Planner output as a finish signal, if it is one
pub fn detect_finish(text: &str) -> Option<FinishMatch> {
    let normalized = text.trim().to_lowercase();

    if normalized == FINISH_WORD {
        return Some(FinishMatch::Exact);
    }

    if let Some(rest) = normalized.strip_prefix(FINISH_WORD) {
        if !rest.is_empty()
            && rest
                .chars()
                .all(|c| c == '.' || c == '!' || c.is_whitespace())
        {
            return Some(FinishMatch::Punctuated);
        }

        let after_dash = rest
            .trim_start()
            .strip_prefix('-')
            .or_else(|| rest.trim_start().strip_prefix('–'));
        if let Some(tail) = after_dash {
            if tail.is_empty() || tail.starts_with(char::is_whitespace) {
                return Some(FinishMatch::Dashed);
            }
        }
    }

    if normalized.chars().count() <= SHORT_RESPONSE_LIMIT && contains_word(&normalized) {
        return Some(FinishMatch::Short);
    }

    None
}

/// Hyphenated compounds ("finished-goods") count as one word
fn contains_word(text: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .any(|word| word == FINISH_WORD)
}
