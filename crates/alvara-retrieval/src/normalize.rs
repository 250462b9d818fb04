//! Turns a conversational question into a full-text query
//!
//! Word boundaries are Unicode-aware, so accented letters count as word
//! characters: `ventilação` never loses its trailing `o` to the stop word `o`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Interrogative and connective words removed from queries
pub const STOP_WORDS: &[&str] = &[
    "qual", "quais", "que", "diz", "dizem", "sobre", "fala", "falam", "onde", "tem", "o", "a",
    "os", "as", "do", "da", "dos", "das", "de", "em", "no", "na", "nos", "nas", "um", "uma", "e",
];

/// Shortest normalized query kept before falling back to the raw text
pub const MIN_QUERY_CHARS: usize = 3;

static ABBREVIATIONS: Lazy<[(Regex, &'static str); 3]> = Lazy::new(|| {
    [
        (Regex::new(r"\bart\b\.?").expect("static regex"), "artigo "),
        (Regex::new(r"\bpar\b\.?").expect("static regex"), "parágrafo "),
        (Regex::new(r"\binc\b\.?").expect("static regex"), "inciso "),
    ]
});

static STOP_WORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = STOP_WORDS.join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("static regex")
});

/// Normalize a user question into a retrieval query
///
/// # Example
///
/// ```
/// use alvara_retrieval::normalize::normalize_query;
///
/// assert_eq!(normalize_query("O que diz o art. 242?"), "artigo 242");
/// ```
#[must_use]
pub fn normalize_query(raw: &str) -> String {
    let mut query = raw.to_lowercase();

    for (pattern, expansion) in ABBREVIATIONS.iter() {
        query = pattern.replace_all(&query, *expansion).into_owned();
    }
    query = STOP_WORD_PATTERN.replace_all(&query, " ").into_owned();

    let normalized = collapse(&strip_symbols(&query));
    if normalized.chars().count() < MIN_QUERY_CHARS {
        return collapse(&strip_symbols(raw));
    }
    normalized
}

/// Split a normalized query into search terms
#[must_use]
pub fn query_terms(normalized: &str) -> Vec<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

fn strip_symbols(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn tokens(query: &str) -> HashSet<&str> {
        query.split_whitespace().collect()
    }

    #[test]
    fn ventilation_question_keeps_content_words() {
        let query = normalize_query("qual artigo fala do prisma de ventilação");
        let tokens = tokens(&query);
        for kept in ["artigo", "prisma", "ventilação"] {
            assert!(tokens.contains(kept), "missing {kept} in {query:?}");
        }
        for dropped in ["qual", "fala", "do", "de"] {
            assert!(!tokens.contains(dropped), "kept {dropped} in {query:?}");
        }
    }

    #[test]
    fn expands_legal_abbreviations() {
        assert_eq!(normalize_query("art. 87 inc. II"), "artigo 87 inciso ii");
        assert_eq!(normalize_query("Par 3 do código"), "parágrafo 3 código");
        assert_eq!(normalize_query("artigo partido"), "artigo partido");
    }

    #[test]
    fn expansion_does_not_split_accented_words() {
        assert_eq!(normalize_query("parágrafo único"), "parágrafo único");
    }

    #[test]
    fn short_result_falls_back_to_raw_text() {
        assert_eq!(normalize_query("Qual é a?"), "Qual é a");
        assert_eq!(normalize_query("o que"), "o que");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_query("  ?! "), "");
        assert!(query_terms("").is_empty());
    }

    proptest! {
        #[test]
        fn accented_words_survive_next_to_stop_words(
            words in proptest::collection::vec(
                prop_oneof![
                    Just("ventilação"), Just("edificação"), Just("área"), Just("recuo"),
                    Just("calçada"), Just("habitação"), Just("zoneamento"), Just("lâmina"),
                ],
                1..6,
            ),
            fillers in proptest::collection::vec(
                prop_oneof![Just("o"), Just("a"), Just("de"), Just("da"), Just("qual"), Just("e")],
                1..6,
            ),
        ) {
            let mut parts = Vec::new();
            for (i, word) in words.iter().enumerate() {
                parts.push(fillers[i % fillers.len()]);
                parts.push(*word);
            }
            let query = normalize_query(&parts.join(" "));
            let tokens = tokens(&query);
            for word in &words {
                prop_assert!(tokens.contains(word), "lost {} in {:?}", word, query);
            }
        }

        #[test]
        fn output_has_no_symbols_or_runs_of_spaces(input in "\\PC{0,80}") {
            let query = normalize_query(&input);
            prop_assert!(!query.contains("  "));
            prop_assert_eq!(query.trim(), query.as_str());
            prop_assert!(query.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ' '));
        }
    }
}
