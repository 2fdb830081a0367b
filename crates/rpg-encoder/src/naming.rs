//! Naming rules for semantic feature descriptions.
//!
//! Descriptions are verb+object phrases: lowercase, 1-8 words, no trailing
//! punctuation, no implementation-detail vocabulary, no leading vague verb.
//! Validation is idempotent — validating a validated phrase is a no-op.

/// Tokens describing implementation mechanics rather than purpose.
pub const IMPLEMENTATION_DETAIL_TOKENS: &[&str] = &[
    "loop", "iterate", "if", "else", "array", "dict", "hash", "stack", "queue", "for",
    "while", "switch", "case", "try", "catch", "throw", "return", "break", "continue",
];

/// Words that cannot open an action phrase; used to tell an action conjunct
/// ("save to database") from a noun continuation ("the parser state").
pub const NON_ACTION_PREFIXES: &[&str] = &[
    "a", "an", "the", "their", "its", "his", "her", "our", "your", "this", "that",
    "these", "those", "some", "any", "all", "each", "every", "no",
];

/// Leading vague verbs and their concrete replacements. `deal with` is
/// listed first so the two-word form wins over single-word matches.
pub const VAGUE_VERB_REPLACEMENTS: &[(&str, &str)] = &[
    ("deal with", "resolve"),
    ("handle", "dispatch"),
    ("process", "transform"),
    ("do", "execute"),
    ("manage", "coordinate"),
    ("run", "execute"),
    ("perform", "execute"),
];

/// Common name prefixes mapped to verbs for the heuristic fallback.
pub const PREFIX_VERBS: &[(&str, &str)] = &[
    ("get", "retrieve"),
    ("set", "assign"),
    ("is", "check if"),
    ("has", "check if"),
    ("can", "check if"),
    ("parse", "parse"),
    ("handle", "dispatch"),
    ("load", "load"),
    ("save", "save"),
    ("create", "create"),
    ("make", "create"),
    ("build", "build"),
    ("init", "initialize"),
    ("update", "update"),
    ("delete", "remove"),
    ("remove", "remove"),
    ("find", "find"),
    ("search", "search"),
    ("validate", "validate"),
    ("convert", "convert"),
    ("send", "send"),
    ("fetch", "fetch"),
    ("read", "read"),
    ("write", "write"),
    ("compute", "compute"),
    ("calc", "compute"),
    ("emit", "emit"),
    ("render", "render"),
];

const MAX_DESCRIPTION_WORDS: usize = 8;

/// A validated description with any split-off action conjuncts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidatedName {
    pub description: String,
    pub sub_features: Vec<String>,
}

/// Apply the full naming pipeline: lowercase and trim punctuation, drop
/// implementation-detail tokens, split chained actions on `and`, replace a
/// leading vague verb, and truncate to 8 words.
pub fn validate_feature_name(raw: &str) -> ValidatedName {
    let normalized = strip_detail_tokens(&normalize(raw));

    // Chained actions: "dispatch user request and save to database" becomes
    // a primary description plus sub-features.
    let conjuncts: Vec<&str> = normalized.split(" and ").map(str::trim).collect();
    let splittable = conjuncts.len() > 1
        && conjuncts[0].split_whitespace().count() >= 2
        && conjuncts[1..].iter().any(|c| is_action_phrase(c));

    if splittable {
        ValidatedName {
            description: finish_phrase(conjuncts[0]),
            sub_features: conjuncts[1..]
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| finish_phrase(c))
                .collect(),
        }
    } else {
        ValidatedName {
            description: finish_phrase(&normalized),
            sub_features: Vec::new(),
        }
    }
}

/// Validate a single phrase without conjunction splitting (used for
/// sub-features and keywords sourced from the LLM).
pub fn validate_phrase(raw: &str) -> String {
    finish_phrase(&strip_detail_tokens(&normalize(raw)))
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_detail_tokens(phrase: &str) -> String {
    let mut words: Vec<&str> = phrase
        .split_whitespace()
        .filter(|word| !IMPLEMENTATION_DETAIL_TOKENS.contains(word))
        .collect();
    // Removal can strand a conjunction at a phrase boundary.
    while words.first().is_some_and(|w| *w == "and" || *w == "or") {
        words.remove(0);
    }
    while words.last().is_some_and(|w| *w == "and" || *w == "or") {
        words.pop();
    }
    words.join(" ")
}

fn is_action_phrase(phrase: &str) -> bool {
    phrase
        .split_whitespace()
        .next()
        .is_some_and(|first| !NON_ACTION_PREFIXES.contains(&first))
}

/// Replace a leading vague verb and truncate to the word budget. Phrases
/// below 3 words are kept as-is, never padded.
fn finish_phrase(phrase: &str) -> String {
    let mut phrase = phrase.trim().to_string();
    for (vague, replacement) in VAGUE_VERB_REPLACEMENTS {
        if phrase == *vague {
            phrase = (*replacement).to_string();
            break;
        }
        if let Some(rest) = phrase.strip_prefix(&format!("{vague} ")) {
            phrase = format!("{replacement} {rest}");
            break;
        }
    }

    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.len() > MAX_DESCRIPTION_WORDS {
        words[..MAX_DESCRIPTION_WORDS].join(" ")
    } else {
        words.join(" ")
    }
}

/// Humanize an identifier: camelCase and snake_case become spaced lowercase
/// words (`parseJSONFile` → `parse json file`).
pub fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in name.chars() {
        if c == '_' || c == '-' || c == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() {
            // Keep acronym runs together: JSONFile → json file
            let prev_upper = current.chars().last().is_some_and(char::is_uppercase);
            if !current.is_empty() && !prev_upper {
                words.push(std::mem::take(&mut current));
            }
            current.push(c);
        } else {
            let prev_upper_run = current.len() > 1
                && current.chars().all(char::is_uppercase);
            if prev_upper_run {
                // The last uppercase letter starts the next word: "JSONFile"
                let last = current.pop().unwrap();
                words.push(std::mem::take(&mut current));
                current.push(last);
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic description for an entity name: map a recognized prefix to
/// its verb, or fall back to `"provide {name} operation"`.
pub fn heuristic_description(name: &str) -> String {
    let humanized = humanize(name);
    let mut words = humanized.split_whitespace();
    let Some(first) = words.next() else {
        return "provide unnamed operation".to_string();
    };
    let rest: Vec<&str> = words.collect();

    for (prefix, verb) in PREFIX_VERBS {
        if first == *prefix && !rest.is_empty() {
            return format!("{verb} {}", rest.join(" "));
        }
    }

    format!("provide {humanized} operation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_action_split() {
        let result = validate_feature_name("handle user request and save to database");
        assert_eq!(result.description, "dispatch user request");
        assert_eq!(result.sub_features, vec!["save to database"]);
    }

    #[test]
    fn test_noun_continuation_not_split() {
        // "the parser state" is not an action; the phrase stays whole
        let result = validate_feature_name("store results and the parser state");
        assert!(result.sub_features.is_empty());
        assert!(result.description.contains("and"));
    }

    #[test]
    fn test_implementation_tokens_removed() {
        let result = validate_feature_name("iterate array and compute totals");
        // "iterate" and "array" drop out; the first conjunct shrinks below
        // two words so no split happens
        assert_eq!(result.description, "compute totals");
    }

    #[test]
    fn test_vague_verb_replacements() {
        assert_eq!(validate_phrase("process incoming records"), "transform incoming records");
        assert_eq!(validate_phrase("deal with bad input"), "resolve bad input");
        assert_eq!(validate_phrase("run database migration"), "execute database migration");
        assert_eq!(validate_phrase("manage worker pool"), "coordinate worker pool");
    }

    #[test]
    fn test_truncation_keeps_first_eight_words() {
        let long = "transform one two three four five six seven eight nine";
        let result = validate_phrase(long);
        assert_eq!(result.split_whitespace().count(), 8);
        assert!(result.starts_with("transform one"));
    }

    #[test]
    fn test_no_padding_below_three_words() {
        assert_eq!(validate_phrase("parse input"), "parse input");
        assert_eq!(validate_phrase("parse"), "parse");
    }

    #[test]
    fn test_trailing_punctuation_and_case() {
        assert_eq!(validate_phrase("Parse Configuration Values."), "parse configuration values");
    }

    #[test]
    fn test_validation_is_idempotent() {
        for input in [
            "handle user request and save to database",
            "Process Incoming Records!",
            "iterate array and compute totals",
            "retrieve user profile",
        ] {
            let once = validate_feature_name(input);
            let twice = validate_feature_name(&once.description);
            assert_eq!(once.description, twice.description);
            assert!(twice.sub_features.is_empty() || once.sub_features == twice.sub_features);
        }
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("parseJSONFile"), "parse json file");
        assert_eq!(humanize("load_config"), "load config");
        assert_eq!(humanize("HTTPServer"), "http server");
        assert_eq!(humanize("simple"), "simple");
    }

    #[test]
    fn test_heuristic_prefix_verbs() {
        assert_eq!(heuristic_description("getUserName"), "retrieve user name");
        assert_eq!(heuristic_description("is_valid"), "check if valid");
        assert_eq!(heuristic_description("handleRequest"), "dispatch request");
        assert_eq!(heuristic_description("parse_args"), "parse args");
    }

    #[test]
    fn test_heuristic_default() {
        assert_eq!(
            heuristic_description("frobnicate"),
            "provide frobnicate operation"
        );
    }
}
