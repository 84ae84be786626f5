use std::collections::HashMap;

use lazy_static::lazy_static;
use unicode_segmentation::UnicodeSegmentation;

/// Clitics split off the end of a word, as in "they're" -> "they", "'re".
const CLITICS: [&str; 6] = ["'s", "'re", "'ve", "'ll", "'d", "'m"];

/// Clitic remainders that may follow a detached apostrophe, as in "' s".
const CLITIC_TAILS: [&str; 6] = ["s", "re", "ve", "ll", "d", "m"];

lazy_static! {
    /// Irregular plural forms and their dictionary base form.
    static ref IRREGULAR_NOUNS: HashMap<&'static str, &'static str> = [
        ("children", "child"),
        ("people", "person"),
        ("women", "woman"),
        ("men", "man"),
        ("firemen", "fireman"),
        ("policemen", "policeman"),
        ("fishermen", "fisherman"),
        ("gentlemen", "gentleman"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("geese", "goose"),
        ("mice", "mouse"),
        ("lice", "louse"),
        ("oxen", "ox"),
        ("dice", "die"),
        ("wives", "wife"),
        ("lives", "life"),
        ("knives", "knife"),
        ("leaves", "leaf"),
        ("shelves", "shelf"),
        ("halves", "half"),
        ("wolves", "wolf"),
        ("loaves", "loaf"),
        ("thieves", "thief"),
        ("criteria", "criterion"),
        ("phenomena", "phenomenon"),
        ("data", "datum"),
        ("media", "medium"),
        ("crises", "crisis"),
        ("analyses", "analysis"),
        ("diagnoses", "diagnosis"),
        ("bases", "basis"),
        ("potatoes", "potato"),
        ("tomatoes", "tomato"),
        ("heroes", "hero"),
        ("echoes", "echo"),
    ]
    .into_iter()
    .collect();

    /// Words that end like plurals but are already in base form.
    static ref UNINFLECTED: std::collections::HashSet<&'static str> = [
        "news", "series", "species", "means", "aids", "sos", "gas", "yes", "bus", "plus",
        "this", "his", "is", "was", "has", "us", "as", "its", "does", "goes", "always",
        "perhaps", "thus", "whereas", "across", "less", "unless", "lens", "physics",
        "politics", "economics", "mathematics", "measles", "diabetes", "rabies", "clothes",
        "police", "cattle", "sheep", "fish", "deer", "aircraft",
    ]
    .into_iter()
    .collect();
}

/// Forces the lemmatizer tables to be built. They are otherwise built on first use and kept
/// for the lifetime of the process.
pub fn init_lemmatizer() {
    lazy_static::initialize(&IRREGULAR_NOUNS);
    lazy_static::initialize(&UNINFLECTED);
}

/// Reduces an inflected noun form to its base form.
///
/// Follows the noun rules of dictionary-based lemmatizers: irregular forms come from a fixed
/// table, and regular plural suffixes are stripped only when the remaining stem still looks
/// like a word. Reductions repeat until none applies ("childrens" -> "children" -> "child"),
/// so applying the lemmatizer to its own output changes nothing.
pub fn lemmatize(word: &str) -> String {
    let mut current = word.to_string();
    while let Some(reduced) = reduce_once(&current) {
        current = reduced;
    }
    current
}

/// One reduction step, or `None` when `word` is already a base form.
fn reduce_once(word: &str) -> Option<String> {
    if let Some(base) = IRREGULAR_NOUNS.get(word) {
        return Some((*base).to_string());
    }
    if UNINFLECTED.contains(word) || word.chars().count() < 4 || !word.chars().all(char::is_alphabetic) {
        return None;
    }

    if let Some(stem) = word.strip_suffix("ies") {
        if stem.len() >= 2 {
            return Some(format!("{}y", stem));
        }
    }
    if let Some(stem) = word.strip_suffix("es") {
        if ["ss", "x", "z", "ch", "sh"].iter().any(|end| stem.ends_with(end)) {
            return Some(stem.to_string());
        }
    }
    if let Some(stem) = word.strip_suffix('s') {
        let keeps_final_s = ["s", "u", "i"].iter().any(|end| stem.ends_with(end));
        if !keeps_final_s && stem.len() >= 3 {
            return Some(stem.to_string());
        }
    }
    None
}

/// Normalizes raw message text into the lexical units the feature extractor counts.
///
/// Text is split on Unicode word boundaries (UAX #29); whitespace segments are dropped while
/// punctuation is kept as its own token. Contractions are split the way treebank tokenizers do
/// it ("can't" -> "ca", "n't"; "we're" -> "we", "'re"). Every token is then lower-cased,
/// lemmatized and trimmed. The function is pure: the same text always yields the same tokens.
///
/// ```
/// use triage::tokenize;
///
/// assert_eq!(tokenize("Houses flooded!"), vec!["house", "flooded", "!"]);
/// assert!(tokenize("").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();

    let mut segments = text.split_word_bounds().peekable();
    while let Some(segment) = segments.next() {
        if segment.trim().is_empty() {
            continue;
        }
        // A detached apostrophe directly followed by a clitic tail is one token ("'s").
        if is_apostrophe(segment) {
            if let Some(next) = segments.peek() {
                let tail = next.to_lowercase();
                if CLITIC_TAILS.contains(&tail.as_str()) {
                    raw.push(format!("'{}", next));
                    segments.next();
                    continue;
                }
            }
        }
        split_contraction(segment, &mut raw);
    }

    raw.into_iter()
        .map(|token| lemmatize(&token.to_lowercase()).trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_apostrophe(segment: &str) -> bool {
    segment == "'" || segment == "\u{2019}"
}

fn split_contraction(word: &str, out: &mut Vec<String>) {
    let normalized = word.replace('\u{2019}', "'");
    let lower = normalized.to_lowercase();

    if lower.ends_with("n't") {
        let split = normalized.len() - 3;
        if split > 0 {
            out.push(normalized[..split].to_string());
        }
        out.push(normalized[split..].to_string());
        return;
    }
    for clitic in CLITICS {
        if lower.ends_with(clitic) && lower.len() > clitic.len() {
            let split = normalized.len() - clitic.len();
            out.push(normalized[..split].to_string());
            out.push(normalized[split..].to_string());
            return;
        }
    }
    out.push(normalized);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n\t ").is_empty());
    }

    #[test]
    fn test_punctuation_is_kept() {
        assert_eq!(tokenize("We need water, food."), vec!["we", "need", "water", ",", "food", "."]);
    }

    #[test]
    fn test_contractions() {
        assert_eq!(tokenize("We don't have tents"), vec!["we", "do", "n't", "have", "tent"]);
        assert_eq!(tokenize("They're stuck"), vec!["they", "'re", "stuck"]);
    }

    #[test]
    fn test_lemmatization() {
        assert_eq!(lemmatize("cities"), "city");
        assert_eq!(lemmatize("boxes"), "box");
        assert_eq!(lemmatize("churches"), "church");
        assert_eq!(lemmatize("children"), "child");
        assert_eq!(lemmatize("glass"), "glass");
        assert_eq!(lemmatize("news"), "news");
        assert_eq!(lemmatize("tents"), "tent");
        assert_eq!(lemmatize("firemen"), "fireman");
    }

    #[test]
    fn test_lemmatizer_is_a_fixpoint() {
        for word in [
            "cities", "boxes", "glasses", "children", "shelters", "buses", "series", "childrens",
            "peoples", "womens", "mens",
        ] {
            let once = lemmatize(word);
            assert_eq!(lemmatize(&once), once, "not a fixpoint for {}", word);
        }
        assert_eq!(lemmatize("childrens"), "child");
        assert_eq!(lemmatize("peoples"), "person");
        assert_eq!(lemmatize("womens"), "woman");
    }

    #[test]
    fn test_retokenizing_is_idempotent() {
        let text = "The children's shelters aren't safe!! Flooding in Port-au-Prince, 3.5 meters.";
        let first = tokenize(text);
        let second = tokenize(&first.join(" "));
        assert_eq!(first, second);
    }

    #[test]
    fn test_mixed_case() {
        assert_eq!(tokenize("HELP Us"), vec!["help", "us"]);
    }
}
