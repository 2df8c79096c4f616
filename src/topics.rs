use std::collections::{HashMap, HashSet};

use stop_words::{LANGUAGE, get};

const MIN_TERM_LEN: usize = 3;

/// The `n` most frequent words across `texts`, most frequent first.
///
/// Expects cleaned text (lowercase, space separated). English stop words and
/// words shorter than three characters are skipped. Ties sort alphabetically.
pub fn top_terms<S: AsRef<str>>(texts: &[S], n: usize) -> Vec<String> {
    let stop: HashSet<String> = get(LANGUAGE::English).into_iter().collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in texts.iter().flat_map(|t| t.as_ref().split_whitespace()) {
        if word.chars().count() < MIN_TERM_LEN || stop.contains(word) {
            continue;
        }
        *counts.entry(word).or_default() += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(word, _)| word.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_frequency_then_alphabetically() {
        let texts = [
            "graph algorithms and graph theory",
            "theory of graph coloring",
            "coloring lattices",
        ];
        assert_eq!(top_terms(&texts, 3), vec!["graph", "coloring", "theory"]);
    }

    #[test]
    fn skips_stop_words_and_short_tokens() {
        let texts = ["the an of it is rust go c"];
        assert_eq!(top_terms(&texts, 5), vec!["rust"]);
    }

    #[test]
    fn empty_input_has_no_terms() {
        let texts: [&str; 0] = [];
        assert!(top_terms(&texts, 3).is_empty());
        assert!(top_terms(&["rust"], 0).is_empty());
    }
}
