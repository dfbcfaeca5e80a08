//! Character n-gram features for the char embedding table.

const BEGIN: &str = "#BEGIN#";
const END: &str = "#END#";

/// Longest n-gram extracted from a word.
pub const MAX_NGRAM: usize = 4;

/// Character n-grams of `word`, `1..=MAX_NGRAM` long, over the word bracketed
/// by begin/end markers. Keys look like `"3gram-#BEGIN#ca"`, the layout used
/// by published char n-gram embedding files.
pub fn char_ngrams(word: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::with_capacity(word.chars().count() + 2);
    symbols.push(BEGIN.to_string());
    symbols.extend(word.chars().map(String::from));
    symbols.push(END.to_string());

    let mut ngrams = Vec::new();
    for n in 1..=MAX_NGRAM {
        for window in symbols.windows(n) {
            // A lone marker carries no information about the word.
            if n == 1 && (window[0] == BEGIN || window[0] == END) {
                continue;
            }
            ngrams.push(format!("{n}gram-{}", window.concat()));
        }
    }
    ngrams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unigrams_skip_markers() {
        let ngrams = char_ngrams("ab");
        assert!(ngrams.contains(&"1gram-a".to_string()));
        assert!(ngrams.contains(&"1gram-b".to_string()));
        assert!(!ngrams.contains(&"1gram-#BEGIN#".to_string()));
    }

    #[test]
    fn test_bracketed_ngrams() {
        let ngrams = char_ngrams("ab");
        assert!(ngrams.contains(&"2gram-#BEGIN#a".to_string()));
        assert!(ngrams.contains(&"3gram-ab#END#".to_string()));
        assert!(ngrams.contains(&"4gram-#BEGIN#ab#END#".to_string()));
        // 2 unigrams + 3 bigrams + 2 trigrams + 1 four-gram
        assert_eq!(ngrams.len(), 8);
    }

    #[test]
    fn test_multibyte_chars() {
        let ngrams = char_ngrams("né");
        assert!(ngrams.contains(&"1gram-é".to_string()));
    }
}
