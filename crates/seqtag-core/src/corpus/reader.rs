//! Reader for tagged corpus files.
//!
//! One `token<TAB>tag` pair per line, sentences separated by blank lines.
//! Lines starting with `#` that carry no tab are comments.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, SeqTagError};

/// A sentence with one tag per token, before any vocabulary lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

impl TaggedSentence {
    pub fn new(tokens: Vec<String>, tags: Vec<String>) -> Self {
        debug_assert_eq!(tokens.len(), tags.len());
        Self { tokens, tags }
    }

    /// Build from `(token, tag)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let (tokens, tags) = pairs
            .into_iter()
            .map(|(token, tag)| (token.to_string(), tag.to_string()))
            .unzip();
        Self { tokens, tags }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Load every sentence from a tagged corpus file.
pub fn read_tagged_file<P: AsRef<Path>>(path: P) -> Result<Vec<TaggedSentence>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut sentences = Vec::new();
    let mut tokens = Vec::new();
    let mut tags = Vec::new();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            if !tokens.is_empty() {
                sentences.push(TaggedSentence::new(
                    std::mem::take(&mut tokens),
                    std::mem::take(&mut tags),
                ));
            }
            continue;
        }

        if line.starts_with('#') && !line.contains('\t') {
            continue;
        }

        let (token, tag) = split_pair(line).ok_or_else(|| SeqTagError::MalformedLine {
            path: path.to_path_buf(),
            line: line_idx + 1,
            reason: format!("expected `token<TAB>tag`, found {line:?}"),
        })?;

        tokens.push(token.to_string());
        tags.push(tag.to_string());
    }

    // Don't forget the last sentence
    if !tokens.is_empty() {
        sentences.push(TaggedSentence::new(tokens, tags));
    }

    Ok(sentences)
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = line.split('\t').collect();
    let parts = if parts.len() == 2 {
        parts
    } else {
        line.split_whitespace().collect()
    };

    match parts.as_slice() {
        &[token, tag] if !token.is_empty() && !tag.trim().is_empty() => Some((token, tag.trim())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_corpus(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_sentences() {
        let file = write_corpus("# sample\nThe\tDT\ndog\tNN\n\nIt\tPRP\nran\tVBD\n.\t.\n");
        let sentences = read_tagged_file(file.path()).unwrap();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].tokens, vec!["The", "dog"]);
        assert_eq!(sentences[1].tags, vec!["PRP", "VBD", "."]);
    }

    #[test]
    fn test_hash_token_is_not_a_comment() {
        let file = write_corpus("#\t#\n5\tCD\n");
        let sentences = read_tagged_file(file.path()).unwrap();
        assert_eq!(sentences[0].tokens, vec!["#", "5"]);
    }

    #[test]
    fn test_space_separated_and_repeated_blank_lines() {
        let file = write_corpus("\n\nHello UH\n\n\n\nworld NN\n");
        let sentences = read_tagged_file(file.path()).unwrap();
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let file = write_corpus("The\tDT\nbroken line here\n");
        let err = read_tagged_file(file.path()).unwrap_err();
        match err {
            SeqTagError::MalformedLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
