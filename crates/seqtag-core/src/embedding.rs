//! # Pretrained Embeddings
//!
//! Fills rows of an embedding table from a text file of
//! `token v1 v2 ... vd` lines.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::Tensor;
use tracing::debug;

use crate::error::{Result, SeqTagError};
use crate::params::ParamStore;
use crate::vocab::Vocabulary;

/// How many vocabulary entries received a pretrained vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbeddingStats {
    /// Rows overwritten from the file.
    pub matched: usize,
    /// File lines whose token is not in the vocabulary.
    pub skipped: usize,
}

/// Overwrite the rows of `param` for every vocabulary entry found in `path`.
///
/// Rows of entries missing from the file keep their current values. A
/// two-field first line (word2vec header) is ignored.
pub fn load_embeddings<P: AsRef<Path>>(
    store: &ParamStore,
    param: &str,
    vocab: &Vocabulary,
    path: P,
) -> Result<EmbeddingStats> {
    let path = path.as_ref();
    let table = store
        .get(param)
        .ok_or_else(|| SeqTagError::MissingParam(param.to_string()))?;
    let (rows, dim) = table.var().dims2()?;
    let mut values: Vec<Vec<f32>> = table.var().to_dtype(candle_core::DType::F32)?.to_vec2()?;

    let reader = BufReader::new(File::open(path)?);
    let mut stats = EmbeddingStats::default();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(token) = fields.next() else {
            continue;
        };
        let numbers: Vec<&str> = fields.collect();

        if line_idx == 0 && numbers.len() == 1 {
            continue;
        }

        let Some(idx) = vocab.get(token).map(|i| i as usize).filter(|&i| i < rows) else {
            stats.skipped += 1;
            continue;
        };

        if numbers.len() != dim {
            return Err(SeqTagError::EmbeddingDim {
                path: path.to_path_buf(),
                line: line_idx + 1,
                expected: dim,
                found: numbers.len(),
            });
        }

        let row = numbers
            .iter()
            .map(|n| n.parse::<f32>())
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| SeqTagError::MalformedLine {
                path: path.to_path_buf(),
                line: line_idx + 1,
                reason: format!("bad vector component: {e}"),
            })?;
        values[idx] = row;
        stats.matched += 1;
    }

    let flat: Vec<f32> = values.into_iter().flatten().collect();
    let updated = Tensor::from_vec(flat, (rows, dim), store.device())?.to_dtype(table.var().dtype())?;
    table.var().set(&updated)?;

    debug!(param, matched = stats.matched, skipped = stats.skipped, "loaded pretrained embeddings");
    Ok(stats)
}
