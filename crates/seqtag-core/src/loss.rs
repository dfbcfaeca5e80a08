//! Masked cross-entropy and arg-max accuracy over flattened token scores.

use candle_core::{D, DType, Tensor};

use crate::error::Result;

/// Target value of padding slots. Never contributes to the loss.
pub const IGNORE_LABEL: i64 = -1;

/// Cross-entropy summed over every slot whose target is not [`IGNORE_LABEL`].
///
/// `scores` is `[n, num_classes]`, `targets` is `[n]` of `i64`. The result is a
/// scalar; callers normalize it however they see fit.
pub fn summed_cross_entropy(scores: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let keep = targets.ge(0i64)?;
    let safe_targets = keep
        .where_cond(targets, &targets.zeros_like()?)?
        .to_dtype(DType::U32)?
        .unsqueeze(1)?;

    let log_probs = candle_nn::ops::log_softmax(scores, D::Minus1)?;
    let nll = log_probs.gather(&safe_targets, 1)?.squeeze(1)?.neg()?;
    let keep = keep.to_dtype(nll.dtype())?;

    Ok((nll * keep)?.sum_all()?)
}

/// Arg-max predictions over the class dimension, as `i64`.
pub fn predictions(scores: &Tensor) -> Result<Tensor> {
    Ok(scores.argmax(D::Minus1)?.to_dtype(DType::I64)?)
}

/// Number of slots whose arg-max prediction equals the target.
///
/// The comparison covers every slot of the padded batch. Padding slots hold
/// [`IGNORE_LABEL`], which no arg-max index can equal, so they never count
/// as correct.
pub fn count_correct(scores: &Tensor, targets: &Tensor) -> Result<usize> {
    let matches = predictions(scores)?.eq(targets)?;
    let correct = matches.to_dtype(DType::U32)?.sum_all()?.to_scalar::<u32>()?;
    Ok(correct as usize)
}

/// `100 * correct / tokens`, or `None` when there were no tokens.
pub fn accuracy_percent(correct: usize, tokens: usize) -> Option<f64> {
    (tokens > 0).then(|| 100.0 * correct as f64 / tokens as f64)
}
