//! Dataset sampling utilities.

use rand::seq::index;
use rand::{rngs::StdRng, SeedableRng};

use crate::dataset::{match_records, Dataset, Label, Record, Records};
use crate::error::DatasetError;

/// Sampling options. Exactly one of `n` and `fraction` must be set.
#[derive(Clone, Debug, Default)]
pub struct SampleOptions {
    pub n: Option<usize>,
    pub fraction: Option<f64>,
    pub seed: Option<u64>,
}

/// Validate sampling options before running.
pub fn validate_sample_options(opts: &SampleOptions) -> Result<(), DatasetError> {
    match (opts.n, opts.fraction) {
        (Some(_), Some(_)) => {
            return Err(DatasetError::InvalidSampleParams {
                message: "-n and --fraction are mutually exclusive".to_string(),
            });
        }
        (None, None) => {
            return Err(DatasetError::InvalidSampleParams {
                message: "set exactly one of -n or --fraction".to_string(),
            });
        }
        _ => {}
    }

    if opts.n == Some(0) {
        return Err(DatasetError::InvalidSampleParams {
            message: "-n must be greater than 0".to_string(),
        });
    }

    if let Some(fraction) = opts.fraction {
        if !(0.0 < fraction && fraction <= 1.0) {
            return Err(DatasetError::InvalidSampleParams {
                message: "--fraction must be in the interval (0.0, 1.0]".to_string(),
            });
        }
    }

    Ok(())
}

/// Picks the record indices a sample keeps, ascending.
///
/// A fraction rounds up so a non-empty dataset always keeps a record; `n`
/// larger than the dataset keeps everything.
fn record_indices(total: usize, opts: &SampleOptions) -> Vec<usize> {
    let wanted = match (opts.n, opts.fraction) {
        (Some(n), _) => n,
        (None, Some(fraction)) => ((total as f64 * fraction).ceil() as usize).max(1),
        (None, None) => 0,
    };
    let amount = wanted.min(total);
    if amount == total {
        return (0..total).collect();
    }

    let mut picked = match opts.seed {
        Some(seed) => index::sample(&mut StdRng::seed_from_u64(seed), total, amount),
        None => index::sample(&mut rand::rng(), total, amount),
    }
    .into_vec();
    picked.sort_unstable();
    picked
}

/// Sample records uniformly; kept records stay in their original order.
pub fn sample_dataset(dataset: &Dataset, opts: &SampleOptions) -> Result<Dataset, DatasetError> {
    validate_sample_options(opts)?;

    let keep = record_indices(dataset.len(), opts);
    log::info!("Sampled {} of {} records", keep.len(), dataset.len());

    fn pick<L: Label>(records: &[Record<L>], keep: &[usize]) -> Records {
        L::wrap(keep.iter().map(|&i| records[i].clone()).collect())
    }
    let records = match_records!(dataset.records(), r => pick(r, &keep));
    Ok(dataset.with_records(records).with_labels(dataset.labels()?.clone()))
}
