use thiserror::Error;

/// Failures raised by the per-instrument pipeline.
///
/// Structural errors abort processing of the one instrument they belong to;
/// the batch runner attaches the symbol and keeps going. Warmup gaps and a
/// flat CCI window are not errors at all: they surface as absent values in
/// the analyzed table.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no parseable observations in raw series")]
    EmptySeries,

    #[error("required column `{0}` missing from raw input")]
    MissingColumn(&'static str),

    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("failed to read raw table")]
    Csv(#[from] csv::Error),
}
