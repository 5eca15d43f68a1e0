use std::path::PathBuf;

/// Errors that can occur in ruCTG.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("table error: {0}")]
    Table(String),

    #[error("GTF parsing error: {0}")]
    Gtf(String),

    /// A single malformed evidence record. Recoverable: the record is
    /// skipped and the rest of the sample is still clustered.
    #[error("invalid evidence record {record}: {reason}")]
    Validation { record: String, reason: String },

    #[error(
        "insufficient cohort: {available} sample(s) available, {required} required \
         (samples: [{}], genes with insertions: [{}])",
        samples.join(", "),
        genes.join(", ")
    )]
    InsufficientCohort {
        required: usize,
        available: usize,
        samples: Vec<String>,
        genes: Vec<String>,
    },

    #[error("empty cohort: no insertions to test")]
    EmptyCohort,

    #[error("background calibration failed: {0}")]
    Calibration(String),

    /// Per-gene failure; surfaces as a missing p-value, never aborts the run.
    #[error("degenerate test for gene {gene_id}: {reason}")]
    StatisticalDegeneracy { gene_id: String, reason: String },

    #[error("processing of sample {sample} was aborted")]
    Aborted { sample: String },
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    /// Whether this error only affects a single record or gene.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::StatisticalDegeneracy { .. } | Self::Aborted { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Table(err.to_string())
    }
}
