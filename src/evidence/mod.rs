/// Split/chimeric alignment evidence for transposon insertions
///
/// This module handles:
/// - The canonical, validated `Evidence` record (one read fragment spanning
///   a transposon-genome junction)
/// - The unvalidated `EvidenceRecord` row as delivered by the aligner
/// - Reading evidence tables grouped by sample
mod reader;

pub use reader::{read_evidence_files, SampleEvidence};

use serde::Deserialize;

use crate::error::Error;

/// Genomic or transposon strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(&self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
        }
    }

    pub fn flip(&self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

impl std::str::FromStr for Strand {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" | "f" | "1" => Ok(Self::Forward),
            "-" | "r" | "-1" => Ok(Self::Reverse),
            other => Err(format!("unknown strand '{other}'")),
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// How the read supports the junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JunctionQuality {
    /// Read split exactly at the junction.
    Exact,
    /// Junction inferred from a soft-clipped alignment end.
    SoftClipped,
    /// Mate pair spanning the junction; no read crosses it.
    Spanning,
}

impl JunctionQuality {
    /// Relative contribution of one record to a call's confidence.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::SoftClipped => 0.5,
            Self::Spanning => 0.25,
        }
    }
}

impl std::str::FromStr for JunctionQuality {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "exact" | "split" => Ok(Self::Exact),
            "soft_clip" | "softclip" | "soft_clipped" => Ok(Self::SoftClipped),
            "spanning" | "mate" => Ok(Self::Spanning),
            other => Err(format!("unknown junction quality '{other}'")),
        }
    }
}

impl std::fmt::Display for JunctionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::SoftClipped => write!(f, "soft_clip"),
            Self::Spanning => write!(f, "spanning"),
        }
    }
}

/// Transposon side of a junction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposonAnchor {
    /// Transposon feature name (e.g. "SA", "SD", "En2SA").
    pub feature: String,
    pub strand: Strand,
    /// Position within the transposon sequence (1-based).
    pub position: u64,
}

/// A single validated piece of junction evidence.
///
/// Positions are 1-based. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub seqname: String,
    pub position: u64,
    pub strand: Strand,
    pub transposon: TransposonAnchor,
    pub read_name: String,
    pub junction: JunctionQuality,
}

impl Evidence {
    /// Sort key used by the clusterer: (chromosome, strand, position).
    pub fn sort_key(&self) -> (&str, Strand, u64) {
        (&self.seqname, self.strand, self.position)
    }
}

/// Unvalidated evidence row, as read from an aligner's evidence table.
///
/// Every field is optional so that a malformed row can be reported with a
/// `Validation` error instead of failing the whole table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceRecord {
    #[serde(default)]
    pub sample: Option<String>,
    #[serde(default)]
    pub seqname: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub strand: Option<String>,
    #[serde(default)]
    pub transposon_feature: Option<String>,
    #[serde(default)]
    pub transposon_strand: Option<String>,
    #[serde(default)]
    pub transposon_position: Option<String>,
    #[serde(default)]
    pub read_name: Option<String>,
    #[serde(default)]
    pub junction: Option<String>,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl EvidenceRecord {
    /// Short identifier used in validation messages.
    pub fn label(&self) -> String {
        match non_empty(&self.read_name) {
            Some(name) => name.to_string(),
            None => "<unnamed>".to_string(),
        }
    }

    /// Validate the record into an immutable `Evidence`.
    ///
    /// Chromosome, position and strand are mandatory. A missing transposon
    /// strand defaults to forward, a missing transposon position to 0 and a
    /// missing junction flag to soft-clipped.
    pub fn validate(&self) -> Result<Evidence, Error> {
        let invalid = |reason: String| Error::Validation {
            record: self.label(),
            reason,
        };

        let seqname = non_empty(&self.seqname)
            .ok_or_else(|| invalid("missing chromosome".to_string()))?
            .to_string();

        let position = non_empty(&self.position)
            .ok_or_else(|| invalid("missing position".to_string()))?
            .parse::<u64>()
            .map_err(|e| invalid(format!("invalid position: {e}")))?;
        if position == 0 {
            return Err(invalid("position must be 1-based".to_string()));
        }

        let strand = non_empty(&self.strand)
            .ok_or_else(|| invalid("missing strand".to_string()))?
            .parse::<Strand>()
            .map_err(invalid)?;

        let feature = non_empty(&self.transposon_feature)
            .ok_or_else(|| invalid("missing transposon feature".to_string()))?
            .to_string();

        let transposon_strand = match non_empty(&self.transposon_strand) {
            Some(s) => s.parse::<Strand>().map_err(invalid)?,
            None => Strand::Forward,
        };

        let transposon_position = match non_empty(&self.transposon_position) {
            Some(s) => s
                .parse::<u64>()
                .map_err(|e| invalid(format!("invalid transposon position: {e}")))?,
            None => 0,
        };

        let junction = match non_empty(&self.junction) {
            Some(s) => s.parse::<JunctionQuality>().map_err(invalid)?,
            None => JunctionQuality::SoftClipped,
        };

        Ok(Evidence {
            seqname,
            position,
            strand,
            transposon: TransposonAnchor {
                feature,
                strand: transposon_strand,
                position: transposon_position,
            },
            read_name: self.label(),
            junction,
        })
    }
}
