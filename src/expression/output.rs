/// Expression comparison output ({prefix}expression.tsv)
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Error;
use crate::expression::correlate::ExpressionResult;
use crate::io::tsv_writer;

pub const EXPRESSION_FILE: &str = "expression.tsv";

#[derive(Debug, Serialize)]
struct ExpressionRow<'a> {
    gene_id: &'a str,
    gene_name: &'a str,
    n_positive: usize,
    n_negative: usize,
    median_positive: Option<f64>,
    median_negative: Option<f64>,
    u: Option<f64>,
    auc: Option<String>,
    z: Option<String>,
    p_value: Option<String>,
    q_value: Option<String>,
}

pub fn write_expression(results: &[ExpressionResult], prefix: &Path) -> Result<PathBuf, Error> {
    let (mut writer, path) = tsv_writer(prefix, EXPRESSION_FILE)?;

    for r in results {
        let test = r.test.as_ref();
        writer.serialize(ExpressionRow {
            gene_id: &r.gene_id,
            gene_name: r.gene_name.as_deref().unwrap_or("."),
            n_positive: r.n_positive,
            n_negative: r.n_negative,
            median_positive: r.median_positive,
            median_negative: r.median_negative,
            u: test.map(|t| t.u),
            auc: test.map(|t| format!("{:.4}", t.auc)),
            z: test.map(|t| format!("{:.4}", t.z)),
            p_value: test.map(|t| format!("{:.6e}", t.p_value)),
            q_value: r.q_value.map(|q| format!("{:.6e}", q)),
        })?;
    }
    writer.flush().map_err(|e| Error::io(e, &path))?;

    log::info!("Wrote {} expression comparisons to {}", results.len(), path.display());
    Ok(path)
}
