/// Tabular input/output helpers with transparent gzip decompression
use crate::error::Error;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Open a text file (plain or gzip compressed)
///
/// Compression is detected by the `.gz`/`.gzip` extension.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>, Error> {
    let path_str = path.to_string_lossy();
    let is_gzipped = path_str.ends_with(".gz") || path_str.ends_with(".gzip");

    let file = File::open(path).map_err(|e| Error::io(e, path))?;

    if is_gzipped {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Tab-separated reader over a plain or gzipped file.
pub fn tsv_reader(
    path: &Path,
    has_headers: bool,
) -> Result<csv::Reader<Box<dyn BufRead + Send>>, Error> {
    let input = open_input(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(input))
}

/// Tab-separated writer for `{prefix}{name}`.
pub fn tsv_writer(prefix: &Path, name: &str) -> Result<(csv::Writer<BufWriter<File>>, PathBuf), Error> {
    let path = output_path(prefix, name);
    let file = File::create(&path).map_err(|e| Error::io(e, &path))?;
    let writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(BufWriter::new(file));
    Ok((writer, path))
}

/// Concatenate an output prefix and a file name.
///
/// A prefix ending in a path separator is a directory; anything else is
/// used as a file name prefix (`/out/sample1_` + `ctg.tsv`).
pub fn output_path(prefix: &Path, name: &str) -> PathBuf {
    let prefix_str = prefix.to_string_lossy();
    if prefix_str.is_empty() || prefix_str.ends_with('/') || prefix_str.ends_with('\\') {
        prefix.join(name)
    } else {
        PathBuf::from(format!("{}{}", prefix_str, name))
    }
}
