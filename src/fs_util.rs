use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::LctrError;

pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, LctrError> {
    if !path.exists() {
        return Err(LctrError::MissingInput(path.display().to_string()));
    }
    let file = File::open(path)
        .map_err(|err| LctrError::Filesystem(format!("open {}: {err}", path.display())))?;
    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
