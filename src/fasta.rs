use std::io::BufRead;
use std::path::Path;

use tracing::info;

use crate::domain::SequenceIndex;
use crate::error::LctrError;
use crate::fs_util::open_text;

pub fn read_sequences(path: &Path) -> Result<SequenceIndex, LctrError> {
    let reader = open_text(path)?;
    let sequences = parse_sequences(reader)?;
    info!(path = %path.display(), sequences = sequences.len(), "read query sequences");
    Ok(sequences)
}

pub fn parse_sequences<R: BufRead>(reader: R) -> Result<SequenceIndex, LctrError> {
    let mut sequences = SequenceIndex::new();
    let mut current: Option<(String, String)> = None;

    for line in reader.lines() {
        let line = line.map_err(|err| LctrError::Filesystem(err.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            if let Some((id, seq)) = current.take() {
                insert_unique(&mut sequences, id, seq)?;
            }
            let id = header
                .split_whitespace()
                .next()
                .ok_or_else(|| LctrError::FastaParse("record with empty header".to_string()))?;
            current = Some((id.to_string(), String::new()));
        } else {
            let Some((_, seq)) = current.as_mut() else {
                return Err(LctrError::FastaParse(
                    "sequence data before first header".to_string(),
                ));
            };
            seq.push_str(line);
        }
    }
    if let Some((id, seq)) = current {
        insert_unique(&mut sequences, id, seq)?;
    }
    Ok(sequences)
}

fn insert_unique(
    sequences: &mut SequenceIndex,
    id: String,
    seq: String,
) -> Result<(), LctrError> {
    if sequences.contains_key(&id) {
        return Err(LctrError::FastaParse(format!("duplicate record id {id}")));
    }
    sequences.insert(id, seq);
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn joins_wrapped_sequences() {
        let input = ">asv1 size=120\nACGT\nTTGA\n>asv2\nGGCC\n";
        let sequences = parse_sequences(input.as_bytes()).unwrap();
        assert_eq!(sequences["asv1"], "ACGTTTGA");
        assert_eq!(sequences["asv2"], "GGCC");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let input = ">asv1\nACGT\n>asv2\nGGCC\n>asv1 rerun\nTTTT\n";
        let err = parse_sequences(input.as_bytes()).unwrap_err();
        assert_matches!(err, LctrError::FastaParse(message) if message.contains("asv1"));
    }

    #[test]
    fn rejects_headerless_data() {
        let err = parse_sequences("ACGT\n".as_bytes()).unwrap_err();
        assert_matches!(err, LctrError::FastaParse(_));
    }
}
