use std::ops::Range;

use crate::codec::DiffChunk;
use crate::error::{PatchError, Result};

/// Rebuild the new buffer from `old` and a chunk list.
///
/// Copy ranges are bounds-checked against `old` before anything is allocated;
/// a range outside it means the chunks were not computed against this buffer.
pub fn apply_diff(old: &[u8], chunks: &[DiffChunk]) -> Result<Vec<u8>> {
    let mut output_len: u64 = 0;
    for chunk in chunks {
        let len = match chunk {
            DiffChunk::Copy { offset, length } => {
                copy_range(old, *offset, *length)?;
                *length
            }
            DiffChunk::Insert { data } => data.len() as u64,
        };
        output_len = output_len
            .checked_add(len)
            .ok_or_else(|| PatchError::codec("chunk lengths overflow the output size"))?;
    }

    let capacity = usize::try_from(output_len).map_err(|_| {
        PatchError::codec(format!("output of {output_len} bytes does not fit in memory"))
    })?;
    let mut result = Vec::with_capacity(capacity);

    for chunk in chunks {
        match chunk {
            DiffChunk::Copy { offset, length } => {
                result.extend_from_slice(&old[copy_range(old, *offset, *length)?]);
            }
            DiffChunk::Insert { data } => {
                result.extend_from_slice(data);
            }
        }
    }

    Ok(result)
}

fn copy_range(old: &[u8], offset: u64, length: u64) -> Result<Range<usize>> {
    offset
        .checked_add(length)
        .filter(|end| *end <= old.len() as u64)
        .map(|end| offset as usize..end as usize)
        .ok_or_else(|| {
            PatchError::codec(format!(
                "copy of {length} bytes at offset {offset} exceeds old block of {} bytes",
                old.len()
            ))
        })
}
