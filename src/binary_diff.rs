use std::collections::HashMap;

use crate::codec::DiffChunk;
use crate::rolling_hash::RollingHash;

/// Default match window of the delta engine.
pub const MATCH_WINDOW: usize = 4096;

struct WindowSignature {
    weak: u32,
    strong: blake3::Hash,
    offset: usize,
}

/// Describe `new` as copies from `old` plus literal inserts.
///
/// `old` is cut into `window`-sized signatures; `new` is scanned with a
/// rolling checksum and every position whose weak and strong hashes both match
/// an old window becomes a `Copy`. Everything else is gathered into `Insert`s.
/// Adjacent copies of contiguous old ranges are merged.
pub fn compute_diff(old: &[u8], new: &[u8], window: usize) -> Vec<DiffChunk> {
    let window = window.max(1);

    if new.is_empty() {
        return vec![];
    }
    if old.is_empty() || new.len() < window {
        return vec![DiffChunk::Insert { data: new.to_vec() }];
    }

    let signatures = build_signatures(old, window);
    let table = build_table(&signatures);

    let mut chunks: Vec<DiffChunk> = Vec::new();
    let mut literal: Vec<u8> = Vec::new();

    let mut rolling = RollingHash::over(&new[..window]);
    let mut pos = 0usize;

    while pos + window <= new.len() {
        let candidate = find_match(rolling.digest(), &new[pos..pos + window], &table, &signatures);

        match candidate {
            Some(offset) => {
                if !literal.is_empty() {
                    chunks.push(DiffChunk::Insert {
                        data: std::mem::take(&mut literal),
                    });
                }
                push_copy(&mut chunks, offset as u64, window as u64);
                pos += window;
                if pos + window <= new.len() {
                    rolling = RollingHash::over(&new[pos..pos + window]);
                }
            }
            None => {
                literal.push(new[pos]);
                pos += 1;
                if pos + window <= new.len() {
                    rolling.roll(new[pos - 1], new[pos + window - 1]);
                }
            }
        }
    }

    literal.extend_from_slice(&new[pos..]);
    if !literal.is_empty() {
        chunks.push(DiffChunk::Insert { data: literal });
    }

    chunks
}

fn build_signatures(data: &[u8], window: usize) -> Vec<WindowSignature> {
    // Only full windows can match a full-width window of `new`.
    data.chunks_exact(window)
        .enumerate()
        .map(|(i, block)| WindowSignature {
            weak: RollingHash::over(block).digest(),
            strong: blake3::hash(block),
            offset: i * window,
        })
        .collect()
}

fn build_table(signatures: &[WindowSignature]) -> HashMap<u32, Vec<usize>> {
    let mut table: HashMap<u32, Vec<usize>> = HashMap::with_capacity(signatures.len());
    for (idx, sig) in signatures.iter().enumerate() {
        table.entry(sig.weak).or_default().push(idx);
    }
    table
}

fn find_match(
    weak: u32,
    new_window: &[u8],
    table: &HashMap<u32, Vec<usize>>,
    signatures: &[WindowSignature],
) -> Option<usize> {
    let candidates = table.get(&weak)?;
    let strong = blake3::hash(new_window);
    candidates
        .iter()
        .map(|&idx| &signatures[idx])
        .find(|sig| sig.strong == strong)
        .map(|sig| sig.offset)
}

fn push_copy(chunks: &mut Vec<DiffChunk>, offset: u64, length: u64) {
    if let Some(DiffChunk::Copy {
        offset: prev_offset,
        length: prev_length,
    }) = chunks.last_mut()
    {
        if *prev_offset + *prev_length == offset {
            *prev_length += length;
            return;
        }
    }
    chunks.push(DiffChunk::Copy { offset, length });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_patch::apply_diff;

    const W: usize = 64;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_identical_data_is_one_copy() {
        let data = patterned(W * 5);
        let chunks = compute_diff(&data, &data, W);
        assert_eq!(
            chunks,
            vec![DiffChunk::Copy {
                offset: 0,
                length: (W * 5) as u64
            }]
        );
        assert_eq!(apply_diff(&data, &chunks).unwrap(), data);
    }

    #[test]
    fn test_completely_different() {
        let old = vec![0u8; W * 2];
        let new = vec![1u8; W * 2];
        let chunks = compute_diff(&old, &new, W);
        assert!(chunks.iter().all(|c| matches!(c, DiffChunk::Insert { .. })));
        assert_eq!(apply_diff(&old, &chunks).unwrap(), new);
    }

    #[test]
    fn test_prefix_changed_keeps_tail_copies() {
        let old = patterned(W * 4);
        let mut new = old.clone();
        new[..W].fill(0xFF);

        let chunks = compute_diff(&old, &new, W);
        assert_eq!(apply_diff(&old, &chunks).unwrap(), new);
        assert!(chunks.contains(&DiffChunk::Copy {
            offset: W as u64,
            length: (W * 3) as u64
        }));
    }

    #[test]
    fn test_empty_sides() {
        assert!(compute_diff(&[1, 2, 3], &[], W).is_empty());
        let chunks = compute_diff(&[], &[7u8; 10], W);
        assert_eq!(apply_diff(&[], &chunks).unwrap(), vec![7u8; 10]);
    }

    #[test]
    fn test_insertion_in_middle() {
        let old = patterned(W * 4);
        let mut new = old.clone();
        new.splice(W * 2..W * 2, vec![0xAA; 100]);

        let chunks = compute_diff(&old, &new, W);
        assert_eq!(apply_diff(&old, &chunks).unwrap(), new);
        let copied: u64 = chunks
            .iter()
            .filter_map(|c| match c {
                DiffChunk::Copy { length, .. } => Some(*length),
                DiffChunk::Insert { .. } => None,
            })
            .sum();
        assert_eq!(copied, (W * 4) as u64);
    }
}
