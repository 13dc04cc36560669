use std::fs;
use std::path::Path;

use chunkpatch::digest::{digest_bytes, digest_tree};
use chunkpatch::error::VerifyStage;
use chunkpatch::{
    apply_patch_with, build_patch, BlockOp, ChunkDeltaCodec, Manifest, Operation, PatchDirs,
    PatchError, ProtocolError,
};
use proptest::prelude::*;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    dirs: PatchDirs,
    target: std::path::PathBuf,
}

impl Fixture {
    fn new(old: &[(&str, &[u8])], new: &[(&str, &[u8])]) -> Self {
        let temp = TempDir::new().unwrap();
        let dirs = PatchDirs {
            old: temp.path().join("old"),
            new: temp.path().join("new"),
            patch: temp.path().join("patch"),
        };
        let target = temp.path().join("target");
        write_tree(&dirs.old, old);
        write_tree(&dirs.new, new);
        Self {
            _temp: temp,
            dirs,
            target,
        }
    }

    fn diff(&self, codec: &ChunkDeltaCodec, block_size: u64) -> chunkpatch::Result<Manifest> {
        let old = digest_tree(&self.dirs.old)?;
        let new = digest_tree(&self.dirs.new)?;
        build_patch(codec, &self.dirs, &old, &new, block_size).map(|(manifest, _)| manifest)
    }

    fn apply(&self, codec: &ChunkDeltaCodec) -> chunkpatch::Result<chunkpatch::ApplySummary> {
        apply_patch_with(codec, &self.dirs.old, &self.target, &self.dirs.patch)
    }
}

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    fs::create_dir_all(root).unwrap();
    for (rel, data) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(747796405).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect()
}

#[test]
fn grown_file_replays_with_trailing_raw_copy() {
    let old = noise(150, 1);
    let mut new = old.clone();
    new.extend(noise(100, 2));
    let fx = Fixture::new(&[("f.bin", &old)], &[("f.bin", &new)]);
    let codec = ChunkDeltaCodec::with_window(16);

    let manifest = fx.diff(&codec, 100).unwrap();
    match &manifest.operations["f.bin"] {
        Operation::Parts(ops) => {
            assert_eq!(ops.len(), 3);
            assert_eq!(ops[0], BlockOp::CopyOld);
            assert_eq!(ops[2], BlockOp::CopyNew);
        }
        other => panic!("expected a block plan, got {other}"),
    }
    assert_eq!(
        fs::read(fx.dirs.patch.join("f.bin.part.3")).unwrap(),
        new[200..].to_vec()
    );
    assert!(manifest.old_digests.contains_key("f.bin"));

    let summary = fx.apply(&codec).unwrap();
    assert_eq!(summary.files_chunked, 1);
    assert_eq!(summary.bytes_written, 250);
    assert_eq!(fs::read(fx.target.join("f.bin")).unwrap(), new);
    assert_eq!(manifest.new_digests["f.bin"], digest_bytes(&new));
}

#[test]
fn empty_files_copy_without_artifacts() {
    let fx = Fixture::new(&[("empty", b"")], &[("empty", b"")]);
    let codec = ChunkDeltaCodec::default();

    let manifest = fx.diff(&codec, 100).unwrap();
    assert_eq!(manifest.operations["empty"], Operation::Copy);
    let staged: Vec<_> = fs::read_dir(&fx.dirs.patch).unwrap().collect();
    assert_eq!(staged.len(), 1, "only patch.json is written");

    fx.apply(&codec).unwrap();
    let rebuilt = fs::read(fx.target.join("empty")).unwrap();
    assert!(rebuilt.is_empty());
    assert_eq!(digest_bytes(&rebuilt), "d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn added_and_nested_files_round_trip() {
    let fx = Fixture::new(
        &[("keep.txt", b"keep"), ("gone.txt", b"bye")],
        &[
            ("keep.txt", b"keep"),
            ("deep/nested/added.bin", &noise(300, 5)),
            ("small.txt", b"tiny but new"),
        ],
    );
    let codec = ChunkDeltaCodec::default();
    let manifest = fx.diff(&codec, 64).unwrap();
    assert_eq!(manifest.operations["deep/nested/added.bin"], Operation::New);
    assert!(!manifest.operations.contains_key("gone.txt"));

    let summary = fx.apply(&codec).unwrap();
    assert_eq!((summary.files_added, summary.files_copied), (2, 1));
    assert_eq!(summary.new_files_verified, 3);
    assert_eq!(
        fs::read(fx.target.join("deep/nested/added.bin")).unwrap(),
        noise(300, 5)
    );
    assert!(!fx.target.join("gone.txt").exists());
}

#[test]
fn drifted_old_tree_writes_nothing() {
    let fx = Fixture::new(
        &[("a.bin", &noise(500, 1)), ("b.bin", &noise(500, 2))],
        &[("a.bin", &noise(500, 3)), ("b.bin", &noise(500, 2))],
    );
    let codec = ChunkDeltaCodec::default();
    fx.diff(&codec, 128).unwrap();

    fs::write(fx.dirs.old.join("b.bin"), b"drift").unwrap();
    let err = fx.apply(&codec).unwrap_err();
    assert!(matches!(err, PatchError::Verification { ref path, .. } if path == "b.bin"));
    assert!(!fx.target.join("a.bin").exists());
}

#[test]
fn missing_artifact_stops_the_run() {
    let old = noise(400, 1);
    let new = noise(400, 2);
    let fx = Fixture::new(&[("f.bin", &old)], &[("f.bin", &new)]);
    let codec = ChunkDeltaCodec::default();
    let manifest = fx.diff(&codec, 100).unwrap();

    // Random data never compresses below the raw block, so every block is raw.
    assert_eq!(
        manifest.operations["f.bin"],
        Operation::Parts(vec![BlockOp::CopyNew; 4])
    );
    fs::remove_file(fx.dirs.patch.join("f.bin.part.2")).unwrap();

    match fx.apply(&codec).unwrap_err() {
        PatchError::Io { path, .. } => assert!(path.ends_with("f.bin.part.2")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn corrupt_manifest_aborts_before_any_write() {
    let fx = Fixture::new(&[("f.txt", b"one")], &[("f.txt", b"two")]);
    let codec = ChunkDeltaCodec::default();
    fx.diff(&codec, 100).unwrap();

    fs::write(fx.dirs.patch.join("patch.json"), b"{\"manifest_version\": ").unwrap();
    assert!(matches!(
        fx.apply(&codec),
        Err(PatchError::Manifest { .. })
    ));
    assert!(!fx.target.exists());
}

#[test]
fn unknown_block_tag_is_protocol_error() {
    let fx = Fixture::new(&[("f.bin", &noise(300, 1))], &[("f.bin", &noise(300, 2))]);
    let codec = ChunkDeltaCodec::default();
    let manifest = fx.diff(&codec, 100).unwrap();

    let text = String::from_utf8(manifest.to_json().unwrap()).unwrap();
    let tampered = text.replacen("new,", "xdelta,", 1);
    fs::write(fx.dirs.patch.join("patch.json"), tampered).unwrap();

    assert!(matches!(
        fx.apply(&codec),
        Err(PatchError::Protocol(ProtocolError::UnknownOperation { .. }))
    ));
}

#[test]
fn output_must_not_be_old_dir() {
    let fx = Fixture::new(&[("f.txt", b"one")], &[("f.txt", b"two")]);
    let codec = ChunkDeltaCodec::default();
    fx.diff(&codec, 100).unwrap();

    let err = apply_patch_with(&codec, &fx.dirs.old, &fx.dirs.old, &fx.dirs.patch).unwrap_err();
    assert!(matches!(err, PatchError::Io { .. }));
    assert_eq!(fs::read(fx.dirs.old.join("f.txt")).unwrap(), b"one");
}

fn periodic(len: usize) -> Vec<u8> {
    (0..len as u32).map(|i| (i % 97) as u8).collect()
}

#[test]
fn added_manifest_name_is_rejected_before_staging() {
    let fx = Fixture::new(
        &[("a.txt", b"a")],
        &[("a.txt", b"a"), ("patch.json", b"{\"not\": \"a manifest\"}")],
    );
    match fx.diff(&ChunkDeltaCodec::default(), 100).unwrap_err() {
        PatchError::ArtifactCollision { path, .. } => assert_eq!(path, "patch.json"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.dirs.patch.exists());
}

#[test]
fn added_file_named_like_a_block_artifact_is_rejected() {
    let fx = Fixture::new(
        &[("a", &noise(300, 1))],
        &[("a", &noise(300, 2)), ("a.part.1", b"stowaway")],
    );
    match fx.diff(&ChunkDeltaCodec::default(), 100).unwrap_err() {
        PatchError::ArtifactCollision { path, .. } => assert_eq!(path, "a.part.1"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.dirs.patch.exists());
}

#[test]
fn tampered_raw_block_fails_postcondition() {
    let fx = Fixture::new(&[("f.bin", &noise(400, 1))], &[("f.bin", &noise(400, 2))]);
    let codec = ChunkDeltaCodec::default();
    let manifest = fx.diff(&codec, 100).unwrap();
    assert_eq!(
        manifest.operations["f.bin"],
        Operation::Parts(vec![BlockOp::CopyNew; 4])
    );

    fs::write(fx.dirs.patch.join("f.bin.part.2"), noise(100, 9)).unwrap();
    match fx.apply(&codec).unwrap_err() {
        PatchError::Verification { path, stage, .. } => {
            assert_eq!(path, "f.bin");
            assert_eq!(stage, VerifyStage::Postcondition);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn corrupt_whole_file_delta_is_codec_error() {
    let old = periodic(2000);
    let mut new = old.clone();
    new[500..520].fill(0);
    let fx = Fixture::new(&[("f.bin", &old)], &[("f.bin", &new)]);
    let codec = ChunkDeltaCodec::with_window(16);
    let manifest = fx.diff(&codec, 4096).unwrap();
    assert_eq!(manifest.operations["f.bin"], Operation::Patch);

    fs::write(fx.dirs.patch.join("f.bin.bsdiff"), b"not a delta").unwrap();
    assert!(matches!(fx.apply(&codec), Err(PatchError::Codec { .. })));
}

#[test]
fn corrupt_block_delta_is_codec_error() {
    let old = periodic(2000);
    let mut new = old.clone();
    new[600..620].fill(0);
    let fx = Fixture::new(&[("f.bin", &old)], &[("f.bin", &new)]);
    let codec = ChunkDeltaCodec::with_window(16);
    let manifest = fx.diff(&codec, 500).unwrap();
    assert_eq!(
        manifest.operations["f.bin"],
        Operation::Parts(vec![
            BlockOp::CopyOld,
            BlockOp::Delta,
            BlockOp::CopyOld,
            BlockOp::CopyOld,
        ])
    );

    // A well-formed delta for some other block.
    let foreign = chunkpatch::DeltaCodec::compute_delta(&codec, b"other block", b"other").unwrap();
    fs::write(fx.dirs.patch.join("f.bin.part.2.bsdiff"), foreign).unwrap();
    assert!(matches!(fx.apply(&codec), Err(PatchError::Codec { .. })));
}

#[test]
fn stale_output_file_is_truncated() {
    let fx = Fixture::new(&[("f.txt", b"one")], &[("f.txt", b"two")]);
    let codec = ChunkDeltaCodec::default();
    fx.diff(&codec, 100).unwrap();

    write_tree(&fx.target, &[("f.txt", b"left over from an earlier, longer run")]);
    fx.apply(&codec).unwrap();
    assert_eq!(fs::read(fx.target.join("f.txt")).unwrap(), b"two");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn replay_rebuilds_new_exactly(
        old in proptest::collection::vec(0u8..4, 0..600),
        new in proptest::collection::vec(0u8..4, 0..600),
        block_size in 1u64..200,
    ) {
        let fx = Fixture::new(&[("f.bin", &old)], &[("f.bin", &new)]);
        let codec = ChunkDeltaCodec::with_window(4);
        fx.diff(&codec, block_size).unwrap();
        fx.apply(&codec).unwrap();
        prop_assert_eq!(fs::read(fx.target.join("f.bin")).unwrap(), new);
    }

    #[test]
    fn identical_input_only_copies(
        data in proptest::collection::vec(any::<u8>(), 0..400),
        block_size in 1u64..64,
    ) {
        let fx = Fixture::new(&[("f.bin", &data)], &[("f.bin", &data)]);
        let manifest = fx.diff(&ChunkDeltaCodec::default(), block_size).unwrap();
        prop_assert_eq!(&manifest.operations["f.bin"], &Operation::Copy);
        prop_assert_eq!(fs::read_dir(&fx.dirs.patch).unwrap().count(), 1);
    }
}
