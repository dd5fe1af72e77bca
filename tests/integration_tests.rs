//! Integration tests for docdelta.

use docdelta::{
    build_checksums, build_patch, reconstruct, ChecksumService, DeltaEngine, DeltaSync,
    DirContentSource, DocDeltaError, EngineBuilder, FileChecksumStore, MemoryNotifier, Patch,
    PatchBuilder, PatchStats, ServiceConfig, StrongHashAlgorithm, WeakChecksum,
};

/// Deterministic non-periodic bytes.
fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..=255u8).cycle().take(len).collect()
}

// =============================================================================
// END-TO-END ROUND TRIPS
// =============================================================================

#[test]
fn identical_documents() {
    let data = noise(8192, 1);
    let checksums = build_checksums(&data, 512).unwrap();
    let patch = build_patch(&data, &checksums);

    assert_eq!(patch.matched_block_count, 16);
    assert!(patch.is_all_matched());
    assert_eq!(reconstruct(&data, &checksums, &patch).unwrap(), data);
}

#[test]
fn modified_document() {
    let reference = b"Hello, World! This is a test document with some content.";
    let candidate = b"Hello, Universe! This is a test document with some content.";

    let checksums = build_checksums(reference, 8).unwrap();
    let patch = build_patch(candidate, &checksums);

    assert!(patch.matched_block_count > 0);
    assert_eq!(reconstruct(reference, &checksums, &patch).unwrap(), candidate);
}

#[test]
fn appended_content() {
    let reference = noise(4096, 2);
    let mut candidate = reference.clone();
    candidate.extend_from_slice(b"with appended data at the end");

    let checksums = build_checksums(&reference, 1024).unwrap();
    let patch = build_patch(&candidate, &checksums);

    assert_eq!(patch.matched_block_indices, vec![0, 1, 2, 3]);
    assert_eq!(
        patch.patches,
        vec![Patch::new(Some(3), 4, b"with appended data at the end".to_vec())]
    );
    assert_eq!(reconstruct(&reference, &checksums, &patch).unwrap(), candidate);
}

#[test]
fn empty_to_content() {
    let checksums = build_checksums(b"", 512).unwrap();
    let patch = build_patch(b"brand new", &checksums);

    assert_eq!(patch.matched_block_count, 0);
    assert_eq!(patch.literal_len(), 9);
    assert_eq!(reconstruct(b"", &checksums, &patch).unwrap(), b"brand new");
}

#[test]
fn content_to_empty() {
    let reference = noise(2048, 3);
    let checksums = build_checksums(&reference, 512).unwrap();
    let patch = build_patch(b"", &checksums);

    assert!(patch.is_empty());
    assert!(reconstruct(&reference, &checksums, &patch).unwrap().is_empty());
}

#[test]
fn various_block_sizes() {
    let reference = noise(5000, 4);
    let mut candidate = reference.clone();
    candidate[2500] ^= 0xFF;
    candidate.splice(100..100, noise(37, 5));

    for block_size in [1, 3, 7, 64, 100, 1000, 4999, 5000, 8192] {
        let checksums = build_checksums(&reference, block_size).unwrap();
        let patch = build_patch(&candidate, &checksums);
        let rebuilt = reconstruct(&reference, &checksums, &patch).unwrap();
        assert_eq!(rebuilt, candidate, "block size {block_size}");
    }
}

// =============================================================================
// SHIFT AND COLLISION BEHAVIOUR
// =============================================================================

#[test]
fn shifted_content_detected() {
    let reference = noise(4096, 6);
    let prefix = noise(77, 7);
    let mut candidate = prefix.clone();
    candidate.extend_from_slice(&reference);

    let checksums = build_checksums(&reference, 256).unwrap();
    let patch = build_patch(&candidate, &checksums);

    assert_eq!(patch.patches, vec![Patch::new(None, 0, prefix)]);
    assert_eq!(patch.matched_block_indices, (0..16).collect::<Vec<u32>>());
}

#[test]
fn weak_collision_is_not_a_match() {
    let reference = [1u8, 0, 0, 1];
    let candidate = [0u8, 1, 1, 0];
    assert_eq!(
        WeakChecksum::compute(&reference).combined(),
        WeakChecksum::compute(&candidate).combined()
    );

    let checksums = build_checksums(&reference, 4).unwrap();
    let patch = build_patch(&candidate, &checksums);

    assert_eq!(patch.matched_block_count, 0);
    assert_eq!(patch.literal_len(), 4);
}

#[test]
fn candidate_shorter_than_block() {
    let checksums = build_checksums(b"short", 64).unwrap();

    assert_eq!(build_patch(b"short", &checksums).matched_block_count, 1);
    assert_eq!(build_patch(b"shirt", &checksums).matched_block_count, 0);
}

// =============================================================================
// REFERENCE DOCUMENT OF TWO 10 KiB BLOCKS
// =============================================================================

#[test]
fn periodic_reference_with_altered_range() {
    let reference = pattern(20480);
    let checksums = build_checksums(&reference, 10240).unwrap();
    assert_eq!(checksums.block_count(), 2);

    let mut candidate = reference.clone();
    for byte in &mut candidate[100..=150] {
        *byte = 0xEE;
    }

    let patch = build_patch(&candidate, &checksums);

    // Both blocks hold identical bytes, so the scan resynchronises one period
    // past the edit and reports the lowest matching index.
    assert_eq!(patch.matched_block_indices, vec![0]);
    assert_eq!(patch.patches[0].anchor_block_index, None);
    assert_eq!(patch.patches[0].literal_bytes, candidate[..256]);
    assert_eq!(patch.patches[1], Patch::new(Some(0), 1, candidate[10496..].to_vec()));
    assert_eq!(reconstruct(&reference, &checksums, &patch).unwrap(), candidate);
}

#[test]
fn distinct_blocks_with_altered_range() {
    let reference = noise(20480, 8);
    let checksums = build_checksums(&reference, 10240).unwrap();
    assert_eq!(checksums.block_count(), 2);

    let mut candidate = reference.clone();
    for byte in &mut candidate[100..=150] {
        *byte = !*byte;
    }

    let patch = build_patch(&candidate, &checksums);

    assert_eq!(patch.matched_block_indices, vec![1]);
    assert_eq!(patch.patches, vec![Patch::new(None, 0, candidate[..10240].to_vec())]);
    assert_eq!(reconstruct(&reference, &checksums, &patch).unwrap(), candidate);
}

// =============================================================================
// ENGINE CONFIGURATION
// =============================================================================

#[test]
fn blake3_engine_roundtrip() {
    let engine = EngineBuilder::new()
        .block_size(700)
        .algorithm(StrongHashAlgorithm::Blake3)
        .build()
        .unwrap();

    let reference = noise(10_000, 9);
    let mut candidate = reference.clone();
    candidate.drain(3000..3100);

    let checksums = engine.checksums("doc", &reference).unwrap();
    assert_eq!(checksums.algorithm(), StrongHashAlgorithm::Blake3);

    let patch = engine.patch(&candidate, &checksums).unwrap();
    assert_eq!(engine.reconstruct(&reference, &checksums, &patch).unwrap(), candidate);
}

#[test]
fn engine_rejects_foreign_block_size() {
    let checksums = build_checksums(b"reference", 4).unwrap();
    let engine = DeltaEngine::with_block_size(8).unwrap();
    assert!(matches!(
        engine.patch(b"candidate", &checksums),
        Err(DocDeltaError::InvalidConfiguration(_))
    ));
}

#[test]
fn corrupted_reference_detected() {
    let reference = noise(4096, 10);
    let checksums = build_checksums(&reference, 512).unwrap();
    let patch = build_patch(&reference, &checksums);

    let mut damaged = reference.clone();
    damaged[1000] ^= 1;

    assert!(matches!(
        reconstruct(&damaged, &checksums, &patch),
        Err(DocDeltaError::BlockMismatch { index: 1 })
    ));
}

#[test]
fn verification_can_be_disabled() {
    let reference = noise(4096, 11);
    let engine = EngineBuilder::new()
        .block_size(512)
        .verify_blocks(false)
        .build()
        .unwrap();
    let checksums = engine.checksums("doc", &reference).unwrap();
    let patch = engine.patch(&reference, &checksums).unwrap();

    let mut damaged = reference.clone();
    damaged[1000] ^= 1;

    assert_eq!(engine.reconstruct(&damaged, &checksums, &patch).unwrap(), damaged);
}

#[test]
fn truncated_reference_rejected() {
    let reference = noise(4096, 12);
    let checksums = build_checksums(&reference, 512).unwrap();
    let patch = build_patch(&reference, &checksums);

    assert!(matches!(
        reconstruct(&reference[..48], &checksums, &patch),
        Err(DocDeltaError::TruncatedInput {
            expected: 4096,
            actual: 48
        })
    ));
}

#[test]
fn parallel_checksums_match_sequential() {
    let engine = DeltaEngine::with_block_size(1024).unwrap();
    let docs: Vec<(String, Vec<u8>)> = (0..4)
        .map(|i| (format!("doc-{i}"), noise(100_000 + i * 1000, i as u32)))
        .collect();

    let many = engine.checksums_many(docs.as_slice());
    for ((id, data), checksums) in docs.iter().zip(&many) {
        assert_eq!(checksums.document_id(), id);
        assert_eq!(*checksums, engine.checksums(id, data).unwrap());
    }
}

// =============================================================================
// SERVICE WITH FILE-BACKED COLLABORATORS
// =============================================================================

#[test]
fn service_over_directory_and_file_store() {
    let content_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();

    let reference = noise(30_000, 13);
    std::fs::write(content_dir.path().join("report.txt"), &reference).unwrap();

    let config = ServiceConfig {
        server_id: "edge-7".to_string(),
        block_size: 4096,
        ..ServiceConfig::default()
    };
    let service = ChecksumService::new(
        config,
        DirContentSource::new(content_dir.path()),
        FileChecksumStore::open(store_dir.path()).unwrap(),
    )
    .unwrap()
    .with_notifier(MemoryNotifier::new());

    let checksums = service.extract_checksums("report.txt").unwrap();
    assert_eq!(checksums.block_count(), 8);
    assert_eq!(checksums.original_length(), 30_000);

    // A fresh store over the same directory sees the persisted checksums.
    let reopened = FileChecksumStore::open(store_dir.path()).unwrap();
    assert_eq!(
        docdelta::ChecksumStore::get(&reopened, "report.txt").unwrap(),
        Some(checksums)
    );

    let mut candidate = reference.clone();
    candidate.splice(12_345..12_345, b"an inserted sentence. ".iter().copied());
    let patch = service.create_patch("report.txt", &candidate).unwrap();

    let stats = PatchStats::from_patch(&patch);
    assert!(stats.matched_blocks >= 6);
    assert!(stats.match_ratio > 0.7);
    assert_eq!(service.apply_patch("report.txt", &patch).unwrap(), candidate);
}

#[test]
fn service_rejects_escaping_ids() {
    let content_dir = tempfile::tempdir().unwrap();
    let service = ChecksumService::new(
        ServiceConfig::default(),
        DirContentSource::new(content_dir.path()),
        docdelta::MemoryChecksumStore::new(),
    )
    .unwrap();

    assert!(service.extract_checksums("../outside").is_err());
    assert!(service.extract_checksums("/etc/passwd").is_err());
}

// =============================================================================
// STEPWISE BUILDER
// =============================================================================

#[test]
fn stepwise_builder_matches_batch() {
    let reference = noise(3000, 14);
    let mut candidate = reference.clone();
    candidate.splice(1500..1500, noise(10, 15));

    let checksums = build_checksums(&reference, 128).unwrap();
    let batch = build_patch(&candidate, &checksums);

    let mut builder = PatchBuilder::new(&checksums, &candidate);
    let mut steps = 0;
    while builder.step() != docdelta::ScanState::Done {
        steps += 1;
        assert!(steps < 100_000);
    }

    assert_eq!(builder.build(), batch);
}
