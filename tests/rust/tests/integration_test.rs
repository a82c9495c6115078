//! Integration tests for record data sources
//!
//! Covers the file-backed path end to end: writing sharded record files,
//! opening them through shard specs and range instructions, batch lookup
//! across shard boundaries, and shared-resource deduplication.

use anyhow::Result;
use granary::{shard_filename, RandomAccess, RecordDataSource, RecordFileWriter};
use std::path::Path;

/// Write `shards` record files under `prefix`, with `per_shard` records each
fn write_shards(dir: &Path, prefix: &str, shards: u64, per_shard: u64) -> Result<String> {
    for shard in 0..shards {
        let path = dir.join(shard_filename(prefix, shard, shards));
        let mut writer = RecordFileWriter::create(&path)?;
        for i in 0..per_shard {
            writer.write_record(format!("shard{}-rec{}", shard, i).as_bytes())?;
        }
        writer.finish()?;
    }
    Ok(dir.join(prefix).display().to_string())
}

#[test]
fn shard_spec_exposes_one_key_space() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 3, 10)?;

    let source = RecordDataSource::open(format!("{}@3", prefix))?;
    assert_eq!(source.len(), 30);

    // Keys map across shard boundaries in file order.
    assert_eq!(source.get(0)?.as_ref(), b"shard0-rec0");
    assert_eq!(source.get(9)?.as_ref(), b"shard0-rec9");
    assert_eq!(source.get(10)?.as_ref(), b"shard1-rec0");
    assert_eq!(source.get(29)?.as_ref(), b"shard2-rec9");
    Ok(())
}

#[test]
fn batch_lookup_spans_shards() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 2, 5)?;

    let source = RecordDataSource::open(format!("{}@2", prefix))?;
    let records = source.get_batch(&[9, 0, 5, 4])?;

    assert_eq!(records[0].as_ref(), b"shard1-rec4");
    assert_eq!(records[1].as_ref(), b"shard0-rec0");
    assert_eq!(records[2].as_ref(), b"shard1-rec0");
    assert_eq!(records[3].as_ref(), b"shard0-rec4");
    Ok(())
}

#[test]
fn range_instructions_subset_a_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 1, 20)?;
    let shard = format!("{}-00000-of-00001", prefix);

    let source = RecordDataSource::builder()
        .path(format!("{}[5:8]", shard))
        .build()?;

    assert_eq!(source.len(), 3);
    assert_eq!(source.get(0)?.as_ref(), b"shard0-rec5");
    assert_eq!(source.get(2)?.as_ref(), b"shard0-rec7");
    Ok(())
}

#[test]
fn identical_path_lists_share_a_name_and_resource() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 2, 3)?;
    let spec = format!("{}@2", prefix);

    let first = RecordDataSource::open(&spec)?;
    let second = RecordDataSource::open(&spec)?;
    assert_eq!(first.shared_name(), second.shared_name());

    let other_prefix = write_shards(dir.path(), "eval", 2, 3)?;
    let third = RecordDataSource::open(format!("{}@2", other_prefix))?;
    assert_ne!(first.shared_name(), third.shared_name());
    Ok(())
}

#[test]
fn cached_source_returns_identical_records() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 1, 8)?;

    let source = RecordDataSource::builder()
        .path(format!("{}-00000-of-00001", prefix))
        .cache(true)
        .build()?;

    let cold: Vec<_> = (0..8).map(|k| source.get(k).unwrap()).collect();
    let warm: Vec<_> = (0..8).map(|k| source.get(k).unwrap()).collect();
    assert_eq!(cold, warm);
    Ok(())
}

#[test]
fn parse_fn_travels_with_the_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 1, 2)?;

    let source = RecordDataSource::builder()
        .path(format!("{}-00000-of-00001", prefix))
        .parse_fn(|record| Ok(bytes::Bytes::from(record.to_ascii_uppercase())))
        .build()?;

    let parse = source.parse_fn().expect("parse fn should be set");
    let parsed = parse(source.get(0)?)?;
    assert_eq!(parsed.as_ref(), b"SHARD0-REC0");
    Ok(())
}

#[tokio::test]
async fn async_batch_lookup_matches_sync() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let prefix = write_shards(dir.path(), "train", 2, 4)?;

    let source = RecordDataSource::open(format!("{}@2", prefix))?;
    let keys = vec![7, 1, 4, 0];

    let sync = source.get_batch(&keys)?;
    let via_pool = source.get_batch_async(keys).await?;
    assert_eq!(sync, via_pool);
    Ok(())
}
