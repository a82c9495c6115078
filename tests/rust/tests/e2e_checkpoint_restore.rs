//! End-to-end checkpoint and restore scenarios
//!
//! Simulates the training-harness flow: iterate a shuffled source, save
//! per-process iterator state through the checkpoint handler, bring up a
//! fresh iterator in a "restarted" process, restore it, and verify the
//! record stream continues exactly where it left off.

use anyhow::Result;
use granary::{
    shard_filename, CheckpointHandler, IteratorOptions, ProcessCheckpointHandler, ProcessInfo,
    RecordDataSource, RecordIterator,
};
use granary_core::Error;
use std::path::Path;
use std::sync::Arc;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn write_shards(dir: &Path, prefix: &str, shards: u64, per_shard: u64) -> Result<String> {
    for shard in 0..shards {
        let path = dir.join(shard_filename(prefix, shard, shards));
        let mut writer = granary::RecordFileWriter::create(&path)?;
        for i in 0..per_shard {
            writer.write_record(format!("{}-{}-{}", prefix, shard, i).as_bytes())?;
        }
        writer.finish()?;
    }
    Ok(format!("{}@{}", dir.join(prefix).display(), shards))
}

fn open_iterator(spec: &str) -> Result<RecordIterator<RecordDataSource>> {
    let source = RecordDataSource::open(spec)?;
    let options = IteratorOptions {
        shuffle_seed: Some(42),
        num_epochs: Some(2),
    };
    Ok(RecordIterator::new(Arc::new(source), options))
}

fn drain(iterator: &mut RecordIterator<RecordDataSource>, n: usize) -> Result<Vec<String>> {
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        let record = iterator.next().expect("iterator ended early")?;
        values.push(String::from_utf8(record.to_vec())?);
    }
    Ok(values)
}

#[tokio::test]
async fn interrupted_training_resumes_exactly() -> Result<()> {
    init_logging();
    let data_dir = tempfile::tempdir()?;
    let ckpt_dir = tempfile::tempdir()?;
    let spec = write_shards(data_dir.path(), "train", 2, 6)?;

    // Uninterrupted run: 12 records x 2 epochs.
    let mut reference = open_iterator(&spec)?;
    let expected = drain(&mut reference, 24)?;
    assert!(reference.next().is_none());

    // Interrupted run: consume 9, checkpoint, "crash".
    let handler = ProcessCheckpointHandler::new(ProcessInfo::single());
    let mut first_life = open_iterator(&spec)?;
    let mut seen = drain(&mut first_life, 9)?;
    handler.save(ckpt_dir.path(), &first_life).await?;
    drop(first_life);

    // Restarted process: fresh iterator, restore, continue.
    let mut second_life = open_iterator(&spec)?;
    handler
        .restore(ckpt_dir.path(), Some(&mut second_life))
        .await?;
    seen.extend(drain(&mut second_life, 15)?);
    assert!(second_life.next().is_none());

    assert_eq!(seen, expected);
    Ok(())
}

#[tokio::test]
async fn each_process_owns_one_state_file() -> Result<()> {
    init_logging();
    let data_dir = tempfile::tempdir()?;
    let ckpt_dir = tempfile::tempdir()?;
    let spec = write_shards(data_dir.path(), "train", 1, 4)?;

    for index in 0..3 {
        let handler = ProcessCheckpointHandler::new(ProcessInfo::new(index, 3)?);
        let mut iterator = open_iterator(&spec)?;
        drain(&mut iterator, index as usize + 1)?;
        handler.save(ckpt_dir.path(), &iterator).await?;
    }

    for index in 0..3 {
        let name = format!("process_{}-of-3.json", index);
        assert!(ckpt_dir.path().join(&name).exists(), "missing {}", name);
    }

    // Each process restores its own position independently.
    for index in 0..3 {
        let handler = ProcessCheckpointHandler::new(ProcessInfo::new(index, 3)?);
        let mut iterator = open_iterator(&spec)?;
        handler
            .restore(ckpt_dir.path(), Some(&mut iterator))
            .await?;
        assert_eq!(iterator.next_index(), index as u64 + 1);
    }
    Ok(())
}

#[tokio::test]
async fn restore_contract_failures() -> Result<()> {
    init_logging();
    let data_dir = tempfile::tempdir()?;
    let ckpt_dir = tempfile::tempdir()?;
    let spec = write_shards(data_dir.path(), "train", 1, 4)?;

    let handler = ProcessCheckpointHandler::<RecordIterator<RecordDataSource>>::new(
        ProcessInfo::single(),
    );

    // No item to restore into.
    let err = handler.restore(ckpt_dir.path(), None).await.unwrap_err();
    assert!(matches!(err, Error::MissingRestoreTarget));

    // No checkpoint file on disk; the error names the expected path.
    let mut iterator = open_iterator(&spec)?;
    let err = handler
        .restore(ckpt_dir.path(), Some(&mut iterator))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CheckpointFileMissing { .. }));
    assert!(err.to_string().contains("process_0-of-1.json"));
    Ok(())
}

#[tokio::test]
async fn structure_is_unsupported() -> Result<()> {
    init_logging();
    let data_dir = tempfile::tempdir()?;
    let ckpt_dir = tempfile::tempdir()?;
    let spec = write_shards(data_dir.path(), "train", 1, 4)?;

    let handler = ProcessCheckpointHandler::new(ProcessInfo::single());

    // Empty directory.
    assert!(handler.structure(ckpt_dir.path()).await?.is_none());

    // Populated directory.
    let iterator = open_iterator(&spec)?;
    handler.save(ckpt_dir.path(), &iterator).await?;
    assert!(handler.structure(ckpt_dir.path()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn restore_rejects_a_different_dataset() -> Result<()> {
    init_logging();
    let data_dir = tempfile::tempdir()?;
    let ckpt_dir = tempfile::tempdir()?;
    let train = write_shards(data_dir.path(), "train", 1, 4)?;
    let eval = write_shards(data_dir.path(), "eval", 1, 4)?;

    let handler = ProcessCheckpointHandler::new(ProcessInfo::single());
    let iterator = open_iterator(&train)?;
    handler.save(ckpt_dir.path(), &iterator).await?;

    let mut wrong = open_iterator(&eval)?;
    let err = handler
        .restore(ckpt_dir.path(), Some(&mut wrong))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StateMismatch { .. }));
    Ok(())
}
