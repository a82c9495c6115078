//! Path specs and read instructions
//!
//! A data source is constructed from path specs. Each spec is one of:
//!
//! - a plain filename, exposing every record in the file;
//! - a range instruction `filename[start:end]`, exposing records in
//!   `[start, end)` without opening the file during initialization;
//! - a shard spec `prefix@N`, expanding to `prefix-00000-of-0000N` through
//!   `prefix-<N-1>-of-<N>` with five-digit shard numbers.

use granary_core::{Error, Result};
use std::path::PathBuf;

/// One contiguous range of records in one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadInstruction {
    /// File holding the records
    pub filename: PathBuf,

    /// First record position exposed (inclusive)
    pub start: u64,

    /// Last record position exposed (exclusive)
    pub end: u64,
}

impl ReadInstruction {
    /// Number of records this instruction exposes
    pub fn num_records(&self) -> u64 {
        self.end - self.start
    }
}

/// A parsed path spec, before record counts are known
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSpec {
    /// Whole file; count resolved by opening it
    Plain(PathBuf),

    /// Explicit record range; the file is not opened during resolution
    Range { filename: PathBuf, start: u64, end: u64 },

    /// `prefix@N` shard spec
    Sharded { prefix: String, shards: u64 },
}

fn invalid(spec: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPathSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_spec(spec: &str) -> Result<PathSpec> {
    if spec.is_empty() {
        return Err(invalid(spec, "empty path"));
    }

    if let Some(at) = spec.rfind('@') {
        let (prefix, shards) = (&spec[..at], &spec[at + 1..]);
        if prefix.is_empty() {
            return Err(invalid(spec, "empty prefix before '@'"));
        }
        let shards: u64 = shards
            .parse()
            .map_err(|_| invalid(spec, "shard count after '@' is not an unsigned integer"))?;
        if shards == 0 {
            return Err(invalid(spec, "shard count must be at least 1"));
        }
        return Ok(PathSpec::Sharded {
            prefix: prefix.to_string(),
            shards,
        });
    }

    if spec.ends_with(']') {
        let open = spec
            .rfind('[')
            .ok_or_else(|| invalid(spec, "closing ']' without '['"))?;
        let (filename, range) = (&spec[..open], &spec[open + 1..spec.len() - 1]);
        if filename.is_empty() {
            return Err(invalid(spec, "empty filename before range"));
        }
        let (start, end) = range
            .split_once(':')
            .ok_or_else(|| invalid(spec, "range must be of the form [start:end]"))?;
        let start: u64 = start
            .parse()
            .map_err(|_| invalid(spec, "range start is not an unsigned integer"))?;
        let end: u64 = end
            .parse()
            .map_err(|_| invalid(spec, "range end is not an unsigned integer"))?;
        if start > end {
            return Err(invalid(spec, "range start is past range end"));
        }
        return Ok(PathSpec::Range {
            filename: PathBuf::from(filename),
            start,
            end,
        });
    }

    Ok(PathSpec::Plain(PathBuf::from(spec)))
}

/// Expand shard specs and resolve record counts into read instructions
///
/// `count_records` is consulted only for specs without an explicit range;
/// range instructions keep initialization free of file I/O.
pub fn resolve_instructions<F>(specs: &[String], mut count_records: F) -> Result<Vec<ReadInstruction>>
where
    F: FnMut(&PathBuf) -> Result<u64>,
{
    let mut instructions = Vec::new();
    for spec in specs {
        match parse_spec(spec)? {
            PathSpec::Plain(filename) => {
                let count = count_records(&filename)?;
                instructions.push(ReadInstruction {
                    filename,
                    start: 0,
                    end: count,
                });
            }
            PathSpec::Range { filename, start, end } => {
                instructions.push(ReadInstruction { filename, start, end });
            }
            PathSpec::Sharded { prefix, shards } => {
                for shard in 0..shards {
                    let filename = PathBuf::from(shard_filename(&prefix, shard, shards));
                    let count = count_records(&filename)?;
                    instructions.push(ReadInstruction {
                        filename,
                        start: 0,
                        end: count,
                    });
                }
            }
        }
    }
    Ok(instructions)
}

/// Filename of shard `shard` out of `shards` for a given prefix
pub fn shard_filename(prefix: &str, shard: u64, shards: u64) -> String {
    format!("{}-{:05}-of-{:05}", prefix, shard, shards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_spec() {
        let spec = parse_spec("/data/train-00000-of-00002").unwrap();
        assert_eq!(
            spec,
            PathSpec::Plain(PathBuf::from("/data/train-00000-of-00002"))
        );
    }

    #[test]
    fn test_range_spec() {
        let spec = parse_spec("/data/train[10:250]").unwrap();
        assert_eq!(
            spec,
            PathSpec::Range {
                filename: PathBuf::from("/data/train"),
                start: 10,
                end: 250,
            }
        );
    }

    #[test]
    fn test_empty_range_is_legal() {
        let spec = parse_spec("/data/train[10:10]").unwrap();
        assert!(matches!(spec, PathSpec::Range { start: 10, end: 10, .. }));
    }

    #[test]
    fn test_sharded_spec() {
        let spec = parse_spec("/data/train@3").unwrap();
        assert_eq!(
            spec,
            PathSpec::Sharded {
                prefix: "/data/train".to_string(),
                shards: 3,
            }
        );
    }

    #[test]
    fn test_shard_filename_padding() {
        assert_eq!(shard_filename("train", 2, 128), "train-00002-of-00128");
    }

    #[test]
    fn test_malformed_specs() {
        for spec in [
            "",
            "/data/train@",
            "/data/train@zero",
            "/data/train@0",
            "/data/train[5]",
            "/data/train[a:b]",
            "/data/train[9:3]",
            "[0:5]",
        ] {
            let err = parse_spec(spec).unwrap_err();
            assert!(
                matches!(err, Error::InvalidPathSpec { .. }),
                "spec '{}' should be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_resolve_skips_io_for_ranges() {
        let specs = vec!["/data/train[0:100]".to_string()];
        let instructions = resolve_instructions(&specs, |_| {
            panic!("range instructions must not open files")
        })
        .unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].num_records(), 100);
    }

    #[test]
    fn test_resolve_expands_shards() {
        let specs = vec!["train@2".to_string()];
        let instructions = resolve_instructions(&specs, |path| {
            Ok(if path.to_string_lossy().contains("00000") {
                7
            } else {
                5
            })
        })
        .unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].filename, PathBuf::from("train-00000-of-00002"));
        assert_eq!(instructions[0].num_records(), 7);
        assert_eq!(instructions[1].filename, PathBuf::from("train-00001-of-00002"));
        assert_eq!(instructions[1].num_records(), 5);
    }

    #[test]
    fn test_resolve_propagates_count_errors() {
        let specs = vec!["missing-file".to_string()];
        let result = resolve_instructions(&specs, |path| {
            Err(Error::Storage {
                message: format!("failed to open record file {}", path.display()),
            })
        });
        assert!(result.is_err());
    }
}
