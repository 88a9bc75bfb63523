//! Zip output: packing renamed photos and merging existing archives.

use std::io::{Cursor, Read, Write};

use zip::CompressionMethod;
use zip::result::ZipError;
use zip::write::{FileOptions, ZipWriter};

use crate::error::PipelineError;
use crate::naming::NamedEntry;

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Write every entry under its final name, in the order given.
///
/// Each staged upload is dropped (and its temp file deleted) as soon as it has
/// been copied. On failure the partial archive and the remaining uploads are
/// dropped with it.
pub fn emit(
    entries: Vec<NamedEntry>,
    mut on_entry: impl FnMut(usize, usize, &str),
) -> Result<Vec<u8>, PipelineError> {
    let total = entries.len();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (idx, entry) in entries.into_iter().enumerate() {
        on_entry(idx + 1, total, &entry.name);
        let data = entry.source.read_bytes()?;
        zip.start_file(entry.name.as_str(), entry_options())
            .map_err(PipelineError::ArchiveWrite)?;
        zip.write_all(&data)
            .map_err(|e| PipelineError::ArchiveWrite(ZipError::Io(e)))?;
    }
    let cursor = zip.finish().map_err(PipelineError::ArchiveWrite)?;
    Ok(cursor.into_inner())
}

/// An uploaded archive: client-side filename plus raw bytes.
#[derive(Debug, Clone)]
pub struct ArchiveInput {
    pub name: String,
    pub data: Vec<u8>,
}

/// Copy every non-directory entry of every input into one archive.
///
/// Inputs are visited in order, entries in archive order. Names are kept
/// as-is, so entries with the same name in different inputs all appear.
pub fn merge_archives(inputs: &[ArchiveInput]) -> Result<Vec<u8>, PipelineError> {
    if inputs.is_empty() {
        return Err(PipelineError::NoArchives);
    }
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut copied = 0usize;
    for input in inputs {
        let parse_err = |source| PipelineError::ArchiveParse {
            name: input.name.clone(),
            source,
        };
        let mut source = zip::ZipArchive::new(Cursor::new(input.data.as_slice())).map_err(parse_err)?;
        for i in 0..source.len() {
            let mut file = source.by_index(i).map_err(parse_err)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| parse_err(ZipError::Io(e)))?;
            zip.start_file(name.as_str(), entry_options())
                .map_err(PipelineError::ArchiveWrite)?;
            zip.write_all(&data)
                .map_err(|e| PipelineError::ArchiveWrite(ZipError::Io(e)))?;
            copied += 1;
        }
        tracing::debug!(archive = %input.name, entries = source.len(), "archive merged");
    }
    if copied == 0 {
        return Err(PipelineError::EmptyMerge);
    }
    let cursor = zip.finish().map_err(PipelineError::ArchiveWrite)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::staging::StagedFile;

    fn input(name: &str, entries: &[(&str, &[u8])]) -> ArchiveInput {
        ArchiveInput {
            name: name.to_string(),
            data: fixtures::zip_of(entries),
        }
    }

    #[test]
    fn emit_preserves_order_and_releases_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagedFile::from_bytes(dir.path(), "a.jpg", b"AAA").unwrap();
        let b = StagedFile::from_bytes(dir.path(), "b.jpg", b"BBBB").unwrap();
        let paths = [a.path().to_path_buf(), b.path().to_path_buf()];
        let entries = vec![
            NamedEntry {
                source: a,
                name: "2024.01.01 Paris 001.jpg".into(),
            },
            NamedEntry {
                source: b,
                name: "2024.01.02 Paris 002.jpg".into(),
            },
        ];
        let mut seen = Vec::new();
        let bytes = emit(entries, |cur, total, _| seen.push((cur, total))).unwrap();
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
        let out = fixtures::unzip(&bytes);
        assert_eq!(
            out,
            vec![
                ("2024.01.01 Paris 001.jpg".to_string(), b"AAA".to_vec()),
                ("2024.01.02 Paris 002.jpg".to_string(), b"BBBB".to_vec()),
            ]
        );
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn emit_keeps_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let entries = ["x", "y"]
            .iter()
            .map(|s| NamedEntry {
                source: StagedFile::from_bytes(dir.path(), "p.jpg", s.as_bytes()).unwrap(),
                name: "2024.01.01 Nice 001.jpg".into(),
            })
            .collect();
        let out = fixtures::unzip(&emit(entries, |_, _, _| {}).unwrap());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, out[1].0);
    }

    #[test]
    fn merge_keeps_duplicates_and_skips_directories() {
        let first = input("one.zip", &[("a.jpg", b"1"), ("dir/", b""), ("dir/b.jpg", b"2")]);
        let second = input("two.zip", &[("a.jpg", b"3")]);
        let out = fixtures::unzip(&merge_archives(&[first, second]).unwrap());
        let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "dir/b.jpg", "a.jpg"]);
        assert_eq!(out[2].1, b"3");
    }

    #[test]
    fn merge_rejects_garbage_input() {
        let good = input("ok.zip", &[("a.jpg", b"1")]);
        let bad = ArchiveInput {
            name: "bad.zip".into(),
            data: b"definitely not a zip".to_vec(),
        };
        let err = merge_archives(&[good, bad]).unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveParse { ref name, .. } if name == "bad.zip"));
    }

    #[test]
    fn merge_of_nothing_fails() {
        assert!(matches!(
            merge_archives(&[]).unwrap_err(),
            PipelineError::NoArchives
        ));
        let only_dirs = input("dirs.zip", &[("empty/", b"")]);
        assert!(matches!(
            merge_archives(&[only_dirs]).unwrap_err(),
            PipelineError::EmptyMerge
        ));
    }
}
