use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::batch::Batch;
use crate::staging::StagedFile;

/// A staged photo paired with the name it gets inside the archive.
#[derive(Debug)]
pub struct NamedEntry {
    pub source: StagedFile,
    pub name: String,
}

/// `.ext` of the original upload, case preserved; empty when there is none.
fn extension_of(original_name: &str) -> String {
    original_name
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_default()
}

/// `YYYY.MM.DD LOCATION NNN.ext`
pub fn entry_name(captured_at: NaiveDateTime, location: &str, number: u32, ext: &str) -> String {
    format!(
        "{} {} {:03}{}",
        captured_at.format("%Y.%m.%d"),
        location,
        number,
        ext
    )
}

/// Order the whole batch chronologically and assign final names.
///
/// The sort is global across locations and stable, so equal timestamps keep
/// submission order. Each location numbers its photos from 1 in that order;
/// an explicit sequence number is used verbatim and does not advance the
/// location's counter. Colliding names are kept.
pub fn order(batch: Batch) -> Vec<NamedEntry> {
    let mut records = batch.records;
    records.sort_by_key(|r| r.captured_at);

    let mut counters: HashMap<String, u32> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let number = match record.explicit_sequence {
            Some(n) => n,
            None => {
                let next = counters.entry(record.location.clone()).or_insert(1);
                let n = *next;
                *next += 1;
                n
            }
        };
        let name = entry_name(
            record.captured_at,
            &record.location,
            number,
            &extension_of(&record.original_name),
        );
        if !seen.insert(name.clone()) {
            tracing::warn!(entry = %name, "duplicate archive entry name");
        }
        out.push(NamedEntry {
            source: record.source,
            name,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PhotoRecord;
    use std::path::Path;

    fn day(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{s} 12:00:00"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn record(dir: &Path, name: &str, at: NaiveDateTime, location: &str, seq: Option<u32>) -> PhotoRecord {
        PhotoRecord {
            source: StagedFile::from_bytes(dir, name, name.as_bytes()).unwrap(),
            captured_at: at,
            original_name: name.to_string(),
            location: location.to_string(),
            explicit_sequence: seq,
        }
    }

    fn names(entries: &[NamedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn batch(records: Vec<PhotoRecord>) -> Batch {
        Batch {
            total_bytes: records.iter().map(|r| r.source.size()).sum(),
            records,
        }
    }

    #[test]
    fn single_location_is_sorted_then_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let entries = order(batch(vec![
            record(dir.path(), "b.jpg", day("2024-01-02"), "Paris", None),
            record(dir.path(), "a.jpg", day("2024-01-01"), "Paris", None),
        ]));
        assert_eq!(
            names(&entries),
            vec!["2024.01.01 Paris 001.jpg", "2024.01.02 Paris 002.jpg"]
        );
        assert_eq!(entries[0].source.original_name(), "a.jpg");
    }

    #[test]
    fn sort_is_global_across_locations() {
        let dir = tempfile::tempdir().unwrap();
        let entries = order(batch(vec![
            record(dir.path(), "r.jpg", day("2024-03-01"), "Rome", None),
            record(dir.path(), "p.jpg", day("2024-02-01"), "Paris", None),
        ]));
        assert_eq!(
            names(&entries),
            vec!["2024.02.01 Paris 001.jpg", "2024.03.01 Rome 001.jpg"]
        );
    }

    #[test]
    fn counters_are_per_location_and_dense() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = Vec::new();
        for i in 0..5 {
            let loc = if i % 2 == 0 { "A" } else { "B" };
            records.push(record(
                dir.path(),
                &format!("{i}.png"),
                day(&format!("2024-01-0{}", 5 - i)),
                loc,
                None,
            ));
        }
        let entries = order(batch(records));
        let mut a: Vec<u32> = Vec::new();
        for e in &entries {
            if e.name.contains(" A ") {
                a.push(e.name[13..16].parse().unwrap());
            }
        }
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(entries.len(), 5);
        let dates: Vec<&str> = entries.iter().map(|e| &e.name[..10]).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn explicit_sequence_does_not_consume_counter() {
        let dir = tempfile::tempdir().unwrap();
        let entries = order(batch(vec![
            record(dir.path(), "x.jpg", day("2024-01-01"), "Oslo", Some(42)),
            record(dir.path(), "y.jpg", day("2024-01-02"), "Oslo", None),
            record(dir.path(), "z.jpg", day("2024-01-03"), "Oslo", Some(7)),
            record(dir.path(), "w.jpg", day("2024-01-04"), "Oslo", None),
        ]));
        assert_eq!(
            names(&entries),
            vec![
                "2024.01.01 Oslo 042.jpg",
                "2024.01.02 Oslo 001.jpg",
                "2024.01.03 Oslo 007.jpg",
                "2024.01.04 Oslo 002.jpg",
            ]
        );
    }

    #[test]
    fn ties_keep_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let same = day("2024-06-06");
        let entries = order(batch(vec![
            record(dir.path(), "first.jpg", same, "Bern", None),
            record(dir.path(), "second.jpg", same, "Bern", None),
        ]));
        assert_eq!(entries[0].source.original_name(), "first.jpg");
        assert_eq!(entries[1].source.original_name(), "second.jpg");
    }

    #[test]
    fn extension_case_is_preserved_and_duplicates_kept() {
        let dir = tempfile::tempdir().unwrap();
        let entries = order(batch(vec![
            record(dir.path(), "IMG.JPEG", day("2024-01-01"), "Nice", Some(1)),
            record(dir.path(), "IMG2.JPEG", day("2024-01-01"), "Nice", Some(1)),
        ]));
        assert_eq!(
            names(&entries),
            vec!["2024.01.01 Nice 001.JPEG", "2024.01.01 Nice 001.JPEG"]
        );
    }

    #[test]
    fn wide_numbers_are_not_truncated() {
        assert_eq!(
            entry_name(day("2024-12-31"), "Big", 1234, ".png"),
            "2024.12.31 Big 1234.png"
        );
        assert_eq!(extension_of("noext"), "");
    }
}
