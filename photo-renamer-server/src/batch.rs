//! Batch assembly: validates every group and file of one submission and
//! produces the [`PhotoRecord`]s the naming stage orders.

use std::io::Cursor;

use chrono::NaiveDateTime;
use image::ImageReader;

use crate::capture_time::{self, CaptureTimeReader};
use crate::config::UploadLimits;
use crate::error::{FileRejection, PipelineError};
use crate::location;
use crate::staging::StagedFile;

/// One location label with its uploaded files, as submitted.
#[derive(Debug)]
pub struct UploadGroup {
    pub label: String,
    pub files: Vec<StagedFile>,
}

/// An accepted photo. Owns its staged upload until the archive consumes it.
#[derive(Debug)]
pub struct PhotoRecord {
    pub source: StagedFile,
    pub captured_at: NaiveDateTime,
    /// Upload name as submitted; only its extension reaches the output.
    pub original_name: String,
    pub location: String,
    pub explicit_sequence: Option<u32>,
}

#[derive(Debug)]
pub struct Batch {
    pub records: Vec<PhotoRecord>,
    pub total_bytes: u64,
}

/// Non-fatal problems collected while assembling.
#[derive(Debug, Default)]
pub struct AssemblyReport {
    pub skipped_files: usize,
    pub rejected_locations: Vec<String>,
}

impl AssemblyReport {
    pub fn warnings(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .rejected_locations
            .iter()
            .map(|l| format!("Location \"{l}\" contains invalid characters and was skipped."))
            .collect();
        if self.skipped_files > 0 {
            out.push(format!(
                "{} file(s) could not be processed due to errors.",
                self.skipped_files
            ));
        }
        out
    }
}

/// Reduce an upload filename to a safe base name made of `[A-Za-z0-9_.-]`.
///
/// Path components are dropped, whitespace runs become `_`, and leading or
/// trailing `.`/`_` are trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Per-file checks and timestamp extraction. Consumes the upload either way.
fn accept_file(
    file: StagedFile,
    limits: &UploadLimits,
    reader: &dyn CaptureTimeReader,
) -> Result<(StagedFile, String, NaiveDateTime), FileRejection> {
    let raw_name = file.original_name().to_string();
    if !limits.allows_extension(&raw_name) {
        return Err(FileRejection::Extension(raw_name));
    }
    let name = sanitize_file_name(&raw_name);
    if name.is_empty() {
        return Err(FileRejection::EmptyName(raw_name));
    }
    if file.size() > limits.max_file_bytes {
        return Err(FileRejection::TooLarge {
            name,
            size: file.size(),
            limit: limits.max_file_bytes,
        });
    }
    let bytes = file.read_bytes().map_err(|source| FileRejection::Staging {
        name: name.clone(),
        source,
    })?;
    validate_image(&bytes).map_err(|source| FileRejection::Undecodable {
        name: name.clone(),
        source,
    })?;
    let captured_at = capture_time::extract(reader, &bytes, file.modified());
    Ok((file, raw_name, captured_at))
}

fn validate_image(bytes: &[u8]) -> image::ImageResult<()> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.decode()?;
    Ok(())
}

/// Validate a submission and collect its accepted photos.
///
/// `sequence_numbers` is aligned with each group's submitted file order; a
/// slot that is missing or `null` leaves that file to the per-location
/// counter. The size cap is checked per group before any of its files are
/// processed, and exceeding it rejects the whole batch.
pub fn assemble(
    groups: Vec<UploadGroup>,
    sequence_numbers: Option<&[Option<u32>]>,
    limits: &UploadLimits,
    reader: &dyn CaptureTimeReader,
    mut on_file: impl FnMut(&str),
) -> Result<(Batch, AssemblyReport), PipelineError> {
    let mut records = Vec::new();
    let mut report = AssemblyReport::default();
    let mut total_bytes: u64 = 0;

    for group in groups {
        if group.label.trim().is_empty() {
            continue;
        }
        let Some(location) = location::normalize(&group.label) else {
            tracing::warn!(label = %group.label, "location rejected");
            report.rejected_locations.push(group.label);
            continue;
        };
        if group.files.is_empty() {
            continue;
        }
        let group_bytes: u64 = group.files.iter().map(StagedFile::size).sum();
        let attempted = total_bytes + group_bytes;
        if attempted > limits.max_batch_bytes {
            // Returning drops every record and remaining upload.
            return Err(PipelineError::BatchSizeExceeded {
                attempted,
                limit: limits.max_batch_bytes,
            });
        }
        total_bytes = attempted;

        for (position, file) in group.files.into_iter().enumerate() {
            on_file(file.original_name());
            match accept_file(file, limits, reader) {
                Ok((source, original_name, captured_at)) => {
                    let explicit_sequence = sequence_numbers
                        .and_then(|seq| seq.get(position).copied())
                        .flatten();
                    tracing::debug!(
                        file = %original_name,
                        location = %location,
                        captured_at = %captured_at,
                        ?explicit_sequence,
                        "photo accepted"
                    );
                    records.push(PhotoRecord {
                        source,
                        captured_at,
                        original_name,
                        location: location.clone(),
                        explicit_sequence,
                    });
                }
                Err(e) => {
                    tracing::warn!(location = %location, error = %e, "file skipped");
                    report.skipped_files += 1;
                }
            }
        }
    }

    if records.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }
    Ok((
        Batch {
            records,
            total_bytes,
        },
        report,
    ))
}
