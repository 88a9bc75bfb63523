use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Local;

use crate::archive;
use crate::batch::{self, UploadGroup};
use crate::capture_time::CaptureTimeReader;
use crate::config::UploadLimits;
use crate::error::PipelineError;
use crate::naming;
use crate::progress::{ProgressStatus, SharedProgress};

/// Everything one rename request needs. Owned so it can move onto a blocking thread.
pub struct ProcessParams {
    pub groups: Vec<UploadGroup>,
    pub sequence_numbers: Option<Vec<Option<u32>>>,
    pub limits: UploadLimits,
    pub reader: Arc<dyn CaptureTimeReader>,
    pub progress: SharedProgress,
    pub token: String,
}

/// Finished archive plus what the caller should be told about it.
#[derive(Debug)]
pub struct RenamedArchive {
    pub bytes: Vec<u8>,
    pub download_name: String,
    pub photo_count: usize,
    pub location_count: usize,
    pub skipped_files: usize,
    pub rejected_locations: usize,
    pub warnings: Vec<String>,
}

/// `{location}_photos_{ts}.zip` for one location, else `multi_location_photos_{ts}.zip`.
pub fn download_name(locations: &BTreeSet<String>) -> String {
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    match locations.iter().next() {
        Some(only) if locations.len() == 1 => format!("{only}_photos_{ts}.zip"),
        _ => format!("multi_location_photos_{ts}.zip"),
    }
}

/// Run assemble, order and emit for one submission.
///
/// Progress is reported on the side; a failure marks the session failed and
/// drops every staged upload before returning.
pub fn process(params: ProcessParams) -> Result<RenamedArchive, PipelineError> {
    let ProcessParams {
        groups,
        sequence_numbers,
        limits,
        reader,
        progress,
        token,
    } = params;

    let total_files: usize = groups
        .iter()
        .filter(|g| !g.label.trim().is_empty())
        .map(|g| g.files.len())
        .sum();
    progress.start(&token, total_files);

    let result = run(
        groups,
        sequence_numbers.as_deref(),
        &limits,
        reader.as_ref(),
        &progress,
        &token,
    );
    match &result {
        Ok(out) => {
            progress.set_status(&token, ProgressStatus::Complete, "Download ready!");
            tracing::info!(
                session = %token,
                photos = out.photo_count,
                locations = out.location_count,
                skipped = out.skipped_files,
                "batch renamed"
            );
        }
        Err(e) => {
            progress.set_status(&token, ProgressStatus::Failed, e.client_message());
        }
    }
    result
}

fn run(
    groups: Vec<UploadGroup>,
    sequence_numbers: Option<&[Option<u32>]>,
    limits: &UploadLimits,
    reader: &dyn CaptureTimeReader,
    progress: &SharedProgress,
    token: &str,
) -> Result<RenamedArchive, PipelineError> {
    let mut seen = 0usize;
    let (batch, report) = batch::assemble(groups, sequence_numbers, limits, reader, |name| {
        seen += 1;
        progress.advance(token, seen, format!("Processing {name}..."));
    })?;

    let locations: BTreeSet<String> = batch.records.iter().map(|r| r.location.clone()).collect();
    let photo_count = batch.records.len();
    tracing::debug!(
        session = %token,
        photos = photo_count,
        bytes = batch.total_bytes,
        "batch assembled"
    );

    let entries = naming::order(batch);
    progress.enter_phase(
        token,
        ProgressStatus::CreatingArchive,
        entries.len(),
        "Creating ZIP file...",
    );
    let bytes = archive::emit(entries, |current, total, name| {
        progress.advance(token, current, format!("Adding to ZIP: {name} ({current}/{total})"));
    })?;

    Ok(RenamedArchive {
        bytes,
        download_name: download_name(&locations),
        photo_count,
        location_count: locations.len(),
        skipped_files: report.skipped_files,
        rejected_locations: report.rejected_locations.len(),
        warnings: report.warnings(),
    })
}
