//! Extraction of transfer statistics from rsync's `--stats` summary.

use serde::Serialize;

/// Numbers recovered from a transfer's output.
///
/// Every field is optional: a missing or malformed summary line leaves the
/// corresponding value unknown rather than failing the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    /// `Number of files:` (whole tree, not just this run's delta)
    pub total_files: Option<u64>,
    /// `Number of regular files transferred:`
    pub files_transferred: Option<u64>,
    /// `Total file size:` in bytes (whole tree)
    pub total_size: Option<u64>,
    /// `Total transferred file size:` in bytes
    pub bytes_transferred: Option<u64>,
    /// `Number of deleted files:`
    pub files_deleted: Option<u64>,
}

impl TransferStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Copy)]
enum Field {
    TotalFiles,
    FilesTransferred,
    TotalSize,
    BytesTransferred,
    FilesDeleted,
}

const LABELS: [(&str, Field); 5] = [
    ("Number of files:", Field::TotalFiles),
    ("Number of regular files transferred:", Field::FilesTransferred),
    ("Total file size:", Field::TotalSize),
    ("Total transferred file size:", Field::BytesTransferred),
    ("Number of deleted files:", Field::FilesDeleted),
];

/// Scan `output` line by line for the summary labels.
///
/// The first whitespace-delimited token after a label is read as an integer
/// with `,` thousands separators removed. Later lines win when a label
/// repeats.
pub fn parse_stats(output: &str) -> TransferStats {
    let mut stats = TransferStats::default();

    for line in output.lines() {
        let line = line.trim();
        let Some((label, field, rest)) = LABELS
            .iter()
            .find_map(|(label, field)| line.strip_prefix(label).map(|rest| (*label, *field, rest)))
        else {
            continue;
        };

        let Some(value) = parse_count(rest) else {
            tracing::debug!(target: "transfer::stats", label, line, "Unparseable statistics line");
            continue;
        };

        let slot = match field {
            Field::TotalFiles => &mut stats.total_files,
            Field::FilesTransferred => &mut stats.files_transferred,
            Field::TotalSize => &mut stats.total_size,
            Field::BytesTransferred => &mut stats.bytes_transferred,
            Field::FilesDeleted => &mut stats.files_deleted,
        };
        *slot = Some(value);
    }

    stats
}

fn parse_count(rest: &str) -> Option<u64> {
    let token = rest.split_whitespace().next()?;
    let digits: String = token.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
