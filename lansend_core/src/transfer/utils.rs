use crate::transfer::constants::{MAX_FILENAME_LENGTH, STAGING_SUFFIX};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

const FALLBACK_NAME: &str = "unknown_file";

/// Open a staging file for the chunk starting at `offset`.
///
/// The first chunk (`offset == 0`) creates or truncates the file with
/// owner-only permissions (0o600 on Unix), so leftovers from an earlier
/// session or run never leak into the new transfer. Later chunks append.
pub async fn open_staging_file(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);

    if offset > 0 {
        options.append(true);
    } else {
        options.create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
    }

    options.open(path).await
}

/// `<final_path>.part`
pub fn staging_path_for(final_path: &Path) -> PathBuf {
    let mut staged: OsString = final_path.as_os_str().to_owned();
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}

/// `report.pdf` → `report_1.pdf`, `notes` → `notes_1`
pub fn numbered_file_name(file_name: &str, n: usize) -> String {
    let path = Path::new(file_name);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{}_{}.{}", stem, n, ext),
        _ => format!("{}_{}", file_name, n),
    }
}

/// Sanitize file name to prevent path traversal attacks and ensure safety
pub fn sanitize_file_name(file_name: &str) -> String {
    // Split by both / and \ so that paths from any platform lose their directories
    let file_name = file_name
        .split(['/', '\\'])
        .next_back()
        .unwrap_or(FALLBACK_NAME);

    if file_name.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    let mut clean_name: String = file_name.chars().filter(|c| !c.is_control()).collect();

    // Windows reserved device names
    let reserved_names = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if reserved_names
        .iter()
        .any(|&r| clean_name.eq_ignore_ascii_case(r))
    {
        return FALLBACK_NAME.to_string();
    }

    if clean_name == ".." || clean_name == "." || clean_name.trim().is_empty() {
        return FALLBACK_NAME.to_string();
    }

    if clean_name.len() > MAX_FILENAME_LENGTH {
        clean_name = truncate_preserving_extension(&clean_name);
    }

    clean_name
}

fn truncate_preserving_extension(name: &str) -> String {
    if let Some(idx) = name.rfind('.') {
        let ext_len = name.len() - idx;
        // Only keep the extension if it's a reasonable length
        if idx > 0 && ext_len < 20 {
            let mut base = name[..idx].to_string();
            truncate_at_char_boundary(&mut base, MAX_FILENAME_LENGTH - ext_len);
            base.push_str(&name[idx..]);
            return base;
        }
    }

    let mut truncated = name.to_string();
    truncate_at_char_boundary(&mut truncated, MAX_FILENAME_LENGTH);
    truncated
}

fn truncate_at_char_boundary(s: &mut String, max_len: usize) {
    let mut cutoff = max_len.min(s.len());
    while !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s.truncate(cutoff);
}
