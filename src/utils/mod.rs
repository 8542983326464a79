//! Small filesystem and formatting helpers.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Sanitize a filename for safe storage.
/// Replaces filesystem-unsafe characters and limits length.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Trim and limit length
    let trimmed = sanitized.trim().trim_matches('_');
    if trimmed.chars().count() > 100 {
        trimmed.chars().take(100).collect()
    } else if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reserve a destination file under `dir` for `name`, avoiding collisions.
///
/// The file is created empty with `create_new`, so the name is claimed
/// atomically even when several downloads race for it. When the plain name
/// is taken, ` (1)`, ` (2)`, ... are inserted before the extension.
pub fn unique_destination(dir: &Path, name: &str) -> io::Result<(String, PathBuf)> {
    let name = sanitize_filename(name);
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (name.clone(), None),
    };

    for attempt in 0..1000u32 {
        let candidate = match (attempt, &extension) {
            (0, _) => name.clone(),
            (n, Some(ext)) => format!("{} ({}).{}", stem, n, ext),
            (n, None) => format!("{} ({})", stem, n),
        };
        let path = dir.join(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok((candidate, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free destination name for {name}"),
    ))
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("a/b\\c:d.txt"), "a_b_c_d.txt");
        assert_eq!(sanitize_filename("  spaced.bin  "), "spaced.bin");
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename("///"), "download");
    }

    #[test]
    fn test_unique_destination_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let (first, first_path) = unique_destination(dir.path(), "file.txt").unwrap();
        assert_eq!(first, "file.txt");
        assert!(first_path.exists());

        let (second, _) = unique_destination(dir.path(), "file.txt").unwrap();
        assert_eq!(second, "file (1).txt");

        let (third, _) = unique_destination(dir.path(), "file.txt").unwrap();
        assert_eq!(third, "file (2).txt");
    }

    #[test]
    fn test_unique_destination_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = unique_destination(dir.path(), "archive").unwrap();
        assert_eq!(first, "archive");
        let (second, _) = unique_destination(dir.path(), "archive").unwrap();
        assert_eq!(second, "archive (1)");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
