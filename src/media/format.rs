use std::path::Path;

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human readable byte count, binary units, capped at GB.
pub fn format_filesize(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_owned();
    }
    let mut value = size_bytes as f64;
    let mut exp = 0;
    while value >= 1024.0 && exp < UNITS.len() - 1 {
        value /= 1024.0;
        exp += 1;
    }
    format!("{:.2} {}", value, UNITS[exp])
}

/// HH:MM:SS above an hour, MM:SS below.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Percent saved relative to the original size. Zero original yields 0.0.
pub fn calculate_reduction(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - compressed as f64) / original as f64 * 100.0
}

/// Download file name derived from the upload's base name. Always exactly
/// one extension, regardless of what the upload was called.
pub fn download_name(uploaded_name: &str, container_ext: &str) -> String {
    let stem = Path::new(uploaded_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    format!("kompres_{}.{}", stem, container_ext)
}
