use std::path::Path;

/// Series key of a log file: its file name up to the first `_`
pub fn series_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    match name.split_once('_') {
        Some((prefix, _)) => prefix.to_owned(),
        None => name,
    }
}

/// Name of the result log written for a benchmark executable
pub fn run_log_name(executable: &Path) -> String {
    let name = executable
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bench".to_owned());
    format!("{name}_big_log.log")
}
