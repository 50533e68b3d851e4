//! Small helpers around generated-file detection (§4.6 step 10): deciding
//! whether a directory entry is the source file itself, guessing a MIME type
//! from its extension, and building the combined stdout/stderr text blob
//! (§4.6 step 7).

use std::path::Path;

/// True for the language's own source file (`code.<ext>` or the Java-special
/// `Code.java`), which must never be reported as a generated output.
pub fn is_source_file(name: &str, source_filename: &str) -> bool {
    name == source_filename || name.starts_with("code") || name.starts_with("Code.")
}

pub fn guess_mime_type(name: &str) -> String {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Concatenates stdout and stderr with a joining newline, falling back to
/// `error_message` when stderr is empty and the execution failed (§4.6 step
/// 7), and guarantees stdout ends in a newline.
pub fn finalize_stdout(stdout: String) -> String {
    if stdout.is_empty() || stdout.ends_with('\n') {
        stdout
    } else {
        let mut s = stdout;
        s.push('\n');
        s
    }
}

pub fn finalize_stderr(stderr: String, failed: bool, error_message: Option<&str>) -> String {
    if failed && stderr.trim().is_empty() {
        error_message.unwrap_or_default().to_string()
    } else {
        stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_file_variants_are_recognized() {
        assert!(is_source_file("code.py", "code.py"));
        assert!(is_source_file("Code.java", "Code.java"));
        assert!(!is_source_file("output.csv", "code.py"));
    }

    #[test]
    fn stdout_always_ends_in_a_newline() {
        assert_eq!(finalize_stdout("42".to_string()), "42\n");
        assert_eq!(finalize_stdout(String::new()), "");
        assert_eq!(finalize_stdout("done\n".to_string()), "done\n");
    }

    #[test]
    fn empty_stderr_on_failure_falls_back_to_error_message() {
        let stderr = finalize_stderr(String::new(), true, Some("boom"));
        assert_eq!(stderr, "boom");
        let stderr = finalize_stderr("already has text".to_string(), true, Some("boom"));
        assert_eq!(stderr, "already has text");
    }
}
