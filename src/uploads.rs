use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{AdmissionError, Result};

pub const ALLOWED_EXTENSIONS: [&str; 4] = [".pdf", ".jpg", ".jpeg", ".png"];
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const UPLOADS_DIR: &str = "uploads";

/// Checks extension and size of a local file offered as an attachment.
/// Returns a user-facing message on rejection.
pub fn validate_file(path: &Path) -> std::result::Result<u64, String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(format!(
            "File type {} not allowed. Allowed types: {}",
            if ext.is_empty() { "(none)" } else { ext.as_str() },
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    let meta = std::fs::metadata(path).map_err(|_| format!("File {} not found", path.display()))?;
    if !meta.is_file() {
        return Err(format!("File {} not found", path.display()));
    }
    if meta.len() > MAX_FILE_SIZE {
        return Err(format!(
            "File size {} bytes exceeds maximum allowed size of {} bytes",
            meta.len(),
            MAX_FILE_SIZE
        ));
    }
    Ok(meta.len())
}

/// Folder component for a student: `<name>-<email>` with path separators
/// and other unsafe characters replaced.
fn student_folder(student_name: &str, email: &str) -> String {
    let raw = format!("{}-{}", student_name.trim(), email.trim());
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Copies an already validated file into the workspace and returns the
/// stored path relative to the workspace root.
pub fn store_file(
    workspace: &Path,
    student_name: &str,
    email: &str,
    kind: &str,
    source: &Path,
) -> Result<String> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AdmissionError::bad_params("attachment path has no file name"))?;
    let stored_name = format!("{}-{}", Uuid::new_v4().simple(), file_name);
    let rel = PathBuf::from(UPLOADS_DIR)
        .join(student_folder(student_name, email))
        .join(kind)
        .join(stored_name);
    let dest = workspace.join(&rel);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, &dest)?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Removes attachments by their workspace-relative paths. Files already
/// gone are skipped and other failures are only logged.
pub fn discard<I, S>(workspace: &Path, stored: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for rel in stored {
        let rel = rel.as_ref();
        match std::fs::remove_file(workspace.join(rel)) {
            Ok(()) => tracing::debug!(path = rel, "stored attachment removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = rel, error = %e, "could not remove stored attachment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn rejects_bad_extension_and_oversize() {
        let dir = temp_dir("admissiond-uploads-validate");
        let txt = dir.join("notes.txt");
        std::fs::write(&txt, b"hi").expect("write");
        assert!(validate_file(&txt).expect_err("txt").contains(".txt"));

        let big = dir.join("scan.PDF");
        std::fs::write(&big, vec![0u8; (MAX_FILE_SIZE + 1) as usize]).expect("write");
        assert!(validate_file(&big).expect_err("big").contains("exceeds"));

        let ok = dir.join("photo.jpeg");
        std::fs::write(&ok, b"jpeg").expect("write");
        assert_eq!(validate_file(&ok), Ok(4));
    }

    #[test]
    fn stored_path_is_relative_and_keyed_by_student() {
        let ws = temp_dir("admissiond-uploads-store");
        let src = ws.join("tc.pdf");
        std::fs::write(&src, b"%PDF").expect("write");
        let rel = store_file(&ws, "Asha K", "asha@example.com", "certificates", &src)
            .expect("store");
        assert!(rel.starts_with("uploads/Asha_K-asha@example.com/certificates/"));
        assert!(rel.ends_with("-tc.pdf"));
        assert!(ws.join(&rel).is_file());
    }

    #[test]
    fn discard_removes_stored_files_and_skips_missing() {
        let ws = temp_dir("admissiond-uploads-discard");
        let src = ws.join("receipt.png");
        std::fs::write(&src, b"png").expect("write");
        let rel = store_file(&ws, "Asha K", "", "payments", &src).expect("store");
        assert!(ws.join(&rel).is_file());

        discard(&ws, [rel.as_str(), "uploads/nobody/payments/gone.png"]);
        assert!(!ws.join(&rel).exists());
        assert!(src.is_file());
    }
}
