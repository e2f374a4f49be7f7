use std::path::{Path, PathBuf};

use uuid::Uuid;

pub fn ensure_dirs(results_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(results_folder)?;
    Ok(())
}

/// Write a generated archive under the results folder, replacing any earlier
/// archive of the same name.
pub async fn save_archive(
    results_folder: &Path,
    file_name: &str,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    let path = results_folder.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved certificate archive");
    Ok(path)
}

/// Name an archive is stored under. The event id prefix keeps events with
/// the same title from overwriting each other's archives.
pub fn stored_archive_name(event_id: Uuid, archive_name: &str) -> String {
    format!("{event_id}_{archive_name}")
}

/// Name offered to the browser: the stored name without its event id prefix.
pub fn download_name(stored_name: &str) -> &str {
    match stored_name.split_once('_') {
        Some((prefix, rest)) if !rest.is_empty() && Uuid::parse_str(prefix).is_ok() => rest,
        _ => stored_name,
    }
}

/// Resolve a download name inside the results folder. Names that could
/// escape it are refused.
pub fn resolve_download(results_folder: &Path, file_name: &str) -> Option<PathBuf> {
    if file_name.is_empty()
        || file_name.contains("..")
        || file_name.contains('/')
        || file_name.contains('\\')
    {
        return None;
    }
    Some(results_folder.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn archive_is_written_under_results_folder() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        ensure_dirs(&results).unwrap();

        let path = save_archive(&results, "Rust_Conf_Certificates.zip", b"PK").await.unwrap();

        assert_eq!(path, results.join("Rust_Conf_Certificates.zip"));
        assert_eq!(std::fs::read(path).unwrap(), b"PK");
    }

    #[test]
    fn stored_names_carry_the_event_id() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let first = stored_archive_name(a, "Workshop_Certificates.zip");
        let second = stored_archive_name(b, "Workshop_Certificates.zip");

        assert_ne!(first, second);
        assert_eq!(first, format!("{a}_Workshop_Certificates.zip"));
        assert_eq!(download_name(&first), "Workshop_Certificates.zip");
        assert_eq!(download_name("Workshop_Certificates.zip"), "Workshop_Certificates.zip");
    }

    #[test]
    fn traversal_is_refused() {
        let root = Path::new("/srv/results");
        assert!(resolve_download(root, "../secret").is_none());
        assert!(resolve_download(root, "a/b.zip").is_none());
        assert!(resolve_download(root, "").is_none());
        assert_eq!(
            resolve_download(root, "Rust_Conf_Certificates.zip"),
            Some(root.join("Rust_Conf_Certificates.zip"))
        );
    }
}
