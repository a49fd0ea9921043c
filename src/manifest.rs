//! Host manifest sources and slug derivation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::model::HostManifest;
use crate::traits::{ManifestError, ManifestSource};

/// Derives a component slug from its manifest path.
///
/// The slug is the name of the directory enclosing the manifest
/// (`"akismet/akismet.php"` → `"akismet"`); a top-level manifest falls back
/// to its file name without extension (`"hello.php"` → `"hello"`).
///
/// Returns `None` for paths that cannot identify a component: empty paths and
/// paths containing `..`.
pub fn derive_slug(manifest_path: &str) -> Option<String> {
    let path = Path::new(manifest_path);
    let mut names = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => names.push(name),
            Component::ParentDir => return None,
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    let slug = match names.as_slice() {
        [] => return None,
        [file] => Path::new(file).file_stem()?.to_str()?,
        [.., dir, _file] => dir.to_str()?,
    };

    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Reads the installed list from a JSON array of [`HostManifest`] objects,
/// as exported by the host's introspection hook.
///
/// Elements that do not deserialize are logged and skipped; only an
/// unreadable file or a document that is not a JSON array fails the listing.
#[derive(Debug, Clone)]
pub struct JsonManifestSource {
    path: PathBuf,
}

impl JsonManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ManifestSource for JsonManifestSource {
    async fn list_installed(&self) -> Result<Vec<HostManifest>, ManifestError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let values: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
        let total = values.len();

        let manifests: Vec<HostManifest> = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(path = %self.path.display(), index, error = %e, "Skipping malformed manifest");
                    None
                }
            })
            .collect();
        if manifests.len() < total {
            warn!(
                path = %self.path.display(),
                skipped = total - manifests.len(),
                "Some manifests were unreadable"
            );
        }
        Ok(manifests)
    }
}

/// Fixed manifest list, for embedding hosts that already hold the list in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticManifestSource {
    manifests: Vec<HostManifest>,
}

impl StaticManifestSource {
    pub fn new(manifests: Vec<HostManifest>) -> Self {
        Self { manifests }
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    async fn list_installed(&self) -> Result<Vec<HostManifest>, ManifestError> {
        Ok(self.manifests.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_comes_from_enclosing_directory() {
        assert_eq!(derive_slug("akismet/akismet.php").as_deref(), Some("akismet"));
        assert_eq!(
            derive_slug("/srv/site/plugins/seo-booster/main.php").as_deref(),
            Some("seo-booster")
        );
    }

    #[test]
    fn top_level_manifest_falls_back_to_file_stem() {
        assert_eq!(derive_slug("hello.php").as_deref(), Some("hello"));
        assert_eq!(derive_slug("./hello.php").as_deref(), Some("hello"));
    }

    #[test]
    fn unusable_paths_yield_no_slug() {
        assert_eq!(derive_slug(""), None);
        assert_eq!(derive_slug("../escape/plugin.php"), None);
        assert_eq!(derive_slug("/"), None);
    }

    #[tokio::test]
    async fn json_source_reads_manifest_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installed.json");
        std::fs::write(
            &path,
            r#"[
                {"manifest_path":"akismet/akismet.php","display_name":"Akismet","version":"5.3","is_active":true},
                {"manifest_path":"hello.php","display_name":"Hello Dolly"}
            ]"#,
        )
        .unwrap();

        let manifests = JsonManifestSource::new(&path).list_installed().await.unwrap();
        assert_eq!(manifests.len(), 2);
        assert!(manifests[0].is_active);
        assert_eq!(manifests[1].version, None);
    }

    #[tokio::test]
    async fn json_source_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installed.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonManifestSource::new(&path).list_installed().await.unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[tokio::test]
    async fn json_source_skips_malformed_elements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installed.json");
        std::fs::write(
            &path,
            r#"[
                {"manifest_path":"good/good.php","display_name":"Good","version":"1.0"},
                {"manifest_path":"bad/bad.php","version":"1.0"}
            ]"#,
        )
        .unwrap();

        let manifests = JsonManifestSource::new(&path).list_installed().await.unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].display_name, "Good");
    }

    #[tokio::test]
    async fn json_source_rejects_non_array_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installed.json");
        std::fs::write(&path, r#"{"manifest_path":"good/good.php"}"#).unwrap();

        let err = JsonManifestSource::new(&path).list_installed().await.unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }
}
