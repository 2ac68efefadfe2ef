// The artifact store: named standalone HTML files plus a JSON manifest
// describing the catalog of one run.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JSValue};
use snafu::prelude::*;

use crate::dash::charts::ChartArtifact;
use crate::dash::*;

/// One line of the manifest: the artifact name the dashboard navigates by,
/// the human title and the file under the store directory.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub title: String,
    pub file: String,
}

/// Writes one artifact as `<name>.html` under the store directory, creating
/// the directory if needed.
pub fn write_artifact(dir: &Path, artifact: &ChartArtifact) -> DashResult<PathBuf> {
    fs::create_dir_all(dir).context(WritingArtifactSnafu {
        path: dir.display().to_string(),
    })?;
    let path = dir.join(format!("{}.html", artifact.name));
    fs::write(&path, &artifact.html).context(WritingArtifactSnafu {
        path: path.display().to_string(),
    })?;
    debug!("write_artifact: {}", path.display());
    Ok(path)
}

pub fn build_manifest(entries: &[ManifestEntry]) -> JSValue {
    json!({ "artifacts": entries })
}

pub fn write_manifest(dir: &Path, manifest: &JSValue) -> DashResult<PathBuf> {
    let path = dir.join("manifest.json");
    let pretty = serde_json::to_string_pretty(manifest).context(ParsingJsonSnafu {})?;
    fs::write(&path, pretty).context(WritingArtifactSnafu {
        path: path.display().to_string(),
    })?;
    Ok(path)
}

/// Reads a manifest back, e.g. the reference manifest of a previous run.
pub fn read_manifest(path: &str) -> DashResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_land_under_their_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ChartArtifact {
            name: "histogram_1".to_string(),
            title: "Distribution".to_string(),
            html: "<html></html>".to_string(),
        };
        let path = write_artifact(dir.path(), &artifact).unwrap();
        assert_eq!(path, dir.path().join("histogram_1.html"));
        assert_eq!(fs::read_to_string(path).unwrap(), "<html></html>");
    }

    #[test]
    fn the_manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![ManifestEntry {
            name: "histogram_1".to_string(),
            title: "Distribution".to_string(),
            file: "histogram_1.html".to_string(),
        }];
        let manifest = build_manifest(&entries);
        let path = write_manifest(dir.path(), &manifest).unwrap();
        let read_back = read_manifest(&path.display().to_string()).unwrap();
        assert_eq!(read_back, manifest);
        assert_eq!(read_back["artifacts"][0]["name"], "histogram_1");
    }
}
