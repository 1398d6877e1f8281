//! JSON file IO for the show, analysis and lyrics fixtures the CLI and HTTP
//! surfaces load. The editor owns real persistence; this is only the
//! headless harness around the tool layer.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use serde::Serialize;

use crate::model::{AudioAnalysis, LyricsAnalysis, Project};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid project: {0}")]
    InvalidProject(String),
}

impl Serialize for ProjectError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Atomically write bytes to a file: write a `.tmp` sibling, fsync, move the
/// old file to `.bak`, then rename into place.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ProjectError> {
    let lock = {
        let mut locks = FILE_LOCKS
            .lock()
            .map_err(|e| ProjectError::Io(std::io::Error::other(e.to_string())))?;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    };
    let _guard = lock
        .lock()
        .map_err(|e| ProjectError::Io(std::io::Error::other(e.to_string())))?;

    let file_name = path.file_name().unwrap_or_default();

    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut bak_name = OsString::from(file_name);
    bak_name.push(".bak");
    let bak_path = path.with_file_name(&bak_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    // Best-effort backup
    if path.exists() {
        let _ = fs::rename(path, &bak_path);
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

// ── Load / Save ─────────────────────────────────────────────────────

/// Load a show file. Overlapping segments in the file are resolved on load.
pub fn load_project(path: &Path) -> Result<Project, ProjectError> {
    let project: Project = read_json(path)?;
    if project.ball_count() == 0 {
        return Err(ProjectError::InvalidProject(format!(
            "{} declares no timelines",
            path.display()
        )));
    }
    Ok(project)
}

pub fn save_project(project: &Project, path: &Path) -> Result<(), ProjectError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_json(path, project)
}

pub fn load_analysis(path: &Path) -> Result<AudioAnalysis, ProjectError> {
    read_json(path)
}

pub fn load_lyrics(path: &Path) -> Result<LyricsAnalysis, ProjectError> {
    read_json(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{Color, Segment, TimeRange};

    #[test]
    fn save_then_load_preserves_segments() {
        let dir = std::env::temp_dir().join("ballseq_test_project_io");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("show.json");

        let mut project = Project::with_balls(2);
        project.timelines[1].insert(Segment::new(
            TimeRange::new(1.0, 2.5).unwrap(),
            Color::rgb(0, 0, 255),
            4,
        ));
        save_project(&project, &path).unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.ball_count(), 2);
        assert_eq!(loaded.timelines[1].segments(), project.timelines[1].segments());

        // A second save leaves a backup of the first
        save_project(&loaded, &path).unwrap();
        assert!(dir.join("show.json.bak").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn project_without_timelines_is_rejected() {
        let dir = std::env::temp_dir().join("ballseq_test_empty_project");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.json");
        fs::write(&path, r#"{"timelines": []}"#).unwrap();

        let err = load_project(&path).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidProject(_)));

        let _ = fs::remove_dir_all(&dir);
    }
}
