//! Reading the engine's on-disk state
//!
//! Wallpapers live in folders holding a `project.json`; profiles and the
//! active wallpaper are recorded in the engine's `config.json` under a
//! per-user key. Everything here is synchronous file access and is run on
//! the blocking pool by [`super::EngineControl`].

use super::{ControlError, ControlResult, CurrentWallpaper, WallpaperEntry};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PROJECT_FILE: &str = "project.json";

/// The parts of `project.json` the bridge reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub title: Option<String>,
    /// Numeric in some exports, string in others
    #[serde(default)]
    pub workshopid: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub general: Option<ProjectGeneral>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectGeneral {
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ProjectFile {
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn workshop_id(&self) -> Option<String> {
        match &self.workshopid {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Property key to current value, taken from `general.properties.<key>.value`
    pub fn property_values(&self) -> Map<String, Value> {
        self.general
            .as_ref()
            .map(|general| {
                general
                    .properties
                    .iter()
                    .filter_map(|(key, property)| {
                        property.get("value").map(|value| (key.clone(), value.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_entry(&self, folder: &Path) -> WallpaperEntry {
        let path = folder.to_string_lossy().to_string();
        let id = self.workshop_id().unwrap_or_else(|| path.clone());
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| folder_name(folder));
        WallpaperEntry::new(id, title, path)
    }
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| folder.to_string_lossy().to_string())
}

fn read_to_string(path: &Path) -> ControlResult<String> {
    std::fs::read_to_string(path).map_err(|source| ControlError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_project(folder: &Path) -> ControlResult<ProjectFile> {
    let path = folder.join(PROJECT_FILE);
    let content = read_to_string(&path)?;
    ProjectFile::parse(&content).map_err(|source| ControlError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Every readable project one level below each library folder, sorted by title
pub fn scan_wallpapers(dirs: &[PathBuf]) -> ControlResult<Vec<WallpaperEntry>> {
    if dirs.is_empty() {
        return Err(ControlError::NotConfigured(
            "engine.wallpaper_dirs is empty".to_string(),
        ));
    }

    let mut entries = Vec::new();
    for dir in dirs {
        let listing = match std::fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable wallpaper folder");
                continue;
            }
        };

        for item in listing.flatten() {
            let folder = item.path();
            if !folder.is_dir() || !folder.join(PROJECT_FILE).is_file() {
                continue;
            }
            match load_project(&folder) {
                Ok(project) => entries.push(project.to_entry(&folder)),
                Err(e) => {
                    warn!(folder = %folder.display(), error = %e, "Skipping wallpaper project");
                }
            }
        }
    }

    entries.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    debug!(count = entries.len(), "Scanned wallpaper library");
    Ok(entries)
}

/// Parsed engine `config.json`
#[derive(Debug, Clone)]
pub struct EngineConfigFile {
    root: Value,
}

impl EngineConfigFile {
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            root: serde_json::from_str(content)?,
        })
    }

    pub fn load(path: &Path) -> ControlResult<Self> {
        let content = read_to_string(path)?;
        Self::parse(&content).map_err(|source| ControlError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// The named user's section, or the first key that carries a `general` block
    fn user_general(&self, user: Option<&str>) -> Option<&Value> {
        let root = self.root.as_object()?;
        match user {
            Some(user) => root.get(user)?.get("general"),
            None => root.values().find_map(|section| {
                section.get("general").filter(|general| general.is_object())
            }),
        }
    }

    pub fn profile_names(&self, user: Option<&str>) -> Vec<String> {
        self.user_general(user)
            .and_then(|general| general.get("profiles"))
            .and_then(Value::as_array)
            .map(|profiles| {
                profiles
                    .iter()
                    .filter_map(|profile| profile.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The file the engine shows on the first monitor
    pub fn selected_wallpaper(&self, user: Option<&str>) -> Option<PathBuf> {
        self.user_general(user)?
            .get("wallpaperconfig")?
            .get("selectedwallpapers")?
            .get("Monitor0")?
            .get("file")?
            .as_str()
            .filter(|file| !file.is_empty())
            .map(PathBuf::from)
    }
}

/// Project folder for a selected file; the engine records either the folder,
/// the `project.json`, or the scene file inside it
pub fn project_folder(selected: &Path) -> PathBuf {
    if selected.extension().is_some() {
        selected
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| selected.to_path_buf())
    } else {
        selected.to_path_buf()
    }
}

/// Build the snapshot of the active wallpaper from its project folder
pub fn load_current_wallpaper(selected: &Path) -> ControlResult<CurrentWallpaper> {
    let folder = project_folder(selected);
    let project = load_project(&folder)?;
    let entry = project.to_entry(&folder);

    Ok(CurrentWallpaper {
        id: entry.id,
        title: entry.title,
        description: project
            .description
            .clone()
            .filter(|description| !description.is_empty()),
        preview: project
            .preview
            .as_ref()
            .filter(|preview| !preview.is_empty())
            .map(|preview| folder.join(preview).to_string_lossy().to_string()),
        tags: project.tags.clone(),
        path: entry.path,
        properties: project.property_values(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_project(root: &Path, folder: &str, project: Value) -> PathBuf {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PROJECT_FILE), project.to_string()).unwrap();
        dir
    }

    #[test]
    fn test_workshop_id_forms() {
        let numeric = ProjectFile::parse(r#"{"workshopid": 1234}"#).unwrap();
        assert_eq!(numeric.workshop_id().as_deref(), Some("1234"));

        let text = ProjectFile::parse(r#"{"workshopid": " 99 "}"#).unwrap();
        assert_eq!(text.workshop_id().as_deref(), Some("99"));

        let blank = ProjectFile::parse(r#"{"workshopid": ""}"#).unwrap();
        assert_eq!(blank.workshop_id(), None);
    }

    #[test]
    fn test_entry_falls_back_to_folder() {
        let project = ProjectFile::parse(r#"{"title": "  "}"#).unwrap();
        let entry = project.to_entry(Path::new("/lib/myproject"));
        assert_eq!(entry.id, "/lib/myproject");
        assert_eq!(entry.title, "myproject");
        assert_eq!(entry.path, "/lib/myproject");
    }

    #[test]
    fn test_property_values() {
        let project = ProjectFile::parse(
            r#"{"general": {"properties": {
                "speed": {"type": "slider", "value": 0.5},
                "schemecolor": {"value": "0 0 1"},
                "label": {"text": "no value here"}
            }}}"#,
        )
        .unwrap();
        let values = project.property_values();
        assert_eq!(values.len(), 2);
        assert_eq!(values["speed"], json!(0.5));
        assert_eq!(values["schemecolor"], json!("0 0 1"));
    }

    #[test]
    fn test_scan_sorts_and_skips_bad_projects() {
        let temp = TempDir::new().unwrap();
        write_project(temp.path(), "b", json!({"title": "Rain", "workshopid": "2"}));
        write_project(temp.path(), "a", json!({"title": "aurora", "workshopid": 1}));
        write_project(temp.path(), "c", json!({}));
        std::fs::create_dir_all(temp.path().join("broken")).unwrap();
        std::fs::write(temp.path().join("broken").join(PROJECT_FILE), "{not json").unwrap();
        std::fs::create_dir_all(temp.path().join("empty")).unwrap();

        let entries = scan_wallpapers(&[temp.path().to_path_buf()]).unwrap();
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["aurora", "c", "Rain"]);
        assert_eq!(entries[0].id, "1");
        assert!(entries[1].id.ends_with("c"));
    }

    #[test]
    fn test_scan_requires_configured_dirs() {
        assert!(matches!(
            scan_wallpapers(&[]),
            Err(ControlError::NotConfigured(_))
        ));

        let missing = vec![PathBuf::from("/definitely/not/here")];
        assert!(scan_wallpapers(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_engine_config_profiles_and_selection() {
        let config = EngineConfigFile::parse(
            &json!({
                "?installdate": "20200101",
                "steamuser": {
                    "general": {
                        "profiles": [{"name": "Work"}, {"name": "Gaming"}, {"other": 1}],
                        "wallpaperconfig": {
                            "selectedwallpapers": {
                                "Monitor0": {"file": "C:/lib/123/scene.json"}
                            }
                        }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(config.profile_names(None), vec!["Work", "Gaming"]);
        assert_eq!(config.profile_names(Some("steamuser")).len(), 2);
        assert!(config.profile_names(Some("nobody")).is_empty());
        assert_eq!(
            config.selected_wallpaper(None),
            Some(PathBuf::from("C:/lib/123/scene.json"))
        );
    }

    #[test]
    fn test_project_folder() {
        assert_eq!(
            project_folder(Path::new("/lib/123/scene.json")),
            PathBuf::from("/lib/123")
        );
        assert_eq!(project_folder(Path::new("/lib/123")), PathBuf::from("/lib/123"));
    }

    #[test]
    fn test_load_current_wallpaper() {
        let temp = TempDir::new().unwrap();
        let folder = write_project(
            temp.path(),
            "123",
            json!({
                "title": "Ocean",
                "workshopid": "123",
                "description": "Waves",
                "preview": "preview.gif",
                "tags": ["Nature"],
                "general": {"properties": {"speed": {"value": 2}}}
            }),
        );

        let current = load_current_wallpaper(&folder.join("scene.json")).unwrap();
        assert_eq!(current.id, "123");
        assert_eq!(current.title, "Ocean");
        assert_eq!(current.description.as_deref(), Some("Waves"));
        assert!(current.preview.unwrap().ends_with("preview.gif"));
        assert_eq!(current.tags, vec!["Nature"]);
        assert_eq!(current.properties["speed"], json!(2));

        assert!(load_current_wallpaper(&temp.path().join("missing")).is_err());
    }
}
