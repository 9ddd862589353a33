// Coordinate cache - persisted screen positions of located UI elements
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::coords::{ScreenPoint, ScreenRect};

pub const PROMPT_CLICK: &str = "prompt_click";
pub const PROMPT_RECT: &str = "prompt_rect";
pub const GENERATE_BUTTON_CLICK: &str = "generate_button_click";
pub const DOWNLOAD_BUTTON_CLICK: &str = "download_button_click";
pub const OPEN_TOOL_CLICK: &str = "open_tool_click";

/// A cached entry: either a click point or an area.
///
/// Untagged so the file stays readable (`{"x":..,"y":..}` or with width/height).
/// `Area` is listed first because a point would otherwise swallow an area's x/y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedCoordinate {
    Area {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Point {
        x: i32,
        y: i32,
    },
}

impl CachedCoordinate {
    /// Click target: the point itself, or the center of an area.
    pub fn click_point(&self) -> ScreenPoint {
        match *self {
            CachedCoordinate::Point { x, y } => ScreenPoint::new(x, y),
            CachedCoordinate::Area { x, y, width, height } => {
                ScreenRect::new(x, y, width, height).center()
            }
        }
    }

    pub fn as_rect(&self) -> Option<ScreenRect> {
        match *self {
            CachedCoordinate::Area { x, y, width, height } => {
                Some(ScreenRect::new(x, y, width, height))
            }
            CachedCoordinate::Point { .. } => None,
        }
    }
}

impl From<ScreenPoint> for CachedCoordinate {
    fn from(p: ScreenPoint) -> Self {
        CachedCoordinate::Point { x: p.x, y: p.y }
    }
}

impl From<ScreenRect> for CachedCoordinate {
    fn from(r: ScreenRect) -> Self {
        CachedCoordinate::Area {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

/// Write-through store of located element positions.
///
/// Only the worker thread touches it. Every mutation is persisted immediately;
/// a failed write is logged and the in-memory entry kept.
#[derive(Debug)]
pub struct CoordinateCache {
    path: PathBuf,
    entries: BTreeMap<String, CachedCoordinate>,
}

impl CoordinateCache {
    /// Load from `path`. A missing or unreadable file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, CachedCoordinate>>(&contents) {
                Ok(entries) => {
                    tracing::info!(path = %path.display(), count = entries.len(), "coordinate cache loaded");
                    entries
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "coordinate cache is malformed, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "no coordinate cache yet, elements will be located dynamically");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<CachedCoordinate> {
        self.entries.get(key).copied()
    }

    pub fn point(&self, key: &str) -> Option<ScreenPoint> {
        self.get(key).map(|c| c.click_point())
    }

    pub fn rect(&self, key: &str) -> Option<ScreenRect> {
        self.get(key).and_then(|c| c.as_rect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<CachedCoordinate>) {
        self.entries.insert(key.to_string(), value.into());
        self.persist();
    }

    /// Remove an entry so the next lookup searches again. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.persist();
        }
        existed
    }

    pub fn save(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create cache directory: {}", e))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| format!("Failed to serialize: {}", e))?;
        fs::write(&self.path, json).map_err(|e| format!("Failed to write file: {}", e))?;
        Ok(())
    }

    fn persist(&self) {
        match self.save() {
            Ok(()) => tracing::debug!(path = %self.path.display(), "coordinate cache saved"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "coordinate cache not saved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_corrupt_files_give_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        assert!(CoordinateCache::load(&path).is_empty());

        fs::write(&path, "[1, 2").unwrap();
        assert!(CoordinateCache::load(&path).is_empty());
    }

    #[test]
    fn test_insert_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = CoordinateCache::load(&path);
        cache.insert(PROMPT_CLICK, ScreenPoint::new(960, 790));
        cache.insert(PROMPT_RECT, ScreenRect::new(500, 700, 920, 300));
        assert!(path.exists());

        let reloaded = CoordinateCache::load(&path);
        assert_eq!(reloaded.point(PROMPT_CLICK), Some(ScreenPoint::new(960, 790)));
        assert_eq!(reloaded.rect(PROMPT_RECT), Some(ScreenRect::new(500, 700, 920, 300)));
        assert_eq!(reloaded.rect(PROMPT_CLICK), None);
    }

    #[test]
    fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = CoordinateCache::load(&path);
        cache.insert(GENERATE_BUTTON_CLICK, ScreenPoint::new(1400, 950));
        assert!(cache.remove(GENERATE_BUTTON_CLICK));
        assert!(!cache.remove(GENERATE_BUTTON_CLICK));

        assert_eq!(CoordinateCache::load(&path).get(GENERATE_BUTTON_CLICK), None);
    }

    #[test]
    fn test_reads_hand_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "download_button_click": {"x": 925, "y": 704},
                "prompt_rect": {"x": 10, "y": 20, "width": 100, "height": 40}
            }"#,
        )
        .unwrap();

        let cache = CoordinateCache::load(&path);
        assert_eq!(cache.point(DOWNLOAD_BUTTON_CLICK), Some(ScreenPoint::new(925, 704)));
        assert_eq!(cache.point(PROMPT_RECT), Some(ScreenPoint::new(60, 40)));
    }
}
