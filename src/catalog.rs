use crate::placement::PlacementRequest;
use anyhow::{Context, Result};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;
use winit::dpi::PhysicalSize;

/// One draggable asset as the asset list shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub asset_type: String,
    pub scale: Option<f32>,
    pub y_diff: Option<f32>,
    pub can_be_character: bool,
}

impl CatalogEntry {
    pub fn new(asset_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            asset_type: asset_type.into(),
            scale: None,
            y_diff: None,
            can_be_character: false,
        }
    }

    fn scaled(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    fn y_diff(mut self, y_diff: f32) -> Self {
        self.y_diff = Some(y_diff);
        self
    }

    fn character(mut self) -> Self {
        self.can_be_character = true;
        self
    }

    pub fn request_at(&self, screen_position: Vec2) -> PlacementRequest {
        PlacementRequest {
            asset_type: self.asset_type.clone(),
            file_name: self.name.clone(),
            screen_position,
            scale: self.scale,
            y_offset: self.y_diff,
            character: self.can_be_character,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogEntryFile {
    name: String,
    #[serde(default)]
    scale: Option<f32>,
    #[serde(default, alias = "yDiff")]
    y_diff: Option<f32>,
    #[serde(default)]
    can_be_character: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    entries: Vec<CatalogEntry>,
}

impl AssetCatalog {
    pub fn builtin() -> Self {
        let entries = vec![
            CatalogEntry::new("gltf", "AlphaBlendModeTest.gltf").y_diff(-0.5),
            CatalogEntry::new("gltf", "Box.gltf"),
            CatalogEntry::new("gltf", "Buggy.gltf").scaled(0.02).y_diff(-0.45),
            CatalogEntry::new("gltf", "Poimandres.gltf").y_diff(-0.5),
            CatalogEntry::new("glb", "Cat.glb").scaled(0.1).y_diff(-0.5),
            CatalogEntry::new("glb", "Soldier.glb").character().y_diff(-0.5),
        ];
        Self { entries }
    }

    /// Reads `{ "<type>": [ { "name": ..., "scale": ..., "y_diff": ..., "can_be_character": ... } ] }`.
    /// Entries get fresh ids.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let groups: BTreeMap<String, Vec<CatalogEntryFile>> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))?;
        let mut entries = Vec::new();
        for (asset_type, files) in groups {
            for file in files {
                entries.push(CatalogEntry {
                    id: Uuid::new_v4(),
                    name: file.name,
                    asset_type: asset_type.clone(),
                    scale: file.scale,
                    y_diff: file.y_diff,
                    can_be_character: file.can_be_character,
                });
            }
        }
        debug!(target: "config", path = %path.display(), entries = entries.len(), "asset catalog loaded");
        Ok(Self { entries })
    }

    pub fn get(&self, id: Uuid) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn of_type<'a>(&'a self, asset_type: &'a str) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.asset_type == asset_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maps a drop onto the viewport to a placement request. Drops outside the viewport or of unknown
    /// assets produce nothing.
    pub fn request_for_drop(&self, drop: &DropEvent, viewport: PhysicalSize<u32>) -> Option<PlacementRequest> {
        if !drop.inside(viewport) {
            debug!(target: "placement", position = ?drop.screen_position, "drop outside viewport ignored");
            return None;
        }
        let Some(entry) = self.get(drop.asset_id) else {
            warn!(target: "placement", asset = %drop.asset_id, "drop of unknown asset ignored");
            return None;
        };
        Some(entry.request_at(drop.screen_position))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropEvent {
    pub asset_id: Uuid,
    /// Pixels relative to the viewport's top-left corner.
    pub screen_position: Vec2,
}

impl DropEvent {
    pub fn new(asset_id: Uuid, screen_position: Vec2) -> Self {
        Self { asset_id, screen_position }
    }

    pub fn inside(&self, viewport: PhysicalSize<u32>) -> bool {
        let Vec2 { x, y } = self.screen_position;
        x.is_finite()
            && y.is_finite()
            && x >= 0.0
            && y >= 0.0
            && x <= viewport.width as f32
            && y <= viewport.height as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub x: f32,
    pub y: f32,
}

/// A placed asset as the application state store keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedAsset {
    pub file_name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    pub position: ScreenPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_diff: Option<f32>,
}

impl PlacedAsset {
    pub fn from_request(request: &PlacementRequest) -> Self {
        Self {
            file_name: request.file_name.clone(),
            asset_type: request.asset_type.clone(),
            position: ScreenPosition { x: request.screen_position.x, y: request.screen_position.y },
            scale: request.scale,
            y_diff: request.y_offset,
        }
    }

    pub fn to_request(&self) -> PlacementRequest {
        PlacementRequest {
            asset_type: self.asset_type.clone(),
            file_name: self.file_name.clone(),
            screen_position: Vec2::new(self.position.x, self.position.y),
            scale: self.scale,
            y_offset: self.y_diff,
            character: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SceneFile {
    #[serde(default)]
    models: Vec<PlacedAsset>,
}

/// Reads a saved store snapshot `{ "models": [...] }`.
pub fn load_placements(path: impl AsRef<Path>) -> Result<Vec<PlacedAsset>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).with_context(|| format!("Failed to read scene {}", path.display()))?;
    let scene: SceneFile =
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse scene {}", path.display()))?;
    Ok(scene.models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_carries_scale_and_offsets() {
        let catalog = AssetCatalog::builtin();
        assert_eq!(catalog.len(), 6);
        let buggy = catalog.by_name("Buggy.gltf").unwrap();
        assert_eq!(buggy.scale, Some(0.02));
        assert_eq!(buggy.y_diff, Some(-0.45));
        let soldier = catalog.by_name("soldier.glb").unwrap();
        assert!(soldier.can_be_character);
        assert_eq!(catalog.of_type("glb").count(), 2);
    }

    #[test]
    fn drops_map_to_requests_inside_the_viewport_only() {
        let catalog = AssetCatalog::builtin();
        let cat = catalog.by_name("Cat.glb").unwrap().id;
        let viewport = PhysicalSize::new(800, 600);

        let request = catalog.request_for_drop(&DropEvent::new(cat, Vec2::new(400.0, 300.0)), viewport).unwrap();
        assert_eq!(request.asset_type, "glb");
        assert_eq!(request.file_name, "Cat.glb");
        assert_eq!(request.scale, Some(0.1));
        assert_eq!(request.y_offset, Some(-0.5));
        assert!(!request.character);
        let soldier = catalog.by_name("Soldier.glb").unwrap().id;
        let request = catalog.request_for_drop(&DropEvent::new(soldier, Vec2::new(10.0, 10.0)), viewport).unwrap();
        assert!(request.character);

        assert!(catalog.request_for_drop(&DropEvent::new(cat, Vec2::new(-1.0, 10.0)), viewport).is_none());
        assert!(catalog.request_for_drop(&DropEvent::new(cat, Vec2::new(10.0, 601.0)), viewport).is_none());
        assert!(catalog.request_for_drop(&DropEvent::new(Uuid::new_v4(), Vec2::new(1.0, 1.0)), viewport).is_none());
    }

    #[test]
    fn placed_asset_uses_store_field_names() {
        let json = r#"{"file_name":"Cat.glb","type":"glb","position":{"x":400,"y":300},"scale":0.1,"y_diff":-0.5}"#;
        let placed: PlacedAsset = serde_json::from_str(json).unwrap();
        let request = placed.to_request();
        assert_eq!(request.screen_position, Vec2::new(400.0, 300.0));
        assert_eq!(PlacedAsset::from_request(&request), placed);

        let bare: PlacedAsset =
            serde_json::from_str(r#"{"file_name":"Box.gltf","type":"gltf","position":{"x":1,"y":2}}"#).unwrap();
        assert_eq!(bare.scale, None);
        assert!(!serde_json::to_string(&bare).unwrap().contains("scale"));
    }
}
