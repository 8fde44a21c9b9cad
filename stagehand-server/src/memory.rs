//! In-memory reference host.
//!
//! A mutex-guarded model of a small stage implementing both collaborator
//! traits, so the binary is runnable and the integration tests have a real
//! host to poll. The tool set deliberately returns a mix of records, lists,
//! and bare strings to exercise the router's result normalization.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};

use stagehand_wire::{ResourceCategory, ResourceUri};

use crate::host::{CommandExecutor, HostError, ObservedResource, ResourceProvider, ToolSpec};

#[derive(Debug, Clone, Serialize)]
struct ObjectState {
    location: [f64; 3],
    rotation: [f64; 3],
    scale: [f64; 3],
}

impl Default for ObjectState {
    fn default() -> Self {
        Self {
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct MaterialState {
    base_color: [f64; 4],
    metallic: f64,
    roughness: f64,
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8, 1.0],
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct LightState {
    location: [f64; 3],
    rotation: [f64; 3],
    color: [f64; 3],
    energy: f64,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            location: [4.0, 1.0, 6.0],
            rotation: [0.0; 3],
            color: [1.0; 3],
            energy: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CameraState {
    location: [f64; 3],
    rotation: [f64; 3],
    focal_length: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            location: [7.0, -7.0, 5.0],
            rotation: [1.1, 0.0, 0.8],
            focal_length: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SceneState {
    frame: i64,
}

impl Default for SceneState {
    fn default() -> Self {
        Self { frame: 1 }
    }
}

// BTreeMaps keep list() order stable across calls.
#[derive(Default)]
struct Stage {
    objects: BTreeMap<String, ObjectState>,
    materials: BTreeMap<String, MaterialState>,
    lights: BTreeMap<String, LightState>,
    cameras: BTreeMap<String, CameraState>,
    scenes: BTreeMap<String, SceneState>,
}

/// The reference host: one object, material, light, camera, and scene,
/// mutable through a handful of tools.
pub struct MemoryHost {
    stage: Mutex<Stage>,
}

impl MemoryHost {
    pub fn new() -> Self {
        let mut stage = Stage::default();
        stage
            .objects
            .insert("Cube".to_string(), ObjectState::default());
        stage
            .materials
            .insert("Default".to_string(), MaterialState::default());
        stage.lights.insert("Key".to_string(), LightState::default());
        stage
            .cameras
            .insert("Camera".to_string(), CameraState::default());
        stage
            .scenes
            .insert("Main".to_string(), SceneState::default());
        Self {
            stage: Mutex::new(stage),
        }
    }

    fn create_object(&self, args: &Value) -> Result<Value, HostError> {
        let name = required_str(args, "name")?;
        let location = vec3(args, "location")?.unwrap_or([0.0; 3]);
        let mut stage = self.stage.lock();
        if stage.objects.contains_key(&name) {
            return Err(HostError::InvalidArguments(format!(
                "object {name:?} already exists"
            )));
        }
        stage.objects.insert(
            name.clone(),
            ObjectState {
                location,
                ..ObjectState::default()
            },
        );
        Ok(json!({"name": name, "location": location}))
    }

    fn move_object(&self, args: &Value) -> Result<Value, HostError> {
        let name = required_str(args, "name")?;
        let location = vec3(args, "location")?
            .ok_or_else(|| HostError::InvalidArguments("missing \"location\"".to_string()))?;
        let mut stage = self.stage.lock();
        let object = stage
            .objects
            .get_mut(&name)
            .ok_or_else(|| unknown(ResourceCategory::Object, &name))?;
        object.location = location;
        Ok(json!({"name": name, "location": location}))
    }

    fn set_material_color(&self, args: &Value) -> Result<Value, HostError> {
        let name = required_str(args, "name")?;
        let color = rgba(args)?;
        let mut stage = self.stage.lock();
        let material = stage
            .materials
            .get_mut(&name)
            .ok_or_else(|| unknown(ResourceCategory::Material, &name))?;
        material.base_color = color;
        Ok(json!({"name": name, "base_color": color}))
    }

    fn set_light_energy(&self, args: &Value) -> Result<Value, HostError> {
        let name = required_str(args, "name")?;
        let energy = args
            .get("energy")
            .and_then(Value::as_f64)
            .ok_or_else(|| HostError::InvalidArguments("missing \"energy\"".to_string()))?;
        let mut stage = self.stage.lock();
        let light = stage
            .lights
            .get_mut(&name)
            .ok_or_else(|| unknown(ResourceCategory::Light, &name))?;
        light.energy = energy;
        Ok(json!({"name": name, "energy": energy}))
    }

    fn set_frame(&self, args: &Value) -> Result<Value, HostError> {
        let frame = args
            .get("frame")
            .and_then(Value::as_i64)
            .ok_or_else(|| HostError::InvalidArguments("missing \"frame\"".to_string()))?;
        let mut stage = self.stage.lock();
        let scene = stage
            .scenes
            .get_mut("Main")
            .ok_or_else(|| unknown(ResourceCategory::Scene, "Main"))?;
        scene.frame = frame;
        Ok(json!({"scene": "Main", "frame": frame}))
    }

    fn get_object_info(&self, args: &Value) -> Result<Value, HostError> {
        let name = required_str(args, "name")?;
        let stage = self.stage.lock();
        let object = stage
            .objects
            .get(&name)
            .ok_or_else(|| unknown(ResourceCategory::Object, &name))?;
        Ok(named(state_value(object), &name))
    }

    fn list_object_names(&self) -> Value {
        json!(self.stage.lock().objects.keys().collect::<Vec<_>>())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for MemoryHost {
    fn tools(&self) -> Vec<ToolSpec> {
        tool_specs()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, HostError> {
        match name {
            "create_object" => self.create_object(&arguments),
            "move_object" => self.move_object(&arguments),
            "set_material_color" => self.set_material_color(&arguments),
            "set_light_energy" => self.set_light_energy(&arguments),
            "set_frame" => self.set_frame(&arguments),
            "get_object_info" => self.get_object_info(&arguments),
            "list_object_names" => Ok(self.list_object_names()),
            other => Err(HostError::UnknownTool(other.to_string())),
        }
    }
}

impl ResourceProvider for MemoryHost {
    fn list(&self, category: ResourceCategory) -> Vec<String> {
        let stage = self.stage.lock();
        match category {
            ResourceCategory::Object => stage.objects.keys().cloned().collect(),
            ResourceCategory::Material => stage.materials.keys().cloned().collect(),
            ResourceCategory::Light => stage.lights.keys().cloned().collect(),
            ResourceCategory::Camera => stage.cameras.keys().cloned().collect(),
            ResourceCategory::Scene => stage.scenes.keys().cloned().collect(),
        }
    }

    fn read(&self, uri: &ResourceUri) -> Result<Value, HostError> {
        let stage = self.stage.lock();
        let state = match uri.category {
            ResourceCategory::Object => stage.objects.get(&uri.id).map(state_value),
            ResourceCategory::Material => stage.materials.get(&uri.id).map(state_value),
            ResourceCategory::Light => stage.lights.get(&uri.id).map(state_value),
            ResourceCategory::Camera => stage.cameras.get(&uri.id).map(state_value),
            ResourceCategory::Scene => stage.scenes.get(&uri.id).map(state_value),
        };
        state
            .map(|value| named(value, &uri.id))
            .ok_or_else(|| HostError::UnknownResource(uri.to_string()))
    }

    fn observe(&self, category: ResourceCategory) -> Vec<ObservedResource> {
        let stage = self.stage.lock();
        match category {
            ResourceCategory::Object => observed(&stage.objects),
            ResourceCategory::Material => observed(&stage.materials),
            ResourceCategory::Light => observed(&stage.lights),
            ResourceCategory::Camera => observed(&stage.cameras),
            ResourceCategory::Scene => observed(&stage.scenes),
        }
    }
}

fn observed<T: Serialize>(map: &BTreeMap<String, T>) -> Vec<ObservedResource> {
    map.iter()
        .map(|(id, state)| ObservedResource::new(id.clone(), state_value(state)))
        .collect()
}

fn state_value<T: Serialize>(state: &T) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}

fn named(mut value: Value, name: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("name".to_string(), json!(name));
    }
    value
}

fn unknown(category: ResourceCategory, id: &str) -> HostError {
    HostError::UnknownResource(ResourceUri::new(category, id).to_string())
}

fn required_str(args: &Value, key: &str) -> Result<String, HostError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HostError::InvalidArguments(format!("missing {key:?}")))
}

fn vec3(args: &Value, key: &str) -> Result<Option<[f64; 3]>, HostError> {
    match args.get(key) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|_| HostError::InvalidArguments(format!("{key:?} must be [x, y, z]"))),
    }
}

fn rgba(args: &Value) -> Result<[f64; 4], HostError> {
    let value = args
        .get("color")
        .ok_or_else(|| HostError::InvalidArguments("missing \"color\"".to_string()))?;
    if let Ok(rgba) = serde_json::from_value::<[f64; 4]>(value.clone()) {
        return Ok(rgba);
    }
    serde_json::from_value::<[f64; 3]>(value.clone())
        .map(|[r, g, b]| [r, g, b, 1.0])
        .map_err(|_| {
            HostError::InvalidArguments("\"color\" must be [r, g, b] or [r, g, b, a]".to_string())
        })
}

fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "create_object",
            "Add an object to the stage",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "location": {"type": "array", "items": {"type": "number"}},
                },
                "required": ["name"],
            }),
        ),
        ToolSpec::new(
            "move_object",
            "Set an object's location",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "location": {"type": "array", "items": {"type": "number"}},
                },
                "required": ["name", "location"],
            }),
        ),
        ToolSpec::new(
            "set_material_color",
            "Set a material's base color",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "color": {"type": "array", "items": {"type": "number"}},
                },
                "required": ["name", "color"],
            }),
        ),
        ToolSpec::new(
            "set_light_energy",
            "Set a light's energy",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "energy": {"type": "number"},
                },
                "required": ["name", "energy"],
            }),
        ),
        ToolSpec::new(
            "set_frame",
            "Set the scene's current frame",
            json!({
                "type": "object",
                "properties": {"frame": {"type": "integer"}},
                "required": ["frame"],
            }),
        ),
        ToolSpec::new(
            "get_object_info",
            "Full state of one object",
            json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
            }),
        ),
        ToolSpec::new(
            "list_object_names",
            "Names of every object on the stage",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}
