use super::driver_version::{opengl_driver_version, vulkan_driver_version, vulkan_driver_version_raw};
use super::fields::*;
use super::sanitize::sanitize;
use super::RawFieldTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display-ready fields, one value per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedFieldTable(BTreeMap<String, String>);

impl NormalizedFieldTable {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when the value is the enabled checkbox mark.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.get(key) == Some(ENABLED_MARK)
    }
}

/// Fields computed from others; always rebuilt from their sources.
const DERIVED_FIELDS: &[&str] = &[GPU_INFO, GPU_AVAILABLE_INFO, DRIVER_VERSION_INFO, OS_PATH];

/// Turn raw captures into display values.
///
/// Normalizing an already normalized table (via `RawFieldTable::from`)
/// yields the same table.
pub fn normalize(raw: &RawFieldTable) -> NormalizedFieldTable {
    let mut items: BTreeMap<String, String> = BTreeMap::new();
    for key in raw.keys() {
        if DERIVED_FIELDS.contains(&key) {
            continue;
        }
        let value = if LIST_FIELDS.contains(&key) {
            join_distinct_lines(raw.get_all(key))
        } else {
            sanitize(raw.get(key).unwrap_or_default())
        };
        let value = if key == LIBRARY_LIST {
            value
        } else {
            checkbox(value)
        };
        items.insert(key.to_string(), value);
    }

    if items
        .get(STRICT_RENDERING_MODE)
        .is_some_and(|v| v == ENABLED_MARK)
    {
        items.insert(RESOLUTION_SCALE.to_string(), "Strict Mode".to_string());
    }
    if items.get(SPU_THREADS).is_some_and(|v| v == "0") {
        items.insert(SPU_THREADS.to_string(), "Auto".to_string());
    }
    if let Some(cores) = items.get(SPU_SECONDARY_CORES).cloned() {
        items.insert(THREAD_SCHEDULER.to_string(), cores);
    }

    apply_gpu_info(&mut items);

    match items.get(AF_OVERRIDE).map(String::as_str) {
        Some("0") => {
            items.insert(AF_OVERRIDE.to_string(), "Auto".to_string());
        }
        Some("1") => {
            items.insert(AF_OVERRIDE.to_string(), "Disabled".to_string());
        }
        _ => {}
    }

    if let Some(loader) = items.get(LIB_LOADER).map(|v| v.to_lowercase()) {
        let auto = loader.contains("auto");
        let manual = loader.contains("manual");
        let label = match (auto, manual) {
            (true, true) => Some("Auto & manual select"),
            (true, false) => Some("Auto"),
            (false, true) => Some("Manual selection"),
            (false, false) => None,
        };
        if let Some(label) = label {
            items.insert(LIB_LOADER.to_string(), label.to_string());
        }
    }

    if items.contains_key(WIN_PATH) {
        items.insert(OS_PATH.to_string(), "Windows".to_string());
    } else if items.contains_key(LIN_PATH) {
        items.insert(OS_PATH.to_string(), "Linux".to_string());
    }

    let libraries = items
        .get(LIBRARY_LIST)
        .map(|list| {
            list.split('\n')
                .map(|lib| lib.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '[' | ']')))
                .filter(|lib| !lib.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| "None".to_string());
    items.insert(LIBRARY_LIST.to_string(), libraries);

    append_unit(&mut items, MEMORY_AMOUNT, "GiB");
    append_unit(&mut items, CPU_SPEED, "GHz");

    NormalizedFieldTable(
        items
            .into_iter()
            .map(|(key, value)| (key, sanitize(&value)))
            .collect(),
    )
}

fn apply_gpu_info(items: &mut BTreeMap<String, String>) {
    let non_empty = |key: &str| {
        items
            .get(key)
            .filter(|v| !v.is_empty() && v.as_str() != "\"\"")
            .cloned()
    };

    let gpu = non_empty(VULKAN_INITIALIZED_DEVICE)
        .or_else(|| non_empty(DRIVER_MANUF_NEW))
        .or_else(|| non_empty(VULKAN_GPU))
        .or_else(|| non_empty(D3D_GPU))
        .or_else(|| non_empty(DRIVER_MANUF));

    if let Some(gpu) = gpu {
        let get = |key: &str| items.get(key).map(String::as_str);
        let driver_version = get(DRIVER_VERSION_NEW)
            .or_else(|| get(DRIVER_VERSION))
            .and_then(|version| opengl_driver_version(&gpu, version))
            .or_else(|| {
                let device = get(VULKAN_INITIALIZED_DEVICE)?;
                vulkan_driver_version(device, get(VULKAN_FOUND_DEVICE)?)
            })
            .or_else(|| vulkan_driver_version_raw(&gpu, get(VULKAN_DRIVER_VERSION_RAW)?));

        let gpu_info = match &driver_version {
            Some(version) => format!("{} ({})", gpu, version),
            None => gpu,
        };
        items.insert(GPU_INFO.to_string(), gpu_info);
        if let Some(version) = driver_version {
            items.insert(DRIVER_VERSION_INFO.to_string(), version);
        }
    }

    if let Some(names) = items.get(VULKAN_COMPATIBLE_DEVICE_NAME) {
        let found = items
            .get(VULKAN_FOUND_DEVICE)
            .map(String::as_str)
            .unwrap_or_default();
        let mut seen: Vec<&str> = Vec::new();
        let available: Vec<String> = names
            .lines()
            .filter(|name| {
                let fresh = !seen.contains(name);
                if fresh {
                    seen.push(name);
                }
                fresh
            })
            .map(|name| match vulkan_driver_version(name, found) {
                Some(version) => format!("{} ({})", name, version),
                None => name.to_string(),
            })
            .collect();
        items.insert(GPU_AVAILABLE_INFO.to_string(), available.join(", "));
    }
}

fn join_distinct_lines(values: Vec<&str>) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in values.iter().flat_map(|v| v.split('\n')) {
        let line = sanitize(line);
        if !line.is_empty() && !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn checkbox(value: String) -> String {
    if value.eq_ignore_ascii_case("true") {
        ENABLED_MARK.to_string()
    } else if value.eq_ignore_ascii_case("false") {
        DISABLED_MARK.to_string()
    } else {
        value
    }
}

fn append_unit(items: &mut BTreeMap<String, String>, key: &str, unit: &str) {
    if let Some(value) = items.get_mut(key) {
        let numeric = value.chars().any(|c| c.is_ascii_digit())
            && value.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',');
        if numeric {
            value.push(' ');
            value.push_str(unit);
        }
    }
}
