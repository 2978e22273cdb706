//! GPU driver version rendering.
//!
//! Vulkan drivers report their version either as text (`'name' running on
//! driver 431.60.0.0`) or as a packed 32-bit integer whose layout depends on
//! the vendor. Both are turned into the version string the vendor itself
//! publishes.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static VULKAN_DEVICE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)'(?P<device_name>.+)' running on driver (?P<version>.+?)\r?$")
        .expect("Invalid Vulkan device regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Amd,
    Nvidia,
    Intel,
    Other,
}

impl GpuVendor {
    pub fn detect(gpu_info: &str) -> Self {
        let lower = gpu_info.to_lowercase();
        let ati = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "ati");
        if lower.contains("radeon") || lower.contains("amd") || ati {
            Self::Amd
        } else if lower.contains("geforce") || lower.contains("nvidia") || lower.contains("quadro") {
            Self::Nvidia
        } else if lower.contains("intel") {
            Self::Intel
        } else {
            Self::Other
        }
    }
}

/// OpenGL drivers already report the vendor-facing version.
pub fn opengl_driver_version(_gpu_info: &str, version: &str) -> Option<String> {
    let version = version.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Version reported for `gpu` among the `'name' running on driver x` lines.
pub fn vulkan_driver_version(gpu: &str, found_devices: &str) -> Option<String> {
    if gpu.is_empty() || found_devices.is_empty() {
        return None;
    }
    let version = VULKAN_DEVICE_REGEX
        .captures_iter(found_devices)
        .find(|caps| &caps["device_name"] == gpu)
        .map(|caps| caps["version"].trim().to_string())?;

    if GpuVendor::detect(gpu) == GpuVendor::Amd {
        return Some(version);
    }

    let mut version = version
        .strip_suffix(".0.0")
        .map(str::to_string)
        .unwrap_or(version);
    let bytes = version.as_bytes();
    if bytes.len() > 3 && bytes[bytes.len() - 2] == b'.' {
        version.insert(version.len() - 1, '0');
    }
    Some(version)
}

/// Decode the packed `driverVersion` integer from the device init line.
pub fn vulkan_driver_version_raw(gpu_info: &str, raw: &str) -> Option<String> {
    let value = raw.trim().parse::<i64>().ok()? as u32;
    let vendor = GpuVendor::detect(gpu_info);

    if vendor == GpuVendor::Amd {
        let major = (value >> 22) & 0x3ff;
        let minor = (value >> 12) & 0x3ff;
        let patch = value & 0xfff;
        return Some(format!("{}.{}.{}", major, minor, patch));
    }

    let major = (value >> 22) & 0x3ff;
    let minor = (value >> 14) & 0xff;
    let patch = value & 0x3fff;

    match vendor {
        GpuVendor::Intel if major == 0 => Some(format!("{}.{}", minor, patch)),
        // Short form only when the whole 14-bit patch field is zero; a zero
        // low sub-field alone still renders all four parts.
        GpuVendor::Nvidia if patch == 0 => Some(format!("{}.{}", major, minor)),
        GpuVendor::Nvidia => Some(format!(
            "{}.{:02}.{}.{}",
            major,
            minor,
            (patch >> 6) & 0xff,
            patch & 0x3f
        )),
        _ => {
            if vendor == GpuVendor::Other {
                debug!("Unvalidated Vulkan driver version {} for '{}'", raw.trim(), gpu_info);
            }
            Some(format!("{}.{}.{}", major, minor, patch))
        }
    }
}
