//! Field extraction from decoded log text.
//!
//! Extraction is table driven: every [`FieldRule`] is a regex whose named
//! capture groups become field names. Raw values keep every match in log
//! order so later stages can pick the first, the last or all of them.

pub mod driver_version;
pub mod fields;
mod normalize;
mod sanitize;

pub use normalize::{normalize, NormalizedFieldTable};
pub use sanitize::sanitize;

use crate::config::ExtractionConfig;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Ordered multimap of raw captures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFieldTable {
    entries: Vec<(String, String)>,
}

impl RawFieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Last value captured for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Distinct keys in first-seen order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.entries {
            if !keys.contains(&k.as_str()) {
                keys.push(k.as_str());
            }
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&NormalizedFieldTable> for RawFieldTable {
    fn from(table: &NormalizedFieldTable) -> Self {
        let mut raw = RawFieldTable::new();
        for (key, value) in table.iter() {
            raw.insert(key, value);
        }
        raw
    }
}

/// Which matches of a rule are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    First,
    Last,
    All,
}

/// One extraction pattern; each named group that participates in a match
/// is stored under the group's name.
#[derive(Debug)]
pub struct FieldRule {
    pub regex: Regex,
    pub mode: MatchMode,
    /// Stores the whole matched text under this key as well.
    pub whole_match_as: Option<&'static str>,
    pub transform: Option<fn(&str) -> String>,
}

impl FieldRule {
    fn new(pattern: &str, mode: MatchMode) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Invalid field rule regex"),
            mode,
            whole_match_as: None,
            transform: None,
        }
    }

    fn whole_match_as(mut self, key: &'static str) -> Self {
        self.whole_match_as = Some(key);
        self
    }

    fn transform(mut self, transform: fn(&str) -> String) -> Self {
        self.transform = Some(transform);
        self
    }

    fn apply(&self, text: &str, table: &mut RawFieldTable) {
        let mut matches = self.regex.captures_iter(text);
        let selected: Vec<regex::Captures<'_>> = match self.mode {
            MatchMode::First => matches.next().into_iter().collect(),
            MatchMode::Last => matches.last().into_iter().collect(),
            MatchMode::All => matches.collect(),
        };

        for caps in selected {
            if let (Some(key), Some(whole)) = (self.whole_match_as, caps.get(0)) {
                table.insert(key, whole.as_str().trim_end());
            }
            for name in self.regex.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    let value = match self.transform {
                        Some(transform) => transform(m.as_str()),
                        None => m.as_str().trim().to_string(),
                    };
                    table.insert(name, value);
                }
            }
        }
    }
}

fn trim_quotes(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}

// Optional `·! 0:00:01.234567 ` line prefix of newer logs.
const LINE_PREFIX: &str = r"(?:\S+ \d+:\d{2}:\d{2}\.\d+ )?";

static RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    use MatchMode::*;
    vec![
        FieldRule::new(
            r"(?m)RPCS3 v(?P<build_version>\d+(?:\.\d+)+)(?:-(?P<build_number>\d+))?-(?P<build_commit>[0-9a-f]+) (?P<build_stage>\w+) \| (?P<build_branch>[^|\r\n]+?)(?: \| Firmware version: (?P<fw_version_installed>[^|\r\n]+?))?(?: \| [^\r\n]*)?(?:\r?\n[^\r\n]*)?\r?$",
            First,
        )
        .whole_match_as(fields::BUILD_AND_SPECS),
        FieldRule::new(
            &format!(
                r"(?m)^{LINE_PREFIX}(?P<cpu_model>[^|@\r\n]+?)\s*(?:@\s*(?P<cpu_speed>[\d.]+)\s*GHz\s*)?\| (?P<thread_count>\d+) Threads \| (?P<memory_amount>[0-9.,]+) GiB RAM(?: \| (?P<cpu_extensions>[^\r\n]*?))?\r?$"
            ),
            First,
        ),
        FieldRule::new(r"(?m)SYS: Firmware version: (?P<fw_version_installed>[\d.]+)", Last),
        FieldRule::new(r"(?m)SYS: Title: (?P<game_title>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)SYS: Serial: (?P<serial>[A-Z]{4}\d{5})", Last),
        FieldRule::new(r"(?m)SYS: Category: (?P<game_category>[A-Z0-9]{2})\b", Last),
        FieldRule::new(
            r"(?m)SYS: Path: (?:(?P<win_path>[A-Za-z]:[/\\][^\r\n]*?)|(?P<lin_path>/[^\r\n]*?))\r?$",
            Last,
        ),
        FieldRule::new(
            r"(?m)(?:LDR|SYS): Game: [^\r\n]*/dev_hdd0/game/(?P<ldr_game_serial>[A-Z]{4}\d{5})",
            Last,
        ),
        FieldRule::new(
            r"(?P<rap_file>[A-Z]{2}\d{4}-[A-Z]{4}\d{5}_\d{2}-[A-Z0-9]{16}\.rap)",
            All,
        ),
        // Settings dump
        FieldRule::new(r"(?m)^\s*PPU Decoder: (?P<ppu_decoder>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)^\s*SPU Decoder: (?P<spu_decoder>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)^\s*SPU Threads: (?P<spu_threads>\d+)", Last),
        FieldRule::new(r"(?m)^\s*Preferred SPU Threads: (?P<spu_threads>\d+)", Last),
        FieldRule::new(r"(?m)^\s*SPU Secondary Cores: (?P<spu_secondary_cores>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)^\s*Thread Scheduler Mode: (?P<thread_scheduler>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)^\s*Accurate xfloat: (?P<accurate_xfloat>\w+)", Last),
        FieldRule::new(r"(?m)^\s*Lib Loader: (?P<lib_loader>[^\r\n]+?)\r?$", Last),
        FieldRule::new(
            r"(?m)^\s*Load libraries:(?P<library_list>(?:\r?\n\s+- [^\r\n]*)+|[ \t]*\[\])",
            Last,
        )
        .transform(str::to_string),
        FieldRule::new(r"(?m)^\s*Renderer: (?P<renderer>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)^\s*Resolution: (?P<resolution>\d+x\d+)", Last),
        FieldRule::new(r"(?m)^\s*Resolution Scale: (?P<resolution_scale>\d+)", Last),
        FieldRule::new(r"(?m)^\s*Strict Rendering Mode: (?P<strict_rendering_mode>\w+)", Last),
        FieldRule::new(r"(?m)^\s*Anisotropic Filter Override: (?P<af_override>\d+)", Last),
        FieldRule::new(r"(?m)^\s*Write Color Buffers: (?P<write_color_buffers>\w+)", Last),
        FieldRule::new(r"(?m)^\s*Disable Vertex Cache: (?P<vertex_cache>\w+)", Last),
        FieldRule::new(r"(?m)^\s*VSync: (?P<vsync>\w+)", Last),
        FieldRule::new(r"(?m)^\s*Frame limit: (?P<frame_limit>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)^\s*Vulkan:\r?\n\s+Adapter: (?P<vulkan_gpu>[^\r\n]*?)\r?$", Last)
            .transform(trim_quotes),
        FieldRule::new(r"(?m)^\s*D3D12:\r?\n\s+Adapter: (?P<d3d_gpu>[^\r\n]*?)\r?$", Last)
            .transform(trim_quotes),
        // GPU
        FieldRule::new(r"(?m)GL VENDOR: (?P<driver_manuf>[^\r\n]+?)\r?$", Last),
        FieldRule::new(r"(?m)GL RENDERER: (?P<driver_manuf_new>[^\r\n]+?)\r?$", Last),
        FieldRule::new(
            r"(?m)GL VERSION: (?P<opengl_version>\d+\.\d+)(?:\.\d+)?(?: [^\r\n]*? (?P<driver_version_new>\d+(?:\.\d+)+))?\r?$",
            Last,
        ),
        FieldRule::new(r"(?m)Driver version: (?P<driver_version>[^\r\n]+?)\r?$", Last),
        FieldRule::new(
            r"(?m)Found vulkan-compatible GPU: (?P<vulkan_found_device>'(?P<vulkan_compatible_device_name>[^'\r\n]+)' running on driver [^\r\n]+?)\r?$",
            All,
        ),
        FieldRule::new(
            r"(?m)Physical device in(?:i)?tialized\. GPU=(?P<vulkan_initialized_device>[^,\r\n]+), driver=(?P<vulkan_driver_version_raw>-?\d+)",
            Last,
        ),
    ]
});

/// Runs the rule table, plus the configured piracy triggers, over log text.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    piracy_triggers: Vec<String>,
}

impl FieldExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            piracy_triggers: config
                .piracy_triggers
                .iter()
                .filter(|t| !t.trim().is_empty())
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn extract(&self, text: &str) -> RawFieldTable {
        let mut table = RawFieldTable::new();
        for rule in RULES.iter() {
            rule.apply(text, &mut table);
        }
        if let Some(line) = self.piracy_line(text) {
            table.insert(fields::PIRACY_CONTEXT, line);
        }
        debug!("Extracted {} raw values", table.len());
        table
    }

    /// First log line containing a piracy trigger.
    fn piracy_line(&self, text: &str) -> Option<String> {
        if self.piracy_triggers.is_empty() {
            return None;
        }
        text.lines()
            .find(|line| {
                let lower = line.to_lowercase();
                self.piracy_triggers.iter().any(|t| lower.contains(t.as_str()))
            })
            .map(|line| line.trim().to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FULL_LOG;
    use super::*;

    fn extract(text: &str) -> RawFieldTable {
        FieldExtractor::default().extract(text)
    }

    #[test]
    fn test_build_banner() {
        let table = extract(FULL_LOG);
        assert_eq!(table.get(fields::BUILD_VERSION), Some("0.0.5"));
        assert_eq!(table.get(fields::BUILD_NUMBER), Some("7104"));
        assert_eq!(table.get(fields::BUILD_COMMIT), Some("a19113025"));
        assert_eq!(table.get(fields::BUILD_BRANCH), Some("HEAD"));
        assert_eq!(table.get(fields::FW_VERSION_INSTALLED), Some("4.84"));
        let build_and_specs = table.get(fields::BUILD_AND_SPECS).unwrap();
        assert!(build_and_specs.starts_with("RPCS3 v0.0.5-7104-a19113025 Alpha | HEAD"));
        assert!(build_and_specs.contains("12 Threads"));
    }

    #[test]
    fn test_banner_without_build_number() {
        let table = extract("RPCS3 v0.0.3-3-f4a8b1c Alpha | master\nAMD Ryzen 5 | 8 Threads | 8 GiB RAM\n");
        assert_eq!(table.get(fields::BUILD_VERSION), Some("0.0.3"));
        assert_eq!(table.get(fields::BUILD_NUMBER), Some("3"));
        assert_eq!(table.get(fields::BUILD_COMMIT), Some("f4a8b1c"));
        assert_eq!(table.get(fields::CPU_MODEL), Some("AMD Ryzen 5"));
        assert_eq!(table.get(fields::CPU_SPEED), None);
    }

    #[test]
    fn test_host_specs() {
        let table = extract(FULL_LOG);
        assert_eq!(table.get(fields::CPU_MODEL), Some("Intel(R) Core(TM) i7-8700K CPU"));
        assert_eq!(table.get(fields::CPU_SPEED), Some("3.70"));
        assert_eq!(table.get(fields::THREAD_COUNT), Some("12"));
        assert_eq!(table.get(fields::MEMORY_AMOUNT), Some("15.93"));
        assert_eq!(table.get("cpu_extensions"), Some("TSC: 3.696GHz | AVX+ | FMA3"));
    }

    #[test]
    fn test_last_match_wins() {
        let table = extract(FULL_LOG);
        assert_eq!(table.get(fields::SERIAL), Some("BLUS30443"));
        assert_eq!(table.get_all(fields::SERIAL), vec!["BLUS30443"]);
        assert_eq!(table.get(fields::GAME_TITLE), Some("Demon's Souls"));
        assert_eq!(table.get(fields::GAME_CATEGORY), Some("DG"));
        assert!(table.get(fields::WIN_PATH).unwrap().starts_with("C:\\Games"));
        assert_eq!(table.get(fields::LIN_PATH), None);
    }

    #[test]
    fn test_settings() {
        let table = extract(FULL_LOG);
        assert_eq!(table.get("ppu_decoder"), Some("Recompiler (LLVM)"));
        assert_eq!(table.get(fields::SPU_THREADS), Some("0"));
        assert_eq!(table.get(fields::THREAD_SCHEDULER), Some("Operating System"));
        assert_eq!(table.get(fields::STRICT_RENDERING_MODE), Some("true"));
        assert_eq!(table.get(fields::AF_OVERRIDE), Some("0"));
        assert_eq!(table.get(fields::VULKAN_GPU), Some("GeForce GTX 1070"));
        assert_eq!(table.get(fields::D3D_GPU), Some(""));
        let libs = table.get(fields::LIBRARY_LIST).unwrap();
        assert!(libs.contains("- libsysutil_np_trophy.sprx"));
        assert!(libs.contains("[libfs.sprx]"));
    }

    #[test]
    fn test_vulkan_devices_keep_every_match() {
        let table = extract(FULL_LOG);
        assert_eq!(table.get_all(fields::VULKAN_FOUND_DEVICE).len(), 3);
        assert_eq!(
            table.get_all(fields::VULKAN_COMPATIBLE_DEVICE_NAME),
            vec!["GeForce GTX 1070", "Intel(R) UHD Graphics 630", "GeForce GTX 1070"]
        );
        assert_eq!(table.get(fields::VULKAN_INITIALIZED_DEVICE), Some("GeForce GTX 1070"));
        assert_eq!(table.get(fields::VULKAN_DRIVER_VERSION_RAW), Some("1808728064"));
    }

    #[test]
    fn test_opengl_lines() {
        let table = extract(
            "GL VENDOR: NVIDIA Corporation\nGL RENDERER: GeForce GTX 1070/PCIe/SSE2\nGL VERSION: 4.6.0 NVIDIA 431.60\n",
        );
        assert_eq!(table.get(fields::DRIVER_MANUF), Some("NVIDIA Corporation"));
        assert_eq!(table.get(fields::DRIVER_MANUF_NEW), Some("GeForce GTX 1070/PCIe/SSE2"));
        assert_eq!(table.get(fields::OPENGL_VERSION), Some("4.6"));
        assert_eq!(table.get(fields::DRIVER_VERSION_NEW), Some("431.60"));
    }

    #[test]
    fn test_piracy_triggers() {
        let config = ExtractionConfig {
            piracy_triggers: vec!["Cracked by".to_string()],
        };
        let text = "SYS: Serial: BLUS30443\nLDR: patch: cracked BY someone\n";
        let table = FieldExtractor::new(&config).extract(text);
        assert_eq!(table.get(fields::PIRACY_CONTEXT), Some("LDR: patch: cracked BY someone"));

        assert!(!extract(text).contains_key(fields::PIRACY_CONTEXT));
    }

    #[test]
    fn test_rap_files_and_loader_serial() {
        let text = "LDR: Game: /dev_hdd0/game/NPEB01202/USRDIR/EBOOT.BIN\n\
                    SYS: Loaded EP0001-NPEB01202_00-ABCDEF0123456789.rap\n\
                    SYS: Loaded UP0001-NPUB30012_00-0123456789ABCDEF.rap\n";
        let table = extract(text);
        assert_eq!(table.get(fields::LDR_GAME_SERIAL), Some("NPEB01202"));
        assert_eq!(table.get_all(fields::RAP_FILE).len(), 2);
    }

    #[test]
    fn test_raw_table_order() {
        let mut table = RawFieldTable::new();
        table.insert("b", "1");
        table.insert("a", "2");
        table.insert("b", "3");
        assert_eq!(table.get("b"), Some("3"));
        assert_eq!(table.get_all("b"), vec!["1", "3"]);
        assert_eq!(table.keys(), vec!["b", "a"]);
    }
}
