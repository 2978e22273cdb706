use super::version::{driver_major_minor, parse_lenient};
use crate::config::DiagnosticsConfig;
use crate::extract::driver_version::GpuVendor;
use crate::extract::fields::*;
use crate::extract::NormalizedFieldTable;

/// Independent checks over the normalized fields, each contributing at most
/// one `"<glyph> <message>"` line, in check order.
pub fn collect(fields: &NormalizedFieldTable, config: &DiagnosticsConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    warnings.extend(opengl_version(fields, config));
    warnings.extend(firmware_version(fields, config));
    warnings.extend(nvidia_driver(fields, config));
    warnings.extend(bogus_license(fields, config));
    warnings.extend(vertex_cache(fields, config));

    for hint in &config.feature_hints {
        if fields.get(&hint.field) == Some(hint.value.as_str()) {
            warnings.push(format!("{} {}", hint.glyph, hint.message));
        }
    }
    warnings
}

fn opengl_version(fields: &NormalizedFieldTable, config: &DiagnosticsConfig) -> Option<String> {
    let reported = fields.get(OPENGL_VERSION)?;
    let version = parse_lenient(reported)?;
    if version < parse_lenient(&config.min_opengl_version)? {
        Some(format!(
            "❌ GPU only supports OpenGL {}, which is below the minimum requirement of {}",
            reported, config.min_opengl_version
        ))
    } else if version < parse_lenient(&config.recommended_opengl_version)? {
        Some(format!(
            "⚠ GPU only supports OpenGL {}, {} or newer is recommended",
            reported, config.recommended_opengl_version
        ))
    } else {
        None
    }
}

fn firmware_version(fields: &NormalizedFieldTable, config: &DiagnosticsConfig) -> Option<String> {
    let installed = fields.get(FW_VERSION_INSTALLED)?;
    let version = parse_lenient(installed)?;
    (version < parse_lenient(&config.min_firmware_version)?).then(|| {
        format!(
            "⚠ Firmware version {} is below {}, please reinstall the latest firmware",
            installed, config.min_firmware_version
        )
    })
}

fn nvidia_driver(fields: &NormalizedFieldTable, config: &DiagnosticsConfig) -> Option<String> {
    let gpu = fields.get(GPU_INFO)?;
    if GpuVendor::detect(gpu) != GpuVendor::Nvidia {
        return None;
    }
    if !fields
        .get(RENDERER)
        .is_some_and(|r| r.eq_ignore_ascii_case("vulkan"))
    {
        return None;
    }
    let driver = driver_major_minor(fields.get(DRIVER_VERSION_INFO)?)?;
    let (low, high) = config.nvidia_bug_range;
    (low..=high).contains(&driver).then(|| {
        format!(
            "⚠ NVIDIA driver {} has known Vulkan rendering issues, {} is recommended",
            fields.get(DRIVER_VERSION_INFO).unwrap_or_default(),
            config.nvidia_recommended_driver
        )
    })
}

fn bogus_license(fields: &NormalizedFieldTable, config: &DiagnosticsConfig) -> Option<String> {
    let licenses = fields.get(RAP_FILE)?;
    let bogus = licenses.lines().find(|rap| {
        config
            .bogus_licenses
            .iter()
            .any(|known| known.eq_ignore_ascii_case(rap.trim()))
    })?;
    Some(format!(
        "❗ Known bogus license file `{}`, remove it and use a legal dump",
        bogus.trim()
    ))
}

fn vertex_cache(fields: &NormalizedFieldTable, config: &DiagnosticsConfig) -> Option<String> {
    let serial = fields.get(SERIAL)?;
    let listed = config
        .disable_vertex_cache_ids
        .iter()
        .any(|id| id.eq_ignore_ascii_case(serial));
    (listed && fields.get(VERTEX_CACHE) == Some(DISABLED_MARK))
        .then(|| "⚠ This title requires `Disable Vertex Cache` to be enabled".to_string())
}

/// Stable sort by the glyph before the first space; the piracy glyph goes
/// first and unknown glyphs last.
pub fn sort_by_priority(lines: &mut [String], priority: &[String], piracy_glyph: &str) {
    let rank = |line: &String| -> usize {
        let glyph = line.split(' ').next().unwrap_or_default();
        if glyph == piracy_glyph {
            return 0;
        }
        priority
            .iter()
            .position(|p| p == glyph)
            .map_or(usize::MAX, |i| i + 1)
    };
    lines.sort_by_key(rank);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{normalize, RawFieldTable};

    fn table(entries: &[(&str, &str)]) -> NormalizedFieldTable {
        let mut raw = RawFieldTable::new();
        for (key, value) in entries {
            raw.insert(*key, *value);
        }
        normalize(&raw)
    }

    #[test]
    fn test_opengl_levels() {
        let config = DiagnosticsConfig::default();
        let below_min = collect(&table(&[(OPENGL_VERSION, "4.1")]), &config);
        assert!(below_min[0].starts_with("❌"));

        let below_recommended = collect(&table(&[(OPENGL_VERSION, "4.3")]), &config);
        assert!(below_recommended[0].starts_with("⚠"));

        assert!(collect(&table(&[(OPENGL_VERSION, "4.6")]), &config).is_empty());
    }

    #[test]
    fn test_firmware() {
        let config = DiagnosticsConfig::default();
        let warnings = collect(&table(&[(FW_VERSION_INSTALLED, "4.75")]), &config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("4.75"));
        assert!(collect(&table(&[(FW_VERSION_INSTALLED, "4.84")]), &config).is_empty());
    }

    #[test]
    fn test_nvidia_bug_range() {
        let config = DiagnosticsConfig::default();
        let fields = table(&[
            (DRIVER_MANUF_NEW, "GeForce GTX 1070/PCIe/SSE2"),
            (DRIVER_VERSION_NEW, "431.60"),
            (RENDERER, "Vulkan"),
        ]);
        let warnings = collect(&fields, &config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("399.41"));

        let old_driver = table(&[
            (DRIVER_MANUF_NEW, "GeForce GTX 1070/PCIe/SSE2"),
            (DRIVER_VERSION_NEW, "398.82"),
            (RENDERER, "Vulkan"),
        ]);
        assert!(collect(&old_driver, &config).is_empty());

        let opengl = table(&[
            (DRIVER_MANUF_NEW, "GeForce GTX 1070/PCIe/SSE2"),
            (DRIVER_VERSION_NEW, "431.60"),
            (RENDERER, "OpenGL"),
        ]);
        assert!(collect(&opengl, &config).is_empty());
    }

    #[test]
    fn test_bogus_license() {
        let config = DiagnosticsConfig::default();
        let mut raw = RawFieldTable::new();
        raw.insert(RAP_FILE, "EP0001-NPEB01202_00-ABCDEF0123456789.rap");
        raw.insert(RAP_FILE, "UP0700-NPUB30932_00-NNKDLFULLGAMEPTB.rap");
        let warnings = collect(&normalize(&raw), &config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("❗"));
        assert!(warnings[0].contains("NNKDLFULLGAMEPTB"));
    }

    #[test]
    fn test_vertex_cache() {
        let config = DiagnosticsConfig::default();
        let warnings = collect(&table(&[(SERIAL, "NPEB00258"), (VERTEX_CACHE, "false")]), &config);
        assert_eq!(warnings.len(), 1);
        assert!(collect(&table(&[(SERIAL, "NPEB00258"), (VERTEX_CACHE, "true")]), &config).is_empty());
        assert!(collect(&table(&[(SERIAL, "BLUS30443"), (VERTEX_CACHE, "false")]), &config).is_empty());
    }

    #[test]
    fn test_feature_hints() {
        let config = DiagnosticsConfig::default();
        let warnings = collect(
            &table(&[("ppu_decoder", "Interpreter (fast)"), ("accurate_xfloat", "true")]),
            &config,
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("⚠ PPU decoder"));
        assert!(warnings[1].starts_with("ℹ"));
    }

    #[test]
    fn test_sort_by_priority() {
        let config = DiagnosticsConfig::default();
        let mut lines = vec![
            "ℹ info".to_string(),
            "no glyph".to_string(),
            "⚠ first warning".to_string(),
            format!("{} pirated", config.piracy_glyph),
            "❌ error".to_string(),
            "⚠ second warning".to_string(),
        ];
        sort_by_priority(&mut lines, &config.glyph_priority, &config.piracy_glyph);
        assert_eq!(
            lines,
            vec![
                format!("{} pirated", config.piracy_glyph),
                "❌ error".to_string(),
                "⚠ first warning".to_string(),
                "⚠ second warning".to_string(),
                "ℹ info".to_string(),
                "no glyph".to_string(),
            ]
        );
    }
}
