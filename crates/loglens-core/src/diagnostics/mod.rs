//! Rules evaluated over a normalized field table.

mod staleness;
mod version;
mod warnings;

pub use staleness::{is_outdated, same_commits, BuildInfo};
pub use version::parse_lenient;
pub use warnings::sort_by_priority;

use crate::config::{DiagnosticsConfig, StalenessConfig};
use crate::extract::fields::*;
use crate::extract::NormalizedFieldTable;
use crate::network::UpdateInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of evaluating one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticVerdict {
    pub is_piracy: bool,
    /// Latest release, when the log's build is older than it.
    pub outdated: Option<UpdateInfo>,
    /// Digital serial the disc serial was rewritten to.
    pub remapped_serial: Option<String>,
    pub warnings: Vec<String>,
}

impl DiagnosticVerdict {
    pub fn is_outdated(&self) -> bool {
        self.outdated.is_some()
    }
}

/// Stateless rule set; one instance serves any number of logs.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsEngine {
    config: DiagnosticsConfig,
    staleness: StalenessConfig,
}

impl DiagnosticsEngine {
    pub fn new(config: DiagnosticsConfig, staleness: StalenessConfig) -> Self {
        Self { config, staleness }
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// Evaluate every rule. A piracy signal short-circuits all others.
    ///
    /// The disc-to-digital remap rewrites `serial` and `game_category` in
    /// `fields`.
    pub fn evaluate(
        &self,
        fields: &mut NormalizedFieldTable,
        update: Option<&UpdateInfo>,
        now: DateTime<Utc>,
    ) -> DiagnosticVerdict {
        if fields.contains_key(PIRACY_CONTEXT) {
            info!("Piracy detected, skipping remaining diagnostics");
            return DiagnosticVerdict {
                is_piracy: true,
                warnings: vec![format!(
                    "{} {}",
                    self.config.piracy_glyph, self.config.piracy_advisory
                )],
                ..Default::default()
            };
        }

        let remapped_serial = self.remap_disc_serial(fields);

        let outdated = update.and_then(|update| {
            let build = fields.get(BUILD_AND_SPECS).and_then(BuildInfo::parse_banner)?;
            is_outdated(&build, update, &self.staleness, now).then(|| update.clone())
        });

        let mut warnings = warnings::collect(fields, &self.config);
        sort_by_priority(&mut warnings, &self.config.glyph_priority, &self.config.piracy_glyph);

        DiagnosticVerdict {
            is_piracy: false,
            outdated,
            remapped_serial,
            warnings,
        }
    }

    fn remap_disc_serial(&self, fields: &mut NormalizedFieldTable) -> Option<String> {
        let serial = fields.get(SERIAL)?;
        let psn_id = self
            .config
            .disc_to_psn
            .iter()
            .find(|(disc, _)| disc.eq_ignore_ascii_case(serial))
            .map(|(_, psn)| psn.clone())?;
        let loader_serial = fields.get(LDR_GAME_SERIAL)?;
        if !loader_serial.starts_with("NP") || !loader_serial.eq_ignore_ascii_case(&psn_id) {
            return None;
        }

        debug!("Remapping disc serial {} to {}", serial, psn_id);
        fields.insert(SERIAL, psn_id.clone());
        fields.insert(GAME_CATEGORY, "HG");
        Some(psn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{normalize, RawFieldTable};
    use chrono::Duration;

    fn fields(entries: &[(&str, &str)]) -> NormalizedFieldTable {
        let mut raw = RawFieldTable::new();
        for (key, value) in entries {
            raw.insert(*key, *value);
        }
        normalize(&raw)
    }

    fn update(release: DateTime<Utc>) -> UpdateInfo {
        UpdateInfo {
            latest_version: "0.0.5".to_string(),
            latest_build_number: Some(7200),
            latest_commit: "a19113025".to_string(),
            release_timestamp: release,
            current_build_timestamp: None,
            download_url: Some("https://example.com/rpcs3-v0.0.5-7200-a19113025_win64.7z".into()),
        }
    }

    #[test]
    fn test_piracy_short_circuits() {
        let engine = DiagnosticsEngine::default();
        let mut table = fields(&[
            (PIRACY_CONTEXT, "cracked by someone"),
            (OPENGL_VERSION, "3.0"),
            (BUILD_AND_SPECS, "RPCS3 v0.0.1-1-abcdef Alpha | HEAD"),
        ]);
        let now = Utc::now();
        let verdict = engine.evaluate(&mut table, Some(&update(now - Duration::days(30))), now);

        assert!(verdict.is_piracy);
        assert!(!verdict.is_outdated());
        assert_eq!(verdict.warnings.len(), 1);
        assert!(verdict.warnings[0].starts_with(&engine.config().piracy_glyph));
    }

    #[test]
    fn test_remap_fires_on_full_match() {
        let engine = DiagnosticsEngine::default();
        let mut table = fields(&[
            (SERIAL, "BLUS30443"),
            (GAME_CATEGORY, "DG"),
            (LDR_GAME_SERIAL, "NPUB30910"),
        ]);
        let verdict = engine.evaluate(&mut table, None, Utc::now());

        assert_eq!(verdict.remapped_serial.as_deref(), Some("NPUB30910"));
        assert_eq!(table.get(SERIAL), Some("NPUB30910"));
        assert_eq!(table.get(GAME_CATEGORY), Some("HG"));
    }

    #[test]
    fn test_remap_ignores_partial_matches() {
        let engine = DiagnosticsEngine::default();

        // Known disc, loader serial of another title.
        let mut other_loader = fields(&[(SERIAL, "BLUS30443"), (LDR_GAME_SERIAL, "NPUB99999")]);
        assert_eq!(engine.evaluate(&mut other_loader, None, Utc::now()).remapped_serial, None);
        assert_eq!(other_loader.get(SERIAL), Some("BLUS30443"));

        // Unknown disc, loader serial that is a known digital id.
        let mut unknown_disc = fields(&[(SERIAL, "BLES01234"), (LDR_GAME_SERIAL, "NPUB30910")]);
        assert_eq!(engine.evaluate(&mut unknown_disc, None, Utc::now()).remapped_serial, None);
        assert_eq!(unknown_disc.get(SERIAL), Some("BLES01234"));

        // Known disc without a loader serial.
        let mut no_loader = fields(&[(SERIAL, "BLUS30443")]);
        assert_eq!(engine.evaluate(&mut no_loader, None, Utc::now()).remapped_serial, None);
    }

    #[test]
    fn test_staleness_end_to_end() {
        let engine = DiagnosticsEngine::default();
        let now = Utc::now();
        let banner = "RPCS3 v0.0.5-7104-a19113025 Alpha | HEAD";

        let mut fresh = fields(&[(BUILD_AND_SPECS, banner)]);
        let verdict = engine.evaluate(&mut fresh, Some(&update(now - Duration::hours(2))), now);
        assert!(!verdict.is_outdated());

        let mut stale = fields(&[(BUILD_AND_SPECS, banner)]);
        let verdict = engine.evaluate(&mut stale, Some(&update(now - Duration::days(3))), now);
        assert!(verdict.is_outdated());
        assert_eq!(verdict.outdated.unwrap().latest_build_number, Some(7200));
    }

    #[test]
    fn test_without_update_info() {
        let engine = DiagnosticsEngine::default();
        let mut table = fields(&[(BUILD_AND_SPECS, "RPCS3 v0.0.1-1-abcdef Alpha | HEAD")]);
        let verdict = engine.evaluate(&mut table, None, Utc::now());
        assert!(!verdict.is_outdated());
        assert!(!verdict.is_piracy);
    }

    #[test]
    fn test_warnings_are_sorted() {
        let engine = DiagnosticsEngine::default();
        let mut table = fields(&[
            ("accurate_xfloat", "true"),
            (FW_VERSION_INSTALLED, "4.70"),
            (OPENGL_VERSION, "4.0"),
        ]);
        let verdict = engine.evaluate(&mut table, None, Utc::now());
        let glyphs: Vec<&str> = verdict
            .warnings
            .iter()
            .map(|w| w.split(' ').next().unwrap())
            .collect();
        assert_eq!(glyphs, vec!["❌", "⚠", "ℹ"]);
    }
}
