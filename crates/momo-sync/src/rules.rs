use std::path::Path;

use anyhow::{bail, Context, Result};
use momo_core::{FacetRule, TitleClassifier};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
struct FacetRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<FacetRule>,
}

pub fn parse_facet_rules(text: &str) -> Result<Vec<FacetRule>> {
    let file: FacetRulesFile = serde_yaml::from_str(text).context("parsing facet rules")?;
    if file.rules.is_empty() {
        bail!("facet rules file declares no rules");
    }
    Ok(file.rules)
}

/// Classifier from the YAML keyword table at `path`, or the built-in table
/// when no file exists there.
pub fn load_classifier(path: &Path) -> Result<TitleClassifier> {
    if !path.exists() {
        debug!(path = %path.display(), "no facet rules file; using built-in keywords");
        return Ok(TitleClassifier::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let rules = parse_facet_rules(&text).with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), rules = rules.len(), "loaded facet rules");
    Ok(TitleClassifier::new(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use momo_core::TitleFacet;

    #[test]
    fn yaml_rules_drive_the_classifier() {
        let rules = parse_facet_rules(
            r#"
version: 1
rules:
  - facet: is_mv
    contains_any: ["Music Clip"]
  - facet: is_digest
    contains_any: ["まとめ"]
"#,
        )
        .unwrap();
        let classifier = TitleClassifier::new(rules);
        let facets = classifier.classify("New music clip まとめ");
        assert!(facets.get(TitleFacet::IsMv));
        assert!(facets.get(TitleFacet::IsDigest));
        assert!(!facets.get(TitleFacet::IsLive));
    }

    #[test]
    fn unknown_facets_are_rejected() {
        let err = parse_facet_rules(
            "version: 1\nrules:\n  - facet: is_cover\n    contains_any: [cover]\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("is_cover"));
    }

    #[test]
    fn missing_file_falls_back_to_builtin_table() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = load_classifier(&dir.path().join("absent.yaml")).unwrap();
        assert!(classifier.classify("【LIVE】").get(TitleFacet::IsLive));
    }

    #[test]
    fn shipped_rules_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rules/title_facets.yaml");
        let classifier = load_classifier(&path).unwrap();
        assert_eq!(classifier.rules().len(), TitleFacet::ALL.len());
    }
}
