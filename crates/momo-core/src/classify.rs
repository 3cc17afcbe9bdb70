//! Keyword-based title facets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleFacet {
    IsLive,
    IsMemberNamed,
    IsEvent,
    IsMv,
    IsDigest,
}

impl TitleFacet {
    pub const ALL: [TitleFacet; 5] = [
        TitleFacet::IsLive,
        TitleFacet::IsMemberNamed,
        TitleFacet::IsEvent,
        TitleFacet::IsMv,
        TitleFacet::IsDigest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TitleFacet::IsLive => "is_live",
            TitleFacet::IsMemberNamed => "is_member_named",
            TitleFacet::IsEvent => "is_event",
            TitleFacet::IsMv => "is_mv",
            TitleFacet::IsDigest => "is_digest",
        }
    }
}

/// Independent boolean facets for one title; any combination may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TitleFacets {
    pub is_live: bool,
    pub is_member_named: bool,
    pub is_event: bool,
    pub is_mv: bool,
    pub is_digest: bool,
}

impl TitleFacets {
    pub fn get(&self, facet: TitleFacet) -> bool {
        match facet {
            TitleFacet::IsLive => self.is_live,
            TitleFacet::IsMemberNamed => self.is_member_named,
            TitleFacet::IsEvent => self.is_event,
            TitleFacet::IsMv => self.is_mv,
            TitleFacet::IsDigest => self.is_digest,
        }
    }

    fn set(&mut self, facet: TitleFacet, value: bool) {
        let slot = match facet {
            TitleFacet::IsLive => &mut self.is_live,
            TitleFacet::IsMemberNamed => &mut self.is_member_named,
            TitleFacet::IsEvent => &mut self.is_event,
            TitleFacet::IsMv => &mut self.is_mv,
            TitleFacet::IsDigest => &mut self.is_digest,
        };
        *slot = value;
    }
}

/// One row of the keyword table: a facet is set when the title contains any
/// of the keywords, ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetRule {
    pub facet: TitleFacet,
    pub contains_any: Vec<String>,
}

impl FacetRule {
    pub fn new(facet: TitleFacet, keywords: &[&str]) -> Self {
        Self {
            facet,
            contains_any: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

pub fn default_facet_rules() -> Vec<FacetRule> {
    vec![
        FacetRule::new(TitleFacet::IsLive, &["ライブ", "LIVE", "live"]),
        FacetRule::new(
            TitleFacet::IsMemberNamed,
            &["百田", "玉井", "佐々木", "高城", "有安", "早見"],
        ),
        FacetRule::new(TitleFacet::IsEvent, &["イベント", "配信", "フェス", "ツアー"]),
        FacetRule::new(TitleFacet::IsMv, &["MV", "Music Video", "ミュージックビデオ"]),
        FacetRule::new(TitleFacet::IsDigest, &["ダイジェスト", "digest", "DIGEST"]),
    ]
}

#[derive(Debug, Clone)]
pub struct TitleClassifier {
    rules: Vec<FacetRule>,
}

impl Default for TitleClassifier {
    fn default() -> Self {
        Self::new(default_facet_rules())
    }
}

impl TitleClassifier {
    pub fn new(rules: Vec<FacetRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| FacetRule {
                facet: rule.facet,
                contains_any: rule
                    .contains_any
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[FacetRule] {
        &self.rules
    }

    pub fn classify(&self, title: &str) -> TitleFacets {
        let title = title.to_lowercase();
        let mut facets = TitleFacets::default();
        for rule in &self.rules {
            if rule.contains_any.iter().any(|needle| title.contains(needle.as_str())) {
                facets.set(rule.facet, true);
            }
        }
        facets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mv_and_live_are_not_exclusive() {
        let facets = TitleClassifier::default().classify("【MV】ライブ映像 2024");
        assert!(facets.is_mv);
        assert!(facets.is_live);
        assert!(!facets.is_digest);
    }

    #[test]
    fn matching_ignores_case() {
        let classifier = TitleClassifier::default();
        assert!(classifier.classify("Summer Tour Digest").is_digest);
        assert!(classifier.classify("music video premiere").is_mv);
        assert!(classifier.classify("Live at the Dome").is_live);
    }

    #[test]
    fn plain_title_sets_nothing() {
        let facets = TitleClassifier::default().classify("お知らせ");
        assert_eq!(facets, TitleFacets::default());
        for facet in TitleFacet::ALL {
            assert!(!facets.get(facet), "{}", facet.as_str());
        }
    }

    #[test]
    fn member_and_event_keywords() {
        let facets = TitleClassifier::default().classify("百田夏菜子 配信イベント");
        assert!(facets.is_member_named);
        assert!(facets.is_event);
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let classifier = TitleClassifier::new(vec![FacetRule::new(TitleFacet::IsEvent, &["Fes"])]);
        assert!(classifier.classify("Momo FES 2024").is_event);
        assert!(!classifier.classify("LIVE").is_live);
    }
}
