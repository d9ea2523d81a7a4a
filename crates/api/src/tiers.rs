//! Predefined `ModelTier` registry (§3): every tier ships the same three
//! logical artifacts, rooted at a configurable base URL.

use engine::{ArtifactSpec, ModelTier, Tier};

const ARTIFACT_NAMES: [&str; 3] = ["model.safetensors", "tokenizer.json", "config.json"];

/// Builds the tier whose artifacts live at `{base_url}/{tier}/{fileName}`.
pub fn model_tier(tier: Tier, base_url: &str) -> ModelTier {
    let base_url = base_url.trim_end_matches('/');
    let folder_name = tier.as_str().to_string();

    let artifacts = ARTIFACT_NAMES
        .iter()
        .map(|name| ArtifactSpec {
            file_name: name.to_string(),
            url: format!("{base_url}/{}/{name}", tier.as_str()),
        })
        .collect();

    ModelTier {
        tier,
        folder_name,
        artifacts,
    }
}

pub fn all_tiers(base_url: &str) -> Vec<ModelTier> {
    [Tier::Low, Tier::Medium, Tier::High]
        .into_iter()
        .map(|t| model_tier(t, base_url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_tier_builds_three_artifacts_under_base_url() {
        let tier = model_tier(Tier::Low, "https://cdn.example.com/models/");
        assert_eq!(tier.artifacts.len(), 3);
        assert_eq!(tier.folder_name, "low");
        assert!(tier.artifacts.iter().all(|a| a
            .url
            .starts_with("https://cdn.example.com/models/low/")));
    }

    #[test]
    fn all_tiers_covers_low_medium_high() {
        let tiers = all_tiers("https://cdn.example.com/models");
        let names: Vec<_> = tiers.iter().map(|t| t.folder_name.clone()).collect();
        assert_eq!(names, vec!["low", "medium", "high"]);
    }
}
