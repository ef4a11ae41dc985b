use crate::types::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Target-specific adjustments to how the scoring service should judge a
/// posting. Part of the profile because they describe the candidate's
/// strategy, not the posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringBias {
    /// Requested years of experience that count as a high match even when
    /// they sit below the candidate's own level.
    pub promote_experience_years: Vec<u32>,
    /// Free-text justification appended to the rule in the prompt.
    pub note: Option<String>,
}

/// The one candidate every posting is scored against. Loaded once at
/// startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub role: String,
    pub summary: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub experience_years: Option<u32>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub portfolio: Option<String>,
    #[serde(default)]
    pub scoring_bias: ScoringBias,
}

impl CandidateProfile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read profile {}: {}", path.display(), e)))?;
        let profile: CandidateProfile = serde_json::from_str(&content)
            .map_err(|e| AgentError::Config(format!("invalid profile {}: {}", path.display(), e)))?;
        info!("Loaded candidate profile for {}", profile.name);
        Ok(profile)
    }

    /// The profile as embedded in prompts: every field except the scoring
    /// bias, which becomes its own instruction.
    pub fn prompt_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("scoring_bias");
        }
        Ok(serde_json::to_string(&value)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_profile() -> CandidateProfile {
        CandidateProfile {
            name: "Alex Martin".to_string(),
            role: "Digital Marketing Strategist".to_string(),
            summary: "Growth marketer with 5 years in SaaS, based in France.".to_string(),
            skills: vec!["SEO".to_string(), "Automation".to_string()],
            achievements: vec!["Grew organic traffic 125%".to_string()],
            experience_years: Some(5),
            languages: vec!["English".to_string()],
            locations: vec!["France".to_string()],
            portfolio: None,
            scoring_bias: ScoringBias {
                promote_experience_years: vec![2, 3, 4],
                note: Some("Open to mid-level roles.".to_string()),
            },
        }
    }

    #[test]
    fn prompt_json_omits_scoring_bias() {
        let json = sample_profile().prompt_json().unwrap();
        assert!(json.contains("\"name\":\"Alex Martin\""));
        assert!(!json.contains("scoring_bias"));
    }

    #[test]
    fn minimal_profile_parses_with_defaults() {
        let profile: CandidateProfile =
            serde_json::from_str(r#"{"name": "A", "role": "B", "summary": "C"}"#).unwrap();
        assert!(profile.skills.is_empty());
        assert_eq!(profile.scoring_bias, ScoringBias::default());
    }

    #[test]
    fn missing_profile_file_is_a_config_error() {
        let result = CandidateProfile::from_file(Path::new("/nonexistent/profile.json"));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
