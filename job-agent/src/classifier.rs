use crate::llm_adapter::LlmAdapter;
use crate::notifier::Markup;
use crate::profile::CandidateProfile;
use crate::types::{Outcome, Posting, Result, Verdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shape the scoring service is asked to answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    /// Free text; a skip marker anywhere means "do not report".
    #[default]
    Text,
    /// A `{score, decision, message}` object; anything unparsable is a skip.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Match percentage at which a posting switches to the high-match shape.
    pub threshold: u8,
    pub skip_marker: String,
    pub style: ResponseStyle,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 50,
            skip_marker: "SKIP".to_string(),
            style: ResponseStyle::Text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StructuredReply {
    #[serde(default)]
    score: Option<f64>,
    decision: String,
    #[serde(default)]
    message: String,
}

/// Scores postings against the candidate profile through an LLM.
///
/// Read-only: it never touches the seen set, and an adapter failure is
/// reported as `Outcome::Failed` for the pipeline to treat as a skip.
pub struct RelevanceClassifier {
    profile: Arc<CandidateProfile>,
    profile_json: String,
    adapter: Arc<dyn LlmAdapter>,
    config: ClassifierConfig,
    markup: Markup,
}

impl RelevanceClassifier {
    pub fn new(
        profile: Arc<CandidateProfile>,
        adapter: Arc<dyn LlmAdapter>,
        config: ClassifierConfig,
        markup: Markup,
    ) -> Result<Self> {
        let profile_json = profile.prompt_json()?;
        info!("Classifier using {} (threshold {}%)", adapter.adapter_name(), config.threshold);
        Ok(Self {
            profile,
            profile_json,
            adapter,
            config,
            markup,
        })
    }

    pub async fn classify(&self, posting: &Posting, detail: &str) -> Outcome<Verdict> {
        let prompt = self.build_prompt(posting, detail);
        debug!("Classifying {} ({} prompt chars)", posting.id, prompt.len());

        match self.adapter.complete(&prompt).await {
            Ok(reply) => {
                let verdict = self.interpret(&reply);
                info!(
                    "Scored {:?}: {:?} (score {:?})",
                    posting.title, verdict.decision, verdict.score
                );
                Outcome::Ok(verdict)
            }
            Err(e) => {
                warn!("Scoring failed for {}: {}", posting.id, e);
                Outcome::failed(e)
            }
        }
    }

    /// Deterministic prompt for one posting.
    pub fn build_prompt(&self, posting: &Posting, detail: &str) -> String {
        let bold = |text: &str| self.markup.bold(text);
        let threshold = self.config.threshold;
        let marker = &self.config.skip_marker;

        let mut lines = vec![
            format!("ACT AS: A career coach for {}.", self.profile.name),
            String::new(),
            "CONTEXT:".to_string(),
            format!("Candidate profile: {}", self.profile_json),
            String::new(),
            "JOB TO ANALYZE:".to_string(),
            format!("Title: {}", posting.title),
        ];
        if let Some(company) = &posting.company {
            lines.push(format!("Company: {}", company));
        }
        if let Some(location) = &posting.location {
            lines.push(format!("Location: {}", location));
        }
        let detail = detail.trim();
        if detail.is_empty() {
            lines.push("Description snippet: (not available, judge from the title)".to_string());
        } else {
            lines.push(format!("Description snippet:\n{}", detail));
        }
        lines.push(String::new());
        lines.push("TASK:".to_string());
        lines.push("1. Rate the match from 0 to 100.".to_string());

        let mut step = 2;
        let bias = &self.profile.scoring_bias;
        if !bias.promote_experience_years.is_empty() {
            let years = bias
                .promote_experience_years
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let mut rule = format!(
                "{}. EXPERIENCE RULE: If the job asks for {} years of experience, treat it as a HIGH MATCH.",
                step, years
            );
            if let Some(note) = &bias.note {
                rule.push(' ');
                rule.push_str(note);
            }
            lines.push(rule);
            step += 1;
        }

        let high_match = format!(
            "🔥 {score}\n{role} {title}\n\n💡 {why} [one sentence summary]\n\n🏹 {hook}\n\"[two sentences using the candidate's quantified achievements to solve their problem]\"\n\n❓ {prep}\n\"Be ready to answer: [hardest technical question]\"",
            score = bold("MATCH SCORE: [score]%"),
            role = bold("Role:"),
            title = posting.title,
            why = bold("Why you match:"),
            hook = bold("The Hook:"),
            prep = bold("Interview Prep:"),
        );

        match self.config.style {
            ResponseStyle::Text => {
                lines.push(format!(
                    "{}. If the match is below {}%, output ONLY \"{}: \" followed by a one-line reason it does not fit.",
                    step, threshold, marker
                ));
                lines.push(format!(
                    "{}. If the match is {}% or higher, write a notification in exactly this format:",
                    step + 1,
                    threshold
                ));
            }
            ResponseStyle::Json => {
                lines.push(format!(
                    "{}. Reply with ONLY a JSON object: {{\"score\": <0-100>, \"decision\": \"notify\" or \"skip\", \"message\": <text>}}.",
                    step
                ));
                lines.push(format!(
                    "{}. Use \"skip\" when the match is below {}% and make the message a one-line reason it does not fit.",
                    step + 1,
                    threshold
                ));
                lines.push(format!(
                    "{}. Otherwise use \"notify\" and make the message a notification in exactly this format:",
                    step + 2
                ));
            }
        }
        lines.push(String::new());
        lines.push(high_match);

        let mut prompt = lines.join("\n");
        prompt.push('\n');
        prompt
    }

    /// Turn the service's reply into a verdict. The score is taken at face
    /// value; only the skip decision drives behaviour.
    pub fn interpret(&self, reply: &str) -> Verdict {
        match self.config.style {
            ResponseStyle::Text => self.interpret_text(reply),
            ResponseStyle::Json => self.interpret_json(reply),
        }
    }

    fn interpret_text(&self, reply: &str) -> Verdict {
        let reply = reply.trim();
        let score = parse_score(reply);

        match reply.find(self.config.skip_marker.as_str()) {
            Some(index) => {
                let reason = reply[index + self.config.skip_marker.len()..]
                    .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
                    .trim();
                Verdict::skip(score, reason)
            }
            None => Verdict::notify(score, reply),
        }
    }

    fn interpret_json(&self, reply: &str) -> Verdict {
        let parsed = json_object(reply).and_then(|object| serde_json::from_str::<StructuredReply>(object).ok());

        let Some(parsed) = parsed else {
            warn!("Could not parse structured scoring reply; treating as skip");
            return Verdict::skip(None, "Could not parse scoring reply.");
        };

        let score = parsed.score.map(|s| s.clamp(0.0, 100.0).round() as u8);
        if parsed.decision.trim().eq_ignore_ascii_case("notify") && !parsed.message.trim().is_empty() {
            Verdict::notify(score, parsed.message.trim())
        } else {
            Verdict::skip(score, parsed.message.trim())
        }
    }
}

/// Best-effort read of "MATCH SCORE: NN%" from a free-text reply.
fn parse_score(reply: &str) -> Option<u8> {
    const LABEL: &str = "MATCH SCORE";
    let upper = reply.to_uppercase();
    let start = upper.find(LABEL)? + LABEL.len();
    let digits: String = upper[start..]
        .chars()
        .take(24)
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok().map(|score| score.min(100) as u8)
}

/// The outermost `{...}` span of a reply, tolerating code fences and chatter.
fn json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmAdapter;
    use crate::profile::tests::sample_profile;
    use crate::types::Decision;

    fn classifier(adapter: MockLlmAdapter, style: ResponseStyle) -> RelevanceClassifier {
        RelevanceClassifier::new(
            Arc::new(sample_profile()),
            Arc::new(adapter),
            ClassifierConfig {
                style,
                ..ClassifierConfig::default()
            },
            Markup::Markdown,
        )
        .unwrap()
    }

    fn posting(title: &str) -> Posting {
        Posting::new("https://jobs.example.com/1", title, "https://jobs.example.com/1", "Marketing")
    }

    #[test]
    fn prompt_embeds_profile_posting_and_rules() {
        let classifier = classifier(MockLlmAdapter::new("unused"), ResponseStyle::Text);
        let prompt = classifier.build_prompt(&posting("Growth Marketer"), "Scale our SEO.");

        assert!(prompt.contains("\"name\":\"Alex Martin\""));
        assert!(prompt.contains("Title: Growth Marketer"));
        assert!(prompt.contains("Description snippet:\nScale our SEO."));
        assert!(prompt.contains("asks for 2, 3, 4 years of experience, treat it as a HIGH MATCH. Open to mid-level roles."));
        assert!(prompt.contains("below 50%, output ONLY \"SKIP: \""));
        assert!(prompt.contains("*MATCH SCORE: [score]%*"));
        assert_eq!(prompt, classifier.build_prompt(&posting("Growth Marketer"), "Scale our SEO."));
    }

    #[test]
    fn prompt_sections_and_steps_are_laid_out_in_order() {
        let classifier = classifier(MockLlmAdapter::new("unused"), ResponseStyle::Json);
        let prompt = classifier.build_prompt(&posting("Growth Marketer"), "");

        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines[0], "ACT AS: A career coach for Alex Martin.");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "CONTEXT:");
        assert!(prompt.contains("\n\nJOB TO ANALYZE:\nTitle: Growth Marketer\n"));
        assert!(prompt.contains("\n\nTASK:\n1. Rate the match from 0 to 100.\n2. EXPERIENCE RULE:"));

        let steps: Vec<&str> = lines
            .iter()
            .filter_map(|line| line.split_once(". ").map(|(step, _)| step))
            .filter(|step| step.chars().all(|c| c.is_ascii_digit()))
            .collect();
        assert_eq!(steps, vec!["1", "2", "3", "4", "5"]);
        assert!(prompt.ends_with("[hardest technical question]\"\n"));
    }

    #[test]
    fn prompt_notes_missing_description() {
        let classifier = classifier(MockLlmAdapter::new("unused"), ResponseStyle::Text);
        let prompt = classifier.build_prompt(&posting("Growth Marketer"), "   ");
        assert!(prompt.contains("(not available, judge from the title)"));
    }

    #[test]
    fn text_reply_with_marker_is_a_skip() {
        let classifier = classifier(MockLlmAdapter::new("unused"), ResponseStyle::Text);
        let verdict = classifier.interpret("SKIP: requires fluent German");
        assert_eq!(verdict.decision, Decision::Skip);
        assert_eq!(verdict.message, "requires fluent German");
    }

    #[test]
    fn text_reply_without_marker_is_reported_verbatim() {
        let classifier = classifier(MockLlmAdapter::new("unused"), ResponseStyle::Text);
        let reply = "🔥 *MATCH SCORE: 85%*\n*Role:* Growth Marketer";
        let verdict = classifier.interpret(reply);
        assert_eq!(verdict, Verdict::notify(Some(85), reply));
    }

    #[test]
    fn json_reply_is_parsed_and_garbage_is_a_skip() {
        let classifier = classifier(MockLlmAdapter::new("unused"), ResponseStyle::Json);

        let verdict = classifier.interpret("```json\n{\"score\": 72, \"decision\": \"notify\", \"message\": \"Great fit\"}\n```");
        assert_eq!(verdict, Verdict::notify(Some(72), "Great fit"));

        let verdict = classifier.interpret("I think this is a great role!");
        assert_eq!(verdict.decision, Decision::Skip);
    }

    #[tokio::test]
    async fn adapter_failure_is_reported_as_failed() {
        let classifier = classifier(MockLlmAdapter::new("silent"), ResponseStyle::Text);
        let outcome = classifier.classify(&posting("Growth Marketer"), "").await;
        assert!(matches!(outcome, Outcome::Failed(_)));
    }

    #[tokio::test]
    async fn classify_routes_reply_through_interpretation() {
        let adapter = MockLlmAdapter::new("scripted").reply_otherwise("MATCH SCORE: 40%\nSKIP - too junior");
        let classifier = classifier(adapter, ResponseStyle::Text);
        let outcome = classifier.classify(&posting("Intern"), "").await;
        assert_eq!(outcome, Outcome::Ok(Verdict::skip(Some(40), "too junior")));
    }

    #[test]
    fn score_parsing_is_lenient() {
        assert_eq!(parse_score("**Match Score: 77%**"), Some(77));
        assert_eq!(parse_score("MATCH SCORE: 140%"), Some(100));
        assert_eq!(parse_score("no score here"), None);
    }
}
