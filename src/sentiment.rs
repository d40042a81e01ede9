//! VADER polarity scoring for short community posts.

use serde_json::{json, Value as JsonValue};
use vader_sentiment::SentimentIntensityAnalyzer;


/// Posts scoring at or below this are treated as not credible.
const CREDIBILITY_FLOOR: f64 = -0.5;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarityScores {
    pub neg: f64,
    pub neu: f64,
    pub pos: f64,
    pub compound: f64,
}

impl PolarityScores {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "neg": self.neg,
            "neu": self.neu,
            "pos": self.pos,
            "compound": self.compound,
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateAnalysis {
    pub credible: bool,
    pub sentiment: PolarityScores,
}


pub fn polarity_scores(text: &str) -> PolarityScores {
    if text.trim().is_empty() {
        return PolarityScores { neg: 0.0, neu: 0.0, pos: 0.0, compound: 0.0 };
    }

    let analyzer = SentimentIntensityAnalyzer::new();
    let scores = analyzer.polarity_scores(text);
    let score = |name: &str| scores.get(name).cloned().unwrap_or_default();

    PolarityScores {
        neg: score("neg"),
        neu: score("neu"),
        pos: score("pos"),
        compound: score("compound"),
    }
}

/// Rates a community post; extremely negative posts are flagged as not
/// credible.
pub fn analyze_community_update(text: &str) -> UpdateAnalysis {
    let sentiment = polarity_scores(text);

    UpdateAnalysis {
        credible: sentiment.compound > CREDIBILITY_FLOOR,
        sentiment,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_post() {
        let result = analyze_community_update("Roads are clear and everyone is safe, thanks!");
        assert!(result.credible);
        assert!(result.sentiment.compound > 0.5);
        assert!(result.sentiment.pos > result.sentiment.neg);
    }

    #[test]
    fn alarmist_post_is_not_credible() {
        let result = analyze_community_update("Deadly attack!!! Everyone will die, horrible panic, kill");
        assert!(!result.credible);
        assert!(result.sentiment.compound < -0.9);
    }

    #[test]
    fn neutral_post() {
        let result = analyze_community_update("Bus 42 is running on the usual route");
        assert!(result.credible);
        assert_eq!(result.sentiment.compound, 0.0);
    }

    #[test]
    fn negation_flips_valence() {
        let plain = polarity_scores("the bridge is safe");
        let negated = polarity_scores("the bridge is not safe");

        assert!(plain.compound > 0.0);
        assert!(negated.compound < 0.0);
    }

    #[test]
    fn boosters_strengthen() {
        let plain = polarity_scores("the road is dangerous");
        let boosted = polarity_scores("the road is very dangerous");
        assert!(boosted.compound < plain.compound);
    }

    #[test]
    fn casualty_report_is_negative() {
        let result = analyze_community_update("Massive explosion downtown, many casualties, people killed");
        assert!(result.sentiment.compound < 0.0);
    }

    #[test]
    fn empty_text() {
        assert_eq!(polarity_scores("").compound, 0.0);
        assert!(analyze_community_update("").credible);
    }
}
