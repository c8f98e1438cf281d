use crate::cleaner::clean;
use crate::error::ConfigError;
use crate::models::{Confidence, Containment, MatchPolicy, MatchResult, Segment};
use std::collections::BTreeSet;

impl MatchPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.threshold));
        }

        let bands_in_range = (0.0..=1.0).contains(&self.medium_band)
            && (0.0..=1.0).contains(&self.high_band);
        if !bands_in_range || self.medium_band > self.high_band {
            return Err(ConfigError::Bands {
                medium: self.medium_band,
                high: self.high_band,
            });
        }

        Ok(())
    }

    pub fn confidence(&self, score: f64) -> Confidence {
        if score >= self.high_band {
            Confidence::High
        } else if score >= self.medium_band {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Fraction of `keywords` found in the cleaned segment text.
pub fn score(keywords: &BTreeSet<String>, segment: &Segment, containment: Containment) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }

    let cleaned = clean(&segment.text);
    let hits = match containment {
        Containment::Substring => keywords
            .iter()
            .filter(|keyword| cleaned.contains(keyword.as_str()))
            .count(),
        Containment::TokenBoundary => {
            let tokens = cleaned.split_whitespace().collect::<BTreeSet<_>>();
            keywords
                .iter()
                .filter(|keyword| tokens.contains(keyword.as_str()))
                .count()
        }
    };

    hits as f64 / keywords.len() as f64
}

/// Highest scoring segment at or above the policy threshold. Equal scores
/// keep the earliest segment.
pub fn best_match(
    keywords: &BTreeSet<String>,
    segments: &[Segment],
    policy: &MatchPolicy,
) -> Option<MatchResult> {
    if keywords.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, segment) in segments.iter().enumerate() {
        let value = score(keywords, segment, policy.containment);
        if best.map_or(true, |(_, top)| value > top) {
            best = Some((index, value));
        }
    }

    let (index, top) = best?;
    if top < policy.threshold {
        return None;
    }

    Some(MatchResult {
        segment: segments[index].clone(),
        score: top,
        confidence: policy.confidence(top),
    })
}
