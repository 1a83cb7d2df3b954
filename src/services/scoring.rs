//! Scoring engine.
//!
//! Two independent, deterministic operations: additive rule scoring of a
//! single response, and keyword-based theme extraction over a set of
//! proposals. Neither touches the clock, random ids, or hash-map iteration
//! order, so identical inputs always produce identical output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::models::{Implementation, Proposal, Theme};

/// Label of the synthetic theme returned when no keyword matches.
pub const FALLBACK_THEME: &str = "Balanced approach";

/// Confidence assigned to the fallback theme.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Static signals extracted from a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAnalysis {
    pub syntax_valid: bool,
    pub has_comments: bool,
    pub uses_required_signals: bool,
    /// Length in characters of the trimmed body.
    pub length: usize,
}

/// Analyze a response body.
///
/// `syntax_valid` means non-empty with balanced `()`, `[]` and `{}` outside
/// double-quoted and backtick string literals. `uses_required_signals` is
/// false when no signals are required.
pub fn analyze_code(text: &str, required_signals: &[String]) -> CodeAnalysis {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    CodeAnalysis {
        syntax_valid: !trimmed.is_empty() && brackets_balanced(trimmed),
        has_comments: ["//", "/*", "#", "<!--"]
            .iter()
            .any(|marker| trimmed.contains(marker)),
        uses_required_signals: required_signals
            .iter()
            .map(|s| s.trim().to_lowercase())
            .any(|s| !s.is_empty() && lower.contains(&s)),
        length: trimmed.chars().count(),
    }
}

fn brackets_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }

    quote.is_none() && stack.is_empty()
}

/// A single boolean or range check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum RuleCheck {
    SyntaxValid,
    HasComments,
    UsesRequiredSignals,
    /// Inclusive character-length band.
    LengthInRange { min: usize, max: usize },
    /// Strictly below the latency bound.
    LatencyBelow { ms: u64 },
}

impl RuleCheck {
    fn passes(&self, analysis: &CodeAnalysis, latency_ms: u64) -> bool {
        match self {
            Self::SyntaxValid => analysis.syntax_valid,
            Self::HasComments => analysis.has_comments,
            Self::UsesRequiredSignals => analysis.uses_required_signals,
            Self::LengthInRange { min, max } => (*min..=*max).contains(&analysis.length),
            Self::LatencyBelow { ms } => latency_ms < *ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub name: String,
    pub points: u32,
    pub check: RuleCheck,
}

impl ScoringRule {
    pub fn new(name: impl Into<String>, points: u32, check: RuleCheck) -> Self {
        Self {
            name: name.into(),
            points,
            check,
        }
    }
}

/// Ordered list of additive rules plus the signals `UsesRequiredSignals` looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRuleset {
    pub rules: Vec<ScoringRule>,
    #[serde(default)]
    pub required_signals: Vec<String>,
}

impl Default for ScoringRuleset {
    fn default() -> Self {
        Self {
            rules: vec![
                ScoringRule::new("valid syntax", 10, RuleCheck::SyntaxValid),
                ScoringRule::new("uses required signal", 15, RuleCheck::UsesRequiredSignals),
                ScoringRule::new(
                    "length in band",
                    10,
                    RuleCheck::LengthInRange { min: 100, max: 1000 },
                ),
                ScoringRule::new("fast response", 5, RuleCheck::LatencyBelow { ms: 5000 }),
                ScoringRule::new("has comments", 5, RuleCheck::HasComments),
            ],
            required_signals: Vec::new(),
        }
    }
}

impl ScoringRuleset {
    pub fn with_required_signals(mut self, signals: Vec<String>) -> Self {
        self.required_signals = signals;
        self
    }

    /// Highest score any response can reach.
    pub fn max_points(&self) -> u32 {
        self.rules.iter().map(|r| r.points).sum()
    }

    /// Analyze and score a body in one pass.
    pub fn evaluate(&self, text: &str, latency_ms: u64) -> (CodeAnalysis, u32) {
        let analysis = analyze_code(text, &self.required_signals);
        let points = self
            .rules
            .iter()
            .filter(|rule| rule.check.passes(&analysis, latency_ms))
            .map(|rule| rule.points)
            .sum();
        (analysis, points)
    }
}

/// The parts of a response that scoring looks at.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub text: &'a str,
    pub latency_ms: u64,
}

impl<'a> From<&'a Proposal> for ScoreInput<'a> {
    fn from(proposal: &'a Proposal) -> Self {
        Self {
            text: &proposal.text,
            latency_ms: proposal.latency_ms,
        }
    }
}

impl<'a> From<&'a Implementation> for ScoreInput<'a> {
    fn from(implementation: &'a Implementation) -> Self {
        Self {
            text: &implementation.code,
            latency_ms: implementation.generation_time_ms,
        }
    }
}

/// Additive score of one response under the ruleset.
pub fn score<'a>(input: impl Into<ScoreInput<'a>>, ruleset: &ScoringRuleset) -> u32 {
    let input = input.into();
    ruleset.evaluate(input.text, input.latency_ms).1
}

/// Implementations ordered best first: successful before failed, then by
/// score descending. The sort is stable, so ties keep roster order.
pub fn rank_implementations(implementations: &[Implementation]) -> Vec<&Implementation> {
    let mut ranked: Vec<&Implementation> = implementations.iter().collect();
    ranked.sort_by(|a, b| {
        b.is_success()
            .cmp(&a.is_success())
            .then(b.total_score.cmp(&a.total_score))
    });
    ranked
}

/// Highest-scoring successful implementation, first in roster order on ties.
pub fn select_winner(implementations: &[Implementation]) -> Option<&Implementation> {
    rank_implementations(implementations)
        .into_iter()
        .next()
        .filter(|i| i.is_success())
}

/// Ordered theme label -> keywords table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTable {
    entries: Vec<(String, Vec<String>)>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a theme. Keywords are matched case-insensitively.
    pub fn with_theme<I, S>(mut self, label: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.entries.push((label.into(), keywords));
        self
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new()
            .with_theme("MVP-first", ["mvp", "minimal", "simple", "core", "essential", "lean"])
            .with_theme(
                "full-featured",
                ["complete", "comprehensive", "full", "feature-rich", "extensive", "robust"],
            )
            .with_theme("API-first", ["api", "endpoint", "rest", "graphql", "interface", "contract"])
            .with_theme(
                "security-first",
                ["secure", "security", "auth", "encryption", "validation", "permission"],
            )
            .with_theme(
                "performance-focused",
                ["fast", "performance", "cache", "optimize", "latency", "scalable"],
            )
            .with_theme(
                "user-centric",
                ["user", "ux", "accessible", "intuitive", "usability", "design"],
            )
    }
}

/// Cluster proposals into themes by keyword overlap.
///
/// A proposal supports a theme when at least one of the theme's keywords
/// appears in its text; its hit count is the number of distinct keywords
/// found. Theme score is the sum of supporters' hit counts. Themes are sorted
/// by score descending, then label ascending. When nothing matches, a single
/// fallback theme covering every proposal is returned. An empty input yields
/// no themes.
pub fn extract_themes(proposals: &[Proposal], table: &KeywordTable) -> Vec<Theme> {
    if proposals.is_empty() {
        return Vec::new();
    }

    let lowered: Vec<String> = proposals.iter().map(|p| p.text.to_lowercase()).collect();
    let total = proposals.len() as f64;

    let mut themes: Vec<Theme> = table
        .entries
        .iter()
        .filter_map(|(label, keywords)| {
            let mut supporters = Vec::new();
            let mut raw_score = 0u32;

            for (proposal, text) in proposals.iter().zip(&lowered) {
                let hits = keywords
                    .iter()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .filter(|k| text.contains(k.as_str()))
                    .count() as u32;
                if hits > 0 {
                    supporters.push(proposal.worker_id.clone());
                    raw_score += hits;
                }
            }

            (raw_score > 0).then(|| Theme {
                label: label.clone(),
                supporting_worker_ids: supporters,
                raw_score,
                confidence: (f64::from(raw_score) / total).min(1.0),
            })
        })
        .collect();

    if themes.is_empty() {
        return vec![Theme {
            label: FALLBACK_THEME.to_string(),
            supporting_worker_ids: proposals.iter().map(|p| p.worker_id.clone()).collect(),
            raw_score: 0,
            confidence: FALLBACK_CONFIDENCE,
        }];
    }

    themes.sort_by(|a, b| b.raw_score.cmp(&a.raw_score).then_with(|| a.label.cmp(&b.label)));
    themes
}
