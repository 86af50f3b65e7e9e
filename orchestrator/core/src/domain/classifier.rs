// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Affinity Classifier
//!
//! Routes free-text task requests to an [`AgentKind`] without any I/O.
//!
//! ## Scoring pipeline
//! 1. Keyword tables per agent. Single words match whole tokens, phrases
//!    match the normalized text and score `phrase_multiplier` × weight.
//! 2. Contextual bonuses from structural cues (URLs, prices, mailboxes,
//!    page references, recurrence words).
//! 3. Health discount per agent.
//! 4. Primary/supporting selection against the admission threshold,
//!    complexity points and confidence.
//!
//! Ties are broken by [`AgentKind::ALL`] order so output is a pure function
//! of the text and the health view.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::domain::agent::AgentKind;
use crate::domain::health::{AgentHealthView, AllHealthy, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        })
    }
}

/// Per-agent evidence for one request. Never mutated after classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAffinityVector {
    /// Post-discount scores.
    pub scores: BTreeMap<AgentKind, f64>,
    /// Keyword and bonus scores before the health discount.
    pub raw_scores: BTreeMap<AgentKind, f64>,
    /// Terms and cues that contributed to each agent's score.
    pub evidence: BTreeMap<AgentKind, Vec<String>>,
    pub complexity: Complexity,
    /// 0..=100
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAssignment {
    pub primary: AgentKind,
    /// At most two, score-descending, never containing `primary`.
    pub supporting: Vec<AgentKind>,
    pub needs_multiple_agents: bool,
    /// No agent met the admission threshold and the default agent was used.
    pub fallback: bool,
    pub suggested_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub affinity: AgentAffinityVector,
    pub assignment: AgentAssignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum post-discount score for an agent to be selected.
    #[serde(default = "default_admission_threshold")]
    pub admission_threshold: f64,
    /// Primary scores below this recruit supporting agents.
    #[serde(default = "default_decisive_threshold")]
    pub decisive_threshold: f64,
    /// Confidence used when nothing scored at all.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: u8,
    #[serde(default = "default_agent")]
    pub default_agent: AgentKind,
    #[serde(default = "default_degraded_discount")]
    pub degraded_discount: f64,
    #[serde(default = "default_failing_discount")]
    pub failing_discount: f64,
    #[serde(default = "default_phrase_multiplier")]
    pub phrase_multiplier: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            admission_threshold: default_admission_threshold(),
            decisive_threshold: default_decisive_threshold(),
            fallback_confidence: default_fallback_confidence(),
            default_agent: default_agent(),
            degraded_discount: default_degraded_discount(),
            failing_discount: default_failing_discount(),
            phrase_multiplier: default_phrase_multiplier(),
        }
    }
}

impl ClassifierConfig {
    pub fn discount_for(&self, status: HealthStatus) -> f64 {
        match status {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => self.degraded_discount,
            HealthStatus::Failing => self.failing_discount,
        }
    }
}

fn default_admission_threshold() -> f64 {
    2.0
}

fn default_decisive_threshold() -> f64 {
    5.0
}

fn default_fallback_confidence() -> u8 {
    20
}

fn default_agent() -> AgentKind {
    AgentKind::Research
}

fn default_degraded_discount() -> f64 {
    0.85
}

fn default_failing_discount() -> f64 {
    0.6
}

fn default_phrase_multiplier() -> f64 {
    2.0
}

const CONFIDENCE_CAP_ON_FALLBACK: u8 = 50;

type Keywords = &'static [(&'static str, f64)];

const RESEARCH: Keywords = &[
    ("research", 3.0),
    ("investigate", 2.5),
    ("study", 2.0),
    ("information", 2.0),
    ("sources", 2.0),
    ("find", 1.5),
    ("search", 1.5),
    ("learn", 1.5),
    ("latest", 1.5),
    ("developments", 1.5),
    ("explore", 1.5),
    ("look up", 1.5),
    ("find out", 1.5),
    ("learn about", 1.5),
];

const NAVIGATION: Keywords = &[
    ("navigate", 3.0),
    ("visit", 2.5),
    ("open", 2.0),
    ("browse", 2.0),
    ("url", 2.0),
    ("website", 1.5),
    ("tab", 1.5),
    ("tabs", 1.5),
    ("link", 1.0),
    ("go to", 2.0),
    ("take me to", 2.5),
];

const SHOPPING: Keywords = &[
    ("buy", 3.0),
    ("shop", 3.0),
    ("shopping", 3.0),
    ("purchase", 3.0),
    ("price", 2.5),
    ("prices", 2.5),
    ("deal", 2.5),
    ("deals", 2.5),
    ("cheapest", 2.5),
    ("product", 2.0),
    ("products", 2.0),
    ("discount", 2.0),
    ("retailers", 2.0),
    ("cart", 2.0),
    ("best price", 2.0),
    ("compare prices", 2.5),
    ("add to cart", 2.5),
];

const COMMUNICATION: Keywords = &[
    ("email", 3.0),
    ("compose", 2.5),
    ("reply", 2.5),
    ("write", 2.0),
    ("message", 2.0),
    ("letter", 2.0),
    ("draft", 2.0),
    ("send", 1.5),
    ("professional", 1.0),
    ("meeting", 1.0),
    ("send an email", 2.0),
    ("write to", 1.5),
];

const AUTOMATION: Keywords = &[
    ("automate", 3.0),
    ("automation", 3.0),
    ("workflow", 2.5),
    ("schedule", 2.5),
    ("recurring", 2.0),
    ("trigger", 2.0),
    ("routine", 1.5),
    ("tasks", 1.0),
    ("process", 1.0),
    ("processing", 1.0),
    ("set up", 1.0),
];

const ANALYSIS: Keywords = &[
    ("analyze", 3.0),
    ("analyse", 3.0),
    ("analysis", 3.0),
    ("examine", 2.5),
    ("evaluate", 2.5),
    ("compare", 2.5),
    ("review", 2.0),
    ("insights", 2.0),
    ("summarize", 2.0),
    ("summary", 1.5),
    ("content", 1.0),
    ("data", 1.0),
    ("topics", 1.0),
    ("key points", 1.5),
];

fn keywords_for(agent: AgentKind) -> Keywords {
    match agent {
        AgentKind::Research => RESEARCH,
        AgentKind::Navigation => NAVIGATION,
        AgentKind::Shopping => SHOPPING,
        AgentKind::Communication => COMMUNICATION,
        AgentKind::Automation => AUTOMATION,
        AgentKind::Analysis => ANALYSIS,
    }
}

const URL_BONUS: f64 = 3.0;
const COMMERCE_BONUS: f64 = 2.5;
const MAILBOX_BONUS: f64 = 2.5;
const PAGE_BONUS: f64 = 2.5;
const RECURRENCE_BONUS: f64 = 2.0;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://|www\.)\S+|\b[a-z0-9-]+\.(?:com|org|net|io|dev|edu|gov|co|ai|app|uk|de)\b")
        .expect("valid url pattern")
});

static MAILBOX_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9._%+-]+@[a-z0-9.-]+").expect("valid mailbox pattern"));

static CURRENCY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[$€£¥]|\b\d+(?:\.\d+)?\s?(?:usd|eur|gbp|dollars|euros)\b").expect("valid currency pattern"));

const RETAILERS: &[&str] = &["amazon", "ebay", "walmart", "bestbuy", "best buy", "etsy", "aliexpress", "newegg", "costco"];
const PAGE_CUES: &[&str] = &["this page", "current page", "this webpage", "this article", "this site", "this tab"];
const RECURRENCE_WORDS: &[&str] = &["daily", "weekly", "monthly", "hourly", "nightly", "every", "automatically"];
const MAILBOX_WORDS: &[&str] = &["inbox", "mailbox"];

const COMPLEXITY_UP: &[&str] = &[
    "comprehensive",
    "detailed",
    "multiple",
    "several",
    "thorough",
    "extensive",
    "complex",
    "various",
    "in depth",
];
const COMPLEXITY_DOWN: &[&str] = &["simple", "quick", "quickly", "just", "only", "briefly", "single"];

/// Lowercased request text in the two shapes matching needs.
struct NormalizedText {
    lower: String,
    tokens: HashSet<String>,
    /// Tokens joined by single spaces and padded, for phrase lookups.
    spaced: String,
}

impl NormalizedText {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let ordered: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let spaced = format!(" {} ", ordered.join(" "));
        let tokens = ordered.iter().map(|t| t.to_string()).collect();
        Self { lower, tokens, spaced }
    }

    fn matches(&self, term: &str) -> bool {
        if term.contains(' ') {
            self.spaced.contains(&format!(" {term} "))
        } else {
            self.tokens.contains(term)
        }
    }

    fn char_len(&self) -> usize {
        self.lower.trim().chars().count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AffinityClassifier {
    config: ClassifierConfig,
}

impl AffinityClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify assuming every agent is healthy.
    pub fn classify(&self, text: &str) -> Classification {
        self.classify_with_health(text, &AllHealthy)
    }

    pub fn classify_with_health(&self, text: &str, health: &dyn AgentHealthView) -> Classification {
        if text.trim().is_empty() {
            return self.empty_classification();
        }

        let normalized = NormalizedText::new(text);
        let mut raw_scores = BTreeMap::new();
        let mut evidence: BTreeMap<AgentKind, Vec<String>> = BTreeMap::new();

        for agent in AgentKind::ALL {
            let mut score = 0.0;
            let hits = evidence.entry(agent).or_default();
            for (term, weight) in keywords_for(agent) {
                if normalized.matches(term) {
                    if term.contains(' ') {
                        score += weight * self.config.phrase_multiplier;
                        hits.push(format!("\"{term}\""));
                    } else {
                        score += weight;
                        hits.push((*term).to_string());
                    }
                }
            }
            raw_scores.insert(agent, score);
        }

        apply_contextual_bonuses(&normalized, &mut raw_scores, &mut evidence);

        let scores: BTreeMap<AgentKind, f64> = raw_scores
            .iter()
            .map(|(agent, raw)| (*agent, raw * self.config.discount_for(health.health_of(*agent))))
            .collect();

        let mut ranked: Vec<(AgentKind, f64)> = scores.iter().map(|(a, s)| (*a, *s)).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.ordinal().cmp(&b.0.ordinal()))
        });

        let threshold = self.config.admission_threshold;
        let active: Vec<(AgentKind, f64)> = ranked.iter().copied().filter(|(_, s)| *s >= threshold).collect();
        let total: f64 = scores.values().filter(|s| **s > 0.0).sum();

        let (primary, primary_score, fallback) = match active.first() {
            Some((agent, score)) => (*agent, *score, false),
            None => {
                let agent = self.config.default_agent;
                (agent, scores.get(&agent).copied().unwrap_or(0.0), true)
            }
        };

        let mut confidence = if total > 0.0 {
            (100.0 * primary_score / total).round().clamp(0.0, 100.0) as u8
        } else {
            self.config.fallback_confidence
        };
        if fallback {
            confidence = confidence.min(CONFIDENCE_CAP_ON_FALLBACK);
        }

        let supporting: Vec<AgentKind> = active
            .iter()
            .filter(|(agent, _)| *agent != primary)
            .take(2)
            .map(|(agent, _)| *agent)
            .collect();

        let complexity = complexity_for(&normalized, active.len());
        let needs_multiple_agents = !supporting.is_empty()
            && (complexity == Complexity::High || primary_score < self.config.decisive_threshold);

        Classification {
            affinity: AgentAffinityVector {
                scores,
                raw_scores,
                evidence,
                complexity,
                confidence,
            },
            assignment: AgentAssignment {
                primary,
                supporting,
                needs_multiple_agents,
                fallback,
                suggested_actions: primary.playbook().iter().map(|a| a.to_string()).collect(),
            },
        }
    }

    fn empty_classification(&self) -> Classification {
        let primary = self.config.default_agent;
        let zeros: BTreeMap<AgentKind, f64> = AgentKind::ALL.iter().map(|a| (*a, 0.0)).collect();
        Classification {
            affinity: AgentAffinityVector {
                scores: zeros.clone(),
                raw_scores: zeros,
                evidence: BTreeMap::new(),
                complexity: Complexity::Low,
                confidence: 0,
            },
            assignment: AgentAssignment {
                primary,
                supporting: Vec::new(),
                needs_multiple_agents: false,
                fallback: true,
                suggested_actions: primary.playbook().iter().map(|a| a.to_string()).collect(),
            },
        }
    }
}

fn apply_contextual_bonuses(
    text: &NormalizedText,
    scores: &mut BTreeMap<AgentKind, f64>,
    evidence: &mut BTreeMap<AgentKind, Vec<String>>,
) {
    let mut bonus = |agent: AgentKind, amount: f64, cue: &str| {
        *scores.entry(agent).or_insert(0.0) += amount;
        evidence.entry(agent).or_default().push(format!("+{cue}"));
    };

    // The domain half of an address is a mailbox cue, not a link.
    let without_addresses = MAILBOX_ADDRESS.replace_all(&text.lower, " ");
    if URL_PATTERN.is_match(&without_addresses) {
        bonus(AgentKind::Navigation, URL_BONUS, "url");
    }
    if CURRENCY_PATTERN.is_match(&text.lower) || RETAILERS.iter().any(|r| text.matches(r)) {
        bonus(AgentKind::Shopping, COMMERCE_BONUS, "commerce");
    }
    if text.lower.contains('@') || MAILBOX_WORDS.iter().any(|w| text.matches(w)) {
        bonus(AgentKind::Communication, MAILBOX_BONUS, "mailbox");
    }
    if PAGE_CUES.iter().any(|cue| text.matches(cue)) {
        bonus(AgentKind::Analysis, PAGE_BONUS, "page");
    }
    if RECURRENCE_WORDS.iter().any(|w| text.matches(w)) {
        bonus(AgentKind::Automation, RECURRENCE_BONUS, "recurrence");
    }
}

fn complexity_for(text: &NormalizedText, active_agents: usize) -> Complexity {
    let mut points: i32 = 0;

    points += match text.char_len() {
        n if n >= 200 => 2,
        n if n >= 80 => 1,
        _ => 0,
    };
    points += match active_agents {
        n if n >= 3 => 2,
        2 => 1,
        _ => 0,
    };
    points += COMPLEXITY_UP.iter().filter(|w| text.matches(w)).count() as i32;
    points -= COMPLEXITY_DOWN.iter().filter(|w| text.matches(w)).count() as i32;

    match points {
        p if p >= 4 => Complexity::High,
        p if p >= 2 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn classify(text: &str) -> Classification {
        AffinityClassifier::default().classify(text)
    }

    #[test]
    fn test_navigation_request_with_url() {
        let c = classify("go to example.com");
        assert_eq!(c.assignment.primary, AgentKind::Navigation);
        assert!(c.affinity.confidence >= 80);
        assert_eq!(c.affinity.complexity, Complexity::Low);
        assert!(!c.assignment.fallback);
        assert_eq!(c.affinity.scores[&AgentKind::Navigation], 7.0);
    }

    #[test]
    fn test_comprehensive_research_recruits_help() {
        let c = classify(
            "research comprehensive, detailed developments across multiple AI topics and compare with several sources",
        );
        assert_eq!(c.assignment.primary, AgentKind::Research);
        assert_eq!(c.affinity.complexity, Complexity::High);
        assert!(c.assignment.needs_multiple_agents);
        assert_eq!(c.assignment.supporting, vec![AgentKind::Analysis]);
    }

    #[test]
    fn test_routes_each_agent() {
        let cases = [
            ("research latest AI developments", AgentKind::Research),
            ("navigate to google.com and search for machine learning", AgentKind::Navigation),
            ("find best laptop deals", AgentKind::Shopping),
            ("analyze this page content", AgentKind::Analysis),
            ("compose professional email about meeting", AgentKind::Communication),
            ("automate daily workflow", AgentKind::Automation),
            (
                "Help me find the best deals on laptops and compare prices across different retailers",
                AgentKind::Shopping,
            ),
            (
                "Create an automation workflow for processing customer support tickets",
                AgentKind::Automation,
            ),
            (
                "Analyze the content of this webpage and provide insights about the key topics",
                AgentKind::Analysis,
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text).assignment.primary, expected, "{text}");
        }
    }

    #[test]
    fn test_empty_text_falls_back() {
        for text in ["", "   \n\t"] {
            let c = classify(text);
            assert_eq!(c.assignment.primary, AgentKind::Research);
            assert_eq!(c.affinity.confidence, 0);
            assert_eq!(c.affinity.complexity, Complexity::Low);
            assert!(c.assignment.fallback);
            assert!(c.assignment.supporting.is_empty());
        }
    }

    #[test]
    fn test_no_signal_uses_default_with_low_confidence() {
        let c = classify("hello there");
        assert!(c.assignment.fallback);
        assert_eq!(c.assignment.primary, AgentKind::Research);
        assert_eq!(c.affinity.confidence, 20);
    }

    #[test]
    fn test_weak_signal_confidence_capped() {
        // "find" alone scores below the admission threshold.
        let c = classify("find it");
        assert!(c.assignment.fallback);
        assert!(c.affinity.confidence <= 50);
    }

    #[test]
    fn test_words_match_on_boundaries_only() {
        // "shopkeeper" must not count as "shop".
        let c = classify("the shopkeeper said hello");
        assert_eq!(c.affinity.raw_scores[&AgentKind::Shopping], 0.0);
    }

    #[test]
    fn test_phrases_score_double() {
        let c = classify("take me to the docs");
        assert_eq!(c.affinity.raw_scores[&AgentKind::Navigation], 5.0);
        assert!(c.affinity.evidence[&AgentKind::Navigation].contains(&"\"take me to\"".to_string()));
    }

    #[test]
    fn test_bonuses_stack_across_agents() {
        let c = classify("email bob@example.org the $20 invoice daily");
        let ev = &c.affinity.evidence;
        assert!(ev[&AgentKind::Communication].contains(&"+mailbox".to_string()));
        assert!(ev[&AgentKind::Shopping].contains(&"+commerce".to_string()));
        assert!(ev[&AgentKind::Automation].contains(&"+recurrence".to_string()));
        assert!(!ev[&AgentKind::Navigation].contains(&"+url".to_string()));
    }

    #[test]
    fn test_email_address_is_not_a_link() {
        let c = classify("send to bob@example.com");
        assert_eq!(c.affinity.raw_scores[&AgentKind::Navigation], 0.0);
        assert_eq!(c.assignment.primary, AgentKind::Communication);
        assert!(!c.assignment.supporting.contains(&AgentKind::Navigation));

        let c = classify("email bob@example.com a link to www.example.com");
        assert!(c.affinity.evidence[&AgentKind::Navigation].contains(&"+url".to_string()));
    }

    #[test]
    fn test_deterministic() {
        let classifier = AffinityClassifier::default();
        let text = "compare prices on amazon and email the summary";
        let first = classifier.classify(text);
        for _ in 0..10 {
            assert_eq!(classifier.classify(text), first);
        }
    }

    #[test]
    fn test_ties_use_enumeration_order() {
        // research (3.0) and analyze (3.0) tie.
        let c = classify("research analyze");
        assert_eq!(c.assignment.primary, AgentKind::Research);
        assert_eq!(c.assignment.supporting, vec![AgentKind::Analysis]);
    }

    #[test]
    fn test_failing_agent_loses_close_call() {
        let classifier = AffinityClassifier::default();
        let text = "research and summarize the topic";
        assert_eq!(classifier.classify(text).assignment.primary, AgentKind::Research);

        let mut health = HashMap::new();
        health.insert(AgentKind::Research, HealthStatus::Failing);
        let c = classifier.classify_with_health(text, &health);
        assert_eq!(c.assignment.primary, AgentKind::Analysis);
        assert!((c.affinity.scores[&AgentKind::Research] - 1.8).abs() < 1e-9);
        assert_eq!(c.affinity.raw_scores[&AgentKind::Research], 3.0);
    }

    #[test]
    fn test_failing_agent_keeps_clear_win() {
        let classifier = AffinityClassifier::default();
        let mut health = HashMap::new();
        health.insert(AgentKind::Research, HealthStatus::Failing);
        let c = classifier.classify_with_health("research latest AI developments", &health);
        assert_eq!(c.assignment.primary, AgentKind::Research);
    }

    #[test]
    fn test_simple_words_lower_complexity() {
        let c = classify("just a quick simple search for comprehensive detailed multiple results");
        assert_eq!(c.affinity.complexity, Complexity::Low);
    }

    #[test]
    fn test_supporting_capped_at_two() {
        let c = classify("research, buy, email and automate the analysis");
        assert!(c.assignment.supporting.len() <= 2);
        assert!(!c.assignment.supporting.contains(&c.assignment.primary));
        assert!(c.assignment.needs_multiple_agents);
    }

    #[test]
    fn test_assignment_carries_playbook() {
        let c = classify("find best laptop deals");
        assert_eq!(
            c.assignment.suggested_actions,
            vec!["create_retailer_tabs", "compare_prices", "analyze_deals"]
        );
    }
}
