//! Decide which rules of a snapshot rule tree are critical.

use serde::Deserialize;

use super::patterns::is_always_critical;

/// Kind of a rule in the snapshot tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    Style,
    Media,
    Import,
    Charset,
    FontFace,
    #[serde(other)]
    Other,
}

/// One rule as reported by the in-page snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleNode {
    pub kind: RuleKind,
    pub text: String,
    #[serde(default)]
    pub selector: Option<String>,
    /// Selector matched at least one visible element.
    #[serde(default)]
    pub matched: bool,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleNode>,
}

impl RuleNode {
    pub fn style(selector: &str, body: &str, matched: bool) -> Self {
        Self {
            kind: RuleKind::Style,
            text: format!("{selector} {{ {body} }}"),
            selector: Some(selector.to_string()),
            matched,
            condition: None,
            rules: Vec::new(),
        }
    }

    pub fn media(condition: &str, rules: Vec<RuleNode>) -> Self {
        Self {
            kind: RuleKind::Media,
            text: format!("@media {condition} {{}}"),
            selector: None,
            matched: false,
            condition: Some(condition.to_string()),
            rules,
        }
    }

    pub fn at_rule(kind: RuleKind, text: &str) -> Self {
        Self { kind, text: text.to_string(), selector: None, matched: false, condition: None, rules: Vec::new() }
    }
}

/// Kept rule texts plus counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub kept: Vec<String>,
    /// Leaf rules seen, media wrappers excluded.
    pub total_rules: u64,
    pub kept_rules: u64,
}

/// Walk `rules` in order, keeping critical ones.
pub fn classify(rules: &[RuleNode]) -> Classified {
    let mut out = Classified::default();
    for rule in rules {
        if let Some(text) = classify_rule(rule, &mut out) {
            out.kept.push(text);
        }
    }
    out
}

fn classify_rule(rule: &RuleNode, counts: &mut Classified) -> Option<String> {
    match rule.kind {
        RuleKind::Media => {
            let mut nested = Vec::new();
            for child in &rule.rules {
                if let Some(text) = classify_rule(child, counts) {
                    nested.push(text);
                }
            }
            if nested.is_empty() {
                return None;
            }
            let condition = rule.condition.as_deref().unwrap_or("all");
            Some(format!("@media {condition} {{\n  {}\n}}", nested.join("\n  ")))
        }
        RuleKind::Style => {
            counts.total_rules += 1;
            let selector = rule.selector.as_deref().unwrap_or_default();
            if rule.matched || is_always_critical(selector) {
                counts.kept_rules += 1;
                Some(rule.text.clone())
            } else {
                None
            }
        }
        RuleKind::Import | RuleKind::Charset | RuleKind::FontFace => {
            counts.total_rules += 1;
            counts.kept_rules += 1;
            Some(rule.text.clone())
        }
        RuleKind::Other => {
            counts.total_rules += 1;
            None
        }
    }
}
