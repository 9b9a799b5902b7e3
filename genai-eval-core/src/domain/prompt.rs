use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^\s{}]+)\}").expect("placeholder pattern is valid"))
}

/// A prompt with `{name}` placeholders.
///
/// `variables` holds the placeholders that are still unfilled. Assembly never fails:
/// placeholders without a supplied value stay in the text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub template: String,
    pub variables: BTreeSet<String>,
}

/// A piece of a template: literal text or a placeholder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    Placeholder(String),
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = extract_placeholders(&template);
        Self {
            template,
            variables,
        }
    }

    /// Substitute the supplied names, leaving every other placeholder in place.
    pub fn assemble(&self, values: &HashMap<String, String>) -> PromptTemplate {
        self.assemble_with(|name| values.get(name).cloned())
    }

    /// Like [`assemble`](Self::assemble), resolving each unfilled placeholder through `lookup`.
    pub fn assemble_with<F>(&self, mut lookup: F) -> PromptTemplate
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut remaining = self.variables.clone();
        let mut filled: HashMap<String, String> = HashMap::new();
        for name in &self.variables {
            if let Some(value) = lookup(name) {
                remaining.remove(name);
                filled.insert(name.clone(), value);
            }
        }

        let template = placeholder_regex()
            .replace_all(&self.template, |caps: &regex::Captures<'_>| {
                filled
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        PromptTemplate {
            template,
            variables: remaining,
        }
    }

    pub fn is_fully_assembled(&self) -> bool {
        self.variables.is_empty()
    }

    /// Split the template into literal text and placeholders, in order.
    pub fn segments(&self) -> Vec<TemplateSegment> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder_regex().captures_iter(&self.template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !self.variables.contains(name.as_str()) {
                continue;
            }
            if whole.start() > last {
                segments.push(TemplateSegment::Literal(
                    self.template[last..whole.start()].to_string(),
                ));
            }
            segments.push(TemplateSegment::Placeholder(name.as_str().to_string()));
            last = whole.end();
        }
        if last < self.template.len() {
            segments.push(TemplateSegment::Literal(self.template[last..].to_string()));
        }
        segments
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        PromptTemplate::new(template)
    }
}

/// Unique `{name}` placeholders of a template string.
pub fn extract_placeholders(template: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
