//! Token resolver: `$name$` placeholders in script text.
//!
//! Scripts are validated before anything runs. A script whose tokens are not
//! all supplied is refused outright; there is no partial substitution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$([A-Za-z0-9_.\-]+)\$").expect("valid token pattern"))
}

/// Token name to value. Keys are unique; the last insert wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; values in `other` win on collision.
    pub fn merged_with(mut self, other: &ParameterSet) -> Self {
        for (k, v) in other.iter() {
            self.values.insert(k.to_string(), v.to_string());
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Token names used anywhere in `instructions`.
pub fn find_tokens<S: AsRef<str>>(instructions: &[S]) -> BTreeSet<String> {
    instructions
        .iter()
        .flat_map(|line| {
            token_pattern()
                .captures_iter(line.as_ref())
                .map(|c| c[1].to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Required tokens that `params` does not supply, sorted.
pub fn validate(required: &BTreeSet<String>, params: &ParameterSet) -> BTreeSet<String> {
    required
        .iter()
        .filter(|name| !params.contains(name))
        .cloned()
        .collect()
}

/// Substitute every known token in one pass.
///
/// Substituted values are not re-scanned, so a value that itself looks like
/// `$other$` is inserted literally.
pub fn resolve<S: AsRef<str>>(instructions: &[S], params: &ParameterSet) -> Vec<String> {
    instructions
        .iter()
        .map(|line| resolve_line(line.as_ref(), params))
        .collect()
}

fn resolve_line(line: &str, params: &ParameterSet) -> String {
    token_pattern()
        .replace_all(line, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Report lines for missing tokens: `" - name"`, sorted ascending.
pub fn format_missing(missing: &BTreeSet<String>) -> Vec<String> {
    missing.iter().map(|name| format!(" - {name}")).collect()
}
