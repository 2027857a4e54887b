use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single lease option value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl OptionValue {
    /// Interpret a raw command-line value: `true`/`false`, then a finite
    /// number, else text. `nan` and `inf` stay text since JSON cannot carry them.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(b) = raw.parse::<bool>() {
            OptionValue::Bool(b)
        } else if let Some(n) = raw.parse::<f64>().ok().filter(|n| n.is_finite()) {
            OptionValue::Number(n)
        } else {
            OptionValue::Text(raw.to_string())
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Number(n) => write!(f, "{}", n),
            OptionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<f64> for OptionValue {
    fn from(n: f64) -> Self {
        OptionValue::Number(n)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

/// Open-ended option map attached to a lease. Keys are unique; order is irrelevant.
///
/// Values are typed: asking for a flag that holds text yields `None`
/// instead of a silently wrong answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LeaseOptions(BTreeMap<String, OptionValue>);

impl LeaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) -> Option<OptionValue> {
        self.0.insert(key.to_string(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(OptionValue::as_bool)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(OptionValue::as_number)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OptionValue::as_str)
    }

    /// True only when `key` holds the boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.bool(key).unwrap_or(false)
    }

    /// Keys of every option set to boolean `true`, in key order.
    pub fn enabled_flags(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, v)| matches!(v, OptionValue::Bool(true)))
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, OptionValue)> for LeaseOptions {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse a `key=value` assignment as given on the command line.
pub fn parse_assignment(raw: &str) -> anyhow::Result<(String, OptionValue)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("option '{}' must have the form key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("option '{}' has an empty key", raw);
    }
    Ok((key.to_string(), OptionValue::parse(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_reject_mismatch() {
        let mut opts = LeaseOptions::new();
        opts.insert("cheats", true);
        opts.insert("tick_rate", 60.0);
        opts.insert("master", "https://example.invalid");

        assert_eq!(opts.bool("cheats"), Some(true));
        assert_eq!(opts.bool("master"), None);
        assert_eq!(opts.number("tick_rate"), Some(60.0));
        assert_eq!(opts.str("tick_rate"), None);
        assert_eq!(opts.str("master"), Some("https://example.invalid"));
        assert!(!opts.flag("missing"));
    }

    #[test]
    fn enabled_flags_only_lists_true_booleans() {
        let mut opts = LeaseOptions::new();
        opts.insert("b_mod", true);
        opts.insert("a_mod", true);
        opts.insert("off_mod", false);
        opts.insert("a_mod_version", "1.2.0");

        let flags: Vec<&str> = opts.enabled_flags().collect();
        assert_eq!(flags, vec!["a_mod", "b_mod"]);
    }

    #[test]
    fn json_shape_is_a_plain_map() {
        let mut opts = LeaseOptions::new();
        opts.insert("insecure", false);
        opts.insert("tick_rate", 30.0);
        opts.insert("version", "v1");

        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"insecure": false, "tick_rate": 30.0, "version": "v1"})
        );
        let back: LeaseOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn parse_assignment_infers_type() {
        assert_eq!(
            parse_assignment("cheats=true").unwrap(),
            ("cheats".to_string(), OptionValue::Bool(true))
        );
        assert_eq!(
            parse_assignment("tick_rate=60").unwrap(),
            ("tick_rate".to_string(), OptionValue::Number(60.0))
        );
        assert_eq!(
            parse_assignment("mods=a,b").unwrap(),
            ("mods".to_string(), OptionValue::Text("a,b".to_string()))
        );
        assert_eq!(
            parse_assignment("x=inf").unwrap(),
            ("x".to_string(), OptionValue::Text("inf".to_string()))
        );
        assert_eq!(OptionValue::parse("NaN"), OptionValue::Text("NaN".to_string()));
        assert_eq!(OptionValue::parse("-infinity"), OptionValue::Text("-infinity".to_string()));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }
}
