use std::collections::{BTreeMap, BTreeSet};

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A label selector in the Kubernetes string syntax, e.g.
/// `app=reviews,version!=v1,env in (prod, staging),!canary`.
///
/// The empty selector matches everything.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{selector:?} can not be processed as selector: empty requirement")]
    EmptyRequirement { selector: String },

    #[error("{selector:?} can not be processed as selector: invalid label key {key:?}")]
    InvalidKey { selector: String, key: String },

    #[error("{selector:?} can not be processed as selector: invalid label value {value:?}")]
    InvalidValue { selector: String, value: String },

    #[error("{selector:?} can not be processed as selector: unexpected {found:?}")]
    UnexpectedToken { selector: String, found: String },

    #[error("{selector:?} can not be processed as selector: unbalanced parentheses")]
    Unbalanced { selector: String },
}

const MAX_VALUE_LEN: usize = 63;

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Parses a selector string.
    pub fn parse(selector: &str) -> Result<Self, ParseError> {
        let mut exprs = Expressions::new();
        for term in split_requirements(selector)? {
            exprs.push(Expression::parse(selector, term)?);
        }
        if exprs.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::from_expressions(exprs))
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.iter().all(|m| m.is_empty())
            && self.match_expressions.iter().all(|e| e.is_empty())
    }

    pub fn matches(&self, labels: &Map) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }
}

impl std::str::FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

/// Splits a selector on the commas that are not enclosed in a value set.
fn split_requirements(selector: &str) -> Result<Vec<&str>, ParseError> {
    if selector.trim().is_empty() {
        return Ok(vec![]);
    }

    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| ParseError::Unbalanced {
                    selector: selector.to_string(),
                })?;
            }
            ',' if depth == 0 => {
                terms.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced {
            selector: selector.to_string(),
        });
    }
    terms.push(&selector[start..]);
    Ok(terms)
}

// === Expression ===

impl Expression {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.into_iter().collect(),
        }
    }

    fn parse(selector: &str, term: &str) -> Result<Self, ParseError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(ParseError::EmptyRequirement {
                selector: selector.to_string(),
            });
        }

        if let Some(key) = term.strip_prefix('!') {
            let key = parse_key(selector, key.trim())?;
            return Ok(Self::new(key, Operator::DoesNotExist, None::<String>));
        }

        let key_end = term
            .find(|c: char| c == '=' || c == '!' || c.is_whitespace())
            .unwrap_or(term.len());
        let key = parse_key(selector, &term[..key_end])?;
        let rest = term[key_end..].trim_start();

        if rest.is_empty() {
            return Ok(Self::new(key, Operator::Exists, None::<String>));
        }

        if let Some(value) = rest
            .strip_prefix("==")
            .or_else(|| rest.strip_prefix('='))
        {
            let value = parse_value(selector, value.trim())?;
            return Ok(Self::new(key, Operator::In, Some(value)));
        }

        if let Some(value) = rest.strip_prefix("!=") {
            let value = parse_value(selector, value.trim())?;
            return Ok(Self::new(key, Operator::NotIn, Some(value)));
        }

        let (operator, set) = if let Some(set) = strip_keyword(rest, "notin") {
            (Operator::NotIn, set)
        } else if let Some(set) = strip_keyword(rest, "in") {
            (Operator::In, set)
        } else {
            return Err(ParseError::UnexpectedToken {
                selector: selector.to_string(),
                found: rest.to_string(),
            });
        };

        let values = parse_set(selector, set)?;
        Ok(Self::new(key, operator, values))
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => match labels.get(&self.key) {
                Some(v) => self.values.contains(v),
                None => false,
            },
            Operator::NotIn => match labels.get(&self.key) {
                Some(v) => !self.values.contains(v),
                None => true,
            },
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

fn strip_keyword<'t>(rest: &'t str, keyword: &str) -> Option<&'t str> {
    let tail = rest.strip_prefix(keyword)?;
    if tail.starts_with('(') || tail.starts_with(char::is_whitespace) {
        return Some(tail.trim_start());
    }
    None
}

fn parse_set(selector: &str, set: &str) -> Result<Vec<String>, ParseError> {
    let inner = set
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| ParseError::UnexpectedToken {
            selector: selector.to_string(),
            found: set.to_string(),
        })?;

    inner
        .split(',')
        .map(|v| parse_value(selector, v.trim()))
        .collect()
}

fn parse_key(selector: &str, key: &str) -> Result<String, ParseError> {
    let invalid = || ParseError::InvalidKey {
        selector: selector.to_string(),
        key: key.to_string(),
    };

    // An optional DNS prefix followed by a name segment.
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        let valid = !prefix.is_empty()
            && prefix.len() <= 253
            && prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
        if !valid {
            return Err(invalid());
        }
    }
    if name.is_empty() || !is_label_segment(name) {
        return Err(invalid());
    }
    Ok(key.to_string())
}

fn parse_value(selector: &str, value: &str) -> Result<String, ParseError> {
    if value.is_empty() || is_label_segment(value) {
        return Ok(value.to_string());
    }
    Err(ParseError::InvalidValue {
        selector: selector.to_string(),
        value: value.to_string(),
    })
}

fn is_label_segment(s: &str) -> bool {
    let alnum = |c: char| c.is_ascii_alphanumeric();
    s.len() <= MAX_VALUE_LEN
        && s.starts_with(alnum)
        && s.ends_with(alnum)
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Map {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Map::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                labels([("foo", "bar")]),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                labels([("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::In,
                    Some("bar".to_string()),
                ))),
                labels([("foo", "bar"), ("bah", "baz")]),
                true,
                "expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::NotIn,
                    Some("bar".to_string()),
                ))),
                labels([("foo", "bar")]),
                false,
                "excluded value",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn parses_equality() {
        let sel = Selector::parse("app=reviews, version==v2").expect("must parse");
        assert!(sel.matches(&labels([
            ("app", "reviews"),
            ("version", "v2")
        ])));
        assert!(!sel.matches(&labels([("app", "reviews")])));
    }

    #[test]
    fn parses_inequality() {
        let sel = Selector::parse("version!=v1").expect("must parse");
        assert!(sel.matches(&labels([("version", "v2")])));
        assert!(sel.matches(&Map::default()));
        assert!(!sel.matches(&labels([("version", "v1")])));
    }

    #[test]
    fn parses_sets() {
        let sel = Selector::parse("env in (prod, staging),tier notin (db)").expect("must parse");
        assert!(sel.matches(&labels([("env", "prod"), ("tier", "web")])));
        assert!(sel.matches(&labels([("env", "staging")])));
        assert!(!sel.matches(&labels([("env", "prod"), ("tier", "db")])));
        assert!(!sel.matches(&labels([("env", "dev")])));
    }

    #[test]
    fn parses_existence() {
        let sel = Selector::parse("app,!canary").expect("must parse");
        assert!(sel.matches(&labels([("app", "x")])));
        assert!(!sel.matches(&labels([("app", "x"), ("canary", "true")])));
        assert!(!sel.matches(&Map::default()));
    }

    #[test]
    fn parses_prefixed_keys() {
        let sel = Selector::parse("app.kubernetes.io/name=istiod").expect("must parse");
        assert!(sel.matches(&labels([(
            "app.kubernetes.io/name",
            "istiod"
        )])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = Selector::parse("  ").expect("must parse");
        assert!(sel.is_empty());
        assert!(sel.matches(&labels([("a", "b")])));
    }

    #[test]
    fn rejects_malformed() {
        for input in [
            "app=$$",
            "a$b=c",
            "app=reviews,",
            "env in (prod",
            "env in prod",
            "env > 3",
            "/name=x",
        ] {
            assert!(Selector::parse(input).is_err(), "{input:?} must not parse");
        }
    }

    #[test]
    fn error_names_the_selector() {
        let err = Selector::parse("app=$").expect_err("must not parse");
        assert!(err.to_string().contains("can not be processed as selector"));
        assert!(err.to_string().contains("app=$"));
    }
}
