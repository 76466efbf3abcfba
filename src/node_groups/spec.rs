//! Parsing of user supplied node group specs.
//!
//! Two forms are accepted: explicit `<min>:<max>:<name>` triples and
//! `label:<key>=<value>,...` auto discovery selectors.

use crate::error::{Error, Result};
use std::collections::HashMap;

pub const LABEL_AUTO_DISCOVERY_PREFIX: &str = "label:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySpec {
    Explicit(ExplicitSpec),
    LabelSelector(LabelSelector),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitSpec {
    pub min_size: u64,
    pub max_size: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    pub selector: HashMap<String, String>,
}

impl LabelSelector {
    /// True when `tags` contain every key of the selector with an equal value.
    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        !self.selector.is_empty()
            && self
                .selector
                .iter()
                .all(|(key, value)| tags.get(key) == Some(value))
    }
}

/// Parses explicit and auto discovery specs, preserving their order.
pub fn parse_discovery_specs<E, A>(explicit: &[E], auto_discovery: &[A]) -> Result<Vec<DiscoverySpec>>
where
    E: AsRef<str>,
    A: AsRef<str>,
{
    let explicit = explicit
        .iter()
        .map(|spec| parse_explicit(spec.as_ref()).map(DiscoverySpec::Explicit));
    let auto_discovery = auto_discovery
        .iter()
        .map(|spec| parse_label_spec(spec.as_ref()).map(DiscoverySpec::LabelSelector));

    explicit.chain(auto_discovery).collect()
}

pub fn parse_explicit(spec: &str) -> Result<ExplicitSpec> {
    let malformed = |reason: &str| Error::MalformedSpec {
        spec: spec.into(),
        reason: reason.into(),
    };

    let fields: Vec<&str> = spec.split(':').collect();
    let (min, max, name) = match fields.as_slice() {
        [min, max, name] => (min, max, name),
        _ => return Err(malformed("expected <min>:<max>:<name>")),
    };

    let min_size: u64 = min
        .parse()
        .map_err(|_| malformed("min size must be a non-negative integer"))?;
    let max_size: u64 = max
        .parse()
        .map_err(|_| malformed("max size must be a non-negative integer"))?;

    if max_size <= min_size {
        return Err(malformed("max size must be greater than min size"));
    }

    if name.is_empty() {
        return Err(malformed("name must not be empty"));
    }

    Ok(ExplicitSpec {
        min_size,
        max_size,
        name: (*name).into(),
    })
}

pub fn parse_label_specs<S: AsRef<str>>(specs: &[S]) -> Result<Vec<LabelSelector>> {
    specs
        .iter()
        .map(|spec| parse_label_spec(spec.as_ref()))
        .collect()
}

pub fn parse_label_spec(spec: &str) -> Result<LabelSelector> {
    let pairs = spec
        .strip_prefix(LABEL_AUTO_DISCOVERY_PREFIX)
        .ok_or_else(|| Error::UnsupportedDiscoveryPrefix(spec.into()))?;

    let mut selector = HashMap::new();
    for pair in pairs.split(',') {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                (key.trim(), value.trim())
            }
            _ => {
                return Err(Error::InvalidSelectorPair {
                    spec: spec.into(),
                    pair: pair.into(),
                })
            }
        };

        selector.insert(key.to_owned(), value.to_owned());
    }

    Ok(LabelSelector { selector })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(pairs: &[(&str, &str)]) -> LabelSelector {
        LabelSelector {
            selector: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn explicit_spec() {
        assert_eq!(
            parse_explicit("1:15:test-asg").unwrap(),
            ExplicitSpec {
                min_size: 1,
                max_size: 15,
                name: "test-asg".into()
            }
        );
        assert_eq!(parse_explicit("0:1:a").unwrap().min_size, 0);
    }

    #[test]
    fn malformed_explicit_specs() {
        for spec in &[
            "",
            "1:15",
            "1:15:a:b",
            "-1:15:a",
            "one:15:a",
            "1:x:a",
            "15:15:a",
            "15:1:a",
            "1:15:",
        ] {
            assert!(
                matches!(parse_explicit(spec), Err(Error::MalformedSpec { .. })),
                "{:?} should be rejected",
                spec
            );
        }
    }

    #[test]
    fn label_specs() {
        let actual = parse_label_specs(&[
            "label:cluster-autoscaler-enabled=true,cluster-autoscaler-name=fake-cluster",
            "label:test-tag=test-value,another-test-tag=another-test-value",
        ])
        .unwrap();

        assert_eq!(
            actual,
            vec![
                selector(&[
                    ("cluster-autoscaler-enabled", "true"),
                    ("cluster-autoscaler-name", "fake-cluster"),
                ]),
                selector(&[
                    ("test-tag", "test-value"),
                    ("another-test-tag", "another-test-value"),
                ]),
            ]
        );
    }

    #[test]
    fn label_spec_prefix_is_required() {
        for spec in &[
            "test-tag=test-value,another-test-tag",
            "invalid:test-tag=test-value,another-test-tag",
        ] {
            assert!(matches!(
                parse_label_spec(spec),
                Err(Error::UnsupportedDiscoveryPrefix(_))
            ));
        }
    }

    #[test]
    fn invalid_selector_pairs() {
        for spec in &[
            "label:test-tag=",
            "label:=test-val",
            "label:test-tag=test-value,another-test-tag",
            "label:",
            "label:a=b,,c=d",
        ] {
            assert!(
                matches!(
                    parse_label_spec(spec),
                    Err(Error::InvalidSelectorPair { .. })
                ),
                "{:?} should be rejected",
                spec
            );
        }
    }

    #[test]
    fn duplicate_keys_keep_the_last_value() {
        assert_eq!(
            parse_label_spec("label:a=1,a=2").unwrap(),
            selector(&[("a", "2")])
        );
    }

    #[test]
    fn selector_matching() {
        let tags: HashMap<String, String> = vec![("a", "1"), ("b", "2"), ("min", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(selector(&[("a", "1")]).matches(&tags));
        assert!(selector(&[("a", "1"), ("b", "2")]).matches(&tags));
        assert!(!selector(&[("a", "2")]).matches(&tags));
        assert!(!selector(&[("c", "1")]).matches(&tags));
        assert!(!LabelSelector::default().matches(&tags));
    }

    #[test]
    fn discovery_specs_keep_their_kind() {
        let specs = parse_discovery_specs(&["1:3:a"], &["label:x=y"]).unwrap();

        assert!(matches!(specs[0], DiscoverySpec::Explicit(ref s) if s.name == "a"));
        assert!(matches!(specs[1], DiscoverySpec::LabelSelector(_)));
        assert!(parse_discovery_specs(&["1:3:a"], &["x=y"]).is_err());
    }
}
