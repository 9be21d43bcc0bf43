//! Per-node weights used for proportional region sizing.

use crate::error::{Error, Result};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight of any node without an explicit entry.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Node id to weight mapping with a default for absent nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpecification {
    #[serde(default = "default_weight")]
    default_weight: f64,
    #[serde(default)]
    weights: HashMap<NodeId, f64>,
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

impl Default for WeightSpecification {
    fn default() -> Self {
        Self {
            default_weight: DEFAULT_WEIGHT,
            weights: HashMap::new(),
        }
    }
}

impl WeightSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight for a node. Weights must be positive and finite.
    pub fn with_weight(mut self, id: impl Into<NodeId>, weight: f64) -> Result<Self> {
        self.set_weight(id, weight)?;
        Ok(self)
    }

    pub fn with_default_weight(mut self, weight: f64) -> Result<Self> {
        check_weight("default", weight)?;
        self.default_weight = weight;
        Ok(self)
    }

    pub fn set_weight(&mut self, id: impl Into<NodeId>, weight: f64) -> Result<()> {
        let id = id.into();
        check_weight(&id, weight)?;
        self.weights.insert(id, weight);
        Ok(())
    }

    /// Weight of a node, or the default when unspecified.
    pub fn weight(&self, id: &str) -> f64 {
        self.weights.get(id).copied().unwrap_or(self.default_weight)
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    /// Check every stored weight. Used after deserialization.
    pub fn validate(&self) -> Result<()> {
        check_weight("default", self.default_weight)?;
        for (id, weight) in &self.weights {
            check_weight(id, *weight)?;
        }
        Ok(())
    }

    /// Parse the line format: `<node id> <weight>` per line, `#` comments.
    pub fn parse_lines(source_name: &str, text: &str) -> Result<Self> {
        let mut weights = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(id), Some(weight), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(parse_error(source_name, lineno, "expected `<id> <weight>`"));
            };
            let weight: f64 = weight
                .parse()
                .map_err(|_| parse_error(source_name, lineno, "weight is not a number"))?;
            weights.set_weight(id, weight)
                .map_err(|e| parse_error(source_name, lineno, &e.to_string()))?;
        }
        Ok(weights)
    }
}

fn check_weight(id: &str, weight: f64) -> Result<()> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "weight for {} must be positive, got {}",
            id, weight
        )))
    }
}

fn parse_error(source_name: &str, lineno: usize, reason: &str) -> Error {
    Error::Parse {
        source_name: source_name.to_string(),
        reason: format!("line {}: {}", lineno + 1, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weight_applies() {
        let weights = WeightSpecification::new().with_weight("s1", 3.0).unwrap();
        assert_eq!(weights.weight("s1"), 3.0);
        assert_eq!(weights.weight("s2"), DEFAULT_WEIGHT);
    }

    #[test]
    fn test_non_positive_rejected() {
        assert!(WeightSpecification::new().with_weight("s1", 0.0).is_err());
        assert!(WeightSpecification::new().with_weight("s1", -1.0).is_err());
        assert!(WeightSpecification::new().with_weight("s1", f64::NAN).is_err());
        assert!(WeightSpecification::new().with_default_weight(0.0).is_err());
    }

    #[test]
    fn test_parse_lines() {
        let text = "# weights\ns1 2.5\n\ns2 1   # trailing\n";
        let weights = WeightSpecification::parse_lines("weights", text).unwrap();
        assert_eq!(weights.weight("s1"), 2.5);
        assert_eq!(weights.weight("s2"), 1.0);
    }

    #[test]
    fn test_parse_lines_errors_name_line() {
        let err = WeightSpecification::parse_lines("w.txt", "s1 2\ns2 abc\n").unwrap_err();
        match err {
            Error::Parse { source_name, reason } => {
                assert_eq!(source_name, "w.txt");
                assert!(reason.starts_with("line 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
