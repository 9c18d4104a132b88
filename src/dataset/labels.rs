//! Label string <-> dense key mapping
//!
//! The mapping is built once over every label observed in the dataset, before
//! any split, and the same instance is carried through training, evaluation
//! and into the model schema used at prediction time.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result};

/// Order in which keys are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrdinality {
    /// Keys follow lexicographic label order
    #[default]
    ByValue,
    /// Keys follow first appearance in the input sequence
    ByOccurrence,
}

/// Bijection between label strings and keys in `[0, len)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelKeyMapper {
    labels: Vec<String>,
    keys: HashMap<String, u32>,
}

impl LabelKeyMapper {
    /// Build the mapping from every observed label (duplicates allowed)
    pub fn build<I, S>(labels: I, ordinality: KeyOrdinality) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ordered: Vec<String> = match ordinality {
            KeyOrdinality::ByValue => labels
                .into_iter()
                .map(|l| l.as_ref().to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            KeyOrdinality::ByOccurrence => {
                let mut seen = HashSet::new();
                labels
                    .into_iter()
                    .filter_map(|l| {
                        let l = l.as_ref();
                        seen.insert(l.to_string()).then(|| l.to_string())
                    })
                    .collect()
            }
        };

        Self::from_ordered(ordered)
    }

    /// Labels are distinct and already in key order
    fn from_ordered(labels: Vec<String>) -> Self {
        let keys = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx as u32))
            .collect();
        Self { labels, keys }
    }

    /// Key for a label seen at construction
    pub fn to_key(&self, label: &str) -> Result<u32> {
        self.keys
            .get(label)
            .copied()
            .ok_or_else(|| ClassifyError::UnknownLabel(label.to_string()))
    }

    /// Label for a key in `[0, len)`
    pub fn to_label(&self, key: u32) -> Result<&str> {
        self.labels
            .get(key as usize)
            .map(String::as_str)
            .ok_or(ClassifyError::UnknownKey(key))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.keys.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in key order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl TryFrom<Vec<String>> for LabelKeyMapper {
    type Error = ClassifyError;

    /// Interprets the vector as labels already in key order; duplicates are rejected
    fn try_from(labels: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(labels.len());
        if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
            return Err(ClassifyError::InvalidInput(format!("duplicate label {:?}", dup)));
        }
        Ok(Self::from_ordered(labels))
    }
}

impl From<LabelKeyMapper> for Vec<String> {
    fn from(mapper: LabelKeyMapper) -> Self {
        mapper.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBSERVED: [&str; 6] = ["tulips", "daisy", "roses", "daisy", "tulips", "dandelion"];

    #[test]
    fn test_by_value_ordering() {
        let mapper = LabelKeyMapper::build(OBSERVED, KeyOrdinality::ByValue);
        assert_eq!(mapper.labels(), &["daisy", "dandelion", "roses", "tulips"]);
        assert_eq!(mapper.to_key("daisy").unwrap(), 0);
        assert_eq!(mapper.to_key("tulips").unwrap(), 3);
    }

    #[test]
    fn test_by_occurrence_ordering() {
        let mapper = LabelKeyMapper::build(OBSERVED, KeyOrdinality::ByOccurrence);
        assert_eq!(mapper.labels(), &["tulips", "daisy", "roses", "dandelion"]);
        assert_eq!(mapper.to_key("dandelion").unwrap(), 3);
    }

    #[test]
    fn test_round_trip_for_observed_labels() {
        for ordinality in [KeyOrdinality::ByValue, KeyOrdinality::ByOccurrence] {
            let mapper = LabelKeyMapper::build(OBSERVED, ordinality);
            for label in OBSERVED {
                let key = mapper.to_key(label).unwrap();
                assert_eq!(mapper.to_label(key).unwrap(), label);
            }
        }
    }

    #[test]
    fn test_unknown_label_and_key() {
        let mapper = LabelKeyMapper::build(OBSERVED, KeyOrdinality::ByValue);
        assert!(matches!(
            mapper.to_key("sunflowers"),
            Err(ClassifyError::UnknownLabel(l)) if l == "sunflowers"
        ));
        assert!(matches!(mapper.to_label(4), Err(ClassifyError::UnknownKey(4))));
    }

    #[test]
    fn test_serde_preserves_keys() {
        let mapper = LabelKeyMapper::build(OBSERVED, KeyOrdinality::ByOccurrence);
        let json = serde_json::to_string(&mapper).unwrap();
        assert_eq!(json, r#"["tulips","daisy","roses","dandelion"]"#);
        let restored: LabelKeyMapper = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, mapper);
        assert_eq!(restored.to_key("roses").unwrap(), 2);
    }

    #[test]
    fn test_duplicate_labels_are_rejected() {
        let labels = vec!["daisy".to_string(), "roses".to_string(), "daisy".to_string()];
        assert!(matches!(
            LabelKeyMapper::try_from(labels),
            Err(ClassifyError::InvalidInput(_))
        ));
        assert!(serde_json::from_str::<LabelKeyMapper>(r#"["a","b","a"]"#).is_err());
    }

    #[test]
    fn test_empty_mapping() {
        let mapper = LabelKeyMapper::build(Vec::<String>::new(), KeyOrdinality::ByValue);
        assert!(mapper.is_empty());
        assert!(mapper.to_label(0).is_err());
    }
}
