//! Tabular dataset model: a schema of named, typed fields and the records
//! that conform to it.

use serde::{Deserialize, Serialize};

use crate::errors::{BtResult, DataError};
use crate::validation_error;

/// How a field's values are typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// One of a finite, declared set of labels.
    Categorical { levels: Vec<String> },
    Integer,
    Real,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field declarations plus the binary outcome column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
    /// Name of the binary outcome field (must be categorical with two levels).
    pub outcome: String,
    /// Outcome level treated as the positive class (label 1).
    pub positive_label: String,
}

impl Schema {
    pub fn new(outcome: impl Into<String>, positive_label: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            outcome: outcome.into(),
            positive_label: positive_label.into(),
        }
    }

    pub fn categorical<S: Into<String>>(mut self, name: impl Into<String>, levels: Vec<S>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Categorical {
                levels: levels.into_iter().map(Into::into).collect(),
            },
        });
        self
    }

    pub fn integer(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Integer,
        });
        self
    }

    pub fn real(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Real,
        });
        self
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn outcome_index(&self) -> Option<usize> {
        self.index_of(&self.outcome)
    }

    /// Fields other than the outcome, with their column positions.
    pub fn feature_fields(&self) -> impl Iterator<Item = (usize, &FieldSpec)> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.name != self.outcome)
    }

    pub fn validate(&self) -> BtResult<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(validation_error!("duplicate field name: {}", field.name));
            }
            if let FieldKind::Categorical { levels } = &field.kind {
                if levels.is_empty() {
                    return Err(validation_error!(
                        "categorical field {} declares no levels",
                        field.name
                    ));
                }
            }
        }

        let outcome = self
            .outcome_index()
            .map(|i| &self.fields[i])
            .ok_or_else(|| validation_error!("outcome field {} not in schema", self.outcome))?;

        match &outcome.kind {
            FieldKind::Categorical { levels }
                if levels.len() == 2 && levels.contains(&self.positive_label) =>
            {
                Ok(())
            }
            _ => Err(validation_error!(
                "outcome field {} must be categorical with two levels including '{}'",
                self.outcome,
                self.positive_label
            )),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Level(String),
    Int(i64),
    Real(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            Self::Level(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Level(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
        }
    }
}

/// Records validated against a [`Schema`].
///
/// Every categorical value is one of its field's declared levels; this is
/// checked once on construction and holds for every subset taken later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    schema: Schema,
    records: Vec<Vec<FieldValue>>,
}

impl Dataset {
    pub fn new(schema: Schema, records: Vec<Vec<FieldValue>>) -> BtResult<Self> {
        schema.validate()?;

        for (row, record) in records.iter().enumerate() {
            if record.len() != schema.fields.len() {
                return Err(DataError::InvalidFormat {
                    message: format!(
                        "record {} has {} values, schema declares {}",
                        row,
                        record.len(),
                        schema.fields.len()
                    ),
                }
                .into());
            }

            for (field, value) in schema.fields.iter().zip(record) {
                match (&field.kind, value) {
                    (FieldKind::Categorical { levels }, FieldValue::Level(level)) => {
                        if !levels.contains(level) {
                            return Err(DataError::UnknownLevel {
                                field: field.name.clone(),
                                value: level.clone(),
                            }
                            .into());
                        }
                    }
                    (FieldKind::Integer, FieldValue::Int(_)) => {}
                    (FieldKind::Real, FieldValue::Real(v)) if v.is_finite() => {}
                    _ => {
                        return Err(DataError::InvalidFormat {
                            message: format!(
                                "record {}: value {} does not match field {} ({:?})",
                                row, value, field.name, field.kind
                            ),
                        }
                        .into());
                    }
                }
            }
        }

        Ok(Self { schema, records })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Vec<FieldValue>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Binary outcome per record: 1 for the positive label, 0 otherwise.
    pub fn labels(&self) -> Vec<u8> {
        let Some(idx) = self.schema.outcome_index() else {
            return Vec::new();
        };
        self.records
            .iter()
            .map(|r| match &r[idx] {
                FieldValue::Level(level) if *level == self.schema.positive_label => 1,
                _ => 0,
            })
            .collect()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let positives = self.labels().iter().filter(|&&l| l == 1).count();
        positives as f64 / self.records.len() as f64
    }

    /// Records at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> BtResult<Dataset> {
        let mut records = Vec::with_capacity(indices.len());
        for &i in indices {
            let record = self.records.get(i).ok_or_else(|| {
                validation_error!("record index {} out of range ({} records)", i, self.len())
            })?;
            records.push(record.clone());
        }
        Ok(Dataset {
            schema: self.schema.clone(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BtError;

    fn schema() -> Schema {
        Schema::new("class", "bad")
            .categorical("checking", vec!["A11", "A12"])
            .integer("duration")
            .categorical("class", vec!["good", "bad"])
    }

    fn row(checking: &str, duration: i64, class: &str) -> Vec<FieldValue> {
        vec![
            FieldValue::Level(checking.into()),
            FieldValue::Int(duration),
            FieldValue::Level(class.into()),
        ]
    }

    #[test]
    fn dataset_accepts_declared_levels() {
        let ds = Dataset::new(schema(), vec![row("A11", 6, "good"), row("A12", 24, "bad")]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.labels(), vec![0, 1]);
        assert!((ds.positive_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn dataset_rejects_undeclared_level() {
        let err = Dataset::new(schema(), vec![row("A19", 6, "good")]).unwrap_err();
        match err {
            BtError::Data(DataError::UnknownLevel { field, value }) => {
                assert_eq!(field, "checking");
                assert_eq!(value, "A19");
            }
            other => panic!("expected UnknownLevel, got {other:?}"),
        }
    }

    #[test]
    fn dataset_rejects_wrong_arity_and_kind() {
        let short = vec![FieldValue::Level("A11".into())];
        assert!(Dataset::new(schema(), vec![short]).is_err());

        let wrong_kind = vec![
            FieldValue::Level("A11".into()),
            FieldValue::Real(6.5),
            FieldValue::Level("good".into()),
        ];
        assert!(Dataset::new(schema(), vec![wrong_kind]).is_err());
    }

    #[test]
    fn schema_requires_binary_outcome() {
        let bad = Schema::new("class", "bad").categorical("class", vec!["good", "bad", "ugly"]);
        assert!(bad.validate().is_err());

        let missing = Schema::new("target", "1").integer("x");
        assert!(missing.validate().is_err());

        let dup = schema().integer("duration");
        assert!(dup.validate().is_err());
    }

    #[test]
    fn feature_fields_skip_outcome() {
        let s = schema();
        let names: Vec<&str> = s.feature_fields().map(|(_, f)| f.name.as_str()).collect();
        assert_eq!(names, vec!["checking", "duration"]);
    }

    #[test]
    fn subset_preserves_order_and_checks_range() {
        let ds = Dataset::new(
            schema(),
            vec![row("A11", 6, "good"), row("A12", 24, "bad"), row("A11", 12, "bad")],
        )
        .unwrap();
        let sub = ds.subset(&[2, 0]).unwrap();
        assert_eq!(sub.records()[0][1], FieldValue::Int(12));
        assert_eq!(sub.labels(), vec![1, 0]);
        assert!(ds.subset(&[3]).is_err());
    }
}
