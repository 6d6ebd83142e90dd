//! Numeric design matrix for the booster: numeric fields pass through,
//! categorical fields expand to one indicator column per declared level.

use bt_types::{BtResult, Dataset, FieldKind, FieldValue, Schema};
use bt_types::validation_error;
use ndarray::{Array2, Axis};

#[derive(Debug, Clone, PartialEq)]
enum EncodedColumn {
    Numeric { field: usize },
    Indicator { field: usize, level: String },
}

/// Column layout derived from a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoder {
    columns: Vec<EncodedColumn>,
    names: Vec<String>,
    n_fields: usize,
}

impl FeatureEncoder {
    pub fn from_schema(schema: &Schema) -> Self {
        let mut columns = Vec::new();
        let mut names = Vec::new();

        for (field, spec) in schema.feature_fields() {
            match &spec.kind {
                FieldKind::Integer | FieldKind::Real => {
                    columns.push(EncodedColumn::Numeric { field });
                    names.push(spec.name.clone());
                }
                FieldKind::Categorical { levels } => {
                    for level in levels {
                        columns.push(EncodedColumn::Indicator {
                            field,
                            level: level.clone(),
                        });
                        names.push(format!("{}={}", spec.name, level));
                    }
                }
            }
        }

        Self {
            columns,
            names,
            n_fields: schema.fields.len(),
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn transform(&self, dataset: &Dataset) -> BtResult<DesignMatrix> {
        if dataset.schema().fields.len() != self.n_fields {
            return Err(validation_error!(
                "encoder built for {} fields, dataset has {}",
                self.n_fields,
                dataset.schema().fields.len()
            ));
        }

        let mut features = Array2::zeros((dataset.len(), self.columns.len()));
        for (row, record) in dataset.records().iter().enumerate() {
            for (col, column) in self.columns.iter().enumerate() {
                features[[row, col]] = match column {
                    EncodedColumn::Numeric { field } => record[*field].as_f64().unwrap_or(0.0),
                    EncodedColumn::Indicator { field, level } => match &record[*field] {
                        FieldValue::Level(value) if value == level => 1.0,
                        _ => 0.0,
                    },
                };
            }
        }

        Ok(DesignMatrix {
            features,
            labels: dataset.labels(),
            columns: self.names.clone(),
        })
    }
}

/// Encoded features with aligned binary labels.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub features: Array2<f64>,
    pub labels: Vec<u8>,
    pub columns: Vec<String>,
}

impl DesignMatrix {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.features.ncols()
    }

    pub fn select_rows(&self, indices: &[usize]) -> DesignMatrix {
        DesignMatrix {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            columns: self.columns.clone(),
        }
    }
}
