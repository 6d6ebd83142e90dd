use std::io::Read;
use std::path::Path;

use bt_types::{BtResult, DataError, Dataset, FieldKind, FieldValue, Schema};
use csv::ReaderBuilder;

/// Loader for header-less delimited files with a fixed column order
#[derive(Debug, Clone)]
pub struct DelimitedLoader {
    delimiter: u8,
    has_headers: bool,
    skip_invalid: bool,
}

impl DelimitedLoader {
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            has_headers: false,
            skip_invalid: false,
        }
    }

    /// Space-separated values, as in the Statlog data files.
    pub fn whitespace() -> Self {
        Self::new(b' ')
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Drop malformed records with a warning instead of failing the load.
    pub fn skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }

    pub fn load_file<P: AsRef<Path>>(&self, file_path: P, schema: &Schema) -> BtResult<Dataset> {
        let path = file_path.as_ref();
        tracing::info!("Loading delimited data from: {}", path.display());

        if !path.exists() {
            return Err(DataError::SourceNotFound(path.display().to_string()).into());
        }

        let file = std::fs::File::open(path)?;
        self.load_reader(file, schema)
    }

    pub fn load_reader<R: Read>(&self, reader: R, schema: &Schema) -> BtResult<Dataset> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .flexible(true)
            .from_reader(reader);

        let first_line = if self.has_headers { 2 } else { 1 };
        let mut records = Vec::new();

        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read record at line {}: {}", line_num + first_line, e),
            })?;

            // Runs of delimiters and trailing separators yield empty cells.
            let cells: Vec<&str> = record.iter().filter(|c| !c.is_empty()).collect();
            if cells.is_empty() {
                continue;
            }

            match Self::parse_record(&cells, schema) {
                Ok(values) => records.push(values),
                Err(e) if self.skip_invalid => {
                    tracing::warn!("Skipping invalid record at line {}: {}", line_num + first_line, e);
                }
                Err(e) => {
                    return Err(DataError::ParseError {
                        message: format!("line {}: {}", line_num + first_line, e),
                    }
                    .into());
                }
            }
        }

        tracing::info!("Parsed {} records", records.len());
        Dataset::new(schema.clone(), records)
    }

    /// Coerce each cell to its field's declared kind.
    fn parse_record(cells: &[&str], schema: &Schema) -> Result<Vec<FieldValue>, String> {
        if cells.len() != schema.fields.len() {
            return Err(format!(
                "record has {} columns, expected {}",
                cells.len(),
                schema.fields.len()
            ));
        }

        schema
            .fields
            .iter()
            .zip(cells)
            .map(|(field, cell)| match &field.kind {
                FieldKind::Categorical { levels } => {
                    if levels.iter().any(|l| l == cell) {
                        Ok(FieldValue::Level(cell.to_string()))
                    } else {
                        Err(format!("unknown level '{}' for {}", cell, field.name))
                    }
                }
                FieldKind::Integer => cell
                    .parse::<i64>()
                    .map(FieldValue::Int)
                    .map_err(|e| format!("could not parse {} value '{}': {}", field.name, cell, e)),
                FieldKind::Real => cell
                    .parse::<f64>()
                    .map(FieldValue::Real)
                    .map_err(|e| format!("could not parse {} value '{}': {}", field.name, cell, e)),
            })
            .collect()
    }
}

impl Default for DelimitedLoader {
    fn default() -> Self {
        Self::whitespace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::german::german_credit_schema;
    use bt_types::BtError;

    const SAMPLE: &str = "\
A11 6 A34 A43 1169 A65 A75 4 A93 A101 4 A121 67 A143 A152 2 A173 1 A192 A201 1
A12 48 A32 A43 5951 A61 A73 2 A92 A101 2 A121 22 A143 A152 1 A173 1 A191 A201 2
A14 12 A34 A46 2096 A61 A74 2 A93 A101 3 A121 49 A143 A152 1 A172 2 A191 A201 1
";

    #[test]
    fn parses_statlog_records() {
        let ds = DelimitedLoader::whitespace()
            .load_reader(SAMPLE.as_bytes(), &german_credit_schema())
            .unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.labels(), vec![0, 1, 0]);
        assert_eq!(ds.records()[0][0], FieldValue::Level("A11".into()));
        assert_eq!(ds.records()[1][4], FieldValue::Int(5951));
    }

    #[test]
    fn rejects_unknown_level_by_default() {
        let data = "A19 6 A34 A43 1169 A65 A75 4 A93 A101 4 A121 67 A143 A152 2 A173 1 A192 A201 1\n";
        let err = DelimitedLoader::whitespace()
            .load_reader(data.as_bytes(), &german_credit_schema())
            .unwrap_err();
        assert!(matches!(err, BtError::Data(DataError::ParseError { .. })));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn skip_invalid_drops_bad_rows() {
        let data = format!("{SAMPLE}A11 x A34 A43 1169 A65 A75 4 A93 A101 4 A121 67 A143 A152 2 A173 1 A192 A201 1\n");
        let ds = DelimitedLoader::whitespace()
            .skip_invalid(true)
            .load_reader(data.as_bytes(), &german_credit_schema())
            .unwrap();
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = DelimitedLoader::whitespace()
            .load_file(dir.path().join("absent.data"), &german_credit_schema())
            .unwrap_err();
        assert!(matches!(err, BtError::Data(DataError::SourceNotFound(_))));
    }
}
