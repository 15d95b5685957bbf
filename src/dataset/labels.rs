//! Label Table and Fold Files
//!
//! The labels CSV carries an `Id` column, an informational `Target` column
//! (space-separated class indices) and one binary column per class. The
//! table is parsed once into an identifier -> multi-hot map so lookups are
//! O(1) and the "exactly one row per identifier" invariant is enforced at
//! construction rather than per call.

use std::collections::HashMap;
use std::path::Path;

use crate::utils::error::{AtlasError, Result};

/// Columns that are not part of the label vector
const NON_CLASS_COLUMNS: [&str; 2] = ["Id", "Target"];

/// One identifier's labels: the multi-hot vector over all classes and the
/// derived count of active targets (row sum, excluded from the vector).
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRow {
    pub targets: Vec<f32>,
    pub number_of_targets: usize,
}

/// Identifier -> multi-hot label mapping built from the labels CSV.
#[derive(Debug, Clone)]
pub struct LabelTable {
    class_names: Vec<String>,
    rows: HashMap<String, LabelRow>,
}

impl LabelTable {
    /// Parse a labels CSV. Class columns are every header except `Id` and
    /// `Target`, in file order. A duplicated identifier fails immediately.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let id_index = headers
            .iter()
            .position(|h| h == "Id")
            .ok_or_else(|| AtlasError::Dataset("labels CSV has no 'Id' column".to_string()))?;

        let class_indices: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !NON_CLASS_COLUMNS.contains(&h.as_str()))
            .map(|(i, _)| i)
            .collect();
        if class_indices.is_empty() {
            return Err(AtlasError::Dataset(
                "labels CSV has no class columns".to_string(),
            ));
        }
        let class_names: Vec<String> = class_indices
            .iter()
            .map(|&i| headers[i].clone())
            .collect();

        let mut rows = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let id = record
                .get(id_index)
                .ok_or_else(|| AtlasError::Dataset("labels CSV row missing Id".to_string()))?
                .to_string();

            let mut targets = Vec::with_capacity(class_indices.len());
            for &i in &class_indices {
                let cell = record.get(i).unwrap_or("");
                let value: f32 = cell.trim().parse().map_err(|_| {
                    AtlasError::LabelIntegrity {
                        id: id.clone(),
                        reason: format!(
                            "class column '{}' holds non-numeric value '{}'",
                            headers[i], cell
                        ),
                    }
                })?;
                targets.push(value);
            }
            let number_of_targets = targets.iter().filter(|&&v| v > 0.0).count();

            if rows
                .insert(
                    id.clone(),
                    LabelRow {
                        targets,
                        number_of_targets,
                    },
                )
                .is_some()
            {
                return Err(AtlasError::LabelIntegrity {
                    id,
                    reason: "more than one label row".to_string(),
                });
            }
        }

        Ok(Self { class_names, rows })
    }

    /// Class column names in file order; these name the prediction CSV
    /// columns as well.
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// Label row for `id`. A missing identifier is a data-integrity error
    /// naming the identifier, never a silent default.
    pub fn lookup(&self, id: &str) -> Result<&LabelRow> {
        self.rows.get(id).ok_or_else(|| AtlasError::LabelIntegrity {
            id: id.to_string(),
            reason: "no label row".to_string(),
        })
    }
}

/// Read the `Id` column of a fold file (`train_<fold>.csv` or
/// `valid_<fold>.csv`), preserving file order.
pub fn read_fold_ids(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;

    let headers = reader.headers()?.clone();
    let id_index = headers
        .iter()
        .position(|h| h == "Id")
        .ok_or_else(|| AtlasError::Dataset(format!("fold file {:?} has no 'Id' column", path)))?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(id_index) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_lookup_returns_class_columns_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "labels.csv",
            "Id,Target,Nucleoplasm,Cytosol,Mitochondria\n\
             a1,0 2,1,0,1\n\
             b2,1,0,1,0\n",
        );

        let table = LabelTable::from_csv(&path).unwrap();
        assert_eq!(table.num_classes(), 3);
        assert_eq!(
            table.class_names(),
            &["Nucleoplasm", "Cytosol", "Mitochondria"]
        );

        let row = table.lookup("a1").unwrap();
        assert_eq!(row.targets, vec![1.0, 0.0, 1.0]);
        assert_eq!(row.number_of_targets, 2);

        let row = table.lookup("b2").unwrap();
        assert_eq!(row.targets, vec![0.0, 1.0, 0.0]);
        assert_eq!(row.number_of_targets, 1);
    }

    #[test]
    fn test_missing_identifier_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "labels.csv", "Id,Target,C0\na1,0,1\n");

        let table = LabelTable::from_csv(&path).unwrap();
        let err = table.lookup("nope").unwrap_err();
        assert!(format!("{}", err).contains("nope"));
    }

    #[test]
    fn test_duplicate_identifier_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "labels.csv",
            "Id,Target,C0\na1,0,1\na1,0,0\n",
        );

        let err = LabelTable::from_csv(&path).unwrap_err();
        assert!(matches!(err, AtlasError::LabelIntegrity { .. }));
        assert!(format!("{}", err).contains("a1"));
    }

    #[test]
    fn test_non_numeric_class_cell_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "labels.csv", "Id,Target,C0\na1,0,yes\n");
        assert!(LabelTable::from_csv(&path).is_err());
    }

    #[test]
    fn test_read_fold_ids_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "train_1.csv", "Id\nc3\na1\nb2\n");

        let ids = read_fold_ids(&path).unwrap();
        assert_eq!(ids, vec!["c3", "a1", "b2"]);
    }
}
