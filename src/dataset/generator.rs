//! Epoch-ordered batch generation.
//!
//! A generator owns an identifier list and a permutation over it. Batches
//! are cut from the permutation with a truncating count, so a trailing
//! partial batch is never emitted. The permutation is replaced wholesale
//! at construction and after every epoch; between those points it is
//! immutable, which keeps concurrent batch reads coherent.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::ModelParameter;
use crate::utils::error::{AtlasError, Result};

use super::batcher::AtlasItem;
use super::labels::LabelTable;
use super::preprocess::ImagePreprocessor;

pub struct DataGenerator {
    identifiers: Vec<String>,
    labels: Arc<LabelTable>,
    params: ModelParameter,
    preprocessor: ImagePreprocessor,
    permutation: Vec<usize>,
    rng: ChaCha8Rng,
    pool: Option<rayon::ThreadPool>,
}

impl DataGenerator {
    /// Build a generator over `identifiers`. Every identifier must have a
    /// label row, and the batch size must not exceed the identifier count;
    /// both are checked here so training never discovers them mid-epoch.
    pub fn new(
        identifiers: Vec<String>,
        labels: Arc<LabelTable>,
        params: ModelParameter,
    ) -> Result<Self> {
        params.validate()?;
        if identifiers.is_empty() {
            return Err(AtlasError::Dataset(
                "generator needs at least one identifier".to_string(),
            ));
        }
        if params.batch_size > identifiers.len() {
            return Err(AtlasError::Dataset(format!(
                "batch size {} exceeds {} available identifiers",
                params.batch_size,
                identifiers.len()
            )));
        }
        for id in &identifiers {
            if !labels.contains(id) {
                return Err(AtlasError::LabelIntegrity {
                    id: id.clone(),
                    reason: "no label row".to_string(),
                });
            }
        }

        let pool = if params.n_workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(params.n_workers)
                .build()
                .map_err(|e| AtlasError::Dataset(format!("worker pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        let preprocessor = ImagePreprocessor::new(&params);
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut generator = Self {
            identifiers,
            labels,
            params,
            preprocessor,
            permutation: Vec::new(),
            rng,
            pool,
        };
        generator.on_epoch_end();
        Ok(generator)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Number of full batches per epoch; the remainder is dropped.
    pub fn batch_count(&self) -> usize {
        self.identifiers.len() / self.params.batch_size
    }

    /// Identifiers of batch `index` under the current permutation.
    pub fn batch_identifiers(&self, index: usize) -> Result<Vec<String>> {
        if index >= self.batch_count() {
            return Err(AtlasError::Dataset(format!(
                "batch index {} out of range ({} batches)",
                index,
                self.batch_count()
            )));
        }
        let start = index * self.params.batch_size;
        let end = start + self.params.batch_size;
        Ok(self.permutation[start..end]
            .iter()
            .map(|&i| self.identifiers[i].clone())
            .collect())
    }

    /// Load and preprocess batch `index`. Item order follows the current
    /// permutation regardless of how many workers assemble the batch.
    pub fn batch(&self, index: usize) -> Result<Vec<AtlasItem>> {
        let ids = self.batch_identifiers(index)?;

        match &self.pool {
            Some(pool) => {
                use rayon::prelude::*;
                pool.install(|| {
                    ids.par_iter()
                        .map(|id| self.load_item(id))
                        .collect::<Result<Vec<_>>>()
                })
            }
            None => ids.iter().map(|id| self.load_item(id)).collect(),
        }
    }

    fn load_item(&self, id: &str) -> Result<AtlasItem> {
        let raw = self
            .preprocessor
            .load_image(&self.params.basepath, id)?;
        let image = self.preprocessor.preprocess(raw)?;
        let row = self.labels.lookup(id)?;
        Ok(AtlasItem {
            id: id.to_string(),
            image,
            targets: row.targets.clone(),
        })
    }

    /// Replace the permutation for the next epoch: identity order, or a
    /// fresh shuffle when the parameters ask for one.
    pub fn on_epoch_end(&mut self) {
        let mut permutation: Vec<usize> = (0..self.identifiers.len()).collect();
        if self.params.shuffle {
            permutation.shuffle(&mut self.rng);
        }
        self.permutation = permutation;
        debug!(
            samples = self.identifiers.len(),
            shuffled = self.params.shuffle,
            "epoch permutation refreshed"
        );
    }

    #[cfg(test)]
    fn permutation(&self) -> &[usize] {
        &self.permutation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels_for(ids: &[&str]) -> Arc<LabelTable> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Id,Target,C0,C1").unwrap();
        for id in ids {
            writeln!(file, "{},0,1,0", id).unwrap();
        }
        drop(file);
        Arc::new(LabelTable::from_csv(&path).unwrap())
    }

    fn params(batch_size: usize) -> ModelParameter {
        ModelParameter::new("unused/".to_string())
            .with_num_classes(2)
            .with_image_dims(8, 8)
            .with_scale_factors(2, 2)
            .with_batch_size(batch_size)
    }

    #[test]
    fn test_batch_count_truncates() {
        let ids: Vec<String> = (0..7).map(|i| format!("id{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let generator =
            DataGenerator::new(ids.clone(), labels_for(&id_refs), params(3)).unwrap();
        assert_eq!(generator.batch_count(), 2);
        assert!(generator.batch_identifiers(2).is_err());
    }

    #[test]
    fn test_unshuffled_order_is_file_order() {
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let generator =
            DataGenerator::new(ids, labels_for(&["a", "b", "c"]), params(3)).unwrap();
        assert_eq!(generator.batch_identifiers(0).unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_shuffle_is_seeded_and_refreshed() {
        let ids: Vec<String> = (0..16).map(|i| format!("id{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let labels = labels_for(&id_refs);
        let p = params(4).with_shuffle(true).with_seed(7);

        let mut g1 = DataGenerator::new(ids.clone(), labels.clone(), p.clone()).unwrap();
        let g2 = DataGenerator::new(ids.clone(), labels, p).unwrap();
        assert_eq!(g1.permutation(), g2.permutation());

        let first = g1.permutation().to_vec();
        g1.on_epoch_end();
        assert_ne!(g1.permutation(), first.as_slice());

        // Still a bijection over the same index set.
        let mut sorted = g1.permutation().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_batch_preserves_permutation_order() {
        let dir = tempfile::tempdir().unwrap();
        let ids: Vec<String> = (0..8).map(|i| format!("id{}", i)).collect();
        for id in &ids {
            for suffix in crate::CHANNEL_SUFFIXES {
                let img = image::GrayImage::from_pixel(8, 8, image::Luma([50]));
                img.save(dir.path().join(format!("{}_{}.png", id, suffix)))
                    .unwrap();
            }
        }

        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let labels = labels_for(&id_refs);
        let params = ModelParameter::new(format!("{}/", dir.path().display()))
            .with_num_classes(2)
            .with_image_dims(8, 8)
            .with_scale_factors(2, 2)
            .with_batch_size(8)
            .with_shuffle(true)
            .with_n_workers(4);

        let generator = DataGenerator::new(ids, labels, params).unwrap();
        let expected = generator.batch_identifiers(0).unwrap();
        let items = generator.batch(0).unwrap();
        let got: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let ids = vec!["a".to_string()];
        let result = DataGenerator::new(ids, labels_for(&["a"]), params(2));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_identifier_rejected_at_construction() {
        let ids = vec!["a".to_string(), "ghost".to_string()];
        let result = DataGenerator::new(ids, labels_for(&["a", "b"]), params(1));
        assert!(matches!(
            result,
            Err(AtlasError::LabelIntegrity { .. })
        ));
    }
}
