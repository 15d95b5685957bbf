//! Ordered single-image inference over an identifier list.

use std::path::Path;

use burn::prelude::*;
use tracing::info;

use crate::config::ModelParameter;
use crate::dataset::{ImagePreprocessor, ImageTensor};
use crate::model::AtlasClassifier;
use crate::utils::error::Result;

/// Per-class probabilities for a list of identifiers, in input order.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    pub identifiers: Vec<String>,
    pub rows: Vec<Vec<f32>>,
}

impl PredictionTable {
    /// Write an `Id` column plus one probability column per class name.
    pub fn write_csv(&self, path: &Path, class_names: &[String]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = Vec::with_capacity(class_names.len() + 1);
        header.push("Id".to_string());
        header.extend(class_names.iter().cloned());
        writer.write_record(&header)?;

        for (id, row) in self.identifiers.iter().zip(&self.rows) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(id.clone());
            record.extend(row.iter().map(|p| p.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Runs a trained model over unlabeled images one at a time. The image
/// directory is held here explicitly; nothing about the training-side
/// preprocessor is touched.
pub struct PredictGenerator {
    identifiers: Vec<String>,
    preprocessor: ImagePreprocessor,
    predict_basepath: String,
}

impl PredictGenerator {
    pub fn new(
        identifiers: Vec<String>,
        params: &ModelParameter,
        predict_basepath: String,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            identifiers,
            preprocessor: ImagePreprocessor::new(params),
            predict_basepath,
        })
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Probability rows for every identifier, preserving list order.
    pub fn predict<B: Backend>(
        &self,
        model: &AtlasClassifier<B>,
        device: &B::Device,
    ) -> Result<PredictionTable> {
        let mut rows = Vec::with_capacity(self.identifiers.len());

        for (index, id) in self.identifiers.iter().enumerate() {
            let raw = self.preprocessor.load_image(&self.predict_basepath, id)?;
            let image = self.preprocessor.preprocess(raw)?;
            let input = image_to_input::<B>(&image, device);

            let probs = model.forward_sigmoid(input).into_data();
            let row = probs.to_vec::<f32>().map_err(|e| {
                crate::utils::error::AtlasError::Model(format!(
                    "probability readback: {:?}",
                    e
                ))
            })?;
            rows.push(row);

            if (index + 1) % 100 == 0 {
                info!(done = index + 1, total = self.identifiers.len(), "predicting");
            }
        }

        Ok(PredictionTable {
            identifiers: self.identifiers.clone(),
            rows,
        })
    }
}

/// One preprocessed image as a `[1, channels, rows, cols]` model input.
fn image_to_input<B: Backend>(image: &ImageTensor, device: &B::Device) -> Tensor<B, 4> {
    let (rows, cols, channels) = image.shape();
    let mut data = Vec::with_capacity(rows * cols * channels);
    for ch in 0..channels {
        for r in 0..rows {
            for c in 0..cols {
                data.push(image.get(r, c, ch));
            }
        }
    }
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([1, channels, rows, cols])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::model::AtlasClassifierConfig;
    use image::{GrayImage, Luma};

    fn write_images(dir: &Path, ids: &[&str]) {
        for id in ids {
            for suffix in crate::CHANNEL_SUFFIXES {
                let mut img = GrayImage::new(8, 8);
                for p in img.pixels_mut() {
                    *p = Luma([64u8]);
                }
                img.save(dir.join(format!("{}_{}.png", id, suffix))).unwrap();
            }
        }
    }

    fn tiny_params() -> ModelParameter {
        ModelParameter::new("unused/".to_string())
            .with_num_classes(3)
            .with_image_dims(8, 8)
            .with_scale_factors(1, 1)
            .with_n_channels(1)
            .with_batch_size(1)
    }

    #[test]
    fn test_predict_preserves_order_and_width() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), &["a", "b", "c"]);

        let params = tiny_params();
        let device = Default::default();
        let model = AtlasClassifierConfig::from_params(&params)
            .with_hidden_units(16)
            .init::<DefaultBackend>(&device);

        let generator = PredictGenerator::new(
            vec!["a".into(), "b".into(), "c".into()],
            &params,
            format!("{}/", dir.path().display()),
        )
        .unwrap();

        let table = generator.predict(&model, &device).unwrap();
        assert_eq!(table.identifiers, vec!["a", "b", "c"]);
        assert_eq!(table.rows.len(), 3);
        for row in &table.rows {
            assert_eq!(row.len(), 3);
            assert!(row.iter().all(|&p| p > 0.0 && p < 1.0));
        }
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let params = tiny_params();
        let device = Default::default();
        let model = AtlasClassifierConfig::from_params(&params)
            .with_hidden_units(16)
            .init::<DefaultBackend>(&device);

        let generator = PredictGenerator::new(
            vec!["ghost".into()],
            &params,
            format!("{}/", dir.path().display()),
        )
        .unwrap();
        assert!(generator.predict(&model, &device).is_err());
    }

    #[test]
    fn test_write_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let table = PredictionTable {
            identifiers: vec!["x".into(), "y".into()],
            rows: vec![vec![0.5, 0.25], vec![0.75, 0.0]],
        };
        let path = dir.path().join("predictions.csv");
        table
            .write_csv(&path, &["C0".to_string(), "C1".to_string()])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "Id,C0,C1");
        assert_eq!(lines.next().unwrap(), "x,0.5,0.25");
        assert_eq!(lines.next().unwrap(), "y,0.75,0");
    }
}
