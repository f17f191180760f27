//! # Estimation Capability
//!
//! The per-algorithm seam. The scheduler never performs an estimation itself;
//! it plans units whose bodies call into an [`Estimator`], and it asks the
//! estimator to turn a finished unit's side effects into a [`ResultRecord`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::EstimationSettings;
use crate::error::EstimationResult;
use crate::models::{CollectionProperties, InputItem, ResultRecord};

/// Microns to Ångström
const MICRONS_TO_ANGSTROM: f64 = 1e4;

/// Parameters handed to every estimation of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationParams {
    pub voltage: f64,
    pub spherical_aberration: f64,
    pub magnification: f64,
    pub amplitude_contrast: f64,
    /// Å/px after downsampling
    pub sampling_rate: f64,
    pub scanned_pixel_size: f64,
    pub window_size: u32,
    pub low_res: f64,
    pub high_res: f64,
    /// Å
    pub min_defocus: f64,
    /// Å
    pub max_defocus: f64,
}

impl EstimationParams {
    /// Parameters common to all items of an input collection
    pub fn from_collection(properties: &CollectionProperties, settings: &EstimationSettings) -> Self {
        let mut sampling_rate = properties.sampling_rate;
        if settings.down_factor != 1.0 {
            sampling_rate *= settings.down_factor;
        }
        let acquisition = &properties.acquisition;
        Self {
            voltage: acquisition.voltage,
            spherical_aberration: acquisition.spherical_aberration,
            magnification: acquisition.magnification,
            amplitude_contrast: acquisition.amplitude_contrast,
            sampling_rate,
            scanned_pixel_size: properties.scanned_pixel_size,
            window_size: settings.window_size,
            low_res: settings.low_res,
            high_res: settings.high_res,
            min_defocus: settings.min_defocus_um * MICRONS_TO_ANGSTROM,
            max_defocus: settings.max_defocus_um * MICRONS_TO_ANGSTROM,
        }
    }

    /// Parameters for re-estimating one item, taken from the item's own acquisition
    pub fn for_recalculation(item: &InputItem, settings: &EstimationSettings) -> Self {
        let acquisition = &item.acquisition;
        let magnification = acquisition.magnification;
        Self {
            voltage: acquisition.voltage,
            spherical_aberration: acquisition.spherical_aberration,
            magnification,
            amplitude_contrast: acquisition.amplitude_contrast,
            sampling_rate: item.sampling_rate,
            scanned_pixel_size: item.sampling_rate * magnification / 10000.0,
            window_size: settings.window_size,
            low_res: settings.low_res,
            high_res: settings.high_res,
            min_defocus: settings.min_defocus_um * MICRONS_TO_ANGSTROM,
            max_defocus: settings.max_defocus_um * MICRONS_TO_ANGSTROM,
        }
    }
}

/// Capability implemented once per estimation algorithm
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Estimate a single item, leaving its results as side effects
    async fn estimate_one(&self, item: &InputItem, params: &EstimationParams)
        -> EstimationResult<()>;

    /// Estimate several items at once. Algorithms that gain from batching
    /// override this; the default estimates them one by one.
    async fn estimate_batch(
        &self,
        items: &[Arc<InputItem>],
        params: &EstimationParams,
    ) -> EstimationResult<()> {
        for item in items {
            self.estimate_one(item, params).await?;
        }
        Ok(())
    }

    /// Re-estimate an item using the parameters carried by `annotation`
    async fn re_estimate(
        &self,
        item: &InputItem,
        annotation: &str,
        params: &EstimationParams,
    ) -> EstimationResult<()>;

    /// Build the result record from the side effects of a finished unit
    async fn synthesize_result(&self, item: &InputItem) -> EstimationResult<ResultRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Acquisition;

    fn properties() -> CollectionProperties {
        CollectionProperties {
            acquisition: Acquisition::default(),
            sampling_rate: 1.2,
            scanned_pixel_size: 7.0,
        }
    }

    #[test]
    fn test_params_convert_defocus_to_angstrom() {
        let params = EstimationParams::from_collection(&properties(), &EstimationSettings::default());
        assert_eq!(params.min_defocus, 2500.0);
        assert_eq!(params.max_defocus, 40000.0);
        assert_eq!(params.sampling_rate, 1.2);
        assert_eq!(params.window_size, 256);
    }

    #[test]
    fn test_params_apply_down_factor() {
        let settings = EstimationSettings {
            down_factor: 2.0,
            ..EstimationSettings::default()
        };
        let params = EstimationParams::from_collection(&properties(), &settings);
        assert_eq!(params.sampling_rate, 2.4);
    }

    #[test]
    fn test_recalculation_params_use_item_acquisition() {
        let mut item = InputItem::new(1, "mic_1", "/data/mic_1.mrc");
        item.sampling_rate = 2.0;
        item.acquisition.magnification = 60000.0;
        let params = EstimationParams::for_recalculation(&item, &EstimationSettings::default());
        assert_eq!(params.sampling_rate, 2.0);
        assert_eq!(params.scanned_pixel_size, 12.0);
    }
}
