use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Ubuntu Server 12.04 LTS, 64-bit EBS.
const BUILTIN_IMAGES: [(&str, &str); 7] = [
    ("ap-northeast-1", "ami-c641f2c7"),
    ("ap-southeast-1", "ami-acf6b0fe"),
    ("eu-west-1", "ami-ab9491df"),
    ("sa-east-1", "ami-5c03dd41"),
    ("us-east-1", "ami-82fa58eb"),
    ("us-west-1", "ami-5965401c"),
    ("us-west-2", "ami-4438b474"),
];

/// Region -> machine image used for new agents. The set of keys is also the
/// set of regions the coordinator accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTable {
    images: BTreeMap<String, String>,
}

impl ImageTable {
    /// Built-in table with `overrides` merged on top.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut images: BTreeMap<String, String> = BUILTIN_IMAGES
            .iter()
            .map(|(region, image)| ((*region).to_owned(), (*image).to_owned()))
            .collect();
        images.extend(
            overrides
                .iter()
                .map(|(region, image)| (region.clone(), image.clone())),
        );
        Self { images }
    }

    /// # Errors
    ///
    /// Returns an error when the region is not in the table.
    pub fn image_for(&self, region: &str) -> Result<&str, ConfigError> {
        self.images
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownRegion {
                region: region.to_owned(),
                known: self.known_regions(),
            })
    }

    /// # Errors
    ///
    /// Returns an error for an empty list or the first unknown region.
    pub fn validate_regions(&self, regions: &[String]) -> Result<(), ConfigError> {
        if regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        for region in regions {
            self.image_for(region)?;
        }
        Ok(())
    }

    fn known_regions(&self) -> String {
        self.images
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for ImageTable {
    fn default() -> Self {
        Self::with_overrides(&BTreeMap::new())
    }
}
