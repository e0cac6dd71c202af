use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::Month;

use crate::{ConfigError, UtcDateTime, ValidationError};

/// Provider identifier and validity range of one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub station_id: String,
    #[serde(alias = "date0")]
    pub valid_from: UtcDateTime,
    #[serde(alias = "datef")]
    pub valid_to: UtcDateTime,
}

impl StationMetadata {
    pub fn new(
        station_id: impl Into<String>,
        valid_from: UtcDateTime,
        valid_to: UtcDateTime,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            valid_from,
            valid_to,
        }
    }
}

/// Station name to metadata map. Built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationCatalog {
    stations: BTreeMap<String, StationMetadata>,
}

impl StationCatalog {
    pub fn new(stations: BTreeMap<String, StationMetadata>) -> Result<Self, ValidationError> {
        for (name, metadata) in &stations {
            if metadata.valid_from > metadata.valid_to {
                return Err(ValidationError::InvalidStationRange {
                    name: name.clone(),
                    valid_from: metadata.valid_from,
                    valid_to: metadata.valid_to,
                });
            }
        }
        Ok(Self { stations })
    }

    /// The two Antarctic stations served by default, valid 2020-01-01 to 2024-01-01 UTC.
    pub fn builtin() -> Self {
        let (Ok(valid_from), Ok(valid_to)) = (
            UtcDateTime::from_ymd(2020, Month::January, 1),
            UtcDateTime::from_ymd(2024, Month::January, 1),
        ) else {
            return Self::default();
        };

        let stations = [
            ("Meteo Station Gabriel de Castilla", "89070"),
            ("Meteo Station Juan Carlos I", "89064"),
        ]
        .into_iter()
        .map(|(name, id)| {
            (
                name.to_owned(),
                StationMetadata::new(id, valid_from, valid_to),
            )
        })
        .collect();

        Self { stations }
    }

    pub fn from_json_str(input: &str) -> Result<Self, ValidationError> {
        let stations: BTreeMap<String, StationMetadata> =
            serde_json::from_str(input).map_err(|error| ValidationError::InvalidCatalog {
                message: error.to_string(),
            })?;
        Self::new(stations)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|error| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Ok(Self::from_json_str(&contents)?)
    }

    /// Add or replace one station.
    pub fn insert(&mut self, name: impl Into<String>, metadata: StationMetadata) {
        self.stations.insert(name.into(), metadata);
    }

    pub fn get(&self, name: &str) -> Option<&StationMetadata> {
        self.stations.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.stations.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StationMetadata)> {
        self.stations
            .iter()
            .map(|(name, metadata)| (name.as_str(), metadata))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
