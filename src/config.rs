use crate::error::{BenchmarkError, Result};
use crate::scoring::ScoringConfig;
use chrono::{Datelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(
        description = "Year that spreadsheet columns without a year header count back from. Defaults to the current UTC year."
    )]
    pub reference_year: Option<i32>,

    #[schemars(description = "Number of periods scored and reported, latest first")]
    pub max_periods: usize,

    #[schemars(
        description = "Use the caller's fiscal year hint even when the document states a year"
    )]
    pub prefer_year_hint: bool,

    #[schemars(description = "A workbook sheet whose name contains one of these is read first")]
    pub sheet_name_keywords: Vec<String>,

    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_year: None,
            max_periods: 3,
            prefer_year_hint: false,
            sheet_name_keywords: vec!["入力".to_string(), "input".to_string()],
            scoring: ScoringConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_periods == 0 {
            return Err(BenchmarkError::InvalidConfig(
                "max_periods must be at least 1".to_string(),
            ));
        }

        if let Some(year) = self.reference_year {
            if !(1900..=2100).contains(&year) {
                return Err(BenchmarkError::InvalidConfig(format!(
                    "reference_year {} is outside 1900-2100",
                    year
                )));
            }
        }

        self.scoring.validate()
    }

    pub fn current_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Utc::now().year())
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(EngineConfig);
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_periods, 3);
        assert!(!config.prefer_year_hint);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "reference_year": 2024 }"#).unwrap();
        assert_eq!(config.current_year(), 2024);
        assert_eq!(config.max_periods, 3);
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn test_invalid_json_config_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "max_periods": 0 }"#),
            Err(BenchmarkError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "max_periods": "three" }"#),
            Err(BenchmarkError::SerializationError(_))
        ));
        assert!(EngineConfig::from_json_str(
            r#"{ "scoring": { "soundness": { "ladder": { "direction": "descending", "breakpoints": [7, 5, 3, 1] }, "missing": "not_enough_data" } } }"#
        )
        .is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema = EngineConfig::schema_as_json().unwrap();
        assert!(schema.contains("reference_year"));
        assert!(schema.contains("breakpoints"));
    }
}
