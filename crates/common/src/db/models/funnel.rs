//! Review funnel stages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

/// Review-workflow status of a candidate document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunnelStage {
    #[serde(rename = "Identified")]
    Identified,
    #[serde(rename = "Screened")]
    Screened,
    #[serde(rename = "Sought Retrieval")]
    Sought,
    #[serde(rename = "Assessed Eligibility")]
    Assessed,
    #[serde(rename = "Included in Review")]
    Final,
}

impl FunnelStage {
    /// Funnel order, first to last
    pub const ALL: [FunnelStage; 5] = [
        FunnelStage::Identified,
        FunnelStage::Screened,
        FunnelStage::Sought,
        FunnelStage::Assessed,
        FunnelStage::Final,
    ];

    /// Value persisted in `result.funnel_stage`
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Identified => "Identified",
            FunnelStage::Screened => "Screened",
            FunnelStage::Sought => "Sought Retrieval",
            FunnelStage::Assessed => "Assessed Eligibility",
            FunnelStage::Final => "Included in Review",
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the stored value or a short, case-insensitive name
impl FromStr for FunnelStage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(stage) = FunnelStage::ALL.iter().find(|st| st.as_str() == trimmed) {
            return Ok(*stage);
        }

        match trimmed.to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "identified" => Ok(FunnelStage::Identified),
            "screened" => Ok(FunnelStage::Screened),
            "sought" | "sought retrieval" => Ok(FunnelStage::Sought),
            "assessed" | "assessed eligibility" => Ok(FunnelStage::Assessed),
            "final" | "included" | "included in review" => Ok(FunnelStage::Final),
            _ => Err(AppError::InvalidStage {
                value: trimmed.to_string(),
            }),
        }
    }
}

impl From<FunnelStage> for String {
    fn from(stage: FunnelStage) -> Self {
        stage.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_values() {
        let values: Vec<&str> = FunnelStage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            values,
            vec![
                "Identified",
                "Screened",
                "Sought Retrieval",
                "Assessed Eligibility",
                "Included in Review"
            ]
        );
    }

    #[test]
    fn test_lenient_parsing() {
        assert_eq!("Sought Retrieval".parse::<FunnelStage>().unwrap(), FunnelStage::Sought);
        assert_eq!("sought".parse::<FunnelStage>().unwrap(), FunnelStage::Sought);
        assert_eq!("ASSESSED".parse::<FunnelStage>().unwrap(), FunnelStage::Assessed);
        assert_eq!("included_in_review".parse::<FunnelStage>().unwrap(), FunnelStage::Final);
        assert_eq!("final".parse::<FunnelStage>().unwrap(), FunnelStage::Final);
        assert!("Reviewed".parse::<FunnelStage>().is_err());
    }

    #[test]
    fn test_serde_uses_stored_value() {
        let json = serde_json::to_string(&FunnelStage::Assessed).unwrap();
        assert_eq!(json, "\"Assessed Eligibility\"");
        let back: FunnelStage = serde_json::from_str("\"Included in Review\"").unwrap();
        assert_eq!(back, FunnelStage::Final);
    }

    #[test]
    fn test_into_stored_string() {
        assert_eq!(String::from(FunnelStage::Screened), "Screened");
    }
}
