//! Overlay settings consumed by the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Screen corner where the overlay badge is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    #[default]
    #[serde(alias = "bottomRight")]
    BottomRight,
    #[serde(alias = "bottomLeft")]
    BottomLeft,
    #[serde(alias = "topRight")]
    TopRight,
    #[serde(alias = "topLeft")]
    TopLeft,
}

impl fmt::Display for OverlayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BottomRight => write!(f, "bottom-right"),
            Self::BottomLeft => write!(f, "bottom-left"),
            Self::TopRight => write!(f, "top-right"),
            Self::TopLeft => write!(f, "top-left"),
        }
    }
}

impl FromStr for OverlayPosition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bottom-right" | "bottomRight" => Ok(Self::BottomRight),
            "bottom-left" | "bottomLeft" => Ok(Self::BottomLeft),
            "top-right" | "topRight" => Ok(Self::TopRight),
            "top-left" | "topLeft" => Ok(Self::TopLeft),
            other => Err(DomainError::InvalidFieldValue {
                field: "overlay_position".to_string(),
                value: other.to_string(),
                expected: "bottom-right, bottom-left, top-right or top-left".to_string(),
            }),
        }
    }
}

/// Effective overlay settings, surfaced to the browser overlay and in the
/// diagnostic document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfig {
    pub enabled: bool,
    pub overlay_position: OverlayPosition,
    pub open_browser_on_start: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            overlay_position: OverlayPosition::BottomRight,
            open_browser_on_start: false,
        }
    }
}
