use serde::{Deserialize, Serialize};

/// Outcome of one stock check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockResult {
    InStock,
    OutOfStock,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StockResult {
    pub fn error(message: impl Into<String>) -> Self {
        StockResult::Error {
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StockResult::Error { .. })
    }

    /// The known-good status, if this result has one. Errors never make it into a snapshot.
    pub fn status(&self) -> Option<StockStatus> {
        match self {
            StockResult::InStock => Some(StockStatus::InStock),
            StockResult::OutOfStock => Some(StockStatus::OutOfStock),
            StockResult::Error { .. } => None,
        }
    }
}

impl From<StockStatus> for StockResult {
    fn from(status: StockStatus) -> Self {
        match status {
            StockStatus::InStock => StockResult::InStock,
            StockStatus::OutOfStock => StockResult::OutOfStock,
        }
    }
}

/// The subset of [`StockResult`] a snapshot may hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}
