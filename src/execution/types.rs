use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Target fractional allocation for one asset, as handed over by the optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub symbol: String,
    pub weight: Decimal, // 0..1, weights of a portfolio sum to <= 1
}

impl AssetWeight {
    pub fn new(symbol: impl Into<String>, weight: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }
}

/// Latest known tradable price for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
        }
    }
}

/// Whole-share holding for one asset in an allocation plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub shares: u64,
    pub price: Decimal,
    pub target_weight: Decimal, // Weight after the over-allocation guard
}

impl Position {
    pub fn cost(&self) -> Decimal {
        Decimal::from(self.shares) * self.price
    }
}

/// Concrete buy list produced from target weights and a budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub budget: Decimal,
    pub positions: Vec<Position>, // Same order as the input weights
    pub leftover_cash: Decimal,
}

impl AllocationPlan {
    /// Plan that holds nothing and keeps the whole budget as cash
    pub fn uninvested(budget: Decimal) -> Self {
        Self {
            budget,
            positions: Vec::new(),
            leftover_cash: budget,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn shares(&self, symbol: &str) -> Option<u64> {
        self.positions
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.shares)
    }

    pub fn spent(&self) -> Decimal {
        self.positions.iter().map(Position::cost).sum()
    }

    /// Symbol and share count pairs in plan order
    pub fn share_counts(&self) -> Vec<(&str, u64)> {
        self.positions
            .iter()
            .map(|p| (p.symbol.as_str(), p.shares))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("investment budget must be positive")]
    InvalidBudget,
    #[error("missing or non-positive price for {0}")]
    InvalidPrice(String),
}
