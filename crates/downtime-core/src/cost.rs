//! Engineering cost curve.
//!
//! Every modification already attached to an item makes further engineering
//! on it more expensive. The curve grows exponentially in the number of
//! modifications `n`:
//!
//! ```text
//! base(n)  = ceil(base_cost * exp(n / growth_divisor))
//! maintain = ceil(base(n) * maintain_ratio)
//! modify   = ceil(base(n) * modify_ratio)
//! ```

use serde::{Deserialize, Serialize};

/// Which engineering operation is being priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineeringKind {
    Maintain,
    Modify,
}

/// Catalog-defined stacking surcharge for engineering actions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostCurve {
    pub growth_divisor: f64,
    pub maintain_ratio: f64,
    pub modify_ratio: f64,
}

impl Default for CostCurve {
    fn default() -> Self {
        Self {
            growth_divisor: 2.5,
            maintain_ratio: 0.1,
            modify_ratio: 0.5,
        }
    }
}

impl CostCurve {
    /// Blueprint base cost scaled by `mod_count` modifications.
    pub fn scaled_base(&self, base_cost: u64, mod_count: u32) -> u64 {
        let exponent = mod_count as f64 / self.growth_divisor;
        (base_cost as f64 * exponent.exp()).ceil() as u64
    }

    /// Cost of one engineering action on an instance carrying `mod_count`
    /// modifications.
    pub fn cost(&self, kind: EngineeringKind, base_cost: u64, mod_count: u32) -> u64 {
        let base = self.scaled_base(base_cost, mod_count) as f64;
        let ratio = match kind {
            EngineeringKind::Maintain => self.maintain_ratio,
            EngineeringKind::Modify => self.modify_ratio,
        };
        (base * ratio).ceil() as u64
    }

    /// True when every parameter is finite and the curve cannot shrink.
    pub fn is_valid(&self) -> bool {
        self.growth_divisor.is_finite()
            && self.growth_divisor > 0.0
            && self.maintain_ratio.is_finite()
            && self.maintain_ratio >= 0.0
            && self.modify_ratio.is_finite()
            && self.modify_ratio >= 0.0
    }
}
