//! First-in-first-out consumption of open lots.
//!
//! Planning is pure: it decides which lots a sale consumes and what they cost, and
//! expresses the result as `LotChange`s for the store to apply atomically.

use crate::error::TradeError;
use core_types::Lot;
use database::LotChange;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// How much of one lot a sale consumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotFill {
    pub lot_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// What is left in the lot afterwards. Zero means the lot is deleted.
    pub remaining: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalePlan {
    pub fills: Vec<LotFill>,
    /// Total cost basis of the shares sold.
    pub cost_removed: Decimal,
    pub lot_changes: Vec<LotChange>,
}

impl SalePlan {
    /// Cost basis per share sold.
    pub fn average_cost(&self, quantity: Decimal) -> Decimal {
        if quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.cost_removed / quantity
        }
    }
}

/// Plans the sale of `quantity` shares out of `lots`, which must already be in
/// FIFO order (oldest first).
pub fn plan_sale(symbol: &str, lots: &[Lot], quantity: Decimal) -> Result<SalePlan, TradeError> {
    let owned: Decimal = lots.iter().map(|lot| lot.quantity).sum();
    if owned < quantity {
        return Err(TradeError::InsufficientShares {
            symbol: symbol.to_string(),
            owned,
            requested: quantity,
        });
    }

    let mut remaining = quantity;
    let mut plan = SalePlan {
        fills: Vec::new(),
        cost_removed: Decimal::ZERO,
        lot_changes: Vec::new(),
    };

    for lot in lots {
        if remaining <= Decimal::ZERO {
            break;
        }
        let taken = remaining.min(lot.quantity);
        let cost = taken
            .checked_mul(lot.unit_cost)
            .ok_or_else(|| overflow(symbol, "lot cost"))?;
        plan.cost_removed = plan
            .cost_removed
            .checked_add(cost)
            .ok_or_else(|| overflow(symbol, "cost basis"))?;

        let left = lot.quantity - taken;
        if left.is_zero() {
            plan.lot_changes.push(LotChange::Delete {
                lot_id: lot.lot_id,
                quantity: lot.quantity,
            });
        } else {
            plan.lot_changes.push(LotChange::Reduce {
                lot_id: lot.lot_id,
                from: lot.quantity,
                to: left,
            });
        }
        plan.fills.push(LotFill {
            lot_id: lot.lot_id,
            quantity: taken,
            unit_cost: lot.unit_cost,
            remaining: left,
        });
        remaining -= taken;
    }

    Ok(plan)
}

fn overflow(symbol: &str, what: &str) -> TradeError {
    TradeError::Validation(format!("{} for {} is out of range", what, symbol))
}
