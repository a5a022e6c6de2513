//! Exit targets for a position.

use ocbot_core::{Bot, PositionSide, Strategy};

use crate::price::{initial_stop_loss_by_risk_amount, initial_stop_loss_price, take_profit_price};

/// Take-profit and stop-loss prices derived for one position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitTargets {
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

impl ExitTargets {
    /// Targets for a position opened at `entry` with `quantity` contracts.
    ///
    /// The stop is sized by the bot's USD risk budget when it has one and the
    /// budget yields a valid price, otherwise by the strategy's `stoploss`.
    pub fn derive(
        strategy: &Strategy,
        bot: Option<&Bot>,
        entry: f64,
        quantity: f64,
        side: PositionSide,
    ) -> Self {
        let take_profit = take_profit_price(entry, strategy.oc, strategy.take_profit, side);
        let by_risk = bot
            .and_then(|b| b.risk_amount_usd)
            .and_then(|risk| initial_stop_loss_by_risk_amount(entry, quantity, risk, side));
        let stop_loss = by_risk.or_else(|| initial_stop_loss_price(entry, strategy.stoploss, side));
        Self {
            take_profit,
            stop_loss,
        }
    }
}
