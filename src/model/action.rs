use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::option::OptionContract;

/// What an options strategy wants done. `None` is purely diagnostic and
/// carries its explanation in `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BuyCall,
    BuyPut,
    SellCall,
    SellPut,
    BuyStraddle,
    SellStrangle,
    Close,
    CloseGroup,
    Roll,
    None,
}

impl ActionKind {
    pub fn is_entry(&self) -> bool {
        matches!(
            self,
            ActionKind::BuyCall
                | ActionKind::BuyPut
                | ActionKind::SellCall
                | ActionKind::SellPut
                | ActionKind::BuyStraddle
                | ActionKind::SellStrangle
        )
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, ActionKind::SellCall | ActionKind::SellPut | ActionKind::SellStrangle)
    }
}

/// A strategy intent: the action type, its target (a concrete contract, an
/// underlying for multi-leg builders, or a position/leg-group to unwind),
/// and optional flags threaded through to the risk manager.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<OptionContract>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leg_group: Option<String>,
    pub quantity: f64,
    /// Target days-to-expiry for multi-leg builders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_dte: Option<f64>,
    /// Wing distance for strangles, as a fraction of spot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otm_pct: Option<f64>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hedge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wheel_phase: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_reason: Option<String>,
}

impl Action {
    fn base(kind: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            contract: None,
            underlying: None,
            position_id: None,
            leg_group: None,
            quantity: 1.0,
            target_dte: None,
            otm_pct: None,
            reason: reason.into(),
            is_hedge: false,
            wheel_phase: None,
            score: None,
            score_reason: None,
        }
    }

    pub fn none(reason: impl Into<String>) -> Self {
        Self::base(ActionKind::None, reason)
    }

    pub fn contract_order(
        kind: ActionKind,
        contract: OptionContract,
        quantity: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            contract: Some(contract),
            quantity,
            ..Self::base(kind, reason)
        }
    }

    pub fn structure(
        kind: ActionKind,
        underlying: &str,
        target_dte: f64,
        quantity: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            underlying: Some(underlying.to_string()),
            target_dte: Some(target_dte),
            quantity,
            ..Self::base(kind, reason)
        }
    }

    pub fn close(position_id: &str, reason: impl Into<String>) -> Self {
        Self {
            position_id: Some(position_id.to_string()),
            ..Self::base(ActionKind::Close, reason)
        }
    }

    pub fn close_group(leg_group: &str, reason: impl Into<String>) -> Self {
        Self {
            leg_group: Some(leg_group.to_string()),
            ..Self::base(ActionKind::CloseGroup, reason)
        }
    }

    pub fn roll(position_id: &str, reason: impl Into<String>) -> Self {
        Self {
            position_id: Some(position_id.to_string()),
            ..Self::base(ActionKind::Roll, reason)
        }
    }

    pub fn hedged(mut self) -> Self {
        self.is_hedge = true;
        self
    }

    /// Premium in USD for actions carrying a concrete contract.
    pub fn premium_usd(&self) -> f64 {
        self.contract
            .as_ref()
            .map(|c| c.usd_price() * self.quantity)
            .unwrap_or(0.0)
    }
}

