use std::{collections::HashMap, str::FromStr};

use crate::UnknownVariant;

pub const DEFAULT_HOUSE_EDGE: f64 = 2.5;

pub const DEFAULT_PAYOUT_MULTIPLIER: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    HouseEdge,
    FixedOdds,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::HouseEdge => "house_edge",
            OutcomeKind::FixedOdds => "fixed_odds",
        }
    }
}

impl FromStr for OutcomeKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "house_edge" => Ok(OutcomeKind::HouseEdge),
            "fixed_odds" => Ok(OutcomeKind::FixedOdds),
            other => Err(UnknownVariant {
                kind: "game kind",
                value: other.to_string(),
            }),
        }
    }
}

/// `house_edge` is a percentage in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OddsConfig {
    pub house_edge: f64,
    pub payout_multiplier: f64,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            house_edge: DEFAULT_HOUSE_EDGE,
            payout_multiplier: DEFAULT_PAYOUT_MULTIPLIER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetOutcome {
    pub won: bool,
    pub multiplier: f64,
    pub payout: f64,
}

impl BetOutcome {
    pub fn win(stake: f64, multiplier: f64) -> Self {
        Self {
            won: true,
            multiplier,
            payout: stake * multiplier,
        }
    }

    pub fn loss() -> Self {
        Self {
            won: false,
            multiplier: 0.0,
            payout: 0.0,
        }
    }
}

/// Resolves a bet from its stake, the game's odds and a uniform draw in `[0, 1)`.
pub type OutcomeStrategy = fn(f64, &OddsConfig, f64) -> BetOutcome;

pub fn house_edge_outcome(stake: f64, odds: &OddsConfig, draw: f64) -> BetOutcome {
    if draw >= odds.house_edge / 100.0 {
        BetOutcome::win(stake, odds.payout_multiplier)
    } else {
        BetOutcome::loss()
    }
}

pub fn fixed_odds_outcome(stake: f64, odds: &OddsConfig, draw: f64) -> BetOutcome {
    let win_probability = (1.0 - odds.house_edge / 100.0) / odds.payout_multiplier;
    if draw < win_probability {
        BetOutcome::win(stake, odds.payout_multiplier)
    } else {
        BetOutcome::loss()
    }
}

#[derive(Clone)]
pub struct OutcomeStrategies {
    strategies: HashMap<OutcomeKind, OutcomeStrategy>,
}

impl Default for OutcomeStrategies {
    fn default() -> Self {
        Self::new()
            .with(OutcomeKind::HouseEdge, house_edge_outcome)
            .with(OutcomeKind::FixedOdds, fixed_odds_outcome)
    }
}

impl OutcomeStrategies {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn with(mut self, kind: OutcomeKind, strategy: OutcomeStrategy) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    pub fn resolve(
        &self,
        kind: OutcomeKind,
        stake: f64,
        odds: &OddsConfig,
        draw: f64,
    ) -> Option<BetOutcome> {
        self.strategies
            .get(&kind)
            .map(|strategy| strategy(stake, odds, draw))
    }
}
