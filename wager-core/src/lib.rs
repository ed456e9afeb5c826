mod outcome;
mod period;
mod score;

pub use outcome::{
    BetOutcome, DEFAULT_HOUSE_EDGE, DEFAULT_PAYOUT_MULTIPLIER, OddsConfig, OutcomeKind,
    OutcomeStrategies, OutcomeStrategy, fixed_odds_outcome, house_edge_outcome,
};
pub use period::{Period, PeriodWindow, period_window, retention_cutoff};
pub use score::{
    Achievement, GameResult, STAR_WIN_RATIO, Standing, TROPHY_WAGER_THRESHOLD, WAGER_SCORE_BONUS,
    score_delta,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}
