use std::str::FromStr;

use crate::UnknownVariant;

pub const TROPHY_WAGER_THRESHOLD: f64 = 1_000_000.0;

pub const STAR_WIN_RATIO: f64 = 1.5;

/// Fraction of the wagered amount credited to the score regardless of the result.
pub const WAGER_SCORE_BONUS: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Achievement {
    Trophy,
    Star,
}

impl Achievement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Achievement::Trophy => "trophy",
            Achievement::Star => "star",
        }
    }
}

impl FromStr for Achievement {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trophy" => Ok(Achievement::Trophy),
            "star" => Ok(Achievement::Star),
            other => Err(UnknownVariant {
                kind: "achievement",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GameResult {
    pub wagered: f64,
    pub won: f64,
}

pub fn score_delta(result: &GameResult) -> f64 {
    (result.won - result.wagered) + WAGER_SCORE_BONUS * result.wagered
}

/// Accumulated results of one user within one leaderboard window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Standing {
    pub score: f64,
    pub games_played: u64,
    pub total_wagered: f64,
    pub total_won: f64,
    pub achievements: Vec<Achievement>,
}

impl Standing {
    /// Folds one game result into the standing and returns the achievements it newly earned.
    pub fn apply(&mut self, result: &GameResult) -> Vec<Achievement> {
        self.games_played += 1;
        self.total_wagered += result.wagered;
        self.total_won += result.won;
        self.score += score_delta(result);

        let mut earned = Vec::new();
        for achievement in self.qualifying_achievements() {
            if !self.achievements.contains(&achievement) {
                self.achievements.push(achievement);
                earned.push(achievement);
            }
        }
        earned
    }

    pub fn submit_score(&mut self, score: f64) {
        self.score = self.score.max(score);
    }

    fn qualifying_achievements(&self) -> Vec<Achievement> {
        let mut qualifying = Vec::new();
        if self.total_wagered >= TROPHY_WAGER_THRESHOLD {
            qualifying.push(Achievement::Trophy);
        }
        if self.total_won > STAR_WIN_RATIO * self.total_wagered {
            qualifying.push(Achievement::Star);
        }
        qualifying
    }
}
