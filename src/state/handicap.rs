//! Match formats and the handicap chart deciding how many games each side needs.
//!
//! A chart is a contiguous list of differential bands. Lookups outside the
//! tabulated range are clamped to the first or last band: a mismatch larger
//! than anything the chart lists is scored like the largest listed one.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::game_record::Side;

/// Format of a match, carrying its game count, seating and threshold strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum MatchFormat {
    /// Three players a side, 18 games, integer handicaps.
    #[serde(rename = "3v3")]
    ThreeVThree,
    /// Three players a side, best of three, no chart.
    #[serde(rename = "tiebreaker")]
    Tiebreaker,
    /// Five players a side, 25 games, percentage handicaps.
    #[serde(rename = "5v5")]
    FiveVFive,
}

/// Formats that resolve their thresholds through a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFormat {
    /// 18-game chart.
    ThreeVThree,
    /// 25-game chart.
    FiveVFive,
}

/// Who plays whom in a given game and who breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Index into the home lineup.
    pub home_position: u8,
    /// Index into the away lineup.
    pub away_position: u8,
    /// Side breaking this game.
    pub breaking_side: Side,
}

impl MatchFormat {
    /// Number of games scheduled in the match.
    pub fn game_count(self) -> u8 {
        match self {
            MatchFormat::ThreeVThree => 18,
            MatchFormat::Tiebreaker => 3,
            MatchFormat::FiveVFive => 25,
        }
    }

    /// Number of lineup slots per side.
    pub fn players_per_side(self) -> usize {
        match self {
            MatchFormat::ThreeVThree | MatchFormat::Tiebreaker => 3,
            MatchFormat::FiveVFive => 5,
        }
    }

    /// Inclusive range of a single player's handicap.
    pub fn handicap_range(self) -> (i32, i32) {
        match self {
            MatchFormat::ThreeVThree | MatchFormat::Tiebreaker => (-2, 2),
            MatchFormat::FiveVFive => (0, 100),
        }
    }

    /// Chart used by the format, `None` for the fixed best-of-three.
    pub fn chart(self) -> Option<ChartFormat> {
        match self {
            MatchFormat::ThreeVThree => Some(ChartFormat::ThreeVThree),
            MatchFormat::FiveVFive => Some(ChartFormat::FiveVFive),
            MatchFormat::Tiebreaker => None,
        }
    }

    /// Seating for `game_number` (1-based), `None` when out of range.
    ///
    /// Round `r` pairs home slot `i` with away slot `(i + r) % n`, so every
    /// pairing appears once per round cycle. Home breaks the odd games.
    pub fn rotation(self, game_number: u8) -> Option<Rotation> {
        if game_number == 0 || game_number > self.game_count() {
            return None;
        }

        let index = game_number - 1;
        let (home_position, away_position) = match self {
            MatchFormat::Tiebreaker => (index, index),
            MatchFormat::ThreeVThree | MatchFormat::FiveVFive => {
                let slots = self.players_per_side() as u8;
                let in_cycle = index % (slots * slots);
                let round = in_cycle / slots;
                let home = in_cycle % slots;
                (home, (home + round) % slots)
            }
        };

        let breaking_side = if game_number % 2 == 1 {
            Side::Home
        } else {
            Side::Away
        };

        Some(Rotation {
            home_position,
            away_position,
            breaking_side,
        })
    }

    /// Handicap differential from the home side's point of view.
    ///
    /// Integer formats compare handicap totals; 5v5 compares average
    /// percentages, rounded to the nearest point. Team modifiers are added
    /// to their own side.
    pub fn differential(self, home: TeamHandicap<'_>, away: TeamHandicap<'_>) -> i32 {
        match self {
            MatchFormat::ThreeVThree | MatchFormat::Tiebreaker => {
                home.total() + home.modifier - away.total() - away.modifier
            }
            MatchFormat::FiveVFive => {
                let players = self.players_per_side() as f64;
                let gap = (home.total() - away.total()) as f64 / players;
                gap.round() as i32 + home.modifier - away.modifier
            }
        }
    }

    /// Resolve both sides' thresholds for a match.
    pub fn thresholds(self, charts: &HandicapCharts, differential: i32) -> MatchThresholds {
        match self.chart() {
            None => MatchThresholds {
                home: HandicapThresholds::TIEBREAKER,
                away: HandicapThresholds::TIEBREAKER,
            },
            Some(chart) => MatchThresholds {
                home: charts.thresholds(differential, chart),
                away: charts.thresholds(-differential, chart),
            },
        }
    }
}

/// Handicap values and modifier for one side's locked lineup.
#[derive(Debug, Clone, Copy)]
pub struct TeamHandicap<'a> {
    /// Handicap of every seated player.
    pub handicaps: &'a [i32],
    /// Team-level adjustment.
    pub modifier: i32,
}

impl TeamHandicap<'_> {
    fn total(&self) -> i32 {
        self.handicaps.iter().sum()
    }
}

/// Games a side needs to win, tie or lose the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HandicapThresholds {
    /// Confirmed wins that decide the match for this side.
    pub games_to_win: u8,
    /// Confirmed wins that tie the match, when the format allows ties.
    pub games_to_tie: Option<u8>,
    /// Confirmed wins at or below which this side loses.
    pub games_to_lose: u8,
}

impl HandicapThresholds {
    /// Fixed best-of-three used by tiebreaker matches.
    pub const TIEBREAKER: HandicapThresholds = HandicapThresholds {
        games_to_win: 2,
        games_to_tie: None,
        games_to_lose: 1,
    };

    /// Zero point for the running point differential.
    pub fn baseline(&self) -> u8 {
        self.games_to_tie.unwrap_or(self.games_to_win)
    }
}

/// Thresholds for both sides of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchThresholds {
    /// Home side thresholds.
    pub home: HandicapThresholds,
    /// Away side thresholds.
    pub away: HandicapThresholds,
}

impl MatchThresholds {
    /// Thresholds for `side`.
    pub fn for_side(&self, side: Side) -> HandicapThresholds {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }
}

/// One band of a chart: every differential in `min_diff..=max_diff` maps to
/// the same thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRow {
    /// Lowest differential of the band.
    pub min_diff: i32,
    /// Highest differential of the band.
    pub max_diff: i32,
    /// Games to win.
    pub games_to_win: u8,
    /// Games to tie.
    #[serde(default)]
    pub games_to_tie: Option<u8>,
    /// Games to lose.
    pub games_to_lose: u8,
}

impl ChartRow {
    const fn new(min_diff: i32, max_diff: i32, win: u8, tie: Option<u8>, lose: u8) -> Self {
        Self {
            min_diff,
            max_diff,
            games_to_win: win,
            games_to_tie: tie,
            games_to_lose: lose,
        }
    }

    fn thresholds(&self) -> HandicapThresholds {
        HandicapThresholds {
            games_to_win: self.games_to_win,
            games_to_tie: self.games_to_tie,
            games_to_lose: self.games_to_lose,
        }
    }
}

/// Reasons a chart table is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    /// No rows at all.
    #[error("handicap chart has no rows")]
    Empty,
    /// A row's lower bound is above its upper bound.
    #[error("handicap chart row {min_diff}..={max_diff} is inverted")]
    InvertedRow {
        /// Lower bound.
        min_diff: i32,
        /// Upper bound.
        max_diff: i32,
    },
    /// Rows overlap or leave a hole between them.
    #[error("handicap chart is not contiguous between {previous_max} and {next_min}")]
    Gap {
        /// Upper bound of the earlier row.
        previous_max: i32,
        /// Lower bound of the following row.
        next_min: i32,
    },
    /// Thresholds are not ordered lose < tie < win.
    #[error("handicap chart row {min_diff}..={max_diff} has unordered thresholds")]
    UnorderedThresholds {
        /// Lower bound.
        min_diff: i32,
        /// Upper bound.
        max_diff: i32,
    },
}

/// Lookup table from differential to thresholds for one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandicapChart {
    rows: Vec<ChartRow>,
}

impl HandicapChart {
    /// Build a chart, sorting rows and checking they tile the covered range.
    pub fn new(mut rows: Vec<ChartRow>) -> Result<Self, ChartError> {
        if rows.is_empty() {
            return Err(ChartError::Empty);
        }
        rows.sort_by_key(|row| row.min_diff);

        for row in &rows {
            if row.min_diff > row.max_diff {
                return Err(ChartError::InvertedRow {
                    min_diff: row.min_diff,
                    max_diff: row.max_diff,
                });
            }
            let tie_ok = row
                .games_to_tie
                .is_none_or(|tie| row.games_to_lose < tie && tie < row.games_to_win);
            if row.games_to_lose >= row.games_to_win || !tie_ok {
                return Err(ChartError::UnorderedThresholds {
                    min_diff: row.min_diff,
                    max_diff: row.max_diff,
                });
            }
        }

        for pair in rows.windows(2) {
            if pair[0].max_diff + 1 != pair[1].min_diff {
                return Err(ChartError::Gap {
                    previous_max: pair[0].max_diff,
                    next_min: pair[1].min_diff,
                });
            }
        }

        Ok(Self { rows })
    }

    /// Thresholds for `differential`, clamped to the tabulated range.
    pub fn lookup(&self, differential: i32) -> HandicapThresholds {
        let (first, last) = match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => (first, last),
            // `new` rejects empty tables.
            _ => return HandicapThresholds::TIEBREAKER,
        };
        let clamped = differential.clamp(first.min_diff, last.max_diff);

        self.rows
            .iter()
            .find(|row| row.min_diff <= clamped && clamped <= row.max_diff)
            .unwrap_or(last)
            .thresholds()
    }

    /// Rows in ascending differential order.
    pub fn rows(&self) -> &[ChartRow] {
        &self.rows
    }

    /// Built-in 18-game chart (differential of handicap totals, −12..=12).
    pub fn default_three_v_three() -> Self {
        Self {
            rows: THREE_V_THREE_ROWS.to_vec(),
        }
    }

    /// Built-in 25-game chart (differential of average percentage, −100..=100).
    pub fn default_five_v_five() -> Self {
        Self {
            rows: FIVE_V_FIVE_ROWS.to_vec(),
        }
    }
}

const THREE_V_THREE_ROWS: [ChartRow; 11] = [
    ChartRow::new(-12, -10, 5, Some(4), 3),
    ChartRow::new(-9, -8, 6, Some(5), 4),
    ChartRow::new(-7, -6, 7, Some(6), 5),
    ChartRow::new(-5, -4, 8, Some(7), 6),
    ChartRow::new(-3, -2, 9, Some(8), 7),
    ChartRow::new(-1, 1, 10, Some(9), 8),
    ChartRow::new(2, 3, 11, Some(10), 9),
    ChartRow::new(4, 5, 12, Some(11), 10),
    ChartRow::new(6, 7, 13, Some(12), 11),
    ChartRow::new(8, 9, 14, Some(13), 12),
    ChartRow::new(10, 12, 15, Some(14), 13),
];

const FIVE_V_FIVE_ROWS: [ChartRow; 9] = [
    ChartRow::new(-100, -40, 9, None, 8),
    ChartRow::new(-39, -25, 10, None, 9),
    ChartRow::new(-24, -15, 11, None, 10),
    ChartRow::new(-14, -5, 12, None, 11),
    ChartRow::new(-4, 4, 13, None, 12),
    ChartRow::new(5, 14, 14, None, 13),
    ChartRow::new(15, 24, 15, None, 14),
    ChartRow::new(25, 39, 16, None, 15),
    ChartRow::new(40, 100, 17, None, 16),
];

/// Charts for every chart-backed format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandicapCharts {
    three_v_three: HandicapChart,
    five_v_five: HandicapChart,
}

impl HandicapCharts {
    /// Assemble from explicit charts.
    pub fn new(three_v_three: HandicapChart, five_v_five: HandicapChart) -> Self {
        Self {
            three_v_three,
            five_v_five,
        }
    }

    /// Thresholds for `differential` in `format`.
    pub fn thresholds(&self, differential: i32, format: ChartFormat) -> HandicapThresholds {
        match format {
            ChartFormat::ThreeVThree => self.three_v_three.lookup(differential),
            ChartFormat::FiveVFive => self.five_v_five.lookup(differential),
        }
    }
}

impl Default for HandicapCharts {
    fn default() -> Self {
        Self {
            three_v_three: HandicapChart::default_three_v_three(),
            five_v_five: HandicapChart::default_five_v_five(),
        }
    }
}
