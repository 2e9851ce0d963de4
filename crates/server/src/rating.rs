//! Fixed-step skill ratings and adaptive opponent strength.
//!
//! Each time-control category keeps its own rating and results. The
//! opponent's rating and the losing streak are shared across categories; the
//! streak lowers the strength the engine is configured with, 50 points per
//! consecutive loss, never below the floor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::clock::TimeControl;
use crate::db::profiles::ProfileStore;
use crate::store::LocalStore;

pub const INITIAL_RATING: u32 = 1200;
pub const DEFAULT_FLOOR: u32 = 800;
/// Rating change per decisive game
pub const RATING_STEP: u32 = 25;
/// Opponent strength handicap per consecutive loss
pub const STREAK_HANDICAP: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Bullet,
    Blitz,
    Rapid,
    Classical,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Bullet,
        Category::Blitz,
        Category::Rapid,
        Category::Classical,
    ];

    /// Tier by total seconds; untimed games count as classical.
    pub fn from_time_control(time_control: Option<TimeControl>) -> Self {
        match time_control.map(|tc| tc.total_seconds) {
            Some(t) if t < 180 => Category::Bullet,
            Some(t) if t < 600 => Category::Blitz,
            Some(t) if t < 1800 => Category::Rapid,
            _ => Category::Classical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryStats {
    pub rating: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl Default for CategoryStats {
    fn default() -> Self {
        Self {
            rating: INITIAL_RATING,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }
}

impl CategoryStats {
    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Whole-percent win rate, 0 with no games.
    pub fn win_rate(&self) -> u32 {
        match self.games() {
            0 => 0,
            n => ((self.wins as f64 / n as f64) * 100.0).round() as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingRecord {
    pub bullet: CategoryStats,
    pub blitz: CategoryStats,
    pub rapid: CategoryStats,
    pub classical: CategoryStats,
    pub opponent_rating: u32,
    pub loss_streak: u32,
}

impl Default for RatingRecord {
    fn default() -> Self {
        Self {
            bullet: CategoryStats::default(),
            blitz: CategoryStats::default(),
            rapid: CategoryStats::default(),
            classical: CategoryStats::default(),
            opponent_rating: INITIAL_RATING,
            loss_streak: 0,
        }
    }
}

impl RatingRecord {
    pub fn category(&self, category: Category) -> &CategoryStats {
        match category {
            Category::Bullet => &self.bullet,
            Category::Blitz => &self.blitz,
            Category::Rapid => &self.rapid,
            Category::Classical => &self.classical,
        }
    }

    pub fn category_mut(&mut self, category: Category) -> &mut CategoryStats {
        match category {
            Category::Bullet => &mut self.bullet,
            Category::Blitz => &mut self.blitz,
            Category::Rapid => &mut self.rapid,
            Category::Classical => &mut self.classical,
        }
    }
}

/// `max(floor, opponent_rating - 50 * loss_streak)`
pub fn effective_opponent_strength(opponent_rating: u32, loss_streak: u32, floor: u32) -> u32 {
    let handicapped = opponent_rating as i64 - loss_streak as i64 * STREAK_HANDICAP as i64;
    handicapped.max(floor as i64) as u32
}

/// Apply one game result to `record`.
pub fn apply_result(record: &mut RatingRecord, category: Category, result: GameResult, floor: u32) {
    {
        let stats = record.category_mut(category);
        match result {
            GameResult::Win => {
                stats.rating += RATING_STEP;
                stats.wins += 1;
            }
            GameResult::Loss => {
                stats.rating = stats.rating.saturating_sub(RATING_STEP);
                stats.losses += 1;
            }
            GameResult::Draw => stats.draws += 1,
        }
    }

    match result {
        GameResult::Win => {
            record.opponent_rating += RATING_STEP;
            record.loss_streak = 0;
        }
        GameResult::Loss => {
            record.opponent_rating = record.opponent_rating.saturating_sub(RATING_STEP).max(floor);
            record.loss_streak += 1;
        }
        GameResult::Draw => record.loss_streak = 0,
    }
}

/// Remote copy of the record for an authenticated identity.
#[derive(Clone)]
pub struct RemoteSync {
    pub store: Arc<dyn ProfileStore>,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub rating: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub games: u32,
    pub win_rate: u32,
}

/// What the UI shows for the rating record.
#[derive(Debug, Clone, Serialize)]
pub struct RatingsView {
    pub categories: Vec<CategorySummary>,
    pub opponent_rating: u32,
    pub loss_streak: u32,
    pub opponent_strength: u32,
    pub skill_level: u8,
}

/// Owner of the rating record; the only writer.
pub struct RatingEngine {
    record: RatingRecord,
    floor: u32,
    local: LocalStore,
    remote: Option<RemoteSync>,
}

impl RatingEngine {
    pub fn new(mut record: RatingRecord, floor: u32, local: LocalStore, remote: Option<RemoteSync>) -> Self {
        record.opponent_rating = record.opponent_rating.max(floor);
        Self {
            record,
            floor,
            local,
            remote,
        }
    }

    /// Load the local record, replaced by the remote profile when one exists.
    pub async fn load(floor: u32, local: LocalStore, remote: Option<RemoteSync>) -> Self {
        let mut record = match local.load() {
            Ok(Some(record)) => record,
            Ok(None) => RatingRecord::default(),
            Err(e) => {
                warn!(path = %local.path().display(), error = %e, "unreadable local ratings, starting fresh");
                RatingRecord::default()
            }
        };

        if let Some(sync) = &remote {
            match sync.store.fetch(sync.user_id).await {
                Ok(Some(remote_record)) => {
                    info!(user_id = sync.user_id, "loaded remote rating profile");
                    record = remote_record;
                    if let Err(e) = local.save(&record) {
                        warn!(error = %e, "failed to cache remote profile locally");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(user_id = sync.user_id, error = %e, "remote profile fetch failed, using local record"),
            }
        }

        Self::new(record, floor, local, remote)
    }

    pub fn record(&self) -> &RatingRecord {
        &self.record
    }

    pub fn floor(&self) -> u32 {
        self.floor
    }

    /// Strength the engine should play at right now.
    pub fn opponent_strength(&self) -> u32 {
        effective_opponent_strength(self.record.opponent_rating, self.record.loss_streak, self.floor)
    }

    /// Record a finished game, persist locally, and push to the remote store
    /// in the background. Remote failures are logged only.
    pub fn settle_game(&mut self, category: Category, result: GameResult) -> RatingRecord {
        apply_result(&mut self.record, category, result, self.floor);
        info!(
            ?category,
            ?result,
            rating = self.record.category(category).rating,
            opponent_rating = self.record.opponent_rating,
            loss_streak = self.record.loss_streak,
            "game settled"
        );

        if let Err(e) = self.local.save(&self.record) {
            error!(path = %self.local.path().display(), error = %e, "failed to persist ratings");
        }

        if let Some(sync) = self.remote.clone() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let record = self.record.clone();
                    handle.spawn(async move {
                        if let Err(e) = sync.store.upsert(sync.user_id, &record).await {
                            warn!(user_id = sync.user_id, error = %e, "failed to sync ratings");
                        }
                    });
                }
                Err(_) => warn!("no runtime, remote rating sync skipped"),
            }
        }

        self.record.clone()
    }

    pub fn view(&self) -> RatingsView {
        let strength = self.opponent_strength();
        RatingsView {
            categories: Category::ALL
                .iter()
                .map(|&category| {
                    let stats = self.record.category(category);
                    CategorySummary {
                        category,
                        rating: stats.rating,
                        wins: stats.wins,
                        losses: stats.losses,
                        draws: stats.draws,
                        games: stats.games(),
                        win_rate: stats.win_rate(),
                    }
                })
                .collect(),
            opponent_rating: self.record.opponent_rating,
            loss_streak: self.record.loss_streak,
            opponent_strength: strength,
            skill_level: uci_engine::skill_level(strength),
        }
    }
}
