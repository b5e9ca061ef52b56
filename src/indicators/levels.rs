//! Swing points and support/resistance clustering
//!
//! Swing highs become resistance candidates and swing lows become support
//! candidates. Nearby swings are merged into a single level whose price is the
//! running mean of its touches. Levels are ranked by touch count, with a
//! volume-weighted importance as the tie-breaker.

use crate::types::PriceBar;
use serde::{Deserialize, Serialize};

/// Level detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Bars that must be strictly lower (higher) on each side of a swing high (low)
    pub swing_radius: usize,
    /// Relative distance under which two swings merge into one level
    pub tolerance_pct: f64,
    /// Levels kept per side after ranking
    pub max_levels: usize,
    /// Newest bars scanned for swings
    pub lookback: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            swing_radius: 2,
            tolerance_pct: 0.002,
            max_levels: 5,
            lookback: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

/// A swing extreme
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    /// Window volume relative to the mean bar volume
    pub weight: f64,
}

/// A clustered price level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub touches: u32,
    pub importance: f64,
    pub kind: LevelKind,
}

/// Ranked supports and resistances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportResistance {
    pub supports: Vec<Level>,
    pub resistances: Vec<Level>,
}

impl SupportResistance {
    pub fn is_empty(&self) -> bool {
        self.supports.is_empty() && self.resistances.is_empty()
    }

    /// All levels regardless of kind
    pub fn all(&self) -> impl Iterator<Item = &Level> {
        self.supports.iter().chain(self.resistances.iter())
    }

    /// Lowest level of any kind strictly above `price`
    pub fn nearest_above(&self, price: f64) -> Option<&Level> {
        self.all()
            .filter(|l| l.price > price)
            .min_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Highest level of any kind strictly below `price`
    pub fn nearest_below(&self, price: f64) -> Option<&Level> {
        self.all()
            .filter(|l| l.price < price)
            .max_by(|a, b| a.price.total_cmp(&b.price))
    }
}

/// Strict swing highs: the bar's high exceeds every high within `radius` bars
/// on both sides.
pub fn swing_highs(bars: &[PriceBar], radius: usize) -> Vec<SwingPoint> {
    find_swings(bars, radius, |b| b.high, |candidate, other| candidate > other)
}

/// Strict swing lows
pub fn swing_lows(bars: &[PriceBar], radius: usize) -> Vec<SwingPoint> {
    find_swings(bars, radius, |b| b.low, |candidate, other| candidate < other)
}

/// Swing highs and lows in one pass, highs first
pub fn swing_points(bars: &[PriceBar], radius: usize) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    (swing_highs(bars, radius), swing_lows(bars, radius))
}

fn find_swings(
    bars: &[PriceBar],
    radius: usize,
    value: impl Fn(&PriceBar) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> Vec<SwingPoint> {
    if radius == 0 || bars.len() < 2 * radius + 1 {
        return Vec::new();
    }

    let mean_volume = bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64;
    let mut points = Vec::new();

    for i in radius..bars.len() - radius {
        let candidate = value(&bars[i]);
        let neighbours = (i - radius..=i + radius).filter(|&j| j != i);
        if neighbours.clone().all(|j| beats(candidate, value(&bars[j]))) {
            let window_volume: f64 = bars[i - radius..=i + radius].iter().map(|b| b.volume).sum();
            let window_len = (2 * radius + 1) as f64;
            let weight = if mean_volume > 0.0 {
                window_volume / window_len / mean_volume
            } else {
                1.0
            };
            points.push(SwingPoint { index: i, price: candidate, weight });
        }
    }

    points
}

/// Merge swing points lying within `tolerance_pct` of an existing level.
///
/// Points are visited in chronological order. A merge moves the level price to
/// the running mean of its touches and adds the point's weight to the
/// importance. The result is ranked by touches, then importance, and truncated
/// to `max_levels`.
pub fn cluster(points: &[SwingPoint], kind: LevelKind, tolerance_pct: f64, max_levels: usize) -> Vec<Level> {
    let mut levels: Vec<Level> = Vec::new();

    for point in points {
        if point.price <= 0.0 {
            continue;
        }
        let existing = levels
            .iter_mut()
            .find(|l| (point.price - l.price).abs() / l.price <= tolerance_pct);

        match existing {
            Some(level) => {
                let n = level.touches as f64;
                level.price = (level.price * n + point.price) / (n + 1.0);
                level.touches += 1;
                level.importance += point.weight;
            }
            None => levels.push(Level {
                price: point.price,
                touches: 1,
                importance: point.weight,
                kind,
            }),
        }
    }

    levels.sort_by(|a, b| {
        b.touches
            .cmp(&a.touches)
            .then_with(|| b.importance.total_cmp(&a.importance))
    });
    levels.truncate(max_levels);
    levels
}

/// Supports and resistances over the newest `config.lookback` bars
pub fn support_resistance(bars: &[PriceBar], config: &LevelConfig) -> SupportResistance {
    let start = bars.len().saturating_sub(config.lookback);
    let window = &bars[start..];

    let (highs, lows) = swing_points(window, config.swing_radius);

    SupportResistance {
        supports: cluster(&lows, LevelKind::Support, config.tolerance_pct, config.max_levels),
        resistances: cluster(&highs, LevelKind::Resistance, config.tolerance_pct, config.max_levels),
    }
}
