//! Board evaluation: named heuristics over the unpacked grid and a weighted
//! composite evaluator.
//!
//! Every heuristic returns an integer in [0, 1000]; the composite multiplies
//! each by its floating weight and sums. Weights are not normalized here;
//! the tuner normalizes when it mutates.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use crate::board::State;
use crate::logger::{Group, Logger};

/// Unpacked cell values, `grid[row][col]`.
pub type Grid = [[u8; 4]; 4];

pub type EvalFn = fn(&Grid) -> u64;

/// Heuristic name to weight. Ordered so serialization and iteration are
/// deterministic.
pub type EvalParams = BTreeMap<String, f64>;

/// The registered heuristics, in the order weight files list them.
pub const HEURISTIC_NAMES: [&str; 6] = [
    "emptyTiles",
    "monotonicity",
    "smoothness",
    "cornerValue",
    "mergeability",
    "patternMatching",
];

pub fn max_tile(grid: &Grid) -> u8 {
    let mut max = 0;
    for row in grid {
        for &cell in row {
            max = max.max(cell);
        }
    }
    max
}

/// Count of empty cells, scaled so 16 empties score 1000.
pub fn empty_tiles(grid: &Grid) -> u64 {
    let count = grid
        .iter()
        .flatten()
        .filter(|&&cell| cell == 0)
        .count() as u64;
    count * 1000 / 16
}

/// 125 points for each row and column that is weakly increasing or weakly
/// decreasing (constant lines qualify as both).
pub fn monotonicity(grid: &Grid) -> u64 {
    let mut score = 0;
    for row in 0..4 {
        let mut increasing = true;
        let mut decreasing = true;
        for col in 1..4 {
            if grid[row][col] < grid[row][col - 1] {
                increasing = false;
            }
            if grid[row][col] > grid[row][col - 1] {
                decreasing = false;
            }
        }
        score += if increasing || decreasing { 125 } else { 0 };
    }
    for col in 0..4 {
        let mut increasing = true;
        let mut decreasing = true;
        for row in 1..4 {
            if grid[row][col] < grid[row - 1][col] {
                increasing = false;
            }
            if grid[row][col] > grid[row - 1][col] {
                decreasing = false;
            }
        }
        score += if increasing || decreasing { 125 } else { 0 };
    }
    score
}

/// Potential of adjacent equal pairs, weighted by tile value and normalized
/// against a board full of the largest tile.
pub fn mergeability(grid: &Grid) -> u64 {
    let max = max_tile(grid);
    // 24 adjacent pairs on a 4x4 grid; small boards get a fixed floor
    let max_score: u64 = if max > 1 { 24 * (1u64 << max) * 2 } else { 2048 };

    let mut score = 0u64;
    for row in 0..4 {
        for col in 0..3 {
            if grid[row][col] > 0 && grid[row][col] == grid[row][col + 1] {
                score += (1u64 << grid[row][col]) * 2;
            }
        }
    }
    for col in 0..4 {
        for row in 0..3 {
            if grid[row][col] > 0 && grid[row][col] == grid[row + 1][col] {
                score += (1u64 << grid[row][col]) * 2;
            }
        }
    }
    (score * 1000 / max_score).min(1000)
}

/// Average closeness of adjacent occupied cells: 1000 for an equal pair,
/// falling off with the difference in exponents.
pub fn smoothness(grid: &Grid) -> u64 {
    let mut score = 0u64;
    let mut pairs = 0u64;
    let mut visit = |a: u8, b: u8| {
        if a > 0 && b > 0 {
            score += if a == b {
                1000
            } else {
                500 / (1 + (a as i32 - b as i32).unsigned_abs() as u64)
            };
            pairs += 1;
        }
    };
    for row in 0..4 {
        for col in 0..3 {
            visit(grid[row][col], grid[row][col + 1]);
        }
    }
    for col in 0..4 {
        for row in 0..3 {
            visit(grid[row][col], grid[row + 1][col]);
        }
    }
    if pairs > 0 {
        score / pairs
    } else {
        0
    }
}

/// 250 points per corner holding the largest tile.
pub fn corner_value(grid: &Grid) -> u64 {
    let max = max_tile(grid);
    let corners = [grid[0][0], grid[0][3], grid[3][0], grid[3][3]];
    corners.iter().filter(|&&c| c == max).count() as u64 * 250
}

/// How closely tile mass follows the serpentine weighting that herds large
/// tiles into the top-left corner.
pub fn pattern_matching(grid: &Grid) -> u64 {
    const SNAKE_WEIGHTS: [[u64; 4]; 4] = [
        [15, 14, 13, 12],
        [8, 9, 10, 11],
        [7, 6, 5, 4],
        [0, 1, 2, 3],
    ];
    const WEIGHT_SUM: u64 = 120;

    let max = max_tile(grid);
    let max_score: u64 = if max > 1 {
        (1u64 << max) * WEIGHT_SUM
    } else {
        2048
    };

    let mut score = 0u64;
    for row in 0..4 {
        for col in 0..4 {
            if grid[row][col] > 0 {
                score += (1u64 << grid[row][col]) * SNAKE_WEIGHTS[row][col];
            }
        }
    }
    (score * 1000 / max_score).min(1000)
}

/// Look up a heuristic by its registered name.
pub fn named_heuristic(name: &str) -> Option<EvalFn> {
    match name {
        "emptyTiles" => Some(empty_tiles),
        "monotonicity" => Some(monotonicity),
        "mergeability" => Some(mergeability),
        "smoothness" => Some(smoothness),
        "cornerValue" => Some(corner_value),
        "patternMatching" => Some(pattern_matching),
        _ => None,
    }
}

fn params(entries: &[(&str, f64)]) -> EvalParams {
    entries
        .iter()
        .map(|&(name, weight)| (name.to_string(), weight))
        .collect()
}

/// Named weight presets. Unknown names fall back to `standard`.
pub fn preset_params(name: &str) -> EvalParams {
    match name {
        "corner" => params(&[("cornerValue", 1000.0)]),
        "merge" => params(&[("mergeability", 1000.0)]),
        "pattern" => params(&[("patternMatching", 1000.0)]),
        "empty" => params(&[("emptyTiles", 1000.0)]),
        "balanced" => params(&[
            ("emptyTiles", 200.0),
            ("monotonicity", 200.0),
            ("smoothness", 200.0),
            ("cornerValue", 200.0),
            ("patternMatching", 200.0),
        ]),
        "best" => params(&[
            ("emptyTiles", 427.0),
            ("monotonicity", 12.0),
            ("smoothness", 29.0),
            ("cornerValue", 67.0),
            ("patternMatching", 186.0),
        ]),
        // "standard", "combined", and anything unrecognized
        _ => params(&[
            ("emptyTiles", 250.0),
            ("monotonicity", 250.0),
            ("smoothness", 250.0),
            ("cornerValue", 250.0),
        ]),
    }
}

struct Component {
    name: String,
    weight: f64,
    func: EvalFn,
}

/// Weighted sum of named heuristics.
///
/// Unknown names in the parameter map are dropped; an empty component set
/// falls back to `emptyTiles` at weight 1000 so the evaluator is never
/// degenerate.
pub struct CompositeEvaluator {
    components: Vec<Component>,
}

impl CompositeEvaluator {
    pub fn new(params: &EvalParams) -> Self {
        let mut components: Vec<Component> = params
            .iter()
            .filter_map(|(name, &weight)| {
                named_heuristic(name).map(|func| Component {
                    name: name.clone(),
                    weight,
                    func,
                })
            })
            .collect();
        if components.is_empty() {
            components.push(Component {
                name: "emptyTiles".to_string(),
                weight: 1000.0,
                func: empty_tiles,
            });
        }
        Self { components }
    }

    pub fn evaluate(&self, state: State) -> f64 {
        let grid = state.unpack();
        self.components
            .iter()
            .map(|c| (c.func)(&grid) as f64 * c.weight)
            .sum()
    }

    pub fn params(&self) -> EvalParams {
        self.components
            .iter()
            .map(|c| (c.name.clone(), c.weight))
            .collect()
    }
}

/// Compact one-line rendering: `name: weight (pct%), ...`
pub fn params_to_string(params: &EvalParams) -> String {
    let total: f64 = params.values().sum();
    let mut out = String::new();
    for (i, (name, weight)) in params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if total > 0.0 {
            let _ = write!(out, "{name}: {weight:.0} ({:.1}%)", weight * 100.0 / total);
        } else {
            let _ = write!(out, "{name}: {weight:.0}");
        }
    }
    out
}

/// Formatted weight table, heaviest component first.
pub fn params_table(params: &EvalParams) -> String {
    let total: f64 = params.values().sum();
    let mut rows: Vec<(&String, f64)> = params.iter().map(|(n, &w)| (n, w)).collect();
    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let rule = "-".repeat(44);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "| {:<16} | {:>7} | {:>9} |", "Component", "Weight", "Share");
    let _ = writeln!(out, "{rule}");
    for (name, weight) in rows {
        let pct = if total > 0.0 {
            weight * 100.0 / total
        } else {
            0.0
        };
        let _ = writeln!(out, "| {name:<16} | {weight:>7.0} | {pct:>8.1}% |");
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "| {:<16} | {total:>7.0} | {:>8.1}% |", "Total", 100.0);
    let _ = writeln!(out, "{rule}");
    out
}

/// A weight value from JSON: a number or a quoted number.
pub(crate) fn weight_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Load a weight map from JSON. Values may be numbers or quoted numbers;
/// anything else is skipped with a warning. A missing, unreadable, or empty
/// file yields the `standard` preset.
pub fn load_params(path: &Path, logger: &Logger) -> EvalParams {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            logger.warning(
                Group::Evaluation,
                format_args!("cannot read weights file {}: {e}", path.display()),
            );
            return preset_params("standard");
        }
    };
    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&text) {
        Ok(raw) => raw,
        Err(e) => {
            logger.warning(
                Group::Evaluation,
                format_args!("malformed weights file {}: {e}", path.display()),
            );
            return preset_params("standard");
        }
    };

    let mut params = EvalParams::new();
    for (name, value) in raw {
        match weight_from_json(&value) {
            Some(w) => {
                params.insert(name, w);
            }
            None => logger.warning(
                Group::Evaluation,
                format_args!("ignoring non-numeric weight for {name}: {value}"),
            ),
        }
    }

    if params.is_empty() {
        logger.warning(
            Group::Evaluation,
            format_args!(
                "no usable weights in {}; using the standard preset",
                path.display()
            ),
        );
        return preset_params("standard");
    }
    params
}

/// Write a weight map as pretty-printed JSON.
pub fn save_params(params: &EvalParams, path: &Path) -> io::Result<()> {
    let mut text = serde_json::to_string_pretty(params)?;
    text.push('\n');
    std::fs::write(path, text)
}
