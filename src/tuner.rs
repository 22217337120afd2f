//! Evolutionary search over heuristic weight vectors.
//!
//! A population of weight sets is scored by self-play, then refreshed each
//! generation by carrying elites and filling the rest with mutated
//! tournament winners. All weights are kept normalized to sum 1000.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::ai::{HeuristicPlayer, Player};
use crate::eval::EvalParams;
use crate::game::Game;
use crate::logger::{Group, Logger};

/// Components the tuner may activate.
pub const COMPONENTS: [&str; 6] = [
    "emptyTiles",
    "monotonicity",
    "smoothness",
    "cornerValue",
    "mergeability",
    "patternMatching",
];

/// Column order of the population CSV. `coreScore` is an always-zero
/// placeholder kept for file compatibility.
const CSV_COLUMNS: [&str; 7] = [
    "emptyTiles",
    "monotonicity",
    "smoothness",
    "cornerValue",
    "mergeability",
    "patternMatching",
    "coreScore",
];

const TOURNAMENT_SIZE: usize = 3;
const MAX_STALE_GENERATIONS: usize = 5;

#[derive(Debug, Clone)]
pub struct TunerConfig {
    pub population_size: usize,
    pub generations: usize,
    pub games_per_evaluation: usize,
    pub mutation_rate: f64,
    pub elite_percentage: f64,
    pub output_file: PathBuf,
    pub best_weights_file: PathBuf,
    pub json_output_file: PathBuf,
    pub continue_from_file: bool,
    pub threads: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 20,
            games_per_evaluation: 100,
            mutation_rate: 0.15,
            elite_percentage: 0.2,
            output_file: PathBuf::from("eval_weights.csv"),
            best_weights_file: PathBuf::from("best_eval_weights.txt"),
            json_output_file: PathBuf::from("best_eval_weights.json"),
            continue_from_file: false,
            threads: num_cpus::get(),
        }
    }
}

/// One member of the population: a weight set and its measured performance.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub params: EvalParams,
    pub active: BTreeSet<String>,
    pub avg_score: f64,
    pub max_score: u64,
    pub games_played: usize,
}

impl Candidate {
    fn summary(&self) -> String {
        let mut weights = String::new();
        for (i, (name, weight)) in self.params.iter().enumerate() {
            if i > 0 {
                weights.push_str(", ");
            }
            let _ = write!(weights, "{name}:{weight:.0}");
        }
        format!(
            "[{weights}] avg {:.1}, max {}, games {}, components {}",
            self.avg_score,
            self.max_score,
            self.games_played,
            self.active.len()
        )
    }
}

/// Scale the active weights so they total exactly 1000, putting the
/// floating-point residual on the last component.
fn normalize_to_1000(candidate: &mut Candidate) {
    let total: f64 = candidate.params.values().sum();
    if total > 0.0 {
        let scale = 1000.0 / total;
        for weight in candidate.params.values_mut() {
            *weight *= scale;
        }
    } else {
        let share = 1000.0 / candidate.params.len().max(1) as f64;
        for weight in candidate.params.values_mut() {
            *weight = share;
        }
    }
    let sum: f64 = candidate.params.values().sum();
    if let Some(last) = candidate.active.iter().last() {
        if let Some(weight) = candidate.params.get_mut(last) {
            *weight += 1000.0 - sum;
        }
    }
}

/// Flip each component on with probability 1/2 until at least two are
/// active, then draw uniform weights and normalize.
pub fn random_candidate(rng: &mut impl Rng) -> Candidate {
    let mut active = BTreeSet::new();
    while active.len() < 2 {
        active.clear();
        for name in COMPONENTS {
            if rng.gen_bool(0.5) {
                active.insert(name.to_string());
            }
        }
    }

    let mut candidate = Candidate {
        params: active
            .iter()
            .map(|name| (name.clone(), rng.gen::<f64>()))
            .collect(),
        active,
        ..Candidate::default()
    };
    normalize_to_1000(&mut candidate);
    candidate
}

/// Mutate a parent: occasionally add or drop a component, perturb every
/// active weight with Gaussian noise, and renormalize.
pub fn mutate(parent: &Candidate, rng: &mut impl Rng, rate: f64) -> Candidate {
    let mut active = parent.active.clone();

    // one roll decides: 1/4 remove (if three or more remain), 1/4 add
    match rng.gen_range(0..4) {
        0 if active.len() > 2 => {
            let names: Vec<String> = active.iter().cloned().collect();
            if let Some(name) = names.choose(rng) {
                active.remove(name);
            }
        }
        1 => {
            let unused: Vec<&str> = COMPONENTS
                .iter()
                .copied()
                .filter(|name| !active.contains(*name))
                .collect();
            if let Some(&name) = unused.choose(rng) {
                active.insert(name.to_string());
            }
        }
        _ => {}
    }

    let noise = Normal::new(0.0, rate * 1000.0).ok();
    let mut child = Candidate {
        params: EvalParams::new(),
        active: active.clone(),
        ..Candidate::default()
    };
    for name in &active {
        let weight = match parent.params.get(name) {
            Some(&w) => {
                let delta = noise.as_ref().map_or(0.0, |n| n.sample(rng));
                (w + delta).max(0.0)
            }
            // freshly added components start with a modest stake
            None => rng.gen_range(50.0..250.0),
        };
        child.params.insert(name.clone(), weight);
    }
    normalize_to_1000(&mut child);
    child
}

/// Pick the best of `TOURNAMENT_SIZE` uniformly drawn members.
fn tournament_select<'a>(population: &'a [Candidate], rng: &mut impl Rng) -> &'a Candidate {
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..TOURNAMENT_SIZE {
        let candidate = &population[rng.gen_range(0..population.len())];
        if candidate.avg_score > best.avg_score {
            best = candidate;
        }
    }
    best
}

/// Score every unevaluated candidate by playing `games` games each. Worker
/// `t` of `threads` takes candidates `t`, `t + threads`, ... Returns the
/// number of games played.
fn evaluate_population(
    population: &mut [Candidate],
    games: usize,
    threads: usize,
    logger: &Logger,
) -> usize {
    let threads = threads.max(1);
    let shared: &[Candidate] = population;

    let results: Vec<(usize, f64, u64)> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for t in 0..threads {
            handles.push(scope.spawn(move || {
                let mut scored = Vec::new();
                let mut game = Game::new();
                for i in (t..shared.len()).step_by(threads) {
                    let candidate = &shared[i];
                    if candidate.games_played > 0 {
                        continue;
                    }
                    let mut player = HeuristicPlayer::new(&candidate.params);
                    let mut total = 0u64;
                    let mut max = 0u64;
                    for _ in 0..games {
                        let (score, _, _) = game.play_game(
                            |s| player.choose_action(s),
                            crate::board::State::default(),
                        );
                        total += score;
                        max = max.max(score);
                    }
                    scored.push((i, total as f64 / games as f64, max));
                }
                scored
            }));
        }
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .collect()
    });

    let evaluated = results.len();
    for (i, avg, max) in results {
        population[i].avg_score = avg;
        population[i].max_score = max;
        population[i].games_played = games;
        logger.info(
            Group::Tuner,
            format_args!("evaluated {}", population[i].summary()),
        );
    }
    evaluated * games
}

/// Usage and average weight of each component among the top quarter of the
/// population.
fn analyze_components(population: &[Candidate], logger: &Logger) {
    let top = (population.len() / 4).max(1);
    logger.info(
        Group::Tuner,
        format_args!("component contribution over the top {top} performers:"),
    );
    for name in COMPONENTS {
        let mut used = 0usize;
        let mut weight_sum = 0.0;
        for candidate in population.iter().take(top) {
            if let Some(&weight) = candidate.params.get(name) {
                used += 1;
                weight_sum += weight;
            }
        }
        let usage_pct = used as f64 * 100.0 / top as f64;
        let avg_weight = if used > 0 { weight_sum / used as f64 } else { 0.0 };
        logger.info(
            Group::Tuner,
            format_args!(
                "  {name:<16} used {usage_pct:>5.1}%  avg weight {avg_weight:>6.1} ({:.1}%)",
                avg_weight / 10.0
            ),
        );
    }
}

/// Write the whole population: two comment headers, then one record per
/// line with every column present (zero when inactive).
pub fn save_population(population: &[Candidate], path: &Path) -> io::Result<()> {
    let mut out = String::new();
    out.push_str("# Evaluation Weights\n");
    out.push_str(
        "# Format: component1:weight,component2:weight,...,avgScore,maxScore,gamesPlayed\n",
    );
    for candidate in population {
        for name in CSV_COLUMNS {
            let weight = candidate.params.get(name).copied().unwrap_or(0.0);
            let _ = write!(out, "{name}:{weight},");
        }
        let _ = writeln!(
            out,
            "{},{},{}",
            candidate.avg_score, candidate.max_score, candidate.games_played
        );
    }
    std::fs::write(path, out)
}

/// Read a population back; malformed lines are skipped with a warning.
pub fn load_population(path: &Path, logger: &Logger) -> Vec<Candidate> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            logger.info(
                Group::Tuner,
                format_args!("no previous population at {}", path.display()),
            );
            return Vec::new();
        }
    };

    let mut population = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split(',').collect();
        if tokens.len() != CSV_COLUMNS.len() + 3 {
            logger.warning(Group::Tuner, format_args!("skipping malformed row: {line}"));
            continue;
        }

        let mut candidate = Candidate::default();
        let mut ok = true;
        for token in &tokens[..CSV_COLUMNS.len()] {
            match token.split_once(':') {
                Some((name, weight)) => match weight.parse::<f64>() {
                    Ok(w) if w > 0.0 && name != "coreScore" => {
                        candidate.params.insert(name.to_string(), w);
                        candidate.active.insert(name.to_string());
                    }
                    Ok(_) => {}
                    Err(_) => ok = false,
                },
                None => ok = false,
            }
        }
        let avg = tokens[CSV_COLUMNS.len()].parse::<f64>();
        let max = tokens[CSV_COLUMNS.len() + 1].parse::<u64>();
        let games = tokens[CSV_COLUMNS.len() + 2].parse::<usize>();
        match (ok, avg, max, games) {
            (true, Ok(avg), Ok(max), Ok(games)) if !candidate.params.is_empty() => {
                candidate.avg_score = avg;
                candidate.max_score = max;
                candidate.games_played = games;
                population.push(candidate);
            }
            _ => logger.warning(Group::Tuner, format_args!("skipping malformed row: {line}")),
        }
    }
    logger.info(
        Group::Tuner,
        format_args!("loaded {} weight sets from {}", population.len(), path.display()),
    );
    population
}

/// Write the best record as readable text alongside its JSON weights.
fn save_best(candidate: &Candidate, config: &TunerConfig, logger: &Logger) {
    let mut out = String::new();
    out.push_str("# Best Evaluation Weights\n");
    for (name, weight) in &candidate.params {
        let _ = writeln!(out, "{name}:{weight}");
    }
    out.push_str("# Performance\n");
    let _ = writeln!(out, "avgScore:{}", candidate.avg_score);
    let _ = writeln!(out, "maxScore:{}", candidate.max_score);
    let _ = writeln!(out, "gamesPlayed:{}", candidate.games_played);
    if let Err(e) = std::fs::write(&config.best_weights_file, out) {
        logger.error(
            Group::Tuner,
            format_args!("cannot write {}: {e}", config.best_weights_file.display()),
        );
    }

    if let Err(e) = crate::eval::save_params(&candidate.params, &config.json_output_file) {
        logger.error(
            Group::Tuner,
            format_args!("cannot write {}: {e}", config.json_output_file.display()),
        );
    }
}

/// Run the evolutionary loop and return the best candidate found.
pub fn run(config: &TunerConfig, logger: &Logger) -> Candidate {
    let mut rng = StdRng::from_entropy();

    let mut population = if config.continue_from_file {
        load_population(&config.output_file, logger)
    } else {
        Vec::new()
    };
    while population.len() < config.population_size {
        population.push(random_candidate(&mut rng));
    }

    let mut best = Candidate::default();
    let mut stale_generations = 0;
    let mut total_games = 0usize;

    for generation in 0..config.generations {
        logger.info(
            Group::Tuner,
            format_args!("===== generation {} =====", generation + 1),
        );
        let rate =
            config.mutation_rate * (1.0 - generation as f64 / config.generations as f64);

        total_games += evaluate_population(
            &mut population,
            config.games_per_evaluation,
            config.threads,
            logger,
        );

        population.sort_by(|a, b| {
            b.avg_score
                .partial_cmp(&a.avg_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if population[0].avg_score > best.avg_score {
            best = population[0].clone();
            stale_generations = 0;
            logger.info(Group::Tuner, "*** new best score found ***");
            for line in crate::eval::params_table(&best.params).lines() {
                logger.info(Group::Tuner, line);
            }
        } else {
            stale_generations += 1;
        }

        logger.info(
            Group::Tuner,
            format_args!("best this generation: {}", population[0].summary()),
        );
        logger.info(Group::Tuner, format_args!("best overall: {}", best.summary()));
        logger.info(Group::Tuner, format_args!("total games played: {total_games}"));

        analyze_components(&population, logger);

        if let Err(e) = save_population(&population, &config.output_file) {
            logger.error(
                Group::Tuner,
                format_args!("cannot write {}: {e}", config.output_file.display()),
            );
        }
        save_best(&best, config, logger);
        if generation % 5 == 0 {
            let checkpoint = config
                .output_file
                .with_file_name(format!("checkpoint_gen_{generation}.csv"));
            if let Err(e) = save_population(&population, &checkpoint) {
                logger.error(
                    Group::Tuner,
                    format_args!("cannot write {}: {e}", checkpoint.display()),
                );
            }
        }

        if stale_generations >= MAX_STALE_GENERATIONS {
            logger.info(
                Group::Tuner,
                format_args!(
                    "stopping early after {MAX_STALE_GENERATIONS} generations without improvement"
                ),
            );
            break;
        }
        if generation == config.generations - 1 {
            break;
        }

        // breed the next generation
        let elite_count = (config.elite_percentage * config.population_size as f64) as usize;
        let mut next: Vec<Candidate> = population[..elite_count.min(population.len())].to_vec();
        while next.len() < config.population_size {
            let parent = tournament_select(&population, &mut rng);
            next.push(mutate(parent, &mut rng, rate));
        }
        population = next;
    }

    logger.info(Group::Tuner, "===== tuning complete =====");
    logger.info(Group::Tuner, format_args!("best weights found: {}", best.summary()));
    logger.info(Group::Tuner, format_args!("total games played: {total_games}"));
    best
}
