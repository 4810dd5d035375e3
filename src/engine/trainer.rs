//! The training loop: evaluation, evolution, curriculum, stop conditions,
//! and persistence, tied together around one environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::schema::{
    AlgorithmConfig, ConfigError, GenerationMetrics, Genome, PopulationConfig, Representation,
    RunHistory, StopReason, TrainingConfig,
};

use super::coevolution::{CoevolutionCoordinator, DuelOutcome};
use super::curriculum::CurriculumManager;
use super::persistence::{write_json_atomic, EliteReservoir, MigrationPool, PersistError, Persistence};
use super::rng::EvoRng;
use super::scheduler::{Environment, EpisodeRequest, EvalScheduler};
use super::stats::StatsTracker;
use super::{build_engine, Engine, EngineStats, EvolveOutcome, PopulationSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Persistence failure: {0}")]
    Persist(#[from] PersistError),
}

enum Mode {
    Single(Box<dyn Engine>),
    Versus(CoevolutionCoordinator),
}

/// Drives a full training run over an [`Environment`].
pub struct Trainer<E: Environment> {
    config: TrainingConfig,
    env: E,
    mode: Mode,
    run_seed: u64,
    rng: EvoRng,
    stats: StatsTracker,
    curriculum: CurriculumManager,
    persistence: Option<Persistence>,
    reservoir: Option<EliteReservoir>,
    migration: Option<MigrationPool>,
    cancelled: Arc<AtomicBool>,
    run_id: String,
    /// At most one background writer per file is in flight; the previous one
    /// is joined before the next spawn so writes land in order.
    metrics_writer: Option<std::thread::JoinHandle<()>>,
    snapshot_writer: Option<std::thread::JoinHandle<()>>,
}

impl<E: Environment> Trainer<E> {
    pub fn new(config: TrainingConfig, env: E) -> Result<Self, TrainerError> {
        config.validate()?;

        let run_seed = config.random_seed.unwrap_or_else(rand::random);
        let mut rng = EvoRng::new(run_seed);
        let run_id = format!("{run_seed:016x}");

        let mode = match &config.algorithm {
            AlgorithmConfig::Coevolution(co) => Mode::Versus(CoevolutionCoordinator::new(
                co.clone(),
                config.population.clone(),
                rng.fork(),
            )),
            _ => Mode::Single(build_engine(&config, &mut rng)?),
        };

        let persistence = match &config.persistence.output_dir {
            Some(dir) => Some(Persistence::new(dir.clone())?),
            None => None,
        };
        let reservoir = match &config.persistence.output_dir {
            Some(dir) => Some(EliteReservoir::new(
                dir.join("reservoir"),
                config.persistence.reservoir.clone(),
            )?),
            None => None,
        };
        let migration = match (&config.persistence.migration, &config.algorithm) {
            (Some(migration), AlgorithmConfig::Neat(_)) => Some(MigrationPool::new(
                migration.clone(),
                config
                    .worker_id
                    .clone()
                    .unwrap_or_else(|| run_id.clone()),
            )?),
            (Some(_), _) => {
                warn!("migration pool configured but algorithm is not NEAT; disabled");
                None
            }
            (None, _) => None,
        };

        let curriculum = CurriculumManager::new(config.curriculum.clone());

        let mut trainer = Self {
            config,
            env,
            mode,
            run_seed,
            rng,
            stats: StatsTracker::new(),
            curriculum,
            persistence,
            reservoir,
            migration,
            cancelled: Arc::new(AtomicBool::new(false)),
            run_id,
            metrics_writer: None,
            snapshot_writer: None,
        };
        trainer.resume_or_seed();
        Ok(trainer)
    }

    /// Cancellation handle: flip it from anywhere to stop the run at the
    /// next evaluation boundary. In-flight episode results are discarded.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Restore a saved population if one exists, then mix in elites from the
    /// reservoir.
    fn resume_or_seed(&mut self) {
        if let (Some(persistence), Mode::Single(engine)) = (&self.persistence, &mut self.mode) {
            if let Some(snapshot) = persistence.load_snapshot() {
                let generation = snapshot.generation;
                match engine.restore(snapshot) {
                    Ok(()) => info!("resumed from snapshot at generation {}", generation),
                    Err(err) => warn!("snapshot incompatible ({}), starting fresh", err),
                }
            }
        }

        if let (Some(reservoir), Mode::Single(engine)) = (&self.reservoir, &mut self.mode) {
            let want = reservoir.elite_count(self.config.population.size);
            match reservoir.sample(want, &mut self.rng) {
                Ok(entries) => {
                    for entry in entries {
                        if genome_matches(&entry.genome, &self.config.population) {
                            engine.inject(entry.genome);
                        } else {
                            warn!("reservoir elite does not match this run's network shape, skipped");
                        }
                    }
                }
                Err(err) => warn!("reservoir unavailable: {}", err),
            }
        }
    }

    /// Run to a stop condition. Returns the per-generation history.
    pub fn run(&mut self) -> Result<RunHistory, TrainerError> {
        let mut completed = 0usize;
        let reason = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }

            let Some(metrics) = self.run_one_generation(completed)? else {
                break StopReason::Cancelled;
            };

            if let Some(target) = self.config.stop.target_fitness {
                if metrics.all_time_best >= target {
                    break StopReason::TargetFitness;
                }
            }
            if metrics.generations_without_improvement >= self.config.stop.stagnation_limit {
                break StopReason::Stagnation;
            }

            let advanced = match &mut self.mode {
                Mode::Single(engine) => engine.advance_generation(),
                Mode::Versus(coordinator) => coordinator.evolve(),
            };
            if advanced == EvolveOutcome::Advanced {
                completed += 1;
            }
            if completed >= self.config.stop.max_generations {
                break StopReason::MaxGenerations;
            }
        };

        info!("training stopped: {:?}", reason);
        self.finish(reason)?;
        Ok(std::mem::take(&mut self.stats).finish(reason))
    }

    /// Evaluate the current population once and record its statistics.
    /// Returns None when cancelled mid-evaluation (partial results are
    /// dropped on the floor).
    fn run_one_generation(
        &mut self,
        completed: usize,
    ) -> Result<Option<GenerationMetrics>, TrainerError> {
        let overrides = self.curriculum.overrides();
        let generation = match &self.mode {
            Mode::Single(engine) => engine.generation(),
            Mode::Versus(coordinator) => coordinator.generation(),
        };

        let (engine_stats, lineage, best) = match &mut self.mode {
            Mode::Single(engine) => {
                let requests: Vec<EpisodeRequest> = (0..engine.population_size())
                    .map(|individual| EpisodeRequest {
                        individual,
                        genome: engine.genome(individual).clone(),
                        opponent: None,
                        matchup: None,
                    })
                    .collect();

                let mut scheduler = EvalScheduler::new(
                    &mut self.env,
                    requests,
                    self.config.scheduler.clone(),
                    overrides,
                    self.run_seed,
                    generation,
                );
                while !scheduler.is_complete() {
                    if self.cancelled.load(Ordering::Relaxed) {
                        return Ok(None);
                    }
                    scheduler.tick();
                }

                for index in 0..scheduler.request_count() {
                    let individual = scheduler.request(index).individual;
                    let aggregate = scheduler.aggregate(index);
                    engine.assign_result(individual, aggregate);
                }
                drop(scheduler);

                (
                    engine.stats(),
                    engine.recent_lineage().to_vec(),
                    engine.best(),
                )
            }
            Mode::Versus(coordinator) => {
                let matchups = coordinator.matchups();
                let requests: Vec<EpisodeRequest> = matchups
                    .iter()
                    .map(|matchup| EpisodeRequest {
                        individual: matchup.player,
                        genome: coordinator.player_genome(matchup.player).clone(),
                        opponent: Some(coordinator.opponent_genome(matchup.opponent).clone()),
                        matchup: Some(*matchup),
                    })
                    .collect();

                let mut scheduler = EvalScheduler::new(
                    &mut self.env,
                    requests,
                    self.config.scheduler.clone(),
                    overrides,
                    self.run_seed,
                    generation,
                );
                while !scheduler.is_complete() {
                    if self.cancelled.load(Ordering::Relaxed) {
                        return Ok(None);
                    }
                    scheduler.tick();
                }

                for index in 0..scheduler.request_count() {
                    let Some(matchup) = scheduler.request(index).matchup else {
                        continue;
                    };
                    for outcome in scheduler.outcomes(index) {
                        let duel = outcome.duel.unwrap_or(DuelOutcome {
                            player_score: outcome.fitness,
                            ..Default::default()
                        });
                        coordinator.record_duel(&matchup, &duel);
                    }
                }
                drop(scheduler);

                coordinator.commit_results();
                (
                    coordinator.stats(),
                    coordinator.recent_lineage().to_vec(),
                    coordinator.best(),
                )
            }
        };

        let stage = self.curriculum.stage_index();
        let metrics = self
            .stats
            .record(generation, &engine_stats, best, stage, &lineage);

        self.curriculum.observe(engine_stats.avg_fitness);
        self.persist_generation(completed, &metrics);
        self.migrate(&metrics)?;

        Ok(Some(metrics))
    }

    /// Background writes: a failed write never aborts training, and the
    /// previously persisted generation stays valid because every write is
    /// atomic. Joining the prior writer (normally long finished) keeps the
    /// on-disk file moving forward in generation order.
    fn persist_generation(&mut self, completed: usize, metrics: &GenerationMetrics) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        join_writer(&mut self.metrics_writer);
        self.metrics_writer = Some(spawn_metrics_write(
            persistence.dir().to_path_buf(),
            metrics.clone(),
        ));

        let interval = self.config.persistence.save_interval;
        if interval > 0 && completed % interval == 0 {
            let snapshot = match &self.mode {
                Mode::Single(engine) => engine.snapshot(),
                Mode::Versus(_) => return,
            };
            join_writer(&mut self.snapshot_writer);
            self.snapshot_writer = Some(spawn_snapshot_write(
                persistence.dir().to_path_buf(),
                snapshot,
            ));
        }
    }

    /// NEAT migration: periodic export of the local best, import of a
    /// foreign genome when stagnant.
    fn migrate(&mut self, metrics: &GenerationMetrics) -> Result<(), TrainerError> {
        let Some(pool) = &self.migration else {
            return Ok(());
        };
        let Mode::Single(engine) = &mut self.mode else {
            return Ok(());
        };

        let interval = pool.export_interval();
        if interval > 0 && metrics.generation > 0 && metrics.generation % interval == 0 {
            if let Some((genome, fitness)) = engine.best() {
                if let Err(err) = pool.export(&genome, fitness, metrics.generation) {
                    warn!("migration export failed: {}", err);
                }
            }
        }

        if metrics.generations_without_improvement >= pool.import_after_stagnant() {
            match pool.import(&mut self.rng) {
                Ok(Some(record)) => {
                    if genome_matches(&record.genome, &self.config.population) {
                        engine.inject(record.genome);
                    } else {
                        warn!("migrant does not match this run's network shape, skipped");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!("migration import failed: {}", err),
            }
        }
        Ok(())
    }

    /// Final synchronous persistence: completion-flagged metrics, the best
    /// genome, and the reservoir deposit. Outstanding background writers are
    /// joined first so no stale generation record can land after the
    /// completion flag.
    fn finish(&mut self, reason: StopReason) -> Result<(), TrainerError> {
        join_writer(&mut self.metrics_writer);
        join_writer(&mut self.snapshot_writer);
        if let Some(persistence) = &self.persistence {
            let mut metrics = GenerationMetrics::new(self.stats.history().generations());
            metrics.all_time_best = self.stats.all_time_best();
            metrics.best_fitness = self.stats.all_time_best();
            metrics.generations_without_improvement =
                self.stats.generations_without_improvement();
            metrics.curriculum_stage = self.curriculum.stage_index();
            metrics.training_complete = true;
            persistence.write_metrics(&metrics)?;

            if let Some(genome) = self.stats.best_genome() {
                persistence.save_best(genome, self.stats.all_time_best(), metrics.generation)?;
            }
        }

        if reason != StopReason::Cancelled {
            if let Some(reservoir) = &self.reservoir {
                let elites = self.top_elites(reservoir);
                if elites.is_empty() {
                    return Ok(());
                }
                if let Err(err) = reservoir.deposit(&self.run_id, &elites) {
                    warn!("reservoir deposit failed: {}", err);
                }
            }
        }
        Ok(())
    }

    /// Top fraction of the final population, best first.
    fn top_elites(&self, reservoir: &EliteReservoir) -> Vec<(Genome, f32)> {
        match &self.mode {
            Mode::Versus(coordinator) => coordinator.best().into_iter().collect(),
            Mode::Single(engine) => {
                let count = reservoir.elite_count(engine.population_size());
                let snapshot = engine.snapshot();
                let mut ranked: Vec<(Genome, f32)> = snapshot
                    .individuals
                    .into_iter()
                    .map(|ind| (ind.genome, ind.fitness))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked.truncate(count);
                ranked
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        match &self.mode {
            Mode::Single(engine) => engine.stats(),
            Mode::Versus(coordinator) => coordinator.stats(),
        }
    }
}

/// A genome from the reservoir or migration pool is only injectable when its
/// representation and network shape match what this run evolves; a foreign
/// shape would corrupt crossover and forward passes.
fn genome_matches(genome: &Genome, population: &PopulationConfig) -> bool {
    match (genome, population.representation) {
        (Genome::Dense { arch, weights }, Representation::Dense) => {
            *arch == population.architecture && weights.len() == arch.weight_count()
        }
        (Genome::Graph { inputs, outputs, .. }, Representation::Graph) => {
            *inputs == population.architecture.inputs
                && *outputs == population.architecture.outputs
        }
        _ => false,
    }
}

fn join_writer(writer: &mut Option<std::thread::JoinHandle<()>>) {
    if let Some(handle) = writer.take() {
        if handle.join().is_err() {
            warn!("background persistence writer panicked");
        }
    }
}

fn spawn_metrics_write(dir: PathBuf, metrics: GenerationMetrics) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(err) = write_json_atomic(&dir.join("metrics.json"), &metrics) {
            warn!("metrics write failed: {}", err);
        }
    })
}

fn spawn_snapshot_write(dir: PathBuf, snapshot: PopulationSnapshot) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(err) = write_json_atomic(&dir.join("population.json"), &snapshot) {
            warn!("snapshot write failed: {}", err);
        }
    })
}
