//! Slot-based episode scheduler.
//!
//! A generation's evaluations run through a fixed pool of `parallel_count`
//! slots, ticked cooperatively. Episodes are scheduled seed-major: every
//! request runs under seed 0 before any request starts seed 1, and all
//! requests in one pass share identical pre-generated seed events, so
//! individuals within a generation are compared under the same conditions.

use log::trace;

use crate::schema::{EnvOverrides, Genome, SchedulerConfig};

use super::coevolution::{DuelOutcome, Matchup};
use super::AggregateResult;

/// How an episode ended. All are normal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The episode ran to its natural end.
    Completed,
    /// The agent was eliminated.
    Died,
    /// The episode exceeded the configured duration budget.
    Timeout,
}

/// Result of one finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    pub fitness: f32,
    pub objectives: Vec<f32>,
    pub behavior: Option<[f32; 2]>,
    pub terminal: TerminalReason,
    /// Duel statistics, reported by versus environments.
    pub duel: Option<DuelOutcome>,
}

/// Episode progress after one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeStatus {
    Running,
    Finished(EpisodeOutcome),
}

/// A running episode. The scheduler owns timing; the episode only simulates.
pub trait Episode {
    /// Advance by `dt` simulated seconds.
    fn step(&mut self, dt: f32) -> EpisodeStatus;

    /// Outcome if the episode is cut off right now (timeout path).
    fn interrupt(&self) -> EpisodeOutcome;
}

/// Factory for episodes. The production evaluator lives outside the crate;
/// anything that can spawn deterministic episodes from a request plugs in
/// here.
pub trait Environment {
    type Ep: Episode;

    fn spawn(
        &mut self,
        request: &EpisodeRequest,
        events: &SeedEvents,
        overrides: &EnvOverrides,
    ) -> Self::Ep;
}

impl<E: Environment> Environment for &mut E {
    type Ep = E::Ep;

    fn spawn(
        &mut self,
        request: &EpisodeRequest,
        events: &SeedEvents,
        overrides: &EnvOverrides,
    ) -> Self::Ep {
        (**self).spawn(request, events, overrides)
    }
}

/// One evaluation to run: a genome, and for versus play its opponent.
#[derive(Debug, Clone)]
pub struct EpisodeRequest {
    /// Population index the aggregate result belongs to.
    pub individual: usize,
    pub genome: Genome,
    pub opponent: Option<Genome>,
    /// Duel bookkeeping for co-evolution runs.
    pub matchup: Option<Matchup>,
}

/// Deterministic per-seed event stream. Identical for every request in one
/// seed pass, and reproducible from (run seed, generation, seed index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedEvents {
    pub seed_index: usize,
    pub seed: u64,
}

impl SeedEvents {
    pub fn derive(run_seed: u64, generation: usize, seed_index: usize) -> Self {
        // splitmix64 over the combined key.
        let mut z = run_seed
            .wrapping_add((generation as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add((seed_index as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self {
            seed_index,
            seed: z ^ (z >> 31),
        }
    }
}

struct Slot<Ep> {
    request: usize,
    episode: Ep,
    elapsed: f32,
}

/// Runs `requests.len() × evals_per_individual` episodes through at most
/// `parallel_count` concurrently active slots.
pub struct EvalScheduler<E: Environment> {
    env: E,
    config: SchedulerConfig,
    overrides: EnvOverrides,
    requests: Vec<EpisodeRequest>,
    slots: Vec<Option<Slot<E::Ep>>>,
    events: SeedEvents,
    run_seed: u64,
    generation: usize,
    seed_pass: usize,
    next_request: usize,
    finished_in_pass: usize,
    /// outcomes[request][seed_pass]
    outcomes: Vec<Vec<EpisodeOutcome>>,
}

impl<E: Environment> EvalScheduler<E> {
    pub fn new(
        env: E,
        requests: Vec<EpisodeRequest>,
        config: SchedulerConfig,
        overrides: EnvOverrides,
        run_seed: u64,
        generation: usize,
    ) -> Self {
        let slot_count = config.parallel_count;
        let request_count = requests.len();
        let mut scheduler = Self {
            env,
            config,
            overrides,
            requests,
            slots: (0..slot_count).map(|_| None).collect(),
            events: SeedEvents::derive(run_seed, generation, 0),
            run_seed,
            generation,
            seed_pass: 0,
            next_request: 0,
            finished_in_pass: 0,
            outcomes: vec![Vec::new(); request_count],
        };
        scheduler.fill_slots();
        scheduler
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.seed_pass >= self.config.evals_per_individual
    }

    /// Episodes finished so far across all passes.
    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.len()).sum()
    }

    fn fill_slots(&mut self) {
        if self.is_complete() {
            return;
        }
        for slot in &mut self.slots {
            if slot.is_some() {
                continue;
            }
            if self.next_request >= self.requests.len() {
                break;
            }
            let request = self.next_request;
            self.next_request += 1;
            let episode = self
                .env
                .spawn(&self.requests[request], &self.events, &self.overrides);
            *slot = Some(Slot {
                request,
                episode,
                elapsed: 0.0,
            });
        }
    }

    /// Advance every active episode by one tick, harvest finished ones, and
    /// rebind freed slots in the same call.
    pub fn tick(&mut self) {
        if self.is_complete() {
            return;
        }
        let dt = self.config.tick_dt;

        for slot in &mut self.slots {
            let Some(active) = slot else { continue };
            active.elapsed += dt;

            let finished = match active.episode.step(dt) {
                EpisodeStatus::Finished(outcome) => Some(outcome),
                EpisodeStatus::Running => {
                    if active.elapsed >= self.config.max_episode_seconds {
                        let mut outcome = active.episode.interrupt();
                        outcome.terminal = TerminalReason::Timeout;
                        Some(outcome)
                    } else {
                        None
                    }
                }
            };

            if let Some(outcome) = finished {
                trace!(
                    "request {} seed {} finished: {:?}",
                    active.request, self.seed_pass, outcome.terminal
                );
                self.outcomes[active.request].push(outcome);
                self.finished_in_pass += 1;
                *slot = None;
            }
        }

        // A pass ends only when every request in it has finished; the next
        // seed's events are generated then.
        if self.finished_in_pass == self.requests.len() {
            self.seed_pass += 1;
            self.finished_in_pass = 0;
            self.next_request = 0;
            if !self.is_complete() {
                self.events = SeedEvents::derive(self.run_seed, self.generation, self.seed_pass);
            }
        }

        self.fill_slots();
    }

    /// Run to completion.
    pub fn run(&mut self) {
        while !self.is_complete() {
            self.tick();
        }
    }

    /// Per-episode outcomes of one request, in seed order.
    pub fn outcomes(&self, request: usize) -> &[EpisodeOutcome] {
        &self.outcomes[request]
    }

    pub fn request(&self, index: usize) -> &EpisodeRequest {
        &self.requests[index]
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Mean aggregate across seeds for one request.
    pub fn aggregate(&self, request: usize) -> AggregateResult {
        let outcomes = &self.outcomes[request];
        if outcomes.is_empty() {
            return AggregateResult::scalar(0.0);
        }
        let n = outcomes.len() as f32;
        let fitness = outcomes.iter().map(|o| o.fitness).sum::<f32>() / n;

        let objective_count = outcomes[0].objectives.len();
        let mut objectives = vec![0.0f32; objective_count];
        for outcome in outcomes {
            for (slot, value) in objectives.iter_mut().zip(&outcome.objectives) {
                *slot += value / n;
            }
        }

        let behaviors: Vec<[f32; 2]> = outcomes.iter().filter_map(|o| o.behavior).collect();
        let behavior = if behaviors.is_empty() {
            None
        } else {
            let count = behaviors.len() as f32;
            Some([
                behaviors.iter().map(|b| b[0]).sum::<f32>() / count,
                behaviors.iter().map(|b| b[1]).sum::<f32>() / count,
            ])
        };

        AggregateResult {
            fitness,
            objectives,
            behavior,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Architecture;

    /// Environment whose episodes finish after a fixed number of ticks and
    /// report the seed they observed.
    struct FixedEnv {
        ticks_to_finish: usize,
        spawned: usize,
    }

    struct FixedEpisode {
        remaining: usize,
        seed: u64,
    }

    impl Episode for FixedEpisode {
        fn step(&mut self, _dt: f32) -> EpisodeStatus {
            if self.remaining <= 1 {
                EpisodeStatus::Finished(self.interrupt())
            } else {
                self.remaining -= 1;
                EpisodeStatus::Running
            }
        }

        fn interrupt(&self) -> EpisodeOutcome {
            EpisodeOutcome {
                fitness: (self.seed % 1_000_000) as f32,
                objectives: Vec::new(),
                behavior: None,
                terminal: TerminalReason::Completed,
                duel: None,
            }
        }
    }

    impl Environment for FixedEnv {
        type Ep = FixedEpisode;

        fn spawn(
            &mut self,
            _request: &EpisodeRequest,
            events: &SeedEvents,
            _overrides: &EnvOverrides,
        ) -> FixedEpisode {
            self.spawned += 1;
            FixedEpisode {
                remaining: self.ticks_to_finish,
                seed: events.seed,
            }
        }
    }

    fn requests(count: usize) -> Vec<EpisodeRequest> {
        let arch = Architecture {
            inputs: 1,
            hidden: 1,
            outputs: 1,
        };
        (0..count)
            .map(|individual| EpisodeRequest {
                individual,
                genome: Genome::Dense {
                    arch,
                    weights: vec![0.0; arch.weight_count()],
                },
                opponent: None,
                matchup: None,
            })
            .collect()
    }

    fn config(parallel: usize, evals: usize) -> SchedulerConfig {
        SchedulerConfig {
            parallel_count: parallel,
            evals_per_individual: evals,
            max_episode_seconds: 30.0,
            tick_dt: 1.0 / 30.0,
        }
    }

    #[test]
    fn test_exact_episode_count_and_slot_bound() {
        // 150 individuals, 20 slots, 2 evals: exactly 300 episodes.
        let env = FixedEnv {
            ticks_to_finish: 3,
            spawned: 0,
        };
        let mut scheduler = EvalScheduler::new(
            env,
            requests(150),
            config(20, 2),
            EnvOverrides::default(),
            99,
            0,
        );
        while !scheduler.is_complete() {
            assert!(scheduler.active_count() <= 20);
            scheduler.tick();
        }
        assert_eq!(scheduler.completed_count(), 300);
        assert_eq!(scheduler.env.spawned, 300);
        for i in 0..150 {
            assert_eq!(scheduler.outcomes(i).len(), 2);
        }
    }

    #[test]
    fn test_seed_pass_gating() {
        // Within one pass every episode observes the same seed events, and
        // the second pass uses different ones.
        let env = FixedEnv {
            ticks_to_finish: 2,
            spawned: 0,
        };
        let mut scheduler = EvalScheduler::new(
            env,
            requests(6),
            config(2, 2),
            EnvOverrides::default(),
            7,
            3,
        );
        scheduler.run();

        let first_pass: Vec<f32> = (0..6).map(|i| scheduler.outcomes(i)[0].fitness).collect();
        let second_pass: Vec<f32> = (0..6).map(|i| scheduler.outcomes(i)[1].fitness).collect();
        assert!(first_pass.iter().all(|&f| f == first_pass[0]));
        assert!(second_pass.iter().all(|&f| f == second_pass[0]));
        assert_ne!(first_pass[0], second_pass[0]);
    }

    #[test]
    fn test_timeout_is_normal_outcome() {
        struct NeverEnds;
        struct Endless;
        impl Episode for Endless {
            fn step(&mut self, _dt: f32) -> EpisodeStatus {
                EpisodeStatus::Running
            }
            fn interrupt(&self) -> EpisodeOutcome {
                EpisodeOutcome {
                    fitness: 1.5,
                    objectives: Vec::new(),
                    behavior: None,
                    terminal: TerminalReason::Completed,
                    duel: None,
                }
            }
        }
        impl Environment for NeverEnds {
            type Ep = Endless;
            fn spawn(
                &mut self,
                _request: &EpisodeRequest,
                _events: &SeedEvents,
                _overrides: &EnvOverrides,
            ) -> Endless {
                Endless
            }
        }

        let mut scheduler = EvalScheduler::new(
            NeverEnds,
            requests(1),
            SchedulerConfig {
                parallel_count: 1,
                evals_per_individual: 1,
                max_episode_seconds: 1.0,
                tick_dt: 0.5,
            },
            EnvOverrides::default(),
            1,
            0,
        );
        scheduler.run();
        let outcome = &scheduler.outcomes(0)[0];
        assert_eq!(outcome.terminal, TerminalReason::Timeout);
        assert_eq!(outcome.fitness, 1.5);
    }

    #[test]
    fn test_aggregate_means_across_seeds() {
        let env = FixedEnv {
            ticks_to_finish: 1,
            spawned: 0,
        };
        let mut scheduler = EvalScheduler::new(
            env,
            requests(2),
            config(2, 3),
            EnvOverrides::default(),
            5,
            1,
        );
        scheduler.run();
        let expected: f32 = scheduler.outcomes(0).iter().map(|o| o.fitness).sum::<f32>() / 3.0;
        assert!((scheduler.aggregate(0).fitness - expected).abs() < 1e-6);
    }

    #[test]
    fn test_seed_events_reproducible() {
        assert_eq!(SeedEvents::derive(1, 2, 3), SeedEvents::derive(1, 2, 3));
        assert_ne!(
            SeedEvents::derive(1, 2, 3).seed,
            SeedEvents::derive(1, 2, 4).seed
        );
        assert_ne!(
            SeedEvents::derive(1, 2, 3).seed,
            SeedEvents::derive(1, 3, 3).seed
        );
    }
}
