//! Built-in dodge arena: a small deterministic episode environment.
//!
//! Production evaluators live outside the crate and plug in through the
//! [`Environment`] trait; this arena exists so the CLI and the test suite can
//! exercise the whole training pipeline end to end. An agent moves on the
//! unit square while hazards sweep across it on a schedule derived from the
//! seed events. In versus mode the opponent genome steers a chaser instead.

use rand::prelude::*;

use crate::engine::{
    DuelOutcome, Environment, Episode, EpisodeOutcome, EpisodeRequest, EpisodeStatus, SeedEvents,
    TerminalReason,
};
use crate::schema::{EnvOverrides, Genome};

const ARENA_SECONDS: f32 = 20.0;
const AGENT_SPEED: f32 = 0.35;
const HAZARD_RADIUS: f32 = 0.06;
const CHASER_BASE_SPEED: f32 = 0.25;
const PRESSURE_RANGE: f32 = 0.3;
const STARTING_HEALTH: i32 = 3;
const CONTACT_COOLDOWN: f32 = 1.0;

/// Episode factory. Stateless; every episode derives its world from the
/// request and the seed events.
#[derive(Debug, Clone, Default)]
pub struct DodgeArena;

impl Environment for DodgeArena {
    type Ep = DodgeEpisode;

    fn spawn(
        &mut self,
        request: &EpisodeRequest,
        events: &SeedEvents,
        overrides: &EnvOverrides,
    ) -> DodgeEpisode {
        DodgeEpisode::new(
            request.genome.clone(),
            request.opponent.clone(),
            events.seed,
            overrides.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Hazard {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

pub struct DodgeEpisode {
    genome: Genome,
    opponent: Option<Genome>,
    rng: StdRng,
    overrides: EnvOverrides,
    time: f32,
    px: f32,
    py: f32,
    prev_ax: f32,
    chaser_x: f32,
    chaser_y: f32,
    hazards: Vec<Hazard>,
    next_spawn: f32,
    health: i32,
    contact_cooldown: f32,
    dodged: u32,
    damage_taken: f32,
    pressure_time: f32,
    reversals: f32,
    position_sum: f32,
    movement_sum: f32,
    ticks: u32,
}

impl DodgeEpisode {
    fn new(genome: Genome, opponent: Option<Genome>, seed: u64, overrides: EnvOverrides) -> Self {
        Self {
            genome,
            opponent,
            rng: StdRng::seed_from_u64(seed),
            overrides,
            time: 0.0,
            px: 0.5,
            py: 0.5,
            prev_ax: 0.0,
            chaser_x: 0.1,
            chaser_y: 0.1,
            hazards: Vec::new(),
            next_spawn: 0.0,
            health: STARTING_HEALTH,
            contact_cooldown: 0.0,
            dodged: 0,
            damage_taken: 0.0,
            pressure_time: 0.0,
            reversals: 0.0,
            position_sum: 0.0,
            movement_sum: 0.0,
            ticks: 0,
        }
    }

    fn spawn_hazard(&mut self) {
        // Enter from a random edge, aimed roughly across the square.
        let along = self.rng.gen_range(0.0..1.0f32);
        let speed = self.rng.gen_range(0.15..0.35f32) * self.overrides.hazard_speed;
        let hazard = match self.rng.gen_range(0..4u8) {
            0 => Hazard {
                x: along,
                y: 0.0,
                vx: 0.0,
                vy: speed,
            },
            1 => Hazard {
                x: along,
                y: 1.0,
                vx: 0.0,
                vy: -speed,
            },
            2 => Hazard {
                x: 0.0,
                y: along,
                vx: speed,
                vy: 0.0,
            },
            _ => Hazard {
                x: 1.0,
                y: along,
                vx: -speed,
                vy: 0.0,
            },
        };
        self.hazards.push(hazard);
    }

    fn nearest_threat(&self) -> (f32, f32, f32) {
        let mut best = (0.0, 0.0, f32::INFINITY);
        for h in &self.hazards {
            let (dx, dy) = (h.x - self.px, h.y - self.py);
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < best.2 {
                best = (dx, dy, dist);
            }
        }
        if self.opponent.is_some() {
            let (dx, dy) = (self.chaser_x - self.px, self.chaser_y - self.py);
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < best.2 {
                best = (dx, dy, dist);
            }
        }
        best
    }

    fn step_world(&mut self, dt: f32) {
        self.time += dt;
        self.ticks += 1;
        self.contact_cooldown = (self.contact_cooldown - dt).max(0.0);

        // Hazard schedule: spawn interval shrinks as hazard_rate grows.
        if self.time >= self.next_spawn {
            self.spawn_hazard();
            let base = self.rng.gen_range(0.8..1.6f32);
            self.next_spawn = self.time + base / self.overrides.hazard_rate.max(0.05);
        }

        // Player steering.
        let (dx, dy, dist) = self.nearest_threat();
        let inputs = [
            self.px * 2.0 - 1.0,
            self.py * 2.0 - 1.0,
            dx,
            dy,
            (dist / 1.5).min(1.0),
            self.time / ARENA_SECONDS,
        ];
        let steer = self.genome.activate(&inputs);
        let ax = steer.first().copied().unwrap_or(0.0);
        let ay = steer.get(1).copied().unwrap_or(0.0);
        if ax.signum() != self.prev_ax.signum() && ax.abs() > 0.1 && self.prev_ax.abs() > 0.1 {
            self.reversals += 1.0;
        }
        self.prev_ax = ax;
        self.px = (self.px + ax * AGENT_SPEED * dt).clamp(0.0, 1.0);
        self.py = (self.py + ay * AGENT_SPEED * dt).clamp(0.0, 1.0);
        self.position_sum += self.px;
        self.movement_sum += (ax * ax + ay * ay).sqrt();

        // Hazards move; off-board ones count as dodged.
        for h in &mut self.hazards {
            h.x += h.vx * dt;
            h.y += h.vy * dt;
        }
        let (px, py) = (self.px, self.py);
        let mut hits = 0;
        self.hazards.retain(|h| {
            let on_board = (-0.05..=1.05).contains(&h.x) && (-0.05..=1.05).contains(&h.y);
            let dx = h.x - px;
            let dy = h.y - py;
            let hit = dx * dx + dy * dy < HAZARD_RADIUS * HAZARD_RADIUS;
            if hit {
                hits += 1;
            }
            on_board && !hit
        });
        self.health -= hits;
        self.damage_taken += hits as f32;
        if hits == 0 && self.ticks % 30 == 0 {
            self.dodged += 1;
        }

        // Chaser, driven by the opponent genome.
        if let Some(opponent) = &self.opponent {
            let (cdx, cdy) = (self.px - self.chaser_x, self.py - self.chaser_y);
            let cdist = (cdx * cdx + cdy * cdy).sqrt();
            let chase_inputs = [
                self.chaser_x * 2.0 - 1.0,
                self.chaser_y * 2.0 - 1.0,
                cdx,
                cdy,
                (cdist / 1.5).min(1.0),
                self.time / ARENA_SECONDS,
            ];
            let chase = opponent.activate(&chase_inputs);
            let cx = chase.first().copied().unwrap_or(0.0);
            let cy = chase.get(1).copied().unwrap_or(0.0);
            let speed = CHASER_BASE_SPEED * self.overrides.opponent_speed;
            self.chaser_x = (self.chaser_x + cx * speed * dt).clamp(0.0, 1.0);
            self.chaser_y = (self.chaser_y + cy * speed * dt).clamp(0.0, 1.0);

            if cdist < PRESSURE_RANGE {
                self.pressure_time += dt;
            }
            if cdist < HAZARD_RADIUS && self.contact_cooldown == 0.0 {
                self.health -= 1;
                self.damage_taken += 1.0;
                self.contact_cooldown = CONTACT_COOLDOWN;
            }
        }
    }

    fn outcome(&self, terminal: TerminalReason) -> EpisodeOutcome {
        let survival = self.time;
        let fitness = survival + 2.0 * self.dodged as f32 - 5.0 * self.damage_taken;

        let ticks = self.ticks.max(1) as f32;
        let behavior = [
            (self.position_sum / ticks).clamp(0.0, 1.0),
            (self.movement_sum / ticks).clamp(0.0, 1.0),
        ];

        // Objectives: survive, dodge, stay efficient (low movement).
        let objectives = vec![
            survival,
            self.dodged as f32,
            -(self.movement_sum / ticks),
        ];

        let duel = self.opponent.as_ref().map(|_| DuelOutcome {
            player_score: fitness,
            damage: self.damage_taken,
            pressure: (self.pressure_time / survival.max(f32::EPSILON)).min(1.0),
            survival_seconds: survival,
            reversals: self.reversals,
        });

        EpisodeOutcome {
            fitness,
            objectives,
            behavior: Some(behavior),
            terminal,
            duel,
        }
    }
}

impl Episode for DodgeEpisode {
    fn step(&mut self, dt: f32) -> EpisodeStatus {
        self.step_world(dt);
        if self.health <= 0 {
            EpisodeStatus::Finished(self.outcome(TerminalReason::Died))
        } else if self.time >= ARENA_SECONDS {
            EpisodeStatus::Finished(self.outcome(TerminalReason::Completed))
        } else {
            EpisodeStatus::Running
        }
    }

    fn interrupt(&self) -> EpisodeOutcome {
        self.outcome(TerminalReason::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Architecture;

    fn request(weights_seed: f32) -> EpisodeRequest {
        let arch = Architecture::default();
        EpisodeRequest {
            individual: 0,
            genome: Genome::Dense {
                arch,
                weights: vec![weights_seed; arch.weight_count()],
            },
            opponent: None,
            matchup: None,
        }
    }

    fn run_episode(request: &EpisodeRequest, seed: u64) -> EpisodeOutcome {
        let mut arena = DodgeArena;
        let events = SeedEvents { seed_index: 0, seed };
        let mut episode = arena.spawn(request, &events, &EnvOverrides::default());
        loop {
            match episode.step(1.0 / 30.0) {
                EpisodeStatus::Finished(outcome) => return outcome,
                EpisodeStatus::Running => {}
            }
        }
    }

    #[test]
    fn test_episode_terminates() {
        let outcome = run_episode(&request(0.1), 12);
        assert!(matches!(
            outcome.terminal,
            TerminalReason::Completed | TerminalReason::Died
        ));
        assert!(outcome.behavior.is_some());
        assert_eq!(outcome.objectives.len(), 3);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let a = run_episode(&request(0.2), 77);
        let b = run_episode(&request(0.2), 77);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = run_episode(&request(0.2), 77);
        let b = run_episode(&request(0.2), 78);
        assert_ne!(a, b);
    }

    #[test]
    fn test_versus_reports_duel() {
        let arch = Architecture::default();
        let mut req = request(0.1);
        req.opponent = Some(Genome::Dense {
            arch,
            weights: vec![0.3; arch.weight_count()],
        });
        let outcome = run_episode(&req, 5);
        let duel = outcome.duel.expect("versus episode must report a duel");
        assert!(duel.survival_seconds > 0.0);
        assert!((0.0..=1.0).contains(&duel.pressure));
    }

    #[test]
    fn test_behavior_within_unit_square() {
        let outcome = run_episode(&request(0.4), 9);
        let behavior = outcome.behavior.unwrap();
        assert!((0.0..=1.0).contains(&behavior[0]));
        assert!((0.0..=1.0).contains(&behavior[1]));
    }
}
