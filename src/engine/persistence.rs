//! JSON persistence: run snapshots, best-genome exports, polled metrics,
//! the elite reservoir, and the cross-run migration pool.
//!
//! All writes go through a temp-file-plus-rename so an external poller (or a
//! crash) never observes a half-written file. Load failures are recoverable:
//! the caller logs and starts fresh.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::schema::{GenerationMetrics, Genome, MigrationConfig, ReservoirConfig};

use super::rng::EvoRng;
use super::PopulationSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

static TMP_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Serialize `value` to `path` atomically. The temp name carries the process
/// id and a serial so concurrent writers of the same target never share a
/// temp file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(value)?;
    let serial = TMP_SERIAL.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp.{}.{serial}", std::process::id()));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Best-genome export record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestRecord {
    pub genome: Genome,
    pub fitness: f32,
    pub generation: usize,
    pub timestamp: u64,
}

/// Run-directory persistence: snapshots, best genome, polled metrics.
pub struct Persistence {
    dir: PathBuf,
}

impl Persistence {
    pub fn new(dir: PathBuf) -> Result<Self, PersistError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_snapshot(&self, snapshot: &PopulationSnapshot) -> Result<(), PersistError> {
        write_json_atomic(&self.dir.join("population.json"), snapshot)
    }

    /// Load a previously saved snapshot. A missing or corrupt file is not
    /// fatal: the run starts from a fresh population instead.
    pub fn load_snapshot(&self) -> Option<PopulationSnapshot> {
        let path = self.dir.join("population.json");
        if !path.exists() {
            return None;
        }
        match read_json(&path) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("ignoring unreadable snapshot {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn save_best(
        &self,
        genome: &Genome,
        fitness: f32,
        generation: usize,
    ) -> Result<(), PersistError> {
        let record = BestRecord {
            genome: genome.clone(),
            fitness,
            generation,
            timestamp: unix_timestamp(),
        };
        write_json_atomic(&self.dir.join("best.json"), &record)
    }

    pub fn load_best(&self) -> Option<BestRecord> {
        let path = self.dir.join("best.json");
        if !path.exists() {
            return None;
        }
        read_json(&path)
            .map_err(|err| warn!("ignoring unreadable best record: {}", err))
            .ok()
    }

    /// Rewrite the polled metrics file.
    pub fn write_metrics(&self, metrics: &GenerationMetrics) -> Result<(), PersistError> {
        write_json_atomic(&self.dir.join("metrics.json"), metrics)
    }
}

/// One elite reservoir entry on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservoirEntry {
    pub run_id: String,
    pub timestamp: u64,
    pub fitness: f32,
    pub genome: Genome,
}

/// Cross-run archive of top genomes. Each elite is an independent file so
/// concurrent runs can deposit without coordinating; the oldest files are
/// evicted once the cap is reached.
pub struct EliteReservoir {
    dir: PathBuf,
    config: ReservoirConfig,
}

impl EliteReservoir {
    pub fn new(dir: PathBuf, config: ReservoirConfig) -> Result<Self, PersistError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, config })
    }

    /// Fraction of a final ranked population this reservoir keeps.
    pub fn elite_count(&self, population_size: usize) -> usize {
        ((population_size as f32 * self.config.fraction).ceil() as usize).max(1)
    }

    /// Store the given elites, then evict the oldest entries beyond the cap.
    pub fn deposit(&self, run_id: &str, elites: &[(Genome, f32)]) -> Result<(), PersistError> {
        let timestamp = unix_timestamp();
        for (index, (genome, fitness)) in elites.iter().enumerate() {
            let entry = ReservoirEntry {
                run_id: run_id.to_string(),
                timestamp,
                fitness: *fitness,
                genome: genome.clone(),
            };
            let path = self.dir.join(format!("elite_{run_id}_{index}.json"));
            write_json_atomic(&path, &entry)?;
        }
        self.evict()?;
        info!("deposited {} elites from run {}", elites.len(), run_id);
        Ok(())
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, PersistError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn evict(&self) -> Result<(), PersistError> {
        let mut files = self.entry_files()?;
        if files.len() <= self.config.max_files {
            return Ok(());
        }
        // Oldest first, by deposit timestamp stored in the entry.
        let mut stamped: Vec<(u64, PathBuf)> = files
            .drain(..)
            .map(|path| {
                let stamp = read_json::<ReservoirEntry>(&path)
                    .map(|e| e.timestamp)
                    .unwrap_or(0);
                (stamp, path)
            })
            .collect();
        stamped.sort_by_key(|(stamp, _)| *stamp);
        let excess = stamped.len() - self.config.max_files;
        for (_, path) in stamped.into_iter().take(excess) {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Draw up to `count` distinct entries uniformly at random.
    pub fn sample(&self, count: usize, rng: &mut EvoRng) -> Result<Vec<ReservoirEntry>, PersistError> {
        let mut files = self.entry_files()?;
        let mut picked = Vec::new();
        while picked.len() < count && !files.is_empty() {
            let path = files.swap_remove(rng.index(files.len()));
            match read_json(&path) {
                Ok(entry) => picked.push(entry),
                Err(err) => warn!("skipping unreadable reservoir entry: {}", err),
            }
        }
        Ok(picked)
    }
}

/// Shared migration pool for NEAT workers. Each worker exports its best
/// genome periodically and imports another worker's export when stagnant.
pub struct MigrationPool {
    config: MigrationConfig,
    worker_id: String,
}

impl MigrationPool {
    pub fn new(config: MigrationConfig, worker_id: String) -> Result<Self, PersistError> {
        fs::create_dir_all(&config.pool_dir)?;
        Ok(Self { config, worker_id })
    }

    pub fn export_interval(&self) -> usize {
        self.config.export_interval
    }

    pub fn import_after_stagnant(&self) -> usize {
        self.config.import_after_stagnant
    }

    pub fn export(
        &self,
        genome: &Genome,
        fitness: f32,
        generation: usize,
    ) -> Result<(), PersistError> {
        let record = BestRecord {
            genome: genome.clone(),
            fitness,
            generation,
            timestamp: unix_timestamp(),
        };
        let path = self
            .config
            .pool_dir
            .join(format!("best_{}_{}.json", self.worker_id, generation));
        write_json_atomic(&path, &record)
    }

    /// A random export from any other worker, or None if the pool only holds
    /// this worker's own files.
    pub fn import(&self, rng: &mut EvoRng) -> Result<Option<BestRecord>, PersistError> {
        let own_prefix = format!("best_{}_", self.worker_id);
        let mut candidates = Vec::new();
        for entry in fs::read_dir(&self.config.pool_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with("best_") && !name.starts_with(&own_prefix) {
                candidates.push(path);
            }
        }
        while !candidates.is_empty() {
            let path = candidates.swap_remove(rng.index(candidates.len()));
            match read_json(&path) {
                Ok(record) => {
                    info!("imported migrant from {}", path.display());
                    return Ok(Some(record));
                }
                Err(err) => warn!("skipping unreadable migrant {}: {}", path.display(), err),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::IndividualSnapshot;
    use crate::schema::Architecture;

    fn genome(marker: f32) -> Genome {
        let arch = Architecture {
            inputs: 1,
            hidden: 1,
            outputs: 1,
        };
        Genome::Dense {
            arch,
            weights: vec![marker; arch.weight_count()],
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().to_path_buf()).unwrap();
        let snapshot = PopulationSnapshot {
            generation: 7,
            next_id: 42,
            individuals: vec![IndividualSnapshot {
                id: 3,
                genome: genome(0.5),
                fitness: 12.0,
                behavior: None,
            }],
            neat: None,
        };
        persistence.save_snapshot(&snapshot).unwrap();
        let loaded = persistence.load_snapshot().unwrap();
        assert_eq!(loaded.generation, 7);
        assert_eq!(loaded.next_id, 42);
        assert_eq!(loaded.individuals[0].genome, snapshot.individuals[0].genome);
    }

    #[test]
    fn test_corrupt_snapshot_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join("population.json"), "not json {").unwrap();
        assert!(persistence.load_snapshot().is_none());
    }

    #[test]
    fn test_metrics_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().to_path_buf()).unwrap();
        let metrics = GenerationMetrics::new(3);
        persistence.write_metrics(&metrics).unwrap();
        // No temp file left behind.
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["metrics.json".to_string()]);
    }

    #[test]
    fn test_reservoir_cap_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let reservoir = EliteReservoir::new(
            dir.path().to_path_buf(),
            ReservoirConfig {
                fraction: 0.1,
                max_files: 3,
            },
        )
        .unwrap();
        for run in 0..3 {
            let elites = vec![(genome(run as f32), run as f32), (genome(0.0), 0.0)];
            reservoir.deposit(&format!("run{run}"), &elites).unwrap();
        }
        assert_eq!(reservoir.entry_files().unwrap().len(), 3);
    }

    #[test]
    fn test_reservoir_sample() {
        let dir = tempfile::tempdir().unwrap();
        let reservoir =
            EliteReservoir::new(dir.path().to_path_buf(), ReservoirConfig::default()).unwrap();
        reservoir
            .deposit("r1", &[(genome(1.0), 5.0), (genome(2.0), 4.0)])
            .unwrap();
        let mut rng = EvoRng::new(3);
        let sampled = reservoir.sample(5, &mut rng).unwrap();
        assert_eq!(sampled.len(), 2);
        assert!(sampled.iter().all(|e| e.run_id == "r1"));
    }

    #[test]
    fn test_migration_skips_own_exports() {
        let dir = tempfile::tempdir().unwrap();
        let config = MigrationConfig {
            pool_dir: dir.path().to_path_buf(),
            export_interval: 5,
            import_after_stagnant: 10,
        };
        let alpha = MigrationPool::new(config.clone(), "alpha".into()).unwrap();
        alpha.export(&genome(1.0), 3.0, 2).unwrap();

        let mut rng = EvoRng::new(9);
        // Own export is invisible to itself.
        assert!(alpha.import(&mut rng).unwrap().is_none());

        let beta = MigrationPool::new(config, "beta".into()).unwrap();
        let migrant = beta.import(&mut rng).unwrap().unwrap();
        assert_eq!(migrant.fitness, 3.0);
    }
}
