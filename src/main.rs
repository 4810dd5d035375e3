//! Evotrek CLI - run a training session from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use evotrek::{
    arena::DodgeArena,
    engine::Trainer,
    schema::TrainingConfig,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        eprintln!();
        eprintln!("Run evolutionary training from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to training configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: TrainingConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    println!("Evotrek Training");
    println!("================");
    println!("Population: {}", config.population.size);
    println!(
        "Scheduler: {} slots, {} evals/individual",
        config.scheduler.parallel_count, config.scheduler.evals_per_individual
    );
    println!("Max generations: {}", config.stop.max_generations);
    if !config.curriculum.is_empty() {
        println!("Curriculum stages: {}", config.curriculum.len());
    }
    println!();

    let mut trainer = Trainer::new(config, DodgeArena::default()).unwrap_or_else(|e| {
        eprintln!("Error starting trainer: {}", e);
        std::process::exit(1);
    });

    println!("Run id: {}", trainer.run_id());
    println!("Training...");
    let start = Instant::now();

    let history = trainer.run().unwrap_or_else(|e| {
        eprintln!("Training failed: {}", e);
        std::process::exit(1);
    });

    let elapsed = start.elapsed();
    println!();
    println!("Finished: {:?}", history.stop_reason);
    println!("Generations: {}", history.generations());
    if let Some(best) = history
        .best_fitness
        .iter()
        .copied()
        .fold(None::<f32>, |acc, f| Some(acc.map_or(f, |a| a.max(f))))
    {
        println!("Best fitness: {:.3}", best);
    }
    if let Some(last_avg) = history.avg_fitness.last() {
        println!("Final avg fitness: {:.3}", last_avg);
    }
    println!("Time: {:.2}s", elapsed.as_secs_f32());
}

fn print_example_config() {
    let config = TrainingConfig::example();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}
