use gggp::config::Config;
use gggp::evolution::EvolutionEngine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::env;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    log::info!("Booting GGGP...");

    // 1. Load and Validate Configuration
    let config_path = env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config_path = Path::new(&config_path);
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration '{}' loaded and validated.", config_path.display());

    // 2. Build Grammar
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let grammar = match config.build_grammar(base_dir) {
        Ok(g) => g,
        Err(e) => {
            log::error!("Failed to build grammar: {}", e);
            process::exit(1);
        }
    };
    log::info!(
        "Grammar ready with start symbol '{}' and {} rules.",
        grammar.start_symbol(),
        grammar.rules.len()
    );

    // 3. Run the Evolution
    let rng = match config.ga.seed {
        Some(seed) => {
            log::info!("Using seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };
    let assignment = config.assignment();
    let mut engine = EvolutionEngine::new(&config.ga, &grammar, &assignment, rng);

    log::info!("--- Starting Evolution ---");
    let elites = match engine.evolve() {
        Ok(elites) => elites,
        Err(e) => {
            log::error!("Evolution failed: {}", e);
            process::exit(1);
        }
    };

    // 4. Report the final elites
    log::info!("--- Evolution Complete: {} elites ---", elites.len());
    for (i, elite) in elites.iter().enumerate() {
        println!(
            "[Rank {}] Score: {:.4} | {} | genome {:?}",
            i + 1,
            elite.score,
            elite.phenotype.as_deref().unwrap_or("<unmapped>"),
            elite.genome
        );
    }
}
