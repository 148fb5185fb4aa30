use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use walker_evo::generation::{GenerationObserver, NoopObserver};
use walker_evo::neuro::{
    EvolutionConfig, FeedForwardGenome, Population, read_genome_file, write_genome_file,
};
use walker_evo::server::{DEFAULT_BIND_HOST, EvolutionHub, bind_listener, resolve_bind_port, serve};
use walker_evo::{Result, SimConfig, SimError, evaluate_genomes};

#[derive(Parser, Debug)]
#[command(
    name = "walker-evo",
    version,
    about = "Evolve controllers for a four-segment planar walker"
)]
struct Args {
    /// Number of generations to evolve
    #[arg(long, default_value_t = 1000)]
    generations: usize,

    /// Genomes (walkers) per generation
    #[arg(long, default_value_t = 50)]
    population: usize,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Hidden-layer width of the evolved networks
    #[arg(long)]
    hidden: Option<usize>,

    /// Tick ceiling per generation (overrides WALKER_MAX_TICKS)
    #[arg(long)]
    max_ticks: Option<u32>,

    /// Let different walkers collide with each other
    #[arg(long)]
    walkers_collide: bool,

    /// Simulation parameters as JSON; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the fittest genome to this JSON file when evolution ends
    #[arg(long)]
    save_best: Option<PathBuf>,

    /// Evaluate a saved genome for one generation instead of evolving
    #[arg(long, conflicts_with = "save_best")]
    replay: Option<PathBuf>,

    /// Serve diagnostics over HTTP/websocket while evolving
    #[arg(long)]
    serve: bool,

    /// Diagnostics port (overrides WALKER_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let sim = load_sim_config(&args)?;
    sim.validate()?;

    if let Some(path) = &args.replay {
        let genome = read_genome_file(path)?;
        return tokio::task::spawn_blocking(move || replay(genome, &sim))
            .await
            .map_err(|err| SimError::Worker(err.to_string()))?;
    }

    let evolution = EvolutionConfig {
        population_size: args.population,
        generations: args.generations,
        seed: args.seed,
        hidden_nodes: args
            .hidden
            .unwrap_or(EvolutionConfig::default().hidden_nodes),
        ..EvolutionConfig::default()
    };
    evolution.validate()?;
    info!(
        "evolving {} walkers for up to {} generations (seed {}, max {} ticks per generation)",
        evolution.population_size, evolution.generations, evolution.seed, sim.max_ticks
    );

    let best = if args.serve {
        run_with_server(sim, evolution, args.port).await?
    } else {
        tokio::task::spawn_blocking(move || evolve(&sim, evolution, None))
            .await
            .map_err(|err| SimError::Worker(err.to_string()))??
    };

    match (best, &args.save_best) {
        (Some(genome), Some(path)) => {
            write_genome_file(path, &genome)?;
            info!(
                "best genome (fitness {:.2}) written to {}",
                genome.fitness,
                path.display()
            );
        }
        (Some(genome), None) => info!("best fitness {:.2}", genome.fitness),
        (None, _) => info!("no generation was evaluated"),
    }
    Ok(())
}

fn load_sim_config(args: &Args) -> Result<SimConfig> {
    let mut sim = match &args.config {
        Some(path) => read_sim_config(path)?,
        None => SimConfig::from_env(),
    };
    if let Some(max_ticks) = args.max_ticks {
        sim.max_ticks = max_ticks;
    }
    if args.walkers_collide {
        sim.walkers_collide = true;
    }
    Ok(sim)
}

fn read_sim_config(path: &Path) -> Result<SimConfig> {
    let payload = fs::read(path)?;
    Ok(serde_json::from_slice::<SimConfig>(&payload)?)
}

async fn run_with_server(
    sim: SimConfig,
    evolution: EvolutionConfig,
    port: Option<u16>,
) -> Result<Option<FeedForwardGenome>> {
    let hub = EvolutionHub::new(evolution.population_size, evolution.generations);
    let (listener, addr) = bind_listener(DEFAULT_BIND_HOST, resolve_bind_port(port)).await?;
    info!("walker-evo diagnostics listening on http://{addr}");
    let server = tokio::spawn(serve(listener, hub.clone()));

    let worker_hub = hub.clone();
    let outcome = tokio::task::spawn_blocking(move || evolve(&sim, evolution, Some(&worker_hub)))
        .await
        .map_err(|err| SimError::Worker(err.to_string()))?;

    let best = match outcome {
        Ok(best) => {
            hub.finish();
            best
        }
        Err(err) => {
            hub.fail(err.to_string());
            server.abort();
            return Err(err);
        }
    };

    info!("evolution finished; diagnostics stay up until Ctrl+C");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        served = server => served.map_err(|err| SimError::Worker(err.to_string()))??,
    }
    Ok(best)
}

/// Blocking evolution loop; runs on a worker thread.
fn evolve(
    sim: &SimConfig,
    evolution: EvolutionConfig,
    hub: Option<&EvolutionHub>,
) -> Result<Option<FeedForwardGenome>> {
    let generations = evolution.generations;
    let mut population = Population::new(evolution)?;
    population.run(
        generations,
        |members| match hub {
            Some(hub) => {
                hub.begin_generation();
                evaluate_genomes(members, sim, &mut hub.observer())
            }
            None => evaluate_genomes(members, sim, &mut NoopObserver),
        },
        |summary| {
            if let Some(hub) = hub {
                hub.record_summary(summary.clone());
            }
        },
    )
}

fn replay(genome: FeedForwardGenome, sim: &SimConfig) -> Result<()> {
    struct Progress;
    impl GenerationObserver for Progress {
        fn wants_snapshots(&self) -> bool {
            true
        }
        fn on_snapshot(&mut self, frame: &walker_evo::SnapshotFrame) {
            if let Some(walker) = frame.walkers.first() {
                if let Some(torso) = walker.parts.first() {
                    info!(
                        "tick {:>5} torso x={:.2} y={:.2} fitness={:.1}",
                        frame.tick, torso.pose.x, torso.pose.y, walker.fitness
                    );
                }
            }
        }
    }

    let sim = SimConfig {
        snapshot_every: sim.snapshot_every.max(50),
        ..sim.clone()
    };
    let mut members = vec![(0, genome)];
    let report = evaluate_genomes(&mut members, &sim, &mut Progress)?;
    if let Some(outcome) = report.best() {
        info!(
            "replay finished after {} ticks: fitness {:.2}, reason {}, final x {:.2}",
            report.ticks,
            outcome.fitness,
            outcome.reason.map(|reason| reason.label()).unwrap_or("none"),
            outcome.final_x
        );
    }
    Ok(())
}
