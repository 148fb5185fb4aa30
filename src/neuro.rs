//! Built-in neuroevolution: a fixed-topology feed-forward network evolved
//! by elitist tournament selection with uniform crossover and Gaussian
//! weight mutation.

use std::f32::consts::TAU;
use std::fs;
use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::{Controller, OUTPUT_COUNT, SENSOR_COUNT};
use crate::error::{Result, SimError};
use crate::generation::GenerationReport;
use crate::population::{GenomeId, WalkerGenome};
use crate::walker::TerminationReason;

pub const DEFAULT_HIDDEN_NODES: usize = 8;
const OUTPUT_STEEPNESS: f32 = 5.0;
const SIGMOID_CLAMP: f32 = 60.0;

/// `1 / (1 + e^(-5z))` with the exponent clamped so huge inputs saturate
/// instead of overflowing.
pub fn steep_sigmoid(z: f32) -> f32 {
    let z = (OUTPUT_STEEPNESS * z).clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP);
    1.0 / (1.0 + (-z).exp())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedForwardGenome {
    pub hidden: usize,
    /// Row-major `hidden x SENSOR_COUNT`.
    pub input_weights: Vec<f32>,
    pub hidden_bias: Vec<f32>,
    /// Row-major `OUTPUT_COUNT x hidden`.
    pub output_weights: Vec<f32>,
    pub output_bias: Vec<f32>,
    #[serde(default)]
    pub fitness: f32,
}

impl FeedForwardGenome {
    pub fn zeroed(hidden: usize) -> Self {
        Self {
            hidden,
            input_weights: vec![0.0; hidden * SENSOR_COUNT],
            hidden_bias: vec![0.0; hidden],
            output_weights: vec![0.0; OUTPUT_COUNT * hidden],
            output_bias: vec![0.0; OUTPUT_COUNT],
            fitness: 0.0,
        }
    }

    /// Standard-normal genes clipped to `±weight_limit`.
    pub fn random(hidden: usize, weight_limit: f32, rng: &mut SmallRng) -> Self {
        let limit = weight_limit.abs().max(f32::MIN_POSITIVE);
        let mut genome = Self::zeroed(hidden);
        for gene in genome.genes_mut() {
            *gene = gaussian(rng).clamp(-limit, limit);
        }
        genome
    }

    pub fn gene_count(&self) -> usize {
        self.input_weights.len()
            + self.hidden_bias.len()
            + self.output_weights.len()
            + self.output_bias.len()
    }

    fn genes(&self) -> impl Iterator<Item = &f32> {
        self.input_weights
            .iter()
            .chain(&self.hidden_bias)
            .chain(&self.output_weights)
            .chain(&self.output_bias)
    }

    fn genes_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.input_weights
            .iter_mut()
            .chain(self.hidden_bias.iter_mut())
            .chain(self.output_weights.iter_mut())
            .chain(self.output_bias.iter_mut())
    }

    fn check_shape(&self) -> Result<()> {
        let expected = [
            ("inputWeights", self.input_weights.len(), self.hidden * SENSOR_COUNT),
            ("hiddenBias", self.hidden_bias.len(), self.hidden),
            ("outputWeights", self.output_weights.len(), OUTPUT_COUNT * self.hidden),
            ("outputBias", self.output_bias.len(), OUTPUT_COUNT),
        ];
        for (name, actual, wanted) in expected {
            if actual != wanted {
                return Err(SimError::Controller(format!(
                    "{name} has {actual} values, expected {wanted}"
                )));
            }
        }
        if self.genes().any(|gene| !gene.is_finite()) {
            return Err(SimError::Controller(
                "genome contains non-finite weights".to_string(),
            ));
        }
        Ok(())
    }
}

/// Phenotype of a [`FeedForwardGenome`].
#[derive(Clone, Debug)]
pub struct FeedForwardNetwork {
    hidden: usize,
    input_weights: Vec<f32>,
    hidden_bias: Vec<f32>,
    output_weights: Vec<f32>,
    output_bias: Vec<f32>,
}

impl FeedForwardNetwork {
    pub fn from_genome(genome: &FeedForwardGenome) -> Result<Self> {
        genome.check_shape()?;
        Ok(Self {
            hidden: genome.hidden,
            input_weights: genome.input_weights.clone(),
            hidden_bias: genome.hidden_bias.clone(),
            output_weights: genome.output_weights.clone(),
            output_bias: genome.output_bias.clone(),
        })
    }
}

impl Controller for FeedForwardNetwork {
    fn activate(&self, inputs: &[f32; SENSOR_COUNT]) -> Vec<f32> {
        let hidden: Vec<f32> = self
            .input_weights
            .chunks_exact(SENSOR_COUNT)
            .zip(&self.hidden_bias)
            .map(|(row, bias)| {
                let sum: f32 = row.iter().zip(inputs).map(|(w, x)| w * x).sum();
                (sum + bias).tanh()
            })
            .collect();

        if self.hidden == 0 {
            return self.output_bias.iter().map(|b| steep_sigmoid(*b)).collect();
        }
        self.output_weights
            .chunks_exact(self.hidden)
            .zip(&self.output_bias)
            .map(|(row, bias)| {
                let sum: f32 = row.iter().zip(&hidden).map(|(w, h)| w * h).sum();
                steep_sigmoid(sum + bias)
            })
            .collect()
    }
}

impl WalkerGenome for FeedForwardGenome {
    type Controller = FeedForwardNetwork;

    fn build_controller(&self) -> Result<FeedForwardNetwork> {
        FeedForwardNetwork::from_genome(self)
    }

    fn set_fitness(&mut self, fitness: f32) {
        self.fitness = fitness;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    pub elite_count: usize,
    pub tournament_size: usize,
    pub crossover_rate: f32,
    /// Per-gene chance of a Gaussian perturbation.
    pub mutation_rate: f32,
    pub mutation_power: f32,
    /// Per-gene chance of being redrawn from scratch.
    pub replace_rate: f32,
    pub weight_limit: f32,
    pub hidden_nodes: usize,
    /// Stop early once the best fitness reaches this value.
    pub fitness_threshold: Option<f32>,
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 1000,
            elite_count: 2,
            tournament_size: 3,
            crossover_rate: 0.75,
            mutation_rate: 0.8,
            mutation_power: 0.5,
            replace_rate: 0.1,
            weight_limit: 30.0,
            hidden_nodes: DEFAULT_HIDDEN_NODES,
            fitness_threshold: None,
            seed: 1,
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(SimError::EmptyPopulation);
        }
        if self.elite_count > self.population_size {
            return Err(SimError::InvalidConfig(format!(
                "elite count {} exceeds population size {}",
                self.elite_count, self.population_size
            )));
        }
        for (name, rate) in [
            ("crossoverRate", self.crossover_rate),
            ("mutationRate", self.mutation_rate),
            ("replaceRate", self.replace_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be within [0, 1]; got {rate}"
                )));
            }
        }
        if !(self.weight_limit.is_finite() && self.weight_limit > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "weightLimit must be positive; got {}",
                self.weight_limit
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonCount {
    pub reason: TerminationReason,
    pub count: usize,
}

/// Reporter line for one evaluated generation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_fitness: f32,
    pub mean_fitness: f32,
    pub fitness_stdev: f32,
    pub best_genome_id: GenomeId,
    pub ticks: u32,
    pub floor_level: u32,
    pub reasons: Vec<ReasonCount>,
}

impl GenerationSummary {
    fn from_report(
        generation: usize,
        members: &[(GenomeId, FeedForwardGenome)],
        report: &GenerationReport,
    ) -> Self {
        let fitness: Vec<f32> = members.iter().map(|(_, g)| g.fitness).collect();
        let mean = mean(&fitness);
        let best = members
            .iter()
            .max_by(|a, b| a.1.fitness.total_cmp(&b.1.fitness));
        Self {
            generation,
            best_fitness: best.map(|(_, g)| g.fitness).unwrap_or(0.0),
            mean_fitness: mean,
            fitness_stdev: stdev(&fitness, mean),
            best_genome_id: best.map(|(id, _)| *id).unwrap_or_default(),
            ticks: report.ticks,
            floor_level: report.floor_level,
            reasons: TerminationReason::ALL
                .iter()
                .map(|reason| ReasonCount {
                    reason: *reason,
                    count: report.count(*reason),
                })
                .filter(|entry| entry.count > 0)
                .collect(),
        }
    }

    fn log(&self) {
        let reasons = self
            .reasons
            .iter()
            .map(|entry| format!("{}={}", entry.reason.label(), entry.count))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            "generation {} best={:.2} (genome {}) mean={:.2} stdev={:.2} ticks={} floor_level={} [{}]",
            self.generation,
            self.best_fitness,
            self.best_genome_id,
            self.mean_fitness,
            self.fitness_stdev,
            self.ticks,
            self.floor_level,
            reasons
        );
    }
}

pub struct Population {
    config: EvolutionConfig,
    rng: SmallRng,
    members: Vec<(GenomeId, FeedForwardGenome)>,
    next_id: GenomeId,
    generation: usize,
    best: Option<(GenomeId, FeedForwardGenome)>,
    history: Vec<GenerationSummary>,
}

impl Population {
    pub fn new(config: EvolutionConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let members: Vec<_> = (0..config.population_size)
            .map(|i| {
                (
                    i as GenomeId,
                    FeedForwardGenome::random(config.hidden_nodes, config.weight_limit, &mut rng),
                )
            })
            .collect();
        Ok(Self {
            next_id: members.len() as GenomeId,
            config,
            rng,
            members,
            generation: 0,
            best: None,
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn members(&self) -> &[(GenomeId, FeedForwardGenome)] {
        &self.members
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Fittest genome seen in any evaluated generation.
    pub fn best(&self) -> Option<&(GenomeId, FeedForwardGenome)> {
        self.best.as_ref()
    }

    pub fn history(&self) -> &[GenerationSummary] {
        &self.history
    }

    /// Evaluates the current members once and records the outcome.
    pub fn evaluate_with<F>(&mut self, evaluate: F) -> Result<GenerationSummary>
    where
        F: FnOnce(&mut [(GenomeId, FeedForwardGenome)]) -> Result<GenerationReport>,
    {
        let report = evaluate(&mut self.members)?;
        let summary = GenerationSummary::from_report(self.generation, &self.members, &report);
        summary.log();

        let generation_best = self
            .members
            .iter()
            .max_by(|a, b| a.1.fitness.total_cmp(&b.1.fitness));
        if let Some((id, genome)) = generation_best {
            let improved = self
                .best
                .as_ref()
                .is_none_or(|(_, best)| genome.fitness > best.fitness);
            if improved {
                self.best = Some((*id, genome.clone()));
            }
        }
        self.history.push(summary.clone());
        Ok(summary)
    }

    /// Replaces the members with the next generation.
    pub fn reproduce(&mut self) {
        let mut ranked = self.members.clone();
        ranked.sort_by(|a, b| b.1.fitness.total_cmp(&a.1.fitness));

        let size = self.config.population_size;
        let mut next = Vec::with_capacity(size);
        next.extend(ranked.iter().take(self.config.elite_count).cloned());

        while next.len() < size {
            let parent_a = tournament_select(&ranked, self.config.tournament_size, &mut self.rng);
            let child = if self.rng.random::<f32>() < self.config.crossover_rate {
                let parent_b =
                    tournament_select(&ranked, self.config.tournament_size, &mut self.rng);
                crossover_genome(&parent_a.1, &parent_b.1, &mut self.rng)
            } else {
                parent_a.1.clone()
            };
            let mut child = mutate_genome(child, &self.config, &mut self.rng);
            child.fitness = 0.0;
            next.push((self.next_id, child));
            self.next_id += 1;
        }

        self.members = next;
        self.generation += 1;
    }

    /// Runs up to `generations` evaluate/reproduce rounds, stopping early at
    /// the fitness threshold. Returns the fittest genome seen.
    pub fn run<F, S>(
        &mut self,
        generations: usize,
        mut evaluate: F,
        mut on_summary: S,
    ) -> Result<Option<FeedForwardGenome>>
    where
        F: FnMut(&mut [(GenomeId, FeedForwardGenome)]) -> Result<GenerationReport>,
        S: FnMut(&GenerationSummary),
    {
        for round in 0..generations {
            let summary = self.evaluate_with(&mut evaluate)?;
            on_summary(&summary);
            if let Some(threshold) = self.config.fitness_threshold {
                if summary.best_fitness >= threshold {
                    info!(
                        "fitness threshold {threshold} reached in generation {}",
                        summary.generation
                    );
                    break;
                }
            }
            if round + 1 < generations {
                self.reproduce();
            }
        }
        Ok(self.best.as_ref().map(|(_, genome)| genome.clone()))
    }
}

pub fn write_genome_file(path: &Path, genome: &FeedForwardGenome) -> Result<()> {
    let payload = serde_json::to_vec_pretty(genome)?;
    fs::write(path, payload)?;
    Ok(())
}

pub fn read_genome_file(path: &Path) -> Result<FeedForwardGenome> {
    let payload = fs::read(path)?;
    let genome = serde_json::from_slice::<FeedForwardGenome>(&payload)?;
    genome.check_shape()?;
    Ok(genome)
}

/// Best of `size` uniform draws (with replacement) from `ranked`, which
/// must not be empty.
fn tournament_select<'a>(
    ranked: &'a [(GenomeId, FeedForwardGenome)],
    size: usize,
    rng: &mut SmallRng,
) -> &'a (GenomeId, FeedForwardGenome) {
    let mut draw = || &ranked[rng.random_range(0..ranked.len())];
    let first = draw();
    (1..size.max(1)).map(|_| draw()).fold(first, |best, entrant| {
        if entrant.1.fitness > best.1.fitness {
            entrant
        } else {
            best
        }
    })
}

fn crossover_genome(
    a: &FeedForwardGenome,
    b: &FeedForwardGenome,
    rng: &mut SmallRng,
) -> FeedForwardGenome {
    let mut child = a.clone();
    if a.gene_count() != b.gene_count() {
        return child;
    }
    for (gene, other) in child.genes_mut().zip(b.genes()) {
        if rng.random::<f32>() < 0.5 {
            *gene = *other;
        }
    }
    child
}

fn mutate_genome(
    mut genome: FeedForwardGenome,
    config: &EvolutionConfig,
    rng: &mut SmallRng,
) -> FeedForwardGenome {
    let limit = config.weight_limit;
    for gene in genome.genes_mut() {
        if rng.random::<f32>() < config.replace_rate {
            *gene = gaussian(rng);
        } else if rng.random::<f32>() < config.mutation_rate {
            *gene += gaussian(rng) * config.mutation_power;
        }
        *gene = gene.clamp(-limit, limit);
    }
    genome
}

/// One standard-normal sample (Box–Muller, cosine branch).
fn gaussian(rng: &mut SmallRng) -> f32 {
    // 1 - [0, 1) keeps the log argument away from zero.
    let radius = (-2.0 * (1.0 - rng.random::<f32>()).ln()).sqrt();
    radius * (TAU * rng.random::<f32>()).cos()
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn stdev(values: &[f32], mean: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_outputs;
    use crate::config::SimConfig;
    use crate::generation::{NoopObserver, WalkerOutcome};
    use crate::population::evaluate_genomes;

    fn small_config(seed: u64) -> EvolutionConfig {
        EvolutionConfig {
            population_size: 6,
            hidden_nodes: 3,
            elite_count: 1,
            seed,
            ..EvolutionConfig::default()
        }
    }

    fn fake_report(members: &[(GenomeId, FeedForwardGenome)]) -> GenerationReport {
        GenerationReport {
            ticks: 1,
            floor_level: 1,
            outcomes: members
                .iter()
                .enumerate()
                .map(|(id, (_, genome))| WalkerOutcome {
                    id,
                    fitness: genome.fitness,
                    reason: Some(TerminationReason::Fell),
                    time_alive: 1,
                    final_x: 0.0,
                })
                .collect(),
        }
    }

    /// Rewards a large first output bias; no physics involved.
    fn bias_fitness(
        members: &mut [(GenomeId, FeedForwardGenome)],
    ) -> Result<GenerationReport> {
        for (_, genome) in members.iter_mut() {
            genome.fitness = genome.output_bias[0];
        }
        Ok(fake_report(members))
    }

    #[test]
    fn sigmoid_is_steep_and_saturates() {
        assert!((steep_sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(steep_sigmoid(1.0) > 0.99);
        assert!(steep_sigmoid(-1.0) < 0.01);
        assert_eq!(steep_sigmoid(1e9), 1.0 / (1.0 + (-SIGMOID_CLAMP).exp()));
        assert!(steep_sigmoid(-1e9).is_finite());
    }

    #[test]
    fn zeroed_network_stays_below_activation_threshold() {
        let network = FeedForwardNetwork::from_genome(&FeedForwardGenome::zeroed(4)).unwrap();
        let output = network.activate(&[0.3, -0.1, 0.2, 0.0]);
        assert_eq!(output.len(), OUTPUT_COUNT);
        assert!(output.iter().all(|value| (*value - 0.5).abs() < 1e-6));
        let commands = decode_outputs(&output, SimConfig::default().activation_threshold, 3.0);
        assert!(commands.unwrap().is_empty());
    }

    #[test]
    fn output_bias_alone_can_drive_a_command() {
        let mut genome = FeedForwardGenome::zeroed(2);
        genome.output_bias[3] = 1.0;
        let network = genome.build_controller().unwrap();
        let output = network.activate(&[0.0; SENSOR_COUNT]);
        assert!(output[3] > 0.9);
        assert!(output[0] < 0.9);
    }

    #[test]
    fn malformed_genomes_do_not_build() {
        let mut short = FeedForwardGenome::zeroed(3);
        short.hidden_bias.pop();
        assert!(matches!(
            short.build_controller(),
            Err(SimError::Controller(_))
        ));

        let mut poisoned = FeedForwardGenome::zeroed(3);
        poisoned.output_weights[2] = f32::NAN;
        assert!(poisoned.build_controller().is_err());
    }

    #[test]
    fn mutation_stays_within_weight_limit() {
        let config = EvolutionConfig {
            weight_limit: 0.5,
            mutation_rate: 1.0,
            mutation_power: 10.0,
            ..small_config(3)
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let parent = FeedForwardGenome::random(4, 0.5, &mut rng);
        assert!(parent.genes().all(|gene| gene.abs() <= 0.5));
        let child = mutate_genome(parent.clone(), &config, &mut rng);
        assert!(child.genes().all(|gene| gene.abs() <= 0.5));
        assert!(child.genes().zip(parent.genes()).any(|(a, b)| a != b));
    }

    #[test]
    fn tournament_prefers_the_fitter_entrant() {
        let mut ranked: Vec<_> = (0..4)
            .map(|id| (id as GenomeId, FeedForwardGenome::zeroed(2)))
            .collect();
        ranked[2].1.fitness = 9.0;
        let mut rng = SmallRng::seed_from_u64(11);
        let wins = (0..200)
            .filter(|_| tournament_select(&ranked, 4, &mut rng).0 == 2)
            .count();
        // P(entrant 2 drawn at least once in 4 draws) = 1 - (3/4)^4 ~ 0.68.
        assert!(wins > 100, "fittest genome won only {wins} of 200 tournaments");
        assert_eq!(tournament_select(&ranked[..1], 3, &mut rng).0, 0);
    }

    #[test]
    fn same_seed_same_population() {
        let a = Population::new(small_config(11)).unwrap();
        let b = Population::new(small_config(11)).unwrap();
        let c = Population::new(small_config(12)).unwrap();
        assert_eq!(a.members(), b.members());
        assert_ne!(a.members(), c.members());
        assert_eq!(a.members()[0].1.gene_count(), 3 * 4 + 3 + 6 * 3 + 6);
    }

    #[test]
    fn reproduce_keeps_elites_and_size() {
        let mut population = Population::new(small_config(3)).unwrap();
        population.evaluate_with(bias_fitness).unwrap();
        let champion = population
            .members()
            .iter()
            .max_by(|a, b| a.1.fitness.total_cmp(&b.1.fitness))
            .cloned()
            .unwrap();

        population.reproduce();
        assert_eq!(population.members().len(), 6);
        assert_eq!(population.generation(), 1);
        assert_eq!(population.members()[0].0, champion.0);
        assert_eq!(population.members()[0].1.input_weights, champion.1.input_weights);
        let ids: Vec<_> = population.members().iter().map(|(id, _)| *id).collect();
        assert!(ids[1..].iter().all(|id| *id >= 6));
        for (_, genome) in population.members() {
            assert!(genome.genes().all(|g| g.abs() <= 30.0));
        }
    }

    #[test]
    fn elitism_keeps_best_fitness_monotone() {
        let mut population = Population::new(small_config(5)).unwrap();
        let mut seen = Vec::new();
        let best = population
            .run(12, bias_fitness, |summary| seen.push(summary.best_fitness))
            .unwrap()
            .unwrap();
        assert_eq!(seen.len(), 12);
        assert_eq!(population.history().len(), 12);
        assert!(seen.windows(2).all(|pair| pair[1] >= pair[0]));
        assert!((best.fitness - seen[11]).abs() < 1e-6);
    }

    #[test]
    fn threshold_stops_early() {
        let config = EvolutionConfig {
            fitness_threshold: Some(f32::MIN),
            ..small_config(9)
        };
        let mut population = Population::new(config).unwrap();
        population.run(10, bias_fitness, |_| {}).unwrap();
        assert_eq!(population.history().len(), 1);
        assert_eq!(population.generation(), 0);
    }

    #[test]
    fn invalid_evolution_config_is_rejected() {
        let config = EvolutionConfig {
            elite_count: 10,
            ..small_config(1)
        };
        assert!(Population::new(config).is_err());
        let config = EvolutionConfig {
            population_size: 0,
            ..small_config(1)
        };
        assert!(matches!(
            Population::new(config),
            Err(SimError::EmptyPopulation)
        ));
    }

    #[test]
    fn best_genome_file_can_be_reloaded() {
        let mut rng = SmallRng::seed_from_u64(4);
        let mut genome = FeedForwardGenome::random(3, 30.0, &mut rng);
        genome.fitness = 12.5;
        let path = std::env::temp_dir().join(format!(
            "walker-evo-best-{}-{}.json",
            std::process::id(),
            rng.random::<u32>()
        ));
        write_genome_file(&path, &genome).unwrap();
        let loaded = read_genome_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, genome);
    }

    #[test]
    fn evolves_against_the_physics_evaluator() {
        let sim = SimConfig {
            max_ticks: 40,
            ..SimConfig::default()
        };
        let mut population = Population::new(EvolutionConfig {
            population_size: 4,
            ..small_config(21)
        })
        .unwrap();
        let best = population
            .run(
                2,
                |members| evaluate_genomes(members, &sim, &mut NoopObserver),
                |_| {},
            )
            .unwrap()
            .unwrap();
        assert!(best.fitness > 0.0);
        let summary = &population.history()[1];
        assert_eq!(summary.generation, 1);
        assert_eq!(
            summary.reasons.iter().map(|entry| entry.count).sum::<usize>(),
            4
        );
    }
}
