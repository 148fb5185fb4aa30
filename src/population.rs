//! Bridge between an evolving population and the generation evaluator.

use tracing::{debug, warn};

use crate::config::SimConfig;
use crate::controller::Controller;
use crate::error::{Result, SimError};
use crate::generation::{Generation, GenerationObserver, GenerationReport};

pub type GenomeId = u64;

/// What the evaluator needs from a genome: a way to become a controller and
/// a slot to receive its fitness.
pub trait WalkerGenome {
    type Controller: Controller;

    fn build_controller(&self) -> Result<Self::Controller>;

    fn set_fitness(&mut self, fitness: f32);
}

/// Runs one generation with one walker per genome and writes each walker's
/// fitness back into its genome. Walker `i` belongs to `genomes[i]`.
pub fn evaluate_genomes<G: WalkerGenome>(
    genomes: &mut [(GenomeId, G)],
    config: &SimConfig,
    observer: &mut dyn GenerationObserver,
) -> Result<GenerationReport> {
    if genomes.is_empty() {
        return Err(SimError::EmptyPopulation);
    }

    let mut controllers = Vec::with_capacity(genomes.len());
    for (genome_id, genome) in genomes.iter_mut() {
        genome.set_fitness(0.0);
        match genome.build_controller() {
            Ok(controller) => controllers.push(Some(controller)),
            Err(err) => {
                warn!(genome = *genome_id, "{err}; walker starts terminated");
                controllers.push(None);
            }
        }
    }

    let mut generation = Generation::new(config.clone(), controllers)?;
    let report = generation.run(observer)?;

    for ((_, genome), outcome) in genomes.iter_mut().zip(&report.outcomes) {
        genome.set_fitness(outcome.fitness);
    }
    debug!(
        genomes = genomes.len(),
        ticks = report.ticks,
        "generation evaluated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ConstantController;
    use crate::generation::NoopObserver;
    use crate::walker::TerminationReason;

    struct FixedGenome {
        output: Option<Vec<f32>>,
        fitness: f32,
    }

    impl WalkerGenome for FixedGenome {
        type Controller = ConstantController;

        fn build_controller(&self) -> Result<ConstantController> {
            self.output
                .clone()
                .map(ConstantController)
                .ok_or_else(|| SimError::Controller("no network".to_string()))
        }

        fn set_fitness(&mut self, fitness: f32) {
            self.fitness = fitness;
        }
    }

    fn short_config() -> SimConfig {
        SimConfig {
            max_ticks: 25,
            fall_height: -100.0,
            ..SimConfig::default()
        }
    }

    #[test]
    fn fitness_is_written_back_per_genome() {
        let mut genomes = vec![
            (
                7,
                FixedGenome {
                    output: Some(vec![0.0; 6]),
                    fitness: 99.0,
                },
            ),
            (
                8,
                FixedGenome {
                    output: None,
                    fitness: 42.0,
                },
            ),
        ];
        let report = evaluate_genomes(&mut genomes, &short_config(), &mut NoopObserver).unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(genomes[0].1.fitness, report.outcomes[0].fitness);
        assert!(genomes[0].1.fitness >= 25.0 * 0.1 - 1e-3);
        assert_eq!(
            report.outcomes[0].reason,
            Some(TerminationReason::TickLimit)
        );

        assert_eq!(genomes[1].1.fitness, 0.0);
        assert_eq!(
            report.outcomes[1].reason,
            Some(TerminationReason::ControllerFault)
        );
    }

    #[test]
    fn empty_population_is_an_error() {
        let mut genomes: Vec<(GenomeId, FixedGenome)> = Vec::new();
        let result = evaluate_genomes(&mut genomes, &short_config(), &mut NoopObserver);
        assert!(matches!(result, Err(SimError::EmptyPopulation)));
    }

    #[test]
    fn invalid_config_leaves_genomes_untouched_by_simulation() {
        let mut genomes = vec![(
            1,
            FixedGenome {
                output: Some(vec![0.0; 6]),
                fitness: 3.0,
            },
        )];
        let config = SimConfig {
            max_ticks: 0,
            ..SimConfig::default()
        };
        let result = evaluate_genomes(&mut genomes, &config, &mut NoopObserver);
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
        assert_eq!(genomes[0].1.fitness, 0.0);
    }
}
