extern crate clap;
extern crate photoprod;
extern crate rand;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches, SubCommand};
use photoprod::lund::LundWriter;
use photoprod::run_card::RunCard;
use photoprod::{
    EventOrchestrator, FnIntensity, GeneratorError, IntensityOracle, KinematicEvent, PhaseSpaceSampler,
    ReactionTopology, TSlopeIntensity,
};
use rand::prelude::*;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Print a single phase-space event.
fn inspect(mut sampler: PhaseSpaceSampler, card: &RunCard) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(card.seed);
    let event = sampler.generate(&mut rng)?;

    print!("{}", event);
    println!("W={} Q2={} -t={}", event.recoil_mass(), event.q2(), event.minus_t());
    println!("{}", serde_yaml::to_string(&event)?);
    Ok(())
}

fn run<O: IntensityOracle>(
    sampler: PhaseSpaceSampler,
    oracle: O,
    card: &RunCard,
    matches: &ArgMatches,
) -> Result<()> {
    let pids = sampler.topology().final_state_pdgs();
    let mut orchestrator = EventOrchestrator::new(sampler, oracle, card.generation_settings(), card.seed)?;
    if card.t_weight {
        orchestrator.enable_reweighting();
    }

    if matches.subcommand_matches("efficiency").is_some() {
        let efficiency = orchestrator.estimate_efficiency(card.n_events)?;
        println!("Efficiency={}", efficiency);
        return Ok(());
    }

    let now = Instant::now();
    let events = orchestrator.generate(card.n_events)?;
    info!(accepted = events.len(), elapsed = ?now.elapsed(), "Generation done");

    let mut writer = LundWriter::create(&card.output)
        .with_context(|| format!("Could not create output file {}", card.output))?;
    let vertices = vec![[0.; 3]; pids.len()];
    for event in events {
        match writer.write_event(&event.final_state(), event.weight(), &vertices, Some(pids.as_slice()), None) {
            Ok(()) => {}
            Err(GeneratorError::Consistency(e)) => warn!("Skipping event: {}", e),
            Err(e) => return Err(e.into()),
        }
    }
    writer.flush()?;
    info!(events = writer.n_events(), output = %card.output, "Events written");

    Ok(())
}

fn main() -> Result<()> {
    let matches = App::new("Quasi-real photoproduction event generator")
        .version("0.1")
        .about("Generate electroproduction events at small lepton angles")
        .arg(
            Arg::with_name("card")
                .value_name("RUNCARD")
                .help("YAML run card; built-in defaults if absent")
                .index(1),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Specify the random seed"),
        )
        .arg(
            Arg::with_name("events")
                .short("n")
                .long("events")
                .value_name("NEVENTS")
                .help("Number of events to generate"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FILE")
                .help("Output LUND file"),
        )
        .arg(
            Arg::with_name("tweight")
                .long("tweight")
                .help("Reweight the phase space with the intensity-weighted -t distribution"),
        )
        .subcommand(SubCommand::with_name("efficiency").about("Only estimate the efficiency"))
        .subcommand(SubCommand::with_name("inspect").about("Print a single phase-space event"))
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("photoprod=info".parse()?))
        .init();

    let mut card = match matches.value_of("card") {
        Some(path) => RunCard::from_file(path).with_context(|| format!("Could not read run card {}", path))?,
        None => RunCard::default(),
    };

    if let Some(x) = matches.value_of("seed") {
        card.seed = u64::from_str(x).context("Invalid seed")?;
    }

    if let Some(x) = matches.value_of("events") {
        card.n_events = usize::from_str(x).context("Invalid number of events")?;
    }

    if let Some(x) = matches.value_of("output") {
        card.output = x.to_owned();
    }

    if matches.is_present("tweight") {
        card.t_weight = true;
    }

    let topology = ReactionTopology::new(&card.target, &card.final_state)?;
    let sampler = PhaseSpaceSampler::new(topology, card.sampler_settings())?;

    if matches.subcommand_matches("inspect").is_some() {
        return inspect(sampler, &card);
    }

    match card.t_slope {
        Some(slope) => run(sampler, TSlopeIntensity::new(slope), &card, &matches),
        None => run(sampler, FnIntensity::new(|_: &KinematicEvent| 1.), &card, &matches),
    }
}
