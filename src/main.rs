// Demo simulation binary - drives the DBA engine with random traffic
//
// The binary rebuilds the reference scenario: 8 ONUs with per-class traffic
// proportions, 4 redistribution groups of 2 ONUs each, and random arrivals
// generated per cycle. The traffic generator lives entirely here; the engine
// itself only ever sees bursts staged through the arrival channel.

use crossbeam_channel::Sender;
use pon_dba::{Arrival, ClassTable, CycleDriver, DbaEngine, Group, Onu, TrafficClass};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Command-line options parsed from program arguments.
struct CliOptions {
    /// Number of cycles to simulate.
    cycles: u64,
    /// Seed for the traffic generator, random when absent.
    seed: Option<u64>,
}

/// Parse command-line arguments into `CliOptions`.
///
/// Supports `--cycles=<n>` / `--cycles <n>` and `--seed=<n>` / `--seed <n>`.
fn parse_cli_options() -> CliOptions {
    let mut cycles = 10u64;
    let mut seed = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some((key, value)) = arg.split_once('=') {
            match key {
                "--cycles" => {
                    if let Ok(n) = value.parse() {
                        cycles = n;
                    }
                }
                "--seed" => seed = value.parse().ok(),
                _ => {}
            }
        } else if arg == "--cycles" {
            if let Some(value) = args.next() {
                if let Ok(n) = value.parse() {
                    cycles = n;
                }
            }
        } else if arg == "--seed" {
            if let Some(value) = args.next() {
                seed = value.parse().ok();
            }
        }
    }
    CliOptions { cycles, seed }
}

/// Per-class proportions for a terminal, in T-CONT 1..4 order.
fn shares(p1: f64, p2: f64, p3: f64, p4: f64) -> ClassTable<f64> {
    let mut table = ClassTable::default();
    table[TrafficClass::Guaranteed] = p1;
    table[TrafficClass::Assured] = p2;
    table[TrafficClass::NonAssured] = p3;
    table[TrafficClass::BestEffort] = p4;
    table
}

/// Build the 8-ONU reference topology: capacity 1.244 Gbit/s, history window
/// of 10 cycles, mostly assured-heavy traffic mixes.
fn build_onus() -> Vec<Onu> {
    const CAPACITY: f64 = 1.244e9;
    const WINDOW: usize = 10;
    vec![
        Onu::new("ONU1", CAPACITY, WINDOW, shares(0.0, 0.6, 0.2, 0.2)),
        Onu::new("ONU2", CAPACITY, WINDOW, shares(0.0, 0.8, 0.0, 0.2)),
        Onu::new("ONU3", CAPACITY, WINDOW, shares(0.2, 0.4, 0.2, 0.2)),
        Onu::new("ONU4", CAPACITY, WINDOW, shares(0.0, 0.6, 0.2, 0.2)),
        Onu::new("ONU5", CAPACITY, WINDOW, shares(0.0, 0.7, 0.2, 0.1)),
        Onu::new("ONU6", CAPACITY, WINDOW, shares(0.4, 0.6, 0.0, 0.0)),
        Onu::new("ONU7", CAPACITY, WINDOW, shares(0.0, 0.6, 0.4, 0.0)),
        Onu::new("ONU8", CAPACITY, WINDOW, shares(0.0, 0.8, 0.2, 0.0)),
    ]
}

/// Generate one cycle of random arrivals for every terminal.
///
/// Mirrors the reference stimulus: up to 10 bursts per terminal, distributed
/// across classes according to the terminal's configured proportions, with
/// the integer remainder spread randomly over the predictive classes.
fn generate_traffic(rng: &mut StdRng, driver: &CycleDriver, sender: &Sender<Arrival>) {
    for onu in driver.engine().onus() {
        let total_bursts: u32 = rng.gen_range(0..=10);
        let share = onu.class_share();
        let total_share: f64 = TrafficClass::ALL.iter().map(|&c| share[c]).sum();
        if total_share <= 0.0 {
            continue;
        }

        let mut counts = ClassTable::from_fn(|class| {
            (total_bursts as f64 * share[class] / total_share) as u32
        });
        let assigned: u32 = TrafficClass::ALL.iter().map(|&c| counts[c]).sum();
        for _ in assigned..total_bursts {
            let class = TrafficClass::PREDICTIVE[rng.gen_range(0..TrafficClass::PREDICTIVE.len())];
            counts[class] += 1;
        }

        for class in TrafficClass::ALL {
            for _ in 0..counts[class] {
                let size = rng.gen_range(1..=(onu.capacity() * 10.0) as u64) as f64 / 1000.0;
                let _ = sender.send(Arrival {
                    onu_id: onu.id().to_string(),
                    class,
                    size,
                });
            }
        }
    }
}

/// Main entry point for the demo binary.
///
/// Builds the topology, runs the requested number of cycles with random
/// stimulus, prints each cycle's per-terminal grants, and finishes with the
/// derived per-terminal metrics.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let options = parse_cli_options();

    let groups = vec![
        Group::new(vec!["ONU1".into(), "ONU2".into()]),
        Group::new(vec!["ONU3".into(), "ONU4".into()]),
        Group::new(vec!["ONU5".into(), "ONU6".into()]),
        Group::new(vec!["ONU7".into(), "ONU8".into()]),
    ];
    let engine = DbaEngine::new(build_onus(), groups)?;
    let mut driver = CycleDriver::new(engine);
    let sender = driver.arrival_sender();

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("Simulation for traffic proportions 60% T-CONT 2, 20% T-CONT 3, 20% T-CONT 4\n");
    for _ in 0..options.cycles {
        generate_traffic(&mut rng, &driver, &sender);
        let record = driver.step()?;

        println!("Cycle {} allocations:", record.cycle);
        let mut ids: Vec<&String> = record.allocation.iter().map(|(id, _)| id).collect();
        ids.sort();
        for id in ids {
            let ft = |class: TrafficClass| record.allocation.grant(id, class);
            println!(
                "ONU {id}: FT1: {:.2}, FT2: {:.2}, FT3: {:.2}, FT4: {:.2}",
                ft(TrafficClass::Guaranteed),
                ft(TrafficClass::Assured),
                ft(TrafficClass::NonAssured),
                ft(TrafficClass::BestEffort),
            );
        }
        println!();
    }

    println!("Per-terminal metrics:");
    for metrics in driver.metrics() {
        println!(
            "ONU {}: avg latency {:.2} cycles, peak allocated {:.2}, bursts transmitted {}",
            metrics.onu_id,
            metrics.avg_latency_cycles,
            metrics.peak_allocated,
            metrics.bursts_transmitted
        );
    }

    Ok(())
}
