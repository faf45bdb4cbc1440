mod error;
mod utils;
mod logger;
mod linalg;
mod object;
mod valuations;
mod buyer;
mod arrival;
mod features;
mod simulationrun;
mod converge;
mod stats;
mod experiments;
mod charts;
mod scenarios;

use logger::{Logger, LogEvent, ConsoleReceiver, FileReceiver, sanitize_filename};
use simulationrun::BID_CSV_HEADER;
use std::path::PathBuf;

use scenarios::get_scenario_catalog;
use utils::{RAND_SEED, TOTAL_AUCTION_RUNS, VERBOSE_BIDS};
use std::sync::atomic::Ordering;

fn usage() {
    eprintln!("Usage: proxybid <scenario|all> [iterations] [start_seed] [--fastbreak] [--verbose bids]");
    eprintln!("       proxybid charts");
}

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();

    // Parse and filter out --verbose and --fastbreak arguments
    let mut args = Vec::new();
    let mut skip_next = false;
    let mut fastbreak = false;
    for (i, arg) in raw_args.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--verbose" {
            if i + 1 < raw_args.len() && raw_args[i + 1] == "bids" {
                VERBOSE_BIDS.store(true, Ordering::Relaxed);
                skip_next = true;
            }
            continue;
        }
        if arg == "--fastbreak" {
            fastbreak = true;
            continue;
        }
        args.push(arg.clone());
    }

    // Check if "charts" argument is provided
    if args.len() > 1 && args[1] == "charts" {
        match charts::generate_all_charts() {
            Ok(()) => {
                println!("All chart generation completed successfully.");
            }
            Err(e) => {
                eprintln!("Error generating charts: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if args.len() > 1 {
        let scenario_arg = &args[1];

        // Parse iterations parameter if present
        let iterations = if args.len() > 2 {
            match args[2].parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    eprintln!("Error: Invalid iterations parameter '{}'. Expected a positive number.", args[2]);
                    usage();
                    std::process::exit(1);
                }
            }
        } else {
            1
        };

        // Parse optional starting seed if present
        let start_iteration = if args.len() > 3 {
            match args[3].parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("Error: Invalid start seed parameter '{}'. Expected a number.", args[3]);
                    usage();
                    std::process::exit(1);
                }
            }
        } else {
            0
        };

        let all_scenarios = get_scenario_catalog();

        // Filter scenarios: if "all", use all scenarios; otherwise filter to the named scenario
        let scenarios: Vec<_> = if scenario_arg == "all" {
            all_scenarios.clone()
        } else {
            match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
                Some(scenario) => vec![scenario.clone()],
                None => {
                    eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                    eprintln!("Available scenarios:");
                    for s in &all_scenarios {
                        eprintln!("  - {}", s.short_name);
                    }
                    std::process::exit(1);
                }
            }
        };

        // Scenario details go to the console only for a single named scenario run once
        let mut logger = Logger::new();
        if scenario_arg != "all" && iterations == 1 {
            logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Scenario]));
        } else {
            logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
        }

        let summary_receiver_id = match FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation]) {
            Ok(receiver) => logger.add_receiver(receiver),
            Err(e) => {
                eprintln!("Error: cannot open log/summary.log: {}", e);
                std::process::exit(1);
            }
        };

        TOTAL_AUCTION_RUNS.store(0, Ordering::Relaxed);

        if scenario_arg == "all" {
            if iterations > 1 {
                logln!(&mut logger, LogEvent::Validation, "Running all scenarios {} times...\n", iterations);
            } else {
                logln!(&mut logger, LogEvent::Validation, "Running all scenarios...\n");
            }
        } else if iterations > 1 {
            logln!(&mut logger, LogEvent::Validation, "Running scenario '{}' {} times...\n", scenario_arg, iterations);
        } else {
            logln!(&mut logger, LogEvent::Validation, "Running scenario '{}'...\n", scenario_arg);
        }

        // Outer loop for scenarios
        'scenarios: for scenario in &scenarios {
            log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

            let scenario_dir = format!("log/{}", sanitize_filename(scenario.short_name));
            let mut receiver_ids = Vec::new();
            match FileReceiver::new(&PathBuf::from(format!("{}/scenario.log", scenario_dir)), vec![LogEvent::Scenario]) {
                Ok(receiver) => receiver_ids.push(logger.add_receiver(receiver)),
                Err(e) => eprintln!("Warning: cannot open scenario log in {}: {}", scenario_dir, e),
            }
            if VERBOSE_BIDS.load(Ordering::Relaxed) {
                match FileReceiver::new(&PathBuf::from(format!("{}/bids.csv", scenario_dir)), vec![LogEvent::Bid]) {
                    Ok(receiver) => {
                        receiver_ids.push(logger.add_receiver(receiver));
                        logln!(&mut logger, LogEvent::Bid, "{}", BID_CSV_HEADER);
                    }
                    Err(e) => eprintln!("Warning: cannot open bid log in {}: {}", scenario_dir, e),
                }
            }

            // Inner loop for iterations
            for i in start_iteration..(start_iteration + iterations) {
                if iterations > 1 {
                    let iteration_num = i - start_iteration + 1;
                    log!(&mut logger, LogEvent::Validation, "[{}/{}] ", iteration_num, iterations);
                }

                // Set RAND_SEED to iteration number
                RAND_SEED.store(i, Ordering::Relaxed);

                match (scenario.run)(scenario.short_name, &mut logger) {
                    Ok(()) => {
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✓");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                        }
                    }
                    Err(e) => {
                        if iterations > 1 {
                            logln!(&mut logger, LogEvent::Validation, "✗");
                        } else {
                            logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                        }

                        if fastbreak {
                            for id in &receiver_ids {
                                logger.remove_receiver(*id);
                            }
                            logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                            if iterations > 1 {
                                let iteration_num = i - start_iteration + 1;
                                logln!(&mut logger, LogEvent::Validation, "Error at iteration {}/{} (seed {}): {}", iteration_num, iterations, i, e);
                            } else {
                                logln!(&mut logger, LogEvent::Validation, "Error: {}", e);
                            }
                            break 'scenarios;
                        }
                    }
                }

                // Flush to ensure validation is written to summary.log
                let _ = logger.flush();
            }

            for id in receiver_ids {
                logger.remove_receiver(id);
            }
        }

        let final_count = TOTAL_AUCTION_RUNS.load(Ordering::Relaxed);
        logln!(&mut logger, LogEvent::Validation, "\nTotal auction runs completed: {}", final_count);

        logger.remove_receiver(summary_receiver_id);
    } else {
        // Default behavior: run the convergence scenario with its details on the console
        let mut logger = Logger::new();
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Scenario, LogEvent::Validation]));
        if let Err(e) = scenarios::convergence::run("convergence", &mut logger) {
            eprintln!("Error running scenario: {}", e);
            std::process::exit(1);
        }
    }
}
