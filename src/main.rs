extern crate log;
extern crate pretty_env_logger;

use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{arg, command, value_parser, ArgMatches, Command};
use log::info;
use rayon::prelude::*;

use omr_checker::answer_key::{AnswerKeyDirectory, AnswerKeyStore};
use omr_checker::results_log::{ResultsLog, ResultsLogEntry};
use omr_checker::types::AnswerKeyId;
use omr_checker::{evaluate_sheet_file, extract_answer_key_file, letter_grade, OmrConfig};

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    let code = match matches.subcommand() {
        Some(("evaluate", sub_matches)) => evaluate(sub_matches),
        Some(("keys", sub_matches)) => list_keys(sub_matches),
        Some(("extract-key", sub_matches)) => extract_key(sub_matches),
        _ => unreachable!("clap requires a subcommand"),
    };
    exit(code);
}

fn load_config(matches: &ArgMatches) -> OmrConfig {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => match OmrConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                exit(1);
            }
        },
        None => OmrConfig::default(),
    }
}

fn load_key_store(matches: &ArgMatches) -> AnswerKeyDirectory {
    let keys_dir = matches
        .get_one::<PathBuf>("keys")
        .map(PathBuf::as_path)
        .unwrap_or_else(|| Path::new("answer_keys"));
    match AnswerKeyDirectory::open(keys_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening answer keys: {}", e);
            exit(1);
        }
    }
}

fn evaluate(matches: &ArgMatches) -> i32 {
    let config = load_config(matches);
    let store = load_key_store(matches);
    let debug = matches.get_flag("debug");
    let Some(key_id) = matches.get_one::<String>("key").map(AnswerKeyId::new) else {
        eprintln!("Error: an answer key identifier is required");
        return 1;
    };

    let answer_key = match store.load_key(&key_id) {
        Ok(answer_key) => answer_key,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let results_log = match matches.get_one::<PathBuf>("results_log") {
        Some(path) => match ResultsLog::open(path) {
            Ok(log) => Some(log),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => None,
    };

    let images: Vec<&PathBuf> = matches
        .get_many::<PathBuf>("images")
        .map(|images| images.collect())
        .unwrap_or_default();

    // one independent evaluation per sheet
    let outcomes: Vec<_> = images
        .par_iter()
        .map(|path| {
            let outcome = evaluate_sheet_file(path, &answer_key, &config, debug);
            if let (Ok(result), Some(log)) = (&outcome, &results_log) {
                let entry = ResultsLogEntry {
                    sheet: path.display().to_string(),
                    answer_key: key_id.clone(),
                    result: result.clone(),
                };
                if let Err(e) = log.append(&entry) {
                    eprintln!("Warning: {}", e);
                }
            }
            (path, outcome)
        })
        .collect();

    let mut failures = 0;
    for (path, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                info!(
                    "{}: score {}/{} ({}%, grade {})",
                    path.display(),
                    result.score,
                    result.total,
                    result.percentage,
                    letter_grade(result.percentage)
                );
                match serde_json::to_string_pretty(&result) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing result for {}: {}", path.display(), e);
                        failures += 1;
                    }
                }
            }
            Err(e) => {
                eprintln!("Error processing {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        1
    } else {
        0
    }
}

fn list_keys(matches: &ArgMatches) -> i32 {
    let store = load_key_store(matches);
    match store.list_keys() {
        Ok(keys) => {
            for key in keys {
                println!("{}", key);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn extract_key(matches: &ArgMatches) -> i32 {
    let config = load_config(matches);
    let debug = matches.get_flag("debug");
    let Some(image) = matches.get_one::<PathBuf>("image") else {
        eprintln!("Error: reference sheet image path is required");
        return 1;
    };

    let answer_key = match extract_answer_key_file(image, &config, debug) {
        Ok(answer_key) => answer_key,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match serde_json::to_string_pretty(&answer_key) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cli() -> Command {
    command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("evaluate")
                .about("Score bubble sheet images against an answer key")
                .arg(
                    arg!(-k --keys <DIR> "Directory of <id>.json answer keys")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(arg!(--key <ID> "Answer key identifier").default_value("exam1"))
                .arg(
                    arg!(-c --config <PATH> "Path to config.json with detection thresholds")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"results-log" <PATH> "Append each result to this JSON-lines file")
                        .id("results_log")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(arg!(-d --debug "Write debug images next to each input"))
                .arg(
                    arg!(images: <IMAGE> ... "Bubble sheet images")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("keys").about("List answer key identifiers").arg(
                arg!(-k --keys <DIR> "Directory of <id>.json answer keys")
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
        .subcommand(
            Command::new("extract-key")
                .about("Read an answer key from a filled-in reference sheet")
                .arg(
                    arg!(-c --config <PATH> "Path to config.json with detection thresholds")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(arg!(-d --debug "Write debug images next to the input"))
                .arg(
                    arg!(image: <IMAGE> "Reference sheet image")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}
