//! Interactive front-end over the engine. One line, one command:
//! queries print their matches and how long the engine took, plain
//! words are added (or brought back) on the spot. The `generate`
//! subcommand writes a synthetic corpus instead of starting the loop.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use lexitree::engine::{AddOutcome, Engine};
use lexitree::query::{Query, QueryOptions, QueryResult};

#[derive(Parser)]
#[command(name = "lexitree", about = "In-memory word dictionary with layered lookup indices")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the text log and answer commands from stdin.
    Repl {
        /// Path of the append-only text log.
        file: PathBuf,
    },
    /// Write a fresh text log of synthetic words.
    Generate {
        /// Path of the log to (over)write.
        file: PathBuf,
        /// How many distinct words to produce.
        count: usize,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    let outcome = match args.command {
        Command::Repl { file } => repl(&file),
        Command::Generate { file, count } => lexitree::generate::generate(&file, count),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("fatal: {}", error);
            ExitCode::FAILURE
        }
    }
}

fn repl(file: &PathBuf) -> lexitree::Result<()> {
    let mut engine = Engine::open(file)?;
    println!(
        "{} words loaded ({} active). Type a word to add it, or a command.",
        engine.len(),
        engine.active_len()
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }

        if let Err(error) = dispatch(&mut engine, trimmed) {
            println!("error: {}", error);
        }
        io::stdout().flush()?;
    }

    engine.shutdown()
}

fn dispatch(engine: &mut Engine, line: &str) -> lexitree::Result<()> {
    let mut tokens = line.split_whitespace();
    let head = tokens.next().unwrap_or_default();
    let rest: Vec<&str> = tokens.collect();

    match head {
        "exact" | "pre" | "suf" | "sub" | "not" => {
            let Some(value) = rest.first() else {
                println!("usage: {} WORD", head);
                return Ok(());
            };
            let value = value.as_bytes().to_vec();
            let query = match head {
                "exact" => Query::Exact(value),
                "pre" => Query::Prefix(value),
                "suf" => Query::Suffix(value),
                "sub" => Query::Substring(value),
                _ => Query::Not(value),
            };
            answer(engine, &query)
        }
        "sim" | "sim+" => {
            let Some(word) = rest.first() else {
                println!("usage: {} WORD [DISTANCE]", head);
                return Ok(());
            };
            let max_distance = match rest.get(1) {
                Some(raw) => match raw.parse() {
                    Ok(distance) => Some(distance),
                    Err(_) => {
                        println!("distance must be a number, got {:?}", raw);
                        return Ok(());
                    }
                },
                None => None,
            };
            answer(
                engine,
                &Query::Similarity {
                    word: word.as_bytes().to_vec(),
                    max_distance,
                    exhaustive: head == "sim+",
                },
            )
        }
        "and" | "or" => {
            if rest.is_empty() {
                println!("usage: {} WORD...", head);
                return Ok(());
            }
            let keywords = rest.iter().map(|word| word.as_bytes().to_vec()).collect();
            let query = if head == "and" {
                Query::And(keywords)
            } else {
                Query::Or(keywords)
            };
            answer(engine, &query)
        }
        "len" => {
            let Some(value) = rest.first() else {
                println!("usage: len N | len N-M");
                return Ok(());
            };
            let query = match parse_range(value) {
                Some((low, high)) if low == high => Query::Length(low),
                Some((low, high)) => Query::LengthRange(low, high),
                None => {
                    println!("could not read a length out of {:?}", value);
                    return Ok(());
                }
            };
            answer(engine, &query)
        }
        "id" => {
            let bounds = rest.first().and_then(|value| {
                let (low, high) = value.split_once('-')?;
                Some((low.parse().ok()?, high.parse().ok()?))
            });
            let Some((low, high)) = bounds else {
                println!("usage: id N-M");
                return Ok(());
            };
            answer(engine, &Query::IdRange(low, high))
        }
        "complex" => {
            if rest.is_empty() {
                println!("usage: complex kind:value...");
                return Ok(());
            }
            let terms = rest.iter().map(|term| term.to_string()).collect();
            answer(engine, &Query::Complex(terms))
        }
        "delete" | "undelete" => {
            let Some(id) = rest.first().and_then(|value| value.parse().ok()) else {
                println!("usage: {} ID", head);
                return Ok(());
            };
            let done = if head == "delete" {
                engine.delete(id)?
            } else {
                engine.undelete(id)?
            };
            if done {
                println!("{}d {}", head, id);
            } else {
                println!("nothing to {} for id {}", head, id);
            }
            Ok(())
        }
        "rebuild" => {
            engine.rebuild()?;
            println!("rebuilt: {} records, {} active", engine.len(), engine.active_len());
            Ok(())
        }
        "optimize" => {
            engine.optimize();
            Ok(())
        }
        "validate" => {
            let report = engine.validate();
            if report.is_clean() {
                println!("all indices consistent");
            } else {
                println!("{} mismatch(es): {:?}", report.total(), report);
            }
            Ok(())
        }
        "list" => {
            for record in engine.list(false) {
                println!("{}\t{}", record.id, String::from_utf8_lossy(&record.word));
            }
            Ok(())
        }
        "list-all" => {
            for record in engine.list(true) {
                println!(
                    "{}\t{}{}",
                    record.id,
                    String::from_utf8_lossy(&record.word),
                    if record.deleted { "\t[deleted]" } else { "" }
                );
            }
            Ok(())
        }
        "alpha" => {
            for record in engine.list_alphabetical() {
                println!("{}\t{}", String::from_utf8_lossy(&record.word), record.id);
            }
            Ok(())
        }
        // Anything else is one or more words to add or bring back.
        _ => {
            for word in std::iter::once(head).chain(rest.into_iter()) {
                match engine.add(word.as_bytes())? {
                    AddOutcome::Added(id) => println!("added {} as id {}", word, id),
                    AddOutcome::Restored(id) => println!("restored {} (id {})", word, id),
                    AddOutcome::AlreadyPresent(id) => {
                        println!("{} already present (id {})", word, id)
                    }
                }
            }
            Ok(())
        }
    }
}

/// `N` or `N-M`, both inclusive.
fn parse_range(value: &str) -> Option<(usize, usize)> {
    match value.split_once('-') {
        Some((low, high)) => Some((low.parse().ok()?, high.parse().ok()?)),
        None => {
            let single = value.parse().ok()?;
            Some((single, single))
        }
    }
}

fn answer(engine: &Engine, query: &Query) -> lexitree::Result<()> {
    let result = engine.query(query, &QueryOptions::default())?;
    print_result(engine, query, &result);
    Ok(())
}

fn print_result(engine: &Engine, query: &Query, result: &QueryResult) {
    let similarity = matches!(query, Query::Similarity { .. });

    for hit in result.matches.iter() {
        let word = engine
            .record(hit.id)
            .map(|record| String::from_utf8_lossy(&record.word).into_owned())
            .unwrap_or_default();

        if similarity {
            println!("{}\t{}\t(distance {})", hit.id, word, hit.distance);
        } else {
            println!("{}\t{}", hit.id, word);
        }
    }

    let mut notes = Vec::new();
    if result.out_of_range {
        notes.push("out of range");
    }
    if result.timed_out {
        notes.push("timed out");
    }
    let notes = if notes.is_empty() {
        String::new()
    } else {
        format!(" ({})", notes.join(", "))
    };

    println!(
        "{} hit(s) in {:.3} ms{}",
        result.matches.len(),
        result.elapsed.as_secs_f64() * 1000.0,
        notes
    );
}
