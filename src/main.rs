//! Httpcap CLI

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use httpcap::{
    RequestMetadata, ResponseMetadata, StoreConfig, TransactionRecord, TransactionState,
    TransactionStore,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Producer threads spawned by `simulate`
const PRODUCERS: usize = 8;

/// Requests issued per producer
const REQUESTS_PER_PRODUCER: usize = 64;

/// Entries printed at the end of `simulate`
const TAIL_LEN: usize = 10;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Httpcap v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: httpcap <command> [options]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  simulate [config]      Run concurrent producers against one store");
        eprintln!("  check-config <path>    Validate a store configuration file");
        process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "simulate" => {
            let config = match args.get(2) {
                Some(path) => load_config(Path::new(path)),
                None => StoreConfig::default(),
            };
            simulate(&config);
        }
        "check-config" => {
            if args.len() < 3 {
                eprintln!("Usage: httpcap check-config <path>");
                process::exit(1);
            }

            let config = load_config(Path::new(&args[2]));
            println!("Configuration OK");
            println!("  capacity:      {}", config.capacity);
            println!("  max_body_size: {}", config.max_body_size);
            println!("  ignored_urls:  {:?}", config.ignored_urls);
            println!("  only_urls:     {:?}", config.only_urls);
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'httpcap' for usage information.");
            process::exit(1);
        }
    }
}

fn load_config(path: &Path) -> StoreConfig {
    match StoreConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn simulate(config: &StoreConfig) {
    let store = match TransactionStore::from_config(config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    info!(
        "Simulating {} producers x {} requests (capacity: {})",
        PRODUCERS, REQUESTS_PER_PRODUCER, config.capacity
    );

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let store = Arc::clone(&store);
            thread::spawn(move || run_producer(&store, producer))
        })
        .collect();

    let observer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let mut max_seen = 0;
            for _ in 0..20 {
                max_seen = max_seen.max(store.snapshot().len());
                thread::sleep(Duration::from_millis(1));
            }
            max_seen
        })
    };

    for handle in producers {
        if handle.join().is_err() {
            warn!("Producer thread panicked");
        }
    }
    let max_seen = observer.join().unwrap_or_default();

    let stats = store.stats();
    println!("Stored:    {}", store.count());
    println!("Pending:   {}", store.pending_count());
    println!("Admitted:  {}", stats.admitted);
    println!("Filtered:  {}", stats.filtered);
    println!("Evicted:   {}", stats.evicted);
    println!("Completed: {}", stats.completed);
    println!("Failed:    {}", stats.failed);
    println!("Largest snapshot observed during run: {max_seen}");
    println!();

    let snapshot = store.snapshot();
    for record in snapshot.iter().skip(snapshot.len().saturating_sub(TAIL_LEN)) {
        let request = record.request();
        let outcome = match (record.state(), record.response()) {
            (TransactionState::Completed, Some(response)) => response
                .status
                .map_or_else(|| "-".to_string(), |status| status.to_string()),
            (TransactionState::Failed, _) => "failed".to_string(),
            _ => "pending".to_string(),
        };
        println!(
            "{} {:<6} {:<48} {}",
            record.id().short(),
            request.method,
            request.url,
            outcome
        );
    }
}

fn run_producer(store: &TransactionStore, producer: usize) {
    for i in 0..REQUESTS_PER_PRODUCER {
        let method = if i % 3 == 0 { "POST" } else { "GET" };
        let request = RequestMetadata::new(
            method,
            format!("https://api.example.com/v1/producer/{producer}/items/{i}"),
        )
        .with_header("Accept", "application/json");

        let record = TransactionRecord::new(request);
        let id = record.id();
        if !store.admit(record) {
            continue;
        }

        // Leave every seventh request pending
        if i % 7 == 6 {
            continue;
        }

        let response = if i % 11 == 10 {
            ResponseMetadata::failed("connection reset by peer")
        } else {
            ResponseMetadata::completed(200)
                .with_header("Content-Type", "application/json")
                .with_body(format!("{{\"item\":{i}}}"))
        };
        store.update(id, response);
    }
}
