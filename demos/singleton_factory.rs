//! Usage example for singleton-factory.
//!
//! Demonstrates:
//! - Lazy construction on the first `get_instance` call
//! - Arguments of later calls being ignored
//! - Failed construction leaving the type uninitialized
//! - Resetting one singleton without touching another
//! - Watching factory events with a trace callback
//!
//! Run with: `cargo run --example singleton_factory`

use singleton_factory::{set_trace_callback, Singleton};
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug)]
struct AppConfig {
    name: String,
    workers: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("an application needs at least one worker")]
struct NoWorkers;

impl Singleton for AppConfig {
    type Args = (&'static str, usize);
    type Error = NoWorkers;

    fn construct((name, workers): (&'static str, usize)) -> Result<Self, NoWorkers> {
        if workers == 0 {
            return Err(NoWorkers);
        }
        Ok(AppConfig {
            name: name.to_string(),
            workers,
        })
    }
}

struct Logger;

impl Singleton for Logger {
    type Args = ();
    type Error = Infallible;

    fn construct(_: ()) -> Result<Self, Infallible> {
        Ok(Logger)
    }
}

fn main() {
    println!("=== singleton-factory ===\n");

    set_trace_callback(|event| println!("   [trace] {event}"));

    // -------------------------------------------------------------------------
    // 1. A failing constructor records nothing
    // -------------------------------------------------------------------------
    println!("1. Constructing with invalid arguments...");

    match AppConfig::get_instance(("demo", 0)) {
        Ok(_) => println!("   Unexpectedly constructed"),
        Err(e) => println!("   Error: {e}"),
    }
    println!(
        "   Initialized: {}",
        AppConfig::is_initialized().unwrap_or(false)
    );

    // -------------------------------------------------------------------------
    // 2. First successful call wins
    // -------------------------------------------------------------------------
    println!("\n2. Constructing with valid arguments...");

    let Ok(config) = AppConfig::get_instance(("demo", 4)) else {
        return;
    };
    println!("   {} with {} workers", config.name, config.workers);

    println!("\n3. Requesting again with different arguments...");

    if let Ok(again) = AppConfig::get_instance(("other", 16)) {
        println!("   Same instance: {}", Arc::ptr_eq(&config, &again));
        println!("   Workers still: {}", again.workers);
    }

    // -------------------------------------------------------------------------
    // 4. Reset one type only
    // -------------------------------------------------------------------------
    println!("\n4. Resetting AppConfig...");

    let _ = Logger::get_instance(());
    let _ = AppConfig::reset_instance();
    println!(
        "   AppConfig initialized: {}",
        AppConfig::is_initialized().unwrap_or(false)
    );
    println!(
        "   Logger initialized: {}",
        Logger::is_initialized().unwrap_or(false)
    );
    println!("   Old handle still valid: {}", config.name);

    println!("\n=== Example Finished ===");
}
