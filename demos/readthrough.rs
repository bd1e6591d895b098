//! Read-through caching demo.
//!
//! Wraps a slow "forecast fetch" with a cache guard backed by a TTL'd
//! in-memory store. Run with:
//!
//! ```text
//! cargo run --example readthrough
//! ```
//!
//! The first call pays the 300ms fetch; repeats within the TTL are served
//! from the store in microseconds. Set `RUST_LOG=debug` to see the guard's
//! hit/miss events.

use std::thread;
use std::time::{Duration, Instant};

use recache::{CacheGuard, KeyDeriver, MemoryStore};
use tracing_subscriber::EnvFilter;

/// Stands in for an expensive upstream call.
fn fetch_forecast(city: &str) -> Result<Option<String>, std::io::Error> {
    thread::sleep(Duration::from_millis(300));
    Ok(Some(format!("{city}: 18C, light rain")))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let guard = CacheGuard::new(MemoryStore::with_ttl(Duration::from_secs(2)));
    let city = "amsterdam";

    for attempt in 1..=3u32 {
        let key = KeyDeriver::new("weather.forecast")?.arg(&city)?.finish();
        let start = Instant::now();
        let forecast = guard.execute(&key, || fetch_forecast(city))?;
        println!(
            "attempt {attempt}: {} ({:?})",
            forecast.as_deref().unwrap_or("no forecast"),
            start.elapsed()
        );
    }

    println!("waiting for the entry to expire...");
    thread::sleep(Duration::from_secs(2));

    let key = KeyDeriver::new("weather.forecast")?.arg(&city)?.finish();
    let start = Instant::now();
    let forecast = guard.execute(&key, || fetch_forecast(city))?;
    println!(
        "after expiry: {} ({:?})",
        forecast.as_deref().unwrap_or("no forecast"),
        start.elapsed()
    );

    Ok(())
}
