//! Basic circuit breaker usage example

use circuit_gate::CircuitBreaker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static GATEWAY_DOWN: AtomicBool = AtomicBool::new(false);

async fn charge(order: u32) -> Result<String, std::io::Error> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if GATEWAY_DOWN.load(Ordering::SeqCst) {
        Err(std::io::Error::other(format!("gateway refused order {order}")))
    } else {
        Ok(format!("order {order} charged"))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Circuit Breaker Basic Example ===\n");

    let payments = CircuitBreaker::builder("payment_api")
        .failure_threshold(3)
        .recovery_timeout(Duration::from_secs(1))
        .expect_error::<std::io::Error>()
        .on_open(|name| println!("🔴 Circuit '{name}' opened!"))
        .on_close(|name| println!("🟢 Circuit '{name}' closed!"))
        .on_half_open(|name| println!("🟡 Circuit '{name}' half-open, testing..."))
        .wrap(charge)
        .with_fallback(|order: u32| async move {
            Ok::<_, std::io::Error>(format!("order {order} queued for later"))
        });
    let breaker = payments.breaker();

    println!("Initial state: {}\n", breaker.state());

    println!("--- Successful calls ---");
    for order in 1..=2 {
        match payments.call(order).await {
            Ok(receipt) => println!("✓ {receipt}"),
            Err(e) => println!("✗ {e}"),
        }
    }
    println!("State: {}\n", breaker.state());

    println!("--- Triggering failures ---");
    GATEWAY_DOWN.store(true, Ordering::SeqCst);
    for order in 3..=5 {
        match payments.call(order).await {
            Ok(receipt) => println!("✓ {receipt}"),
            Err(e) => println!("✗ {e}"),
        }
    }
    println!("State: {} (circuit opened)\n", breaker.state());

    println!("--- Calls while open use the fallback ---");
    match payments.call(6).await {
        Ok(receipt) => println!("✓ {receipt}"),
        Err(e) => println!("✗ {e}"),
    }
    println!();

    println!("--- Waiting for the recovery timeout ---");
    GATEWAY_DOWN.store(false, Ordering::SeqCst);
    tokio::time::sleep(breaker.open_remaining()).await;
    println!("State: {}\n", breaker.state());

    match payments.call(7).await {
        Ok(receipt) => println!("✓ {receipt}"),
        Err(e) => println!("✗ {e}"),
    }
    println!("State: {}", breaker.state());
}
