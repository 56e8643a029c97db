// demos/async_integration.rs
//! Driving runtimes from async code without blocking the executor
//!
//! Run with: cargo run --example async_integration --features tokio

use std::time::Duration;
use worklet_runtime::{
    run_on_runtime_awaitable, Closure, RuntimeHandle, RuntimeManager, Scope, Thrown, Value, Worklet,
};

// Simulated slow scoring inside a runtime
fn score(scope: &mut Scope<'_>, closure: &Closure, _: &[Value]) -> Result<Value, Thrown> {
    std::thread::sleep(Duration::from_millis(5));

    let amount = closure.get("amount").as_float();
    let seen = scope.global("seen").as_int() + 1;
    scope.set_global("seen", seen);

    Ok(Value::object([
        ("runtime", Value::from(scope.runtime_name())),
        ("score", Value::Float((amount / 1000.0).min(1.0))),
        ("seen", Value::Int(seen)),
    ]))
}

async fn score_on(
    runtime: &RuntimeHandle,
    amount: f64,
) -> Result<Value, Box<dyn std::error::Error>> {
    let job = Worklet::new("score", score).capture("amount", amount);
    let snapshot = run_on_runtime_awaitable(runtime, &job)?.await?;
    Ok(snapshot.unpack())
}

#[tokio::main]
async fn main() {
    println!("=== Worklet Runtime - Async Integration ===\n");

    let manager = RuntimeManager::new();
    let workers: Vec<_> = (0..2)
        .map(|i| {
            manager
                .create_runtime(format!("scorer-{}", i), None)
                .expect("Failed to create runtime")
        })
        .collect();

    // Both runtimes work concurrently while the executor stays free
    let amounts = [120.0, 980.0, 4500.0, 15.0];
    let mut tasks = Vec::new();
    for (i, amount) in amounts.into_iter().enumerate() {
        let runtime = workers[i % workers.len()].clone();
        tasks.push(tokio::spawn(async move {
            // The worklet is not `Send`; only its snapshot crosses the await
            let pending = {
                let job = Worklet::new("score", score).capture("amount", amount);
                run_on_runtime_awaitable(&runtime, &job)
            };
            (amount, match pending {
                Ok(fut) => fut.await.map(|s| s.node_count()),
                Err(e) => Err(e),
            })
        }));
    }

    let ticker = tokio::spawn(async {
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            println!("  [executor] still responsive");
        }
    });

    for task in tasks {
        match task.await {
            Ok((amount, Ok(nodes))) => {
                println!("  amount {:>7.1}: result with {} node(s)", amount, nodes)
            }
            Ok((amount, Err(e))) => println!("  amount {:>7.1}: {}", amount, e),
            Err(e) => println!("  task failed: {}", e),
        }
    }
    let _ = ticker.await;

    // Unpacking happens back on the calling thread
    match score_on(&workers[0], 640.0).await {
        Ok(result) => println!(
            "\n{} scored {:.2} (call #{})",
            result.get("runtime").as_string(),
            result.get("score").as_float(),
            result.get("seen").as_int()
        ),
        Err(e) => println!("\nscoring failed: {}", e),
    }
}
