// demos/basic_usage.rs
//! Basic usage of the worklet runtime
//!
//! Run with: RUST_LOG=info cargo run --example basic_usage

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use worklet_runtime::{
    run_on_runtime_async, run_on_runtime_sync, Closure, DispatchError, RuntimeManager, Scope,
    Thrown, Value, Worklet,
};

// Runs once when the runtime is created
fn setup(scope: &mut Scope<'_>, closure: &Closure, _: &[Value]) -> Result<Value, Thrown> {
    scope.set_global("frames", 0);
    scope.set_global("fps", closure.get("fps"));
    scope.console().info(&[Value::from("animation runtime ready")]);
    Ok(Value::Undefined)
}

fn tick(scope: &mut Scope<'_>, closure: &Closure, _: &[Value]) -> Result<Value, Thrown> {
    let frames = scope.global("frames").as_int() + closure.get("count").as_int();
    scope.set_global("frames", frames);
    Ok(Value::Int(frames))
}

fn elapsed(scope: &mut Scope<'_>, _: &Closure, _: &[Value]) -> Result<Value, Thrown> {
    let seconds = scope.global("frames").as_float() / scope.global("fps").as_float();
    scope.console().log(&[Value::from("elapsed"), Value::Float(seconds)]);
    Ok(Value::object([
        ("runtime", Value::from(scope.runtime_name())),
        ("seconds", Value::Float(seconds)),
    ]))
}

fn validate(_: &mut Scope<'_>, closure: &Closure, _: &[Value]) -> Result<Value, Thrown> {
    let fps = closure.get("fps").as_int();
    if fps <= 0 {
        return Err(Thrown::new(format!("fps must be positive, got {}", fps)));
    }
    Ok(Value::Bool(true))
}

// Asks the other runtime to check a setting before continuing
fn configure(_: &mut Scope<'_>, closure: &Closure, _: &[Value]) -> Result<Value, Thrown> {
    let Some(checker) = closure.get("checker").as_runtime().cloned() else {
        return Err(Thrown::new("no checker runtime"));
    };
    let check = Worklet::new("validate", validate).capture("fps", closure.get("fps"));
    run_on_runtime_sync(&checker, &check)?;
    Ok(Value::from("configured"))
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Worklet Runtime - Basic Usage ===\n");

    let manager = RuntimeManager::new();
    let init = Worklet::new("setup", setup).capture("fps", 60);
    let animation = manager
        .create_runtime("animation", Some(&init))
        .expect("Failed to create runtime");
    let checker = manager.create_runtime("checker", None).expect("Failed to create runtime");

    // Fire-and-forget work runs in order ahead of the next synchronous call
    for _ in 0..3 {
        let step = Worklet::new("tick", tick).capture("count", 30);
        run_on_runtime_async(&animation, &step).expect("Failed to enqueue");
    }

    let report = run_on_runtime_sync(&animation, &Worklet::new("elapsed", elapsed)).unwrap();
    println!(
        "Report from {}: {:.2}s",
        report.get("runtime").as_string(),
        report.get("seconds").as_float()
    );

    // Nested dispatch: animation -> checker
    for fps in [30, 0] {
        let job = Worklet::new("configure", configure)
            .capture("checker", checker.clone())
            .capture("fps", fps);

        match run_on_runtime_sync(&animation, &job) {
            Ok(result) => println!("fps={}: {}", fps, result.as_string()),
            Err(DispatchError::Execution(e)) => {
                println!("fps={}: failed in `{}`: {}", fps, e.runtime, e.message);
                for frame in &e.trace {
                    println!("    at {}", frame);
                }
            }
            Err(e) => println!("fps={}: {}", fps, e),
        }
    }

    manager.dispose(&animation);
    match run_on_runtime_sync(&animation, &Worklet::new("elapsed", elapsed)) {
        Err(e) => println!("\nAfter dispose: {}", e),
        Ok(_) => println!("\nAfter dispose: unexpectedly succeeded"),
    }
}
