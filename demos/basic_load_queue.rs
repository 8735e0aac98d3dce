//! Basic usage: schedule a queue, run it to completion, read the results

use load_queue::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let stats = QueueExecutionStatistics::new();

    // Stand-in for the action dispatcher: pretend every third call fails
    let invoker = Arc::new(ClosureInvoker::new(|request: &ActionRequest| {
        std::thread::sleep(Duration::from_millis(10));
        if fastrand::u8(0..3) == 0 {
            Err(LoaderError::action_failed(
                request.qualified_name(),
                "simulated failure",
            ))
        } else {
            Ok(())
        }
    }));

    let manager = LoadQueueManager::new("localhost", invoker, stats.clone());

    // 5 workers x 20 iterations, 25ms apart, blocking until done
    let pattern = ThreadingPattern::all_at_once(5, 20, Duration::from_millis(25), true)?;
    manager.execute_actions(
        "demo_queue",
        1,
        vec![ActionRequest::new("Demo", "ping", vec![])],
        pattern,
    )?;

    println!(
        "demo_queue finished: {} invocations, {} passed, {} failed",
        stats.result_count("demo_queue"),
        stats.passed_count("demo_queue"),
        stats.failed_count("demo_queue"),
    );

    for result in manager.execution_results("demo_queue").iter().take(5) {
        println!(
            "  [{}] {} {} {}",
            result.timestamp,
            result.worker,
            result.action,
            if result.passed { "ok" } else { "FAILED" },
        );
    }

    Ok(())
}
