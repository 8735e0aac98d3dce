//! Ramp-up demo: stagger worker release and observe the queue from outside

use load_queue::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::init();

    let stats = QueueExecutionStatistics::new();
    let invoker = Arc::new(ClosureInvoker::new(|_: &ActionRequest| {
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }));
    let manager = LoadQueueManager::new("localhost", invoker, stats.clone());

    // 8 workers for 2 seconds each, released in groups of 2 every 500ms,
    // non-blocking: the caller keeps control while the queue runs
    let pattern = ThreadingPattern::fixed_duration_ramp_up(
        8,
        Duration::from_secs(2),
        Duration::from_millis(500),
        2,
        false,
    )?;

    manager.schedule_actions(
        "ramp_demo",
        1,
        vec![ActionRequest::new("Demo", "load", vec![])],
        pattern,
        false,
    )?;
    manager.start_queue("ramp_demo")?;

    let started = Instant::now();
    while manager.is_queue_running("ramp_demo")? {
        println!(
            "t+{:>4}ms state={} invocations={}",
            started.elapsed().as_millis(),
            manager.queue_state("ramp_demo")?,
            stats.result_count("ramp_demo"),
        );
        std::thread::sleep(Duration::from_millis(400));
    }

    manager.wait_until_queue_finish("ramp_demo")?;
    println!(
        "ramp_demo finished after {:?} with {} invocations",
        started.elapsed(),
        stats.result_count("ramp_demo"),
    );

    Ok(())
}
