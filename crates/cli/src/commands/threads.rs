use super::Context;
use cleaners_core::Result;
use cleaners_registry::ScopedRelease;
use cleaners_resources::WorkerPoolResource;
use cleaners_utils::tracing::scenario_span;
use std::sync::Arc;
use std::thread;

pub fn run(context: &Context) -> Result<()> {
    let _span = scenario_span("threads").entered();

    // Abandoned; the registry watcher shuts the pool down
    let runner = start(context)?;
    run_tasks(&runner, context.tasks)?;
    drop(runner);

    // Shut down by an explicit call
    let runner = start(context)?;
    run_tasks(&runner, context.tasks)?;
    let outcome = runner.release()?;
    if !outcome.is_clean() {
        tracing::warn!(outcome = %outcome, "explicit shutdown did not complete cleanly");
    }

    // Shut down when the scope guard goes out of scope
    {
        let runner = start(context)?;
        let _scope = ScopedRelease::new(runner.cleanable()?);
        run_tasks(&runner, context.tasks)?;
    }

    Ok(())
}

fn start(context: &Context) -> Result<Arc<WorkerPoolResource>> {
    let runner = Arc::new(WorkerPoolResource::with_config(
        &context.registry,
        context.config.pool.clone(),
    ));
    runner.setup()?;
    Ok(runner)
}

fn run_tasks(runner: &WorkerPoolResource, tasks: usize) -> Result<()> {
    let caller = thread::current().name().unwrap_or("main").to_string();
    let work = (1..=tasks).map(|j| {
        let caller = caller.clone();
        move || {
            tracing::info!(
                "Thread {} is running: {}",
                thread::current().name().unwrap_or("unnamed"),
                j
            );
            format!("{caller}: {j}")
        }
    });

    for result in runner.submit_work(work)? {
        match result {
            Ok(value) => tracing::info!("Task returned: {value}"),
            Err(e) => tracing::error!(error = %e, "task failed"),
        }
    }
    Ok(())
}
