use super::Context;
use cleaners_core::Result;
use cleaners_registry::ScopedRelease;
use cleaners_resources::ManagedResource;
use cleaners_utils::tracing::scenario_span;
use std::sync::Arc;

pub fn run(context: &Context) -> Result<()> {
    let _span = scenario_span("rooms").entered();

    // Released when the scope guard goes out of scope
    {
        let room = Arc::new(ManagedResource::new(&context.registry));
        room.setup("Jonathan", 2)?;
        let _scope = ScopedRelease::new(room.cleanable()?);
        report(&room)?;
    }

    // Released by an explicit call
    let garage = Arc::new(ManagedResource::new(&context.registry));
    garage.setup("Garage", 12)?;
    report(&garage)?;
    garage.release()?;

    // Abandoned; the registry watcher releases it
    let her_room = Arc::new(ManagedResource::new(&context.registry));
    her_room.setup("Dena", 5)?;
    report(&her_room)?;
    drop(her_room);

    Ok(())
}

fn report(room: &ManagedResource) -> Result<()> {
    tracing::info!("{}'s room has {} units in it", room.name()?, room.count()?);
    Ok(())
}
