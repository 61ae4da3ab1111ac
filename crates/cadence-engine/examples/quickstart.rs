//! Cadence Quickstart: a small world of weather stations reporting
//! rainfall into regional gauges.
//!
//! Demonstrates:
//!   1. Implementing actor logic that emits effects
//!   2. Implementing partition logic that applies them
//!   3. Registering both and describing the active roster
//!   4. Running a paced pipeline on background threads
//!   5. Watching the driver through its monitor, then shutting down
//!
//! Run with:
//!   RUST_LOG=cadence_engine=debug cargo run --example quickstart

use std::sync::Arc;
use std::time::Duration;

use cadence_core::keys::partition_key;
use cadence_core::{
    ActorContext, ActorError, ActorLogic, ActorOutput, ApplyError, DurableStore, Effect,
    EffectRecord, PartitionContext, PartitionId, PartitionLogic,
};
use cadence_engine::{Backplane, LogicRegistry, Pipeline, PipelineConfig, Roster};

// ─── Stations ───────────────────────────────────────────────────
//
// Each station reports a millimetre reading to its region every tick.
// The reading is derived from the station name and the tick so runs are
// reproducible.

struct Station {
    region: PartitionId,
}

impl ActorLogic for Station {
    fn run(
        &self,
        ctx: &ActorContext<'_>,
        _state: Option<&[u8]>,
        _inputs: &[Vec<u8>],
    ) -> Result<ActorOutput, ActorError> {
        let seed: u64 = ctx.actor.as_str().bytes().map(u64::from).sum();
        let mm = (seed * 31 + ctx.tick.0 * 7) % 13;
        Ok(ActorOutput {
            effects: vec![Effect::new(self.region.clone(), mm.to_le_bytes().to_vec())],
            state: None,
        })
    }
}

// ─── Gauges ─────────────────────────────────────────────────────
//
// A gauge keeps the running rainfall total as a little-endian u64.

struct Gauge;

fn total(state: &[u8]) -> u64 {
    state.try_into().map(u64::from_le_bytes).unwrap_or(0)
}

impl PartitionLogic for Gauge {
    fn apply(
        &self,
        _ctx: &mut PartitionContext<'_>,
        state: &mut Vec<u8>,
        effects: &[EffectRecord],
    ) -> Result<(), ApplyError> {
        let mut sum = total(state);
        for effect in effects {
            let bytes: [u8; 8] =
                effect
                    .payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| ApplyError::MalformedEffect {
                        producer: effect.producer.clone(),
                        reason: format!("reading is {} bytes", effect.payload.len()),
                    })?;
            sum += u64::from_le_bytes(bytes);
        }
        *state = sum.to_le_bytes().to_vec();
        Ok(())
    }
}

// ─── Main ───────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cadence_engine=info".parse()?),
        )
        .init();

    println!("=== Cadence Quickstart ===\n");

    // 1. Describe the world: two regions, three stations each.
    let regions = ["north", "south"];
    let mut roster = Roster::new();
    let mut registry = LogicRegistry::new().with_partition("gauge", Arc::new(Gauge));
    for region in regions {
        roster = roster.with_partition(region, "gauge");
        let kind = format!("station-{region}");
        registry = registry.with_actor(
            kind.as_str(),
            Arc::new(Station {
                region: PartitionId::new(region),
            }),
        );
        for n in 0..3 {
            roster = roster.with_actor(format!("{region}-{n}"), kind.as_str());
        }
    }

    // 2. Seed partition state so every gauge starts at zero.
    let (backplane, store) = Backplane::in_memory();
    for region in regions {
        store.save(&partition_key(&PartitionId::new(region)), &[])?;
    }

    // 3. Start the pipeline: 20 ticks per second on two workers per pool.
    let config = PipelineConfig {
        target_tick_duration: Duration::from_millis(50),
        runner_count: Some(2),
        processor_count: Some(2),
        ..Default::default()
    };
    let mut pipeline = Pipeline::start(config, backplane, registry, roster)?;

    // 4. Let it run for ten ticks.
    let finished = pipeline
        .monitor()
        .wait_until(Duration::from_secs(10), |s| s.ticks_completed >= 10);
    println!("Ten ticks completed: {finished}");
    if let Some(metrics) = pipeline.monitor().snapshot().last_metrics {
        println!(
            "Last tick: {:.2}ms (runners {}μs, processors {}μs, flush {}μs)",
            metrics.total_ms(),
            metrics.runners_us,
            metrics.processors_us,
            metrics.flush_us,
        );
    }

    // 5. Stop and report.
    let report = pipeline.shutdown();
    println!(
        "\nStopped at tick {:?} after {}ms; {} actor runs, {} partition writes",
        report.final_tick.map(|t| t.0),
        report.total_ms,
        report.runner_stats.actors_processed,
        report.processor_stats.partitions_saved,
    );
    for region in regions {
        let state = store.load(&partition_key(&PartitionId::new(region)))?;
        println!("  {region:>5}: {}mm", total(&state));
    }
    Ok(())
}
