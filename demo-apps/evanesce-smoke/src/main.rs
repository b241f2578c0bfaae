use anyhow::{ensure, Context, Result};
use evanesce_core::{challenge, global, Lookup, MemoryStore, Store, StoreConfig};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evanesce_smoke=info,evanesce_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::from_env();
    config.validate().context("invalid store configuration")?;

    tracing::info!("🧪 Evanesce smoke run");
    tracing::info!("   Sweep threshold: {} writes", config.sweep_threshold);
    tracing::info!("   TTL: {}s", config.ttl.as_secs());

    let previous = global::replace(Arc::new(MemoryStore::try_with_config(config)?));
    drop(previous);

    test_basic_operations()?;
    test_challenge_round_trip()?;
    test_parallel_set_get().await?;
    test_expiration().await?;

    tracing::info!("✅ All checks passed!");

    Ok(())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Set, peek, consume, and look up an unknown id on the default store
fn test_basic_operations() -> Result<()> {
    tracing::info!("Check: Basic Operations");
    let store = global::store();

    let id = new_id();
    store.set(&id, b"hello world");
    tracing::info!("   SET {}", id);

    let peeked = store.get(&id, false);
    ensure!(
        peeked.value() == Some(&b"hello world"[..]),
        "peek should return the stored value, got {:?}",
        peeked
    );

    let consumed = store.get(&id, true);
    ensure!(consumed.is_found(), "consuming read should find the entry");
    ensure!(
        store.get(&id, true) == Lookup::NotFound,
        "entry should be gone after a consuming read"
    );

    ensure!(
        store.get(&new_id(), false) == Lookup::NotFound,
        "unknown id should not be found"
    );

    tracing::info!("   ✓ Basic operations work correctly");
    Ok(())
}

/// Issue a challenge, reload it, then answer it twice
fn test_challenge_round_trip() -> Result<()> {
    tracing::info!("Check: Challenge round trip");
    let store = global::store();

    let id = new_id();
    store.set(&id, b"40271");
    ensure!(
        challenge::reload(store.as_ref(), &id, b"88123"),
        "reload should refresh a live challenge"
    );
    ensure!(
        !challenge::verify(store.as_ref(), &id, b"40271"),
        "the replaced answer must be rejected"
    );

    let id = new_id();
    store.set(&id, b"55555");
    ensure!(
        challenge::verify(store.as_ref(), &id, b"55555"),
        "correct answer should verify"
    );
    ensure!(
        !challenge::verify(store.as_ref(), &id, b"55555"),
        "a challenge can only be answered once"
    );

    tracing::info!("   ✓ Challenges verify once");
    Ok(())
}

/// Concurrent writers on distinct ids, then concurrent readers
async fn test_parallel_set_get() -> Result<()> {
    const TASKS: usize = 16;
    const IDS_PER_TASK: usize = 250;

    tracing::info!(
        "Check: Parallel SET/GET ({} concurrent operations)",
        TASKS * IDS_PER_TASK
    );
    let store = global::store();
    let start = Instant::now();

    let writers = (0..TASKS).map(|task| {
        let store = Arc::clone(&store);
        tokio::task::spawn_blocking(move || {
            (0..IDS_PER_TASK)
                .map(|i| {
                    let id = format!("parallel-{}-{}", task, i);
                    store.set(&id, id.as_bytes());
                    id
                })
                .collect::<Vec<_>>()
        })
    });
    let mut ids = Vec::with_capacity(TASKS * IDS_PER_TASK);
    for written in join_all(writers).await {
        ids.extend(written?);
    }

    let readers = ids.chunks(IDS_PER_TASK).map(|chunk| {
        let store = Arc::clone(&store);
        let chunk = chunk.to_vec();
        tokio::task::spawn_blocking(move || {
            chunk
                .iter()
                .filter(|id| store.get(id, true).value() == Some(id.as_bytes()))
                .count()
        })
    });
    let mut matched = 0;
    for count in join_all(readers).await {
        matched += count?;
    }

    ensure!(
        matched == ids.len(),
        "every id should read back its own value ({} of {})",
        matched,
        ids.len()
    );

    tracing::info!(
        "   ✓ {} ids written and consumed in {:?}",
        ids.len(),
        start.elapsed()
    );
    Ok(())
}

/// Entries become unreachable after the TTL, and sweeps clear the rest
async fn test_expiration() -> Result<()> {
    tracing::info!("Check: Expiration");

    let store = MemoryStore::try_with_config(
        StoreConfig::default()
            .with_sweep_threshold(2)
            .with_ttl_secs(1),
    )?;

    store.set("a", &[1, 2, 3]);
    ensure!(store.get("a", false).is_found(), "fresh entry should be found");
    store.set("b", &[4, 5]);
    store.set("c", &[6]);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    ensure!(store.get("a", false).is_expired(), "entry a should have expired");
    ensure!(store.get("b", false).is_expired(), "entry b should have expired");
    ensure!(store.get("d", false).is_not_found(), "entry d was never written");

    // Push past the threshold again so a background sweep takes "c"
    store.set("e", &[7]);
    store.set("f", &[8]);
    store.set("g", &[9]);
    for _ in 0..100 {
        if store.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    ensure!(
        store.len() == 3,
        "sweep should leave only the fresh entries, found {}",
        store.len()
    );
    ensure!(
        store.get("c", false).is_not_found(),
        "swept entry should be unreachable"
    );

    tracing::info!("   ✓ Expired entries are purged");
    Ok(())
}
