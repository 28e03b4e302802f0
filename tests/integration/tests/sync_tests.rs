//! Reaction sync end-to-end tests
//!
//! Every test runs the real engine, cache and multiplexer against the
//! in-memory backend. Tests that depend on ordering use tokio's paused clock
//! with injected latency.
//!
//! Run with: cargo test -p integration-tests --test sync_tests

use std::sync::Arc;
use std::time::Duration;

use echo_cache::Signal;
use echo_core::{ReactionKind, ResourceId};
use echo_sync::{MutationOutcome, RefreshOutcome};
use integration_tests::{
    alice, bob, carol, settle, test_config, unique_story, wait_until, within, TestContext,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PATIENCE: Duration = Duration::from_secs(2);

// ============================================================================
// Multiplexing
// ============================================================================

#[tokio::test]
async fn test_one_channel_per_resource() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    let other = unique_story();

    let handles: Vec<_> = (0..4).map(|_| ctx.sync.watch(&story)).collect();
    let elsewhere = ctx.sync.watch(&other);
    settle().await;

    assert_eq!(ctx.backend.open_channels_for(&story), 1);
    assert_eq!(ctx.backend.open_channels_for(&other), 1);
    assert_eq!(ctx.sync.multiplexer().subscriber_count(&story), 4);
    assert_eq!(ctx.sync.multiplexer().channel_count(), 2);

    for handle in handles {
        handle.close().await;
    }

    assert_eq!(ctx.backend.open_channels_for(&story), 0);
    assert_eq!(ctx.sync.multiplexer().subscriber_count(&story), 0);
    assert_eq!(ctx.backend.open_channels_for(&other), 1);

    elsewhere.close().await;
    assert_eq!(ctx.backend.open_channels(), 0);
    assert_eq!(ctx.backend.calls.opens(), ctx.backend.calls.closes());
}

#[tokio::test]
async fn test_refcount_under_random_interleaving() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    let mux = ctx.sync.multiplexer().clone();
    let mut rng = StdRng::seed_from_u64(7);
    let mut live = Vec::new();

    for _ in 0..200 {
        if live.is_empty() || rng.gen_bool(0.55) {
            live.push(mux.subscribe(&story, |_| {}));
        } else {
            let index = rng.gen_range(0..live.len());
            live.swap_remove(index).release().await;
        }
        settle().await;

        assert_eq!(mux.subscriber_count(&story), live.len());
        assert_eq!(ctx.backend.open_channels_for(&story), live.len().min(1));
    }

    for subscription in live {
        subscription.release().await;
    }
    assert_eq!(mux.subscriber_count(&story), 0);
    assert_eq!(mux.channel_count(), 0);
    assert_eq!(ctx.backend.open_channels_for(&story), 0);
}

#[tokio::test]
async fn test_dropping_handles_unsubscribes() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();

    let first = ctx.sync.watch(&story);
    let second = ctx.sync.watch(&story);
    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();

    drop(first);
    settle().await;
    assert_eq!(ctx.backend.open_channels_for(&story), 1);

    drop(second);
    wait_until(PATIENCE, || ctx.backend.open_channels_for(&story) == 0)
        .await
        .unwrap();
    assert_eq!(ctx.sync.multiplexer().channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remount_never_overlaps_channels() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_close_latency(Duration::from_millis(50));

    let first = ctx.sync.watch(&story);
    first.wait_loaded().await;
    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();

    drop(first);
    let second = ctx.sync.watch(&story);

    for _ in 0..10 {
        assert!(ctx.backend.open_channels_for(&story) <= 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();
    assert_eq!(ctx.backend.open_channels_for(&story), 1);
    assert_eq!(ctx.backend.calls.opens(), 2);
    assert_eq!(ctx.backend.calls.closes(), 1);

    second.close().await;
    assert_eq!(ctx.backend.open_channels(), 0);
}

// ============================================================================
// Cache Freshness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_refresh_respects_freshness_window() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &bob(), ReactionKind::Heart);

    let first = ctx.sync.refresh(&story).await;
    assert!(matches!(first, RefreshOutcome::Fetched(_)));
    assert_eq!(ctx.backend.calls.fetch_counts(), 1);

    tokio::time::advance(Duration::from_millis(4_900)).await;
    let cached = ctx.sync.refresh(&story).await;
    assert!(matches!(cached, RefreshOutcome::Cached(_)));
    assert_eq!(cached.snapshot().unwrap().count_of(ReactionKind::Heart), 1);
    assert_eq!(ctx.backend.calls.fetch_counts(), 1);

    tokio::time::advance(Duration::from_millis(200)).await;
    assert!(matches!(
        ctx.sync.refresh(&story).await,
        RefreshOutcome::Fetched(_)
    ));
    assert_eq!(ctx.backend.calls.fetch_counts(), 2);
}

#[tokio::test]
async fn test_fresh_cache_seeds_new_widget() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &bob(), ReactionKind::Laugh);

    ctx.sync.refresh(&story).await;
    let fetches = ctx.backend.calls.fetch_counts();

    let handle = ctx.sync.watch(&story);
    let state = handle.state();
    assert!(!state.loading);
    assert_eq!(state.count_of(ReactionKind::Laugh), 1);

    settle().await;
    assert_eq!(ctx.backend.calls.fetch_counts(), fetches);
}

#[tokio::test]
async fn test_cache_capacity_from_config() {
    let mut config = test_config();
    config.cache.max_entries = 2;
    let ctx = TestContext::with_config(config).unwrap();

    for _ in 0..3 {
        ctx.sync.refresh(&unique_story()).await;
    }
    assert_eq!(ctx.sync.cache().len(), 2);
}

// ============================================================================
// Optimistic Mutation And Rollback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_optimistic_add_then_rollback() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_write_latency(Duration::from_millis(100));

    let handle = ctx.sync.watch(&story);
    let before = handle.wait_loaded().await;
    assert_eq!(before.total(), 0);

    ctx.backend.fail_writes(true);
    let sync = ctx.sync.clone();
    let target = story.clone();
    let action = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Heart).await });
    settle().await;

    let during = handle.state();
    assert_eq!(during.count_of(ReactionKind::Heart), 1);
    assert_eq!(during.user_kind(), Some(ReactionKind::Heart));
    assert!(during.is_pending());

    assert_eq!(action.await.unwrap(), MutationOutcome::RolledBack);
    assert_eq!(handle.state(), before);
    assert_eq!(ctx.sync.snapshot(&story).total(), 0);
}

#[tokio::test]
async fn test_rollback_restores_snapshot_when_refetch_fails() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &bob(), ReactionKind::Sad);

    let handle = ctx.sync.watch(&story);
    let before = handle.wait_loaded().await;

    ctx.backend.fail_writes(true);
    ctx.backend.fail_fetches(true);

    assert_eq!(
        handle.add_reaction(ReactionKind::Wow).await,
        MutationOutcome::RolledBack
    );
    assert_eq!(handle.state(), before);
    assert_eq!(handle.state().count_of(ReactionKind::Sad), 1);
    assert!(handle.state().user_reaction.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_failure_keeps_optimistic_state() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.silence_events(true);
    ctx.backend.set_write_latency(Duration::from_millis(50));

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;

    let sync = ctx.sync.clone();
    let target = story.clone();
    let action = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Heart).await });
    settle().await;

    // The insert is on the wire; only the reconciliation fetch fails
    ctx.backend.fail_fetches(true);
    assert_eq!(action.await.unwrap(), MutationOutcome::Unconfirmed);

    let state = handle.state();
    assert_eq!(state.count_of(ReactionKind::Heart), 1);
    assert!(state.is_pending());
    assert_eq!(ctx.backend.rows_for(&story, &alice()).len(), 1);

    ctx.backend.fail_fetches(false);
    assert!(matches!(
        ctx.sync.force_refresh(&story).await,
        RefreshOutcome::Fetched(_)
    ));
    let state = handle.state();
    assert_eq!(state.count_of(ReactionKind::Heart), 1);
    assert!(!state.is_pending());
}

#[tokio::test]
async fn test_remove_reaction() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Heart);
    ctx.backend.seed(&story, &bob(), ReactionKind::Heart);

    let handle = ctx.sync.watch(&story);
    let loaded = handle.wait_loaded().await;
    assert_eq!(loaded.count_of(ReactionKind::Heart), 2);
    assert_eq!(loaded.user_kind(), Some(ReactionKind::Heart));

    assert_eq!(handle.remove_reaction().await, MutationOutcome::Confirmed);

    let state = handle.state();
    assert_eq!(state.count_of(ReactionKind::Heart), 1);
    assert!(state.user_reaction.is_none());
    assert!(ctx.backend.rows_for(&story, &alice()).is_empty());
}

#[tokio::test]
async fn test_noop_actions_are_skipped() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Fire);

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;

    assert_eq!(
        handle.add_reaction(ReactionKind::Fire).await,
        MutationOutcome::Skipped
    );

    let empty = unique_story();
    let empty_view = ctx.sync.watch(&empty);
    empty_view.wait_loaded().await;
    assert_eq!(empty_view.remove_reaction().await, MutationOutcome::Skipped);
    assert_eq!(ctx.sync.intent_version(&empty), 0);

    ctx.identity.sign_out();
    assert_eq!(
        handle.add_reaction(ReactionKind::Heart).await,
        MutationOutcome::Skipped
    );
    assert_eq!(handle.remove_reaction().await, MutationOutcome::Skipped);

    assert_eq!(ctx.backend.calls.inserts(), 0);
    assert_eq!(ctx.backend.calls.deletes(), 0);
    assert_eq!(ctx.sync.intent_version(&story), 0);
}

#[tokio::test]
async fn test_toggle_reaction() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;

    assert_eq!(
        handle.toggle_reaction(ReactionKind::Laugh).await,
        MutationOutcome::Confirmed
    );
    assert_eq!(handle.state().user_kind(), Some(ReactionKind::Laugh));

    assert_eq!(
        handle.toggle_reaction(ReactionKind::Laugh).await,
        MutationOutcome::Confirmed
    );
    assert!(handle.state().user_reaction.is_none());
    assert_eq!(handle.state().total(), 0);
}

// ============================================================================
// Kind Switch
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_switching_kind_moves_the_count() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Heart);
    ctx.backend.seed(&story, &bob(), ReactionKind::Heart);
    ctx.backend.set_write_latency(Duration::from_millis(50));

    let handle = ctx.sync.watch(&story);
    let loaded = handle.wait_loaded().await;
    assert_eq!(loaded.count_of(ReactionKind::Heart), 2);
    assert!(!loaded.is_pending());

    let sync = ctx.sync.clone();
    let target = story.clone();
    let action = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Fire).await });
    settle().await;

    let during = handle.state();
    assert_eq!(during.count_of(ReactionKind::Heart), 1);
    assert_eq!(during.count_of(ReactionKind::Fire), 1);
    assert_eq!(during.user_kind(), Some(ReactionKind::Fire));

    assert_eq!(action.await.unwrap(), MutationOutcome::Confirmed);

    let after = handle.state();
    assert_eq!(after.count_of(ReactionKind::Heart), 1);
    assert_eq!(after.count_of(ReactionKind::Fire), 1);
    assert_eq!(after.user_kind(), Some(ReactionKind::Fire));
    assert!(!after.is_pending());

    let rows = ctx.backend.rows_for(&story, &alice());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ReactionKind::Fire);
    assert_eq!(ctx.backend.calls.deletes(), 1);
    assert_eq!(ctx.backend.calls.inserts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_while_add_in_flight() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_write_latency(Duration::from_millis(50));

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;

    let sync = ctx.sync.clone();
    let target = story.clone();
    let add = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Heart).await });
    settle().await;
    assert!(handle.state().is_pending());

    let removed = ctx.sync.remove_reaction(&story).await;
    assert_eq!(add.await.unwrap(), MutationOutcome::Superseded);
    assert_eq!(removed, MutationOutcome::Confirmed);

    assert!(ctx.backend.rows_for(&story, &alice()).is_empty());
    assert!(handle.state().user_reaction.is_none());
    assert_eq!(handle.state().total(), 0);
    assert_eq!(ctx.sync.pending_writes(&story), 0);
}

#[tokio::test]
async fn test_switching_kind_under_cache_pressure() {
    let mut config = test_config();
    config.cache.max_entries = 1;
    let ctx = TestContext::with_config(config).unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Heart);

    let handle = ctx.sync.watch(&story);
    let loaded = handle.wait_loaded().await;
    assert_eq!(loaded.user_kind(), Some(ReactionKind::Heart));

    // Filling the cache must not push out a resource that is on screen
    ctx.sync.refresh(&unique_story()).await;
    assert!(ctx.sync.cache().contains(&story));

    assert_eq!(
        handle.add_reaction(ReactionKind::Fire).await,
        MutationOutcome::Confirmed
    );

    let rows = ctx.backend.rows_for(&story, &alice());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ReactionKind::Fire);

    let state = handle.state();
    assert_eq!(state.count_of(ReactionKind::Heart), 0);
    assert_eq!(state.count_of(ReactionKind::Fire), 1);
    assert_eq!(state.user_kind(), Some(ReactionKind::Fire));

    drop(handle);
    assert!(!ctx.sync.cache().is_pinned(&story));
}

#[tokio::test]
async fn test_switching_kind_without_cached_state() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Heart);
    assert!(!ctx.sync.cache().contains(&story));

    assert_eq!(
        ctx.sync.add_reaction(&story, ReactionKind::Fire).await,
        MutationOutcome::Confirmed
    );

    let rows = ctx.backend.rows_for(&story, &alice());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ReactionKind::Fire);
    assert_eq!(ctx.backend.calls.deletes(), 1);

    let snapshot = ctx.sync.snapshot(&story);
    assert_eq!(snapshot.count_of(ReactionKind::Heart), 0);
    assert_eq!(snapshot.count_of(ReactionKind::Fire), 1);
    assert_eq!(snapshot.user_kind(), Some(ReactionKind::Fire));
}

#[tokio::test(start_paused = true)]
async fn test_switching_kind_before_first_load() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Heart);
    ctx.backend.seed(&story, &bob(), ReactionKind::Heart);
    ctx.backend.set_read_latency(Duration::from_millis(100));

    let handle = ctx.sync.watch(&story);
    settle().await;
    assert!(handle.state().loading);

    assert_eq!(
        handle.add_reaction(ReactionKind::Fire).await,
        MutationOutcome::Confirmed
    );

    let rows = ctx.backend.rows_for(&story, &alice());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, ReactionKind::Fire);

    let state = handle.wait_loaded().await;
    assert_eq!(state.count_of(ReactionKind::Heart), 1);
    assert_eq!(state.count_of(ReactionKind::Fire), 1);
    assert_eq!(state.user_kind(), Some(ReactionKind::Fire));
    assert!(!state.is_pending());
}

#[tokio::test]
async fn test_remove_without_cached_state() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.seed(&story, &alice(), ReactionKind::Heart);
    ctx.backend.seed(&story, &bob(), ReactionKind::Heart);

    assert_eq!(
        ctx.sync.remove_reaction(&story).await,
        MutationOutcome::Confirmed
    );
    assert!(ctx.backend.rows_for(&story, &alice()).is_empty());

    let snapshot = ctx.sync.snapshot(&story);
    assert_eq!(snapshot.count_of(ReactionKind::Heart), 1);
    assert!(snapshot.user_reaction.is_none());

    // Nothing held on the server either: no delete is sent
    let untouched = unique_story();
    assert_eq!(
        ctx.sync.remove_reaction(&untouched).await,
        MutationOutcome::Confirmed
    );
    assert_eq!(ctx.backend.calls.deletes(), 1);
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_widgets_converge_with_one_reconciliation_fetch() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.silence_events(true);

    let first = ctx.sync.watch(&story);
    let second = ctx.sync.watch(&story);
    first.wait_loaded().await;
    second.wait_loaded().await;
    settle().await;

    let fetches = ctx.backend.calls.fetch_counts();
    assert_eq!(
        first.add_reaction(ReactionKind::Heart).await,
        MutationOutcome::Confirmed
    );
    settle().await;

    assert_eq!(ctx.backend.calls.fetch_counts(), fetches + 1);

    let seen_by_second = second.state();
    assert_eq!(seen_by_second, first.state());
    assert_eq!(seen_by_second.count_of(ReactionKind::Heart), 1);
    assert_eq!(seen_by_second.user_kind(), Some(ReactionKind::Heart));
    assert!(!seen_by_second.is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_own_echo_is_absorbed_by_reconciliation() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_read_latency(Duration::from_millis(50));
    ctx.backend.set_write_latency(Duration::from_millis(50));

    let first = ctx.sync.watch(&story);
    let second = ctx.sync.watch(&story);
    first.wait_loaded().await;
    second.wait_loaded().await;
    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();

    let fetches = ctx.backend.calls.fetch_counts();
    assert_eq!(
        first.add_reaction(ReactionKind::Heart).await,
        MutationOutcome::Confirmed
    );
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(ctx.backend.calls.fetch_counts(), fetches + 1);
    assert_eq!(second.state(), first.state());
    assert_eq!(second.state().count_of(ReactionKind::Heart), 1);
    assert!(!second.state().is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_late_echo_costs_one_shared_refresh() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();

    let widgets: Vec<_> = (0..3).map(|_| ctx.sync.watch(&story)).collect();
    for widget in &widgets {
        widget.wait_loaded().await;
    }
    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();

    let fetches = ctx.backend.calls.fetch_counts();
    assert_eq!(
        widgets[0].add_reaction(ReactionKind::Heart).await,
        MutationOutcome::Confirmed
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    settle().await;

    // One reconciliation plus at most one refresh for the echo, whatever the widget count
    assert!(ctx.backend.calls.fetch_counts() <= fetches + 2);
    for widget in &widgets {
        assert_eq!(widget.state().count_of(ReactionKind::Heart), 1);
        assert_eq!(widget.state().user_kind(), Some(ReactionKind::Heart));
    }
}

#[tokio::test]
async fn test_remote_change_reaches_other_device() {
    let alice_ctx = TestContext::new().unwrap();
    let bob_ctx = alice_ctx.another_device(bob()).unwrap();
    let story = unique_story();

    let mut bob_view = bob_ctx.sync.watch(&story);
    bob_view.wait_loaded().await;
    wait_until(PATIENCE, || bob_ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();

    assert_eq!(
        alice_ctx.sync.add_reaction(&story, ReactionKind::Wow).await,
        MutationOutcome::Confirmed
    );

    let updated = within(PATIENCE, async {
        loop {
            match bob_view.changed().await {
                Some(state) if state.count_of(ReactionKind::Wow) == 1 => break state,
                Some(_) => {}
                None => panic!("handle closed"),
            }
        }
    })
    .await
    .unwrap();

    assert!(updated.user_reaction.is_none());
}

#[tokio::test]
async fn test_external_insert_triggers_refresh() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;
    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();

    ctx.backend.external_insert(&story, &carol(), ReactionKind::Sad);

    wait_until(PATIENCE, || handle.state().count_of(ReactionKind::Sad) == 1)
        .await
        .unwrap();
}

// ============================================================================
// Stale Reconciliation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_reconciliation_never_overwrites_newer_intent() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.silence_events(true);
    ctx.backend.set_read_latency(Duration::from_millis(100));
    ctx.backend.set_write_latency(Duration::from_millis(10));

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;

    let published = Arc::new(Mutex::new(Vec::new()));
    let log = published.clone();
    let _recorder = ctx.sync.multiplexer().subscribe(&story, move |signal| {
        if let Signal::Snapshot(snapshot) = signal {
            log.lock().push(snapshot.user_kind());
        }
    });

    let sync = ctx.sync.clone();
    let target = story.clone();
    let heart = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Heart).await });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let sync = ctx.sync.clone();
    let target = story.clone();
    let fire = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Fire).await });

    assert_eq!(heart.await.unwrap(), MutationOutcome::Superseded);
    assert_eq!(fire.await.unwrap(), MutationOutcome::Confirmed);

    assert_eq!(
        *published.lock(),
        vec![
            Some(ReactionKind::Heart),
            Some(ReactionKind::Fire),
            Some(ReactionKind::Fire)
        ]
    );

    let state = handle.state();
    assert_eq!(state.count_of(ReactionKind::Heart), 0);
    assert_eq!(state.count_of(ReactionKind::Fire), 1);
    assert!(!state.is_pending());
    assert_eq!(ctx.sync.intent_version(&story), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_overlapping_action_is_discarded() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.silence_events(true);
    ctx.backend.set_read_latency(Duration::from_millis(100));

    let sync = ctx.sync.clone();
    let target = story.clone();
    let refresh = tokio::spawn(async move { sync.force_refresh(&target).await });
    settle().await;

    assert_eq!(
        ctx.sync.add_reaction(&story, ReactionKind::Heart).await,
        MutationOutcome::Confirmed
    );
    assert_eq!(refresh.await.unwrap(), RefreshOutcome::Discarded);

    let snapshot = ctx.sync.snapshot(&story);
    assert_eq!(snapshot.count_of(ReactionKind::Heart), 1);
    assert!(!snapshot.user_reaction.unwrap().is_provisional());
}

// ============================================================================
// Refresh Coalescing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_forced_refreshes_coalesce_into_one_follow_up() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_read_latency(Duration::from_millis(100));

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let sync = ctx.sync.clone();
            let target = story.clone();
            tokio::spawn(async move { sync.force_refresh(&target).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }

    assert!(matches!(outcomes[0], RefreshOutcome::Fetched(_)));
    assert_eq!(outcomes[1], RefreshOutcome::Coalesced);
    assert_eq!(outcomes[2], RefreshOutcome::Coalesced);
    assert_eq!(ctx.backend.calls.fetch_counts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_plain_refresh_does_not_schedule_follow_up() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_read_latency(Duration::from_millis(100));

    let sync = ctx.sync.clone();
    let target = story.clone();
    let first = tokio::spawn(async move { sync.refresh(&target).await });
    settle().await;

    assert_eq!(ctx.sync.refresh(&story).await, RefreshOutcome::Coalesced);
    assert!(matches!(first.await.unwrap(), RefreshOutcome::Fetched(_)));
    assert_eq!(ctx.backend.calls.fetch_counts(), 1);
}

// ============================================================================
// Channel Resilience
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_failure_degrades_to_polling() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.fail_opens(true);

    let handle = ctx.sync.watch(&story);
    let loaded = handle.wait_loaded().await;
    assert_eq!(loaded.total(), 0);
    assert_eq!(ctx.sync.multiplexer().subscriber_count(&story), 1);

    ctx.backend.external_insert(&story, &bob(), ReactionKind::Fire);
    wait_until(Duration::from_secs(1), || {
        handle.state().count_of(ReactionKind::Fire) == 1
    })
    .await
    .unwrap();

    assert!(!ctx.sync.multiplexer().is_connected(&story));
    assert!(ctx.backend.calls.opens() >= 2);

    ctx.backend.fail_opens(false);
    wait_until(Duration::from_secs(1), || {
        ctx.sync.multiplexer().is_connected(&story)
    })
    .await
    .unwrap();
    assert_eq!(ctx.backend.open_channels_for(&story), 1);
}

#[tokio::test]
async fn test_reconnects_after_stream_ends() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();

    let handle = ctx.sync.watch(&story);
    wait_until(PATIENCE, || ctx.sync.multiplexer().is_connected(&story))
        .await
        .unwrap();
    assert_eq!(ctx.backend.calls.opens(), 1);

    ctx.backend.drop_streams();
    wait_until(PATIENCE, || {
        ctx.backend.calls.opens() == 2 && ctx.sync.multiplexer().is_connected(&story)
    })
    .await
    .unwrap();
    assert_eq!(ctx.backend.open_channels_for(&story), 1);

    handle.close().await;
    assert_eq!(ctx.backend.open_channels(), 0);
}

// ============================================================================
// Handle Lifetime
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_result_after_drop_still_lands_in_cache() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.set_write_latency(Duration::from_millis(100));

    let handle = ctx.sync.watch(&story);
    handle.wait_loaded().await;

    let sync = ctx.sync.clone();
    let target = story.clone();
    let action = tokio::spawn(async move { sync.add_reaction(&target, ReactionKind::Heart).await });
    settle().await;

    drop(handle);
    assert_eq!(ctx.sync.multiplexer().subscriber_count(&story), 0);

    assert_eq!(action.await.unwrap(), MutationOutcome::Confirmed);
    let snapshot = ctx.sync.snapshot(&story);
    assert_eq!(snapshot.count_of(ReactionKind::Heart), 1);
    assert_eq!(snapshot.user_kind(), Some(ReactionKind::Heart));
}

#[tokio::test]
async fn test_watch_unknown_resource_loads_empty() {
    let ctx = TestContext::new().unwrap();
    let story = ResourceId::from("never-reacted");

    let handle = ctx.sync.watch(&story);
    let state = within(PATIENCE, handle.wait_loaded()).await.unwrap();
    assert!(!state.loading);
    assert!(state.counts.is_empty());
    assert!(state.user_reaction.is_none());
}

#[tokio::test]
async fn test_failed_initial_load_stops_loading() {
    let ctx = TestContext::new().unwrap();
    let story = unique_story();
    ctx.backend.fail_fetches(true);

    let handle = ctx.sync.watch(&story);
    let state = within(PATIENCE, handle.wait_loaded()).await.unwrap();
    assert!(!state.loading);
    assert_eq!(state.total(), 0);
}
