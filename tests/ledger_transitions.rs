mod common;

use threadvote::{
    core::ledger::VoteLedger,
    op::TransitionKind,
    persist::{memory::InMemoryRecordStore, RecordStore},
    types::{CommentId, Polarity, TargetId},
    vote::TargetCounters,
};

use common::{thread, user};

#[tokio::test]
async fn up_switch_retract_scenario_tracks_counters_and_state() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::new(5, 2)),
    );
    let alice = user();

    let mut view = ledger.open_view(Some(&alice), target).await.expect("open");
    assert_eq!(view.score(), 3);
    assert_eq!(view.current_vote, None);

    let out = ledger
        .cast_vote(Some(&alice), &mut view, Polarity::Up)
        .await
        .expect("upvote");
    assert_eq!(out.transition.kind(), TransitionKind::Create);
    assert_eq!(view.counters, TargetCounters::new(6, 2));
    assert_eq!(view.score(), 4);
    assert_eq!(view.current_vote, Some(Polarity::Up));

    let out = ledger
        .cast_vote(Some(&alice), &mut view, Polarity::Down)
        .await
        .expect("switch");
    assert_eq!(out.transition.kind(), TransitionKind::Switch);
    assert_eq!(view.counters, TargetCounters::new(5, 3));
    assert_eq!(view.score(), 2);
    assert_eq!(view.current_vote, Some(Polarity::Down));

    let out = ledger
        .cast_vote(Some(&alice), &mut view, Polarity::Down)
        .await
        .expect("retract");
    assert_eq!(out.transition.kind(), TransitionKind::Retract);
    assert_eq!(view.counters, TargetCounters::new(5, 2));
    assert_eq!(view.score(), 3);
    assert_eq!(view.current_vote, None);

    let stored = ledger.store().read_counters(target).await.expect("counters");
    assert_eq!(stored, TargetCounters::new(5, 2));
    assert!(ledger.store().votes_for(target).expect("votes").is_empty());
}

#[tokio::test]
async fn same_polarity_twice_leaves_no_record() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::new(1, 1)),
    );
    let bob = user();
    let mut view = ledger.open_view(Some(&bob), target).await.expect("open");

    for _ in 0..2 {
        ledger
            .cast_vote(Some(&bob), &mut view, Polarity::Up)
            .await
            .expect("cast");
    }

    assert_eq!(view.current_vote, None);
    assert_eq!(ledger.store().find_vote(bob.id, target).await.expect("find"), None);
    assert_eq!(ledger.store().vote_count().expect("count"), 0);
    assert_eq!(
        ledger.store().read_counters(target).await.expect("counters"),
        TargetCounters::new(1, 1)
    );
}

#[tokio::test]
async fn switch_moves_exactly_one_vote_between_counters() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::new(10, 4)),
    );
    let carol = user();
    let mut view = ledger.open_view(Some(&carol), target).await.expect("open");

    ledger
        .cast_vote(Some(&carol), &mut view, Polarity::Up)
        .await
        .expect("up");
    let before = ledger.store().read_counters(target).await.expect("before");

    ledger
        .cast_vote(Some(&carol), &mut view, Polarity::Down)
        .await
        .expect("switch");
    let after = ledger.store().read_counters(target).await.expect("after");

    assert_eq!(after.upvotes, before.upvotes - 1);
    assert_eq!(after.downvotes, before.downvotes + 1);
    let record = ledger
        .store()
        .find_vote(carol.id, target)
        .await
        .expect("find")
        .expect("record");
    assert_eq!(record.polarity, Polarity::Down);
}

#[tokio::test]
async fn retract_on_zero_counter_stays_at_zero() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::new(0, 0)),
    );
    let dave = user();
    let mut view = ledger.open_view(Some(&dave), target).await.expect("open");
    ledger
        .cast_vote(Some(&dave), &mut view, Polarity::Up)
        .await
        .expect("up");

    // Stale local snapshot: someone reset the counters underneath us.
    ledger
        .store()
        .put_target(target, TargetCounters::new(0, 0))
        .expect("reset");
    view.counters = TargetCounters::new(0, 0);

    ledger
        .cast_vote(Some(&dave), &mut view, Polarity::Up)
        .await
        .expect("retract");
    assert_eq!(view.counters, TargetCounters::new(0, 0));
    assert_eq!(
        ledger.store().read_counters(target).await.expect("counters"),
        TargetCounters::new(0, 0)
    );
}

#[tokio::test]
async fn open_view_reflects_existing_vote_and_anonymous_viewers() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::new(3, 0)),
    );
    let erin = user();
    let mut view = ledger.open_view(Some(&erin), target).await.expect("open");
    ledger
        .cast_vote(Some(&erin), &mut view, Polarity::Down)
        .await
        .expect("down");

    let reopened = ledger.open_view(Some(&erin), target).await.expect("reopen");
    assert_eq!(reopened.current_vote, Some(Polarity::Down));
    assert_eq!(reopened.counters, TargetCounters::new(3, 1));

    let anonymous = ledger.open_view(None, target).await.expect("anonymous");
    assert_eq!(anonymous.current_vote, None);
    assert_eq!(anonymous.viewer, None);
    assert_eq!(anonymous.score(), 2);
}

#[tokio::test]
async fn cast_by_a_different_user_reloads_their_vote_first() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::default()),
    );
    let frank = user();
    let grace = user();

    let mut grace_view = ledger.open_view(Some(&grace), target).await.expect("open");
    ledger
        .cast_vote(Some(&grace), &mut grace_view, Polarity::Up)
        .await
        .expect("grace up");

    // Frank signs in on a view that was loaded for Grace.
    let mut shared = ledger.open_view(Some(&grace), target).await.expect("open");
    assert_eq!(shared.current_vote, Some(Polarity::Up));
    ledger
        .cast_vote(Some(&frank), &mut shared, Polarity::Up)
        .await
        .expect("frank up");

    assert_eq!(shared.viewer, Some(frank.id));
    assert_eq!(shared.current_vote, Some(Polarity::Up));
    assert_eq!(
        ledger.store().read_counters(target).await.expect("counters"),
        TargetCounters::new(2, 0)
    );
}

#[tokio::test]
async fn comments_are_voted_like_threads() {
    let comment = TargetId::Comment(CommentId::new_v4());
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(comment, TargetCounters::new(0, 0)),
    );
    let heidi = user();
    let mut view = ledger.open_view(Some(&heidi), comment).await.expect("open");

    ledger
        .cast_vote(Some(&heidi), &mut view, Polarity::Down)
        .await
        .expect("down");
    assert_eq!(view.score(), -1);
    assert_eq!(
        ledger.store().read_counters(comment).await.expect("counters"),
        TargetCounters::new(0, 1)
    );
}

#[tokio::test]
async fn refresh_view_picks_up_other_voters() {
    let target = thread();
    let ledger = VoteLedger::new(
        InMemoryRecordStore::new().with_target(target, TargetCounters::default()),
    );
    let ivan = user();
    let judy = user();

    let mut ivan_view = ledger.open_view(Some(&ivan), target).await.expect("open");
    let mut judy_view = ledger.open_view(Some(&judy), target).await.expect("open");
    ledger
        .cast_vote(Some(&judy), &mut judy_view, Polarity::Up)
        .await
        .expect("judy up");
    assert_eq!(ivan_view.score(), 0);

    ledger.refresh_view(&mut ivan_view).await.expect("refresh");
    assert_eq!(ivan_view.score(), 1);
    assert_eq!(ivan_view.current_vote, None);
}
