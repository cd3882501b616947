mod support;

use std::collections::{HashMap, HashSet};
use std::error::Error as _;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use catalog::model::{Difficulty, Strategy};
use delivery::config::DeliveryConfig;
use delivery::types::ALGORITHM_VERSION;
use delivery::{DeliveryError, DeliveryRequest, SessionType};
use tokio::task::JoinSet;
use tracing_test::traced_test;

use support::{SpyStore, attempt, question, questions, service, service_with};

fn distinct(ids: &[i64]) -> usize {
    ids.iter().collect::<HashSet<_>>().len()
}

#[tokio::test]
async fn quick_session_with_fresh_user_gets_unseen_priority() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..101, Difficulty::Medium, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("fresh-user", Difficulty::Medium, SessionType::Quick, 10);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.strategy, Strategy::UnseenPriority);
    assert_eq!(result.questions.len(), 10);
    assert_eq!(distinct(&result.question_ids()), 10);
    assert!(result.questions.iter().all(|q| q.difficulty == Difficulty::Medium));

    let meta = &result.metadata;
    assert_eq!(meta.total_pool_size, 100);
    assert_eq!(meta.unseen_pool_size, 100);
    assert_eq!(meta.history_size, 0);
    assert_eq!(meta.algorithm_version, ALGORITHM_VERSION);
    assert_eq!(meta.weights.unseen_weight, 1.0);
    assert!(!meta.trace_id.is_empty());
}

#[tokio::test]
async fn invalid_requests_fail_without_any_io() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..20, Difficulty::Easy, "general"))
        .await;
    let svc = service(store.clone());

    let base = DeliveryRequest::new("user", Difficulty::Easy, SessionType::Quick, 5);
    let bad = vec![
        DeliveryRequest {
            question_limit: 0,
            ..base.clone()
        },
        DeliveryRequest {
            question_limit: 101,
            ..base.clone()
        },
        DeliveryRequest {
            user_id: String::new(),
            ..base.clone()
        },
        DeliveryRequest {
            difficulty: "legendary".into(),
            ..base.clone()
        },
        DeliveryRequest {
            session_type: "marathon".into(),
            ..base.clone()
        },
    ];

    for req in bad {
        let err = svc.deliver(&req).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {:?}", err);
    }

    assert_eq!(store.total_reads(), 0);
    assert_eq!(store.log_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_pool_is_fatal_and_skips_history() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..30, Difficulty::Easy, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Hard, SessionType::Quick, 5);
    let err = svc.deliver(&req).await.unwrap_err();

    assert!(matches!(
        err,
        DeliveryError::InsufficientPool {
            difficulty: Difficulty::Hard
        }
    ));
    assert_eq!(store.catalog_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.history_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.unseen_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[traced_test]
async fn delivery_log_failure_does_not_fail_the_call() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..40, Difficulty::Easy, "general"))
        .await;
    store.fail_log.store(true, Ordering::SeqCst);
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Easy, SessionType::Timed, 8);
    let result = svc.deliver(&req).await.unwrap();
    assert_eq!(result.questions.len(), 8);

    store.wait_for_log().await;
    // Let the spawned task finish emitting its warning.
    tokio::task::yield_now().await;

    assert_eq!(store.log_calls.load(Ordering::SeqCst), 1);
    assert!(store.inner.delivery_log().await.is_empty());
    assert!(logs_contain("failed to write delivery log"));
}

#[tokio::test]
async fn successful_delivery_is_logged() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..40, Difficulty::Hard, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("logger-user", Difficulty::Hard, SessionType::Custom, 6);
    let result = svc.deliver(&req).await.unwrap();

    store.wait_for_log().await;
    let log = store.inner.delivery_log().await;

    assert_eq!(log.len(), 1);
    assert_eq!(log[0].user_id, "logger-user");
    assert_eq!(log[0].strategy, result.strategy);
    assert_eq!(log[0].question_ids, result.question_ids());
    assert_eq!(log[0].pool_size, 39);
    assert_eq!(log[0].unseen_size, 39);
}

#[tokio::test]
async fn awaiting_the_log_handle_guarantees_the_write() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..25, Difficulty::Easy, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("cli-user", Difficulty::Easy, SessionType::Quick, 4);
    let (result, log_write) = svc.deliver_with_log_handle(&req, Some(9)).await.unwrap();
    log_write.await.expect("log task panicked");

    let log = store.inner.delivery_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].question_ids, result.question_ids());

    // Same seed through the plain entry point picks the same questions.
    let again = svc.deliver_seeded(&req, 9).await.unwrap();
    assert_eq!(again.question_ids(), result.question_ids());
}

#[tokio::test]
async fn history_failure_propagates_as_upstream_error() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..20, Difficulty::Medium, "general"))
        .await;
    store.fail_history.store(true, Ordering::SeqCst);
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Medium, SessionType::Quick, 5);
    let err = svc.deliver(&req).await.unwrap_err();

    match err {
        DeliveryError::Upstream { operation, source } => {
            assert_eq!(operation, "fetch_interactions");
            let mut chain = vec![source.to_string()];
            let mut next = source.source();
            while let Some(cause) = next {
                chain.push(cause.to_string());
                next = cause.source();
            }
            assert!(chain.iter().any(|m| m.contains("progress service unavailable")));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
    assert_eq!(store.log_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn catalog_and_unseen_failures_propagate() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..20, Difficulty::Medium, "general"))
        .await;
    let svc = service(store.clone());
    let req = DeliveryRequest::new("user", Difficulty::Medium, SessionType::Quick, 5);

    store.fail_unseen.store(true, Ordering::SeqCst);
    let err = svc.deliver(&req).await.unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::Upstream {
            operation: "count_unseen",
            ..
        }
    ));

    store.fail_unseen.store(false, Ordering::SeqCst);
    store.fail_catalog.store(true, Ordering::SeqCst);
    let err = svc.deliver(&req).await.unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::Upstream {
            operation: "fetch_questions",
            ..
        }
    ));
}

#[tokio::test]
async fn review_mistakes_returns_mistakes_first() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..51, Difficulty::Easy, "general"))
        .await;
    for id in [3, 9, 14, 27, 40, 41] {
        store
            .inner
            .record_interaction(attempt("learner", id, Difficulty::Easy, false, 2))
            .await;
    }
    for id in [5, 6, 7] {
        store
            .inner
            .record_interaction(attempt("learner", id, Difficulty::Easy, true, 2))
            .await;
    }
    let svc = service(store.clone());

    let req = DeliveryRequest::new("learner", Difficulty::Easy, SessionType::ReviewMistakes, 5);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.strategy, Strategy::MistakeReview);
    assert_eq!(result.questions.len(), 5);
    let mistakes = [3, 9, 14, 27, 40, 41];
    assert!(result.question_ids().iter().all(|id| mistakes.contains(id)));

    // More room than mistakes: all six lead, then backfill.
    let req = DeliveryRequest::new("learner", Difficulty::Easy, SessionType::ReviewMistakes, 10);
    let result = svc.deliver(&req).await.unwrap();
    let ids = result.question_ids();
    let head: HashSet<_> = ids[..6].iter().copied().collect();
    assert_eq!(head, HashSet::from(mistakes));
    assert_eq!(distinct(&ids), 10);
}

#[tokio::test]
async fn high_coverage_selects_spaced_repetition() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..21, Difficulty::Medium, "general"))
        .await;
    for id in 1..18 {
        store
            .inner
            .record_interaction(attempt("veteran", id, Difficulty::Medium, id % 4 != 0, id % 10))
            .await;
    }
    let cfg = DeliveryConfig {
        min_unseen_pool_size: 2,
        ..DeliveryConfig::default()
    };
    let svc = service_with(cfg, store.clone());

    let req = DeliveryRequest::new("veteran", Difficulty::Medium, SessionType::Simulation, 10);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.strategy, Strategy::SpacedRepetition);
    assert_eq!(result.metadata.unseen_pool_size, 3);
    assert!(result.metadata.coverage_percentage > 80.0);
    assert_eq!(result.questions.len(), 10);
    assert_eq!(distinct(&result.question_ids()), 10);
}

#[tokio::test]
async fn moderate_coverage_selects_random_weighted() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..21, Difficulty::Hard, "general"))
        .await;
    for id in 1..11 {
        store
            .inner
            .record_interaction(attempt("mid", id, Difficulty::Hard, true, 3))
            .await;
    }
    let cfg = DeliveryConfig {
        min_unseen_pool_size: 5,
        ..DeliveryConfig::default()
    };
    let svc = service_with(cfg, store.clone());

    let req = DeliveryRequest::new("mid", Difficulty::Hard, SessionType::Timed, 15);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.strategy, Strategy::RandomWeighted);
    assert_eq!(result.questions.len(), 15);
    assert_eq!(distinct(&result.question_ids()), 15);
}

#[tokio::test]
async fn exhausted_unseen_pool_reshuffles() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..16, Difficulty::Easy, "general"))
        .await;
    for id in 1..16 {
        store
            .inner
            .record_interaction(attempt("done", id, Difficulty::Easy, true, 1))
            .await;
    }
    let svc = service(store.clone());

    let req = DeliveryRequest::new("done", Difficulty::Easy, SessionType::UnseenOnly, 5);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.strategy, Strategy::FallbackReshuffle);
    assert_eq!(result.metadata.unseen_pool_size, 0);
    assert_eq!(result.questions.len(), 5);
}

#[tokio::test]
async fn forced_strategy_is_honoured() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..30, Difficulty::Easy, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Easy, SessionType::Quick, 5)
        .with_strategy(Strategy::SpacedRepetition);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.strategy, Strategy::SpacedRepetition);
    assert_eq!(result.metadata.weights.time_decay_weight, 0.1);
}

#[tokio::test]
async fn mixed_topics_are_type_balanced() {
    let store = SpyStore::new();
    let mut rows = questions(1..11, Difficulty::Medium, "algebra");
    rows.extend(questions(11..14, Difficulty::Medium, "geometry"));
    rows.extend(questions(14..30, Difficulty::Medium, "statistics"));
    store.inner.insert_questions(rows).await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Medium, SessionType::Custom, 100)
        .with_topics(["algebra", "geometry"]);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.metadata.total_pool_size, 6);
    assert_eq!(result.questions.len(), 6);

    let mut per_type: HashMap<String, usize> = HashMap::new();
    for q in &result.questions {
        *per_type.entry(q.question_type.0.clone()).or_default() += 1;
    }
    assert_eq!(per_type.get("algebra"), Some(&3));
    assert_eq!(per_type.get("geometry"), Some(&3));
}

#[tokio::test]
async fn unknown_topics_fall_back_to_whole_pool() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..13, Difficulty::Medium, "algebra"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Medium, SessionType::Custom, 20)
        .with_topics(["poetry", "chemistry"]);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.metadata.total_pool_size, 12);
}

#[tokio::test]
async fn exclusions_and_difficulty_are_respected() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..11, Difficulty::Easy, "general"))
        .await;
    store
        .inner
        .insert_questions(questions(11..31, Difficulty::Hard, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Easy, SessionType::Quick, 100)
        .excluding([1, 2, 3]);
    let result = svc.deliver(&req).await.unwrap();

    let ids = result.question_ids();
    assert_eq!(ids.len(), 7);
    assert!(ids.iter().all(|id| (4..=10).contains(id)));
    assert!(result.questions.iter().all(|q| q.difficulty == Difficulty::Easy));
}

#[tokio::test]
async fn seeded_delivery_is_reproducible() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..200, Difficulty::Medium, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Medium, SessionType::Quick, 20);
    let a = svc.deliver_seeded(&req, 1234).await.unwrap();
    let b = svc.deliver_seeded(&req, 1234).await.unwrap();
    let c = svc.deliver_seeded(&req, 4321).await.unwrap();

    assert_eq!(a.question_ids(), b.question_ids());
    assert_ne!(a.question_ids(), c.question_ids());
}

#[tokio::test]
async fn preview_reports_selector_inputs_without_logging() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..101, Difficulty::Medium, "general"))
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Medium, SessionType::ReviewMistakes, 10);
    let preview = svc.preview_strategy(&req).await.unwrap();

    assert_eq!(preview.strategy, Strategy::MistakeReview);
    assert!(!preview.forced);
    assert_eq!(preview.pool_size, 100);
    assert_eq!(preview.unseen_count, 100);
    assert_eq!(store.log_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn single_difficulty_question_smaller_than_limit_returns_what_exists() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(vec![question(7, Difficulty::Hard, "general")])
        .await;
    let svc = service(store.clone());

    let req = DeliveryRequest::new("user", Difficulty::Hard, SessionType::Quick, 25);
    let result = svc.deliver(&req).await.unwrap();

    assert_eq!(result.question_ids(), vec![7]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_are_independent() {
    let store = SpyStore::new();
    store
        .inner
        .insert_questions(questions(1..301, Difficulty::Medium, "general"))
        .await;
    let svc = Arc::new(service(store.clone()));
    let mut set = JoinSet::new();

    for i in 0..32 {
        let svc = Arc::clone(&svc);
        set.spawn(async move {
            let req = DeliveryRequest::new(
                format!("user-{}", i % 4),
                Difficulty::Medium,
                SessionType::Quick,
                25,
            );
            svc.deliver(&req).await
        });
    }

    while let Some(res) = set.join_next().await {
        let result = res.expect("task panicked").expect("delivery failed");
        assert_eq!(result.questions.len(), 25);
        assert_eq!(distinct(&result.question_ids()), 25);
    }

    assert_eq!(store.catalog_calls.load(Ordering::SeqCst), 32);
}
