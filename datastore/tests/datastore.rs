use std::sync::Arc;

use bytes::Bytes;
use common::storage::config::{LocalObjectStoreConfig, ObjectStoreConfig, SlateDbEngineConfig};
use common::storage::in_memory::{FailingEngine, InMemoryEngine};
use common::{EngineConfig, EngineError};
use datastore::{
    Config, Datastore, Error, Key, KeyOrder, LevelDatastore, Options, Pair, Query, ValueOrder,
};
use futures::TryStreamExt;
use rstest::rstest;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn key(s: &str) -> Key {
    Key::new(s).unwrap()
}

fn keys_of(pairs: &[Pair]) -> Vec<&str> {
    pairs.iter().map(|p| p.key.as_str()).collect()
}

#[derive(Clone, Copy, Debug)]
enum Shape {
    Pull,
    Callback,
}

/// Opens a store over an in-memory engine, keeping a handle to the engine
/// so tests can inspect live cursors.
async fn open_store(shape: Shape) -> (LevelDatastore, Arc<InMemoryEngine>) {
    init_tracing();
    let engine = Arc::new(match shape {
        Shape::Pull => InMemoryEngine::new(),
        Shape::Callback => InMemoryEngine::new().with_callback_cursors(),
    });
    let store = LevelDatastore::with_engine(engine.clone()).unwrap();
    store.open().await.unwrap();
    (store, engine)
}

async fn open_failing_store() -> (LevelDatastore, Arc<FailingEngine>, Arc<InMemoryEngine>) {
    init_tracing();
    let inner = Arc::new(InMemoryEngine::new());
    let engine = FailingEngine::wrap(inner.clone());
    let store = LevelDatastore::with_engine(engine.clone()).unwrap();
    store.open().await.unwrap();
    (store, engine, inner)
}

async fn seed_numbers(store: &LevelDatastore) {
    let mut batch = store.batch().unwrap();
    for i in 1..=10u8 {
        batch.put(key(&format!("/n/{:02}", i)), Bytes::from(vec![i]));
    }
    batch.commit().await.unwrap();
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_return_put_value(#[case] shape: Shape) {
    // given
    let (store, _) = open_store(shape).await;

    // when
    store.put(&key("/a/b"), Bytes::from("value")).await.unwrap();

    // then
    assert_eq!(store.get(&key("/a/b")).await.unwrap(), Bytes::from("value"));
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_report_deleted_key_as_missing(#[case] shape: Shape) {
    // given
    let (store, _) = open_store(shape).await;
    store.put(&key("/a"), Bytes::from("1")).await.unwrap();

    // when
    store.delete(&key("/a")).await.unwrap();
    store.delete(&key("/a")).await.unwrap();

    // then
    assert!(store.get(&key("/a")).await.unwrap_err().is_not_found());
    assert!(!store.has(&key("/a")).await.unwrap());
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_match_prefix_natively(#[case] shape: Shape) {
    // given
    let (store, engine) = open_store(shape).await;
    for k in ["/a", "/ab", "/ac", "/b"] {
        store.put(&key(k), Bytes::from("v")).await.unwrap();
    }

    // when
    let pairs = store
        .query(Query::builder().prefix(key("/a")).build())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    // then
    assert_eq!(keys_of(&pairs), vec!["/a", "/ab", "/ac"]);
    assert_eq!(engine.open_cursors(), 0);
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_yield_prefix_scan_in_engine_order(#[case] shape: Shape) {
    // given
    let (store, _) = open_store(shape).await;
    store.put(&key("/x/1"), Bytes::from_static(&[0x01])).await.unwrap();
    store.put(&key("/x/2"), Bytes::from_static(&[0x02])).await.unwrap();
    store.put(&key("/y/1"), Bytes::from_static(&[0x03])).await.unwrap();

    // when
    let pairs = store
        .query(Query::builder().prefix(key("/x")).build())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    // then
    assert_eq!(
        pairs,
        vec![
            Pair::new(key("/x/1"), Bytes::from_static(&[0x01])),
            Pair::new(key("/x/2"), Bytes::from_static(&[0x02])),
        ]
    );
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_compose_orders_offset_and_limit(#[case] shape: Shape) {
    // given
    let (store, engine) = open_store(shape).await;
    seed_numbers(&store).await;
    let query = Query::builder()
        .order_by(ValueOrder { descending: true })
        .offset(2)
        .limit(3)
        .build();

    // when
    let pairs = store.query(query).await.unwrap().collect().await.unwrap();

    // then
    let values: Vec<u8> = pairs.iter().map(|p| p.value.as_ref().unwrap()[0]).collect();
    assert_eq!(values, vec![8, 7, 6]);
    assert_eq!(engine.open_cursors(), 0);
}

#[tokio::test]
async fn should_apply_filters_in_sequence_before_offset() {
    // given
    let (store, _) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;
    let query = Query::builder()
        .filter(|pair| Ok(pair.value.as_ref().is_some_and(|v| v[0] % 2 == 0)))
        .filter(|pair| Ok(pair.key.as_str() != "/n/04"))
        .offset(1)
        .build();

    // when
    let pairs = store.query(query).await.unwrap().collect().await.unwrap();

    // then
    assert_eq!(keys_of(&pairs), vec!["/n/06", "/n/08", "/n/10"]);
}

#[tokio::test]
async fn should_break_ties_with_later_sort_pass() {
    // given
    let (store, _) = open_store(Shape::Pull).await;
    store.put(&key("/a"), Bytes::from_static(&[1])).await.unwrap();
    store.put(&key("/b"), Bytes::from_static(&[2])).await.unwrap();
    store.put(&key("/c"), Bytes::from_static(&[1])).await.unwrap();
    let query = Query::builder()
        .order_by(KeyOrder { descending: true })
        .order_by(ValueOrder { descending: false })
        .build();

    // when
    let pairs = store.query(query).await.unwrap().collect().await.unwrap();

    // then
    assert_eq!(keys_of(&pairs), vec!["/c", "/a", "/b"]);
}

#[tokio::test]
async fn should_strip_values_for_keys_only_queries() {
    // given
    let (store, _) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;
    let query = Query::builder()
        .keys_only(true)
        .order_by(KeyOrder { descending: true })
        .limit(2)
        .build();

    // when
    let pairs = store.query(query).await.unwrap().collect().await.unwrap();

    // then
    assert_eq!(keys_of(&pairs), vec!["/n/10", "/n/09"]);
    assert!(pairs.iter().all(|p| p.value.is_none()));
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_order_keys_only_query_by_value(#[case] shape: Shape) {
    // given
    let (store, _) = open_store(shape).await;
    store.put(&key("/a"), Bytes::from_static(&[3])).await.unwrap();
    store.put(&key("/b"), Bytes::from_static(&[1])).await.unwrap();
    store.put(&key("/c"), Bytes::from_static(&[2])).await.unwrap();
    let query = Query::builder()
        .order_by(ValueOrder { descending: true })
        .build();

    // when
    let keys = store.query_keys(query).await.unwrap().collect().await.unwrap();

    // then
    assert_eq!(keys, vec![key("/a"), key("/c"), key("/b")]);
}

#[tokio::test]
async fn should_filter_keys_only_query_on_values() {
    // given
    let (store, _) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;
    let query = Query::builder()
        .keys_only(true)
        .filter(|pair| Ok(pair.value.as_ref().is_some_and(|v| v[0] > 8)))
        .build();

    // when
    let pairs = store.query(query).await.unwrap().collect().await.unwrap();

    // then
    assert_eq!(keys_of(&pairs), vec!["/n/09", "/n/10"]);
    assert!(pairs.iter().all(|p| p.value.is_none()));
}

#[tokio::test]
async fn should_return_everything_for_root_prefix() {
    // given
    let (store, _) = open_store(Shape::Pull).await;
    store.put(&key("/a"), Bytes::new()).await.unwrap();
    store.put(&key("/b/c"), Bytes::new()).await.unwrap();

    // when
    let keys = store
        .query_keys(Query::builder().prefix(Key::root()).build())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    // then
    assert_eq!(keys, vec![key("/a"), key("/b/c")]);
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_close_cursor_when_limit_reached(#[case] shape: Shape) {
    // given
    let (store, engine) = open_store(shape).await;
    seed_numbers(&store).await;
    let mut iter = store
        .query(Query::builder().limit(2).build())
        .await
        .unwrap();

    // when
    iter.next().await.unwrap();
    iter.next().await.unwrap();

    // then
    assert_eq!(engine.open_cursors(), 0);
    assert_eq!(iter.next().await.unwrap(), None);
}

#[tokio::test]
async fn should_return_nothing_for_zero_limit() {
    // given
    let (store, engine) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;

    // when
    let pairs = store
        .query(Query::builder().limit(0).build())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    // then
    assert!(pairs.is_empty());
    assert_eq!(engine.open_cursors(), 0);
}

#[rstest]
#[case(Shape::Pull)]
#[case(Shape::Callback)]
#[tokio::test]
async fn should_close_cleanly_after_abandoned_query(#[case] shape: Shape) {
    // given
    let (store, engine) = open_store(shape).await;
    seed_numbers(&store).await;
    let mut iter = store.query(Query::all()).await.unwrap();
    iter.next().await.unwrap();

    // when
    iter.close().await.unwrap();

    // then
    assert_eq!(engine.open_cursors(), 0);
    store.close().await.unwrap();
}

#[tokio::test]
async fn should_refuse_to_close_while_cursor_is_live() {
    // given
    let (store, _) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;
    let mut iter = store.query(Query::all()).await.unwrap();
    iter.next().await.unwrap();

    // when
    let result = store.close().await;

    // then
    assert!(matches!(result, Err(Error::CloseFailed(_))));
    assert!(store.is_open());
    iter.close().await.unwrap();
    store.close().await.unwrap();
}

#[tokio::test]
async fn should_run_independent_queries_concurrently() {
    // given
    let (store, engine) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;
    let mut first = store.query(Query::all()).await.unwrap();
    let mut second = store
        .query(Query::builder().prefix(key("/n/1")).build())
        .await
        .unwrap();

    // when
    let a = first.next().await.unwrap().unwrap();
    let b = second.next().await.unwrap().unwrap();
    assert_eq!(engine.open_cursors(), 2);
    second.close().await.unwrap();
    let rest = first.collect().await.unwrap();

    // then
    assert_eq!(a.key, key("/n/01"));
    assert_eq!(b.key, key("/n/10"));
    assert_eq!(rest.len(), 9);
    assert_eq!(engine.open_cursors(), 0);
}

#[tokio::test]
async fn should_stream_query_results() {
    // given
    let (store, _) = open_store(Shape::Callback).await;
    seed_numbers(&store).await;

    // when
    let pairs: Vec<Pair> = store
        .query(Query::builder().prefix(key("/n/0")).build())
        .await
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();

    // then
    assert_eq!(pairs.len(), 9);
}

#[tokio::test]
async fn should_close_cursor_and_surface_filter_error() {
    // given
    let (store, engine) = open_store(Shape::Pull).await;
    seed_numbers(&store).await;
    let query = Query::builder()
        .filter(|pair| {
            if pair.key.as_str() == "/n/03" {
                Err(Error::query("bad pair"))
            } else {
                Ok(true)
            }
        })
        .build();
    let mut iter = store.query(query).await.unwrap();

    // when
    iter.next().await.unwrap();
    iter.next().await.unwrap();
    let result = iter.next().await;

    // then
    assert_eq!(result, Err(Error::Query("bad pair".to_string())));
    assert_eq!(engine.open_cursors(), 0);
    assert_eq!(iter.next().await.unwrap(), None);
}

#[tokio::test]
async fn should_close_cursor_and_surface_order_error() {
    // given
    let (store, engine) = open_store(Shape::Callback).await;
    seed_numbers(&store).await;
    let query = Query::builder()
        .order(|_, _| Err(Error::query("incomparable")))
        .build();
    let mut iter = store.query(query).await.unwrap();

    // when
    let result = iter.next().await;

    // then
    assert_eq!(result, Err(Error::Query("incomparable".to_string())));
    assert_eq!(engine.open_cursors(), 0);
}

#[tokio::test]
async fn should_close_cursor_on_engine_error() {
    // given
    let (store, engine, inner) = open_failing_store().await;
    seed_numbers(&store).await;
    let mut iter = store.query(Query::all()).await.unwrap();
    iter.next().await.unwrap();

    // when
    engine.fail_next_once(EngineError::Storage("io error".to_string()));
    let result = iter.next().await;

    // then
    assert!(matches!(result, Err(Error::ReadFailed(_))));
    assert_eq!(inner.open_cursors(), 0);
    store.close().await.unwrap();
}

#[tokio::test]
async fn should_apply_batch_atomically_or_not_at_all() {
    // given
    let (store, engine, _) = open_failing_store().await;
    store.put(&key("/b"), Bytes::from("old")).await.unwrap();
    let ops = |store: &LevelDatastore| {
        let mut batch = store.batch().unwrap();
        batch.put(key("/a"), Bytes::from("1"));
        batch.delete(key("/b"));
        batch.put(key("/c"), Bytes::from("2"));
        batch
    };

    // when
    engine.fail_write_once(EngineError::Storage("disk full".to_string()));
    let failed = ops(&store).commit().await;

    // then
    assert!(matches!(failed, Err(Error::WriteFailed(_))));
    assert!(!store.has(&key("/a")).await.unwrap());
    assert!(store.has(&key("/b")).await.unwrap());
    assert!(!store.has(&key("/c")).await.unwrap());

    // when
    ops(&store).commit().await.unwrap();

    // then
    assert!(store.has(&key("/a")).await.unwrap());
    assert!(!store.has(&key("/b")).await.unwrap());
    assert!(store.has(&key("/c")).await.unwrap());
}

#[tokio::test]
async fn should_keep_pending_batch_intact_after_unrelated_failure() {
    // given
    let (store, engine, _) = open_failing_store().await;
    let mut batch = store.batch().unwrap();
    batch.put(key("/a"), Bytes::from("1"));

    // when
    engine.fail_write_once(EngineError::Storage("disk full".to_string()));
    let failed = store.put(&key("/z"), Bytes::from("x")).await;
    batch.put(key("/b"), Bytes::from("2"));
    batch.commit().await.unwrap();

    // then
    assert!(matches!(failed, Err(Error::WriteFailed(_))));
    assert!(store.has(&key("/a")).await.unwrap());
    assert!(store.has(&key("/b")).await.unwrap());
}

#[tokio::test]
async fn should_wrap_engine_read_errors() {
    // given
    let (store, engine, _) = open_failing_store().await;
    engine.fail_get(EngineError::Storage("corrupt".to_string()));

    // when
    let get = store.get(&key("/a")).await;
    let has = store.has(&key("/a")).await;

    // then
    assert!(matches!(get, Err(Error::ReadFailed(_))));
    assert!(matches!(has, Err(Error::ReadFailed(_))));
}

#[tokio::test]
async fn should_wrap_engine_delete_errors() {
    let (store, engine, _) = open_failing_store().await;
    engine.fail_write(EngineError::Storage("read-only".to_string()));

    let result = store.delete(&key("/a")).await;

    assert!(matches!(result, Err(Error::DeleteFailed(_))));
}

#[tokio::test]
async fn should_stay_unopened_after_failed_open() {
    // given
    init_tracing();
    let engine = FailingEngine::wrap(Arc::new(InMemoryEngine::new()));
    let store = LevelDatastore::with_engine(engine.clone()).unwrap();
    engine.fail_open_once(EngineError::Storage("LOCK held by another process".to_string()));

    // when
    let first = store.open().await;

    // then
    assert!(matches!(first, Err(Error::OpenFailed(_))));
    assert_eq!(store.get(&key("/a")).await, Err(Error::NotOpen));
    store.open().await.unwrap();
    assert!(store.is_open());
}

fn slatedb_config(dir: &tempfile::TempDir, options: Options) -> Config {
    Config {
        engine: EngineConfig::SlateDb(SlateDbEngineConfig {
            path: "datastore".to_string(),
            object_store: ObjectStoreConfig::Local(LocalObjectStoreConfig {
                path: dir.path().to_string_lossy().into_owned(),
            }),
            settings_path: None,
        }),
        options,
    }
}

#[tokio::test]
async fn should_query_prefix_on_slatedb() {
    // given
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = LevelDatastore::new(slatedb_config(&dir, Options::default())).unwrap();
    store.open().await.unwrap();
    store.put(&key("/x/1"), Bytes::from_static(&[0x01])).await.unwrap();
    store.put(&key("/x/2"), Bytes::from_static(&[0x02])).await.unwrap();
    store.put(&key("/y/1"), Bytes::from_static(&[0x03])).await.unwrap();

    // when
    let pairs = store
        .query(Query::builder().prefix(key("/x")).build())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    // then
    assert_eq!(
        pairs,
        vec![
            Pair::new(key("/x/1"), Bytes::from_static(&[0x01])),
            Pair::new(key("/x/2"), Bytes::from_static(&[0x02])),
        ]
    );
    assert!(!store.has(&key("/x/3")).await.unwrap());
    store.close().await.unwrap();
}

#[tokio::test]
async fn should_persist_across_reopen_on_slatedb() {
    // given
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let first = LevelDatastore::new(slatedb_config(&dir, Options::default())).unwrap();
    first.open().await.unwrap();
    let mut batch = first.batch().unwrap();
    batch.put(key("/a"), Bytes::from("1"));
    batch.put(key("/b"), Bytes::from("2"));
    batch.commit().await.unwrap();
    let mut iter = first.query(Query::all()).await.unwrap();
    iter.next().await.unwrap();
    iter.close().await.unwrap();
    first.close().await.unwrap();

    // when
    let second = LevelDatastore::new(slatedb_config(&dir, Options::default())).unwrap();
    second.open().await.unwrap();

    // then
    assert_eq!(second.get(&key("/b")).await.unwrap(), Bytes::from("2"));
    second.close().await.unwrap();
}

#[tokio::test]
async fn should_fail_open_on_missing_slatedb_without_create() {
    // given
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        create_if_missing: false,
        ..Options::default()
    };
    let store = LevelDatastore::new(slatedb_config(&dir, options)).unwrap();

    // when
    let result = store.open().await;

    // then
    assert!(matches!(result, Err(Error::OpenFailed(_))));
    assert!(!store.is_open());
}
