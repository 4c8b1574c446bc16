use std::sync::Arc;
use std::time::Duration;

use connpool::conn::Rows;
use connpool::debug::DebugConnectionFactory;
use connpool::errors::Result as ConnResult;
use connpool::pool::{ConnectionPool, PoolConfig};
use objcache::cache::{CacheConfig, ObjectCache};
use objcache::events::{CacheListener, ChangeEvent, ChangeKind, ListenerSet};
use objcache::key::CacheKey;
use objcache::router::CacheRouter;
use objcache::worker::{NotificationWorker, WorkerConfig, REFRESH_PAYLOAD};
use parking_lot::Mutex;
use sqlrepr::column::{SqlType, TableColumn};
use sqlrepr::ident::TableIdentity;
use sqlrepr::resolve::{StaticResolver, TableSchema};
use sqlrepr::value::SqlValue;

fn resolver() -> Arc<StaticResolver> {
    let customer = TableIdentity::intern(None, None, "customer");
    let orders = TableIdentity::intern(None, None, "orders");
    Arc::new(
        StaticResolver::new()
            .with_table(TableSchema {
                identity: customer.clone(),
                columns: vec![
                    TableColumn::new(customer.clone(), "id", SqlType::Int64),
                    TableColumn::new(customer.clone(), "region", SqlType::Utf8),
                    TableColumn::new(customer.clone(), "comment", SqlType::Utf8),
                ],
                key_columns: vec!["id".to_string()],
            })
            .with_table(TableSchema {
                identity: orders.clone(),
                columns: vec![
                    TableColumn::new(orders.clone(), "order_id", SqlType::Int64),
                    TableColumn::new(orders.clone(), "customer_id", SqlType::Int64)
                        .with_foreign_key(),
                    TableColumn::new(orders.clone(), "status", SqlType::Utf8),
                ],
                key_columns: vec!["order_id".to_string()],
            }),
    )
}

fn customer_rows(rows: &[(i64, &str, &str)]) -> Rows {
    let mut out = Rows::new(vec!["id".into(), "region".into(), "comment".into()]);
    for (id, region, comment) in rows {
        out.push(vec![
            SqlValue::Int64(*id),
            SqlValue::Utf8((*region).to_string()),
            SqlValue::Utf8((*comment).to_string()),
        ]);
    }
    out
}

fn order_rows(rows: &[(i64, i64, &str)]) -> Rows {
    let mut out = Rows::new(vec![
        "order_id".into(),
        "customer_id".into(),
        "status".into(),
    ]);
    for (order_id, customer_id, status) in rows {
        out.push(vec![
            SqlValue::Int64(*order_id),
            SqlValue::Int64(*customer_id),
            SqlValue::Utf8((*status).to_string()),
        ]);
    }
    out
}

fn pool_with<F>(handler: F) -> (ConnectionPool, Arc<DebugConnectionFactory>)
where
    F: Fn(&str) -> ConnResult<Rows> + Send + Sync + 'static,
{
    let factory = Arc::new(DebugConnectionFactory::new(handler));
    let pool = ConnectionPool::new(
        factory.clone(),
        PoolConfig {
            max_connections: 2,
            min_connections: 0,
            idle_timeout: Duration::from_secs(300),
        },
    );
    (pool, factory)
}

/// Listener that flattens every event into a string, in dispatch order.
#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.events.lock())
    }
}

impl CacheListener for RecordingListener {
    fn on_commit(&self, source: &str, sequence: u64, affected: &[String]) {
        self.events
            .lock()
            .push(format!("commit {source} {sequence} [{}]", affected.join(",")));
    }

    fn on_change(&self, event: &ChangeEvent) {
        let kind = match event.kind {
            ChangeKind::Inserted => "insert",
            ChangeKind::Updated => "update",
            ChangeKind::Removed => "remove",
        };
        self.events
            .lock()
            .push(format!("{kind} {}:{}", event.cache, event.key));
    }

    fn on_invalidated(&self, cache: &str) {
        self.events.lock().push(format!("invalidate {cache}"));
    }

    fn on_loaded(&self, cache: &str, key: &CacheKey) {
        self.events.lock().push(format!("loaded {cache}:{key}"));
    }
}

struct Fixture {
    router: CacheRouter,
    customers: Arc<ObjectCache>,
    orders: Arc<ObjectCache>,
    factory: Arc<DebugConnectionFactory>,
    listener: Arc<RecordingListener>,
}

fn fixture<F>(customers_config: CacheConfig, handler: F) -> Fixture
where
    F: Fn(&str) -> ConnResult<Rows> + Send + Sync + 'static,
{
    logutil::init_test();
    let resolver = resolver();
    let (pool, factory) = pool_with(handler);
    let listeners = ListenerSet::new();
    let listener = Arc::new(RecordingListener::default());
    listeners.register(listener.clone());

    let customers = Arc::new(
        ObjectCache::new(customers_config, resolver.as_ref(), listeners.clone()).unwrap(),
    );
    let orders = Arc::new(
        ObjectCache::new(
            CacheConfig::new("orders", "orders")
                .high_cardinality()
                .with_foreign_key("customer_id", "customers"),
            resolver.as_ref(),
            listeners.clone(),
        )
        .unwrap(),
    );

    let mut router = CacheRouter::new(pool, resolver, listeners);
    router.register(customers.clone());
    router.register(orders.clone());
    Fixture {
        router,
        customers,
        orders,
        factory,
        listener,
    }
}

fn east_customers(sql: &str) -> ConnResult<Rows> {
    if sql.contains("FROM customer") {
        Ok(customer_rows(&[(1, "east", "alpha"), (2, "east", "beta")]))
    } else {
        Ok(Rows::empty())
    }
}

#[tokio::test]
async fn satisfied_statement_answers_misses_without_round_trip() {
    let fx = fixture(CacheConfig::new("customers", "customer"), east_customers);

    let one = fx
        .customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    assert_eq!(one.field("comment"), Some(&SqlValue::Utf8("alpha".into())));

    // The base statement brought the full extent in; a key it did not
    // contain is a final miss, and a repeat is a plain hit.
    let missing = fx
        .customers
        .get(&CacheKey::single("99"), fx.router.pool())
        .await
        .unwrap();
    assert!(missing.is_none());
    let again = fx
        .customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap();
    assert!(again.is_some());

    assert_eq!(fx.factory.executed_count(), 1);
    let stats = fx.customers.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.round_trips, 1);
}

#[tokio::test]
async fn update_outside_criteria_is_ignored() {
    let fx = fixture(
        CacheConfig::new("customers", "customer").with_filter("region = 'east'"),
        east_customers,
    );

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    // comment is neither a key nor a loaded criterion; nothing to do.
    fx.router
        .apply_batch("db1", 1, "UPDATE customer SET comment = 'stale' WHERE id = 1")
        .await
        .unwrap();

    assert_eq!(fx.factory.executed_count(), 1);
    assert!(fx.listener.take().is_empty());
    let cached = fx.customers.cached(&CacheKey::single("1")).unwrap();
    assert_eq!(cached.field("comment"), Some(&SqlValue::Utf8("alpha".into())));
    assert_eq!(fx.customers.stats().notifications_skipped, 1);
}

#[tokio::test]
async fn point_loaded_cache_tracks_filter_criteria() {
    let fx = fixture(
        CacheConfig::new("customers", "customer")
            .high_cardinality()
            .with_filter("region = 'east'"),
        |sql| {
            if sql.contains("FROM customer") {
                Ok(customer_rows(&[(1, "east", "alpha")]))
            } else {
                Ok(Rows::empty())
            }
        },
    );

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    // Only point lookups ran, but each restated the region filter, so
    // region is a loaded criterion. The new value fails the filter and the
    // row leaves the cache without a round trip.
    fx.router
        .apply_batch("db1", 1, "UPDATE customer SET region = 'west' WHERE id = 1")
        .await
        .unwrap();

    assert!(fx.customers.cached(&CacheKey::single("1")).is_none());
    assert_eq!(fx.factory.executed_count(), 1);
    assert_eq!(fx.customers.stats().notifications_skipped, 0);
    assert_eq!(
        fx.listener.take(),
        vec![
            "commit db1 1 [customers]".to_string(),
            "remove customers:1".to_string(),
        ]
    );
}

#[tokio::test]
async fn criterion_update_moves_row_out_of_filtered_cache() {
    let fx = fixture(
        CacheConfig::new("customers", "customer").with_filter("region = 'east'"),
        east_customers,
    );

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    // region is a loaded criterion and the new value fails the filter: the
    // row leaves the cache without any round trip.
    fx.router
        .apply_batch("db1", 1, "UPDATE customer SET region = 'west' WHERE id = 1")
        .await
        .unwrap();
    assert!(fx.customers.cached(&CacheKey::single("1")).is_none());
    assert_eq!(fx.factory.executed_count(), 1);
    assert_eq!(
        fx.listener.take(),
        vec![
            "commit db1 1 [customers]".to_string(),
            "remove customers:1".to_string(),
        ]
    );

    // A new value satisfying the filter patches the entry in place.
    fx.router
        .apply_batch(
            "db1",
            2,
            "UPDATE customer SET region = 'east', comment = 'fresh' WHERE id = 2",
        )
        .await
        .unwrap();
    let cached = fx.customers.cached(&CacheKey::single("2")).unwrap();
    assert_eq!(cached.field("comment"), Some(&SqlValue::Utf8("fresh".into())));
    assert_eq!(fx.factory.executed_count(), 1);
    assert_eq!(
        fx.listener.take(),
        vec![
            "commit db1 2 [customers]".to_string(),
            "update customers:2".to_string(),
            "loaded customers:2".to_string(),
        ]
    );
}

#[tokio::test]
async fn unkeyed_delete_invalidates_whole_cache() {
    let fx = fixture(CacheConfig::new("customers", "customer"), east_customers);

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    fx.router
        .apply_batch("db1", 1, "DELETE FROM customer WHERE region = 'east'")
        .await
        .unwrap();

    assert!(fx.customers.is_empty());
    assert_eq!(
        fx.listener.take(),
        vec![
            "commit db1 1 [customers]".to_string(),
            "invalidate customers".to_string(),
        ]
    );

    // Next read bulk-reloads from the database.
    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 reloaded");
    assert_eq!(fx.factory.executed_count(), 2);
}

#[tokio::test]
async fn keyed_insert_synthesizes_row_without_round_trip() {
    let fx = fixture(CacheConfig::new("customers", "customer"), east_customers);

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    fx.router
        .apply_batch(
            "db1",
            1,
            "INSERT INTO customer (id, region, comment) VALUES (3, 'west', 'gamma')",
        )
        .await
        .unwrap();

    assert_eq!(fx.factory.executed_count(), 1);
    let cached = fx.customers.cached(&CacheKey::single("3")).unwrap();
    assert_eq!(cached.field("region"), Some(&SqlValue::Utf8("west".into())));
    assert_eq!(
        fx.listener.take(),
        vec![
            "commit db1 1 [customers]".to_string(),
            "insert customers:3".to_string(),
            "loaded customers:3".to_string(),
        ]
    );
}

#[tokio::test]
async fn batch_events_fire_in_commit_change_lifecycle_order() {
    let fx = fixture(CacheConfig::new("customers", "customer"), east_customers);

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    let payload = "INSERT INTO customer (id, region, comment) VALUES (3, 'west', 'gamma')\n\
                   DELETE FROM customer WHERE id = 1";
    fx.router.apply_batch("db1", 7, payload).await.unwrap();

    assert_eq!(
        fx.listener.take(),
        vec![
            "commit db1 7 [customers]".to_string(),
            "insert customers:3".to_string(),
            "remove customers:1".to_string(),
            "loaded customers:3".to_string(),
        ]
    );
}

#[tokio::test]
async fn foreign_keys_resolve_in_second_pass() {
    let fx = fixture(CacheConfig::new("customers", "customer"), |sql| {
        if sql.contains("FROM orders") {
            Ok(order_rows(&[(7, 1, "OPEN")]))
        } else if sql.contains("FROM customer") {
            Ok(customer_rows(&[(1, "east", "alpha")]))
        } else {
            Ok(Rows::empty())
        }
    });

    let order = fx
        .orders
        .get(&CacheKey::single("7"), fx.router.pool())
        .await
        .unwrap()
        .expect("order 7 loaded");
    let customer_ref = order
        .reference("customer_id")
        .expect("reference recorded")
        .clone()
        .expect("non-null reference");
    assert_eq!(customer_ref.cache, "customers");
    assert_eq!(customer_ref.key, CacheKey::single("1"));

    // A synthesized insert records its reference through the router's
    // deferred second pass.
    fx.router
        .apply_batch(
            "db1",
            1,
            "INSERT INTO orders (order_id, customer_id, status) VALUES (8, 2, 'OPEN')",
        )
        .await
        .unwrap();
    let inserted = fx.orders.cached(&CacheKey::single("8")).unwrap();
    let customer_ref = inserted
        .reference("customer_id")
        .expect("reference recorded")
        .clone()
        .expect("non-null reference");
    assert_eq!(customer_ref.key, CacheKey::single("2"));
}

#[tokio::test]
async fn worker_applies_refresh_and_stops() {
    let fx = fixture(CacheConfig::new("customers", "customer"), east_customers);

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    let router = Arc::new(fx.router);
    let worker = NotificationWorker::spawn(
        router.clone(),
        "db1",
        WorkerConfig {
            retry_delay: Duration::from_millis(10),
        },
    );

    worker
        .post("INSERT INTO customer (id, region, comment) VALUES (3, 'west', 'gamma')")
        .await
        .unwrap();
    worker.post(REFRESH_PAYLOAD).await.unwrap();
    worker.shutdown().await;

    assert!(fx.customers.is_empty());
    let events = fx.listener.take();
    assert_eq!(events[0], "commit db1 1 [customers]");
    assert!(events.contains(&"invalidate customers".to_string()));
}

#[tokio::test]
async fn failed_batch_falls_back_to_full_refresh() {
    let fx = fixture(CacheConfig::new("customers", "customer"), east_customers);

    fx.customers
        .get(&CacheKey::single("1"), fx.router.pool())
        .await
        .unwrap()
        .expect("row 1 loaded");
    fx.listener.take();

    let router = Arc::new(fx.router);
    let worker = NotificationWorker::spawn(
        router.clone(),
        "db1",
        WorkerConfig {
            retry_delay: Duration::from_millis(10),
        },
    );

    // Partially pinned insert forces a correlated re-fetch; failing both
    // the execute and its reconnect retry fails the batch.
    fx.factory.fail_next_executes(2);
    worker
        .post("INSERT INTO customer (id, region) VALUES (9, 'east')")
        .await
        .unwrap();
    worker.shutdown().await;

    assert!(fx.customers.is_empty());
    let events = fx.listener.take();
    assert!(events.contains(&"invalidate customers".to_string()));
}
