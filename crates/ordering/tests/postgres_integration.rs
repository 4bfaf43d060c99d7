//! PostgreSQL order store tests.
//!
//! These tests share one PostgreSQL container and truncate its tables, so
//! they run serially.

use std::sync::Arc;

use common::{MemberEmail, OrderId, ProductId};
use ordering::{Order, OrderStore, PostgresOrderStore};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_ordering_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_details, orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn order_for(email: &str, products: &[(i64, &str, u32)]) -> Order {
    let mut order = Order::new(MemberEmail::new(email));
    for (id, name, quantity) in products {
        order.add_line(ProductId::new(*id), *name, *quantity);
    }
    order
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn commit_and_read_back_order_with_lines_in_order() {
    let store = get_test_store().await;
    let order = order_for("buyer@a.com", &[(2, "Gadget", 1), (1, "Widget", 3)]);
    store.commit(&order).await.unwrap();

    let loaded = store.get(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, order.id);
    assert_eq!(loaded.member_email, order.member_email);
    assert_eq!(loaded.status, order.status);
    assert_eq!(loaded.lines, order.lines);
}

#[tokio::test]
#[serial]
async fn get_unknown_order_is_none() {
    let store = get_test_store().await;
    assert!(store.get(OrderId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn failed_line_insert_rolls_back_header() {
    let store = get_test_store().await;
    let mut order = order_for("buyer@a.com", &[(1, "Widget", 1), (2, "Gadget", 1)]);
    order.lines[1].id = order.lines[0].id;

    assert!(store.commit(&order).await.is_err());
    assert_eq!(count(store.pool(), "orders").await, 0);
    assert_eq!(count(store.pool(), "order_details").await, 0);
}

#[tokio::test]
#[serial]
async fn deleting_order_cascades_to_lines() {
    let store = get_test_store().await;
    let order = order_for("buyer@a.com", &[(1, "Widget", 1), (2, "Gadget", 2)]);
    store.commit(&order).await.unwrap();

    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order.id.as_uuid())
        .execute(store.pool())
        .await
        .unwrap();
    assert_eq!(count(store.pool(), "order_details").await, 0);
}

#[tokio::test]
#[serial]
async fn list_by_requester_filters_and_keeps_lines() {
    let store = get_test_store().await;
    store
        .commit(&order_for("a@a.com", &[(1, "Widget", 1)]))
        .await
        .unwrap();
    store
        .commit(&order_for("b@a.com", &[(2, "Gadget", 2), (3, "Gizmo", 1)]))
        .await
        .unwrap();

    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 2);

    let mine = store
        .list_by_requester(&MemberEmail::new("b@a.com"))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].lines.len(), 2);
    assert_eq!(mine[0].lines[0].product_name, "Gadget");
}
