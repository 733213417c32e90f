#![allow(dead_code)]

use nanoorm::{Association, Entity, EntityMeta, Handle, Junction, KeyValue, Value};
use nanoorm_sqlite::SqliteConnection;
use std::sync::{Arc, LazyLock};

const SCHEMA: &str = "
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER,
        status TEXT NOT NULL DEFAULT 'open',
        total REAL
    );
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY,
        label TEXT NOT NULL
    );
    CREATE TABLE order_tags (
        order_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        PRIMARY KEY (order_id, tag_id)
    );
    CREATE TABLE order_lines (
        order_id INTEGER NOT NULL,
        line_no INTEGER NOT NULL,
        sku TEXT NOT NULL,
        PRIMARY KEY (order_id, line_no)
    );
";

pub static CUSTOMER: LazyLock<EntityMeta> = LazyLock::new(|| {
    EntityMeta::builder("main", "customers")
        .association("orders", Association::many(order, "id", "customer_id"))
        .build()
});

pub static ORDER: LazyLock<EntityMeta> = LazyLock::new(|| {
    EntityMeta::builder("main", "orders")
        .association("customer", Association::single(customer, "customer_id", "id"))
        .association(
            "tags",
            Association::many(tag, "id", "id")
                .via(Junction::new("main.order_tags", "order_id", "tag_id")),
        )
        .contributor("status_in", |_, values, select| match values {
            Some(KeyValue::ScalarList(list)) => {
                let names: Vec<String> =
                    (0..list.len()).map(|i| format!(":status_in_{}", i)).collect();
                let bindings: Vec<(String, Value)> = list
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (format!("status_in_{}", i), v.clone()))
                    .collect();
                Ok(select
                    .filter(format!("status IN ({})", names.join(", ")))
                    .bind_all(bindings))
            }
            _ => Ok(select),
        })
        .build()
});

pub static TAG: LazyLock<EntityMeta> = LazyLock::new(|| {
    EntityMeta::builder("main", "tags")
        .association(
            "orders",
            Association::many(order, "id", "id")
                .via(Junction::new("main.order_tags", "tag_id", "order_id")),
        )
        .build()
});

pub static LINE: LazyLock<EntityMeta> = LazyLock::new(|| {
    EntityMeta::builder("main", "order_lines")
        .primary_key(["order_id", "line_no"])
        .build()
});

pub fn customer() -> &'static EntityMeta {
    &CUSTOMER
}

pub fn order() -> &'static EntityMeta {
    &ORDER
}

pub fn tag() -> &'static EntityMeta {
    &TAG
}

/// A fresh in-memory database with the test schema.
pub fn open() -> (Arc<SqliteConnection>, Handle) {
    let conn = Arc::new(SqliteConnection::open_memory().expect("open sqlite memory db"));
    conn.execute_raw(SCHEMA).expect("create schema");
    let handle: Handle = conn.clone();
    (conn, handle)
}

pub fn insert_order(handle: &Handle, customer_id: i64, status: &str) -> Entity {
    let mut order = Entity::new(&ORDER, handle.clone());
    order.set("customer_id", customer_id).set("status", status);
    assert!(order.save().expect("insert order"));
    order
}

pub fn insert_customer(handle: &Handle, name: &str) -> Entity {
    let mut customer = Entity::new(&CUSTOMER, handle.clone());
    customer.set("name", name);
    assert!(customer.save().expect("insert customer"));
    customer
}

pub fn id_of(entity: &Entity) -> i64 {
    entity.get_as("id").expect("integer id")
}
