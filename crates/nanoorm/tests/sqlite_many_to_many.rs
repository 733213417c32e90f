mod common;

use common::{ORDER, TAG, id_of, insert_order, open};
use nanoorm::{Connection, Entity, Handle, KeyValue, ManyToMany, OrderBy, Statement, Value};

fn insert_tag(handle: &Handle, label: &str) -> i64 {
    let mut tag = Entity::new(&TAG, handle.clone());
    tag.set("label", label);
    assert!(tag.save().unwrap());
    id_of(&tag)
}

fn link(handle: &Handle, order_id: i64, tag_id: i64) {
    nanoorm::Insert::into_table("main.order_tags")
        .set([("order_id", Value::BigInt(order_id)), ("tag_id", Value::BigInt(tag_id))])
        .run(handle.as_ref())
        .expect("link order and tag");
}

/// Three orders and three tags; order 1 is urgent and fragile, order 2 urgent.
fn seed(handle: &Handle) -> (Vec<i64>, Vec<i64>) {
    let orders: Vec<i64> = (0..3).map(|_| id_of(&insert_order(handle, 1, "open"))).collect();
    let tags: Vec<i64> = ["urgent", "fragile", "gift"]
        .into_iter()
        .map(|label| insert_tag(handle, label))
        .collect();
    link(handle, orders[0], tags[0]);
    link(handle, orders[0], tags[1]);
    link(handle, orders[1], tags[0]);
    (orders, tags)
}

fn labels(collection: &mut nanoorm::Collection) -> Vec<String> {
    collection
        .iter()
        .unwrap()
        .map(|tag| tag.get_as::<String>("label").unwrap())
        .collect()
}

#[test]
fn sqlite_junction_association_lists_linked_rows() {
    let (_conn, handle) = open();
    let (orders, _) = seed(&handle);

    let mut first = Entity::retrieve_by_primary_key(&ORDER, handle.clone(), Value::BigInt(orders[0]))
        .unwrap()
        .unwrap();
    let tags = first.many("tags").unwrap();
    tags.filter_order_field([OrderBy::asc("label")]);
    assert_eq!(labels(tags), vec!["fragile", "urgent"]);

    let mut third = Entity::retrieve_by_primary_key(&ORDER, handle, Value::BigInt(orders[2]))
        .unwrap()
        .unwrap();
    assert!(third.many("tags").unwrap().is_empty().unwrap());
}

#[test]
fn sqlite_resolver_from_the_other_side() {
    let (_conn, handle) = open();
    let (orders, tags) = seed(&handle);

    let mut urgent = ManyToMany::new(
        &TAG,
        "id",
        &ORDER,
        "id",
        "main.order_tags",
        "tag_id",
        "order_id",
        handle.clone(),
    )
    .unwrap();
    urgent.filter_my_records(Value::BigInt(tags[0])).unwrap();
    let collection = urgent.collection();
    collection.filter_order_field([OrderBy::asc("main.orders.id")]);
    let ids: Vec<i64> = collection.iter().unwrap().map(id_of).collect();
    assert_eq!(ids, vec![orders[0], orders[1]]);

    // narrowing the foreign side reloads the same collection
    urgent.filter_foreign_records(Value::BigInt(orders[1])).unwrap();
    let ids: Vec<i64> = urgent.collection().iter().unwrap().map(id_of).collect();
    assert_eq!(ids, vec![orders[1]]);
}

#[test]
fn sqlite_resolver_accepts_value_lists() {
    let (_conn, handle) = open();
    let (orders, _) = seed(&handle);

    let mut resolver = ManyToMany::new(
        &ORDER,
        "id",
        &TAG,
        "id",
        "main.order_tags",
        "order_id",
        "tag_id",
        handle.clone(),
    )
    .unwrap();
    resolver
        .filter_my_records(KeyValue::list([orders[1], orders[2]]))
        .unwrap();
    let mut collection = resolver.into_collection();
    assert_eq!(labels(&mut collection), vec!["urgent"]);
    assert!(!handle.in_transaction());
}

#[test]
fn sqlite_resolver_rejects_mismatched_values() {
    let (_conn, handle) = open();
    let mut resolver = ManyToMany::new(
        &ORDER,
        "id",
        &TAG,
        "id",
        "main.order_tags",
        "order_id",
        "tag_id",
        handle,
    )
    .unwrap();
    let record = KeyValue::record([("id", 1i64), ("other", 2i64)]);
    assert!(resolver.filter_my_records(record).is_err());
}
