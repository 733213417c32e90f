mod common;

use common::{ORDER, id_of, insert_order, open};
use nanoorm::{
    Collection, Connection, Dialect, Entity, KeyValue, MutableCollection, OrderBy, Value,
};

fn seed(handle: &nanoorm::Handle) {
    for _ in 0..23 {
        insert_order(handle, 1, "open");
    }
    for _ in 0..4 {
        insert_order(handle, 2, "closed");
    }
}

#[test]
fn sqlite_pages_in_memory() {
    let (conn, handle) = open();
    assert_eq!(conn.dialect(), Dialect::Sqlite);
    seed(&handle);

    let mut orders = Collection::new(&ORDER, handle.clone());
    orders
        .filter_any_field_eq("status", "open")
        .filter_order_field([OrderBy::asc("id")])
        .filter_offset(10)
        .filter_limit(5);

    assert_eq!(orders.len().unwrap(), 5);
    assert_eq!(orders.total_rows().unwrap(), 23);
    let ids: Vec<i64> = orders.iter().unwrap().map(id_of).collect();
    assert_eq!(ids, vec![11, 12, 13, 14, 15]);
    // paging never leaves a transaction open
    assert!(!handle.in_transaction());
}

#[test]
fn sqlite_offset_past_the_end_is_empty() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut orders = Collection::new(&ORDER, handle);
    orders.filter_any_field_eq("status", "closed").filter_offset(10);
    assert!(orders.is_empty().unwrap());
    assert_eq!(orders.total_rows().unwrap(), 4);
}

#[test]
fn sqlite_not_eq_descending_order_and_external_filter() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut orders = Collection::new(&ORDER, handle);
    orders
        .filter_any_field_not_eq("status", "open")
        .filter_order_field([OrderBy::desc("id")])
        .filter_external(|select| Ok(select.filter("id > :floor").bind("floor", 25i64)));

    let ids: Vec<i64> = orders.iter().unwrap().map(id_of).collect();
    assert_eq!(ids, vec![27, 26]);
}

#[test]
fn sqlite_or_group_stays_inside_other_filters() {
    let (_conn, handle) = open();
    insert_order(&handle, 7, "held");
    insert_order(&handle, 7, "open");
    insert_order(&handle, 8, "closed");
    insert_order(&handle, 8, "held");

    let mut orders = Collection::new(&ORDER, handle);
    orders
        .filter_any_field_eq("customer_id", 7i64)
        .filter_external(|select| Ok(select.or_filter(["status = 'held'", "status = 'closed'"])));

    let customers: Vec<i64> = orders
        .iter()
        .unwrap()
        .map(|o| o.get_as::<i64>("customer_id").unwrap())
        .collect();
    assert_eq!(customers, vec![7]);
}

#[test]
fn sqlite_registered_contributor_filters() {
    let (_conn, handle) = open();
    seed(&handle);
    insert_order(&handle, 3, "held");

    let mut orders = Collection::new(&ORDER, handle);
    orders.filter_by("status_in", KeyValue::list(["held", "closed"]));
    assert_eq!(orders.len().unwrap(), 5);
}

#[test]
fn sqlite_batch_save_commits_every_item() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut closed = Collection::new(&ORDER, handle.clone());
    closed.filter_any_field_eq("status", "closed");
    for order in closed.iter_mut().unwrap() {
        order.set("total", 9.5);
    }
    closed.save().unwrap();

    let mut check = Collection::new(&ORDER, handle.clone());
    check.filter_any_field_eq("total", 9.5);
    assert_eq!(check.len().unwrap(), 4);
    assert!(!handle.in_transaction());
}

#[test]
fn sqlite_batch_save_rolls_back_on_failure() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut closed = Collection::new(&ORDER, handle.clone());
    closed
        .filter_any_field_eq("status", "closed")
        .filter_order_field([OrderBy::asc("id")]);
    let items = closed.iter_mut().unwrap().collect::<Vec<_>>();
    let count = items.len();
    for (i, order) in items.into_iter().enumerate() {
        if i + 1 == count {
            order.set("status", Value::Null);
        } else {
            order.set("total", 1.0);
        }
    }

    assert!(closed.save().is_err());
    assert!(!handle.in_transaction());

    let mut check = Collection::new(&ORDER, handle);
    check.filter_any_field_eq("total", 1.0);
    assert_eq!(check.len().unwrap(), 0);
}

#[test]
fn sqlite_read_only_collection_rejects_writes() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut orders = Collection::new(&ORDER, handle.clone());
    assert!(orders.remove(0).unwrap_err().is_usage());
    let fresh = Entity::new(&ORDER, handle);
    assert!(orders.replace(0, fresh).unwrap_err().is_usage());
}

#[test]
fn sqlite_mutable_collection_deletes_on_save() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut closed = MutableCollection::new(&ORDER, handle.clone());
    closed.filter_any_field_eq("status", "closed");
    assert_eq!(closed.len().unwrap(), 4);

    closed.remove(0).unwrap();
    closed.remove(0).unwrap();
    let mut added = Entity::new(&ORDER, handle.clone());
    added.set("customer_id", 2i64).set("status", "closed");
    closed.push(added).unwrap();
    closed.save().unwrap();

    let mut check = Collection::new(&ORDER, handle);
    check
        .filter_any_field_eq("status", "closed")
        .filter_order_field([OrderBy::asc("id")]);
    let ids: Vec<i64> = check.iter().unwrap().map(id_of).collect();
    assert_eq!(ids, vec![26, 27, 28]);
}

#[test]
fn sqlite_mutable_collection_auto_commit() {
    let (_conn, handle) = open();
    seed(&handle);

    let mut closed = MutableCollection::new(&ORDER, handle.clone());
    closed.set_auto_commit(true);
    closed.filter_any_field_eq("status", "closed");
    closed.remove(3).unwrap();

    let mut check = Collection::new(&ORDER, handle.clone());
    check.filter_any_field_eq("status", "closed");
    assert_eq!(check.len().unwrap(), 3);

    let mut replacement = Entity::new(&ORDER, handle.clone());
    replacement.set("customer_id", 5i64).set("status", "closed");
    closed.set(0, replacement).unwrap();

    let mut check = Collection::new(&ORDER, handle);
    check.filter_any_field_eq("customer_id", 5i64);
    assert_eq!(check.len().unwrap(), 1);
}
