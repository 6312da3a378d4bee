mod common;

use common::Schema;
use rod_db::{Database, DatabaseConfig, DbError, Object, Registry, Value};
use tempfile::TempDir;

/// Users and shelves in one database, accounts and books in another.
fn split(tmp: &TempDir, schema: &Schema) -> (Registry, uuid::Uuid, uuid::Uuid) {
    let people = Database::create(
        tmp.path().join("people"),
        DatabaseConfig::default(),
        &[schema.user.clone(), schema.shelf.clone(), schema.owner.clone()],
    )
    .unwrap();
    let things = Database::create(
        tmp.path().join("things"),
        DatabaseConfig::default(),
        &[schema.account.clone(), schema.book.clone()],
    )
    .unwrap();
    let mut registry = Registry::new();
    let people = registry.register_database(people).unwrap();
    let things = registry.register_database(things).unwrap();
    (registry, people, things)
}

#[test]
fn store_routes_to_the_bound_database() {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new();
    let (mut registry, people, things) = split(&tmp, &schema);

    let mut acct = Object::new(schema.account.clone());
    acct.set("login", "erin").unwrap();
    acct.set("balance", 3.5).unwrap();
    registry.store(&mut acct).unwrap();

    assert_eq!(registry.database(things).unwrap().count("Account").unwrap(), 1);
    assert!(matches!(
        registry.database(people).unwrap().count("Account"),
        Err(DbError::UnknownResource(_))
    ));
    assert_eq!(registry.database_for("Account", None).unwrap().id(), things);
}

#[test]
fn deferred_updates_cross_databases() {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new();
    let (mut registry, people, _) = split(&tmp, &schema);

    let mut acct = Object::new(schema.account.clone());
    acct.set("login", "frank").unwrap();
    acct.set("balance", 0.25).unwrap();
    let mut frank = Object::new(schema.user.clone());
    frank.set("name", "frank").unwrap();
    frank.set("age", 52i64).unwrap();
    frank.link("account", Some(&acct)).unwrap();

    registry.store(&mut frank).unwrap();
    assert_eq!(registry.database(people).unwrap().pending_updates(), 1);

    let due = registry.store(&mut acct).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(registry.database(people).unwrap().pending_updates(), 0);

    let loaded = registry.load("User", frank.rod_id()).unwrap();
    let reference = loaded.get("account").and_then(Value::as_reference).unwrap();
    let account = registry.find_by_rod_id(reference).unwrap();
    assert_eq!(account.get("login").and_then(Value::as_str), Some("frank"));
}

#[test]
fn collections_resolve_across_databases() {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new();
    let (mut registry, _, _) = split(&tmp, &schema);

    let mut shelf = Object::new(schema.shelf.clone());
    shelf.set("title", "poetry").unwrap();
    let mut books: Vec<Object> = ["Ariel", "Howl"]
        .into_iter()
        .map(|title| {
            let mut book = Object::new(schema.book.clone());
            book.set("title", title).unwrap();
            book
        })
        .collect();
    for book in &books {
        shelf.collection_mut("books").unwrap().append(book);
    }
    registry.store(&mut shelf).unwrap();
    for book in &mut books {
        registry.store(book).unwrap();
    }

    let loaded = registry.load("Shelf", shelf.rod_id()).unwrap();
    let collection = loaded.collection("books").unwrap();
    let second = collection.get(1, &registry).unwrap().unwrap();
    assert_eq!(second.get("title").and_then(Value::as_str), Some("Howl"));

    // a collection owned by another association is copied on save
    let mut owner = Object::new(schema.owner.clone());
    owner.set("name", "gia").unwrap();
    owner.set("things", collection.clone()).unwrap();
    registry.store(&mut owner).unwrap();

    let owner = registry.load("Owner", owner.rod_id()).unwrap();
    let things = owner.collection("things").unwrap();
    assert!(things.equals(collection, &registry).unwrap());
    let names: Vec<String> = things
        .references(&registry)
        .unwrap()
        .iter()
        .map(|r| r.resource().name().to_string())
        .collect();
    assert_eq!(names, ["Book", "Book"]);
}

#[test]
fn removed_database_is_no_longer_reachable() {
    let tmp = TempDir::new().unwrap();
    let schema = Schema::new();
    let (mut registry, _, things) = split(&tmp, &schema);

    let mut removed = registry.remove_database(things).unwrap();
    removed.close().unwrap();

    let mut acct = Object::new(schema.account.clone());
    acct.set("login", "hal").unwrap();
    acct.set("balance", 1.0).unwrap();
    assert!(matches!(
        registry.store(&mut acct),
        Err(DbError::NoDatabaseFor(_))
    ));
    assert_eq!(registry.len(), 1);
    registry.close_all().unwrap();
}
