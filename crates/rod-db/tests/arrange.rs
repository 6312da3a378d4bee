use std::sync::Arc;

use rod_db::{
    Database, DatabaseConfig, FieldType, IndexKind, Object, Resource, ResourceBuilder, RodId,
    Value,
};
use tempfile::TempDir;

struct Family {
    node: Arc<Resource>,
    leaf: Arc<Resource>,
    holder: Arc<Resource>,
}

impl Family {
    fn new() -> Self {
        let node = ResourceBuilder::new("Node")
            .indexed_field("tag", FieldType::String, IndexKind::Btree)
            .has_one("partner", "Node")
            .build()
            .unwrap();
        let leaf = ResourceBuilder::new("Leaf")
            .inherits(&node)
            .field("weight", FieldType::Integer)
            .build()
            .unwrap();
        let holder = ResourceBuilder::new("Holder")
            .has_one("best", "Node")
            .has_many_polymorphic("all")
            .build()
            .unwrap();
        Self {
            node: Arc::new(node),
            leaf: Arc::new(leaf),
            holder: Arc::new(holder),
        }
    }

    fn all(&self) -> Vec<Arc<Resource>> {
        vec![self.node.clone(), self.leaf.clone(), self.holder.clone()]
    }

    fn node(&self, tag: &str) -> Object {
        let mut node = Object::new(self.node.clone());
        node.set("tag", tag).unwrap();
        node
    }

    fn leaf(&self, tag: &str, weight: i64) -> Object {
        let mut leaf = Object::new(self.leaf.clone());
        leaf.set("tag", tag).unwrap();
        leaf.set("weight", weight).unwrap();
        leaf
    }
}

fn tag_of(db: &Database, resource: &str, rod_id: RodId) -> String {
    let object = db.load(resource, rod_id).unwrap();
    object.get("tag").and_then(Value::as_str).unwrap().to_string()
}

fn ids(db: &Database, resource: &str) -> Vec<u64> {
    db.each(resource)
        .unwrap()
        .map(|object| object.unwrap().rod_id().get())
        .collect()
}

#[test]
fn arrange_on_open_keeps_every_reference() {
    let dir = TempDir::new().unwrap();
    let family = Family::new();
    let mut db = Database::create(dir.path(), DatabaseConfig::default(), &family.all()).unwrap();

    // interleave the two resources of the shared container
    let mut stored = Vec::new();
    for i in 0..6 {
        let mut object = if i % 2 == 0 {
            family.leaf(&format!("leaf-{i}"), i)
        } else {
            family.node(&format!("node-{i}"))
        };
        db.store(&mut object).unwrap();
        stored.push(object);
    }
    let mut holder = Object::new(family.holder.clone());
    holder.link("best", Some(&stored[2])).unwrap();
    for object in [&stored[5], &stored[0], &stored[3]] {
        holder.collection_mut("all").unwrap().append(object);
    }
    db.store(&mut holder).unwrap();
    db.close().unwrap();

    let config = DatabaseConfig {
        arrange_on_open: true,
        ..Default::default()
    };
    let db = Database::open(dir.path(), config, &family.all()).unwrap();

    // parents first, each resource in one run
    assert_eq!(ids(&db, "Node"), vec![1, 2, 3]);
    assert_eq!(ids(&db, "Leaf"), vec![4, 5, 6]);

    let loaded = db.load("Holder", holder.rod_id()).unwrap();
    let best = loaded.get("best").and_then(Value::as_reference).unwrap();
    assert_eq!(tag_of(&db, "Node", best.rod_id()), "leaf-2");

    let tags: Vec<String> = loaded
        .collection("all")
        .unwrap()
        .references(&db)
        .unwrap()
        .iter()
        .map(|r| tag_of(&db, r.resource().name(), r.rod_id()))
        .collect();
    assert_eq!(tags, ["node-5", "leaf-0", "node-3"]);

    for i in 0..6 {
        let (resource, tag) = if i % 2 == 0 {
            ("Leaf", format!("leaf-{i}"))
        } else {
            ("Node", format!("node-{i}"))
        };
        let found = db.find_by(resource, "tag", tag.as_str()).unwrap().unwrap();
        assert_eq!(found.get("tag").and_then(Value::as_str), Some(tag.as_str()));
    }
}

#[test]
fn pending_updates_follow_moved_records() {
    let dir = TempDir::new().unwrap();
    let family = Family::new();
    let mut db = Database::create(dir.path(), DatabaseConfig::default(), &family.all()).unwrap();

    let mut partner = family.node("partner");
    db.store(&mut family.leaf("first", 1)).unwrap();
    let mut waiting = family.leaf("waiting", 2);
    waiting.link("partner", Some(&partner)).unwrap();
    db.store(&mut waiting).unwrap();
    db.store(&mut family.node("second")).unwrap();
    assert_eq!(db.pending_updates(), 1);

    let moved = db.arrange().unwrap();
    assert!(moved > 0);

    db.store(&mut partner).unwrap();
    assert_eq!(db.pending_updates(), 0);

    let waiting = db.find_by("Leaf", "tag", "waiting").unwrap().unwrap();
    let reference = waiting.get("partner").and_then(Value::as_reference).unwrap();
    assert_eq!(reference.rod_id(), partner.rod_id());
    assert_eq!(tag_of(&db, "Node", reference.rod_id()), "partner");
}

#[test]
fn arranging_an_ordered_container_moves_nothing() {
    let dir = TempDir::new().unwrap();
    let family = Family::new();
    let mut db = Database::create(dir.path(), DatabaseConfig::default(), &family.all()).unwrap();
    db.store(&mut family.node("a")).unwrap();
    db.store(&mut family.node("b")).unwrap();
    db.store(&mut family.leaf("c", 3)).unwrap();

    assert_eq!(db.arrange().unwrap(), 0);
    assert_eq!(ids(&db, "Node"), vec![1, 2]);
    assert_eq!(ids(&db, "Leaf"), vec![3]);
}

#[test]
fn readonly_open_skips_arrangement() {
    let dir = TempDir::new().unwrap();
    let family = Family::new();
    let mut db = Database::create(dir.path(), DatabaseConfig::default(), &family.all()).unwrap();
    db.store(&mut family.leaf("x", 1)).unwrap();
    db.store(&mut family.node("y")).unwrap();
    db.close().unwrap();

    let config = DatabaseConfig {
        readonly: true,
        arrange_on_open: true,
        ..Default::default()
    };
    let mut db = Database::open(dir.path(), config, &family.all()).unwrap();
    assert_eq!(ids(&db, "Node"), vec![2]);
    assert!(db.arrange().is_err());
}
