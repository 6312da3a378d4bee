#![allow(dead_code)]

use std::sync::Arc;

use rod_db::{FieldType, IndexKind, Resource, ResourceBuilder};

pub struct Schema {
    pub user: Arc<Resource>,
    pub account: Arc<Resource>,
    pub shelf: Arc<Resource>,
    pub book: Arc<Resource>,
    pub item: Arc<Resource>,
    pub gadget: Arc<Resource>,
    pub owner: Arc<Resource>,
}

impl Schema {
    pub fn new() -> Self {
        let item = ResourceBuilder::new("Item")
            .field("label", FieldType::String)
            .build()
            .unwrap();
        let gadget = ResourceBuilder::new("Gadget")
            .inherits(&item)
            .field("watts", FieldType::Integer)
            .build()
            .unwrap();
        Self {
            user: Arc::new(
                ResourceBuilder::new("User")
                    .indexed_field("name", FieldType::String, IndexKind::Hash)
                    .field("age", FieldType::Integer)
                    .has_one("account", "Account")
                    .build()
                    .unwrap(),
            ),
            account: Arc::new(
                ResourceBuilder::new("Account")
                    .indexed_field("login", FieldType::String, IndexKind::Btree)
                    .field("balance", FieldType::Float)
                    .build()
                    .unwrap(),
            ),
            shelf: Arc::new(
                ResourceBuilder::new("Shelf")
                    .field("title", FieldType::String)
                    .has_many("books", "Book")
                    .build()
                    .unwrap(),
            ),
            book: Arc::new(
                ResourceBuilder::new("Book")
                    .indexed_field("title", FieldType::String, IndexKind::Btree)
                    .build()
                    .unwrap(),
            ),
            owner: Arc::new(
                ResourceBuilder::new("Owner")
                    .field("name", FieldType::String)
                    .has_one_polymorphic("favourite")
                    .has_many_polymorphic("things")
                    .build()
                    .unwrap(),
            ),
            item: Arc::new(item),
            gadget: Arc::new(gadget),
        }
    }

    pub fn all(&self) -> Vec<Arc<Resource>> {
        vec![
            self.user.clone(),
            self.account.clone(),
            self.shelf.clone(),
            self.book.clone(),
            self.item.clone(),
            self.gadget.clone(),
            self.owner.clone(),
        ]
    }
}
