//! Collection-level round-trip, listing, and uniqueness behavior.
//!
//! These tests stand up a real, disposable Postgres container per test
//! (via `testcontainers`) rather than mocking the store, matching this
//! pack's convention of exercising the actual backing engine.

mod common;

use relwatch::{CollectionDescriptor, Filter, ListOptions, ListOrder, ListTarget};

use common::Item;

#[tokio::test]
async fn round_trip_put_then_get() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("rt_items").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         coll.put("1", &Item::new("1", "hello")).await?;
         let got = coll.get("1").await?;
         assert_eq!(got, Item::new("1", "hello"));
         Ok(())
      }
   })
   .await
   .unwrap();
}

#[tokio::test]
async fn create_twice_fails_with_exists_and_does_not_modify_state() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("create_twice").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         txn.collection(items).create("1", &Item::new("1", "first")).await?;
         Ok(())
      }
   })
   .await
   .unwrap();

   let second = db
      .transact(|txn| {
         let items = &items;
         async move {
            txn
               .collection(items)
               .create("1", &Item::new("1", "second"))
               .await
         }
      })
      .await;
   assert!(matches!(second, Err(relwatch::Error::Exists { .. })));

   db.transact(|txn| {
      let items = &items;
      async move {
         let got = txn.collection(items).get("1").await?;
         assert_eq!(got.value, "first");
         Ok(())
      }
   })
   .await
   .unwrap();
}

#[tokio::test]
async fn delete_all_empties_collection_and_get_fails() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("delete_all_items").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         for i in 0..10 {
            coll.create(&i.to_string(), &Item::new(i.to_string(), "old")).await?;
         }
         Ok(())
      }
   })
   .await
   .unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         assert_eq!(coll.count(&Filter::AllKeys).await?, 10);
         coll.delete_all().await?;
         assert_eq!(coll.count(&Filter::AllKeys).await?, 0);
         let err = coll.get("3").await.unwrap_err();
         assert!(matches!(err, relwatch::Error::NotFound { .. }));
         Ok(())
      }
   })
   .await
   .unwrap();
}

/// Scenario 1: populate rows `0..9`, then list ordered by key ascending.
#[tokio::test]
async fn populate_then_list_by_key_ascending() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("populate_list").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         for i in 0..10 {
            coll.create(&i.to_string(), &Item::new(i.to_string(), "old")).await?;
         }
         Ok(())
      }
   })
   .await
   .unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         assert_eq!(coll.count(&Filter::AllKeys).await?, 10);
         let options = ListOptions::new().target(ListTarget::Key).order(ListOrder::Ascend);
         let rows = coll.list_all(&Filter::AllKeys, options).await?;
         let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
         assert_eq!(keys, vec!["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
         Ok(())
      }
   })
   .await
   .unwrap();
}

/// Scenario 2: creation order is preserved when sorting by `CreateRev`.
#[tokio::test]
async fn list_by_create_rev_preserves_insertion_order() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("create_rev_order").unwrap();
   db.ensure_collection(&items).await.unwrap();

   let order = ["0", "6", "7", "9", "3", "8", "4", "1", "2", "5"];
   for key in order {
      db.transact(|txn| {
         let items = &items;
         async move {
            txn.collection(items).create(key, &Item::new(key, "v")).await?;
            Ok(())
         }
      })
      .await
      .unwrap();
   }

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         let options = ListOptions::new().target(ListTarget::CreateRev).order(ListOrder::Ascend);
         let rows = coll.list_all(&Filter::AllKeys, options).await?;
         let keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
         assert_eq!(keys, order.to_vec());
         Ok(())
      }
   })
   .await
   .unwrap();
}

#[tokio::test]
async fn one_index_filter_matches_only_rows_with_that_value() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("index_filter")
      .unwrap()
      .with_index("value")
      .unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         coll.create("1", &Item::new("1", "alpha")).await?;
         coll.create("2", &Item::new("2", "beta")).await?;
         coll.create("3", &Item::new("3", "alpha")).await?;
         Ok(())
      }
   })
   .await
   .unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let mut coll = txn.collection(items);
         let filter = Filter::one_index("value", "alpha");
         let rows = coll.list_all(&filter, ListOptions::new()).await?;
         let mut keys: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
         keys.sort();
         assert_eq!(keys, vec!["1", "3"]);
         assert_eq!(coll.count(&filter).await?, 2);
         Ok(())
      }
   })
   .await
   .unwrap();
}

#[tokio::test]
async fn update_requires_existing_key() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("update_requires_key").unwrap();
   db.ensure_collection(&items).await.unwrap();

   let result = db
      .transact(|txn| {
         let items = &items;
         async move {
            txn
               .collection(items)
               .update("missing", |_: Item| unreachable!("mutator must not run for an absent key"))
               .await
         }
      })
      .await;
   assert!(matches!(result, Err(relwatch::Error::NotFound { .. })));
}

#[tokio::test]
async fn upsert_runs_mutator_with_none_for_absent_key() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("upsert_absent").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         txn
            .collection(items)
            .upsert("1", |current: Option<Item>| {
               assert!(current.is_none());
               Ok(Item::new("1", "created-by-upsert"))
            })
            .await?;
         Ok(())
      }
   })
   .await
   .unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let got = txn.collection(items).get("1").await?;
         assert_eq!(got.value, "created-by-upsert");
         Ok(())
      }
   })
   .await
   .unwrap();
}
