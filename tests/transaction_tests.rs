//! Transaction atomicity, rollback, and serialization-conflict retry.

mod common;

use relwatch::{CollectionDescriptor, Error};

use common::Item;

/// Scenario 3: a transaction creates key `10`, then the body returns a user
/// error. After the commit attempt, `Get("10")` must fail `NotFound` and the
/// rest of the collection must be unchanged.
#[tokio::test]
async fn user_error_in_transaction_body_rolls_back_all_writes() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("rollback_items").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         txn.collection(items).create("1", &Item::new("1", "kept")).await?;
         Ok(())
      }
   })
   .await
   .unwrap();

   let result: Result<(), Error> = db
      .transact(|txn| {
         let items = &items;
         async move {
            txn.collection(items).create("10", &Item::new("10", "doomed")).await?;
            Err(Error::User("transaction body declined to proceed".into()))
         }
      })
      .await;
   assert!(matches!(result, Err(Error::User(_))));

   db.transact(|txn| {
      let items = &items;
      async move {
         let err = txn.collection(items).get("10").await.unwrap_err();
         assert!(matches!(err, Error::NotFound { .. }));
         let kept = txn.collection(items).get("1").await?;
         assert_eq!(kept.value, "kept");
         Ok(())
      }
   })
   .await
   .unwrap();
}

/// P4: any operation returning an error, or the body returning an error,
/// leaves collection state exactly as it was before `Begin`.
#[tokio::test]
async fn failed_operation_mid_transaction_leaves_state_unchanged() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("atomicity_items").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         txn.collection(items).create("1", &Item::new("1", "v0")).await?;
         Ok(())
      }
   })
   .await
   .unwrap();

   let result: Result<(), Error> = db
      .transact(|txn| {
         let items = &items;
         async move {
            txn.collection(items).put("2", &Item::new("2", "never-committed")).await?;
            // Deleting an absent key fails, aborting the whole transaction.
            txn.collection(items).delete("missing-key").await?;
            Ok(())
         }
      })
      .await;
   assert!(matches!(result, Err(Error::NotFound { .. })));

   db.transact(|txn| {
      let items = &items;
      async move {
         let err = txn.collection(items).get("2").await.unwrap_err();
         assert!(matches!(err, Error::NotFound { .. }));
         Ok(())
      }
   })
   .await
   .unwrap();
}

/// Scenario 6: two concurrent transactions both increment the same row;
/// both must succeed and the final value must reflect both increments,
/// with at least one having been retried transparently under the hood.
#[tokio::test]
async fn concurrent_updates_to_same_row_both_apply() {
   let (_container, db) = common::connect().await;
   let items: CollectionDescriptor<Item> = CollectionDescriptor::new("conflict_items").unwrap();
   db.ensure_collection(&items).await.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         txn.collection(items).create("3", &Item::new("3", "0")).await?;
         Ok(())
      }
   })
   .await
   .unwrap();

   let increment = |db: relwatch::Database, items: CollectionDescriptor<Item>| async move {
      db
         .transact(|txn| {
            let items = &items;
            async move {
               txn
                  .collection(items)
                  .update("3", |current: Item| {
                     let next: i64 = current.value.parse().unwrap();
                     Ok(Item::new("3", (next + 1).to_string()))
                  })
                  .await
            }
         })
         .await
   };

   let (a, b) = tokio::join!(
      increment(db.clone(), items.clone()),
      increment(db.clone(), items.clone())
   );
   a.unwrap();
   b.unwrap();

   db.transact(|txn| {
      let items = &items;
      async move {
         let got = txn.collection(items).get("3").await?;
         assert_eq!(got.value, "2");
         Ok(())
      }
   })
   .await
   .unwrap();
}
