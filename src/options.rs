//! List/filter/sort options shared by `Collection` and `Watcher`.

use relwatch_store::{OrderColumn, OrderDirection};

/// Which revision-bearing column to sort or paginate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListTarget {
   /// Sort by the row key itself.
   #[default]
   Key,
   /// Sort by the revision assigned at row creation.
   CreateRev,
   /// Sort by the revision assigned at the row's most recent write.
   ModRev,
}

impl From<ListTarget> for OrderColumn {
   fn from(target: ListTarget) -> Self {
      match target {
         ListTarget::Key => OrderColumn::Key,
         ListTarget::CreateRev => OrderColumn::CreatedRev,
         ListTarget::ModRev => OrderColumn::UpdatedRev,
      }
   }
}

/// Sort direction for a `List` call.
///
/// `None` permits any deterministic order the store finds cheapest,
/// typically insertion order by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
   Ascend,
   Descend,
   #[default]
   None,
}

impl From<ListOrder> for OrderDirection {
   fn from(order: ListOrder) -> Self {
      match order {
         ListOrder::Ascend => OrderDirection::Ascending,
         ListOrder::Descend => OrderDirection::Descending,
         ListOrder::None => OrderDirection::Unordered,
      }
   }
}

/// Options controlling a `Collection::list` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
   pub target: ListTarget,
   pub order: ListOrder,
}

impl ListOptions {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn target(mut self, target: ListTarget) -> Self {
      self.target = target;
      self
   }

   pub fn order(mut self, order: ListOrder) -> Self {
      self.order = order;
      self
   }
}

/// Selects which rows (or notifications) a `Collection` read or `Watcher`
/// subscription cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
   /// Every row in the collection.
   AllKeys,
   /// Only the row with this exact key.
   OneKey(String),
   /// Only rows whose value for `index_name` equals `value`.
   OneIndex { index_name: String, value: String },
}

impl Filter {
   pub fn one_index(index_name: impl Into<String>, value: impl Into<String>) -> Self {
      Filter::OneIndex {
         index_name: index_name.into(),
         value: value.into(),
      }
   }

   pub(crate) fn as_store_index(&self) -> Option<(&str, &str)> {
      match self {
         Filter::OneIndex { index_name, value } => Some((index_name.as_str(), value.as_str())),
         _ => None,
      }
   }
}
