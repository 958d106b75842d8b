//! Multi-key row sorting.

use crate::domain::Row;
use crate::query::{Direction, OrderSpec};
use std::cmp::Ordering;

/// Sorts rows by `orders`, primary key first.
///
/// The sort is stable, so rows equal on every key keep their id order.
/// `NULL` sorts first ascending and last descending.
pub(super) fn sort_rows(rows: &mut [Row], orders: &[OrderSpec]) {
    if orders.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        orders.iter().fold(Ordering::Equal, |acc, order| {
            acc.then_with(|| {
                let ordering = a.value(&order.column).sort_cmp(b.value(&order.column));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            })
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Scalar;

    fn row(id: i64, team: Option<&str>, priority: i64) -> Row {
        [
            ("id", Scalar::Int(id)),
            ("team", Scalar::from(team)),
            ("priority", Scalar::Int(priority)),
        ]
        .into_iter()
        .collect()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.id()).map(|id| id.0).collect()
    }

    #[test]
    fn secondary_key_breaks_ties() {
        let mut rows = vec![
            row(1, Some("core"), 2),
            row(2, Some("api"), 1),
            row(3, Some("core"), 5),
        ];
        sort_rows(
            &mut rows,
            &[
                OrderSpec::new("team", Direction::Asc),
                OrderSpec::new("priority", Direction::Desc),
            ],
        );
        assert_eq!(ids(&rows), vec![2, 3, 1]);
    }

    #[test]
    fn nulls_first_ascending_last_descending() {
        let mut rows = vec![row(1, Some("b"), 0), row(2, None, 0), row(3, Some("a"), 0)];
        sort_rows(&mut rows, &[OrderSpec::new("team", Direction::Asc)]);
        assert_eq!(ids(&rows), vec![2, 3, 1]);

        sort_rows(&mut rows, &[OrderSpec::new("team", Direction::Desc)]);
        assert_eq!(ids(&rows), vec![1, 3, 2]);
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let mut rows = vec![row(1, Some("x"), 1), row(2, Some("x"), 1), row(3, Some("x"), 1)];
        sort_rows(&mut rows, &[OrderSpec::new("team", Direction::Desc)]);
        assert_eq!(ids(&rows), vec![1, 2, 3]);
    }
}
