// Copyright 2023 Remi Bernotavicius

use crate::database::models::IngredientId;
use std::collections::BTreeSet;

/// A recipe is cookable when every ingredient it needs is in the refrigerator.
pub fn is_cookable(required: &BTreeSet<IngredientId>, owned: &BTreeSet<IngredientId>) -> bool {
    required.is_subset(owned)
}

pub fn missing(
    required: &BTreeSet<IngredientId>,
    owned: &BTreeSet<IngredientId>,
) -> Vec<IngredientId> {
    required.difference(owned).copied().collect()
}

#[cfg(test)]
fn ids(ids: &[i32]) -> BTreeSet<IngredientId> {
    ids.iter().copied().map(IngredientId::from).collect()
}

#[test]
fn superset_refrigerator_is_cookable() {
    assert!(is_cookable(&ids(&[1, 2]), &ids(&[1, 2, 3])));
    assert!(is_cookable(&ids(&[1, 2]), &ids(&[1, 2])));
    assert!(!is_cookable(&ids(&[1, 2, 4]), &ids(&[1, 2, 3])));
    assert!(!is_cookable(&ids(&[1]), &ids(&[])));
}

#[test]
fn missing_ingredients() {
    assert_eq!(missing(&ids(&[1, 2, 4]), &ids(&[1, 2, 3])), vec![IngredientId::from(4)]);
    assert_eq!(missing(&ids(&[5, 1]), &ids(&[])), ids(&[1, 5]).into_iter().collect::<Vec<_>>());
    assert!(missing(&ids(&[1]), &ids(&[1, 9])).is_empty());
}
