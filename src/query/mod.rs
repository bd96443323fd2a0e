// Copyright 2023 Remi Bernotavicius

//! Everything that reads or writes the database. Each function takes a
//! connection and runs synchronously; the HTTP layer calls them from the
//! blocking pool.

pub mod goods;
pub mod ingredients;
pub mod recipes;
pub mod refrigerator;
pub mod shopping_list;
pub mod users;

/// A `LIKE` pattern matching `text` anywhere, for use with `.escape('\\')`.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::from("%");
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[test]
fn contains_pattern_escapes_wildcards() {
    assert_eq!(contains_pattern("ねぎ"), "%ねぎ%");
    assert_eq!(contains_pattern("100%_\\"), "%100\\%\\_\\\\%");
}
