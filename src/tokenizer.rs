//! Mixed CJK/Latin tokenizer for BM25 (spec §4.1).
//!
//! Lower-cases ASCII; for Chinese spans, runs jieba's search-oriented "cut
//! for search" mode, which yields both short and long sub-word tokens for
//! the same span (e.g. both "中华" and "中华人民共和国"). The same function
//! is used to tokenize chunk text at index time and query text at search
//! time — this is an invariant the BM25 Store relies on.

use jieba_rs::Jieba;
use once_cell_lazy::Lazy;

mod once_cell_lazy {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Lazy {
                cell: OnceLock::new(),
                init,
            }
        }

        pub fn get(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// Tokenize `text` into an ordered list of non-empty tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let jieba = JIEBA.get();
    jieba
        .cut_for_search(text, true)
        .into_iter()
        .map(|tok| tok.trim().to_lowercase())
        .filter(|tok| !tok.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_ascii() {
        let tokens = tokenize("Hello World");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"world".to_string()));
    }

    #[test]
    fn drops_whitespace_only_tokens() {
        let tokens = tokenize("  a   b  ");
        assert!(tokens.iter().all(|t| !t.trim().is_empty()));
    }

    #[test]
    fn empty_input_yields_empty_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn search_mode_yields_both_short_and_long_subwords() {
        let tokens = tokenize("中华人民共和国");
        // search-mode cut should surface at least one sub-span shorter than the whole string
        assert!(tokens.iter().any(|t| t.chars().count() < "中华人民共和国".chars().count()));
    }

    #[test]
    fn same_function_used_for_query_and_index_is_deterministic() {
        let a = tokenize("函数定义");
        let b = tokenize("函数定义");
        assert_eq!(a, b);
    }
}
