use std::hash::Hash;

/// Try to get a keyword from a string, ignoring string casing.
pub fn keyword_from_str(s: &str) -> Option<Keyword> {
    let upper = s.to_ascii_uppercase();
    let idx = match KEYWORD_STRINGS.binary_search(&upper.as_str()) {
        Ok(idx) => idx,
        Err(_) => return None,
    };
    Some(ALL_KEYWORDS[idx])
}

/// Generate an enum of keywords.
///
/// Keywords must be declared in alphabetical order so the string table can
/// be binary searched.
macro_rules! define_keywords {
    ($($ident:ident),*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($ident),*
        }

        pub const ALL_KEYWORDS: &'static [Keyword] = &[
            $(Keyword::$ident),*
        ];

        pub const KEYWORD_STRINGS: &'static [&'static str] = &[
            $(stringify!($ident),)*
        ];
    };
}

#[rustfmt::skip]
define_keywords!(
    AND,
    AS,
    ASC,
    BY,
    DELETE,
    DESC,
    DISTINCT,
    DROP,
    FALSE,
    FROM,
    GROUP,
    HAVING,
    IN,
    INSERT,
    INTO,
    IS,
    LIKE,
    NOT,
    NULL,
    OR,
    ORDER,
    SELECT,
    SET,
    TABLE,
    TRUE,
    TRUNCATE,
    UPDATE,
    VALUES,
    WHERE
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        // (input, expected)
        let tests = [
            ("select", Some(Keyword::SELECT)),
            ("SeLeCt", Some(Keyword::SELECT)),
            ("SELECT", Some(Keyword::SELECT)),
            ("NOSELECT", None),
            ("order", Some(Keyword::ORDER)),
            ("truncate", Some(Keyword::TRUNCATE)),
        ];

        for (input, expected) in tests {
            let got = keyword_from_str(input);
            assert_eq!(expected, got);
        }
    }

    #[test]
    fn table_sorted_for_binary_search() {
        let mut sorted = KEYWORD_STRINGS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, KEYWORD_STRINGS);
    }
}
