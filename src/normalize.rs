//! String preparation for usernames and passwords, as specified in RFC 5802,
//! which references RFC 4013, which in turn references RFC 3454.

use unicode_normalization::char::decompose_compatible;

/// Code points removed entirely ("map to nothing", RFC 3454 table B.1):
/// soft hyphen, zero-width marks and joiners, Mongolian separators,
/// variation selectors, and the byte-order mark.
const MAP_TO_NOTHING: [char; 27] = [
    '\u{00AD}', '\u{034F}', '\u{1806}', '\u{180B}', '\u{180C}', '\u{180D}', '\u{200B}', '\u{200C}',
    '\u{200D}', '\u{2060}', '\u{FE00}', '\u{FE01}', '\u{FE02}', '\u{FE03}', '\u{FE04}', '\u{FE05}',
    '\u{FE06}', '\u{FE07}', '\u{FE08}', '\u{FE09}', '\u{FE0A}', '\u{FE0B}', '\u{FE0C}', '\u{FE0D}',
    '\u{FE0E}', '\u{FE0F}', '\u{FEFF}',
];

/// Non-ASCII space code points mapped to U+0020 (RFC 3454 table C.1.2).
const MAP_TO_SPACE: [char; 16] = [
    '\u{00A0}', '\u{1680}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}', '\u{2004}', '\u{2005}',
    '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{202F}', '\u{205F}', '\u{3000}',
];

/// Normalizes a username or password to its canonical UTF-8 byte form.
///
/// Drops the "map to nothing" code points, maps the non-ASCII spaces to
/// U+0020, and recursively expands compatibility decompositions until only
/// base code points remain. Cannot fail; code points with no mapping pass
/// through unchanged.
pub fn normalize(text: &str) -> Vec<u8> {
    let mut mapped = String::with_capacity(text.len());

    for ch in text.chars() {
        if MAP_TO_NOTHING.contains(&ch) {
            continue;
        }
        if MAP_TO_SPACE.contains(&ch) {
            mapped.push(' ');
        } else {
            decompose_compatible(ch, |decomposed| mapped.push(decomposed));
        }
    }

    mapped.into_bytes()
}
