//! Parser for [Type Language] (TL) schema files.
//!
//! Turns `.tl` text into [`tl::Definition`]s that the build-time generator
//! (`teleproto-tl-gen`) and the runtime schema registry consume.
//!
//! ```rust
//! use teleproto_tl_parser::parse_tl_file;
//!
//! let src = "pong#347773c5 msg_id:long ping_id:long = Pong;";
//! let defs: Vec<_> = parse_tl_file(src).collect::<Result<_, _>>().unwrap();
//! assert_eq!(defs[0].id, 0x347773c5);
//! ```
//!
//! [Type Language]: https://core.telegram.org/mtproto/TL

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Parse error types for TL schema parsing.
pub mod errors;
pub mod tl;
mod iterator;
mod utils;

use errors::ParseError;
use tl::Definition;

/// Parses a complete TL schema, yielding one [`Definition`] per `;`-terminated
/// declaration.
///
/// `//` comments and blank lines are skipped; `---functions---` and
/// `---types---` switch the [`tl::Category`] of what follows.
pub fn parse_tl_file(contents: &str) -> impl Iterator<Item = Result<Definition, ParseError>> + '_ {
    iterator::TlIterator::new(contents).map(|(_, def)| def)
}

/// Like [`parse_tl_file`], but pairs every item with the 1-based line on
/// which its declaration started.
pub fn parse_tl_file_with_lines(
    contents: &str,
) -> impl Iterator<Item = (usize, Result<Definition, ParseError>)> + '_ {
    iterator::TlIterator::new(contents)
}

/// Reads the `// LAYER N` marker a schema carries in its header comments.
///
/// Only comment lines before the first declaration are inspected.
pub fn parse_layer(contents: &str) -> Option<i32> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let comment = line.strip_prefix("//")?;
        if let Some(n) = comment.trim().strip_prefix("LAYER") {
            return n.trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::parse_layer;

    #[test]
    fn layer_marker() {
        assert_eq!(parse_layer("// LAYER 72\nboolFalse#bc799737 = Bool;"), Some(72));
        assert_eq!(parse_layer("// schema\n// LAYER 5\n"), Some(5));
        assert_eq!(parse_layer("boolFalse#bc799737 = Bool;\n// LAYER 9"), None);
        assert_eq!(parse_layer("// LAYER x"), None);
    }
}
