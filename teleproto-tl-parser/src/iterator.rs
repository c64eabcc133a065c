use crate::errors::ParseError;
use crate::tl::{Category, Definition};

/// Splits schema text into declarations and parses each one.
pub(crate) struct TlIterator<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    category: Category,
    buffer: String,
    start_line: usize,
}

impl<'a> TlIterator<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            lines: src.lines().enumerate(),
            category: Category::Types,
            buffer: String::new(),
            start_line: 0,
        }
    }
}

impl Iterator for TlIterator<'_> {
    type Item = (usize, Result<Definition, ParseError>);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, line) in self.lines.by_ref() {
            // Trailing comments are allowed after a declaration.
            let line = match line.find("//") {
                Some(pos) => &line[..pos],
                None => line,
            }
            .trim();

            match line {
                "" => continue,
                "---functions---" => {
                    self.category = Category::Functions;
                    continue;
                }
                "---types---" => {
                    self.category = Category::Types;
                    continue;
                }
                _ => {}
            }

            if self.buffer.is_empty() {
                self.start_line = index + 1;
            } else {
                self.buffer.push(' ');
            }
            self.buffer.push_str(line);

            let Some(decl) = self.buffer.strip_suffix(';') else {
                continue;
            };
            let parsed = decl.parse::<Definition>().map(|mut def| {
                def.category = self.category;
                def
            });
            self.buffer.clear();
            return Some((self.start_line, parsed));
        }

        if self.buffer.trim().is_empty() {
            None
        } else {
            // Unterminated trailing declaration.
            let rest = std::mem::take(&mut self.buffer);
            let parsed = rest.parse::<Definition>().map(|mut def| {
                def.category = self.category;
                def
            });
            Some((self.start_line, parsed))
        }
    }
}
