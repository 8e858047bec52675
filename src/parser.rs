#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Tree-sitter parser wrapper for Python source code.

use std::fmt::Formatter;

use anyhow::{Context, Result, anyhow};
use tree_sitter::{Node, Tree};

/// A struct that wraps a tree-sitter parse tree and its source code.
#[derive(Clone)]
pub struct Parser {
    /// The source code being parsed.
    code: String,
    /// The parse tree.
    tree: Tree,
}

/// Returns the compiled tree-sitter Python language.
fn python_language() -> tree_sitter::Language {
    tree_sitter_python::LANGUAGE.into()
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("bytes", &self.code.len())
            .finish()
    }
}

impl Parser {
    /// Returns a new parser object.
    ///
    /// * `source_code`: the source code to be parsed
    pub fn new(source_code: String) -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&python_language())
            .with_context(|| "Failed to load Python grammar")?;
        let tree = parser
            .parse(source_code.as_str(), None)
            .ok_or_else(|| anyhow!("Error parsing Python code"))?;

        Ok(Self {
            code: source_code,
            tree,
        })
    }

    /// A getter for parser's source code.
    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    /// Source text covered by `node`, or an empty string if it is not valid
    /// UTF-8.
    fn text_of(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.code.as_bytes()).unwrap_or_default()
    }

    /// Visits every node in document (pre-)order.
    fn visit<'t>(&'t self, mut f: impl FnMut(Node<'t>)) {
        let mut cursor = self.tree.walk();
        loop {
            f(cursor.node());
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    /// Every `#` comment in the file, stripped of the marker, surrounding
    /// whitespace, and leading/trailing periods.
    pub fn comments(&self) -> Vec<String> {
        let mut comments = Vec::new();
        self.visit(|node| {
            if node.kind() == "comment" {
                comments.push(strip_comment(self.text_of(node)).to_string());
            }
        });
        comments
    }

    /// Whether any non-comment token contains `needle`.
    ///
    /// String literal contents count as tokens.
    pub fn has_code_token(&self, needle: &str) -> bool {
        let mut found = false;
        self.visit(|node| {
            if !found
                && node.child_count() == 0
                && node.kind() != "comment"
                && self.text_of(node).contains(needle)
            {
                found = true;
            }
        });
        found
    }

    /// Number of names bound by the first assignment from the process
    /// argument list, or 0 when there is none.
    ///
    /// `a, b, c = sys.argv` yields 3. For chained assignments such as
    /// `x = a, b = argv` the left-most target list is counted. This is a
    /// best-effort reading of the source, not an evaluation of it.
    pub fn expected_argument_count(&self) -> usize {
        let mut first = None;
        self.visit(|node| {
            if first.is_none()
                && node.kind() == "assignment"
                && node
                    .child_by_field_name("right")
                    .is_some_and(|right| self.is_argv(right))
            {
                first = Some(node);
            }
        });

        let Some(mut assignment) = first else {
            return 0;
        };
        while let Some(parent) = assignment.parent() {
            let is_right_of_parent = parent.kind() == "assignment"
                && parent
                    .child_by_field_name("right")
                    .is_some_and(|right| right.id() == assignment.id());
            if !is_right_of_parent {
                break;
            }
            assignment = parent;
        }

        assignment
            .child_by_field_name("left")
            .map(|left| self.count_identifiers(left))
            .unwrap_or(0)
    }

    /// Whether `node` is `sys.argv`, `argv`, or a subscript of either.
    fn is_argv(&self, node: Node<'_>) -> bool {
        match node.kind() {
            "identifier" | "attribute" => matches!(self.text_of(node), "argv" | "sys.argv"),
            "subscript" => node
                .child_by_field_name("value")
                .is_some_and(|value| self.is_argv(value)),
            _ => false,
        }
    }

    /// Counts identifier nodes within `node`, including `node` itself.
    fn count_identifiers(&self, node: Node<'_>) -> usize {
        if node.kind() == "identifier" {
            return 1;
        }
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .map(|child| self.count_identifiers(child))
            .sum()
    }

}

/// Removes the comment marker, surrounding whitespace, and periods.
pub fn strip_comment(raw: &str) -> &str {
    raw.trim_matches('#').trim().trim_matches('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Parser {
        Parser::new(code.to_string()).expect("parse")
    }

    #[test]
    fn collects_full_line_and_trailing_comments() {
        let parser = parse("# Title.\nx = 1  # set x\n\ny = '# not a comment'\n");
        assert_eq!(parser.comments(), vec!["Title", "set x"]);
    }

    #[test]
    fn code_token_ignores_comments_but_sees_strings() {
        assert!(!parse("# while we wait\nx = 1\n").has_code_token("while"));
        assert!(parse("while x:\n    pass\n").has_code_token("while"));
        assert!(parse("print('meanwhile')\n").has_code_token("while"));
    }

    #[test]
    fn counts_tuple_unpacking_from_argv() {
        let parser = parse("import sys\na, b, c = sys.argv\n");
        assert_eq!(parser.expected_argument_count(), 3);
    }

    #[test]
    fn counts_from_import_argv() {
        let parser = parse("from sys import argv\nscript, filename = argv\n");
        assert_eq!(parser.expected_argument_count(), 2);
    }

    #[test]
    fn chained_assignment_uses_leftmost_targets() {
        let parser = parse("import sys\nx, y = a, b = sys.argv\n");
        assert_eq!(parser.expected_argument_count(), 2);
    }

    #[test]
    fn no_argv_assignment_counts_zero() {
        assert_eq!(parse("import sys\nprint(len(sys.argv))\n").expected_argument_count(), 0);
    }
}
