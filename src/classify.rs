#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Stateless decisions about which files to evaluate and how.
//!
//! The script heuristics decide whether running a student script unattended
//! is safe and useful. They are approximations: some unsafe scripts still
//! run and some harmless ones are only syntax-checked.

use std::{fmt::Display, path::Path};

use anyhow::{Context, Result};
use regex::Regex;

use crate::{
    constants::{IGNORED_DIRECTORIES, SOURCE_EXTENSION},
    parser::Parser,
};

/// Whether any segment of `path` is an editor, cache, or version-control
/// directory.
pub fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|segment| IGNORED_DIRECTORIES.contains(&segment))
    })
}

/// Whether `file_name` is a README or the version-control metadata file.
pub fn is_ignored_filename(file_name: &str) -> bool {
    file_name.starts_with("README") || file_name == ".git"
}

/// Whether `file_name` is a source file of the evaluated language.
pub fn is_source_file(file_name: &str) -> bool {
    file_name.ends_with(SOURCE_EXTENSION)
}

/// Why a script was only syntax-checked, or how it was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Imports a plotting library whose windows block unattended runs.
    Pylab,
    /// Contains an unconditional infinite loop.
    WhileTrue,
    /// Contains a `while` loop of any kind.
    While,
    /// Imports a GUI toolkit.
    GuiToolkit,
    /// Waits for a click on a turtle-graphics window.
    ExitOnClick,
    /// Defines a recursive function known to flood the output.
    RecursionByContent,
    /// The file name announces a recursion exercise.
    RecursionByFilename,
    /// Reads the process argument list; run with synthetic arguments.
    Argv,
}

impl Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ScriptKind::Pylab => "pylab",
            ScriptKind::WhileTrue => "while_true",
            ScriptKind::While => "while",
            ScriptKind::GuiToolkit => "gui_toolkit",
            ScriptKind::ExitOnClick => "exit_on_click",
            ScriptKind::RecursionByContent => "recursion_by_content",
            ScriptKind::RecursionByFilename => "recursion_by_filename",
            ScriptKind::Argv => "argv",
        };
        write!(f, "{tag}")
    }
}

/// What to do with a script whose syntax check passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stop at the syntax check and tag the result.
    CheckOnly(ScriptKind),
    /// Run it with synthesized command-line arguments.
    RunWithArguments,
    /// Run it with synthetic standard input only.
    Run,
}

/// A script as seen by the heuristics.
#[derive(Debug, Clone, Copy)]
pub struct ScriptSource<'a> {
    /// File name without directories.
    pub file_name: &'a str,
    /// Parsed source.
    pub parser:    &'a Parser,
}

impl ScriptSource<'_> {
    /// Raw source text.
    pub fn text(&self) -> &str {
        self.parser.code()
    }
}

/// One entry of the ordered rule list.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Classification reported when the rule fires.
    pub kind:     ScriptKind,
    /// Decision taken when the rule fires.
    pub decision: Decision,
    /// Predicate over the script.
    pub matches:  fn(&ScriptHeuristics, &ScriptSource<'_>) -> bool,
}

/// Content classifiers for the run-each-script evaluator.
///
/// Rules are evaluated in a fixed priority order and the first match wins.
#[derive(Debug, Clone)]
pub struct ScriptHeuristics {
    /// `def hanoi(` anywhere in the file.
    hanoi:           Regex,
    /// `from sys import argv`.
    from_sys_argv:   Regex,
    /// `import sys` followed later by `... = sys.argv`.
    import_sys_argv: Regex,
    /// Ordered rule list.
    rules:           Vec<Rule>,
}

impl ScriptHeuristics {
    /// Compiles the patterns and builds the rule list.
    pub fn new() -> Result<Self> {
        Ok(Self {
            hanoi:           Regex::new(r"(?m)def\s+hanoi\s*\(")
                .context("Could not compile hanoi pattern")?,
            from_sys_argv:   Regex::new(r"from\s+sys\s+import\s+argv")
                .context("Could not compile argv import pattern")?,
            import_sys_argv: Regex::new(r"(?s)import\s+sys\s+.*=\s+sys\.argv")
                .context("Could not compile sys.argv pattern")?,
            rules:           Self::default_rules(),
        })
    }

    /// The rules in priority order.
    fn default_rules() -> Vec<Rule> {
        use Decision::CheckOnly;
        vec![
            Rule {
                kind:     ScriptKind::Pylab,
                decision: CheckOnly(ScriptKind::Pylab),
                matches:  |_, s| is_pylab(s.text()),
            },
            Rule {
                kind:     ScriptKind::WhileTrue,
                decision: CheckOnly(ScriptKind::WhileTrue),
                matches:  |_, s| is_while_true(s.text()),
            },
            Rule {
                kind:     ScriptKind::While,
                decision: CheckOnly(ScriptKind::While),
                matches:  |_, s| s.parser.has_code_token("while"),
            },
            Rule {
                kind:     ScriptKind::GuiToolkit,
                decision: CheckOnly(ScriptKind::GuiToolkit),
                matches:  |_, s| is_gui_toolkit(s.text()),
            },
            Rule {
                kind:     ScriptKind::ExitOnClick,
                decision: CheckOnly(ScriptKind::ExitOnClick),
                matches:  |_, s| has_exit_on_click(s.text()),
            },
            Rule {
                kind:     ScriptKind::RecursionByContent,
                decision: CheckOnly(ScriptKind::RecursionByContent),
                matches:  |h, s| h.has_flooding_recursion(s.text()),
            },
            Rule {
                kind:     ScriptKind::RecursionByFilename,
                decision: CheckOnly(ScriptKind::RecursionByFilename),
                matches:  |_, s| is_recursion_filename(s.file_name),
            },
            Rule {
                kind:     ScriptKind::Argv,
                decision: Decision::RunWithArguments,
                matches:  |h, s| h.reads_argv(s.text()),
            },
        ]
    }

    /// The rules in the order they are tried.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching rule's decision, or [`Decision::Run`].
    pub fn decide(&self, source: &ScriptSource<'_>) -> Decision {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(self, source))
            .map(|rule| rule.decision)
            .unwrap_or(Decision::Run)
    }

    /// Whether the file defines the Towers of Hanoi solver.
    pub fn has_flooding_recursion(&self, text: &str) -> bool {
        self.hanoi.is_match(text)
    }

    /// Whether the script reads the process argument list.
    pub fn reads_argv(&self, text: &str) -> bool {
        self.import_sys_argv.is_match(text) || self.from_sys_argv.is_match(text)
    }
}

/// Whether a plotting library is mentioned.
pub fn is_pylab(text: &str) -> bool {
    text.contains("pylab") || text.contains("matplotlib")
}

/// Whether an unconditional `while True` loop is present.
pub fn is_while_true(text: &str) -> bool {
    text.contains("while True") || text.contains("while (True)")
}

/// Whether a GUI toolkit is mentioned.
pub fn is_gui_toolkit(text: &str) -> bool {
    text.contains("tkinter")
}

/// Whether a turtle window waits for a click before closing.
pub fn has_exit_on_click(text: &str) -> bool {
    text.contains(".exitonclick()")
}

/// Whether the file name starts with `recursion`.
pub fn is_recursion_filename(file_name: &str) -> bool {
    file_name.starts_with("recursion")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(file_name: &str, code: &str) -> Decision {
        let heuristics = ScriptHeuristics::new().expect("heuristics");
        let parser = Parser::new(code.to_string()).expect("parse");
        heuristics.decide(&ScriptSource {
            file_name,
            parser: &parser,
        })
    }

    #[test]
    fn ignores_metadata_directories_by_segment() {
        assert!(is_ignored_path(Path::new(".git/objects")));
        assert!(is_ignored_path(Path::new("week1/__pycache__")));
        assert!(is_ignored_path(Path::new("nb/.ipynb_checkpoints")));
        assert!(!is_ignored_path(Path::new(".github/workflows")));
        assert!(!is_ignored_path(Path::new("week1")));
    }

    #[test]
    fn ignores_readme_and_git_file() {
        assert!(is_ignored_filename("README.md"));
        assert!(is_ignored_filename(".git"));
        assert!(!is_ignored_filename(".gitignore"));
        assert!(!is_ignored_filename("readme.py"));
    }

    #[test]
    fn plotting_wins_over_loops() {
        let code = "import matplotlib.pyplot as plt\nwhile True:\n    plt.show()\n";
        assert_eq!(decide("plot.py", code), Decision::CheckOnly(ScriptKind::Pylab));
    }

    #[test]
    fn while_true_wins_over_plain_while() {
        let code = "while True:\n    break\n";
        assert_eq!(decide("loop.py", code), Decision::CheckOnly(ScriptKind::WhileTrue));
        let code = "i = 0\nwhile i < 3:\n    i += 1\n";
        assert_eq!(decide("loop.py", code), Decision::CheckOnly(ScriptKind::While));
    }

    #[test]
    fn while_in_comment_does_not_skip() {
        assert_eq!(decide("ok.py", "# while loops later\nprint(1)\n"), Decision::Run);
    }

    #[test]
    fn gui_and_turtle_are_skipped() {
        assert_eq!(
            decide("gui.py", "import tkinter\n"),
            Decision::CheckOnly(ScriptKind::GuiToolkit)
        );
        assert_eq!(
            decide("t.py", "import turtle\nwn = turtle.Screen()\nwn.exitonclick()\n"),
            Decision::CheckOnly(ScriptKind::ExitOnClick)
        );
    }

    #[test]
    fn recursion_is_skipped_by_content_or_name() {
        assert_eq!(
            decide("towers.py", "def hanoi(n, a, b, c):\n    pass\n"),
            Decision::CheckOnly(ScriptKind::RecursionByContent)
        );
        assert_eq!(
            decide("recursion_fib.py", "print(1)\n"),
            Decision::CheckOnly(ScriptKind::RecursionByFilename)
        );
    }

    #[test]
    fn argv_readers_run_with_arguments() {
        assert_eq!(
            decide("ex13.py", "import sys\na, b, c = sys.argv\n"),
            Decision::RunWithArguments
        );
        assert_eq!(
            decide("ex13.py", "from sys import argv\nscript, first = argv\n"),
            Decision::RunWithArguments
        );
    }

    #[test]
    fn rule_order_is_fixed() {
        let heuristics = ScriptHeuristics::new().expect("heuristics");
        let kinds: Vec<_> = heuristics.rules().iter().map(|rule| rule.kind).collect();
        assert_eq!(
            kinds,
            [
                ScriptKind::Pylab,
                ScriptKind::WhileTrue,
                ScriptKind::While,
                ScriptKind::GuiToolkit,
                ScriptKind::ExitOnClick,
                ScriptKind::RecursionByContent,
                ScriptKind::RecursionByFilename,
                ScriptKind::Argv,
            ]
        );
    }
}
