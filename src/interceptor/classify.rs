//! Keyword heuristics over raw command text. Not a parser.

use crate::model::OperationKind;
use crate::model::query::UNKNOWN_LABEL;

/// How the driver is about to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandPathway {
    /// Row-returning read.
    Read,
    /// Statement executed for its side effects.
    #[default]
    Write,
    /// Single-value read.
    Scalar,
}

const PREFIXES: &[(&str, OperationKind)] = &[
    ("INSERT", OperationKind::Insert),
    ("UPDATE", OperationKind::Update),
    ("DELETE", OperationKind::Delete),
    ("CREATE", OperationKind::Create),
    ("ALTER", OperationKind::Alter),
    ("DROP", OperationKind::Drop),
    ("TRUNCATE", OperationKind::Truncate),
    ("EXECUTE", OperationKind::Execute),
    ("EXEC", OperationKind::Execute),
];

fn starts_with_ignore_case(text: &str, keyword: &str) -> bool {
    text.len() >= keyword.len()
        && text.is_char_boundary(keyword.len())
        && text[..keyword.len()].eq_ignore_ascii_case(keyword)
}

/// Classifies a command by its leading keyword.
pub fn classify_operation(command_text: &str, pathway: CommandPathway) -> OperationKind {
    let trimmed = command_text.trim();
    for (keyword, kind) in PREFIXES {
        if starts_with_ignore_case(trimmed, keyword) {
            return *kind;
        }
    }
    match pathway {
        CommandPathway::Read | CommandPathway::Scalar => OperationKind::Select,
        CommandPathway::Write => OperationKind::Unknown,
    }
}

fn clean_identifier(token: &str) -> Option<String> {
    let cut = token
        .split(|c: char| c == '(' || c == ',' || c == ';')
        .next()
        .unwrap_or_default();
    let cleaned: String = cut
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"' | '\'' | '`'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn token_after<'a>(tokens: &[&'a str], keyword: &str) -> Option<&'a str> {
    let position = tokens.iter().position(|t| t.eq_ignore_ascii_case(keyword))?;
    tokens.get(position + 1).copied()
}

fn table_after_table_keyword<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    let position = tokens.iter().position(|t| t.eq_ignore_ascii_case("TABLE"))?;
    tokens[position + 1..]
        .iter()
        .copied()
        .find(|t| !["IF", "NOT", "EXISTS", "ONLY"].iter().any(|k| t.eq_ignore_ascii_case(k)))
}

/// Best-effort table (or procedure) name; `"Unknown"` when nothing fits.
pub fn extract_table_name(command_text: &str, operation: OperationKind) -> String {
    let tokens: Vec<&str> = command_text.split_whitespace().collect();
    let candidate = match operation {
        OperationKind::Select | OperationKind::Delete => token_after(&tokens, "FROM"),
        OperationKind::Insert => token_after(&tokens, "INTO"),
        OperationKind::Update | OperationKind::Execute => tokens.get(1).copied(),
        OperationKind::Create
        | OperationKind::Alter
        | OperationKind::Drop
        | OperationKind::Truncate => table_after_table_keyword(&tokens),
        OperationKind::Unknown => None,
    };
    candidate
        .and_then(clean_identifier)
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}
