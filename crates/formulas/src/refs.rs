//! Textual rewriting of references inside formula source.
//!
//! Both rewrites work on the token stream so string literals and function
//! names are never touched; only the spans of reference tokens change and the
//! rest of the author's text (spacing, case) is kept as typed.

use crate::parser::{tokenize, Token, TokenKind};
use sheetcalc_primitives::{format_sheet_name, sheet_name_needs_quotes, CellReference};

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Split `formula` into the prefix up to and including `=` and the body.
fn split_formula(formula: &str) -> Option<(&str, &str)> {
    let lead = formula.len() - formula.trim_start().len();
    let body = formula[lead..].strip_prefix('=')?;
    Some((&formula[..=lead], body))
}

fn apply_edits(prefix: &str, body: &str, edits: &[Edit]) -> String {
    let mut out = String::with_capacity(prefix.len() + body.len());
    out.push_str(prefix);
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&body[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&body[cursor..]);
    out
}

fn sheet_token_name(token: &Token) -> Option<&str> {
    match &token.kind {
        TokenKind::Identifier(name) | TokenKind::SheetName(name) => Some(name),
        _ => None,
    }
}

fn is_sheet_prefix(tokens: &[Token], idx: usize) -> bool {
    tokens.get(idx).and_then(sheet_token_name).is_some()
        && matches!(tokens.get(idx + 1).map(|t| &t.kind), Some(TokenKind::Bang))
}

/// Rewrite every mention of sheet `old` (case-insensitive) to `new`.
///
/// Returns `None` when the text is not a formula, does not tokenize, or never
/// mentions `old`. Quoted sheet names that no longer need quotes are
/// unquoted as a side effect.
pub fn rename_sheet_in_formula(formula: &str, old: &str, new: &str) -> Option<String> {
    let (prefix, body) = split_formula(formula)?;
    let tokens = tokenize(body).ok()?;
    let old_lower = old.to_lowercase();

    let mut edits = Vec::new();
    let mut mentioned = false;
    for idx in 0..tokens.len() {
        if !is_sheet_prefix(&tokens, idx) {
            continue;
        }
        let token = &tokens[idx];
        let Some(name) = sheet_token_name(token) else {
            continue;
        };
        if name.to_lowercase() == old_lower {
            mentioned = true;
            edits.push(Edit {
                start: token.start,
                end: token.end,
                text: format_sheet_name(new),
            });
        } else if matches!(token.kind, TokenKind::SheetName(_)) && !sheet_name_needs_quotes(name) {
            edits.push(Edit {
                start: token.start,
                end: token.end,
                text: name.to_string(),
            });
        }
    }

    if !mentioned {
        return None;
    }
    tracing::debug!(old, new, edits = edits.len(), "renamed sheet in formula");
    Some(apply_edits(prefix, body, &edits))
}

fn shift_cell_token(text: &str, d_col: i64, d_row: i64) -> Option<String> {
    let shifted = CellReference::parse(text).ok()?.shifted(d_col, d_row)?;
    let rendered = shifted.to_string();
    if text.chars().any(|ch| ch.is_ascii_lowercase()) {
        Some(rendered.to_lowercase())
    } else {
        Some(rendered)
    }
}

/// Shift the relative parts of every cell reference by the given offset.
///
/// Anchored (`$`) components stay put. A reference or range whose shifted
/// location falls outside the grid is replaced by `#REF!` as a whole,
/// including any sheet qualifier. Text that is not a formula, or does not
/// tokenize, is returned unchanged.
pub fn shift_formula(formula: &str, d_col: i64, d_row: i64) -> String {
    let Some((prefix, body)) = split_formula(formula) else {
        return formula.to_string();
    };
    let Ok(tokens) = tokenize(body) else {
        return formula.to_string();
    };

    let mut edits = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        let group_start = idx;
        let cell_idx = if is_sheet_prefix(&tokens, idx) {
            idx + 2
        } else {
            idx
        };
        if !matches!(
            tokens.get(cell_idx).map(|t| &t.kind),
            Some(TokenKind::CellRef(_))
        ) {
            idx += 1;
            continue;
        }

        let mut members = vec![cell_idx];
        if matches!(
            tokens.get(cell_idx + 1).map(|t| &t.kind),
            Some(TokenKind::Colon)
        ) && matches!(
            tokens.get(cell_idx + 2).map(|t| &t.kind),
            Some(TokenKind::CellRef(_))
        ) {
            members.push(cell_idx + 2);
        }
        let last = members[members.len() - 1];

        let shifted: Option<Vec<(usize, String)>> = members
            .iter()
            .map(|&m| match &tokens[m].kind {
                TokenKind::CellRef(text) => shift_cell_token(text, d_col, d_row).map(|s| (m, s)),
                _ => None,
            })
            .collect();

        match shifted {
            Some(rewritten) => {
                for (m, text) in rewritten {
                    let token = &tokens[m];
                    if body[token.start..token.end] != text {
                        edits.push(Edit {
                            start: token.start,
                            end: token.end,
                            text,
                        });
                    }
                }
            }
            None => edits.push(Edit {
                start: tokens[group_start].start,
                end: tokens[last].end,
                text: "#REF!".to_string(),
            }),
        }
        idx = last + 1;
    }

    apply_edits(prefix, body, &edits)
}
