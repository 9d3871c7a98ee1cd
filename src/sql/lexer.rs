//! Quote-aware scanning helpers shared by the checkers, the safety gate and
//! the executor. None of them parse SQL; they only track whether a position
//! is inside a `'string'`, a `"quoted identifier"` or a comment.

#[derive(Clone, Copy, PartialEq)]
enum Region {
    Code,
    Single,
    Double,
    LineComment,
    BlockComment,
}

impl Region {
    fn is_comment(self) -> bool {
        matches!(self, Region::LineComment | Region::BlockComment)
    }
}

/// Walks `sql` and calls `visit(index, char, region)` for every character.
/// Quote characters themselves are reported as `Region::Code`, comment
/// delimiters as part of the comment. The newline ending a `--` comment is
/// code.
fn scan(sql: &str, mut visit: impl FnMut(usize, char, Region)) -> Region {
    let mut region = Region::Code;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|(_, next)| *next);
        match (region, c) {
            (Region::Code, '\'') => {
                visit(i, c, Region::Code);
                region = Region::Single;
            }
            (Region::Code, '"') => {
                visit(i, c, Region::Code);
                region = Region::Double;
            }
            (Region::Code, '-') if next == Some('-') => {
                region = Region::LineComment;
                visit(i, c, region);
            }
            (Region::Code, '/') if next == Some('*') => {
                region = Region::BlockComment;
                visit(i, c, region);
                // the opening '*' must not close the comment as "*/"
                if let Some((j, star)) = chars.next() {
                    visit(j, star, region);
                }
            }
            (Region::LineComment, '\n') => {
                region = Region::Code;
                visit(i, c, region);
            }
            (Region::BlockComment, '*') if next == Some('/') => {
                visit(i, c, region);
                if let Some((j, slash)) = chars.next() {
                    visit(j, slash, region);
                }
                region = Region::Code;
            }
            (Region::Single, '\'') | (Region::Double, '"') => {
                // '' and "" are escaped quotes inside the literal
                if next == Some(c) {
                    visit(i, c, region);
                    if let Some((j, escaped)) = chars.next() {
                        visit(j, escaped, region);
                    }
                } else {
                    visit(i, c, Region::Code);
                    region = Region::Code;
                }
            }
            _ => visit(i, c, region),
        }
    }

    region
}

fn blank(masked: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        masked.push(' ');
    }
}

/// Blanks string literals and comments. A quoted identifier that is a plain
/// word loses its quotes, so `"data_sales"` still reads as the table name;
/// any other quoted identifier is blanked. Byte offsets are preserved, so
/// positions found in the masked text are valid in the original.
pub fn mask_literals(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut identifier: Option<String> = None;

    let end = scan(sql, |_, c, region| match region {
        Region::Code if c == '"' => {
            match identifier.take() {
                Some(word) if !word.is_empty() && word.chars().all(|ch| ch.is_alphanumeric() || ch == '_') => {
                    masked.push_str(&word)
                }
                Some(other) => other.chars().for_each(|ch| blank(&mut masked, ch)),
                None => identifier = Some(String::new()),
            }
            masked.push(' ');
        }
        Region::Double => {
            if let Some(word) = identifier.as_mut() {
                word.push(c);
            }
        }
        Region::Code => masked.push(c),
        _ => blank(&mut masked, c),
    });

    // unterminated identifier
    if end == Region::Double {
        if let Some(rest) = identifier {
            rest.chars().for_each(|ch| blank(&mut masked, ch));
        }
    }
    masked
}

/// Like [`mask_literals`] but blanks quoted identifiers too. Used where
/// only the statement structure matters (commas, parentheses, clauses).
pub fn mask_quoted(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    scan(sql, |_, c, region| {
        if region == Region::Code {
            masked.push(c);
        } else {
            blank(&mut masked, c);
        }
    });
    masked
}

/// Collapses whitespace runs outside literals into a single space and drops
/// comments, so the result is safe to keep on one line.
pub fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;

    scan(sql, |_, c, region| {
        if region.is_comment() || (region == Region::Code && c.is_whitespace()) {
            pending_space = true;
            return;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    });

    out
}

#[derive(Debug, Default, PartialEq)]
pub struct Balance {
    pub parens_balanced: bool,
    pub quotes_closed: bool,
    pub comments_closed: bool,
}

/// Checks that parentheses outside literals pair up and that every quote and
/// block comment is closed.
pub fn balance(sql: &str) -> Balance {
    let mut depth: i64 = 0;
    let mut went_negative = false;

    let end = scan(sql, |_, c, region| {
        if region != Region::Code {
            return;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    went_negative = true;
                }
            }
            _ => {}
        }
    });

    Balance {
        parens_balanced: depth == 0 && !went_negative,
        quotes_closed: !matches!(end, Region::Single | Region::Double),
        comments_closed: end != Region::BlockComment,
    }
}

/// True when a `;` outside literals is followed by more SQL.
pub fn has_multiple_statements(sql: &str) -> bool {
    let masked = mask_quoted(sql);
    match masked.find(';') {
        Some(pos) => masked[pos + 1..]
            .chars()
            .any(|c| !c.is_whitespace() && c != ';'),
        None => false,
    }
}

pub fn strip_trailing_semicolons(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Parenthesis depth of every byte of `masked` (the depth before the byte).
pub fn depth_map(masked: &str) -> Vec<usize> {
    let mut depths = Vec::with_capacity(masked.len());
    let mut depth = 0usize;
    for c in masked.chars() {
        if c == ')' {
            depth = depth.saturating_sub(1);
        }
        for _ in 0..c.len_utf8() {
            depths.push(depth);
        }
        if c == '(' {
            depth += 1;
        }
    }
    depths
}

/// Splits `text` on commas that sit outside parentheses and literals.
pub fn split_top_level(text: &str) -> Vec<String> {
    let masked = mask_quoted(text);
    let depths = depth_map(&masked);
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, c) in masked.char_indices() {
        if c == ',' && depths[i] == 0 {
            parts.push(text[start..i].trim().to_string());
            start = i + 1;
        }
    }
    parts.push(text[start..].trim().to_string());
    parts.retain(|part| !part.is_empty());
    parts
}
