//! `?` to `$n` placeholder rendering.
//!
//! Callers write conditions with `?` markers (`"doctor = ?"`). PostgreSQL wants
//! numbered parameters, so the markers are numbered left to right right before
//! execution. Markers inside quoted literals, quoted identifiers and
//! dollar-quoted bodies are left alone, and `??` produces a literal `?` for the
//! JSON operators (`?`, `?|`, `?&`).

/// Render `?` markers as `$n`, numbering from `offset + 1`.
///
/// Returns the rendered SQL and the number of markers replaced.
pub fn render_placeholders(sql: &str, offset: usize) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut count = 0;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\'' | '"' => {
                out.push(ch);
                // Doubled quotes are escapes and simply toggle twice.
                for (_, c) in chars.by_ref() {
                    out.push(c);
                    if c == ch {
                        break;
                    }
                }
            }
            '$' => match dollar_tag(&sql[i..]) {
                Some(tag) => {
                    let body_start = i + tag.len();
                    let end = sql[body_start..]
                        .find(tag)
                        .map_or(sql.len(), |pos| body_start + pos + tag.len());
                    out.push_str(&sql[i..end]);
                    while chars.peek().is_some_and(|&(j, _)| j < end) {
                        chars.next();
                    }
                }
                None => out.push(ch),
            },
            '?' => {
                if chars.peek().is_some_and(|&(_, c)| c == '?') {
                    chars.next();
                    out.push('?');
                } else {
                    count += 1;
                    out.push('$');
                    out.push_str(&(offset + count).to_string());
                }
            }
            _ => out.push(ch),
        }
    }

    (out, count)
}

/// Count the `?` markers that [`render_placeholders`] would replace.
pub fn count_placeholders(sql: &str) -> usize {
    render_placeholders(sql, 0).1
}

/// Returns the opening tag (`$$` or `$name$`) if `s` starts with one.
fn dollar_tag(s: &str) -> Option<&str> {
    let rest = s.strip_prefix('$')?;
    let close = rest.find('$')?;
    let name = &rest[..close];
    let valid = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    valid.then(|| &s[..close + 2])
}
