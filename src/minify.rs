//! Minification for generated scripts and stylesheets.
//!
//! Not a general-purpose minifier. It is tuned for the runtime skeleton this
//! crate ships, which uses explicit semicolons and no regular-expression
//! literals. Quoted literals (`'`, `"`, `` ` ``) are always copied verbatim.

/// Strip comments and collapse whitespace outside string literals.
///
/// A whitespace run (or a comment) becomes at most one space, and that space
/// only survives between two identifier characters, or between `+ +` and
/// `- -` so operators never fuse.
pub fn minify_script(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut pending_space = false;

    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' | '`' => {
                flush_space(&mut out, &mut pending_space, ch);
                out.push(ch);
                copy_literal(&mut chars, &mut out, ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|c| *c != '\n' && *c != '\r') {
                    chars.next();
                }
                pending_space = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                pending_space = true;
            }
            c if c.is_whitespace() => pending_space = true,
            c => {
                flush_space(&mut out, &mut pending_space, c);
                out.push(c);
            }
        }
    }

    out
}

/// Copy up to and including the closing `quote`, honouring backslash escapes.
fn copy_literal(chars: &mut impl Iterator<Item = char>, out: &mut String, quote: char) {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else if c == quote {
            return;
        }
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || !ch.is_ascii()
}

fn flush_space(out: &mut String, pending: &mut bool, next: char) {
    if *pending {
        if let Some(prev) = out.chars().next_back() {
            let fuses = (is_word_char(prev) && is_word_char(next))
                || (prev == '+' && next == '+')
                || (prev == '-' && next == '-');
            if fuses {
                out.push(' ');
            }
        }
    }
    *pending = false;
}

/// Minify a stylesheet: drop comments, collapse whitespace, tighten
/// punctuation and remove the last declaration's semicolon.
pub fn minify_css(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut pending_space = false;
    // Braces and parens entered; `:` only separates a declaration inside them.
    let mut depth = 0usize;

    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' => {
                if pending_space && !ends_with_tight(&out, depth) {
                    out.push(' ');
                }
                pending_space = false;
                out.push(ch);
                copy_literal(&mut chars, &mut out, ch);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            c if c.is_whitespace() => pending_space = true,
            '{' | '}' | ';' | ',' | '>' => {
                if ch == '}' && out.ends_with(';') {
                    out.pop();
                }
                match ch {
                    '{' => depth += 1,
                    '}' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                pending_space = false;
                out.push(ch);
            }
            c => {
                if pending_space && !out.is_empty() && !ends_with_tight(&out, depth) {
                    out.push(' ');
                }
                pending_space = false;
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                out.push(c);
            }
        }
    }

    out
}

fn ends_with_tight(out: &str, depth: usize) -> bool {
    match out.chars().next_back() {
        Some('{' | '}' | ';' | ',' | '>') => true,
        Some(':') => depth > 0,
        _ => false,
    }
}
