//! Minimal POSIX shell quoting for the commands written into the build phases. Arguments consisting only of
//! characters that are never special to `sh` are emitted verbatim, everything else is wrapped in single quotes.

use std::borrow::Cow;

use itertools::Itertools;

fn is_verbatim(byte: u8) -> bool {
    matches!(byte, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b'/' | b':' | b'=' | b'@' | b'%' | b'+' | b',')
}

/// Quotes a single argument if necessary.
pub fn quote(arg: &str) -> Cow<str> {
    if arg.is_empty() {
        return Cow::Borrowed("''");
    }
    if arg.bytes().all(is_verbatim) {
        return Cow::Borrowed(arg);
    }

    // A single quote can not appear inside single quotes, so close, emit an escaped quote, and reopen.
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            out.push_str(r"'\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    Cow::Owned(out)
}

/// Quotes each argument and joins them with spaces.
pub fn quote_join<'a, I: IntoIterator<Item = &'a str>>(args: I) -> String {
    args.into_iter().map(quote).join(" ")
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unterminated single quote in {0:?}")]
pub struct UnterminatedQuote(String);

/// Splits a string produced by [`quote_join`] back into its arguments. Understands single quotes and backslash
/// escapes outside of quotes, which is all [`quote`] produces.
pub fn split(input: &str) -> Result<Vec<String>, UnterminatedQuote> {
    let mut args = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if let Some(arg) = current.take() {
                    args.push(arg);
                }
            }
            '\'' => {
                let arg = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => arg.push(c),
                        None => return Err(UnterminatedQuote(input.to_owned())),
                    }
                }
            }
            '\\' => {
                let arg = current.get_or_insert_with(String::new);
                if let Some(c) = chars.next() {
                    arg.push(c);
                }
            }
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    if let Some(arg) = current {
        args.push(arg);
    }

    Ok(args)
}
