//! Error message normalization.
//!
//! Snowflake error text embeds volatile details such as object names, counts,
//! and request ids. Signatures strip those so repeated failures share one log
//! record: quoted literals become `'?'`, digit runs become `#`, whitespace
//! collapses to single spaces, and the rest is lowercased.

/// Normalizes `message` into a stable signature key.
#[must_use]
pub fn error_signature(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut pending_space = false;
    let mut chars = message.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            // Swallow the quoted literal, honoring '' escapes.
            while let Some(inner) = chars.next() {
                if inner == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            push_normalized(&mut out, &mut pending_space, '\'');
            out.push('?');
            out.push('\'');
        } else if ch.is_ascii_digit() {
            while chars.peek().is_some_and(char::is_ascii_digit) {
                chars.next();
            }
            push_normalized(&mut out, &mut pending_space, '#');
        } else if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            for lowered in ch.to_lowercase() {
                push_normalized(&mut out, &mut pending_space, lowered);
            }
        }
    }
    out
}

fn push_normalized(out: &mut String, pending_space: &mut bool, ch: char) {
    if *pending_space {
        out.push(' ');
        *pending_space = false;
    }
    out.push(ch);
}

#[cfg(test)]
mod tests {
    use super::error_signature;

    #[test]
    fn masks_quoted_literals() {
        assert_eq!(
            error_signature("Object 'ORDERS' does not exist"),
            "object '?' does not exist"
        );
    }

    #[test]
    fn collapses_digit_runs() {
        assert_eq!(
            error_signature("Error 390112: Session no longer exists"),
            "error #: session no longer exists"
        );
    }

    #[test]
    fn collapses_whitespace_and_case() {
        assert_eq!(error_signature("  Too\tMany   Requests \n"), "too many requests");
    }

    #[test]
    fn honors_doubled_quote_escapes() {
        assert_eq!(
            error_signature("Table 'O''BRIEN' not found"),
            "table '?' not found"
        );
    }

    #[test]
    fn volatile_details_share_a_signature() {
        let a = error_signature("Division by zero in row 1042");
        let b = error_signature("Division by zero in row 7");
        assert_eq!(a, b);
    }
}
