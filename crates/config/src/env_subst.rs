/// Replace `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders in config text.
///
/// Unresolvable variables without a default are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Replace placeholders using a custom lookup function.
///
/// This is the implementation used by [`substitute_env`]; the separate
/// signature makes it testable without mutating the process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut body = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                body.push(c);
            }
            if closed && !body.is_empty() {
                let (name, default) = match body.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (body.as_str(), None),
                };
                match lookup(name).filter(|v| !v.is_empty() || default.is_none()) {
                    Some(val) => result.push_str(&val),
                    None => match default {
                        Some(default) => result.push_str(default),
                        None => {
                            result.push_str("${");
                            result.push_str(&body);
                            result.push('}');
                        },
                    },
                }
            } else {
                // Malformed, emit literal.
                result.push_str("${");
                result.push_str(&body);
            }
        } else {
            result.push(ch);
        }
    }

    result
}
