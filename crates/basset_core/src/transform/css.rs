use super::TransformError;

/// Characters that never need whitespace after them.
fn tight_after(c: char) -> bool {
    matches!(c, '{' | '}' | ';' | ',' | '>' | ':')
}

/// Characters that never need whitespace before them.
///
/// `:` is not in this set: `a :hover` and `a:hover` select different things.
fn tight_before(c: char) -> bool {
    matches!(c, '{' | '}' | ';' | ',' | '>')
}

/// Removes comments and redundant whitespace from a stylesheet.
pub fn minify_css(source: &str) -> Result<String, TransformError> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            let keep = chars.get(i + 2) == Some(&'!');
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            if i + 1 >= chars.len() {
                return Err(TransformError::Unterminated {
                    what: "comment",
                    position: start,
                });
            }
            i += 2;
            if keep {
                flush_space(&mut out, &mut pending_space, '/');
                out.extend(&chars[start..i]);
                out.push('\n');
            } else {
                pending_space = true;
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        if c == '"' || c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(TransformError::Unterminated {
                    what: "string",
                    position: start,
                });
            }
            i += 1;
            flush_space(&mut out, &mut pending_space, c);
            out.extend(&chars[start..i]);
            continue;
        }

        if c == '}' && out.ends_with(';') {
            out.pop();
        }
        flush_space(&mut out, &mut pending_space, c);
        out.push(c);
        i += 1;
    }

    Ok(out.trim_end().to_string())
}

fn flush_space(out: &mut String, pending: &mut bool, next: char) {
    if std::mem::take(pending)
        && out
            .chars()
            .last()
            .is_some_and(|last| last != '\n' && !tight_after(last))
        && !tight_before(next)
    {
        out.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("body {\n  color: red;\n  margin: 0 auto;\n}\n", "body{color:red;margin:0 auto}")]
    #[case("a, b > c { x: 1 }", "a,b>c{x:1}")]
    #[case("/* header */\nh1 { font-weight: bold; }", "h1{font-weight:bold}")]
    #[case("div :first-child { top: 0 }", "div :first-child{top:0}")]
    #[case("a { content: \"a  ;  b\" }", "a{content:\"a  ;  b\"}")]
    #[case("a { width: calc(100% - 2px) }", "a{width:calc(100% - 2px)}")]
    #[case("", "")]
    fn test_minify_css(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(minify_css(input).unwrap(), expected);
    }

    #[test]
    fn test_preserves_license_comment() {
        let output = minify_css("/*! lib v1 | MIT */\na { b: c; }").unwrap();
        assert_eq!(output, "/*! lib v1 | MIT */\na{b:c}");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let output = minify_css(r#"a::after { content: "\"  x" ; }"#).unwrap();
        assert_eq!(output, r#"a::after{content:"\"  x"}"#);
    }

    #[rstest]
    #[case("a { b: c } /* open", "comment")]
    #[case("a { content: \"open }", "string")]
    fn test_unterminated(#[case] input: &str, #[case] what: &str) {
        match minify_css(input) {
            Err(TransformError::Unterminated { what: actual, .. }) => assert_eq!(actual, what),
            res => panic!("Expected Unterminated error, got {:?}", res),
        }
    }
}
