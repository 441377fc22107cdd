use super::TransformError;

/// Keywords after which a `/` starts a regular expression, not a division.
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "case",
    "do",
    "else",
    "in",
    "new",
    "delete",
    "void",
    "throw",
    "yield",
    "await",
];

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || !c.is_ascii()
}

/// A newline may be dropped after these without changing how statements end.
fn newline_safe_after(c: char) -> bool {
    matches!(c, '{' | '(' | '[' | ',' | ';' | ':' | '=' | '\n')
}

/// A newline may be dropped before these.
fn newline_safe_before(c: char) -> bool {
    matches!(c, '}' | ')' | ']' | ',' | ';' | ':' | '=' | '.' | '?')
}

/// Removes comments and redundant whitespace from a script.
///
/// Line breaks that could end a statement are kept as `\n`, so automatic
/// semicolon insertion behaves as it did in the source.
pub fn minify_js(source: &str) -> Result<String, TransformError> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = Minified::default();
    let mut substitutions: Vec<Substitution> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            out.space(true);
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            let keep = chars.get(i + 2) == Some(&'!');
            let mut newline = false;
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                newline |= chars[i] == '\n';
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
                out.verbatim('/', &chars[start..i]);
                out.space(true);
            } else {
                out.space(newline);
            }
            continue;
        }

        if c.is_whitespace() {
            out.space(c == '\n' || c == '\r');
            i += 1;
            continue;
        }

        if matches!(c, '"' | '\'') {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c && chars[i] != '\n' {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= chars.len() || chars[i] != c {
                return Err(TransformError::Unterminated {
                    what: "string",
                    position: start,
                });
            }
            i += 1;
            out.verbatim(c, &chars[start..i]);
            continue;
        }

        if c == '`' {
            let (end, open) = template_text(&chars, i + 1, i)?;
            out.verbatim(c, &chars[i..end]);
            if open {
                substitutions.push(Substitution { braces: 0, start: i });
            }
            i = end;
            continue;
        }

        // A `}` at brace depth zero resumes the enclosing template's text.
        if c == '}' && substitutions.last().is_some_and(|s| s.braces == 0) {
            let start = substitutions.pop().map_or(i, |s| s.start);
            let (end, open) = template_text(&chars, i + 1, start)?;
            out.verbatim(c, &chars[i..end]);
            if open {
                substitutions.push(Substitution { braces: 0, start });
            }
            i = end;
            continue;
        }
        if let Some(sub) = substitutions.last_mut() {
            match c {
                '{' => sub.braces += 1,
                '}' => sub.braces -= 1,
                _ => {}
            }
        }

        if c == '/' && out.regex_allowed() {
            let start = i;
            let mut in_class = false;
            i += 1;
            while i < chars.len() && (chars[i] != '/' || in_class) {
                match chars[i] {
                    '\\' => i += 1,
                    '[' => in_class = true,
                    ']' => in_class = false,
                    '\n' => break,
                    _ => {}
                }
                i += 1;
            }
            if i >= chars.len() || chars[i] != '/' {
                return Err(TransformError::Unterminated {
                    what: "regular expression",
                    position: start,
                });
            }
            i += 1;
            out.verbatim('/', &chars[start..i]);
            continue;
        }

        out.push(c);
        i += 1;
    }

    if let Some(sub) = substitutions.first() {
        return Err(TransformError::Unterminated {
            what: "template literal",
            position: sub.start,
        });
    }

    Ok(out.text.trim_end().to_string())
}

/// An open `${` inside a template literal.
struct Substitution {
    /// Unclosed `{` seen inside the substitution.
    braces: usize,
    /// Where the template literal starts.
    start: usize,
}

/// Scans template text from `i` up to the closing backtick or the next `${`.
///
/// Returns the index just past it and whether a substitution was opened.
fn template_text(chars: &[char], mut i: usize, start: usize) -> Result<(usize, bool), TransformError> {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Ok((i + 1, false)),
            '$' if chars.get(i + 1) == Some(&'{') => return Ok((i + 2, true)),
            _ => i += 1,
        }
    }
    Err(TransformError::Unterminated {
        what: "template literal",
        position: start,
    })
}

/// Output buffer that tracks the whitespace pending between tokens.
#[derive(Default)]
struct Minified {
    text: String,
    pending: Option<bool>,
    last_word: String,
}

impl Minified {
    /// Records whitespace; `newline` marks a line break.
    fn space(&mut self, newline: bool) {
        self.pending = Some(self.pending.unwrap_or(false) || newline);
    }

    fn last(&self) -> Option<char> {
        self.text.chars().last()
    }

    fn flush(&mut self, next: char) {
        let Some(newline) = self.pending.take() else {
            return;
        };
        let Some(last) = self.last() else {
            return;
        };

        if newline && !newline_safe_after(last) && !newline_safe_before(next) {
            self.text.push('\n');
        } else if (is_word(last) && is_word(next))
            || (last == next && matches!(last, '+' | '-'))
        {
            self.text.push(' ');
        }
    }

    fn push(&mut self, c: char) {
        self.flush(c);
        if is_word(c) {
            if !self.last().is_some_and(is_word) {
                self.last_word.clear();
            }
            self.last_word.push(c);
        } else {
            self.last_word.clear();
        }
        self.text.push(c);
    }

    fn verbatim(&mut self, first: char, token: &[char]) {
        self.flush(first);
        self.last_word.clear();
        self.text.extend(token);
    }

    /// Whether a `/` at this point starts a regular expression.
    fn regex_allowed(&self) -> bool {
        match self.last() {
            None => true,
            Some(c) if is_word(c) => REGEX_PRECEDING_KEYWORDS.contains(&self.last_word.as_str()),
            Some(c) => matches!(
                c,
                '(' | ',' | '=' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | '}' | ';' | '+'
                    | '-' | '*' | '%' | '<' | '>' | '~' | '^' | '\n'
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("var a = 1;\n\nvar b = 2;\n", "var a=1;var b=2;")]
    #[case("function f ( x ) {\n  return x + 1 ;\n}", "function f(x){return x+1;}")]
    #[case("// header\nlet x = 1 // trailing\nlet y = 2", "let x=1\nlet y=2")]
    #[case("a = b /* note */ + c", "a=b+c")]
    #[case("a = b + +c; d = e - -f", "a=b+ +c;d=e- -f")]
    #[case("const s = 'a  // not a comment';", "const s='a  // not a comment';")]
    #[case("const t = `line\n  two ${ x }`;", "const t=`line\n  two ${x}`;")]
    #[case("const s = `${a ? `, ` : ''}`;", "const s=`${a?`, `:''}`;")]
    #[case(
        "ul.innerHTML = `${items.map(i => `<li class=\"a  b\"> ${i} </li>`).join('')}`;",
        "ul.innerHTML=`${items.map(i=>`<li class=\"a  b\"> ${i} </li>`).join('')}`;"
    )]
    #[case("const o = `${ { a: 1 }.a } and ${ f({ b }) }`", "const o=`${{a:1}.a} and ${f({b})}`")]
    #[case("const e = `\\${ not  code }`", "const e=`\\${ not  code }`")]
    #[case("x = a / b / c", "x=a/b/c")]
    #[case("", "")]
    fn test_minify_js(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(minify_js(input).unwrap(), expected);
    }

    #[test]
    fn test_regex_literals_are_kept() {
        let output = minify_js("if (/a b\\/c[/ ]/g.test(s)) { return /x  y/ }").unwrap();
        assert_eq!(output, "if(/a b\\/c[/ ]/g.test(s)){return/x  y/}");
    }

    #[test]
    fn test_statement_breaks_survive() {
        let output = minify_js("let a = b\n(c || d).run()").unwrap();
        assert_eq!(output, "let a=b\n(c||d).run()");
    }

    #[test]
    fn test_preserves_license_comment() {
        let output = minify_js("/*! lib v1 */\nvar a = 1;").unwrap();
        assert_eq!(output, "/*! lib v1 */\nvar a=1;");
    }

    #[rstest]
    #[case("var a = 'open", "string")]
    #[case("var a = 1; /* open", "comment")]
    #[case("var t = `open", "template literal")]
    #[case("var t = `a ${ b", "template literal")]
    #[case("var t = `a ${ `b ${ c } d", "template literal")]
    #[case("var r = /open\n", "regular expression")]
    fn test_unterminated(#[case] input: &str, #[case] what: &str) {
        match minify_js(input) {
            Err(TransformError::Unterminated { what: actual, .. }) => assert_eq!(actual, what),
            res => panic!("Expected Unterminated error, got {:?}", res),
        }
    }
}
