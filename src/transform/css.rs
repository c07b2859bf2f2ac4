//! Stylesheet helpers for the responsive-image rule, using cssparser

use cssparser::{ParseError, Parser, ParserInput, Token};

type CssParseError<'i> = ParseError<'i, ()>;

/// The rule that lets images tagged with `marker` scale with their container.
pub(crate) fn responsive_rule(marker: &str) -> String {
    format!(
        ".{marker} {{\n  width: auto;\n  height: auto;\n  max-width: 100%;\n  max-height: 100%;\n}}"
    )
}

/// Whether any selector in `css` names `.class`, nested blocks included.
pub(crate) fn has_class_rule(css: &str, class: &str) -> bool {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    find_class_selector(&mut parser, class)
}

fn find_class_selector(parser: &mut Parser, class: &str) -> bool {
    let mut after_dot = false;
    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        let token = token.clone();
        match &token {
            Token::Ident(name) if after_dot && &**name == class => return true,
            Token::CurlyBracketBlock => {
                let found = parser
                    .parse_nested_block(|p| Ok::<_, CssParseError>(find_class_selector(p, class)))
                    .unwrap_or(false);
                if found {
                    return true;
                }
            }
            _ => {}
        }
        after_dot = matches!(token, Token::Delim('.'));
    }
    false
}

/// Append `rule` after the existing content, separated by a blank line.
pub(crate) fn append_rule(css: &str, rule: &str) -> String {
    let existing = css.trim_end();
    if existing.is_empty() {
        return format!("{rule}\n");
    }
    let mut out = String::with_capacity(existing.len() + rule.len() + 3);
    out.push_str(existing);
    out.push_str("\n\n");
    out.push_str(rule);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responsive_rule() {
        let rule = responsive_rule("fit-abcdef");
        assert!(rule.starts_with(".fit-abcdef {"));
        assert!(rule.contains("max-width: 100%;"));
        assert!(rule.contains("max-height: 100%;"));
        assert!(has_class_rule(&rule, "fit-abcdef"));
    }

    #[test]
    fn test_has_class_rule() {
        let css = "p { margin: 0.5em; }\nimg.wide, .cover { width: 100%; }";
        assert!(has_class_rule(css, "cover"));
        assert!(has_class_rule(css, "wide"));
        assert!(!has_class_rule(css, "img"));
        assert!(!has_class_rule(css, "5em"));
    }

    #[test]
    fn test_has_class_rule_inside_media_block() {
        let css = "@media screen { .fit-xyz { width: auto; } }";
        assert!(has_class_rule(css, "fit-xyz"));
        assert!(!has_class_rule(css, "fit"));
    }

    #[test]
    fn test_class_in_comment_does_not_count() {
        assert!(!has_class_rule("/* .fit-xyz */ p {}", "fit-xyz"));
    }

    #[test]
    fn test_append_rule() {
        assert_eq!(append_rule("", ".a {}"), ".a {}\n");
        assert_eq!(append_rule("p {}\n\n", ".a {}"), "p {}\n\n.a {}\n");
    }
}
