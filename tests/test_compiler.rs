use insta::assert_snapshot;
use similar_asserts::assert_eq;

use tinyjinja::{context, Environment, Error, ErrorKind};

fn compile_err(source: &str) -> Error {
    Environment::new().render_str(source, context! {}).unwrap_err()
}

#[test]
fn test_unterminated_tags() {
    let err = compile_err("hello {{ world");
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_snapshot!(
        err,
        @"syntax error: unterminated tag: expected `}}` before end of template (in <string>:1)"
    );
    assert_eq!(compile_err("{% if x %}").kind(), ErrorKind::SyntaxError);
    assert_eq!(compile_err("{# lost").kind(), ErrorKind::SyntaxError);
    assert_eq!(compile_err("{% raw %}no end").kind(), ErrorKind::SyntaxError);
}

#[test]
fn test_error_locations_point_at_the_tag() {
    let err = compile_err("line one\nline two\n{% bogus %}\n");
    assert_eq!(err.line(), Some(3));
    assert_snapshot!(err, @"syntax error: unknown `bogus` tag (in <string>:3)");
}

#[test]
fn test_rejected_expressions() {
    // empty subscript
    let err = compile_err("{{ a.b[] }}");
    assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    // bitwise operators are not part of the grammar
    let err = compile_err("{{ a.b & a.c }}");
    assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    assert_snapshot!(err, @"invalid expression: unexpected `&` in expression (in <string>:1)");
    // numeric attributes must use subscript form
    let err = compile_err("{{ item.2 }}");
    assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    // and the subscript form works
    assert_eq!(
        Environment::new()
            .render_str("{{ item[2] }}", context! { item => vec!["a", "b", "c"] })
            .unwrap(),
        "c"
    );
}

#[test]
fn test_empty_output_tag_is_rejected() {
    assert_eq!(compile_err("{{ }}").kind(), ErrorKind::InvalidExpression);
    assert_eq!(compile_err("{{ v | }}").kind(), ErrorKind::InvalidExpression);
}

#[test]
fn test_unbalanced_nesting() {
    assert_eq!(compile_err("{% endif %}").kind(), ErrorKind::SyntaxError);
    assert_eq!(
        compile_err("{% if a %}{% endfor %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        compile_err("{% for x in y %}{% endif %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        compile_err("{% else %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        compile_err("{% if a %}{% else %}{% else %}{% endif %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        compile_err("{% if a %}{% else %}{% elif b %}{% endif %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(compile_err("{% endraw %}").kind(), ErrorKind::SyntaxError);
}

#[test]
fn test_malformed_directives() {
    assert_eq!(compile_err("{% for x %}{% endfor %}").kind(), ErrorKind::SyntaxError);
    assert_eq!(
        compile_err("{% for 1 in y %}{% endfor %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(compile_err("{% set x %}").kind(), ErrorKind::SyntaxError);
    assert_eq!(
        compile_err("{% set a.b = 1 %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        compile_err("{% block 1x %}{% endblock %}").kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        compile_err("{% extends base %}").kind(),
        ErrorKind::SyntaxError
    );
}

#[test]
fn test_bad_string_escapes() {
    let err = compile_err("{{ '\\q' }}");
    assert_eq!(err.kind(), ErrorKind::BadEscape);
    assert_eq!(compile_err("{{ '\\u12' }}").kind(), ErrorKind::BadEscape);
    // valid escapes come through fine
    assert_eq!(
        Environment::new()
            .render_str("{{ 'a\\tb\\u2603' | safe }}", context! {})
            .unwrap(),
        "a\tb\u{2603}"
    );
}

#[test]
fn test_filters_take_literal_arguments_only() {
    assert_eq!(
        compile_err("{{ v | join: other }}").kind(),
        ErrorKind::InvalidExpression
    );
}

#[test]
fn test_string_delimiters_do_not_confuse_the_lexer() {
    let env = Environment::new();
    assert_eq!(
        env.render_str("{{ '}}' | safe }}", context! {}).unwrap(),
        "}}"
    );
    assert_eq!(
        env.render_str("{{ 'a|b' | safe }}", context! {}).unwrap(),
        "a|b"
    );
}
